//! Gateway configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tether_settings::RelaySettings;

use crate::backend::BackendOptions;

/// Configuration for the relay gateway.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Address to bind (default `"127.0.0.1:1337"`).
    pub listen: String,
    /// Device address dialed once per session.
    pub device: String,
    /// Path accepting WebSocket upgrades.
    pub ws_path: String,
    /// Write deadline for client frames.
    pub write_timeout: Duration,
    /// WebSocket read buffer size in bytes.
    pub ws_read_buffer_size: usize,
    /// WebSocket write buffer size in bytes.
    pub ws_write_buffer_size: usize,
    /// Max inbound WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Bound on the whole Connecting phase: device dial plus handshake.
    pub upgrade_timeout: Duration,
    /// Device dial, read and handshake settings.
    #[serde(skip)]
    pub backend: BackendOptions,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self::from(&RelaySettings::default())
    }
}

impl From<&RelaySettings> for GatewayConfig {
    fn from(settings: &RelaySettings) -> Self {
        Self {
            listen: settings.listen.clone(),
            device: settings.device.clone(),
            ws_path: settings.ws_path.clone(),
            write_timeout: settings.write_timeout(),
            ws_read_buffer_size: settings.ws_read_buffer_size,
            ws_write_buffer_size: settings.ws_write_buffer_size,
            max_message_size: settings.max_message_size,
            upgrade_timeout: settings.connect_timeout() + settings.write_timeout(),
            backend: BackendOptions {
                connect_timeout: settings.connect_timeout(),
                read_timeout: settings.read_timeout(),
                write_timeout: settings.write_timeout(),
                socket_buffer_size: settings.socket_buffer_size,
            },
        }
    }
}
