//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]`, so a settings
//! file may be partial: missing fields keep their compiled default.
//!
//! ```json
//! {
//!   "relay": { "listen": "0.0.0.0:1337", "readTimeoutMs": 2000 },
//!   "logging": { "level": "debug" }
//! }
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings shared by both binaries.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TetherSettings {
    /// WebSocket relay gateway.
    pub relay: RelaySettings,
    /// Synthetic telemetry device.
    pub device: DeviceSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

impl TetherSettings {
    /// Check every section for values the runtime cannot work with.
    pub fn validate(&self) -> Result<()> {
        self.relay.validate()?;
        self.device.validate()?;
        Ok(())
    }
}

/// Relay gateway settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelaySettings {
    /// Address the HTTP/WebSocket listener binds to.
    pub listen: String,
    /// Backend device address (`host:port`).
    pub device: String,
    /// Path accepting WebSocket upgrades.
    pub ws_path: String,
    /// Per-attempt backend read deadline in milliseconds.
    pub read_timeout_ms: u64,
    /// Write deadline for backend handshake and client frames, in milliseconds.
    pub write_timeout_ms: u64,
    /// Backend dial timeout in milliseconds.
    pub connect_timeout_ms: u64,
    /// Backend socket send/receive buffer size in bytes.
    pub socket_buffer_size: usize,
    /// WebSocket read buffer size in bytes.
    pub ws_read_buffer_size: usize,
    /// WebSocket write buffer size in bytes.
    pub ws_write_buffer_size: usize,
    /// Maximum inbound WebSocket message size in bytes.
    pub max_message_size: usize,
    /// How long shutdown waits for sessions to close, in milliseconds.
    pub shutdown_timeout_ms: u64,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:1337".to_string(),
            device: "127.0.0.1:1242".to_string(),
            ws_path: "/ws".to_string(),
            read_timeout_ms: 5_000,
            write_timeout_ms: 5_000,
            connect_timeout_ms: 5_000,
            socket_buffer_size: 1_000,
            ws_read_buffer_size: 1_000,
            ws_write_buffer_size: 1_000,
            max_message_size: 16 * 1024 * 1024, // 16 MB
            shutdown_timeout_ms: 30_000,
        }
    }
}

impl RelaySettings {
    /// Backend read deadline.
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Write deadline.
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    /// Backend dial timeout.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Shutdown drain timeout.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    fn validate(&self) -> Result<()> {
        validate_endpoint("relay.listen", &self.listen)?;
        validate_endpoint("relay.device", &self.device)?;
        if !self.ws_path.starts_with('/') {
            return Err(SettingsError::InvalidValue(format!(
                "relay.wsPath must start with '/': {:?}",
                self.ws_path
            )));
        }
        for (name, value) in [
            ("relay.readTimeoutMs", self.read_timeout_ms),
            ("relay.writeTimeoutMs", self.write_timeout_ms),
            ("relay.connectTimeoutMs", self.connect_timeout_ms),
            ("relay.shutdownTimeoutMs", self.shutdown_timeout_ms),
        ] {
            require_positive(name, value)?;
        }
        if self.socket_buffer_size == 0 {
            return Err(SettingsError::InvalidValue(
                "relay.socketBufferSize must be > 0".into(),
            ));
        }
        Ok(())
    }
}

/// Synthetic device settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeviceSettings {
    /// Address the device listener binds to.
    pub listen: String,
    /// Minimum payload length in bytes.
    pub min_payload_len: usize,
    /// Maximum payload length in bytes (inclusive).
    pub max_payload_len: usize,
    /// Interval between records on one connection, in milliseconds.
    pub interval_ms: u64,
    /// Handshake read and record write deadline, in milliseconds.
    pub timeout_ms: u64,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:1242".to_string(),
            min_payload_len: 750,
            max_payload_len: 1_500,
            interval_ms: 10,
            timeout_ms: 5_000,
        }
    }
}

impl DeviceSettings {
    /// Interval between records.
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Handshake/write deadline.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    fn validate(&self) -> Result<()> {
        validate_endpoint("device.listen", &self.listen)?;
        require_positive("device.intervalMs", self.interval_ms)?;
        require_positive("device.timeoutMs", self.timeout_ms)?;
        if self.min_payload_len > self.max_payload_len {
            return Err(SettingsError::InvalidValue(format!(
                "device.minPayloadLen ({}) exceeds device.maxPayloadLen ({})",
                self.min_payload_len, self.max_payload_len
            )));
        }
        Ok(())
    }
}

/// Log output format.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable single-line output.
    #[default]
    Compact,
    /// One JSON object per event.
    Json,
}

/// Logging configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive (overridden by `RUST_LOG`).
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}

fn require_positive(name: &str, value: u64) -> Result<()> {
    if value == 0 {
        return Err(SettingsError::InvalidValue(format!("{name} must be > 0")));
    }
    Ok(())
}

/// Accept `host:port` where the port parses as `u16`. Hostnames are resolved
/// at connect/bind time.
fn validate_endpoint(name: &str, value: &str) -> Result<()> {
    let valid = value
        .rsplit_once(':')
        .is_some_and(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok());
    if valid {
        Ok(())
    } else {
        Err(SettingsError::InvalidValue(format!(
            "{name} must be host:port, got {value:?}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relay_defaults() {
        let relay = RelaySettings::default();
        assert_eq!(relay.ws_path, "/ws");
        assert_eq!(relay.read_timeout(), Duration::from_secs(5));
        assert_eq!(relay.write_timeout(), Duration::from_secs(5));
        assert_eq!(relay.connect_timeout(), Duration::from_secs(5));
        assert_eq!(relay.shutdown_timeout(), Duration::from_secs(30));
        assert_eq!(relay.socket_buffer_size, 1_000);
    }

    #[test]
    fn device_defaults() {
        let device = DeviceSettings::default();
        assert_eq!(device.min_payload_len, 750);
        assert_eq!(device.max_payload_len, 1_500);
        assert_eq!(device.interval(), Duration::from_millis(10));
        assert_eq!(device.timeout(), Duration::from_secs(5));
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let json = r#"{"relay":{"readTimeoutMs":250}}"#;
        let settings: TetherSettings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.relay.read_timeout_ms, 250);
        assert_eq!(settings.relay.listen, "127.0.0.1:1337");
        assert_eq!(settings.device, DeviceSettings::default());
    }

    #[test]
    fn serialized_names_are_camel_case() {
        let value = serde_json::to_value(TetherSettings::default()).unwrap();
        assert!(value["relay"]["readTimeoutMs"].is_number());
        assert!(value["device"]["minPayloadLen"].is_number());
        assert_eq!(value["logging"]["format"], "compact");
    }

    #[test]
    fn json_log_format_parses() {
        let logging: LoggingSettings = serde_json::from_str(r#"{"format":"json"}"#).unwrap();
        assert_eq!(logging.format, LogFormat::Json);
        assert_eq!(logging.level, "info");
    }

    #[test]
    fn zero_read_timeout_rejected() {
        let mut settings = TetherSettings::default();
        settings.relay.read_timeout_ms = 0;
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("relay.readTimeoutMs"));
    }

    #[test]
    fn ws_path_must_be_absolute() {
        let mut settings = TetherSettings::default();
        settings.relay.ws_path = "ws".into();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn inverted_payload_range_rejected() {
        let mut settings = TetherSettings::default();
        settings.device.min_payload_len = 10;
        settings.device.max_payload_len = 5;
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("minPayloadLen"));
    }

    #[test]
    fn equal_payload_bounds_allowed() {
        let mut settings = TetherSettings::default();
        settings.device.min_payload_len = 100;
        settings.device.max_payload_len = 100;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn endpoint_validation() {
        assert!(validate_endpoint("x", "localhost:1242").is_ok());
        assert!(validate_endpoint("x", "[::1]:80").is_ok());
        assert!(validate_endpoint("x", "localhost").is_err());
        assert!(validate_endpoint("x", ":80").is_err());
        assert!(validate_endpoint("x", "host:99999").is_err());
    }
}
