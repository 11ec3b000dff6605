//! # tether-device
//!
//! Synthetic telemetry device. Accepts TCP connections, reads one
//! `{"RequestID": ...}` handshake per connection and then emits a checksummed
//! record every interval until cancelled or the peer stops reading.

#![deny(unsafe_code)]

pub mod generator;
pub mod worker;

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tether_settings::DeviceSettings;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info};

pub use generator::RecordGenerator;
pub use worker::WorkerConfig;

/// Device failures.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// The listener could not be bound.
    #[error("cant listen on {addr}: {source}")]
    Bind {
        /// Requested address.
        addr: String,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
    /// Payload bounds are inverted.
    #[error("min payload length {min} exceeds max {max}")]
    InvalidRange {
        /// Configured minimum.
        min: usize,
        /// Configured maximum.
        max: usize,
    },
    /// Socket options could not be applied.
    #[error("cant tune conn: {0}")]
    Socket(#[source] io::Error),
    /// Reading the handshake failed.
    #[error("cant read request: {0}")]
    Handshake(#[source] io::Error),
    /// No handshake within the deadline.
    #[error("no request within {0:?}")]
    HandshakeTimeout(Duration),
    /// The handshake was not valid JSON.
    #[error("cant parse request: {0}")]
    BadRequest(#[source] serde_json::Error),
    /// A record could not be encoded.
    #[error("cant marshal record: {0}")]
    Encode(#[source] serde_json::Error),
    /// Writing a record failed.
    #[error("cant write to conn: {0}")]
    Write(#[source] io::Error),
    /// Writing a record exceeded the deadline.
    #[error("write timed out after {0:?}")]
    WriteTimeout(Duration),
}

/// A running device: the accept loop plus one worker per connection.
pub struct Device {
    local_addr: SocketAddr,
    tasks: TaskTracker,
    cancel: CancellationToken,
}

impl Device {
    /// Bind `settings.listen` and start accepting. Stops when `cancel` fires.
    pub async fn start(settings: &DeviceSettings, cancel: CancellationToken) -> Result<Self, DeviceError> {
        if settings.min_payload_len > settings.max_payload_len {
            return Err(DeviceError::InvalidRange {
                min: settings.min_payload_len,
                max: settings.max_payload_len,
            });
        }
        let listener = TcpListener::bind(&settings.listen)
            .await
            .map_err(|source| DeviceError::Bind {
                addr: settings.listen.clone(),
                source,
            })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| DeviceError::Bind {
                addr: settings.listen.clone(),
                source,
            })?;
        info!(listen = %local_addr, "device started");

        let config = WorkerConfig {
            min_len: settings.min_payload_len,
            max_len: settings.max_payload_len,
            interval: settings.interval(),
            timeout: settings.timeout(),
        };
        let tasks = TaskTracker::new();
        let _ = tasks.spawn(accept_loop(listener, tasks.clone(), config, cancel.clone()));

        Ok(Self {
            local_addr,
            tasks,
            cancel,
        })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Signal the accept loop and every worker to stop.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Number of running tasks, the accept loop included.
    pub fn running_tasks(&self) -> usize {
        self.tasks.len()
    }

    /// Wait until the accept loop and every worker have ended.
    pub async fn wait(&self) {
        self.tasks.wait().await;
    }
}

async fn accept_loop(
    listener: TcpListener,
    tasks: TaskTracker,
    config: WorkerConfig,
    cancel: CancellationToken,
) {
    loop {
        let accepted = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            accepted = listener.accept() => accepted,
        };
        match accepted {
            Ok((stream, peer)) => {
                let _ = tasks.spawn(worker::serve_connection(
                    stream,
                    peer,
                    config.clone(),
                    cancel.clone(),
                ));
            }
            Err(err) => error!(error = %err, "cant accept conn"),
        }
    }
    let _ = tasks.close();
    drop(listener);
    info!("listener closed");
}
