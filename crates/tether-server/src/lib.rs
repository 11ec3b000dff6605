//! # tether-server
//!
//! Axum-based relay gateway bridging WebSocket clients to a line-oriented
//! TCP telemetry device.
//!
//! - Upgrade endpoint: one device connection and one session per client
//! - Session pump: verify each record's checksum, forward it as a text frame
//! - Graceful shutdown: one cancellation token, one session barrier
//! - Health check and Prometheus metrics endpoints

#![deny(unsafe_code)]

pub mod backend;
pub mod config;
pub mod health;
pub mod metrics;
pub mod server;
pub mod session;
pub mod shutdown;

pub use backend::{BackendConnection, BackendError, BackendOptions};
pub use config::GatewayConfig;
pub use server::RelayServer;
pub use session::{SessionContext, SessionEnd, run_session};
pub use shutdown::ShutdownCoordinator;
