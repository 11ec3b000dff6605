//! `RelayServer`: Axum HTTP + WebSocket gateway.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use metrics::counter;
use metrics_exporter_prometheus::PrometheusHandle;
use tether_core::RequestId;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::backend::BackendConnection;
use crate::config::GatewayConfig;
use crate::health::{self, HealthResponse};
use crate::metrics::BACKEND_DIAL_FAILURES_TOTAL;
use crate::session::{SessionContext, run_session};
use crate::shutdown::ShutdownCoordinator;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Gateway configuration.
    pub config: Arc<GatewayConfig>,
    /// Shutdown coordinator and session tracker.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle, when a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}

/// The relay gateway.
pub struct RelayServer {
    config: Arc<GatewayConfig>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
    metrics: Option<PrometheusHandle>,
}

impl RelayServer {
    /// Create a new server.
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            config: Arc::new(config),
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
            metrics: None,
        }
    }

    /// Serve `/metrics` from the given Prometheus handle.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            config: self.config.clone(),
            shutdown: self.shutdown.clone(),
            start_time: self.start_time,
            metrics: self.metrics.clone(),
        };

        Router::new()
            .route(&self.config.ws_path, get(ws_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Bind the configured address and serve until shutdown.
    ///
    /// The listener stops accepting as soon as the shutdown token fires.
    /// Returns the bound address and the serve task handle.
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let listener = TcpListener::bind(&self.config.listen).await?;
        let local_addr = listener.local_addr()?;
        info!(
            addr = %local_addr,
            ws_path = %self.config.ws_path,
            device = %self.config.device,
            "relay server started"
        );

        let router = self.router();
        let token = self.shutdown.token();
        let handle = tokio::spawn(async move {
            if let Err(err) = axum::serve(listener, router)
                .with_graceful_shutdown(token.cancelled_owned())
                .await
            {
                error!(error = %err, "relay server stopped with error");
            }
            debug!("listener closed");
        });
        Ok((local_addr, handle))
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the gateway configuration.
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }
}

/// GET {ws_path}: dial the device, then upgrade.
///
/// The device is dialed before the upgrade is accepted so a dead device
/// surfaces as a plain HTTP 502. Dial and handshake together are bounded by
/// `upgrade_timeout`; once the 101 response is written hyper hands the
/// connection straight to the session.
async fn ws_handler(
    State(state): State<AppState>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let Some(guard) = state.shutdown.track() else {
        return (StatusCode::SERVICE_UNAVAILABLE, "going shutdown").into_response();
    };
    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };

    let request_id = RequestId::new();
    let config = &state.config;
    let establish = BackendConnection::establish(request_id.clone(), &config.device, &config.backend);
    let backend = match timeout(config.upgrade_timeout, establish).await {
        Ok(Ok(backend)) => backend,
        Ok(Err(err)) => {
            counter!(BACKEND_DIAL_FAILURES_TOTAL).increment(1);
            warn!(%request_id, error = %err, "cant connect to dev");
            return (StatusCode::BAD_GATEWAY, "cant connect to device").into_response();
        }
        Err(_) => {
            counter!(BACKEND_DIAL_FAILURES_TOTAL).increment(1);
            warn!(%request_id, timeout = ?config.upgrade_timeout, "upgrade deadline exceeded");
            return (StatusCode::BAD_GATEWAY, "cant connect to device").into_response();
        }
    };

    let ctx = SessionContext {
        request_id,
        write_timeout: config.write_timeout,
        cancel: state.shutdown.token(),
    };
    ws.read_buffer_size(config.ws_read_buffer_size)
        .write_buffer_size(config.ws_write_buffer_size)
        .max_message_size(config.max_message_size)
        .on_failed_upgrade(|err| warn!(error = %err, "websocket upgrade failed"))
        .on_upgrade(move |socket| async move {
            let _guard = guard;
            let _ = run_session(socket, backend, ctx).await;
        })
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.shutdown.active_sessions(),
        state.shutdown.is_shutting_down(),
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => crate::metrics::render(handle).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
