//! HTTP routes and the per-connection loop.

use crate::config::Config;
use crate::hub::{Hub, HubHandle};
use crate::metrics::{self, ConnectionMetricsGuard};
use anyhow::{Context, Result};
use axum::{
    extract::{ws::WebSocketUpgrade, ConnectInfo, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use parley_protocol::{Connected, ServerEvent, PROTOCOL_VERSION};
use parley_transport::{Connection, WebSocketConnection};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Shared server state.
pub struct AppState {
    /// Handle to the hub task.
    pub hub: HubHandle,
    /// Server configuration.
    pub config: Config,
}

impl AppState {
    /// Create app state and spawn the hub.
    #[must_use]
    pub fn new(config: Config) -> Self {
        let (hub, _task) = Hub::spawn(config.engine_config());
        Self { hub, config }
    }
}

/// Per-connection session settings.
#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    /// Heartbeat interval advertised in the handshake; also the keepalive
    /// period.
    pub heartbeat_interval: Duration,
    /// Silence after which a transport with a liveness signal is dropped.
    pub idle_timeout: Duration,
}

impl SessionSettings {
    /// Settings from the server configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            heartbeat_interval: Duration::from_millis(config.heartbeat.interval_ms),
            idle_timeout: Duration::from_millis(config.heartbeat.timeout_ms),
        }
    }
}

/// Build the HTTP router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route(&state.config.transport.websocket_path, get(ws_handler))
        .with_state(state)
}

/// Run the HTTP/WebSocket server.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    let addr = config.bind_addr()?;
    let websocket_path = config.transport.websocket_path.clone();
    let app = router(Arc::new(AppState::new(config)));

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    info!("Parley server listening on {}", addr);
    info!("WebSocket endpoint: ws://{}{}", addr, websocket_path);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

async fn root_handler() -> &'static str {
    "Parley server is running!"
}

/// Health check handler.
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "connections": state.hub.connection_count(),
    }))
}

/// WebSocket upgrade handler.
async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<Arc<AppState>>,
) -> Response {
    if state.hub.connection_count() >= state.config.limits.max_connections {
        warn!(remote = %addr, "Connection limit reached, rejecting");
        metrics::record_error("connection_limit");
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    let max_message_size = state.config.limits.max_message_size;
    let settings = SessionSettings::from_config(&state.config);
    let hub = state.hub.clone();

    ws.max_message_size(max_message_size)
        .on_upgrade(move |socket| {
            let conn = WebSocketConnection::new(socket, Some(addr), max_message_size);
            run_connection(conn, hub, settings)
        })
}

/// Drive one connection until it closes.
///
/// Sends the `connected` handshake, registers the connection with the hub,
/// then forwards inbound frames to the hub and queued events to the client.
/// Every heartbeat interval the transport sends a keepalive; a peer that has
/// not been heard from at all, control frames included, for the idle timeout
/// is dropped.
pub async fn run_connection<C: Connection>(mut conn: C, hub: HubHandle, settings: SessionSettings) {
    let _metrics_guard = ConnectionMetricsGuard::new();
    let connection_id = conn.id().to_string();

    debug!(
        connection = %connection_id,
        remote = conn.remote_addr().as_deref().unwrap_or("unknown"),
        "Connection opened"
    );

    let handshake = ServerEvent::Connected(Connected {
        connection_id: connection_id.clone(),
        version: PROTOCOL_VERSION.to_string(),
        heartbeat: u32::try_from(settings.heartbeat_interval.as_millis()).unwrap_or(u32::MAX),
    });
    match conn.send(&handshake).await {
        Ok(bytes) => metrics::record_message(bytes, "outbound"),
        Err(e) => {
            error!(connection = %connection_id, error = %e, "Failed to send handshake");
            return;
        }
    }

    let (outbox, mut inbox) = mpsc::unbounded_channel();
    hub.connect(connection_id.clone(), outbox);

    let period = settings.heartbeat_interval.max(Duration::from_millis(1));
    let mut heartbeat = interval_at(Instant::now() + period, period);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            Some(event) = inbox.recv() => {
                match conn.send(&event).await {
                    Ok(bytes) => metrics::record_message(bytes, "outbound"),
                    Err(e) => {
                        warn!(connection = %connection_id, error = %e, "Send failed");
                        metrics::record_error("send");
                        break;
                    }
                }
            }

            inbound = conn.recv() => {
                match inbound {
                    Ok(Some(inbound)) => {
                        metrics::record_message(inbound.bytes, "inbound");
                        hub.event(connection_id.clone(), inbound.frame);
                    }
                    Ok(None) => break,
                    Err(e) if e.is_recoverable() => {
                        warn!(connection = %connection_id, error = %e, "Dropped invalid frame");
                        metrics::record_error("protocol");
                    }
                    Err(e) => {
                        warn!(connection = %connection_id, error = %e, "Connection error");
                        metrics::record_error("transport");
                        break;
                    }
                }
            }

            _ = heartbeat.tick() => {
                if conn
                    .last_seen()
                    .is_some_and(|seen| seen.elapsed() >= settings.idle_timeout)
                {
                    info!(connection = %connection_id, "Idle timeout");
                    break;
                }
                if let Err(e) = conn.keepalive().await {
                    warn!(connection = %connection_id, error = %e, "Keepalive failed");
                    metrics::record_error("keepalive");
                    break;
                }
            }
        }
    }

    hub.disconnect(connection_id.clone());
    if let Err(e) = conn.close().await {
        debug!(connection = %connection_id, error = %e, "Close failed");
    }
    debug!(connection = %connection_id, "Connection closed");
}
