//! WebSocket transport for the arena server.
//!
//! Serves the game on `/ws`. Each connection gets a session from the
//! [`GameHandle`]; text frames are decoded into client messages and the
//! session's outbound buffer is written back as text frames.

mod ws;

use axum::{Router, routing::get};
use server::GameHandle;
use server::config::ServerConfig;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tracing::info;

/// State shared by every connection handler.
#[derive(Debug, Clone)]
pub struct AppState {
    handle: GameHandle,
    max_connections: usize,
    ping_interval: Duration,
    connections: Arc<AtomicUsize>,
}

impl AppState {
    pub fn new(handle: GameHandle, config: &ServerConfig) -> Self {
        Self {
            handle,
            max_connections: config.max_connections,
            ping_interval: config.ping_interval(),
            connections: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Reserve a connection slot, or `None` when the server is full.
    fn admit(&self) -> Option<ConnectionSlot> {
        let previous = self.connections.fetch_add(1, Ordering::AcqRel);
        let slot = ConnectionSlot(Arc::clone(&self.connections));
        if previous >= self.max_connections {
            return None;
        }
        Some(slot)
    }
}

/// Releases its connection slot on drop.
#[derive(Debug)]
struct ConnectionSlot(Arc<AtomicUsize>);

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Build the HTTP router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws::websocket_handler))
        .layer(ServiceBuilder::new().layer(CorsLayer::permissive()))
        .with_state(state)
}

/// Serve until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    info!("Listening on {}", listener.local_addr()?);
    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await?;
    Ok(())
}
