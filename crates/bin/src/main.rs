//! Arena server entry point.

use arena_server::AppState;
use server::{Config, GameLoop};
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,server=debug,arena_server=debug")),
        )
        .init();

    info!("Arena server v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::load()?;
    info!("Loaded configuration");
    info!("  Port: {}", config.server.port);
    info!("  Border: {}x{}", config.border.size, config.border.size);
    info!("  Tick: {}ms", config.server.tick_interval_ms);

    let (handle, game) = GameLoop::spawn(config.clone());

    let addr = format!("{}:{}", config.server.bind, config.server.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Game WebSocket endpoint: ws://{}/ws", listener.local_addr()?);

    arena_server::serve(listener, AppState::new(handle, &config.server), shutdown_signal()).await?;

    game.abort();
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
