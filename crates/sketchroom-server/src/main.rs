use std::sync::Arc;

use sketchroom_core::Relay;
use sketchroom_server::{AppState, ServerConfig, ServerError};
use tokio::net::TcpListener;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "sketchroom_server=info,sketchroom_core=info,tower_http=info".into()
            }),
        )
        .init();

    let config = ServerConfig::from_env()?;
    let relay = Arc::new(Relay::new(config.relay.clone()));

    let listener = TcpListener::bind((config.host.as_str(), config.port)).await?;
    let addr = listener.local_addr()?;
    info!("SketchRoom relay server listening on {}", addr);
    info!("WebSocket endpoint: ws://{}/ws", addr);

    sketchroom_server::serve(listener, AppState::new(relay, &config), shutdown_signal()).await?;
    info!("Relay server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Cannot listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}
