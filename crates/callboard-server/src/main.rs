use std::sync::Arc;

use callboard_server::{AppState, ServerConfig};
use clap::Parser;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "callboard_server=info,callboard_core=info,tower_http=info".into()),
        )
        .init();

    let config = ServerConfig::parse();
    let store = config.build_store()?;
    let state = Arc::new(AppState::new(store, config.channel_capacity));
    let app = callboard_server::app(state);

    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    info!("Callboard server listening on {}", config.bind);
    info!("WebSocket endpoint: ws://{}/ws", config.bind);

    axum::serve(listener, app).await?;
    Ok(())
}
