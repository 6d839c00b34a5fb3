use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

use crate::api::{create_router, AppState};
use crate::coordinator::TradingSystem;
use crate::error::{HedgeflowError, Result};

/// Start the API server: `/ws` for the UI and `/health`
pub async fn start_api_server(system: Arc<TradingSystem>, host: &str, port: u16) -> Result<()> {
    let app_state = AppState::new(system);
    app_state.attach_ui_forwarder().await;

    let app = create_router(app_state);

    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .map_err(|e| HedgeflowError::Transport(format!("invalid listen address: {}", e)))?;
    info!("🚀 API server listening on http://{}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Start the API server in the background
pub async fn start_api_server_background(
    system: Arc<TradingSystem>,
    host: String,
    port: u16,
) -> Result<tokio::task::JoinHandle<Result<()>>> {
    let handle = tokio::spawn(async move { start_api_server(system, &host, port).await });

    Ok(handle)
}
