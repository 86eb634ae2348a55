//! HTTP server entry point.

use crate::routes::build_router;
use crate::state::AppState;
use std::net::SocketAddr;
use tracing::info;

/// Binds the listener and serves the API until the process exits.
pub async fn serve(addr: SocketAddr, state: AppState) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "caseflow API listening");
    axum::serve(listener, build_router(state)).await
}
