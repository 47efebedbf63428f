//! # orbit-server
//!
//! Remote sandboxed executor.
//!
//! - `GET /ws` - one persistent, multiplexed connection per client. Each
//!   `execute` provisions a fresh workspace, runs the compile-then-run
//!   pipeline and streams `stdout` / `stderr` / `exit` tagged with `jobId`.
//! - `POST /run` - one-shot execution answering with the combined output.
//!
//! ```ignore
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:3001").await?;
//! orbit_server::serve(listener, AppState::from_config(&config), shutdown).await?;
//! ```

mod connection;
mod run;
pub mod state;

pub use state::AppState;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use orbit_foundation::Result;
use std::future::Future;
use tokio::net::TcpListener;
use tracing::info;

/// Routes of the executor
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(upgrade))
        .route("/run", post(run::run))
        .with_state(state)
}

async fn upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.max_message_size(state.max_message_bytes)
        .on_upgrade(move |socket| connection::serve(socket, state))
}

/// Serve until `shutdown` resolves
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    info!(%addr, root = %state.workspace_root().display(), "executor listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    info!("executor stopped");
    Ok(())
}
