// src/restart/serve.rs

use std::net::SocketAddr;
use std::path::PathBuf;

use axum::Router;
use tokio::task::JoinHandle;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::instrument::WithSubscriber;
use tracing::{error, info};

use crate::errors::Result;

/// Serve `target_dir` over HTTP on `listener` until the returned task is
/// aborted.
///
/// The server gets its own duplicate of the descriptor; the caller keeps
/// `listener` for hand-off.
pub fn spawn_server(
    listener: &std::net::TcpListener,
    target_dir: impl Into<PathBuf>,
) -> Result<(SocketAddr, JoinHandle<()>)> {
    let target_dir = target_dir.into();

    let std_listener = listener.try_clone()?;
    std_listener.set_nonblocking(true)?;
    let listener = tokio::net::TcpListener::from_std(std_listener)?;
    let addr = listener.local_addr()?;

    let app = Router::new()
        .fallback_service(ServeDir::new(&target_dir))
        .layer(TraceLayer::new_for_http());

    info!(%addr, dir = ?target_dir, "serving target directory");

    let task = async move {
        if let Err(err) = axum::serve(listener, app).await {
            error!(error = %err, "http server stopped");
        }
    };

    Ok((addr, tokio::spawn(task.with_current_subscriber())))
}
