//! API server setup.

use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::api::routes;
use crate::database::RetryingStore;
use crate::database::repositories::{DownloadRepository, JobRepository};
use crate::error::Result;
use crate::scheduler::WakeupSignal;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Job repository for reads.
    pub jobs: Arc<dyn JobRepository>,
    /// Download repository for reads.
    pub downloads: Arc<dyn DownloadRepository>,
    /// Retrying store for mutations.
    pub store: Arc<RetryingStore>,
    /// Scheduler wakeup, triggered after submissions and retries.
    pub signal: Arc<WakeupSignal>,
    /// Results root, served statically and cleaned on removal.
    pub results_dir: PathBuf,
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::health::health))
        .nest("/api/jobs", routes::jobs::router())
        .nest_service("/results", ServeDir::new(&state.results_dir))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the app until the cancellation token fires, then shut down
/// gracefully.
pub async fn serve(addr: &str, app: Router, cancel: CancellationToken) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;

    Ok(())
}
