use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use demix::api::server::{self, AppState};
use demix::config::AppConfig;
use demix::database::repositories::{JobRepository, SqlxDownloadRepository, SqlxJobRepository};
use demix::database::{self, RetryingStore};
use demix::pipeline::{JobPipeline, PipelineConfig, WorkerPool};
use demix::scheduler::{Scheduler, WakeupSignal};
use demix::tools::{self, Demucs, Ffmpeg, YtDlp};
use demix::utils::fs;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "demix=info,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();

    let config = AppConfig::from_env()?;

    // missing external binaries abort startup entirely
    tools::check_dependencies().await?;

    // scratch space does not survive restarts
    let temp_dir = config.temp_dir();
    fs::remove_dir_all_if_exists("clearing temp directory", &temp_dir).await?;
    fs::ensure_dir_all(&temp_dir).await?;
    fs::ensure_dir_all(&config.results_dir()).await?;

    let pool = database::init_pool(&config.database_url).await?;
    database::run_migrations(&pool).await?;

    let jobs = Arc::new(SqlxJobRepository::new(pool.clone()));
    let downloads = Arc::new(SqlxDownloadRepository::new(pool.clone()));

    // crash recovery: Processing is never a durable resting state
    let reverted = jobs.reset_processing_jobs().await?;
    if reverted > 0 {
        info!("reverted {} interrupted jobs to SUBMITTED", reverted);
    }

    let scheduler_config = config.scheduler();
    let store = Arc::new(RetryingStore::new(
        jobs.clone(),
        downloads.clone(),
        scheduler_config.backoff,
    ));

    let cancel = CancellationToken::new();
    let signal = Arc::new(WakeupSignal::new());

    let pipeline_config = PipelineConfig {
        no_graceful_retry: config.no_graceful_retry,
        ..PipelineConfig::new(temp_dir, config.results_dir(), scheduler_config.job_timeout)
    };
    let pipeline = Arc::new(JobPipeline::new(
        store.clone(),
        Arc::new(YtDlp::new()),
        Arc::new(Demucs::new()),
        Arc::new(Ffmpeg::new()),
        pipeline_config,
        cancel.clone(),
    ));

    let scheduler = Scheduler::new(
        store.clone(),
        Arc::new(WorkerPool::new(scheduler_config.workers)),
        pipeline,
        signal.clone(),
        cancel.clone(),
    );
    let scheduler_handle = tokio::spawn(async move { scheduler.run().await });

    // SIGINT/SIGTERM cancel the root token; the server and the scheduler
    // loop both exit cleanly
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            info!("shutdown signal received");
            cancel.cancel();
        });
    }

    let state = AppState {
        jobs,
        downloads,
        store,
        signal,
        results_dir: config.results_dir(),
    };
    let addr = format!("{}:{}", config.bind_address, config.port);
    server::serve(&addr, server::router(state), cancel.clone()).await?;

    cancel.cancel();
    let _ = scheduler_handle.await;

    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("installing SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
