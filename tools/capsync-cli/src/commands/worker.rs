//! Hidden `worker` subcommand: host one capture session on stdio.

use capsync_common::config::AppConfig;

pub async fn run(config: &AppConfig) -> anyhow::Result<()> {
    tracing::info!(pid = std::process::id(), "Worker starting");
    let backend = capsync_capture_engine::default_backend();
    capsync_worker::run_worker(tokio::io::stdin(), tokio::io::stdout(), backend, config).await?;
    tracing::info!("Worker exiting");
    Ok(())
}
