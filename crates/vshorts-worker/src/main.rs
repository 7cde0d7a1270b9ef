//! Job worker binary: `vshorts-worker <job.json>`.
//!
//! Reads one job request, runs it and prints the outcome as JSON on stdout.
//! Exits with status 1 when the job failed.

use anyhow::Context;
use tokio::sync::watch;
use tracing::{info, warn};

use vshorts_media::YtDlpRetriever;
use vshorts_models::JobRequest;
use vshorts_worker::{init_metrics, init_tracing, JobRunner, WorkerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = WorkerConfig::from_env();
    init_tracing(config.log_format);
    config.validate()?;

    if let Some(addr) = config.metrics_listen_addr {
        init_metrics(addr)?;
    }

    let job_path = std::env::args()
        .nth(1)
        .context("usage: vshorts-worker <job.json>")?;
    let raw = tokio::fs::read_to_string(&job_path)
        .await
        .with_context(|| format!("reading job file {job_path}"))?;
    let request: JobRequest =
        serde_json::from_str(&raw).with_context(|| format!("parsing job file {job_path}"))?;

    info!(job_id = %request.job_id, "Starting vshorts-worker");
    info!("Worker config: {:?}", config);

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Received shutdown signal, cancelling job");
            let _ = cancel_tx.send(true);
        }
    });

    let runner = JobRunner::new(config, YtDlpRetriever::new()).with_cancel(cancel_rx);
    let outcome = runner.run(request).await;

    println!("{}", serde_json::to_string_pretty(&outcome)?);

    if let Some(failure) = outcome.failure() {
        warn!(
            job_id = %outcome.job_id(),
            retry = failure.should_retry_job(),
            "{}",
            failure.user_message()
        );
        std::process::exit(1);
    }
    Ok(())
}
