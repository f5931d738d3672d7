//! `render-core serve` – run the Job Coordinator loop against the durable
//! queue until interrupted.

use anyhow::Result;
use render_core::config::RenderConfig;
use render_core::control::JobControl;
use render_core::coordinator::{JobCoordinator, RendererFactory};
use render_core::progress_store;
use render_core::queue::JobDb;
use render_core::render_worker::NullFrameRenderer;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

const POLL_INTERVAL: Duration = Duration::from_millis(500);
const LEASE_SWEEP_INTERVAL: Duration = Duration::from_secs(30);
const CANCEL_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// True if the process was interrupted (SIGINT) rather than draining
/// naturally; the caller maps this to exit code 130.
pub async fn run_serve(db: JobDb, config: RenderConfig) -> Result<bool> {
    let store = Arc::from(progress_store::open(&config.store_url)?);
    let control = Arc::new(JobControl::new());
    let renderer_factory: RendererFactory = Arc::new(|_segment| Box::new(NullFrameRenderer));
    let coordinator = Arc::new(JobCoordinator::new(
        db.clone(),
        store,
        control,
        config.clone(),
        renderer_factory,
    ));

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("received interrupt, draining in-flight jobs");
            shutdown.cancel();
        });
    }

    let mut in_flight: JoinSet<()> = JoinSet::new();
    let running_jobs: Arc<Mutex<HashSet<String>>> = Arc::new(Mutex::new(HashSet::new()));
    let mut last_sweep = tokio::time::Instant::now();
    let mut last_cancel_poll = tokio::time::Instant::now();
    let mut interrupted = false;

    loop {
        if shutdown.is_cancelled() {
            interrupted = true;
            break;
        }

        if last_sweep.elapsed() >= LEASE_SWEEP_INTERVAL {
            match db.sweep_expired_leases(config.lease_timeout_secs as i64).await {
                Ok(0) => {}
                Ok(n) => tracing::info!(n, "requeued jobs with expired leases"),
                Err(e) => tracing::warn!(error = %e, "lease sweep failed"),
            }
            last_sweep = tokio::time::Instant::now();
        }

        if last_cancel_poll.elapsed() >= CANCEL_POLL_INTERVAL {
            let ids: Vec<String> = running_jobs.lock().unwrap().iter().cloned().collect();
            for job_id in ids {
                if let Ok(Some(record)) = db.get(&job_id).await {
                    if record.status == render_core::model::JobStatus::Cancelled {
                        coordinator.cancel(&job_id);
                    }
                }
            }
            last_cancel_poll = tokio::time::Instant::now();
        }

        if in_flight.len() < config.max_concurrent_jobs {
            match db.lease_next("render-core-serve").await {
                Ok(Some(record)) => {
                    tracing::info!(job_id = %record.job_id, "leased job");
                    let job_id = record.job_id.clone();
                    running_jobs.lock().unwrap().insert(job_id.clone());
                    let coordinator = coordinator.clone();
                    let running_jobs = running_jobs.clone();
                    in_flight.spawn(async move {
                        coordinator.run_job(record).await;
                        running_jobs.lock().unwrap().remove(&job_id);
                    });
                    continue;
                }
                Ok(None) => {}
                Err(e) => tracing::warn!(error = %e, "lease attempt failed"),
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(POLL_INTERVAL) => {}
            Some(res) = in_flight.join_next(), if !in_flight.is_empty() => {
                if let Err(e) = res {
                    tracing::error!(error = %e, "job task panicked");
                }
            }
            _ = shutdown.cancelled() => {
                interrupted = true;
                break;
            }
        }
    }

    for job_id in running_jobs.lock().unwrap().iter() {
        coordinator.cancel(job_id);
    }
    tracing::info!(remaining = in_flight.len(), "waiting for in-flight jobs to finish");
    while in_flight.join_next().await.is_some() {}

    Ok(interrupted)
}
