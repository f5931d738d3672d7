//! `render-core submit` – enqueue a job for a running (or future) `serve`
//! instance, via the shared durable queue.

use anyhow::{Context, Result};
use render_core::model::{JobRecord, JobRequest, RenderOptions, Scenario};
use render_core::queue::JobDb;

#[allow(clippy::too_many_arguments)]
pub async fn run_submit(
    db: &JobDb,
    job_id: Option<String>,
    video_url: String,
    callback_url: String,
    width: u32,
    height: u32,
    fps: f64,
    quality: u8,
    scenario_path: Option<std::path::PathBuf>,
) -> Result<()> {
    let scenario = match scenario_path {
        Some(path) => {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("reading scenario file {}", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("parsing scenario file {}", path.display()))?
        }
        None => Scenario::default(),
    };

    let job_id = job_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let request = JobRequest {
        job_id: job_id.clone(),
        video_url,
        scenario,
        options: RenderOptions {
            width,
            height,
            fps,
            quality,
        },
        callback_url,
    };
    let record = JobRecord::new(request);
    db.enqueue(&record).await.context("enqueueing job")?;

    println!("Submitted job {job_id}");
    Ok(())
}
