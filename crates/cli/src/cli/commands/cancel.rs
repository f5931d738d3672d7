//! `render-core cancel <job-id>` – request cancellation of a queued or
//! in-flight job. Queued jobs are cancelled immediately; an in-flight job
//! is noticed by the owning `serve` process on its next progress checkpoint.

use anyhow::Result;
use render_core::queue::JobDb;

pub async fn run_cancel(db: &JobDb, job_id: &str) -> Result<()> {
    let job_id = job_id.to_string();
    if db.cancel(&job_id).await? {
        println!("Cancelled {job_id}");
    } else {
        println!("Job {job_id} is not cancellable (unknown or already terminal)");
    }
    Ok(())
}
