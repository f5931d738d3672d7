//! `render-core queue-status` – summarize the durable queue.

use anyhow::Result;
use render_core::model::JobStatus;
use render_core::queue::JobDb;

const STATUSES: [JobStatus; 5] = [
    JobStatus::Queued,
    JobStatus::Processing,
    JobStatus::Completed,
    JobStatus::Failed,
    JobStatus::Cancelled,
];

pub async fn run_queue_status(db: &JobDb) -> Result<()> {
    let counts = db.status_counts().await?;
    for status in STATUSES {
        let n = counts.get(&status).copied().unwrap_or(0);
        println!("{:<12} {n}", status.as_str());
    }
    Ok(())
}
