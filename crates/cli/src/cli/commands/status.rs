//! `render-core status <job-id>` – show one job's status, preferring the
//! live Progress Store record and falling back to the durable queue.

use anyhow::Result;
use render_core::config::RenderConfig;
use render_core::progress_store;
use render_core::queue::JobDb;

pub async fn run_status(db: &JobDb, config: &RenderConfig, job_id: &str) -> Result<()> {
    let job_id = job_id.to_string();
    let from_store = progress_store::open(&config.store_url)?
        .get_job(&job_id)
        .await
        .unwrap_or(None);

    let record = match from_store {
        Some(r) => r,
        None => match db.get(&job_id).await? {
            Some(r) => r,
            None => {
                println!("No such job: {job_id}");
                return Ok(());
            }
        },
    };

    println!("job_id:     {}", record.job_id);
    println!("status:     {}", record.status.as_str());
    println!("progress:   {}%", record.progress);
    if let Some(kind) = &record.error_kind {
        println!("error_kind: {kind}");
    }
    if let Some(message) = &record.error_message {
        println!("error:      {message}");
    }
    println!("created_at: {}", record.created_at.to_rfc3339());
    if let Some(t) = record.started_at {
        println!("started_at: {}", t.to_rfc3339());
    }
    if let Some(t) = record.completed_at {
        println!("completed_at: {}", t.to_rfc3339());
    }
    Ok(())
}
