//! Job queue read operations: get, list, queue-wide status counts.

use anyhow::Result;
use sqlx::Row;
use std::collections::HashMap;

use super::super::db::JobDb;
use crate::model::{JobId, JobRecord, JobStatus};

impl JobDb {
    pub async fn get(&self, job_id: &JobId) -> Result<Option<JobRecord>> {
        let row = sqlx::query("SELECT request_json FROM jobs WHERE id = ?1")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let request_json: String = row.get("request_json");
        Ok(Some(serde_json::from_str(&request_json)?))
    }

    pub async fn list(&self) -> Result<Vec<JobRecord>> {
        let rows = sqlx::query("SELECT request_json FROM jobs ORDER BY created_at ASC")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(|row| {
                let json: String = row.get("request_json");
                Ok(serde_json::from_str(&json)?)
            })
            .collect()
    }

    /// Counts of jobs per status, for the `queue-status` CLI command.
    pub async fn status_counts(&self) -> Result<HashMap<JobStatus, u64>> {
        let rows = sqlx::query("SELECT status, COUNT(*) as n FROM jobs GROUP BY status")
            .fetch_all(&self.pool)
            .await?;
        let mut out = HashMap::new();
        for row in rows {
            let status_str: String = row.get("status");
            let n: i64 = row.get("n");
            if let Some(status) = JobStatus::from_str(&status_str) {
                out.insert(status, n as u64);
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::super::super::db::JobDb;
    use crate::model::{JobRecord, JobRequest, JobStatus, RenderOptions, Scenario};

    fn request(job_id: &str) -> JobRequest {
        JobRequest {
            job_id: job_id.to_string(),
            video_url: "https://example.com/source.mp4".to_string(),
            scenario: Scenario::default(),
            options: RenderOptions::default(),
            callback_url: "https://example.com/callback".to_string(),
        }
    }

    #[tokio::test]
    async fn enqueue_then_get_roundtrip() {
        let db = JobDb::open_memory().await.unwrap();
        let record = JobRecord::new(request("job-1"));
        db.enqueue(&record).await.unwrap();
        let fetched = db.get(&"job-1".to_string()).await.unwrap().unwrap();
        assert_eq!(fetched.job_id, "job-1");
        assert_eq!(fetched.status, JobStatus::Queued);
    }

    #[tokio::test]
    async fn lease_next_is_fifo_and_marks_processing() {
        let db = JobDb::open_memory().await.unwrap();
        db.enqueue(&JobRecord::new(request("a"))).await.unwrap();
        db.enqueue(&JobRecord::new(request("b"))).await.unwrap();

        let leased = db.lease_next("worker-1").await.unwrap().unwrap();
        assert_eq!(leased.job_id, "a");
        assert_eq!(leased.status, JobStatus::Processing);

        let leased2 = db.lease_next("worker-1").await.unwrap().unwrap();
        assert_eq!(leased2.job_id, "b");

        assert!(db.lease_next("worker-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn complete_sets_status_and_output_url() {
        let db = JobDb::open_memory().await.unwrap();
        db.enqueue(&JobRecord::new(request("job-done")))
            .await
            .unwrap();
        db.lease_next("w").await.unwrap();
        db.complete(&"job-done".to_string(), "https://storage.example.com/out.mp4")
            .await
            .unwrap();
        let rec = db.get(&"job-done".to_string()).await.unwrap().unwrap();
        assert_eq!(rec.status, JobStatus::Completed);
        assert_eq!(rec.progress, 100);
    }

    #[tokio::test]
    async fn cancel_queued_job_marks_cancelled() {
        let db = JobDb::open_memory().await.unwrap();
        db.enqueue(&JobRecord::new(request("job-x"))).await.unwrap();
        let cancelled = db.cancel(&"job-x".to_string()).await.unwrap();
        assert!(cancelled);
        let rec = db.get(&"job-x".to_string()).await.unwrap().unwrap();
        assert_eq!(rec.status, JobStatus::Cancelled);
    }

    #[tokio::test]
    async fn cancel_of_terminal_job_is_noop() {
        let db = JobDb::open_memory().await.unwrap();
        db.enqueue(&JobRecord::new(request("job-y"))).await.unwrap();
        db.complete(&"job-y".to_string(), "url").await.unwrap();
        let cancelled = db.cancel(&"job-y".to_string()).await.unwrap();
        assert!(!cancelled);
    }

    #[tokio::test]
    async fn status_counts_reflect_queue_state() {
        let db = JobDb::open_memory().await.unwrap();
        db.enqueue(&JobRecord::new(request("a"))).await.unwrap();
        db.enqueue(&JobRecord::new(request("b"))).await.unwrap();
        db.lease_next("w").await.unwrap();
        let counts = db.status_counts().await.unwrap();
        assert_eq!(counts.get(&JobStatus::Queued).copied(), Some(1));
        assert_eq!(counts.get(&JobStatus::Processing).copied(), Some(1));
    }
}
