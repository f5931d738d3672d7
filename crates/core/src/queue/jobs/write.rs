//! Job queue write operations: enqueue, lease, complete, fail, cancel.

use anyhow::Result;
use sqlx::Row;

use super::super::db::{unix_timestamp, JobDb};
use crate::model::{JobId, JobRecord, JobStatus};

impl JobDb {
    pub async fn enqueue(&self, record: &JobRecord) -> Result<()> {
        let now = unix_timestamp();
        let request_json = serde_json::to_string(record)?;
        sqlx::query(
            r#"
            INSERT INTO jobs (id, request_json, status, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&record.job_id)
        .bind(request_json)
        .bind(JobStatus::Queued.as_str())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Atomically claim the oldest queued job (FIFO by `created_at`), marking
    /// it `processing`. Returns `None` if the queue is empty. Races between
    /// concurrent workers are resolved by the surrounding transaction: only
    /// one `UPDATE` commits the claim.
    pub async fn lease_next(&self, leased_by: &str) -> Result<Option<JobRecord>> {
        let now = unix_timestamp();
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query(
            r#"
            SELECT id, request_json FROM jobs
            WHERE status = 'queued'
            ORDER BY created_at ASC, id ASC
            LIMIT 1
            "#,
        )
        .fetch_optional(&mut *tx)
        .await?;
        let Some(row) = row else {
            tx.commit().await?;
            return Ok(None);
        };
        let id: String = row.get("id");
        let request_json: String = row.get("request_json");
        let mut record: JobRecord = serde_json::from_str(&request_json)?;
        record.status = JobStatus::Processing;
        record.started_at = Some(chrono::Utc::now());
        let updated_json = serde_json::to_string(&record)?;

        sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'processing', request_json = ?1,
                leased_by = ?2, leased_at = ?3, updated_at = ?4
            WHERE id = ?5 AND status = 'queued'
            "#,
        )
        .bind(updated_json)
        .bind(leased_by)
        .bind(now)
        .bind(now)
        .bind(&id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(Some(record))
    }

    pub async fn complete(&self, job_id: &JobId, output_url: &str) -> Result<()> {
        self.finish(job_id, JobStatus::Completed, None, None, Some(output_url))
            .await
    }

    pub async fn fail(&self, job_id: &JobId, error_kind: &str, error_message: &str) -> Result<()> {
        self.finish(
            job_id,
            JobStatus::Failed,
            Some(error_kind),
            Some(error_message),
            None,
        )
        .await
    }

    pub async fn cancel(&self, job_id: &JobId) -> Result<bool> {
        let record = self.get(job_id).await?;
        let Some(record) = record else {
            return Ok(false);
        };
        if record.status.is_terminal() {
            return Ok(false);
        }
        self.finish(job_id, JobStatus::Cancelled, None, None, None)
            .await?;
        Ok(true)
    }

    async fn finish(
        &self,
        job_id: &JobId,
        status: JobStatus,
        error_kind: Option<&str>,
        error_message: Option<&str>,
        output_url: Option<&str>,
    ) -> Result<()> {
        let now = unix_timestamp();
        let mut record = match self.get(job_id).await? {
            Some(r) => r,
            None => return Ok(()),
        };
        record.status = status;
        record.error_kind = error_kind.map(str::to_string);
        record.error_message = error_message.map(str::to_string);
        record.completed_at = Some(chrono::Utc::now());
        if status == JobStatus::Completed {
            record.progress = 100;
        }
        let request_json = serde_json::to_string(&record)?;

        sqlx::query(
            r#"
            UPDATE jobs
            SET status = ?1, request_json = ?2, error_code = ?3,
                error_message = ?4, output_url = ?5, updated_at = ?6
            WHERE id = ?7
            "#,
        )
        .bind(status.as_str())
        .bind(request_json)
        .bind(error_kind)
        .bind(error_message)
        .bind(output_url)
        .bind(now)
        .bind(job_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Requeue jobs whose lease has expired without completing (worker died
    /// mid-render). Returns the number of jobs requeued.
    pub async fn sweep_expired_leases(&self, lease_timeout_secs: i64) -> Result<u64> {
        let cutoff = unix_timestamp() - lease_timeout_secs;
        let r = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'queued', leased_by = NULL, leased_at = NULL, updated_at = ?1
            WHERE status = 'processing' AND leased_at < ?2
            "#,
        )
        .bind(unix_timestamp())
        .bind(cutoff)
        .execute(&self.pool)
        .await?;
        Ok(r.rows_affected())
    }
}
