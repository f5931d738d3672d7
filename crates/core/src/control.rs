//! Job cancellation: shared registry of job id -> `CancellationToken`.
//!
//! The Job Coordinator registers a token when a job starts rendering; each
//! worker task holds a `child_token()` derived from it, so cancelling the
//! parent token cancels every in-flight segment task without a broadcast
//! channel or polling loop.

use std::collections::HashMap;
use std::sync::RwLock;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
pub struct JobControl {
    jobs: RwLock<HashMap<String, CancellationToken>>,
}

impl JobControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a running job, returning its cancellation token. Call once
    /// when the Job Coordinator begins rendering a job.
    pub fn register(&self, job_id: &str) -> CancellationToken {
        let token = CancellationToken::new();
        self.jobs
            .write()
            .unwrap()
            .insert(job_id.to_string(), token.clone());
        token
    }

    /// Derive a child token for a worker task. Returns `None` if the job is
    /// not (or no longer) registered.
    pub fn child_token(&self, job_id: &str) -> Option<CancellationToken> {
        self.jobs
            .read()
            .unwrap()
            .get(job_id)
            .map(|t| t.child_token())
    }

    /// Unregister a job (call when it reaches a terminal status).
    pub fn unregister(&self, job_id: &str) {
        self.jobs.write().unwrap().remove(job_id);
    }

    /// Request cancellation for a job. Cancels the parent token and every
    /// child token derived from it.
    pub fn request_cancel(&self, job_id: &str) -> bool {
        match self.jobs.read().unwrap().get(job_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_cancelled(&self, job_id: &str) -> bool {
        self.jobs
            .read()
            .unwrap()
            .get(job_id)
            .map(|t| t.is_cancelled())
            .unwrap_or(false)
    }
}
