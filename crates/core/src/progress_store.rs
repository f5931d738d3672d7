//! Progress Store: a small key/value store with per-key TTL, backing the
//! `job:{id}` and `worker:{job_id}:{worker_id}` records that callers poll
//! or that feed the Callback Emitter.
//!
//! Two backends share one trait: an in-process map for single-instance
//! deployments and tests, and Redis for anything running more than one
//! Job Coordinator. Selected by `RenderConfig::store_url` (`memory://` or
//! `redis://...`).

use anyhow::Result;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::model::{JobId, JobRecord, WorkerStatus};

const JOB_TTL_SECS: u64 = 86_400;
const WORKER_TTL_SECS: u64 = 600;

fn job_key(job_id: &JobId) -> String {
    format!("job:{job_id}")
}

fn worker_key(job_id: &JobId, worker_id: usize) -> String {
    format!("worker:{job_id}:{worker_id}")
}

#[async_trait]
pub trait ProgressStore: Send + Sync {
    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()>;
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn delete(&self, key: &str) -> Result<()>;

    async fn put_job(&self, record: &JobRecord) -> Result<()> {
        let payload = serde_json::to_string(record)?;
        self.set(&job_key(&record.job_id), &payload, JOB_TTL_SECS)
            .await
    }

    async fn get_job(&self, job_id: &JobId) -> Result<Option<JobRecord>> {
        get_json(self, &job_key(job_id)).await
    }

    async fn put_worker_status(&self, job_id: &JobId, status: &WorkerStatus) -> Result<()> {
        let payload = serde_json::to_string(status)?;
        self.set(&worker_key(job_id, status.worker_id), &payload, WORKER_TTL_SECS)
            .await
    }

    async fn get_worker_status(
        &self,
        job_id: &JobId,
        worker_id: usize,
    ) -> Result<Option<WorkerStatus>> {
        get_json(self, &worker_key(job_id, worker_id)).await
    }
}

async fn get_json<T: DeserializeOwned>(store: &(impl ProgressStore + ?Sized), key: &str) -> Result<Option<T>> {
    match store.get(key).await? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

struct Entry {
    value: String,
    expires_at: Instant,
}

/// Single-process Progress Store backed by a mutex-guarded map. Suitable
/// for `render-core serve --store memory://` and tests; state is lost on
/// restart.
#[derive(Default)]
pub struct InMemoryProgressStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl InMemoryProgressStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProgressStore for InMemoryProgressStore {
    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        let mut entries = self.entries.lock().unwrap();
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + Duration::from_secs(ttl_secs),
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }
}

/// Redis-backed Progress Store, for deployments with more than one
/// Coordinator process sharing job state.
pub struct RedisProgressStore {
    client: redis::Client,
}

impl RedisProgressStore {
    pub fn new(redis_url: &str) -> Result<Self> {
        Ok(Self {
            client: redis::Client::open(redis_url)?,
        })
    }
}

#[async_trait]
impl ProgressStore for RedisProgressStore {
    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        use redis::AsyncCommands;
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.set_ex::<_, _, ()>(key, value, ttl_secs).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        use redis::AsyncCommands;
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        Ok(conn.get(key).await?)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        use redis::AsyncCommands;
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.del::<_, ()>(key).await?;
        Ok(())
    }
}

/// Build the configured backend from `store_url` (`memory://` or
/// `redis://...`).
pub fn open(store_url: &str) -> Result<Box<dyn ProgressStore>> {
    if store_url == "memory://" || store_url.is_empty() {
        Ok(Box::new(InMemoryProgressStore::new()))
    } else {
        Ok(Box::new(RedisProgressStore::new(store_url)?))
    }
}
