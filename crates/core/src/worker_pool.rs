//! Worker Pool: a fixed set of render worker slots. The renderer each slot
//! drives is out of scope here; this module only tracks acquisition,
//! release, and per-slot transient state between segments.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};

#[derive(Debug, Clone)]
pub struct SlotStatus {
    pub worker_id: usize,
    pub busy: bool,
    pub current_job: Option<String>,
}

struct Slots {
    states: Vec<SlotStatus>,
}

/// A pool of `pool_size` worker slots. `acquire` blocks (with a timeout)
/// until a slot is free; the guard releases it automatically on drop.
pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    slots: Arc<Mutex<Slots>>,
    pool_size: usize,
}

impl WorkerPool {
    pub fn new(pool_size: usize) -> Self {
        let states = (0..pool_size)
            .map(|worker_id| SlotStatus {
                worker_id,
                busy: false,
                current_job: None,
            })
            .collect();
        Self {
            semaphore: Arc::new(Semaphore::new(pool_size)),
            slots: Arc::new(Mutex::new(Slots { states })),
            pool_size,
        }
    }

    /// Acquire a free slot, waiting up to `timeout`. Returns `None` on
    /// timeout so the caller can fail the segment with a clear reason
    /// rather than hang indefinitely.
    pub async fn acquire(&self, job_id: &str, timeout: Duration) -> Option<WorkerSlot> {
        let permit = tokio::time::timeout(timeout, self.semaphore.clone().acquire_owned())
            .await
            .ok()?
            .ok()?;

        let worker_id = {
            let mut slots = self.slots.lock().await;
            let slot = slots
                .states
                .iter_mut()
                .find(|s| !s.busy)
                .expect("semaphore guarantees a free slot");
            slot.busy = true;
            slot.current_job = Some(job_id.to_string());
            slot.worker_id
        };

        Some(WorkerSlot {
            worker_id,
            slots: self.slots.clone(),
            _permit: permit,
        })
    }

    pub async fn status(&self) -> Vec<SlotStatus> {
        self.slots.lock().await.states.clone()
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }
}

/// RAII handle to an acquired slot. Clears the slot's transient state and
/// returns the permit to the pool when dropped.
pub struct WorkerSlot {
    pub worker_id: usize,
    slots: Arc<Mutex<Slots>>,
    _permit: tokio::sync::OwnedSemaphorePermit,
}

impl Drop for WorkerSlot {
    fn drop(&mut self) {
        let slots = self.slots.clone();
        let worker_id = self.worker_id;
        tokio::spawn(async move {
            let mut slots = slots.lock().await;
            if let Some(slot) = slots.states.iter_mut().find(|s| s.worker_id == worker_id) {
                slot.busy = false;
                slot.current_job = None;
            }
        });
    }
}
