//! Bounded single-producer/single-consumer frame queue with a byte budget
//! and a head-drop policy under pressure.
//!
//! One Render Worker owns one queue: a capture task pushes, a paired encode
//! task pops. The two tasks never share mutable state beyond this queue.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Notify;

#[derive(Debug, Clone)]
pub struct Frame {
    pub index: u64,
    pub pts_secs: f64,
    pub bytes: Vec<u8>,
}

impl Frame {
    pub fn byte_size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DropStats {
    pub dropped: u64,
    pub processed: u64,
}

impl DropStats {
    pub fn drop_rate(&self) -> f32 {
        let total = self.dropped + self.processed;
        if total == 0 {
            0.0
        } else {
            self.dropped as f32 / total as f32
        }
    }
}

struct Inner {
    items: VecDeque<Frame>,
    capacity: usize,
    byte_budget: u64,
    bytes_used: u64,
    stats: DropStats,
}

/// Bounded frame queue. `Push` never blocks; under pressure it drops either
/// the incoming frame (byte budget exceeded) or the oldest queued frame
/// (element cap reached, budget still has room).
pub struct FrameQueue {
    inner: Mutex<Inner>,
    notify: Notify,
}

impl FrameQueue {
    pub fn new(capacity: usize, byte_budget: u64) -> Self {
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::with_capacity(capacity),
                capacity,
                byte_budget,
                bytes_used: 0,
                stats: DropStats::default(),
            }),
            notify: Notify::new(),
        }
    }

    /// Resize the element-count cap (Backpressure Governor suggestion).
    /// Shrinking below the current length does not evict; it only lowers
    /// the threshold for future admits.
    pub fn resize_capacity(&self, new_capacity: usize) {
        self.inner.lock().unwrap().capacity = new_capacity;
    }

    pub fn push(&self, frame: Frame) {
        let mut inner = self.inner.lock().unwrap();
        let size = frame.byte_size();

        if inner.bytes_used + size > inner.byte_budget {
            inner.stats.dropped += 1;
            return;
        }

        if inner.items.len() >= inner.capacity {
            if let Some(old) = inner.items.pop_front() {
                inner.bytes_used = inner.bytes_used.saturating_sub(old.byte_size());
                inner.stats.dropped += 1;
            }
        }

        inner.bytes_used += size;
        inner.items.push_back(frame);
        drop(inner);
        self.notify.notify_one();
    }

    /// Pops the oldest frame, waiting up to 1s for one to arrive.
    pub async fn pop(&self) -> Option<Frame> {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
        loop {
            {
                let mut inner = self.inner.lock().unwrap();
                if let Some(frame) = inner.items.pop_front() {
                    inner.bytes_used = inner.bytes_used.saturating_sub(frame.byte_size());
                    inner.stats.processed += 1;
                    return Some(frame);
                }
            }
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return None;
            }
            tokio::select! {
                _ = self.notify.notified() => {}
                _ = tokio::time::sleep(remaining) => return None,
            }
        }
    }

    pub fn stats(&self) -> DropStats {
        self.inner.lock().unwrap().stats
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn bytes_used(&self) -> u64 {
        self.inner.lock().unwrap().bytes_used
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(index: u64, size: usize) -> Frame {
        Frame {
            index,
            pts_secs: index as f64 / 30.0,
            bytes: vec![0u8; size],
        }
    }

    #[test]
    fn push_then_len_and_bytes_used_track() {
        let q = FrameQueue::new(4, 1024);
        q.push(frame(0, 100));
        q.push(frame(1, 100));
        assert_eq!(q.len(), 2);
        assert_eq!(q.bytes_used(), 200);
    }

    #[test]
    fn byte_budget_exceeded_drops_new_frame() {
        let q = FrameQueue::new(4, 150);
        q.push(frame(0, 100));
        q.push(frame(1, 100)); // would exceed 150 -> dropped
        assert_eq!(q.len(), 1);
        assert_eq!(q.stats().dropped, 1);
    }

    #[test]
    fn capacity_exceeded_drops_oldest() {
        let q = FrameQueue::new(2, 1_000_000);
        q.push(frame(0, 10));
        q.push(frame(1, 10));
        q.push(frame(2, 10)); // capacity 2: drop frame 0, admit frame 2
        assert_eq!(q.len(), 2);
        assert_eq!(q.stats().dropped, 1);
    }

    #[tokio::test]
    async fn pop_returns_frames_in_fifo_order() {
        let q = FrameQueue::new(4, 1_000_000);
        q.push(frame(0, 10));
        q.push(frame(1, 10));
        let a = q.pop().await.unwrap();
        let b = q.pop().await.unwrap();
        assert_eq!(a.index, 0);
        assert_eq!(b.index, 1);
        assert_eq!(q.stats().processed, 2);
    }

    #[tokio::test]
    async fn pop_times_out_on_empty_queue() {
        let q = FrameQueue::new(4, 1_000_000);
        let start = tokio::time::Instant::now();
        let result = q.pop().await;
        assert!(result.is_none());
        assert!(start.elapsed() >= Duration::from_millis(900));
    }

    #[test]
    fn drop_rate_reflects_dropped_and_processed() {
        let stats = DropStats {
            dropped: 1,
            processed: 9,
        };
        assert!((stats.drop_rate() - 0.1).abs() < 1e-6);
    }
}
