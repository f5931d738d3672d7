//! Render Worker: drives one segment through a headless renderer and a
//! Streaming Encoder, pacing frame capture against the Backpressure
//! Governor and publishing progress to the Progress Store as it goes.
//!
//! One producer task captures frames; one consumer task drains them into
//! the encoder. They share nothing but the `FrameQueue` between them.

use crate::backpressure::BackpressureGovernor;
use crate::encoder::StreamingEncoder;
use crate::error::RenderError;
use crate::frame_queue::{Frame, FrameQueue};
use crate::model::{JobId, WorkerState, WorkerStatus};
use crate::progress_store::ProgressStore;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Renders video frames for a time window. The concrete headless renderer
/// (loading the source video, compositing subtitle overlays, seeking) is
/// external; this trait is the seam the Render Worker drives it through.
#[async_trait::async_trait]
pub trait FrameRenderer: Send {
    /// Render the frame at time `t` (seconds) into an encoded still image
    /// at the renderer's configured resolution.
    async fn capture(&mut self, t: f64) -> Result<Vec<u8>, RenderError>;
}

#[async_trait::async_trait]
impl FrameRenderer for Box<dyn FrameRenderer> {
    async fn capture(&mut self, t: f64) -> Result<Vec<u8>, RenderError> {
        (**self).capture(t).await
    }
}

/// Minimal 1x1 black PNG. The encoder's scale filter stretches whatever it
/// is handed to the configured resolution, so this is a valid (if useless)
/// frame source.
const BLANK_FRAME_PNG: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44, 0x52,
    0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x02, 0x00, 0x00, 0x00, 0x90, 0x77, 0x53,
    0xDE, 0x00, 0x00, 0x00, 0x0C, 0x49, 0x44, 0x41, 0x54, 0x08, 0xD7, 0x63, 0xF8, 0xCF, 0xC0, 0x00,
    0x00, 0x00, 0x03, 0x00, 0x01, 0x73, 0x75, 0x01, 0x18, 0x00, 0x00, 0x00, 0x00, 0x49, 0x45, 0x4E,
    0x44, 0xAE, 0x42, 0x60, 0x82,
];

/// Stand-in `FrameRenderer` for wiring up a Coordinator without a headless
/// compositor attached: hands back a blank frame for every timestamp. The
/// actual renderer (loading source video, compositing cues, seeking) lives
/// outside this crate.
pub struct NullFrameRenderer;

#[async_trait::async_trait]
impl FrameRenderer for NullFrameRenderer {
    async fn capture(&mut self, _t: f64) -> Result<Vec<u8>, RenderError> {
        Ok(BLANK_FRAME_PNG.to_vec())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RenderWorkerConfig {
    pub progress_publish_every: u32,
    pub reclaim_light_every: u32,
    pub reclaim_aggressive_every: u32,
    pub max_drop_rate: f32,
}

impl Default for RenderWorkerConfig {
    fn default() -> Self {
        Self {
            progress_publish_every: 30,
            reclaim_light_every: 100,
            reclaim_aggressive_every: 300,
            max_drop_rate: 0.10,
        }
    }
}

/// Lets the producer hand its failure cause to the consumer, which is the
/// side that owns the error path back to the coordinator.
struct SegmentFault {
    token: CancellationToken,
    cause: Mutex<Option<RenderError>>,
}

impl SegmentFault {
    fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            cause: Mutex::new(None),
        }
    }

    fn raise(&self, err: RenderError) {
        *self.cause.lock().unwrap() = Some(err);
        self.token.cancel();
    }

    fn take(&self) -> Option<RenderError> {
        self.cause.lock().unwrap().take()
    }
}

fn worker_progress_percent(processed: u64, frame_count: u64) -> u8 {
    if frame_count == 0 {
        100
    } else {
        ((processed * 100) / frame_count).min(100) as u8
    }
}

async fn publish_worker_progress(
    store: &dyn ProgressStore,
    job_id: &JobId,
    worker_id: usize,
    processed: u64,
    frame_count: u64,
) {
    let status = WorkerStatus {
        worker_id,
        status: WorkerState::Processing,
        progress: worker_progress_percent(processed, frame_count),
        updated_at: chrono::Utc::now(),
    };
    if let Err(e) = store.put_worker_status(job_id, &status).await {
        tracing::warn!(job_id = %job_id, worker_id, error = %e, "failed to publish worker progress");
    }
}

async fn run_producer(
    mut renderer: impl FrameRenderer,
    queue: Arc<FrameQueue>,
    governor: Arc<BackpressureGovernor>,
    fps: f64,
    frame_count: u64,
    start_secs: f64,
    job_cancel: CancellationToken,
    fault: Arc<SegmentFault>,
) {
    for i in 0..frame_count {
        if job_cancel.is_cancelled() || fault.token.is_cancelled() {
            return;
        }

        let slowdown = governor.slowdown_factor();
        if slowdown > 1.0 {
            tokio::time::sleep(Duration::from_secs_f32(0.033 * (slowdown - 1.0))).await;
        }

        let t = start_secs + (i as f64) / fps;
        match renderer.capture(t).await {
            Ok(bytes) => queue.push(Frame {
                index: i,
                pts_secs: t,
                bytes,
            }),
            Err(e) => {
                fault.raise(e);
                return;
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_consumer(
    mut encoder: StreamingEncoder,
    queue: Arc<FrameQueue>,
    governor: Arc<BackpressureGovernor>,
    progress_store: Arc<dyn ProgressStore>,
    job_id: JobId,
    worker_id: usize,
    frame_count: u64,
    job_cancel: CancellationToken,
    fault: Arc<SegmentFault>,
    config: RenderWorkerConfig,
) -> Result<(PathBuf, u64), RenderError> {
    let mut processed: u64 = 0;
    let progress_every = config.progress_publish_every.max(1) as u64;
    let aggressive_every = config.reclaim_aggressive_every.max(1) as u64;

    while processed < frame_count {
        if job_cancel.is_cancelled() {
            encoder.abort().await;
            return Err(RenderError::Cancelled);
        }
        if fault.token.is_cancelled() {
            encoder.abort().await;
            return Err(fault.take().unwrap_or(RenderError::Cancelled));
        }

        let Some(frame) = queue.pop().await else {
            continue;
        };

        if let Err(e) = encoder.write_frame(&frame.bytes).await {
            encoder.abort().await;
            return Err(e);
        }
        // Frame buffer is dropped here: the light memory-reclaim pass named
        // in the design is exactly this, made eager rather than left to
        // scope exit timing.
        drop(frame);
        processed += 1;

        let stats = queue.stats();
        if stats.drop_rate() > config.max_drop_rate {
            encoder.abort().await;
            return Err(RenderError::ResourceExhausted {
                drop_rate: stats.drop_rate(),
            });
        }

        if processed % progress_every == 0 {
            publish_worker_progress(&*progress_store, &job_id, worker_id, processed, frame_count).await;
        }
        if processed % aggressive_every == 0 {
            publish_worker_progress(&*progress_store, &job_id, worker_id, processed, frame_count).await;
            governor.sample();
        }
    }

    encoder.finalize().await.map(|path| (path, processed))
}

/// Run one segment end to end. Cancellable via `job_cancel` (the
/// coordinator's per-job child token); segment-internal failures in either
/// the producer or consumer side surface through the returned `Result`.
#[allow(clippy::too_many_arguments)]
pub async fn run_segment(
    job_id: &JobId,
    worker_id: usize,
    renderer: impl FrameRenderer,
    encoder: StreamingEncoder,
    fps: f64,
    frame_count: u64,
    start_secs: f64,
    governor: Arc<BackpressureGovernor>,
    progress_store: Arc<dyn ProgressStore>,
    job_cancel: CancellationToken,
    config: RenderWorkerConfig,
    queue_capacity: usize,
    queue_byte_budget: u64,
) -> Result<(PathBuf, u64), RenderError> {
    let queue = Arc::new(FrameQueue::new(queue_capacity, queue_byte_budget));
    let fault = Arc::new(SegmentFault::new());

    let producer = run_producer(
        renderer,
        queue.clone(),
        governor.clone(),
        fps,
        frame_count,
        start_secs,
        job_cancel.clone(),
        fault.clone(),
    );
    let consumer = run_consumer(
        encoder,
        queue,
        governor,
        progress_store,
        job_id.clone(),
        worker_id,
        frame_count,
        job_cancel,
        fault,
        config,
    );

    let (_, consumer_result) = tokio::join!(producer, consumer);
    consumer_result
}
