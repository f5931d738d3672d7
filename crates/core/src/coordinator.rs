//! Job Coordinator: owns one leased job's lifecycle end to end —
//! validate, plan, fan out to Render Workers, collect, merge, and report.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::backpressure::BackpressureGovernor;
use crate::callback::CallbackEmitter;
use crate::config::RenderConfig;
use crate::control::JobControl;
use crate::encoder::{EncodeSettings, StreamingEncoder};
use crate::error::RenderError;
use crate::merger::{self, MergeResult};
use crate::model::{JobId, JobRecord, JobStatus, Segment, SegmentStatus};
use crate::planner::plan_segments;
use crate::progress_store::ProgressStore;
use crate::queue::JobDb;
use crate::render_worker::{self, FrameRenderer, RenderWorkerConfig};
use crate::retry::{ErrorKind, RetryDecision, RetryPolicy};
use crate::worker_pool::WorkerPool;

/// Builds a per-segment frame source. The headless renderer itself is an
/// external capability; the coordinator only needs something that can
/// produce one for a given segment's time window.
pub type RendererFactory = Arc<dyn Fn(&Segment) -> Box<dyn FrameRenderer> + Send + Sync>;

/// Phase constants for overall job progress (§4.10 aggregation formula).
const PROGRESS_BEFORE_RENDER: u8 = 20;
const PROGRESS_RENDER_SPAN: u8 = 60;
const PROGRESS_MERGE_START: u8 = 80;
const PROGRESS_MERGE_END: u8 = 90;
const PROGRESS_UPLOAD_END: u8 = 100;

fn render_progress(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return PROGRESS_BEFORE_RENDER;
    }
    PROGRESS_BEFORE_RENDER + ((PROGRESS_RENDER_SPAN as usize * completed) / total) as u8
}

pub struct JobCoordinator {
    db: JobDb,
    store: Arc<dyn ProgressStore>,
    pool: Arc<WorkerPool>,
    control: Arc<JobControl>,
    governor: Arc<BackpressureGovernor>,
    callbacks: Arc<CallbackEmitter>,
    config: RenderConfig,
    renderer_factory: RendererFactory,
}

impl JobCoordinator {
    pub fn new(
        db: JobDb,
        store: Arc<dyn ProgressStore>,
        control: Arc<JobControl>,
        config: RenderConfig,
        renderer_factory: RendererFactory,
    ) -> Self {
        let pool = Arc::new(WorkerPool::new(config.worker_pool_size));
        let governor = Arc::new(BackpressureGovernor::new(
            config.mem_threshold_bytes,
            config.cpu_threshold_percent,
        ));
        let callbacks = Arc::new(CallbackEmitter::new(
            config.callback_timeout_secs,
            config.callback_retry_count,
        ));
        Self {
            db,
            store,
            pool,
            control,
            governor,
            callbacks,
            config,
            renderer_factory,
        }
    }

    /// Validate a leased job's inputs and compute the render duration
    /// (§4.10 step 1).
    fn validate(record: &JobRecord) -> Result<f64, RenderError> {
        if record.video_url.trim().is_empty() {
            return Err(RenderError::InvalidInput("videoUrl is empty".into()));
        }
        if record.options.width == 0 || record.options.height == 0 {
            return Err(RenderError::InvalidInput("width/height must be non-zero".into()));
        }
        if record.options.fps <= 0.0 {
            return Err(RenderError::InvalidInput("fps must be positive".into()));
        }
        Ok(record.scenario.duration_secs())
    }

    fn job_temp_dir(&self, job_id: &JobId) -> PathBuf {
        self.config.temp_dir.join(job_id)
    }

    /// Drive one leased job to a terminal state, updating the Queue,
    /// Progress Store, and caller callbacks along the way. Returns once the
    /// job has reached `completed`, `failed`, or `cancelled`.
    pub async fn run_job(&self, mut record: JobRecord) {
        let job_id = record.job_id.clone();
        let span = tracing::info_span!("job", job_id = %job_id);
        let _enter = span.enter();

        let job_cancel = self.control.register(&job_id);

        let outcome = self.run_job_inner(&mut record, job_cancel.clone()).await;
        self.control.unregister(&job_id);

        match outcome {
            Ok(result) => {
                let _ = self.db.complete(&job_id, &result.output_path.to_string_lossy()).await;
                self.publish_job_status(&record, JobStatus::Completed, 100, None, None).await;
                self.callbacks
                    .send_completion(
                        &record.callback_url,
                        &job_id,
                        &result.output_path.to_string_lossy(),
                        result.file_size,
                        result.duration,
                    )
                    .await;
            }
            Err(e) if job_cancel.is_cancelled() || matches!(e, RenderError::Cancelled) => {
                let _ = self.db.cancel(&job_id).await;
                self.publish_job_status(&record, JobStatus::Cancelled, record.progress, Some("Cancelled"), Some("job cancelled")).await;
                self.callbacks
                    .send_error(&record.callback_url, &job_id, JobStatus::Cancelled.as_str(), "Cancelled", "job cancelled")
                    .await;
            }
            Err(e) => {
                let code = e.code();
                let message = e.to_string();
                let _ = self.db.fail(&job_id, code, &message).await;
                self.publish_job_status(&record, JobStatus::Failed, record.progress, Some(code), Some(&message)).await;
                self.callbacks
                    .send_error(&record.callback_url, &job_id, JobStatus::Failed.as_str(), code, &message)
                    .await;
                tracing::error!(error = %message, code, "job failed");
            }
        }
    }

    async fn run_job_inner(
        &self,
        record: &mut JobRecord,
        job_cancel: CancellationToken,
    ) -> Result<MergeResult, RenderError> {
        let duration = Self::validate(record)?;
        record.status = JobStatus::Processing;
        record.started_at = Some(chrono::Utc::now());
        self.publish_job_status(record, JobStatus::Processing, 0, None, None).await;

        let worker_count = self.config.worker_pool_size;
        let mut segments = plan_segments(&record.scenario, duration, worker_count, record.options.fps);

        let temp_dir = self.job_temp_dir(&record.job_id);
        tokio::fs::create_dir_all(&temp_dir)
            .await
            .map_err(|e| RenderError::Internal(format!("creating temp dir: {e}")))?;

        let total = segments.len();
        let mut join_set: JoinSet<(usize, Result<Segment, RenderError>)> = JoinSet::new();

        for segment in segments.drain(..) {
            let idx = segment.index;
            let job_id = record.job_id.clone();
            let options = record.options;
            let pool = self.pool.clone();
            let governor = self.governor.clone();
            let store = self.store.clone();
            let config = self.config.clone();
            let renderer_factory = self.renderer_factory.clone();
            let job_cancel = job_cancel.clone();
            let temp_dir = temp_dir.clone();

            join_set.spawn(async move {
                let result = render_segment_with_retry(
                    segment,
                    &job_id,
                    options,
                    &pool,
                    &governor,
                    store,
                    &config,
                    &renderer_factory,
                    job_cancel,
                    &temp_dir,
                )
                .await;
                (idx, result)
            });
        }

        let mut completed_segments: Vec<Segment> = Vec::with_capacity(total);
        let mut failed_segments: Vec<Segment> = Vec::new();

        // Segments fail independently: one permanent failure does not cancel
        // its siblings, so a minority of failures can still be recovered by
        // the merger's partial-merge path below.
        while let Some(joined) = join_set.join_next().await {
            let (idx, result) = joined.map_err(|e| RenderError::Internal(format!("worker task panicked: {e}")))?;
            match result {
                Ok(segment) => {
                    completed_segments.push(segment);
                    record.progress = render_progress(completed_segments.len(), total);
                    self.publish_job_status(record, JobStatus::Processing, record.progress, None, None).await;
                }
                Err(e) => {
                    tracing::warn!(job_id = %record.job_id, segment = idx, error = %e, "segment failed permanently");
                    failed_segments.push(Segment {
                        index: idx,
                        worker_id: idx,
                        start: 0.0,
                        end: 0.0,
                        cues: vec![],
                        estimated_frames: 0,
                        complexity: 0.0,
                        status: SegmentStatus::Failed,
                        output_path: None,
                        file_size: 0,
                        frames_processed: 0,
                    });
                }
            }
        }

        record.progress = PROGRESS_MERGE_START;
        self.publish_job_status(record, JobStatus::Processing, record.progress, None, None).await;

        let mut all_segments = completed_segments.clone();
        all_segments.extend(failed_segments);
        all_segments.sort_by_key(|s| s.index);

        let manifest_path = temp_dir.join("concat.txt");
        let output_path = temp_dir.join("final.mp4");
        let merge_result = merger::merge_segments(
            &self.config.ffmpeg_path,
            &all_segments,
            &manifest_path,
            &output_path,
            true,
        )
        .await?;
        merger::cleanup_segment_files(&completed_segments);

        record.progress = PROGRESS_MERGE_END;
        self.publish_job_status(record, JobStatus::Processing, record.progress, None, None).await;

        // Upload is out of scope; the coordinator's job is done once the
        // artifact exists locally. Progress advances straight to 100.
        record.progress = PROGRESS_UPLOAD_END;
        self.publish_job_status(record, JobStatus::Processing, record.progress, None, None).await;

        Ok(merge_result)
    }

    async fn publish_job_status(
        &self,
        record: &JobRecord,
        status: JobStatus,
        progress: u8,
        error_kind: Option<&str>,
        error_message: Option<&str>,
    ) {
        let mut snapshot = record.clone();
        snapshot.status = status;
        snapshot.progress = progress;
        snapshot.error_kind = error_kind.map(str::to_string);
        snapshot.error_message = error_message.map(str::to_string);
        if status.is_terminal() {
            snapshot.completed_at = Some(chrono::Utc::now());
        }
        if let Err(e) = self.store.put_job(&snapshot).await {
            tracing::warn!(job_id = %record.job_id, error = %e, "failed to publish job status");
        }
    }

    /// Request cancellation for a running job. No-op if the job is not
    /// currently owned by this coordinator instance.
    pub fn cancel(&self, job_id: &str) -> bool {
        self.control.request_cancel(job_id)
    }
}

#[allow(clippy::too_many_arguments)]
async fn render_segment_with_retry(
    segment: Segment,
    job_id: &JobId,
    options: crate::model::RenderOptions,
    pool: &WorkerPool,
    governor: &Arc<BackpressureGovernor>,
    store: Arc<dyn ProgressStore>,
    config: &RenderConfig,
    renderer_factory: &RendererFactory,
    job_cancel: CancellationToken,
    temp_dir: &std::path::Path,
) -> Result<Segment, RenderError> {
    let policy = RetryPolicy {
        max_attempts: config.max_segment_retries + 1,
        base_delay: Duration::from_secs(2),
        max_delay: Duration::from_secs(8),
    };

    let output_path = temp_dir.join(format!("segment_{}.mp4", segment.worker_id));
    let worker_config = RenderWorkerConfig {
        progress_publish_every: config.progress_publish_every_n_frames,
        reclaim_light_every: config.memory_reclaim_light_every_n_frames,
        reclaim_aggressive_every: config.memory_reclaim_aggressive_every_n_frames,
        max_drop_rate: config.max_drop_rate,
    };
    let frame_count = segment.estimated_frames.max(1);
    let settings = EncodeSettings {
        width: options.width,
        height: options.height,
        fps: options.fps,
        quality: options.quality,
    };

    let mut attempt = 1u32;
    let render_result: Result<(PathBuf, u64), RenderError> = loop {
        let attempt_result = render_one_segment_attempt(
            &segment,
            job_id,
            pool,
            governor,
            store.clone(),
            config,
            renderer_factory,
            job_cancel.clone(),
            &output_path,
            settings,
            frame_count,
            worker_config,
        )
        .await;

        let Err(e) = &attempt_result else {
            break attempt_result;
        };
        let kind = if e.is_segment_retryable() {
            ErrorKind::Connection
        } else {
            ErrorKind::Other
        };
        match policy.decide(attempt, kind) {
            RetryDecision::NoRetry => break attempt_result,
            RetryDecision::RetryAfter(delay) => {
                tracing::warn!(job_id = %job_id, segment = segment.index, attempt, error = %e, "retrying segment");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    };

    let (path, frames_processed) = render_result?;
    let file_size = tokio::fs::metadata(&path).await.map(|m| m.len()).unwrap_or(0);

    Ok(Segment {
        status: SegmentStatus::Completed,
        output_path: Some(path),
        file_size,
        frames_processed,
        ..segment
    })
}

/// One attempt at rendering `segment`: acquire a worker slot, start a fresh
/// encoder process, and drive it to completion. A fresh encoder per
/// attempt matches the "non-retryable within a segment" contract for
/// `EncodeFailure` — the retry is at this level, not inside the encoder.
#[allow(clippy::too_many_arguments)]
async fn render_one_segment_attempt(
    segment: &Segment,
    job_id: &JobId,
    pool: &WorkerPool,
    governor: &Arc<BackpressureGovernor>,
    store: Arc<dyn ProgressStore>,
    config: &RenderConfig,
    renderer_factory: &RendererFactory,
    job_cancel: CancellationToken,
    output_path: &std::path::Path,
    settings: EncodeSettings,
    frame_count: u64,
    worker_config: RenderWorkerConfig,
) -> Result<(PathBuf, u64), RenderError> {
    if job_cancel.is_cancelled() {
        return Err(RenderError::Cancelled);
    }

    let slot = pool
        .acquire(job_id, Duration::from_secs(config.lease_timeout_secs))
        .await
        .ok_or(RenderError::Timeout)?;

    let encoder = StreamingEncoder::start(&config.ffmpeg_path, output_path, settings, config.use_gpu_encoding).await?;
    let renderer = (renderer_factory)(segment);
    let worker_id = slot.worker_id;

    let result = render_worker::run_segment(
        job_id,
        worker_id,
        renderer,
        encoder,
        settings.fps,
        frame_count,
        segment.start,
        governor.clone(),
        store,
        job_cancel,
        worker_config,
        config.frame_queue_capacity,
        config.frame_queue_byte_budget,
    )
    .await;
    drop(slot);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_progress_spans_20_to_80() {
        assert_eq!(render_progress(0, 4), 20);
        assert_eq!(render_progress(2, 4), 50);
        assert_eq!(render_progress(4, 4), 80);
    }

    #[test]
    fn render_progress_handles_zero_total() {
        assert_eq!(render_progress(0, 0), 20);
    }
}
