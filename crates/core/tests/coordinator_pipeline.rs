//! Integration test: drive a Job Coordinator through a full job lifecycle
//! against the durable queue, an in-memory Progress Store, a placeholder
//! frame renderer, and a stub `ffmpeg` standing in for the real encoder.

use std::os::unix::fs::PermissionsExt;
use std::sync::Arc;

use render_core::config::RenderConfig;
use render_core::control::JobControl;
use render_core::coordinator::{JobCoordinator, RendererFactory};
use render_core::model::{Cue, JobRecord, JobRequest, JobStatus, RenderOptions, Scenario};
use render_core::progress_store;
use render_core::queue::JobDb;
use render_core::render_worker::NullFrameRenderer;

/// Writes a shell script standing in for ffmpeg: it ignores its arguments
/// except the last (always the output path, for both the encode and the
/// concat-merge invocations this crate makes) and writes a stub file there.
fn write_stub_ffmpeg(dir: &std::path::Path) -> std::path::PathBuf {
    let path = dir.join("ffmpeg");
    std::fs::write(
        &path,
        "#!/bin/sh\nfor out in \"$@\"; do :; done\nprintf 'stub output' > \"$out\"\nexit 0\n",
    )
    .unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

fn test_config(temp_dir: &std::path::Path, ffmpeg_path: std::path::PathBuf) -> RenderConfig {
    RenderConfig {
        worker_pool_size: 1,
        max_segment_retries: 0,
        use_gpu_encoding: false,
        store_url: "memory://".to_string(),
        callback_retry_count: 1,
        callback_timeout_secs: 1,
        temp_dir: temp_dir.to_path_buf(),
        ffmpeg_path,
        ..RenderConfig::default()
    }
}

fn short_request(job_id: &str) -> JobRequest {
    JobRequest {
        job_id: job_id.to_string(),
        video_url: "https://example.com/source.mp4".to_string(),
        scenario: Scenario {
            cues: vec![Cue {
                start: 0.0,
                end: 2.0,
                text: "hello".to_string(),
                style: None,
                animation: None,
                emotion: None,
            }],
        },
        options: RenderOptions::default(),
        // Port 1 is never listening; the callback emitter fails fast
        // without depending on outbound network access.
        callback_url: "http://127.0.0.1:1/callback".to_string(),
    }
}

#[tokio::test]
async fn run_job_completes_and_produces_merged_output() {
    let temp_dir = tempfile::tempdir().unwrap();
    let ffmpeg = write_stub_ffmpeg(temp_dir.path());
    let config = test_config(temp_dir.path(), ffmpeg);

    let db = JobDb::open_memory().await.unwrap();
    let store = Arc::from(progress_store::open(&config.store_url).unwrap());
    let control = Arc::new(JobControl::new());
    let renderer_factory: RendererFactory = Arc::new(|_segment| Box::new(NullFrameRenderer));
    let coordinator = JobCoordinator::new(db.clone(), store, control, config, renderer_factory);

    let record = JobRecord::new(short_request("job-pipeline"));
    db.enqueue(&record).await.unwrap();
    let leased = db.lease_next("test-worker").await.unwrap().unwrap();

    coordinator.run_job(leased).await;

    let stored = db.get(&"job-pipeline".to_string()).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Completed);
    assert_eq!(stored.progress, 100);
    assert!(stored.error_kind.is_none());
}

#[tokio::test]
async fn run_job_rejects_empty_video_url_without_touching_ffmpeg() {
    let temp_dir = tempfile::tempdir().unwrap();
    // Deliberately not a valid ffmpeg binary; validation must fail before
    // any subprocess is spawned.
    let config = test_config(temp_dir.path(), temp_dir.path().join("does-not-exist"));

    let db = JobDb::open_memory().await.unwrap();
    let store = Arc::from(progress_store::open(&config.store_url).unwrap());
    let control = Arc::new(JobControl::new());
    let renderer_factory: RendererFactory = Arc::new(|_segment| Box::new(NullFrameRenderer));
    let coordinator = JobCoordinator::new(db.clone(), store, control, config, renderer_factory);

    let mut request = short_request("job-bad-url");
    request.video_url = "   ".to_string();
    let record = JobRecord::new(request);
    db.enqueue(&record).await.unwrap();
    let leased = db.lease_next("test-worker").await.unwrap().unwrap();

    coordinator.run_job(leased).await;

    let stored = db.get(&"job-bad-url".to_string()).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Failed);
    assert_eq!(stored.error_kind.as_deref(), Some("InvalidInput"));
}

#[tokio::test]
async fn cancelling_before_any_segment_starts_reports_cancelled_status() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config = test_config(temp_dir.path(), temp_dir.path().join("does-not-exist"));

    let db = JobDb::open_memory().await.unwrap();
    let store: Arc<dyn render_core::progress_store::ProgressStore> =
        Arc::from(progress_store::open(&config.store_url).unwrap());
    let control = Arc::new(JobControl::new());
    let renderer_factory: RendererFactory = Arc::new(|_segment| Box::new(NullFrameRenderer));
    let coordinator = Arc::new(JobCoordinator::new(
        db.clone(),
        store.clone(),
        control.clone(),
        config,
        renderer_factory,
    ));

    let record = JobRecord::new(short_request("job-cancel"));
    db.enqueue(&record).await.unwrap();
    let leased = db.lease_next("test-worker").await.unwrap().unwrap();

    let job_handle = tokio::spawn({
        let coordinator = coordinator.clone();
        async move { coordinator.run_job(leased).await }
    });

    // Cancel as soon as the coordinator has registered the job; every
    // per-segment attempt checks cancellation before touching the worker
    // pool or the encoder subprocess.
    while !control.request_cancel("job-cancel") {
        tokio::task::yield_now().await;
    }
    job_handle.await.unwrap();

    let stored = db.get(&"job-cancel".to_string()).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Cancelled);

    // The queue row's own error_kind stays unset (cancellation isn't a
    // failure); the caller-facing error code travels via the Progress
    // Store / callback payload instead.
    let live = store.get_job(&"job-cancel".to_string()).await.unwrap().unwrap();
    assert_eq!(live.status, JobStatus::Cancelled);
    assert_eq!(live.error_kind.as_deref(), Some("Cancelled"));
}
