//! Global configuration loaded from `~/.config/render-core/config.toml`.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    /// Upper bound on in-flight jobs.
    pub max_concurrent_jobs: usize,
    /// Renderers per coordinator.
    pub worker_pool_size: usize,
    /// Per-job hard wallclock timeout.
    pub rendering_timeout_secs: u64,
    /// Callback retry count and per-attempt timeout.
    pub callback_retry_count: u32,
    pub callback_timeout_secs: u64,
    /// Prefer GPU encoder when available, falling back to CPU.
    pub use_gpu_encoding: bool,
    /// Root directory for per-job temp files.
    pub temp_dir: PathBuf,
    /// Progress Store connection string: `memory://` or `redis://...`.
    pub store_url: String,

    /// Drop-rate ceiling before a segment fails with `ResourceExhausted`.
    pub max_drop_rate: f32,
    /// Frame Queue element-count bounds and default.
    pub frame_queue_capacity: usize,
    pub frame_queue_min_capacity: usize,
    pub frame_queue_max_capacity: usize,
    /// Frame Queue aggregate byte budget.
    pub frame_queue_byte_budget: u64,
    /// Segment-level retry budget on `RenderFailure`/`EncodeFailure`.
    pub max_segment_retries: u32,
    /// Queue lease timeout: a leased-but-unfinished job is requeued after this.
    pub lease_timeout_secs: u64,
    /// Publish worker progress to the Progress Store every N frames.
    pub progress_publish_every_n_frames: u32,
    /// Memory-reclaim pass cadence.
    pub memory_reclaim_light_every_n_frames: u32,
    pub memory_reclaim_aggressive_every_n_frames: u32,
    /// Backpressure Governor thresholds.
    pub mem_threshold_bytes: u64,
    pub cpu_threshold_percent: f32,
    /// Path to the ffmpeg binary used for streaming encode and concat merge.
    pub ffmpeg_path: PathBuf,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 3,
            worker_pool_size: 4,
            rendering_timeout_secs: 1800,
            callback_retry_count: 3,
            callback_timeout_secs: 30,
            use_gpu_encoding: true,
            temp_dir: PathBuf::from("/tmp/render"),
            store_url: "memory://".to_string(),

            max_drop_rate: 0.10,
            frame_queue_capacity: 60,
            frame_queue_min_capacity: 15,
            frame_queue_max_capacity: 120,
            frame_queue_byte_budget: 360 * 1024 * 1024,
            max_segment_retries: 2,
            lease_timeout_secs: 300,
            progress_publish_every_n_frames: 30,
            memory_reclaim_light_every_n_frames: 100,
            memory_reclaim_aggressive_every_n_frames: 300,
            mem_threshold_bytes: 8 * 1024 * 1024 * 1024,
            cpu_threshold_percent: 80.0,
            ffmpeg_path: PathBuf::from("ffmpeg"),
        }
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("render-core")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<RenderConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = RenderConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!(path = %path.display(), "created default config");
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: RenderConfig = toml::from_str(&data)?;
    Ok(cfg)
}
