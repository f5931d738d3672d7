//! Shared data types for the render pipeline: job submissions, scenario cues,
//! segments, and worker status.
//!
//! These are the records that cross component boundaries (Queue, Planner,
//! Progress Store, Coordinator); component-internal types stay local to
//! their module.

use serde::{Deserialize, Serialize};

/// Opaque job identifier, as supplied by the caller at submission time.
pub type JobId = String;

/// A timed subtitle event. Style/animation/emotion are opaque to the core
/// beyond what the Segment Planner's complexity model reads from them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cue {
    pub start: f64,
    pub end: f64,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub style: Option<CueStyle>,
    #[serde(default)]
    pub animation: Option<CueAnimation>,
    #[serde(default)]
    pub emotion: Option<String>,
}

impl Cue {
    pub fn duration(&self) -> f64 {
        (self.end - self.start).max(0.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CueStyle {
    #[serde(default)]
    pub font_family: Option<String>,
    #[serde(default)]
    pub font_size: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CueAnimation {
    #[serde(rename = "type")]
    pub kind: String,
}

/// A scenario is the ordered cue list plus whatever top-level metadata the
/// renderer needs; the core only reads `cues`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Scenario {
    #[serde(default)]
    pub cues: Vec<Cue>,
}

impl Scenario {
    /// Duration derived from the furthest cue end, per the Coordinator's
    /// validation step: minimum 1s, default 30s when there are no cues.
    pub fn duration_secs(&self) -> f64 {
        let max_end = self
            .cues
            .iter()
            .map(|c| c.end)
            .fold(0.0_f64, f64::max);
        if self.cues.is_empty() {
            30.0
        } else {
            max_end.max(1.0)
        }
    }
}

/// Output options requested for a job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RenderOptions {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub quality: u8,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            fps: 30.0,
            quality: 80,
        }
    }
}

/// The job-submission payload accepted at ingress. The HTTP surface that
/// decodes this is out of scope; this is the shape the Coordinator consumes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRequest {
    #[serde(rename = "jobId")]
    pub job_id: JobId,
    #[serde(rename = "videoUrl")]
    pub video_url: String,
    pub scenario: Scenario,
    pub options: RenderOptions,
    #[serde(rename = "callbackUrl")]
    pub callback_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "queued" => JobStatus::Queued,
            "processing" => JobStatus::Processing,
            "completed" => JobStatus::Completed,
            "failed" => JobStatus::Failed,
            "cancelled" => JobStatus::Cancelled,
            _ => return None,
        })
    }
}

/// Full job record as persisted by the Queue and mirrored into the Progress
/// Store under `job:{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: JobId,
    pub video_url: String,
    pub scenario: Scenario,
    pub options: RenderOptions,
    pub callback_url: String,
    pub status: JobStatus,
    pub progress: u8,
    #[serde(default)]
    pub error_kind: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    #[serde(default)]
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl JobRecord {
    pub fn new(req: JobRequest) -> Self {
        Self {
            job_id: req.job_id,
            video_url: req.video_url,
            scenario: req.scenario,
            options: req.options,
            callback_url: req.callback_url,
            status: JobStatus::Queued,
            progress: 0,
            error_kind: None,
            error_message: None,
            created_at: chrono::Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// One contiguous time window of a job, independently rendered by one
/// Render Worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Segment {
    pub index: usize,
    pub worker_id: usize,
    pub start: f64,
    pub end: f64,
    pub cues: Vec<Cue>,
    pub estimated_frames: u64,
    pub complexity: f64,
    pub status: SegmentStatus,
    pub output_path: Option<std::path::PathBuf>,
    pub file_size: u64,
    pub frames_processed: u64,
}

impl Segment {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Per (job, worker) status mirrored into the Progress Store.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Pending,
    Processing,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerStatus {
    #[serde(rename = "workerId")]
    pub worker_id: usize,
    pub status: WorkerState,
    pub progress: u8,
    #[serde(rename = "updatedAt")]
    pub updated_at: chrono::DateTime<chrono::Utc>,
}
