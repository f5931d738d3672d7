//! Domain error taxonomy shared across the pipeline.
//!
//! Each variant maps to one wire `errorCode` sent in a failure callback, and
//! to a retry/escalation policy owned by the Job Coordinator. Call sites that
//! only need to propagate a failure reason use this type directly rather
//! than `anyhow::Error`; call sites at the process boundary (config, CLI)
//! keep using `anyhow`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("source video unavailable: {0}")]
    SourceUnavailable(String),

    #[error("render failure: {0}")]
    RenderFailure(String),

    #[error("encode failure (exit {exit_status:?}): {stderr_tail}")]
    EncodeFailure {
        exit_status: Option<i32>,
        stderr_tail: String,
    },

    #[error("resource exhausted: drop rate {drop_rate:.3} exceeded ceiling")]
    ResourceExhausted { drop_rate: f32 },

    #[error("merge failure: {0}")]
    MergeFailure(String),

    #[error("operation timed out")]
    Timeout,

    #[error("cancelled")]
    Cancelled,

    #[error("callback failed: {0}")]
    CallbackFailure(String),

    #[error("progress store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl RenderError {
    /// Wire error code as used in callback payloads and Progress Store
    /// records (§7 of the design).
    pub fn code(&self) -> &'static str {
        match self {
            RenderError::InvalidInput(_) => "InvalidInput",
            RenderError::SourceUnavailable(_) => "SourceUnavailable",
            RenderError::RenderFailure(_) => "RenderFailure",
            RenderError::EncodeFailure { .. } => "EncodeFailure",
            RenderError::ResourceExhausted { .. } => "ResourceExhausted",
            RenderError::MergeFailure(_) => "MergeFailure",
            RenderError::Timeout => "Timeout",
            RenderError::Cancelled => "Cancelled",
            RenderError::CallbackFailure(_) => "CallbackFailure",
            RenderError::StoreUnavailable(_) => "StoreUnavailable",
            RenderError::Internal(_) => "Internal",
        }
    }

    /// Whether the Coordinator should retry the owning segment (fresh
    /// worker/encoder) rather than fail the job outright.
    pub fn is_segment_retryable(&self) -> bool {
        matches!(
            self,
            RenderError::RenderFailure(_) | RenderError::EncodeFailure { .. }
        )
    }
}
