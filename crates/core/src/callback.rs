//! Callback Emitter: posts job lifecycle events to the caller-supplied
//! `callbackUrl`, with exponential backoff on failure.

use serde::Serialize;
use serde_json::{json, Value};
use std::time::Duration;

use crate::retry::{classify_http_status, run_with_retry, ErrorKind, RetryPolicy};

#[derive(Debug, Serialize)]
struct ProgressPayload<'a> {
    job_id: &'a str,
    status: &'a str,
    progress: u8,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    frames_processed: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    frames_dropped: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    drop_rate: Option<f32>,
}

#[derive(Debug, Serialize)]
struct CompletionPayload<'a> {
    job_id: &'a str,
    status: &'a str,
    progress: u8,
    download_url: &'a str,
    file_size: u64,
    duration: f64,
    message: &'a str,
}

#[derive(Debug, Serialize)]
struct ErrorPayload<'a> {
    job_id: &'a str,
    status: &'a str,
    error_message: &'a str,
    error_code: &'a str,
}

/// HTTP client for posting job events, with a shared retry policy.
pub struct CallbackEmitter {
    client: reqwest::Client,
    retry_policy: RetryPolicy,
    max_attempts: u32,
}

impl CallbackEmitter {
    pub fn new(timeout_secs: u64, retry_count: u32) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent("render-core/1.0")
            .build()
            .expect("reqwest client build");
        Self {
            client,
            retry_policy: RetryPolicy {
                max_attempts: retry_count.max(1),
                base_delay: Duration::from_secs(1),
                max_delay: Duration::from_secs(60),
            },
            max_attempts: retry_count.max(1),
        }
    }

    pub async fn send_progress(
        &self,
        callback_url: &str,
        job_id: &str,
        progress: u8,
        message: &str,
        frames_processed: Option<u64>,
        frames_dropped: Option<u64>,
        drop_rate: Option<f32>,
    ) -> bool {
        let payload = ProgressPayload {
            job_id,
            status: "processing",
            progress,
            message,
            frames_processed,
            frames_dropped,
            drop_rate,
        };
        self.post_with_retry(callback_url, &payload).await
    }

    pub async fn send_completion(
        &self,
        callback_url: &str,
        job_id: &str,
        download_url: &str,
        file_size: u64,
        duration: f64,
    ) -> bool {
        let payload = CompletionPayload {
            job_id,
            status: "completed",
            progress: 100,
            download_url,
            file_size,
            duration,
            message: "Rendering completed successfully",
        };
        self.post_with_retry(callback_url, &payload).await
    }

    pub async fn send_error(
        &self,
        callback_url: &str,
        job_id: &str,
        status: &str,
        error_code: &str,
        error_message: &str,
    ) -> bool {
        let payload = ErrorPayload {
            job_id,
            status,
            error_message,
            error_code,
        };
        self.post_with_retry(callback_url, &payload).await
    }

    async fn post_with_retry(&self, callback_url: &str, payload: &impl Serialize) -> bool {
        let mut body = serde_json::to_value(payload).unwrap_or(json!({}));
        if let Value::Object(map) = &mut body {
            map.insert(
                "timestamp".to_string(),
                json!(chrono::Utc::now().to_rfc3339()),
            );
        }

        let result: Result<(), ErrorKind> = run_with_retry(
            &self.retry_policy,
            |kind: &ErrorKind| *kind,
            || {
                let client = &self.client;
                let body = body.clone();
                async move {
                    let resp = client
                        .post(callback_url)
                        .json(&body)
                        .send()
                        .await
                        .map_err(|_| ErrorKind::Connection)?;
                    if resp.status().is_success() {
                        Ok(())
                    } else {
                        Err(classify_http_status(resp.status().as_u16()))
                    }
                }
            },
        )
        .await;

        if result.is_err() {
            tracing::error!(
                url = callback_url,
                attempts = self.max_attempts,
                "callback delivery failed after retries"
            );
        }
        result.is_ok()
    }
}
