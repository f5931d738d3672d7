//! Async retry loop: run a future-producing closure until success or the
//! retry policy says stop.

use super::policy::{ErrorKind, RetryDecision, RetryPolicy};
use std::future::Future;

/// Runs `f` until it succeeds or `policy` says to stop retrying. `classify`
/// maps the error into an `ErrorKind` so the same policy serves callback
/// HTTP retries and segment render/encode retries alike.
pub async fn run_with_retry<F, Fut, T, E>(
    policy: &RetryPolicy,
    mut classify: impl FnMut(&E) -> ErrorKind,
    mut f: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 1u32;
    loop {
        match f().await {
            Ok(v) => return Ok(v),
            Err(e) => {
                let kind = classify(&e);
                match policy.decide(attempt, kind) {
                    RetryDecision::NoRetry => return Err(e),
                    RetryDecision::RetryAfter(d) => {
                        tokio::time::sleep(d).await;
                        attempt += 1;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retries_until_success() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: std::time::Duration::from_millis(1),
            max_delay: std::time::Duration::from_millis(5),
        };
        let calls = AtomicU32::new(0);
        let result: Result<&str, &str> = run_with_retry(
            &policy,
            |_e: &&str| ErrorKind::Connection,
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err("not yet")
                    } else {
                        Ok("done")
                    }
                }
            },
        )
        .await;
        assert_eq!(result, Ok("done"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let policy = RetryPolicy {
            max_attempts: 2,
            base_delay: std::time::Duration::from_millis(1),
            max_delay: std::time::Duration::from_millis(2),
        };
        let result: Result<(), &str> = run_with_retry(
            &policy,
            |_e: &&str| ErrorKind::Timeout,
            || async { Err("boom") },
        )
        .await;
        assert_eq!(result, Err("boom"));
    }
}
