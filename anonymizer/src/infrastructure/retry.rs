// /////////////////////////////////////////////////////////////////////////////
// Privacy-Preserving Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Retry Envelope
//!
//! The single retry utility every external-service client wraps its calls
//! in. Given `attempts` and `timeout`, the operation is run; every failed
//! attempt sleeps `timeout` - including the one that exhausts the budget -
//! after which the `otherwise` continuation produces the final error
//! (typically a job-level failure so the stage keeps running).
//!
//! Non-retryable errors short-circuit immediately; in particular,
//! cancellation is never retried.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use anonymizer_domain::PipelineError;

/// Retries `operation` up to `attempts` times, sleeping `timeout` after
/// every failed attempt (the final one included) before `otherwise` runs.
///
/// # Arguments
///
/// * `attempts` - maximum number of tries
/// * `timeout` - wait after each failed attempt
/// * `operation` - the call to (re)try
/// * `retryable` - which error kinds indicate a transient condition
/// * `otherwise` - builds the final error from the collected failures
pub async fn retry<T, F, Fut, P, O>(
    attempts: u32,
    timeout: Duration,
    mut operation: F,
    retryable: P,
    otherwise: O,
) -> Result<T, PipelineError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, PipelineError>>,
    P: Fn(&PipelineError) -> bool,
    O: FnOnce(Vec<PipelineError>) -> PipelineError,
{
    let mut failures = Vec::new();
    for attempt in 0..attempts {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if retryable(&e) => {
                warn!(attempt, error = %e, "attempt failed");
                failures.push(e);
                tokio::time::sleep(timeout).await;
            }
            Err(e) => return Err(e),
        }
    }
    Err(otherwise(failures))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn returns_the_first_success() {
        let calls = AtomicU32::new(0);
        let result = retry(
            3,
            Duration::from_millis(1),
            || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 1 {
                    Err(PipelineError::ClientError("transient".into()))
                } else {
                    Ok(42)
                }
            },
            PipelineError::is_recoverable,
            |_| PipelineError::JobFailed("exhausted".into()),
        )
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn exhaustion_calls_the_continuation() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry(
            3,
            Duration::from_millis(1),
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(PipelineError::ClientError("down".into()))
            },
            PipelineError::is_recoverable,
            |failures| PipelineError::JobFailed(format!("exhausted after {}", failures.len())),
        )
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(matches!(result, Err(PipelineError::JobFailed(msg)) if msg == "exhausted after 3"));
    }

    #[tokio::test]
    async fn non_retryable_errors_short_circuit() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry(
            3,
            Duration::from_millis(1),
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(PipelineError::Cancelled("stop".into()))
            },
            PipelineError::is_recoverable,
            |_| PipelineError::JobFailed("exhausted".into()),
        )
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(PipelineError::Cancelled(_))));
    }
}
