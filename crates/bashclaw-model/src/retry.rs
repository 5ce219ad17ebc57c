// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Shared retry policy for the provider adapters.
//!
//! Retries on 429 (rate limited) and 500/502/503 (transient server errors)
//! up to [`MAX_ATTEMPTS`] times with exponential backoff plus jitter. Any
//! other 4xx status is treated as fatal and returned immediately.

use std::time::Duration;

use anyhow::{bail, Context};
use rand::Rng;
use tracing::warn;

pub const MAX_ATTEMPTS: u32 = 3;
const PER_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(120);

fn is_retryable(status: reqwest::StatusCode) -> bool {
    matches!(
        status.as_u16(),
        429 | 500 | 502 | 503
    )
}

fn backoff_delay(attempt: u32) -> Duration {
    let base = 2u64.saturating_pow(attempt.saturating_sub(1));
    let jitter: f64 = rand::thread_rng().gen_range(0.0..2.0);
    Duration::from_secs_f64(base as f64 + jitter)
}

/// Send an HTTP request built fresh on each attempt by `build`, retrying
/// transient failures per the policy above. Returns the first response with
/// a non-retryable status (2xx or fatal 4xx), or an error if every attempt
/// is exhausted or times out.
pub async fn send_with_retry<F>(build: F) -> anyhow::Result<reqwest::Response>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut last_err: Option<anyhow::Error> = None;

    for attempt in 1..=MAX_ATTEMPTS {
        let req = build();
        let outcome = tokio::time::timeout(PER_ATTEMPT_TIMEOUT, req.send()).await;

        match outcome {
            Ok(Ok(resp)) => {
                let status = resp.status();
                if status.is_success() {
                    return Ok(resp);
                }
                if is_retryable(status) && attempt < MAX_ATTEMPTS {
                    let delay = backoff_delay(attempt);
                    warn!(attempt, %status, delay_secs = delay.as_secs_f64(), "retrying model request");
                    tokio::time::sleep(delay).await;
                    last_err = Some(anyhow::anyhow!("provider returned {status}"));
                    continue;
                }
                let body = resp.text().await.unwrap_or_default();
                bail!("provider request failed with status {status}: {body}");
            }
            Ok(Err(e)) => {
                if attempt < MAX_ATTEMPTS {
                    let delay = backoff_delay(attempt);
                    warn!(attempt, error = %e, "retrying model request after transport error");
                    tokio::time::sleep(delay).await;
                    last_err = Some(e.into());
                    continue;
                }
                return Err(e).context("model request transport error");
            }
            Err(_) => {
                if attempt < MAX_ATTEMPTS {
                    warn!(attempt, "model request timed out, retrying");
                    last_err = Some(anyhow::anyhow!("request timed out after {PER_ATTEMPT_TIMEOUT:?}"));
                    continue;
                }
                bail!("model request timed out after {PER_ATTEMPT_TIMEOUT:?} on final attempt");
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("exhausted retry attempts")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_statuses() {
        assert!(is_retryable(reqwest::StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable(reqwest::StatusCode::INTERNAL_SERVER_ERROR));
        assert!(is_retryable(reqwest::StatusCode::BAD_GATEWAY));
        assert!(is_retryable(reqwest::StatusCode::SERVICE_UNAVAILABLE));
    }

    #[test]
    fn non_retryable_statuses() {
        assert!(!is_retryable(reqwest::StatusCode::BAD_REQUEST));
        assert!(!is_retryable(reqwest::StatusCode::UNAUTHORIZED));
        assert!(!is_retryable(reqwest::StatusCode::NOT_FOUND));
    }

    #[test]
    fn backoff_grows_with_attempt_and_includes_jitter_bound() {
        let d1 = backoff_delay(1);
        let d2 = backoff_delay(2);
        // attempt 1 base=1s, attempt 2 base=2s; jitter in [0,2) so ranges overlap
        // but the minimum possible d2 (2.0) exceeds the minimum possible d1 (1.0).
        assert!(d1.as_secs_f64() >= 1.0 && d1.as_secs_f64() < 3.0);
        assert!(d2.as_secs_f64() >= 2.0 && d2.as_secs_f64() < 4.0);
    }
}
