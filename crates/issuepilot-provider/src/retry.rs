use std::collections::HashMap;
use std::future::Future;
use tracing::warn;

pub const RETRY_INITIAL_DELAY: u64 = 2000;
pub const RETRY_BACKOFF_FACTOR: u64 = 2;
pub const RETRY_MAX_DELAY_NO_HEADERS: u64 = 30_000;
pub const RETRY_MAX_DELAY: u64 = 2_147_483_647;

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay: u64,
    pub backoff_factor: u64,
    pub max_delay_no_headers: u64,
    pub max_delay: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: RETRY_INITIAL_DELAY,
            backoff_factor: RETRY_BACKOFF_FACTOR,
            max_delay_no_headers: RETRY_MAX_DELAY_NO_HEADERS,
            max_delay: RETRY_MAX_DELAY,
        }
    }
}

/// Implement this on error types so the retry helper knows whether to retry.
/// Return `Some(message)` when the error is retryable, `None` otherwise.
pub trait IsRetryable {
    fn is_retryable(&self) -> Option<String>;
}

/// Calculate the retry delay in milliseconds.
///
/// Priority:
/// 1. `retry-after-ms` header (milliseconds)
/// 2. `retry-after` header (seconds as float, or HTTP-date)
/// 3. Exponential backoff: `initial_delay * backoff_factor^(attempt-1)`
///
/// When headers are present the delay is uncapped (up to `RETRY_MAX_DELAY`).
/// Without headers the delay is capped at `RETRY_MAX_DELAY_NO_HEADERS`.
pub fn delay(attempt: u32, response_headers: Option<&HashMap<String, String>>) -> u64 {
    if let Some(headers) = response_headers {
        if let Some(val) = headers.get("retry-after-ms") {
            if let Ok(ms) = val.parse::<f64>() {
                if !ms.is_nan() {
                    return ms as u64;
                }
            }
        }

        if let Some(val) = headers.get("retry-after") {
            if let Ok(secs) = val.parse::<f64>() {
                if !secs.is_nan() {
                    return (secs * 1000.0).ceil() as u64;
                }
            }
            if let Ok(date) = chrono::DateTime::parse_from_rfc2822(val) {
                let now = chrono::Utc::now();
                let diff_ms = (date.signed_duration_since(now)).num_milliseconds();
                if diff_ms > 0 {
                    return diff_ms as u64;
                }
            }
        }

        return exponential_backoff(
            attempt,
            RETRY_INITIAL_DELAY,
            RETRY_BACKOFF_FACTOR,
            RETRY_MAX_DELAY,
        );
    }

    exponential_backoff(
        attempt,
        RETRY_INITIAL_DELAY,
        RETRY_BACKOFF_FACTOR,
        RETRY_MAX_DELAY_NO_HEADERS,
    )
}

fn exponential_backoff(attempt: u32, initial: u64, factor: u64, max: u64) -> u64 {
    let exp = factor.saturating_pow(attempt.saturating_sub(1));
    initial.saturating_mul(exp).min(max)
}

/// Retry an async operation up to `config.max_attempts` times.
///
/// The closure `f` is called on each attempt. If it returns `Err(e)` and
/// `e.is_retryable()` returns `Some(_)`, the helper sleeps for the computed
/// delay and tries again. Otherwise the error is returned immediately.
pub async fn with_retry<F, Fut, T, E>(config: &RetryConfig, mut f: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Debug,
{
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        match f().await {
            Ok(val) => return Ok(val),
            Err(e) => {
                if attempt >= config.max_attempts {
                    return Err(e);
                }
                match e.is_retryable() {
                    Some(msg) => {
                        let delay_ms = delay(attempt, None);
                        warn!(
                            attempt,
                            max = config.max_attempts,
                            delay_ms,
                            reason = %msg,
                            "retrying after transient error"
                        );
                        tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
                    }
                    None => return Err(e),
                }
            }
        }
    }
}
