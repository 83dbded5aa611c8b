use std::future::Future;
use std::time::Duration;

use tracing::error;

use crate::{RETRY_INITIAL_DELAY_MS, RETRY_MAX_ATTEMPTS};

/// Exponential-backoff wrapper for call sites that need at-least-once
/// semantics. The final error is handed back to the caller after all attempts
/// are spent; heartbeat and inactivity pings deliberately do not go through
/// here, their cadence is their retry policy.
pub async fn fetch_with_retry<T, E, F, Fut>(label: &str, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut delay = Duration::from_millis(RETRY_INITIAL_DELAY_MS);
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                if attempt >= RETRY_MAX_ATTEMPTS {
                    error!(target: "engine_log", "{} failed after {} attempts: {}", label, attempt, e);
                    return Err(e);
                }
                error!(target: "engine_log", "{} failed on attempt {}, retrying in {}ms: {}", label, attempt, delay.as_millis(), e);
                tokio::time::sleep(delay).await;
                delay *= 2;
                attempt += 1;
            }
        }
    }
}
