use locus_core::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tracing::info;

/// Runs `f` up to `attempts` times, sleeping `backoff`, `2 * backoff`,
/// `4 * backoff`... between failures. Returns the last error.
pub async fn with_retry<T, F, Fut>(action: &str, attempts: u32, backoff: Duration, mut f: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = attempts.max(1);
    let mut last_error = None;

    for attempt in 1..=attempts {
        match f().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                tracing::warn!(action, attempt, max_attempts = attempts, error = %e, "attempt failed");
                last_error = Some(e);
                if attempt < attempts {
                    let delay = backoff.saturating_mul(1u32 << (attempt - 1).min(16));
                    info!("{} failed, retrying {}/{} in {:?}...", action, attempt, attempts, delay);
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    Err(last_error.unwrap_or_else(|| Error::Storage(format!("{} failed after all retries", action))))
}
