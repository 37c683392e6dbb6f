use std::future::Future;
use std::time::Duration;

const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Run `f` up to `attempts` times, doubling the delay between failures.
///
/// `f` receives the 1-based attempt number. The last error is returned once
/// every attempt has failed.
pub async fn retry_with_backoff<F, Fut, T>(
    attempts: u32,
    initial_delay: Duration,
    label: &str,
    mut f: F,
) -> eyre::Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = eyre::Result<T>>,
{
    let attempts = attempts.max(1);
    let mut delay = initial_delay;

    for attempt in 1..attempts {
        match f(attempt).await {
            Ok(val) => return Ok(val),
            Err(e) => {
                tracing::warn!(
                    attempt,
                    max_attempts = attempts,
                    error = %e,
                    delay_ms = delay.as_millis() as u64,
                    "{} failed, retrying...",
                    label
                );
                tokio::time::sleep(delay).await;
                delay = std::cmp::min(delay * 2, MAX_BACKOFF);
            }
        }
    }

    f(attempts)
        .await
        .map_err(|e| eyre::eyre!("{} failed after {} attempts: {}", label, attempts, e))
}
