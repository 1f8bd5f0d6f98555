use std::{future::Future, time::Duration};
use tracing::{debug, warn};

/// The number of attempts made for conflict-prone updates.
pub const DEFAULT_ATTEMPTS: usize = 10;

/// The pause between attempts made for conflict-prone updates.
pub const DEFAULT_DELAY: Duration = Duration::from_secs(1);

/// The error returned once every attempt has failed. Holds the last error observed.
#[derive(Debug, thiserror::Error)]
#[error("failed after {attempts} attempts: {error}")]
pub struct Exhausted<E> {
    pub attempts: usize,
    pub error: E,
}

/// Invokes `op` until it succeeds, making at most `attempts` attempts and sleeping `delay` between
/// them.
///
/// At least one attempt is always made. Each attempt calls `op` anew so that callers can re-read
/// any state the operation depends on.
pub async fn retry<T, E, F, Fut>(attempts: usize, delay: Duration, mut op: F) -> Result<T, Exhausted<E>>
where
    E: std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(attempt, "Succeeded after retrying");
                }
                return Ok(value);
            }
            Err(error) if attempt >= attempts => return Err(Exhausted { attempts, error }),
            Err(error) => {
                warn!(%error, attempt, attempts, "Retrying after error");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
