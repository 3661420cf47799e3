//! Waiting for a resource to settle after a delete request.
//!
//! Polls at a fixed interval until the check reports a final answer or the deadline passes.

use std::future::Future;
use std::time::{Duration, Instant};

use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitConfig {
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            timeout: Duration::from_secs(30 * 60),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum PollError<E> {
    Check(E),
    TimedOut { waited: Duration, attempts: u32 },
}

/// Runs `check` until it returns `Ok(Some(_))`.
///
/// `Ok(None)` means "not there yet" and schedules another attempt after the poll interval.
pub async fn poll_until<T, E, F, Fut>(
    config: WaitConfig,
    resource: &str,
    check: F,
) -> Result<T, PollError<E>>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<Option<T>, E>>,
{
    let start = Instant::now();
    let mut attempts = 0u32;

    loop {
        attempts += 1;

        if let Some(value) = check().await.map_err(PollError::Check)? {
            debug!(resource, attempts, "wait finished");
            return Ok(value);
        }

        let waited = start.elapsed();
        if waited >= config.timeout {
            return Err(PollError::TimedOut { waited, attempts });
        }

        let delay = config.poll_interval.min(config.timeout - waited);
        debug!(
            resource,
            attempt = attempts,
            delay_ms = delay.as_millis() as u64,
            "resource not settled, polling again"
        );
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast() -> WaitConfig {
        WaitConfig {
            poll_interval: Duration::from_millis(1),
            timeout: Duration::from_millis(200),
        }
    }

    #[tokio::test]
    async fn test_poll_until_returns_first_value() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, PollError<()>> = poll_until(fast(), "r1", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move { Ok(if n >= 2 { Some(n) } else { None }) }
        })
        .await;

        assert_eq!(result, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_poll_until_propagates_check_error() {
        let result: Result<(), PollError<&str>> =
            poll_until(fast(), "r1", || async { Err("boom") }).await;
        assert_eq!(result, Err(PollError::Check("boom")));
    }

    #[tokio::test]
    async fn test_poll_until_times_out() {
        let config = WaitConfig {
            poll_interval: Duration::from_millis(5),
            timeout: Duration::from_millis(20),
        };
        let result: Result<(), PollError<()>> =
            poll_until(config, "r1", || async { Ok(None) }).await;

        match result {
            Err(PollError::TimedOut { attempts, waited }) => {
                assert!(attempts >= 2);
                assert!(waited >= Duration::from_millis(20));
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }
}
