use std::future::Future;
use std::time::Duration;

use tracing::warn;

/// Retry schedule for a fallible async operation.
///
/// Attempt `n` (1-based) that fails with a retryable error is followed by a
/// sleep of `initial_delay * multiplier^(n-1)`, up to `max_attempts` attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub multiplier: u32,
}

/// Why a retried operation gave up.
#[derive(Debug)]
pub enum RetryError<E> {
    /// A non-retryable error; returned on the attempt that produced it.
    Fatal(E),
    /// Every attempt failed with a retryable error; carries the last one.
    Exhausted { attempts: u32, last: E },
}

impl RetryPolicy {
    /// 5 attempts, waiting 2s, 4s, 8s, 16s between them.
    pub const fn connectivity() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(2),
            multiplier: 2,
        }
    }

    /// Sleep after the given failed attempt (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.initial_delay
            .saturating_mul(self.multiplier.saturating_pow(attempt.saturating_sub(1)))
    }

    /// Sum of all sleeps if every attempt fails.
    pub fn max_total_wait(&self) -> Duration {
        (1..self.max_attempts).map(|a| self.delay_after(a)).sum()
    }

    pub async fn run<T, E, F, Fut, P>(&self, mut op: F, is_retryable: P) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: std::fmt::Display,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if !is_retryable(&e) => return Err(RetryError::Fatal(e)),
                Err(e) if attempt >= self.max_attempts => {
                    return Err(RetryError::Exhausted { attempts: attempt, last: e })
                }
                Err(e) => {
                    let delay = self.delay_after(attempt);
                    warn!(
                        "Attempt {}/{} failed: {}; retrying after {}ms...",
                        attempt,
                        self.max_attempts,
                        e,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, PartialEq)]
    enum Failure {
        Transient,
        Permanent,
    }

    impl std::fmt::Display for Failure {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{self:?}")
        }
    }

    fn is_transient(e: &Failure) -> bool {
        *e == Failure::Transient
    }

    #[test]
    fn test_connectivity_schedule() {
        let p = RetryPolicy::connectivity();
        let delays: Vec<u64> = (1..p.max_attempts).map(|a| p.delay_after(a).as_secs()).collect();
        assert_eq!(delays, vec![2, 4, 8, 16]);
        assert_eq!(p.max_total_wait(), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_two_retries() {
        let calls = &AtomicU32::new(0);
        let start = tokio::time::Instant::now();

        let result = RetryPolicy::connectivity()
            .run(
                move || async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(Failure::Transient)
                    } else {
                        Ok("done")
                    }
                },
                is_transient,
            )
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let waited = start.elapsed();
        assert!(waited >= Duration::from_secs(6), "{waited:?}");
        assert!(waited < Duration::from_secs(7), "{waited:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausts_after_max_attempts() {
        let calls = &AtomicU32::new(0);
        let result: Result<(), _> = RetryPolicy::connectivity()
            .run(
                move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(Failure::Transient)
                },
                is_transient,
            )
            .await;

        match result {
            Err(RetryError::Exhausted { attempts, last }) => {
                assert_eq!(attempts, 5);
                assert_eq!(last, Failure::Transient);
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_error_is_not_retried() {
        let calls = &AtomicU32::new(0);
        let start = tokio::time::Instant::now();
        let result: Result<(), _> = RetryPolicy::connectivity()
            .run(
                move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(Failure::Permanent)
                },
                is_transient,
            )
            .await;

        assert!(matches!(result, Err(RetryError::Fatal(Failure::Permanent))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
