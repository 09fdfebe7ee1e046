//! Linear retry with a fixed delay

use std::time::Duration;
use tracing::warn;

/// Total attempts and the pause between them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Zero is treated as one.
    pub attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub const fn new(attempts: u32, delay: Duration) -> Self {
        Self { attempts, delay }
    }

    /// A single attempt
    pub const fn once() -> Self {
        Self::new(1, Duration::from_secs(3))
    }

    pub fn max_attempts(&self) -> u32 {
        self.attempts.max(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::once()
    }
}

/// Run `op` until it succeeds, returns a non-retryable error, or attempts run out.
///
/// `op` receives the 1-based attempt number. `sleep` is called between
/// attempts with `policy.delay`; it is a parameter so tests do not wait.
pub fn with_retry<T, E, F, R>(
    policy: RetryPolicy,
    sleep: &dyn Fn(Duration),
    mut op: F,
    retryable: R,
) -> Result<T, E>
where
    F: FnMut(u32) -> Result<T, E>,
    R: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let max = policy.max_attempts();
    let mut attempt = 1;
    loop {
        match op(attempt) {
            Ok(value) => return Ok(value),
            Err(e) if attempt < max && retryable(&e) => {
                warn!(
                    "attempt {}/{} failed: {}; retrying in {:?}",
                    attempt, max, e, policy.delay
                );
                sleep(policy.delay);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};

    fn no_sleep(_: Duration) {}

    #[test]
    fn test_succeeds_after_failures_within_budget() {
        let calls = Cell::new(0);
        let result: Result<&str, String> = with_retry(
            RetryPolicy::new(3, Duration::from_secs(10)),
            &no_sleep,
            |attempt| {
                calls.set(calls.get() + 1);
                if attempt < 3 { Err(format!("fail {}", attempt)) } else { Ok("done") }
            },
            |_| true,
        );
        assert_eq!(result, Ok("done"));
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn test_gives_up_after_max_attempts() {
        let calls = Cell::new(0);
        let result: Result<(), String> = with_retry(
            RetryPolicy::new(2, Duration::ZERO),
            &no_sleep,
            |_| {
                calls.set(calls.get() + 1);
                Err("nope".to_string())
            },
            |_| true,
        );
        assert_eq!(result, Err("nope".to_string()));
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_non_retryable_error_stops_immediately() {
        let calls = Cell::new(0);
        let result: Result<(), String> = with_retry(
            RetryPolicy::new(5, Duration::ZERO),
            &no_sleep,
            |_| {
                calls.set(calls.get() + 1);
                Err("not found".to_string())
            },
            |e| !e.contains("not found"),
        );
        assert!(result.is_err());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_sleeps_between_attempts_only() {
        let sleeps = RefCell::new(Vec::new());
        let record = |d: Duration| sleeps.borrow_mut().push(d);
        let _: Result<(), String> = with_retry(
            RetryPolicy::new(3, Duration::from_millis(250)),
            &record,
            |_| Err("x".to_string()),
            |_| true,
        );
        assert_eq!(*sleeps.borrow(), vec![Duration::from_millis(250); 2]);
    }

    #[test]
    fn test_zero_attempts_means_one() {
        let calls = Cell::new(0);
        let _: Result<(), String> = with_retry(
            RetryPolicy::new(0, Duration::ZERO),
            &no_sleep,
            |_| {
                calls.set(calls.get() + 1);
                Err("x".to_string())
            },
            |_| true,
        );
        assert_eq!(calls.get(), 1);
    }
}
