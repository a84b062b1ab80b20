//! Retry state machine for upstream calls.
//!
//! Each attempt is classified into an [`Attempt`]. The driver keeps the attempt
//! counter, computes the next delay from the cause, and turns exhaustion into
//! a typed error. No control flow goes through panics or nested handlers.

use crate::error::ApiError;
use std::time::Duration;

/// Why an attempt should be retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryCause {
    /// Timeout, connection failure or HTTP 5xx.
    Transient(String),
    /// In-band throttling signal from the upstream.
    RateLimited(String),
}

impl RetryCause {
    pub fn message(&self) -> &str {
        match self {
            Self::Transient(m) | Self::RateLimited(m) => m,
        }
    }
}

/// Classified outcome of one attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Attempt<T> {
    Success(T),
    Retry(RetryCause),
    Fail(ApiError),
}

/// Attempt budget and delay schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Zero is treated as one.
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// Delay before the attempt following `attempt` (0-based).
    ///
    /// Transient failures back off as `base * 2^attempt`; rate limits wait
    /// longer, `base * 5^attempt`.
    pub fn delay_for(&self, cause: &RetryCause, attempt: u32) -> Duration {
        let factor: u32 = match cause {
            RetryCause::Transient(_) => 2,
            RetryCause::RateLimited(_) => 5,
        };
        let mult = factor.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(mult)
    }

    /// Drive `attempt_fn` until success, terminal failure or exhaustion.
    ///
    /// `sleep` is called between attempts only; never after the last one.
    /// Exhaustion yields `RateLimit` if the final cause was throttling and
    /// `Network` otherwise.
    pub fn run<T>(
        &self,
        symbol: &str,
        mut attempt_fn: impl FnMut(u32) -> Attempt<T>,
        mut sleep: impl FnMut(Duration),
    ) -> Result<T, ApiError> {
        let max_attempts = self.max_attempts.max(1);
        let mut last_cause: Option<RetryCause> = None;

        for attempt in 0..max_attempts {
            match attempt_fn(attempt) {
                Attempt::Success(value) => return Ok(value),
                Attempt::Fail(err) => return Err(err.with_detail("symbol", symbol)),
                Attempt::Retry(cause) => {
                    let is_last = attempt + 1 >= max_attempts;
                    if !is_last {
                        let delay = self.delay_for(&cause, attempt);
                        match &cause {
                            RetryCause::RateLimited(msg) => tracing::warn!(
                                symbol,
                                attempt = attempt + 1,
                                max_attempts,
                                delay_ms = millis(delay),
                                "rate limited by upstream: {msg}"
                            ),
                            RetryCause::Transient(msg) => tracing::warn!(
                                symbol,
                                attempt = attempt + 1,
                                max_attempts,
                                delay_ms = millis(delay),
                                "transient upstream failure, retrying: {msg}"
                            ),
                        }
                        sleep(delay);
                    }
                    last_cause = Some(cause);
                }
            }
        }

        let err = match last_cause {
            Some(RetryCause::RateLimited(msg)) => ApiError::rate_limit(format!(
                "rate limit persisted after {max_attempts} attempts: {msg}"
            )),
            Some(RetryCause::Transient(msg)) => ApiError::network(format!(
                "failed after {max_attempts} attempts: {msg}"
            )),
            None => ApiError::network(format!("failed after {max_attempts} attempts")),
        };
        tracing::error!(symbol, max_attempts, "giving up on upstream: {err}");
        Err(err
            .with_detail("symbol", symbol)
            .with_detail("attempts", max_attempts))
    }
}

/// Whole milliseconds for logging, saturating at `u64::MAX`.
fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiErrorKind;
    use proptest::prelude::*;

    fn policy(max: u32) -> RetryPolicy {
        RetryPolicy::new(max, Duration::from_millis(100))
    }

    #[test]
    fn transient_backoff_doubles() {
        let p = policy(3);
        let c = RetryCause::Transient("timeout".into());
        assert_eq!(p.delay_for(&c, 0), Duration::from_millis(100));
        assert_eq!(p.delay_for(&c, 1), Duration::from_millis(200));
        assert_eq!(p.delay_for(&c, 2), Duration::from_millis(400));
    }

    #[test]
    fn logged_millis_saturate() {
        assert_eq!(millis(Duration::from_millis(2500)), 2500);
        assert_eq!(millis(Duration::MAX), u64::MAX);
        let p = RetryPolicy::new(3, Duration::MAX);
        let wait = p.delay_for(&RetryCause::RateLimited(String::new()), 40);
        assert_eq!(millis(wait), u64::MAX);
    }

    #[test]
    fn rate_limit_backoff_is_longer() {
        let p = policy(3);
        let c = RetryCause::RateLimited("slow down".into());
        assert_eq!(p.delay_for(&c, 0), Duration::from_millis(100));
        assert_eq!(p.delay_for(&c, 1), Duration::from_millis(500));
        assert_eq!(p.delay_for(&c, 2), Duration::from_millis(2500));
    }

    #[test]
    fn first_success_returns_without_sleeping() {
        let mut sleeps = Vec::new();
        let out = policy(3).run("AAA", |_| Attempt::Success(7), |d| sleeps.push(d));
        assert_eq!(out.unwrap(), 7);
        assert!(sleeps.is_empty());
    }

    #[test]
    fn recovers_after_transient_failures() {
        let mut sleeps = Vec::new();
        let out = policy(3).run(
            "AAA",
            |attempt| {
                if attempt < 2 {
                    Attempt::Retry(RetryCause::Transient("HTTP 502".into()))
                } else {
                    Attempt::Success("ok")
                }
            },
            |d| sleeps.push(d),
        );
        assert_eq!(out.unwrap(), "ok");
        assert_eq!(
            sleeps,
            vec![Duration::from_millis(100), Duration::from_millis(200)]
        );
    }

    #[test]
    fn terminal_failure_is_not_retried() {
        let mut calls = 0;
        let out: Result<(), _> = policy(5).run(
            "AAA",
            |_| {
                calls += 1;
                Attempt::Fail(ApiError::authentication("bad key"))
            },
            |_| panic!("must not sleep"),
        );
        assert_eq!(calls, 1);
        let err = out.unwrap_err();
        assert_eq!(err.kind(), ApiErrorKind::Authentication);
        assert_eq!(err.details().get("symbol").map(String::as_str), Some("AAA"));
    }

    #[test]
    fn exhausted_transient_is_network_error() {
        let mut calls = 0;
        let mut sleeps = 0;
        let out: Result<(), _> = policy(3).run(
            "AAA",
            |_| {
                calls += 1;
                Attempt::Retry(RetryCause::Transient("connection refused".into()))
            },
            |_| sleeps += 1,
        );
        assert_eq!(calls, 3);
        assert_eq!(sleeps, 2, "no sleep after the final attempt");
        let err = out.unwrap_err();
        assert_eq!(err.kind(), ApiErrorKind::Network);
        assert_eq!(err.details().get("attempts").map(String::as_str), Some("3"));
    }

    #[test]
    fn exhausted_rate_limit_is_rate_limit_error() {
        let out: Result<(), _> = policy(2).run(
            "BBB",
            |_| Attempt::Retry(RetryCause::RateLimited("API call frequency".into())),
            |_| {},
        );
        assert_eq!(out.unwrap_err().kind(), ApiErrorKind::RateLimit);
    }

    #[test]
    fn zero_attempts_still_tries_once() {
        let mut calls = 0;
        let _ = policy(0).run(
            "AAA",
            |_| {
                calls += 1;
                Attempt::<()>::Retry(RetryCause::Transient("x".into()))
            },
            |_| {},
        );
        assert_eq!(calls, 1);
    }

    proptest! {
        #[test]
        fn delays_never_shrink(base_ms in 1u64..5_000, attempt in 0u32..20) {
            let p = RetryPolicy::new(30, Duration::from_millis(base_ms));
            for cause in [
                RetryCause::Transient(String::new()),
                RetryCause::RateLimited(String::new()),
            ] {
                prop_assert!(p.delay_for(&cause, attempt + 1) >= p.delay_for(&cause, attempt));
            }
        }

        #[test]
        fn rate_limit_wait_dominates_backoff(base_ms in 1u64..5_000, attempt in 0u32..12) {
            let p = RetryPolicy::new(30, Duration::from_millis(base_ms));
            prop_assert!(
                p.delay_for(&RetryCause::RateLimited(String::new()), attempt)
                    >= p.delay_for(&RetryCause::Transient(String::new()), attempt)
            );
        }
    }
}
