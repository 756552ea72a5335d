//! Polling: re-run a check until it holds, or while it must keep holding.

use crate::config::HarnessConfig;
use crate::errors::{HarnessError, HarnessResult};
use kube_assert::{MatchError, MatchResult, StoreContext, StoreError};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// A successful polling run.
#[derive(Debug, Clone, PartialEq)]
pub struct PollOutcome<T> {
    /// Result of the last check.
    pub value: T,
    pub attempts: usize,
    pub elapsed: Duration,
}

fn is_deadline(error: &MatchError) -> bool {
    matches!(error, MatchError::Store(StoreError::DeadlineExceeded))
}

/// Run `check` every interval until it succeeds or the timeout elapses.
///
/// Mismatches are retried. Any other error aborts immediately. On timeout the
/// last mismatch is returned.
pub fn eventually<T, F>(config: &HarnessConfig, mut check: F) -> HarnessResult<PollOutcome<T>>
where
    F: FnMut(&StoreContext) -> MatchResult<T>,
{
    let start = Instant::now();
    let deadline = start + config.timeout();
    let ctx = StoreContext::with_deadline(deadline);
    let mut last: Option<MatchError> = None;
    let mut attempts = 0;

    loop {
        attempts += 1;
        let error = match check(&ctx) {
            Ok(value) => {
                debug!(attempts, "check succeeded");
                return Ok(PollOutcome {
                    value,
                    attempts,
                    elapsed: start.elapsed(),
                });
            }
            Err(error) if is_deadline(&error) => {
                return Err(HarnessError::Timeout {
                    attempts,
                    last: last.unwrap_or(error),
                });
            }
            Err(error) if !error.is_mismatch() => {
                warn!(attempts, %error, "check failed with a fatal error");
                return Err(HarnessError::Check(error));
            }
            Err(error) => error,
        };

        let now = Instant::now();
        if now >= deadline {
            return Err(HarnessError::Timeout {
                attempts,
                last: error,
            });
        }
        debug!(attempts, %error, "check did not match yet");
        last = Some(error);
        thread::sleep(config.interval().min(deadline - now));
    }
}

/// Run `check` every interval for the whole timeout; every poll must succeed.
///
/// Returns the value of the last poll, or the first failure.
pub fn consistently<T, F>(config: &HarnessConfig, mut check: F) -> HarnessResult<PollOutcome<T>>
where
    F: FnMut(&StoreContext) -> MatchResult<T>,
{
    let start = Instant::now();
    let deadline = start + config.timeout();
    let ctx = StoreContext::with_deadline(deadline);
    let mut last: Option<T> = None;
    let mut attempts = 0;

    loop {
        attempts += 1;
        match check(&ctx) {
            Ok(value) => last = Some(value),
            Err(error) if is_deadline(&error) && last.is_some() => break,
            Err(error) => {
                debug!(attempts, %error, "check stopped holding");
                return Err(HarnessError::Inconsistent {
                    attempt: attempts,
                    error,
                });
            }
        }

        let now = Instant::now();
        if now >= deadline {
            break;
        }
        thread::sleep(config.interval().min(deadline - now));
    }

    match last {
        Some(value) => Ok(PollOutcome {
            value,
            attempts,
            elapsed: start.elapsed(),
        }),
        None => Err(HarnessError::Check(MatchError::Store(
            StoreError::DeadlineExceeded,
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube_assert::MismatchReport;

    fn config(timeout_ms: u64, interval_ms: u64) -> HarnessConfig {
        HarnessConfig::default()
            .with_timeout(Duration::from_millis(timeout_ms))
            .with_interval(Duration::from_millis(interval_ms))
    }

    fn mismatch() -> MatchError {
        MatchError::Mismatch(MismatchReport::new())
    }

    #[test]
    fn test_eventually_retries_until_success() {
        let mut calls = 0;
        let outcome = eventually(&config(2000, 1), |_| {
            calls += 1;
            if calls < 3 {
                Err(mismatch())
            } else {
                Ok(calls)
            }
        })
        .unwrap();
        assert_eq!(outcome.value, 3);
        assert_eq!(outcome.attempts, 3);
    }

    #[test]
    fn test_eventually_times_out_with_last_error() {
        let result: HarnessResult<PollOutcome<()>> = eventually(&config(20, 5), |_| {
            Err(MatchError::NoCandidates {
                identity: "v1/ConfigMap".into(),
            })
        });
        match result.unwrap_err() {
            HarnessError::Timeout { attempts, last } => {
                assert!(attempts >= 2);
                assert_eq!(last.to_string(), "no actual resource found");
            }
            other => panic!("expected a timeout, got {:?}", other),
        }
    }

    #[test]
    fn test_eventually_aborts_on_fatal_error() {
        let mut calls = 0;
        let result: HarnessResult<PollOutcome<()>> = eventually(&config(2000, 1), |_| {
            calls += 1;
            Err(MatchError::UndefinedVariable { name: "ns".into() })
        });
        assert!(matches!(result, Err(HarnessError::Check(_))));
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_eventually_passes_deadline_to_check() {
        let outcome = eventually(&config(1000, 1), |ctx| Ok(ctx.deadline())).unwrap();
        assert!(outcome.value.is_some());
    }

    #[test]
    fn test_consistently_holds() {
        let outcome = consistently(&config(20, 5), |_| Ok(())).unwrap();
        assert!(outcome.attempts >= 2);
    }

    #[test]
    fn test_consistently_reports_first_failure() {
        let mut calls = 0;
        let result: HarnessResult<PollOutcome<()>> = consistently(&config(2000, 1), |_| {
            calls += 1;
            if calls == 2 {
                Err(mismatch())
            } else {
                Ok(())
            }
        });
        match result.unwrap_err() {
            HarnessError::Inconsistent { attempt, .. } => assert_eq!(attempt, 2),
            other => panic!("expected an inconsistency, got {:?}", other),
        }
    }
}
