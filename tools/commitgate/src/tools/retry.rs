use std::fmt;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;

use crate::context::{ContextError, RunContext};
use crate::runner::ExecError;

static NETWORK_ERROR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)connection refused|connection timeout|connection timed out|connection reset|network is unreachable|no such host|temporary failure in name resolution|i/o timeout|dial tcp|tls handshake timeout|proxy error|bad gateway|service unavailable|gateway timeout",
    )
    .unwrap()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    Timeout,
    NetworkTransient,
    Permanent,
}

/// One failed installer invocation.
#[derive(Debug)]
pub enum AttemptError {
    Exec(ExecError),
    Exit { status: i32, output: String },
}

impl AttemptError {
    pub fn output(&self) -> &str {
        match self {
            AttemptError::Exec(err) => err.output(),
            AttemptError::Exit { output, .. } => output,
        }
    }
}

impl fmt::Display for AttemptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptError::Exec(err) => write!(f, "{err}"),
            AttemptError::Exit { status, .. } => write!(f, "exit status {status}"),
        }
    }
}

pub fn is_network_error(text: &str) -> bool {
    NETWORK_ERROR.is_match(text)
}

/// Decide whether a failed attempt is worth retrying.
pub fn classify(error: &AttemptError) -> FailureClass {
    match error {
        AttemptError::Exec(err) => match err.context_error() {
            Some(ContextError::DeadlineExceeded) => FailureClass::Timeout,
            Some(ContextError::Canceled) => FailureClass::Permanent,
            None if is_network_error(&err.to_string()) || is_network_error(err.output()) => {
                FailureClass::NetworkTransient
            }
            None => FailureClass::Permanent,
        },
        AttemptError::Exit { output, .. } if is_network_error(output) => FailureClass::NetworkTransient,
        AttemptError::Exit { .. } => FailureClass::Permanent,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: usize,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Pause after failed attempt `attempt` (0-based): `base × 1.5^attempt`.
    pub fn delay_for(&self, attempt: usize) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        self.base_delay.mul_f64(1.5_f64.powi(exponent))
    }
}

/// The last error of an operation that gave up.
#[derive(Debug)]
pub struct RetryError {
    pub last: AttemptError,
    pub class: FailureClass,
    pub attempts: usize,
}

/// Run `operation` until it succeeds, fails with something other than a
/// network error, or `policy.attempts` tries are used up. Backoff sleeps end
/// early when `ctx` is done.
pub fn retry_with_backoff<T, F, L>(
    ctx: &RunContext,
    policy: &RetryPolicy,
    mut operation: F,
    mut on_retry: L,
) -> Result<T, RetryError>
where
    F: FnMut(usize) -> Result<T, AttemptError>,
    L: FnMut(usize, Duration, &AttemptError),
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 0;
    loop {
        let err = match operation(attempt) {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        let class = classify(&err);
        let used = attempt + 1;
        if class != FailureClass::NetworkTransient || used >= attempts {
            return Err(RetryError {
                last: err,
                class,
                attempts: used,
            });
        }

        let delay = policy.delay_for(attempt);
        on_retry(used + 1, delay, &err);
        if let Err(reason) = ctx.sleep(delay) {
            let class = match reason {
                ContextError::DeadlineExceeded => FailureClass::Timeout,
                ContextError::Canceled => FailureClass::Permanent,
            };
            return Err(RetryError {
                last: err,
                class,
                attempts: used,
            });
        }
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    fn exit(output: &str) -> AttemptError {
        AttemptError::Exit {
            status: 1,
            output: output.to_string(),
        }
    }

    fn fast(attempts: usize) -> RetryPolicy {
        RetryPolicy {
            attempts,
            base_delay: Duration::from_millis(1),
        }
    }

    #[test]
    fn classify_network_output_as_transient() {
        assert_eq!(
            classify(&exit("dial tcp 10.0.0.1:443: connect: Connection Refused")),
            FailureClass::NetworkTransient
        );
        assert_eq!(classify(&exit("502 Bad Gateway")), FailureClass::NetworkTransient);
        assert_eq!(classify(&exit("module not found")), FailureClass::Permanent);
    }

    #[test]
    fn classify_deadline_as_timeout() {
        let err = AttemptError::Exec(ExecError::Interrupted {
            program: "go".to_string(),
            reason: ContextError::DeadlineExceeded,
            output: "dial tcp: i/o timeout".to_string(),
        });
        assert_eq!(classify(&err), FailureClass::Timeout);
    }

    #[test]
    fn classify_spawn_failure_as_permanent() {
        let err = AttemptError::Exec(ExecError::Spawn {
            program: "go".to_string(),
            source: io::Error::from(io::ErrorKind::NotFound),
        });
        assert_eq!(classify(&err), FailureClass::Permanent);
    }

    #[test]
    fn delay_grows_by_half_each_attempt() {
        let policy = RetryPolicy {
            attempts: 3,
            base_delay: Duration::from_secs(2),
        };
        assert_eq!(policy.delay_for(0), Duration::from_secs(2));
        assert_eq!(policy.delay_for(1), Duration::from_secs(3));
        assert_eq!(policy.delay_for(2), Duration::from_millis(4500));
    }

    #[test]
    fn network_errors_retry_exactly_attempts_times() {
        let mut calls = 0;
        let mut retries = Vec::new();
        let result: Result<(), _> = retry_with_backoff(
            &RunContext::background(),
            &fast(3),
            |_| {
                calls += 1;
                Err(exit("connection reset by peer"))
            },
            |next, _, _| retries.push(next),
        );
        let err = result.unwrap_err();
        assert_eq!(calls, 3);
        assert_eq!(err.attempts, 3);
        assert_eq!(err.class, FailureClass::NetworkTransient);
        assert_eq!(retries, vec![2, 3]);
        assert!(err.last.output().contains("connection reset"));
    }

    #[test]
    fn permanent_errors_are_not_retried() {
        let mut calls = 0;
        let result: Result<(), _> = retry_with_backoff(
            &RunContext::background(),
            &fast(5),
            |_| {
                calls += 1;
                Err(exit("unknown revision v9.9.9"))
            },
            |_, _, _| {},
        );
        assert_eq!(calls, 1);
        assert_eq!(result.unwrap_err().class, FailureClass::Permanent);
    }

    #[test]
    fn succeeds_after_transient_failures() {
        let value = retry_with_backoff(
            &RunContext::background(),
            &fast(3),
            |attempt| {
                if attempt < 2 {
                    Err(exit("no such host"))
                } else {
                    Ok(attempt)
                }
            },
            |_, _, _| {},
        )
        .unwrap();
        assert_eq!(value, 2);
    }

    #[test]
    fn zero_attempts_still_tries_once() {
        let mut calls = 0;
        let _: Result<(), _> = retry_with_backoff(
            &RunContext::background(),
            &fast(0),
            |_| {
                calls += 1;
                Err(exit("connection refused"))
            },
            |_, _, _| {},
        );
        assert_eq!(calls, 1);
    }

    #[test]
    fn canceled_context_stops_backoff() {
        let ctx = RunContext::background();
        let policy = RetryPolicy {
            attempts: 5,
            base_delay: Duration::from_secs(30),
        };
        let mut calls = 0;
        let result: Result<(), _> = retry_with_backoff(
            &ctx,
            &policy,
            |_| {
                calls += 1;
                ctx.cancel();
                Err(exit("connection refused"))
            },
            |_, _, _| {},
        );
        assert_eq!(calls, 1);
        assert_eq!(result.unwrap_err().class, FailureClass::Permanent);
    }
}
