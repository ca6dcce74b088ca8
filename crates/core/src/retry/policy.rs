//! Retry classification and decision.
//!
//! Two independent axes decide whether a failed chunk runs again:
//! - the error class: flaky errors are retried outside the caller's budget,
//!   non-retryable classes always abort;
//! - the caller's `max_retries` budget, spent only by non-flaky failures.

use serde::{Deserialize, Serialize};

use super::error::WorkerError;

/// Substrings identifying transient infrastructure failures.
pub const FLAKY_ERROR_PATTERNS: &[&str] = &[
    "ECONNRESET",
    "ECONNREFUSED",
    "EPIPE",
    "socket hang up",
    "Connection reset",
    "Connection closed",
    "Target closed",
    "Session closed",
    "Compositor exited",
    "Process exited with signal",
    "SIGKILL",
    "SIGSEGV",
    "error while loading shared libraries",
    "zygote_communication",
    "Timed out while setting up the headless browser",
];

/// Coarse error class driving the retry decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    Flaky,
    Validation,
    VersionMismatch,
    Fatal,
    WorkerFailure,
    Cancelled,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Flaky => "flaky",
            Self::Validation => "validation",
            Self::VersionMismatch => "version_mismatch",
            Self::Fatal => "fatal",
            Self::WorkerFailure => "worker_failure",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether any budget can make this class retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Flaky | Self::WorkerFailure)
    }
}

/// Whether a free-form message matches the flaky allow-list.
pub fn is_flaky_message(message: &str) -> bool {
    FLAKY_ERROR_PATTERNS.iter().any(|p| message.contains(p))
}

/// Classifies a worker error.
pub fn classify(error: &WorkerError) -> ErrorClass {
    match error {
        WorkerError::Flaky { .. } | WorkerError::Timeout { .. } => ErrorClass::Flaky,
        WorkerError::Validation { .. } => ErrorClass::Validation,
        WorkerError::VersionMismatch { .. } => ErrorClass::VersionMismatch,
        WorkerError::Fatal { .. } => ErrorClass::Fatal,
        WorkerError::Cancelled => ErrorClass::Cancelled,
        WorkerError::StorageExhaustion { .. } => ErrorClass::WorkerFailure,
        WorkerError::Failure { message, stack } => {
            let in_stack = stack.as_deref().map(is_flaky_message).unwrap_or(false);
            if is_flaky_message(message) || in_stack {
                ErrorClass::Flaky
            } else {
                ErrorClass::WorkerFailure
            }
        }
    }
}

/// Decision for one failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry { consumes_budget: bool },
    Abort,
}

impl RetryDecision {
    pub fn is_retry(&self) -> bool {
        matches!(self, Self::Retry { .. })
    }
}

/// Retry bookkeeping for one chunk. Explicit state, advanced per failure.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttemptState {
    /// Retries granted against the caller's budget.
    pub budget_used: u32,
    /// Retries granted for flaky failures.
    pub flaky_retries: u32,
}

impl AttemptState {
    /// Total attempts made so far, assuming the current one failed.
    pub fn attempts(&self) -> u32 {
        self.budget_used + self.flaky_retries + 1
    }

    /// Advances the state after a retry decision.
    pub fn record(&mut self, decision: RetryDecision) {
        if let RetryDecision::Retry { consumes_budget } = decision {
            if consumes_budget {
                self.budget_used += 1;
            } else {
                self.flaky_retries += 1;
            }
        }
    }
}

/// Pure retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self { max_retries }
    }

    /// Decides whether a failed attempt is retried.
    ///
    /// Flaky failures never spend the budget. They are granted while the
    /// retries made so far fit in the budget, which leaves exactly one bonus
    /// attempt once the budget is gone; a zero budget still survives one
    /// flaky failure.
    pub fn decide(&self, error: &WorkerError, state: &AttemptState) -> RetryDecision {
        match classify(error) {
            ErrorClass::Flaky => {
                if state.budget_used + state.flaky_retries <= self.max_retries {
                    RetryDecision::Retry {
                        consumes_budget: false,
                    }
                } else {
                    RetryDecision::Abort
                }
            }
            ErrorClass::WorkerFailure => {
                if state.budget_used < self.max_retries {
                    RetryDecision::Retry {
                        consumes_budget: true,
                    }
                } else {
                    RetryDecision::Abort
                }
            }
            ErrorClass::Validation
            | ErrorClass::VersionMismatch
            | ErrorClass::Fatal
            | ErrorClass::Cancelled => RetryDecision::Abort,
        }
    }
}

/// Stateless form of [`RetryPolicy::decide`].
pub fn decide(error: &WorkerError, state: &AttemptState, max_retries: u32) -> RetryDecision {
    RetryPolicy::new(max_retries).decide(error, state)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(policy: RetryPolicy, errors: &[WorkerError]) -> Vec<RetryDecision> {
        let mut state = AttemptState::default();
        errors
            .iter()
            .map(|e| {
                let d = policy.decide(e, &state);
                state.record(d);
                d
            })
            .collect()
    }

    #[test]
    fn test_classify_allow_list() {
        assert_eq!(
            classify(&WorkerError::failure("read ECONNRESET")),
            ErrorClass::Flaky
        );
        assert_eq!(
            classify(&WorkerError::Failure {
                message: "render failed".into(),
                stack: Some("Protocol error: Target closed.".into()),
            }),
            ErrorClass::Flaky
        );
        assert_eq!(
            classify(&WorkerError::failure("undefined is not a function")),
            ErrorClass::WorkerFailure
        );
        assert_eq!(
            classify(&WorkerError::Timeout { timeout_ms: 10 }),
            ErrorClass::Flaky
        );
    }

    #[test]
    fn test_storage_exhaustion_spends_budget() {
        let err = WorkerError::StorageExhaustion {
            message: "ENOSPC".into(),
            tmp_dir: None,
        };
        assert_eq!(classify(&err), ErrorClass::WorkerFailure);
        let decisions = run(RetryPolicy::new(1), &[err.clone(), err]);
        assert_eq!(
            decisions,
            vec![
                RetryDecision::Retry {
                    consumes_budget: true
                },
                RetryDecision::Abort
            ]
        );
    }

    #[test]
    fn test_flaky_bonus_with_zero_budget() {
        let flaky = WorkerError::flaky("Target closed");
        let decisions = run(RetryPolicy::new(0), &[flaky.clone(), flaky]);
        assert_eq!(
            decisions,
            vec![
                RetryDecision::Retry {
                    consumes_budget: false
                },
                RetryDecision::Abort
            ]
        );
    }

    #[test]
    fn test_flaky_does_not_consume_budget() {
        let flaky = WorkerError::flaky("socket hang up");
        let real = WorkerError::failure("bad frame");
        let decisions = run(
            RetryPolicy::new(1),
            &[flaky.clone(), flaky, real.clone(), real],
        );
        assert_eq!(
            decisions,
            vec![
                RetryDecision::Retry {
                    consumes_budget: false
                },
                RetryDecision::Retry {
                    consumes_budget: false
                },
                RetryDecision::Retry {
                    consumes_budget: true
                },
                RetryDecision::Abort,
            ]
        );
    }

    #[test]
    fn test_flaky_retried_after_budget_exhausted() {
        let real = WorkerError::failure("bad frame");
        let flaky = WorkerError::flaky("ECONNRESET");
        let decisions = run(RetryPolicy::new(1), &[real, flaky]);
        assert!(decisions[0].is_retry());
        assert!(decisions[1].is_retry());
    }

    #[test]
    fn test_flaky_bonus_is_single_after_budget_spent() {
        let real = WorkerError::failure("bad frame");
        let flaky = WorkerError::flaky("Target closed");
        let mut errors = vec![real.clone(), real.clone(), real];
        errors.extend(std::iter::repeat(flaky).take(5));

        let decisions = run(RetryPolicy::new(3), &errors);
        assert!(decisions[..3].iter().all(|d| *d
            == RetryDecision::Retry {
                consumes_budget: true
            }));
        assert_eq!(
            decisions[3],
            RetryDecision::Retry {
                consumes_budget: false
            }
        );
        assert!(decisions[4..].iter().all(|d| *d == RetryDecision::Abort));
    }

    #[test]
    fn test_non_retryable_always_abort() {
        let policy = RetryPolicy::new(100);
        let state = AttemptState::default();
        for err in [
            WorkerError::Validation {
                message: "bad".into(),
            },
            WorkerError::VersionMismatch {
                worker: "1".into(),
                caller: "2".into(),
            },
            WorkerError::Fatal {
                message: "no credentials".into(),
            },
            WorkerError::Cancelled,
        ] {
            assert_eq!(policy.decide(&err, &state), RetryDecision::Abort);
        }
    }

    #[test]
    fn test_attempts_counter() {
        let mut state = AttemptState::default();
        assert_eq!(state.attempts(), 1);
        state.record(RetryDecision::Retry {
            consumes_budget: false,
        });
        state.record(RetryDecision::Retry {
            consumes_budget: true,
        });
        state.record(RetryDecision::Abort);
        assert_eq!(state.attempts(), 3);
    }
}
