//! Error taxonomy and retry policy for chunk attempts.

mod error;
mod policy;

pub use error::{TmpDirState, WorkerError};
pub use policy::{
    classify, decide, is_flaky_message, AttemptState, ErrorClass, RetryDecision, RetryPolicy,
    FLAKY_ERROR_PATTERNS,
};
