//! Bounded-concurrency chunk dispatch.
//!
//! Chunks are started in index order, at most `concurrency_limit` at a
//! time. Each chunk runs an explicit retry loop driven by
//! [`RetryPolicy`](crate::retry::RetryPolicy). Results are keyed by chunk
//! index, never by arrival order.

mod config;
mod runner;
mod types;

pub use config::DispatcherConfig;
pub use runner::Dispatcher;
pub use types::{DispatchError, DispatchOutcome, ErrorReport};
