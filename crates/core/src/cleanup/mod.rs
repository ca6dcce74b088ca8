//! Deletion of intermediate job objects.
//!
//! Safe to run any number of times: the listing only returns objects that
//! still exist and deleting an absent key is a no-op.

mod config;
mod coordinator;

pub use config::CleanupConfig;
pub use coordinator::{CleanupCoordinator, CleanupError, CleanupReport};
