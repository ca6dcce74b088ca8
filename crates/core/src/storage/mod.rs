//! Object storage for chunk segments, timing markers and job metadata.
//!
//! Writes are append-only per key and deletes are idempotent, so concurrent
//! workers never race on the same object.

mod error;
mod fs;
mod memory;
mod traits;

pub use error::StorageError;
pub use fs::FsObjectStore;
pub use memory::InMemoryObjectStore;
pub use traits::{content_hash, get_json, put_json, ObjectInfo, ObjectStore};
