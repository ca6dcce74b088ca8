use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::job::keys::{chunks_prefix, timings_prefix};
use crate::metrics::FILES_CLEANED_UP;
use crate::progress::{ProgressEvent, ProgressHandle};
use crate::storage::{ObjectStore, StorageError};

use super::config::CleanupConfig;

/// Errors that can occur during cleanup.
#[derive(Debug, Error)]
pub enum CleanupError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Outcome of one cleanup run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupReport {
    pub files_deleted: usize,
    pub min_files_to_delete: usize,
    pub elapsed_ms: u64,
    pub skipped: bool,
}

impl CleanupReport {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Default::default()
        }
    }
}

/// Deletes chunk segments and timing markers of a job.
///
/// Metadata, error reports and the final output are kept.
pub struct CleanupCoordinator {
    store: Arc<dyn ObjectStore>,
    config: CleanupConfig,
}

impl CleanupCoordinator {
    pub fn new(store: Arc<dyn ObjectStore>, config: CleanupConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &CleanupConfig {
        &self.config
    }

    /// Intermediate keys currently present under the job prefix.
    pub async fn files_to_delete(&self, prefix: &str) -> Result<Vec<String>, CleanupError> {
        let mut keys: Vec<String> = self
            .store
            .list(&chunks_prefix(prefix))
            .await?
            .into_iter()
            .map(|o| o.key)
            .collect();
        keys.extend(
            self.store
                .list(&timings_prefix(prefix))
                .await?
                .into_iter()
                .map(|o| o.key),
        );
        Ok(keys)
    }

    /// Deletes the job's intermediates in batches.
    ///
    /// Skips without touching storage when cleanup is disabled or
    /// `skip_requested` is set.
    pub async fn run(
        &self,
        prefix: &str,
        skip_requested: bool,
        progress: &ProgressHandle,
    ) -> Result<CleanupReport, CleanupError> {
        if !self.config.enabled || skip_requested {
            debug!(prefix = %prefix, "Cleanup skipped");
            progress.emit(ProgressEvent::CleanupSkipped).await;
            return Ok(CleanupReport::skipped());
        }

        let started = Instant::now();
        let keys = self.files_to_delete(prefix).await?;
        progress
            .emit(ProgressEvent::CleanupStarted {
                min_files_to_delete: keys.len() as u64,
            })
            .await;

        let mut files_deleted = 0;
        for batch in keys.chunks(self.config.batch_size.max(1)) {
            files_deleted += self.store.delete(batch).await?;
            progress
                .emit(ProgressEvent::CleanupProgress {
                    files_deleted: files_deleted as u64,
                })
                .await;
        }
        FILES_CLEANED_UP.inc_by(files_deleted as u64);

        let elapsed_ms = started.elapsed().as_millis() as u64;
        progress
            .emit(ProgressEvent::CleanupDone {
                files_deleted: files_deleted as u64,
                elapsed_ms,
            })
            .await;
        info!(
            prefix = %prefix,
            "Cleaned up {} of {} intermediate objects in {}ms",
            files_deleted,
            keys.len(),
            elapsed_ms
        );

        Ok(CleanupReport {
            files_deleted,
            min_files_to_delete: keys.len(),
            elapsed_ms,
            skipped: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::keys::{chunk_key, error_key, job_prefix, metadata_key, timing_key};
    use crate::job::{ChunkTiming, StreamKind};
    use crate::progress::{create_progress_channel, ProgressSnapshot, ProgressState};
    use crate::storage::InMemoryObjectStore;

    async fn seeded_store(prefix: &str, chunks: usize) -> Arc<InMemoryObjectStore> {
        let store = Arc::new(InMemoryObjectStore::new());
        store.put(&metadata_key(prefix), b"{}".to_vec()).await.unwrap();
        for i in 0..chunks {
            store
                .put(&chunk_key(prefix, i, StreamKind::Video), vec![1])
                .await
                .unwrap();
            let timing = ChunkTiming {
                chunk_index: i,
                attempt: 1,
                start_ms: 0,
                end_ms: 10,
            };
            store.put(&timing_key(prefix, &timing), vec![]).await.unwrap();
        }
        store.put(&error_key(prefix, 0, 1), b"{}".to_vec()).await.unwrap();
        store
    }

    fn progress() -> (ProgressHandle, tokio::task::JoinHandle<ProgressState>) {
        let (handle, aggregator) =
            create_progress_channel(Arc::new(|_: &ProgressSnapshot| {}), 64);
        (handle, tokio::spawn(aggregator.run()))
    }

    #[tokio::test]
    async fn test_deletes_only_intermediates() {
        let prefix = job_prefix("job-1", None);
        let store = seeded_store(&prefix, 3).await;
        let coordinator =
            CleanupCoordinator::new(store.clone(), CleanupConfig::default().with_batch_size(2));

        let (handle, agg) = progress();
        let report = coordinator.run(&prefix, false, &handle).await.unwrap();
        drop(handle);
        let state = agg.await.unwrap();

        assert_eq!(report.files_deleted, 6);
        assert_eq!(report.min_files_to_delete, 6);
        assert!(!report.skipped);
        assert_eq!(
            store.keys().await,
            vec![error_key(&prefix, 0, 1), metadata_key(&prefix)]
        );
        let snapshot = state.snapshot();
        assert_eq!(snapshot.cleanup.total, Some(6));
        assert!(snapshot.cleanup.is_finished());
    }

    #[tokio::test]
    async fn test_cleanup_twice_is_idempotent() {
        let prefix = job_prefix("job-2", None);
        let store = seeded_store(&prefix, 4).await;
        let coordinator = CleanupCoordinator::new(store.clone(), CleanupConfig::default());
        let (handle, agg) = progress();

        coordinator.run(&prefix, false, &handle).await.unwrap();
        let after_once = store.keys().await;
        let second = coordinator.run(&prefix, false, &handle).await.unwrap();
        drop(handle);
        agg.await.unwrap();

        assert_eq!(second.files_deleted, 0);
        assert_eq!(store.keys().await, after_once);
    }

    #[tokio::test]
    async fn test_skip_leaves_storage_untouched() {
        let prefix = job_prefix("job-3", None);
        let store = seeded_store(&prefix, 2).await;
        let before = store.keys().await;

        let (handle, agg) = progress();
        let skipped_by_request = CleanupCoordinator::new(store.clone(), CleanupConfig::default())
            .run(&prefix, true, &handle)
            .await
            .unwrap();
        let skipped_by_config = CleanupCoordinator::new(store.clone(), CleanupConfig::disabled())
            .run(&prefix, false, &handle)
            .await
            .unwrap();
        drop(handle);
        let state = agg.await.unwrap();

        assert!(skipped_by_request.skipped);
        assert!(skipped_by_config.skipped);
        assert_eq!(store.keys().await, before);
        assert!(state.snapshot().cleanup.skipped);
    }
}
