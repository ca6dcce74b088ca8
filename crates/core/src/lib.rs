pub mod cleanup;
pub mod combiner;
pub mod config;
pub mod cost;
pub mod dispatcher;
pub mod job;
pub mod metrics;
pub mod orchestrator;
pub mod planner;
pub mod progress;
pub mod retry;
pub mod storage;
pub mod testing;
pub mod worker;

pub use cleanup::{CleanupConfig, CleanupCoordinator, CleanupError, CleanupReport};
pub use combiner::{ArtifactCombiner, CombineError, CombinerConfig, FfmpegMuxer, MediaMuxer};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, StorageBackend,
};
pub use cost::{CostEstimate, CostEstimator, LambdaPricing, PricingConfig, PricingTable};
pub use dispatcher::{DispatchError, DispatchOutcome, Dispatcher, DispatcherConfig, ErrorReport};
pub use job::{
    validate_request, AudioCodec, ChunkJob, ChunkResult, ChunkStatus, Codec, FrameRange, JobType,
    RenderMetadata, RenderRequest, RetryRecord, ValidationError,
};
pub use orchestrator::{
    JobError, OrchestratorConfig, RenderOrchestrator, RenderOutcome, RenderSettings, RenderSummary,
};
pub use planner::{plan_chunks, ChunkPlan, PlanError, PlanRequest, PlannerConfig};
pub use progress::{
    create_progress_channel, LogProgressSink, ProgressEvent, ProgressHandle, ProgressSink,
    ProgressSnapshot, Stage, WatchProgressSink,
};
pub use retry::{ErrorClass, RetryDecision, RetryPolicy, WorkerError};
pub use storage::{FsObjectStore, InMemoryObjectStore, ObjectInfo, ObjectStore, StorageError};
pub use worker::{HttpRenderWorker, JobContext, RenderWorker, WorkerConfig};
