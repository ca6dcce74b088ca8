//! Muxer trait definition.

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::error::CombineError;
use super::types::{ConcatRequest, MuxProgress, MuxRequest};

/// Lossless stream concatenation and muxing.
///
/// Implementations never re-encode. Progress is sent best-effort and may be
/// dropped when the receiver is slow.
#[async_trait]
pub trait MediaMuxer: Send + Sync {
    /// Returns the name of this muxer implementation.
    fn name(&self) -> &str;

    /// Concatenates segments of one stream into a single file.
    async fn concat(
        &self,
        request: ConcatRequest,
        progress: mpsc::Sender<MuxProgress>,
    ) -> Result<(), CombineError>;

    /// Muxes the inputs into the final output.
    async fn mux(
        &self,
        request: MuxRequest,
        progress: mpsc::Sender<MuxProgress>,
    ) -> Result<(), CombineError>;

    /// Checks that the muxer can run (binaries present, temp dir writable).
    async fn validate(&self) -> Result<(), CombineError>;
}
