//! History Store: the durable, per-room authority for stroke history.
//!
//! Every operation is room scoped and serialized per room, so concurrent
//! appends from different clients land in a single total order.

#[cfg(not(target_arch = "wasm32"))]
mod file;
mod memory;

#[cfg(not(target_arch = "wasm32"))]
pub use file::FileHistoryStore;
pub use memory::MemoryHistoryStore;

use crate::history::{HistoryFlags, HistorySnapshot};
use crate::stroke::{Segment, StrokeError};
use crate::sync::{HistoryRequest, HistoryResponse};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Storage errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Invalid stroke: {0}")]
    InvalidStroke(#[from] StrokeError),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("IO error: {0}")]
    Io(String),
    #[error("Storage error: {0}")]
    Other(String),
}

/// Result type for storage operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Boxed future returned by store operations.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Trait for history store backends.
pub trait HistoryStore: Send + Sync {
    /// Append a completed stroke, discarding any redoable entries.
    fn append_stroke(&self, room: &str, segments: Vec<Segment>) -> BoxFuture<'_, StoreResult<HistoryFlags>>;

    /// Record a clear of the whole board.
    fn clear_board(&self, room: &str) -> BoxFuture<'_, StoreResult<HistoryFlags>>;

    /// Hide the most recent applied entry.
    fn undo(&self, room: &str) -> BoxFuture<'_, StoreResult<HistoryFlags>>;

    /// Restore the most recently hidden entry.
    fn redo(&self, room: &str) -> BoxFuture<'_, StoreResult<HistoryFlags>>;

    /// Visible strokes plus undo/redo availability.
    fn get_history(&self, room: &str) -> BoxFuture<'_, StoreResult<HistorySnapshot>>;
}

/// Run one wire request against a store. Failures become `HistoryResponse::Failed`.
pub async fn execute(store: &dyn HistoryStore, room: &str, request: HistoryRequest) -> HistoryResponse {
    let op = request.name();
    let result = match request {
        HistoryRequest::AppendStroke { segments } => store
            .append_stroke(room, segments)
            .await
            .map(HistoryResponse::Flags),
        HistoryRequest::ClearBoard => store.clear_board(room).await.map(HistoryResponse::Flags),
        HistoryRequest::Undo => store.undo(room).await.map(HistoryResponse::Flags),
        HistoryRequest::Redo => store.redo(room).await.map(HistoryResponse::Flags),
        HistoryRequest::GetHistory => store.get_history(room).await.map(HistoryResponse::Snapshot),
    };

    result.unwrap_or_else(|e| {
        log::warn!("History {} failed for room {}: {}", op, room, e);
        HistoryResponse::Failed {
            message: e.to_string(),
        }
    })
}
