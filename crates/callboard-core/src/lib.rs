//! Callboard Core Library
//!
//! Platform-agnostic stroke capture, history and synchronization engine for
//! the Callboard shared whiteboard.

pub mod camera;
pub mod capture;
pub mod history;
pub mod session;
pub mod storage;
pub mod stroke;
pub mod surface;
pub mod sync;

pub use camera::Camera;
pub use capture::{CaptureConfig, CapturedStroke, StrokeCapture};
pub use history::{HistoryEntry, HistoryFlags, HistoryLog, HistorySnapshot};
pub use session::{BoardSession, SessionConfig, SessionEvent, SyncState};
pub use storage::{HistoryStore, MemoryHistoryStore, StoreError, StoreResult};
#[cfg(not(target_arch = "wasm32"))]
pub use storage::FileHistoryStore;
pub use stroke::{Segment, Stroke, StrokeColor, StrokeError, StrokeId, StrokeStyle};
pub use surface::{PaintBatch, RenderSurface};
pub use sync::{
    BoardEvent, ClientMessage, ConnectionState, HistoryRequest, HistoryResponse, PeerTransport,
    ServerMessage, TransportEvent,
};
#[cfg(not(target_arch = "wasm32"))]
pub use sync::PlatformWebSocket;
