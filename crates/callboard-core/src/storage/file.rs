//! File-backed history store.

use super::memory::{RoomLogs, lock_error};
use super::{BoxFuture, HistoryStore, StoreError, StoreResult};
use crate::history::{HistoryFlags, HistoryLog, HistorySnapshot};
use crate::stroke::{Segment, Stroke};
use std::fs;
use std::path::{Path, PathBuf};

/// History store that keeps one JSON file per room.
///
/// Logs are loaded lazily on first access and written through after every
/// mutation while the room lock is held, so the file order matches the order
/// in which clients observed the results.
///
/// File IO happens synchronously inside the returned futures. Async callers
/// should drive them from a blocking-capable thread.
pub struct FileHistoryStore {
    /// Base directory for room logs.
    base_path: PathBuf,
    rooms: RoomLogs,
}

impl FileHistoryStore {
    /// Create a new file store with the given base directory.
    ///
    /// Creates the directory if it doesn't exist.
    pub fn new(base_path: PathBuf) -> StoreResult<Self> {
        if !base_path.exists() {
            fs::create_dir_all(&base_path).map_err(|e| {
                StoreError::Io(format!("Failed to create storage directory: {}", e))
            })?;
        }
        Ok(Self {
            base_path,
            rooms: RoomLogs::default(),
        })
    }

    /// Create a file store in the default location.
    ///
    /// On Unix: `~/.local/share/callboard/history/`
    /// On Windows: `%LOCALAPPDATA%\callboard\history\`
    pub fn default_location() -> StoreResult<Self> {
        let base = dirs::data_local_dir()
            .or_else(dirs::home_dir)
            .ok_or_else(|| StoreError::Io("Could not determine home directory".to_string()))?;

        Self::new(base.join("callboard").join("history"))
    }

    /// Get the base path.
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Get the file path for a room.
    fn room_path(&self, room: &str) -> PathBuf {
        let safe_id: String = room
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.base_path.join(format!("{}.json", safe_id))
    }

    fn read_log(&self, room: &str) -> StoreResult<HistoryLog> {
        let path = self.room_path(room);
        if !path.exists() {
            return Ok(HistoryLog::new());
        }
        let json = fs::read_to_string(&path).map_err(|e| {
            StoreError::Io(format!("Failed to read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&json).map_err(|e| {
            StoreError::Serialization(format!("Failed to parse {}: {}", path.display(), e))
        })
    }

    fn write_log(&self, room: &str, log: &HistoryLog) -> StoreResult<()> {
        let path = self.room_path(room);
        let json = serde_json::to_string(log)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|e| {
            StoreError::Io(format!("Failed to write {}: {}", tmp.display(), e))
        })?;
        fs::rename(&tmp, &path).map_err(|e| {
            StoreError::Io(format!("Failed to replace {}: {}", path.display(), e))
        })
    }

    /// Apply `f` to a copy of the room log, persist it, then commit it.
    /// A failed write leaves both the file and the in-memory log unchanged.
    fn mutate<T>(&self, room: &str, f: impl FnOnce(&mut HistoryLog) -> T) -> StoreResult<T> {
        let shared = self.rooms.get_or_load(room, || self.read_log(room))?;
        let mut log = shared.lock().map_err(lock_error)?;
        let mut next = log.clone();
        let result = f(&mut next);
        if next != *log {
            self.write_log(room, &next)?;
            *log = next;
        }
        Ok(result)
    }

    fn read<T>(&self, room: &str, f: impl FnOnce(&HistoryLog) -> T) -> StoreResult<T> {
        let shared = self.rooms.get_or_load(room, || self.read_log(room))?;
        let log = shared.lock().map_err(lock_error)?;
        Ok(f(&log))
    }
}

impl HistoryStore for FileHistoryStore {
    fn append_stroke(&self, room: &str, segments: Vec<Segment>) -> BoxFuture<'_, StoreResult<HistoryFlags>> {
        let room = room.to_string();
        Box::pin(async move {
            let stroke = Stroke::new(segments)?;
            self.mutate(&room, |log| log.append(stroke))
        })
    }

    fn clear_board(&self, room: &str) -> BoxFuture<'_, StoreResult<HistoryFlags>> {
        let room = room.to_string();
        Box::pin(async move { self.mutate(&room, HistoryLog::clear) })
    }

    fn undo(&self, room: &str) -> BoxFuture<'_, StoreResult<HistoryFlags>> {
        let room = room.to_string();
        Box::pin(async move { self.mutate(&room, HistoryLog::undo) })
    }

    fn redo(&self, room: &str) -> BoxFuture<'_, StoreResult<HistoryFlags>> {
        let room = room.to_string();
        Box::pin(async move { self.mutate(&room, HistoryLog::redo) })
    }

    fn get_history(&self, room: &str) -> BoxFuture<'_, StoreResult<HistorySnapshot>> {
        let room = room.to_string();
        Box::pin(async move { self.read(&room, HistoryLog::snapshot) })
    }
}
