//! In-memory history store.

use super::{BoxFuture, HistoryStore, StoreError, StoreResult};
use crate::history::{HistoryFlags, HistoryLog, HistorySnapshot};
use crate::stroke::{Segment, Stroke};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

pub(crate) fn lock_error<T>(e: PoisonError<T>) -> StoreError {
    StoreError::Other(format!("Lock error: {}", e))
}

/// Room name to log, each log behind its own mutex.
#[derive(Default)]
pub(crate) struct RoomLogs {
    rooms: RwLock<HashMap<String, Arc<Mutex<HistoryLog>>>>,
}

impl RoomLogs {
    /// Get the log for `room`, creating it with `load` on first use.
    pub(crate) fn get_or_load(
        &self,
        room: &str,
        load: impl FnOnce() -> StoreResult<HistoryLog>,
    ) -> StoreResult<Arc<Mutex<HistoryLog>>> {
        {
            let rooms = self.rooms.read().map_err(lock_error)?;
            if let Some(log) = rooms.get(room) {
                return Ok(Arc::clone(log));
            }
        }

        let mut rooms = self.rooms.write().map_err(lock_error)?;
        if let Some(log) = rooms.get(room) {
            return Ok(Arc::clone(log));
        }
        let log = Arc::new(Mutex::new(load()?));
        rooms.insert(room.to_string(), Arc::clone(&log));
        Ok(log)
    }

    pub(crate) fn room_count(&self) -> usize {
        self.rooms.read().map(|rooms| rooms.len()).unwrap_or(0)
    }
}

/// In-memory store for tests and ephemeral servers.
#[derive(Default)]
pub struct MemoryHistoryStore {
    rooms: RoomLogs,
}

impl MemoryHistoryStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rooms that have been touched.
    pub fn room_count(&self) -> usize {
        self.rooms.room_count()
    }

    fn with_log<T>(&self, room: &str, f: impl FnOnce(&mut HistoryLog) -> T) -> StoreResult<T> {
        let log = self.rooms.get_or_load(room, || Ok(HistoryLog::new()))?;
        let mut log = log.lock().map_err(lock_error)?;
        Ok(f(&mut log))
    }
}

impl HistoryStore for MemoryHistoryStore {
    fn append_stroke(&self, room: &str, segments: Vec<Segment>) -> BoxFuture<'_, StoreResult<HistoryFlags>> {
        let room = room.to_string();
        Box::pin(async move {
            let stroke = Stroke::new(segments)?;
            self.with_log(&room, |log| log.append(stroke))
        })
    }

    fn clear_board(&self, room: &str) -> BoxFuture<'_, StoreResult<HistoryFlags>> {
        let room = room.to_string();
        Box::pin(async move { self.with_log(&room, HistoryLog::clear) })
    }

    fn undo(&self, room: &str) -> BoxFuture<'_, StoreResult<HistoryFlags>> {
        let room = room.to_string();
        Box::pin(async move { self.with_log(&room, HistoryLog::undo) })
    }

    fn redo(&self, room: &str) -> BoxFuture<'_, StoreResult<HistoryFlags>> {
        let room = room.to_string();
        Box::pin(async move { self.with_log(&room, HistoryLog::redo) })
    }

    fn get_history(&self, room: &str) -> BoxFuture<'_, StoreResult<HistorySnapshot>> {
        let room = room.to_string();
        Box::pin(async move { self.with_log(&room, |log| log.snapshot()) })
    }
}
