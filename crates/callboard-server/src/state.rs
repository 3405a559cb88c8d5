//! Shared server state: room membership and the history store.

use std::collections::HashSet;
use std::sync::Arc;

use callboard_core::storage::execute;
use callboard_core::{HistoryRequest, HistoryResponse, HistoryStore, ServerMessage};
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::broadcast;

/// A room broadcast: sender peer id plus the message.
pub type RoomEnvelope = (String, ServerMessage);

struct Room {
    tx: broadcast::Sender<RoomEnvelope>,
    peers: HashSet<String>,
}

impl Room {
    fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            peers: HashSet::new(),
        }
    }
}

/// Public summary of an active room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoomInfo {
    pub room: String,
    pub peers: usize,
}

pub struct AppState {
    rooms: DashMap<String, Room>,
    store: Arc<dyn HistoryStore>,
    channel_capacity: usize,
}

impl AppState {
    pub fn new(store: Arc<dyn HistoryStore>, channel_capacity: usize) -> Self {
        Self {
            rooms: DashMap::new(),
            store,
            channel_capacity: channel_capacity.max(1),
        }
    }

    /// Run a history request on the blocking pool. The file store does its
    /// IO inside the store future, which must not stall the async workers.
    pub async fn run_history(&self, room: &str, request: HistoryRequest) -> HistoryResponse {
        let store = Arc::clone(&self.store);
        let room = room.to_string();
        tokio::task::spawn_blocking(move || pollster::block_on(execute(store.as_ref(), &room, request)))
            .await
            .unwrap_or_else(|e| {
                tracing::error!(error = %e, "history task failed");
                HistoryResponse::Failed {
                    message: format!("history task failed: {}", e),
                }
            })
    }

    /// Add a peer to a room. Returns its receiver and the new peer count.
    pub fn join_room(&self, room_id: &str, peer_id: &str) -> (broadcast::Receiver<RoomEnvelope>, usize) {
        let mut room = self
            .rooms
            .entry(room_id.to_string())
            .or_insert_with(|| Room::new(self.channel_capacity));
        room.peers.insert(peer_id.to_string());
        (room.tx.subscribe(), room.peers.len())
    }

    /// Remove a peer, dropping the room once empty. History is unaffected.
    pub fn leave_room(&self, room_id: &str, peer_id: &str) {
        let empty = match self.rooms.get_mut(room_id) {
            Some(mut room) => {
                room.peers.remove(peer_id);
                room.peers.is_empty()
            }
            None => false,
        };
        if empty {
            self.rooms.remove_if(room_id, |_, room| room.peers.is_empty());
        }
    }

    /// Send to every subscriber of the room. Receivers drop their own messages.
    pub fn broadcast(&self, room_id: &str, from: &str, msg: ServerMessage) {
        if let Some(room) = self.rooms.get(room_id) {
            let _ = room.tx.send((from.to_string(), msg));
        }
    }

    pub fn peer_count(&self, room_id: &str) -> usize {
        self.rooms.get(room_id).map_or(0, |room| room.peers.len())
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Active rooms sorted by name.
    pub fn rooms(&self) -> Vec<RoomInfo> {
        let mut rooms: Vec<RoomInfo> = self
            .rooms
            .iter()
            .map(|entry| RoomInfo {
                room: entry.key().clone(),
                peers: entry.value().peers.len(),
            })
            .collect();
        rooms.sort_by(|a, b| a.room.cmp(&b.room));
        rooms
    }
}
