//! Callboard WebSocket Relay Server
//!
//! Relays live board events between clients in the same room and owns the
//! authoritative per-room stroke history.
//!
//! ## Protocol
//!
//! Messages are JSON with the following format:
//! ```json
//! { "type": "join", "room": "room-id" }
//! { "type": "broadcast", "event": { "type": "draw", "x": 10, "y": 4, "prevX": 8, "prevY": 3, "color": 0, "width": 2 } }
//! { "type": "broadcast", "event": { "type": "refetch" } }
//! { "type": "history", "request_id": 7, "request": { "op": "undo" } }
//! ```

pub mod config;
pub mod state;
pub mod ws;

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use callboard_core::{HistoryRequest, HistoryResponse, HistorySnapshot};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use config::ServerConfig;
pub use state::{AppState, RoomInfo};

/// Build the router.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/ws", get(ws::ws_handler))
        .route("/health", get(health))
        .route("/rooms", get(list_rooms))
        .route("/rooms/{room}/history", get(room_history))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Index page
async fn index() -> &'static str {
    "Callboard Relay Server - Connect via WebSocket at /ws"
}

/// Health check
async fn health() -> &'static str {
    "ok"
}

async fn list_rooms(State(state): State<Arc<AppState>>) -> Json<Vec<RoomInfo>> {
    Json(state.rooms())
}

/// Read-only view of a room's visible history.
async fn room_history(
    Path(room): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<HistorySnapshot>, (StatusCode, String)> {
    match state.run_history(&room, HistoryRequest::GetHistory).await {
        HistoryResponse::Snapshot(snapshot) => Ok(Json(snapshot)),
        HistoryResponse::Failed { message } => Err((StatusCode::INTERNAL_SERVER_ERROR, message)),
        other => {
            tracing::error!(%room, ?other, "unexpected history response");
            Err((StatusCode::INTERNAL_SERVER_ERROR, "unexpected history response".to_string()))
        }
    }
}
