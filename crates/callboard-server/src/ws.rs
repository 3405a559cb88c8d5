//! Per-connection WebSocket loop.
//!
//! Each socket joins at most one room. Broadcasts fan out through the room
//! channel and are never echoed to their sender. History requests run against
//! the shared store and are answered on the requesting socket only.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use callboard_core::{BoardEvent, ClientMessage, HistoryResponse, ServerMessage};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::state::{AppState, RoomEnvelope};

type Sender = SplitSink<WebSocket, Message>;

/// Sender id on messages the relay originates itself.
pub const RELAY_PEER_ID: &str = "relay";

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Serialize and send. Returns false once the socket is gone.
async fn send(sender: &mut Sender, msg: &ServerMessage) -> bool {
    match msg.to_json() {
        Ok(json) => sender.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            warn!(error = %e, "failed to serialize server message");
            true
        }
    }
}

struct Connection {
    peer_id: String,
    room: Option<String>,
    room_rx: Option<broadcast::Receiver<RoomEnvelope>>,
}

impl Connection {
    fn leave(&mut self, state: &AppState) {
        if let Some(room) = self.room.take() {
            state.leave_room(&room, &self.peer_id);
            state.broadcast(
                &room,
                &self.peer_id,
                ServerMessage::PeerLeft {
                    peer_id: self.peer_id.clone(),
                },
            );
            info!(peer = %self.peer_id, %room, "peer left room");
        }
        self.room_rx = None;
    }
}

/// What a room broadcast turns into for one socket.
#[derive(Debug, PartialEq)]
enum Delivery {
    Send(ServerMessage),
    Skip,
    Closed,
}

fn delivery(peer_id: &str, msg: Result<RoomEnvelope, RecvError>) -> Delivery {
    match msg {
        // Don't echo back to sender
        Ok((from, _)) if from == peer_id => Delivery::Skip,
        Ok((_, server_msg)) => Delivery::Send(server_msg),
        Err(RecvError::Lagged(skipped)) => {
            // The skipped messages may include the clear or refetch that would
            // have resynced this peer, so make it reload now.
            warn!(peer = %peer_id, skipped, "peer lagging, requesting reload");
            Delivery::Send(ServerMessage::Event {
                from: RELAY_PEER_ID.to_string(),
                event: BoardEvent::Refetch,
            })
        }
        Err(RecvError::Closed) => Delivery::Closed,
    }
}

/// Handle one client message. Returns false once the socket is gone.
async fn handle_client_message(
    conn: &mut Connection,
    state: &AppState,
    sender: &mut Sender,
    msg: ClientMessage,
) -> bool {
    match msg {
        ClientMessage::Join { room } => {
            conn.leave(state);

            let (rx, peer_count) = state.join_room(&room, &conn.peer_id);
            conn.room_rx = Some(rx);
            conn.room = Some(room.clone());

            let joined = ServerMessage::Joined {
                room: room.clone(),
                peer_count,
            };
            if !send(sender, &joined).await {
                return false;
            }
            state.broadcast(
                &room,
                &conn.peer_id,
                ServerMessage::PeerJoined {
                    peer_id: conn.peer_id.clone(),
                },
            );
            info!(peer = %conn.peer_id, %room, peer_count, "peer joined room");
            true
        }
        ClientMessage::Leave => {
            conn.leave(state);
            true
        }
        ClientMessage::Broadcast { event } => {
            if let Some(room) = &conn.room {
                state.broadcast(
                    room,
                    &conn.peer_id,
                    ServerMessage::Event {
                        from: conn.peer_id.clone(),
                        event,
                    },
                );
            }
            true
        }
        ClientMessage::History {
            request_id,
            request,
        } => {
            let response = match &conn.room {
                Some(room) => {
                    debug!(peer = %conn.peer_id, %room, op = request.name(), "history request");
                    state.run_history(room, request).await
                }
                None => HistoryResponse::Failed {
                    message: "not in a room".to_string(),
                },
            };
            send(sender, &ServerMessage::History { request_id, response }).await
        }
    }
}

/// Handle a WebSocket connection
pub async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let mut conn = Connection {
        peer_id: Uuid::new_v4().to_string(),
        room: None,
        room_rx: None,
    };
    info!(peer = %conn.peer_id, "new connection");

    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            // Handle incoming messages from client
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(client_msg) => {
                                if !handle_client_message(&mut conn, &state, &mut sender, client_msg).await {
                                    break;
                                }
                            }
                            Err(e) => {
                                warn!(peer = %conn.peer_id, error = %e, "invalid message");
                                let err = ServerMessage::Error {
                                    message: format!("Invalid message: {}", e),
                                };
                                if !send(&mut sender, &err).await {
                                    break;
                                }
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {} // Ignore binary and ping/pong
                    Some(Err(e)) => {
                        warn!(peer = %conn.peer_id, error = %e, "websocket error");
                        break;
                    }
                }
            }

            // Handle broadcast messages from room
            msg = async {
                match &mut conn.room_rx {
                    Some(rx) => rx.recv().await,
                    None => std::future::pending().await,
                }
            } => {
                match delivery(&conn.peer_id, msg) {
                    Delivery::Send(server_msg) => {
                        if !send(&mut sender, &server_msg).await {
                            break;
                        }
                    }
                    Delivery::Skip => {}
                    Delivery::Closed => conn.room_rx = None,
                }
            }
        }
    }

    // Cleanup on disconnect
    conn.leave(&state);
    info!(peer = %conn.peer_id, "connection closed");
}
