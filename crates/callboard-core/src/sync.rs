//! Wire protocol and WebSocket transport for room collaboration.
//!
//! Every message is JSON with an internal `type` tag. Peer broadcasts and
//! History Store requests share one socket per client.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::history::{HistoryFlags, HistorySnapshot};
use crate::stroke::Segment;

/// Event relayed verbatim to every other peer in the room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BoardEvent {
    /// One freshly captured segment.
    Draw(Segment),
    /// Advisory wipe; always followed by a store write and a `Refetch`.
    Clear,
    /// Reload the board from the History Store.
    Refetch,
}

/// History Store operation carried over the socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum HistoryRequest {
    AppendStroke { segments: Vec<Segment> },
    ClearBoard,
    Undo,
    Redo,
    GetHistory,
}

impl HistoryRequest {
    pub fn name(&self) -> &'static str {
        match self {
            HistoryRequest::AppendStroke { .. } => "append_stroke",
            HistoryRequest::ClearBoard => "clear_board",
            HistoryRequest::Undo => "undo",
            HistoryRequest::Redo => "redo",
            HistoryRequest::GetHistory => "get_history",
        }
    }
}

/// Result of a History Store operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HistoryResponse {
    Flags(HistoryFlags),
    Snapshot(HistorySnapshot),
    Failed { message: String },
}

/// Messages sent to the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Join a room
    Join { room: String },
    /// Leave current room
    Leave,
    /// Relay an event to the other peers in the room
    Broadcast { event: BoardEvent },
    /// Run a History Store operation against the current room
    History {
        request_id: u64,
        request: HistoryRequest,
    },
}

/// Messages received from the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Confirm room join
    Joined { room: String, peer_count: usize },
    /// Peer joined the room
    PeerJoined { peer_id: String },
    /// Peer left the room
    PeerLeft { peer_id: String },
    /// Event broadcast by another peer
    Event { from: String, event: BoardEvent },
    /// Reply to a `ClientMessage::History` from this client
    History {
        request_id: u64,
        response: HistoryResponse,
    },
    /// Error message
    Error { message: String },
}

impl ClientMessage {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl ServerMessage {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// Events produced by a transport.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Connected,
    Disconnected,
    /// A raw text frame from the server.
    Message(String),
    Error { message: String },
}

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Already connected")]
    AlreadyConnected,
    #[error("Not connected")]
    NotConnected,
    #[error("Send failed: {0}")]
    Send(String),
}

/// A bidirectional text channel to the relay server.
pub trait PeerTransport {
    /// Send one text message.
    fn send(&self, msg: &str) -> Result<(), TransportError>;

    /// Drain pending events (non-blocking).
    fn poll_events(&mut self) -> Vec<TransportEvent>;

    /// Current connection state.
    fn state(&self) -> ConnectionState;

    fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }
}

/// Track connection state across a batch of events.
fn apply_state(state: &mut ConnectionState, event: &TransportEvent) {
    match event {
        TransportEvent::Connected => *state = ConnectionState::Connected,
        TransportEvent::Disconnected => *state = ConnectionState::Disconnected,
        TransportEvent::Error { .. } => *state = ConnectionState::Error,
        TransportEvent::Message(_) => {}
    }
}

// ============================================================================
// Native WebSocket Client
// ============================================================================

#[cfg(not(target_arch = "wasm32"))]
mod native_client {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpStream;
    use std::sync::mpsc::{Receiver, Sender, TryRecvError, channel};
    use std::thread::{self, JoinHandle};
    use std::time::Duration;
    use tungstenite::stream::MaybeTlsStream;
    use tungstenite::{Message, WebSocket, connect};
    use url::Url;

    /// Commands sent to the WebSocket thread.
    enum WsCommand {
        Send(String),
        Close,
    }

    /// WebSocket client for native platforms.
    ///
    /// Uses a background thread for non-blocking operation.
    pub struct NativeWebSocket {
        state: ConnectionState,
        /// Channel to send commands to the WebSocket thread.
        cmd_tx: Option<Sender<WsCommand>>,
        /// Channel to receive events from the WebSocket thread.
        event_rx: Option<Receiver<TransportEvent>>,
        _thread: Option<JoinHandle<()>>,
    }

    impl NativeWebSocket {
        /// Create a new disconnected WebSocket client.
        pub fn new() -> Self {
            Self {
                state: ConnectionState::Disconnected,
                cmd_tx: None,
                event_rx: None,
                _thread: None,
            }
        }

        /// Connect to a WebSocket server.
        pub fn connect(&mut self, url: &str) -> Result<(), TransportError> {
            if self.cmd_tx.is_some() {
                return Err(TransportError::AlreadyConnected);
            }

            let parsed = Url::parse(url).map_err(|e| TransportError::InvalidUrl(e.to_string()))?;
            if parsed.scheme() != "ws" && parsed.scheme() != "wss" {
                return Err(TransportError::InvalidUrl(format!(
                    "unsupported scheme: {}",
                    parsed.scheme()
                )));
            }

            self.state = ConnectionState::Connecting;

            let (cmd_tx, cmd_rx) = channel::<WsCommand>();
            let (event_tx, event_rx) = channel::<TransportEvent>();
            let url = url.to_string();

            let handle = thread::spawn(move || run_socket(&url, &cmd_rx, &event_tx));

            self.cmd_tx = Some(cmd_tx);
            self.event_rx = Some(event_rx);
            self._thread = Some(handle);
            Ok(())
        }

        /// Disconnect from the server.
        pub fn disconnect(&mut self) {
            if let Some(tx) = self.cmd_tx.take() {
                let _ = tx.send(WsCommand::Close);
            }
            self.event_rx = None;
            self._thread = None;
            self.state = ConnectionState::Disconnected;
        }
    }

    impl PeerTransport for NativeWebSocket {
        fn send(&self, msg: &str) -> Result<(), TransportError> {
            let tx = self.cmd_tx.as_ref().ok_or(TransportError::NotConnected)?;
            tx.send(WsCommand::Send(msg.to_string()))
                .map_err(|e| TransportError::Send(e.to_string()))
        }

        fn poll_events(&mut self) -> Vec<TransportEvent> {
            let Some(rx) = self.event_rx.as_ref() else {
                return Vec::new();
            };
            let events: Vec<TransportEvent> = rx.try_iter().collect();
            for event in &events {
                apply_state(&mut self.state, event);
            }
            if matches!(
                self.state,
                ConnectionState::Disconnected | ConnectionState::Error
            ) && !events.is_empty()
            {
                // The worker thread has exited; allow a fresh connect().
                self.cmd_tx = None;
                self._thread = None;
            }
            events
        }

        fn state(&self) -> ConnectionState {
            self.state
        }
    }

    impl Default for NativeWebSocket {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Drop for NativeWebSocket {
        fn drop(&mut self) {
            self.disconnect();
        }
    }

    fn set_timeouts(socket: &mut WebSocket<MaybeTlsStream<TcpStream>>) {
        match socket.get_mut() {
            MaybeTlsStream::Plain(tcp) => {
                let _ = tcp.set_read_timeout(Some(Duration::from_millis(50)));
                let _ = tcp.set_write_timeout(Some(Duration::from_secs(5)));
            }
            #[allow(unreachable_patterns)]
            _ => log::debug!("TLS stream - relying on WouldBlock/TimedOut handling"),
        }
    }

    /// Whether the worker should keep running after draining commands.
    #[derive(Debug, PartialEq, Eq)]
    enum Drain {
        Open,
        Closed,
    }

    /// Write every queued command before the next blocking read.
    fn drain_commands<S: Read + Write>(socket: &mut WebSocket<S>, cmd_rx: &Receiver<WsCommand>) -> Drain {
        loop {
            match cmd_rx.try_recv() {
                Ok(WsCommand::Send(msg)) => {
                    if let Err(e) = socket.send(Message::Text(msg)) {
                        log::error!("WebSocket send error: {}", e);
                        return Drain::Closed;
                    }
                }
                Ok(WsCommand::Close) => {
                    let _ = socket.close(None);
                    return Drain::Closed;
                }
                Err(TryRecvError::Disconnected) => return Drain::Closed,
                Err(TryRecvError::Empty) => return Drain::Open,
            }
        }
    }

    /// Worker loop: forwards commands to the socket and frames to the channel.
    fn run_socket(url: &str, cmd_rx: &Receiver<WsCommand>, event_tx: &Sender<TransportEvent>) {
        log::info!("WebSocket thread: connecting to {}", url);
        let mut socket = match connect(url) {
            Ok((socket, response)) => {
                log::info!("WebSocket connected, status: {}", response.status());
                socket
            }
            Err(e) => {
                log::error!("WebSocket connection failed: {}", e);
                let _ = event_tx.send(TransportEvent::Error {
                    message: format!("Connection failed: {}", e),
                });
                return;
            }
        };
        let _ = event_tx.send(TransportEvent::Connected);
        set_timeouts(&mut socket);

        loop {
            if drain_commands(&mut socket, cmd_rx) == Drain::Closed {
                break;
            }

            match socket.read() {
                Ok(Message::Text(txt)) => {
                    let _ = event_tx.send(TransportEvent::Message(txt));
                }
                Ok(Message::Ping(data)) => {
                    let _ = socket.send(Message::Pong(data));
                }
                Ok(Message::Close(_)) => {
                    log::info!("WebSocket received close frame");
                    break;
                }
                Ok(_) => {}
                Err(tungstenite::Error::Io(ref e))
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut => {}
                Err(e) => {
                    log::error!("WebSocket read error: {}", e);
                    break;
                }
            }
        }

        log::info!("WebSocket thread exiting");
        let _ = event_tx.send(TransportEvent::Disconnected);
    }

}

#[cfg(not(target_arch = "wasm32"))]
pub use native_client::NativeWebSocket;

/// Platform-specific WebSocket client type.
#[cfg(not(target_arch = "wasm32"))]
pub type PlatformWebSocket = NativeWebSocket;
