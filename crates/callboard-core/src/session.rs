//! Board session: the per-room history sync controller.
//!
//! A session turns pointer input into painted, broadcast and submitted
//! strokes, and keeps the local render surface consistent with the History
//! Store by reloading it whenever a peer signals a change.
//!
//! The session never touches the network itself. Outgoing messages are queued
//! as JSON and drained with [`BoardSession::take_outgoing`], incoming messages
//! are fed to [`BoardSession::handle_message`]. [`BoardSession::pump`] does
//! both against a [`PeerTransport`].

use std::collections::HashMap;

use kurbo::Point;

use crate::camera::Camera;
use crate::capture::{CaptureConfig, StrokeCapture};
use crate::history::{HistoryFlags, HistorySnapshot};
use crate::stroke::{Segment, StrokeColor, StrokeStyle, validate_segments};
use crate::surface::RenderSurface;
use crate::sync::{
    BoardEvent, ClientMessage, HistoryRequest, HistoryResponse, PeerTransport, ServerMessage,
    TransportEvent,
};

/// Default tool width in screen pixels.
pub const DEFAULT_TOOL_WIDTH: f64 = 2.0;

/// Controller state as seen by the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    /// A gesture is being captured.
    Drawing,
    /// At least one completed stroke is awaiting the store's reply.
    Submitting,
}

/// Session configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionConfig {
    pub capture: CaptureConfig,
    /// Tool width in screen pixels. Divided by the zoom when a gesture starts.
    pub tool_width: f64,
    pub color: StrokeColor,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            capture: CaptureConfig::default(),
            tool_width: DEFAULT_TOOL_WIDTH,
            color: StrokeColor::BLACK,
        }
    }
}

impl SessionConfig {
    pub fn with_capture(mut self, capture: CaptureConfig) -> Self {
        self.capture = capture;
        self
    }

    pub fn with_tool_width(mut self, width: f64) -> Self {
        self.tool_width = width;
        self
    }

    pub fn with_color(mut self, color: StrokeColor) -> Self {
        self.color = color;
        self
    }
}

/// What a processed message or transport event changed.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Connected,
    Disconnected,
    Joined { room: String, peer_count: usize },
    PeerJoined { peer_id: String },
    PeerLeft { peer_id: String },
    /// A peer's live segment was painted.
    RemoteDraw { from: String, segment: Segment },
    /// A peer wiped the board; a reload has been queued.
    RemoteClear { from: String },
    /// A peer asked everyone to reload; a reload has been queued.
    RefetchRequested { from: String },
    /// The surface was rebuilt from the store.
    Reconciled { flags: HistoryFlags, strokes: usize },
    /// Undo/redo availability changed after a store write.
    FlagsChanged(HistoryFlags),
    /// A completed stroke was not recorded. It stays painted until the next reload.
    SubmitFailed { message: String },
    /// The store could not be read. The surface was left untouched.
    ReloadFailed { message: String },
    Error { message: String },
}

/// Kind of an in-flight history request.
#[derive(Debug, Clone, PartialEq)]
enum Pending {
    /// Carries the submitted segments so a snapshot taken before the append
    /// landed can repaint them.
    Append(Vec<Segment>),
    Clear,
    Undo,
    Redo,
    Reload,
}

/// Client-side controller for one board.
pub struct BoardSession {
    config: SessionConfig,
    camera: Camera,
    capture: StrokeCapture,
    surface: RenderSurface,
    flags: HistoryFlags,
    /// Room confirmed by the server.
    room: Option<String>,
    /// Room to rejoin after a reconnect.
    wanted_room: Option<String>,
    pending: HashMap<u64, Pending>,
    next_request_id: u64,
    /// Pending outgoing messages (JSON strings).
    outgoing: Vec<String>,
}

impl BoardSession {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            camera: Camera::new(),
            capture: StrokeCapture::new(config.capture),
            surface: RenderSurface::new(),
            flags: HistoryFlags::default(),
            room: None,
            wanted_room: None,
            pending: HashMap::new(),
            next_request_id: 1,
            outgoing: Vec::new(),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    pub fn surface(&self) -> &RenderSurface {
        &self.surface
    }

    pub fn flags(&self) -> HistoryFlags {
        self.flags
    }

    pub fn can_undo(&self) -> bool {
        self.flags.can_undo
    }

    pub fn can_redo(&self) -> bool {
        self.flags.can_redo
    }

    pub fn state(&self) -> SyncState {
        if self.capture.is_active() {
            SyncState::Drawing
        } else if self.pending.values().any(|p| matches!(p, Pending::Append(_))) {
            SyncState::Submitting
        } else {
            SyncState::Idle
        }
    }

    // --- Tool state ---

    /// Set the tool color. Takes effect on the next gesture.
    pub fn set_color(&mut self, color: StrokeColor) {
        self.config.color = color;
    }

    /// Set the tool width in screen pixels. Takes effect on the next gesture.
    pub fn set_tool_width(&mut self, width: f64) {
        if width.is_finite() && width > 0.0 {
            self.config.tool_width = width;
        }
    }

    pub fn set_smoothing(&mut self, smoothing: bool) {
        self.config.capture = self.config.capture.with_smoothing(smoothing);
        self.capture.set_config(self.config.capture);
    }

    // --- Pointer input ---

    /// Start a gesture at a screen position.
    pub fn pointer_down(&mut self, screen: Point) {
        if !screen.x.is_finite() || !screen.y.is_finite() {
            return;
        }
        let world = self.camera.screen_to_world(screen);
        let width = self.camera.screen_dist_to_world(self.config.tool_width);
        self.capture
            .begin(world, StrokeStyle::new(self.config.color, width));
    }

    /// Feed a pointer sample. Returns the segment painted and broadcast, if any.
    pub fn pointer_move(&mut self, screen: Point) -> Option<Segment> {
        let world = self.camera.screen_to_world(screen);
        let segment = self.capture.extend(world)?;
        self.emit_segment(segment);
        Some(segment)
    }

    /// End the gesture. Returns true when the stroke was submitted to the store.
    pub fn pointer_up(&mut self, screen: Point) -> bool {
        let world = self.camera.screen_to_world(screen);
        let Some(captured) = self.capture.finish(world) else {
            return false;
        };
        self.emit_segment(captured.terminal);

        if let Err(e) = validate_segments(&captured.segments) {
            log::warn!("Dropping malformed stroke: {}", e);
            return false;
        }
        if self.room.is_none() {
            log::debug!("Not in a room, stroke kept local only");
            return false;
        }
        self.request(
            Pending::Append(captured.segments.clone()),
            HistoryRequest::AppendStroke {
                segments: captured.segments,
            },
        );
        true
    }

    /// Abandon the gesture. Segments already painted and broadcast stay.
    pub fn pointer_cancel(&mut self) {
        self.capture.cancel();
    }

    fn emit_segment(&mut self, segment: Segment) {
        self.surface.paint_segment(&segment);
        if self.room.is_some() {
            self.queue(ClientMessage::Broadcast {
                event: BoardEvent::Draw(segment),
            });
        }
    }

    // --- History operations ---

    /// Undo the most recent entry for everyone. Returns false without any
    /// network traffic when undo is unavailable.
    pub fn perform_undo(&mut self) -> bool {
        if !self.flags.can_undo || self.room.is_none() {
            return false;
        }
        self.request(Pending::Undo, HistoryRequest::Undo);
        true
    }

    /// Redo the most recently undone entry for everyone.
    pub fn perform_redo(&mut self) -> bool {
        if !self.flags.can_redo || self.room.is_none() {
            return false;
        }
        self.request(Pending::Redo, HistoryRequest::Redo);
        true
    }

    /// Wipe the board. The local surface is cleared before any reply.
    pub fn clear_board(&mut self) {
        self.surface.clear();
        if self.room.is_none() {
            return;
        }
        self.queue(ClientMessage::Broadcast {
            event: BoardEvent::Clear,
        });
        self.request(Pending::Clear, HistoryRequest::ClearBoard);
    }

    /// Ask the store for the authoritative history. The surface is rebuilt
    /// when the snapshot arrives. Returns false when not in a room.
    pub fn reload(&mut self) -> bool {
        if self.room.is_none() {
            return false;
        }
        self.request(Pending::Reload, HistoryRequest::GetHistory);
        true
    }

    /// Rebuild the surface from a snapshot, keeping our own unconfirmed work
    /// visible: strokes submitted after the reload was sent, then any gesture
    /// in progress.
    fn reconcile(&mut self, reload_id: u64, snapshot: HistorySnapshot) -> SessionEvent {
        self.surface.replay(&snapshot.strokes);

        // The server answers one socket's requests in order, so only appends
        // sent after this reload are missing from the snapshot.
        let mut unconfirmed: Vec<(u64, &Vec<Segment>)> = self
            .pending
            .iter()
            .filter_map(|(id, kind)| match kind {
                Pending::Append(segments) if *id > reload_id => Some((*id, segments)),
                _ => None,
            })
            .collect();
        unconfirmed.sort_by_key(|(id, _)| *id);
        for (_, segments) in unconfirmed {
            for segment in segments {
                self.surface.paint_segment(segment);
            }
        }

        for segment in self.capture.pending_segments() {
            self.surface.paint_segment(segment);
        }
        self.flags = snapshot.flags();
        log::debug!(
            "Reconciled {} strokes ({} segments)",
            snapshot.strokes.len(),
            self.surface.segment_count()
        );
        SessionEvent::Reconciled {
            flags: self.flags,
            strokes: snapshot.strokes.len(),
        }
    }

    // --- Room management ---

    pub fn current_room(&self) -> Option<&str> {
        self.room.as_deref()
    }

    pub fn is_in_room(&self) -> bool {
        self.room.is_some()
    }

    /// Request to join a room. Queues the join message.
    pub fn join_room(&mut self, room: &str) {
        self.wanted_room = Some(room.to_string());
        self.queue(ClientMessage::Join {
            room: room.to_string(),
        });
    }

    /// Request to leave the current room. Queues the leave message.
    pub fn leave_room(&mut self) {
        self.wanted_room = None;
        if self.room.take().is_some() {
            self.queue(ClientMessage::Leave);
        }
        self.pending.clear();
        self.flags = HistoryFlags::default();
    }

    /// Take pending outgoing messages (drains the queue).
    pub fn take_outgoing(&mut self) -> Vec<String> {
        std::mem::take(&mut self.outgoing)
    }

    pub fn has_outgoing(&self) -> bool {
        !self.outgoing.is_empty()
    }

    fn queue(&mut self, msg: ClientMessage) {
        match msg.to_json() {
            Ok(json) => self.outgoing.push(json),
            Err(e) => log::error!("Failed to serialize message: {}", e),
        }
    }

    fn request(&mut self, kind: Pending, request: HistoryRequest) -> u64 {
        let request_id = self.next_request_id;
        self.next_request_id += 1;
        self.pending.insert(request_id, kind);
        self.queue(ClientMessage::History {
            request_id,
            request,
        });
        request_id
    }

    // --- Incoming ---

    /// Handle an incoming server message.
    /// Malformed or unexpected input returns `None` and changes nothing.
    pub fn handle_message(&mut self, json: &str) -> Option<SessionEvent> {
        let msg: ServerMessage = match serde_json::from_str(json) {
            Ok(msg) => msg,
            Err(e) => {
                log::debug!("Ignoring malformed server message: {}", e);
                return None;
            }
        };

        match msg {
            ServerMessage::Joined { room, peer_count } => {
                log::info!("Joined room {} with {} peers", room, peer_count);
                self.room = Some(room.clone());
                self.reload();
                Some(SessionEvent::Joined { room, peer_count })
            }
            ServerMessage::PeerJoined { peer_id } => Some(SessionEvent::PeerJoined { peer_id }),
            ServerMessage::PeerLeft { peer_id } => Some(SessionEvent::PeerLeft { peer_id }),
            ServerMessage::Event { from, event } => self.handle_event(from, event),
            ServerMessage::History {
                request_id,
                response,
            } => self.handle_response(request_id, response),
            ServerMessage::Error { message } => {
                log::warn!("Server error: {}", message);
                Some(SessionEvent::Error { message })
            }
        }
    }

    fn handle_event(&mut self, from: String, event: BoardEvent) -> Option<SessionEvent> {
        if self.room.is_none() {
            return None;
        }
        match event {
            BoardEvent::Draw(segment) => {
                if !segment.is_well_formed() {
                    log::debug!("Ignoring malformed segment from {}", from);
                    return None;
                }
                self.surface.paint_segment(&segment);
                Some(SessionEvent::RemoteDraw { from, segment })
            }
            BoardEvent::Clear => {
                self.surface.clear();
                self.reload();
                Some(SessionEvent::RemoteClear { from })
            }
            BoardEvent::Refetch => {
                self.reload();
                Some(SessionEvent::RefetchRequested { from })
            }
        }
    }

    fn handle_response(&mut self, request_id: u64, response: HistoryResponse) -> Option<SessionEvent> {
        let Some(kind) = self.pending.remove(&request_id) else {
            log::debug!("Ignoring reply to unknown request {}", request_id);
            return None;
        };

        match (kind, response) {
            (Pending::Append(_), HistoryResponse::Flags(flags)) => {
                self.flags = flags;
                Some(SessionEvent::FlagsChanged(flags))
            }
            (Pending::Append(_), HistoryResponse::Failed { message }) => {
                log::warn!("Stroke submission failed: {}", message);
                Some(SessionEvent::SubmitFailed { message })
            }
            (Pending::Clear | Pending::Undo | Pending::Redo, HistoryResponse::Flags(flags)) => {
                self.flags = flags;
                self.queue(ClientMessage::Broadcast {
                    event: BoardEvent::Refetch,
                });
                self.reload();
                Some(SessionEvent::FlagsChanged(flags))
            }
            (Pending::Clear, HistoryResponse::Failed { message }) => {
                // The surface was wiped optimistically; restore it from the store.
                log::warn!("Clear failed: {}", message);
                self.reload();
                Some(SessionEvent::Error { message })
            }
            (op @ (Pending::Undo | Pending::Redo), HistoryResponse::Failed { message }) => {
                log::warn!("{:?} failed: {}", op, message);
                Some(SessionEvent::Error { message })
            }
            (Pending::Reload, HistoryResponse::Snapshot(snapshot)) => {
                Some(self.reconcile(request_id, snapshot))
            }
            (Pending::Reload, HistoryResponse::Failed { message }) => {
                log::error!("Reload failed: {}", message);
                Some(SessionEvent::ReloadFailed { message })
            }
            (kind, response) => {
                log::warn!("Unexpected reply {:?} to {:?}", response, kind);
                None
            }
        }
    }

    // --- Transport ---

    /// Exchange messages with a transport: apply everything received, then
    /// flush the outgoing queue if connected.
    pub fn pump<T: PeerTransport>(&mut self, transport: &mut T) -> Vec<SessionEvent> {
        let mut events = Vec::new();

        for event in transport.poll_events() {
            match event {
                TransportEvent::Connected => {
                    // Before a connection only membership changes can be queued,
                    // and the wanted room supersedes them.
                    self.outgoing.clear();
                    if let Some(room) = self.wanted_room.clone() {
                        self.queue(ClientMessage::Join { room });
                    }
                    events.push(SessionEvent::Connected);
                }
                TransportEvent::Disconnected => {
                    self.drop_connection();
                    events.push(SessionEvent::Disconnected);
                }
                TransportEvent::Message(json) => {
                    if let Some(event) = self.handle_message(&json) {
                        events.push(event);
                    }
                }
                TransportEvent::Error { message } => {
                    self.drop_connection();
                    events.push(SessionEvent::Error { message });
                }
            }
        }

        if transport.is_connected() {
            let outgoing = self.take_outgoing();
            let mut unsent = outgoing.into_iter();
            for msg in unsent.by_ref() {
                if let Err(e) = transport.send(&msg) {
                    log::error!("Failed to send message: {}", e);
                    self.outgoing.push(msg);
                    break;
                }
            }
            self.outgoing.extend(unsent);
        }

        events
    }

    /// Forget everything tied to the lost connection. The wanted room is kept
    /// so the next connect rejoins and reloads.
    fn drop_connection(&mut self) {
        if !self.pending.is_empty() {
            log::warn!("Connection lost with {} requests in flight", self.pending.len());
        }
        self.room = None;
        self.pending.clear();
        self.outgoing.clear();
    }
}

impl Default for BoardSession {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}
