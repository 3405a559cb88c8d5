//! Multi-client scenarios over an in-process relay backed by the memory store.

use callboard_core::storage::execute;
use callboard_core::{
    BoardSession, CaptureConfig, ClientMessage, HistoryFlags, HistoryRequest, HistoryStore,
    MemoryHistoryStore, RenderSurface, ServerMessage, SessionConfig, SessionEvent,
};
use kurbo::Point;
use pollster::block_on;

struct Client {
    id: String,
    session: BoardSession,
    room: Option<String>,
    inbox: Vec<String>,
    events: Vec<SessionEvent>,
    requests: Vec<&'static str>,
}

/// Routes messages the way the server does: broadcasts go to every other
/// member of the room, history requests run against the shared store.
struct Relay {
    store: MemoryHistoryStore,
    clients: Vec<Client>,
}

impl Relay {
    fn new() -> Self {
        Self {
            store: MemoryHistoryStore::new(),
            clients: Vec::new(),
        }
    }

    fn connect(&mut self, id: &str, room: &str) -> usize {
        let config =
            SessionConfig::default().with_capture(CaptureConfig::default().with_smoothing(false));
        let mut session = BoardSession::new(config);
        session.join_room(room);
        self.clients.push(Client {
            id: id.to_string(),
            session,
            room: None,
            inbox: Vec::new(),
            events: Vec::new(),
            requests: Vec::new(),
        });
        self.settle();
        self.clients.len() - 1
    }

    fn session(&mut self, client: usize) -> &mut BoardSession {
        &mut self.clients[client].session
    }

    fn deliver(&mut self, to: usize, msg: ServerMessage) {
        let json = msg.to_json().unwrap();
        self.clients[to].inbox.push(json);
    }

    fn peers_of(&self, client: usize) -> Vec<usize> {
        let room = &self.clients[client].room;
        (0..self.clients.len())
            .filter(|&i| i != client && room.is_some() && self.clients[i].room == *room)
            .collect()
    }

    fn route(&mut self, from: usize, json: &str) {
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        match msg {
            ClientMessage::Join { room } => {
                self.clients[from].room = Some(room.clone());
                let peers = self.peers_of(from);
                let peer_id = self.clients[from].id.clone();
                for peer in &peers {
                    self.deliver(*peer, ServerMessage::PeerJoined { peer_id: peer_id.clone() });
                }
                self.deliver(
                    from,
                    ServerMessage::Joined {
                        room,
                        peer_count: peers.len() + 1,
                    },
                );
            }
            ClientMessage::Leave => {
                self.clients[from].room = None;
            }
            ClientMessage::Broadcast { event } => {
                let sender = self.clients[from].id.clone();
                for peer in self.peers_of(from) {
                    self.deliver(
                        peer,
                        ServerMessage::Event {
                            from: sender.clone(),
                            event: event.clone(),
                        },
                    );
                }
            }
            ClientMessage::History {
                request_id,
                request,
            } => {
                self.clients[from].requests.push(request.name());
                let room = self.clients[from].room.clone().unwrap();
                let response = block_on(execute(&self.store, &room, request));
                self.deliver(from, ServerMessage::History { request_id, response });
            }
        }
    }

    /// Route and deliver until nothing is in flight.
    fn settle(&mut self) {
        loop {
            let mut progressed = false;
            for i in 0..self.clients.len() {
                for json in self.clients[i].session.take_outgoing() {
                    progressed = true;
                    self.route(i, &json);
                }
            }
            for client in &mut self.clients {
                for json in std::mem::take(&mut client.inbox) {
                    progressed = true;
                    if let Some(event) = client.session.handle_message(&json) {
                        client.events.push(event);
                    }
                }
            }
            if !progressed {
                break;
            }
        }
    }

    fn forget_history(&mut self) {
        for client in &mut self.clients {
            client.events.clear();
            client.requests.clear();
        }
    }

    fn store_picture(&self, room: &str) -> RenderSurface {
        let snapshot = block_on(self.store.get_history(room)).unwrap();
        let mut surface = RenderSurface::new();
        surface.replay(&snapshot.strokes);
        surface
    }
}

/// Three-segment horizontal stroke starting at `y`.
fn draw(session: &mut BoardSession, y: f64) {
    session.pointer_down(Point::new(0.0, y));
    session.pointer_move(Point::new(10.0, y));
    session.pointer_move(Point::new(20.0, y));
    session.pointer_up(Point::new(30.0, y));
}

#[test]
fn live_segments_reach_peer_without_reload() {
    let mut relay = Relay::new();
    let a = relay.connect("a", "room");
    let b = relay.connect("b", "room");
    relay.forget_history();

    draw(relay.session(a), 0.0);
    relay.settle();

    let remote_draws: Vec<_> = relay.clients[b]
        .events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::RemoteDraw { from, segment } => Some((from.clone(), *segment)),
            _ => None,
        })
        .collect();
    assert_eq!(remote_draws.len(), 3);
    assert!(remote_draws.iter().all(|(from, _)| from == "a"));
    assert!(remote_draws
        .iter()
        .all(|(_, s)| s.color.0 == 0x000000 && (s.width - 2.0).abs() < 1e-9));
    assert!(relay.clients[b].requests.is_empty());

    assert_eq!(relay.clients[a].requests, vec!["append_stroke"]);
    assert!(relay.clients[a]
        .events
        .contains(&SessionEvent::FlagsChanged(HistoryFlags::new(true, false))));
    assert!(relay.clients[a]
        .session
        .surface()
        .same_picture(relay.clients[b].session.surface()));
}

#[test]
fn undo_converges_every_client() {
    let mut relay = Relay::new();
    let a = relay.connect("a", "room");
    let b = relay.connect("b", "room");

    draw(relay.session(a), 0.0);
    relay.settle();
    draw(relay.session(b), 50.0);
    relay.settle();
    let before = relay.clients[a].session.surface().segment_count();

    assert!(relay.session(b).can_undo());
    assert!(relay.session(b).perform_undo());
    relay.settle();

    assert_eq!(relay.session(b).flags(), HistoryFlags::new(true, true));
    let a_surface = relay.clients[a].session.surface();
    let b_surface = relay.clients[b].session.surface();
    assert!(a_surface.same_picture(b_surface));
    assert!(a_surface.segment_count() < before);
    assert!(a_surface.same_picture(&relay.store_picture("room")));
    assert!(relay.clients[a]
        .events
        .iter()
        .any(|e| matches!(e, SessionEvent::RefetchRequested { from } if from == "b")));
}

#[test]
fn undo_then_redo_restores_picture() {
    let mut relay = Relay::new();
    let a = relay.connect("a", "room");
    let b = relay.connect("b", "room");
    draw(relay.session(a), 0.0);
    draw(relay.session(a), 40.0);
    relay.settle();
    relay.session(a).reload();
    relay.settle();
    let original = relay.clients[a].session.surface().clone();

    relay.session(a).perform_undo();
    relay.settle();
    relay.session(a).perform_redo();
    relay.settle();

    assert!(relay.clients[a].session.surface().same_picture(&original));
    assert!(relay.clients[b].session.surface().same_picture(&original));
    assert_eq!(relay.session(a).flags(), HistoryFlags::new(true, false));
}

#[test]
fn illegal_undo_sends_nothing() {
    let mut relay = Relay::new();
    let a = relay.connect("a", "room");
    relay.forget_history();

    assert!(!relay.session(a).can_undo());
    assert!(!relay.session(a).perform_undo());
    assert!(!relay.session(a).has_outgoing());
    relay.settle();
    assert!(relay.clients[a].requests.is_empty());
}

#[test]
fn clear_wipes_locally_then_everyone_reloads_empty() {
    let mut relay = Relay::new();
    let a = relay.connect("a", "room");
    let b = relay.connect("b", "room");
    draw(relay.session(a), 0.0);
    relay.settle();
    relay.forget_history();

    relay.session(a).clear_board();
    assert!(relay.clients[a].session.surface().is_empty());
    relay.settle();

    assert!(relay.clients[b]
        .events
        .iter()
        .any(|e| matches!(e, SessionEvent::RemoteClear { .. })));
    assert!(relay.clients[b].requests.contains(&"get_history"));
    assert!(relay.clients[b].session.surface().is_empty());
    assert!(relay.store_picture("room").is_empty());
    // Clear is undoable.
    assert!(relay.session(a).can_undo());
}

#[test]
fn concurrent_strokes_converge_after_reload() {
    let mut relay = Relay::new();
    let a = relay.connect("a", "room");
    let b = relay.connect("b", "room");

    // Interleave two gestures before anything is routed.
    relay.session(a).pointer_down(Point::new(0.0, 0.0));
    relay.session(b).pointer_down(Point::new(0.0, 100.0));
    relay.session(a).pointer_move(Point::new(10.0, 0.0));
    relay.session(b).pointer_move(Point::new(10.0, 100.0));
    relay.session(b).pointer_up(Point::new(20.0, 100.0));
    relay.session(a).pointer_up(Point::new(20.0, 0.0));
    relay.settle();

    relay.session(a).reload();
    relay.session(b).reload();
    relay.settle();

    let expected = relay.store_picture("room");
    assert_eq!(expected.segment_count(), 4);
    assert!(relay.clients[a].session.surface().same_picture(&expected));
    assert!(relay.clients[b].session.surface().same_picture(&expected));
}

#[test]
fn late_joiner_sees_history() {
    let mut relay = Relay::new();
    let a = relay.connect("a", "room");
    draw(relay.session(a), 0.0);
    draw(relay.session(a), 20.0);
    relay.settle();

    let c = relay.connect("c", "room");
    assert!(relay.clients[c]
        .events
        .iter()
        .any(|e| matches!(e, SessionEvent::Reconciled { strokes: 2, .. })));
    assert!(relay.clients[c]
        .session
        .surface()
        .same_picture(&relay.store_picture("room")));
    assert_eq!(relay.session(c).flags(), HistoryFlags::new(true, false));
}

#[test]
fn rooms_are_isolated() {
    let mut relay = Relay::new();
    let a = relay.connect("a", "red");
    let b = relay.connect("b", "blue");
    draw(relay.session(a), 0.0);
    relay.settle();

    assert!(relay.clients[b].session.surface().is_empty());
    assert!(relay.store_picture("blue").is_empty());
    assert_eq!(relay.store_picture("red").segment_count(), 3);
}
