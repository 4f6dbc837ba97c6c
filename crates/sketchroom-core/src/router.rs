//! Dispatch of inbound frames: room control messages and drawing deltas.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::error::{DecodeError, DeliveryError};
use crate::protocol::{ClientId, DrawingState, Envelope, Frame, RoomId, ServerMessage, kind};
use crate::registry::ConnectionRegistry;
use crate::rooms::{JoinResult, RoomDirectory};

/// Per-connection routing state.
#[derive(Debug)]
pub struct Session {
    client_id: ClientId,
    rooms: HashSet<RoomId>,
}

impl Session {
    pub fn new(client_id: ClientId) -> Self {
        Self {
            client_id,
            rooms: HashSet::new(),
        }
    }

    pub fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    /// Rooms this connection has created or joined and not left.
    pub fn rooms(&self) -> impl Iterator<Item = &RoomId> {
        self.rooms.iter()
    }

    pub fn is_member(&self, room_id: &RoomId) -> bool {
        self.rooms.contains(room_id)
    }
}

/// What the router did with one inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    RoomCreated(RoomId),
    /// Joined a room; `notified` existing members were told.
    Joined { room_id: RoomId, notified: usize },
    AlreadyMember(RoomId),
    RoomNotFound(RoomId),
    Left { room_id: RoomId, was_member: bool },
    /// A delta was queued for `recipients` peers across the sender's rooms.
    Forwarded { recipients: usize },
    /// A frame claiming a server-only kind was discarded.
    Dropped { tag: String },
}

pub struct MessageRouter {
    registry: Arc<ConnectionRegistry>,
    rooms: Arc<RoomDirectory>,
}

impl MessageRouter {
    pub fn new(registry: Arc<ConnectionRegistry>, rooms: Arc<RoomDirectory>) -> Self {
        Self { registry, rooms }
    }

    /// Decode and dispatch one inbound text frame.
    pub fn route(&self, session: &mut Session, text: &str) -> Result<RouteOutcome, DecodeError> {
        let envelope = Envelope::decode(text)?;
        Ok(self.dispatch(session, envelope))
    }

    pub fn dispatch(&self, session: &mut Session, envelope: Envelope) -> RouteOutcome {
        match envelope {
            Envelope::CreateRoom => self.create_room(session),
            Envelope::JoinRoom { room_id, state } => self.join_room(session, room_id, state),
            Envelope::LeaveRoom { room_id } => self.leave_room(session, room_id),
            Envelope::Delta(frame) => self.forward(session, &frame),
            Envelope::Unrecognized { tag, .. } if kind::is_server_only(&tag) => {
                warn!("Client {} sent server-only message '{}', dropping", session.client_id, tag);
                RouteOutcome::Dropped { tag }
            }
            Envelope::Unrecognized { tag, frame } => {
                debug!("Relaying unrecognized message '{}' from {}", tag, session.client_id);
                self.forward(session, &frame)
            }
        }
    }

    fn create_room(&self, session: &mut Session) -> RouteOutcome {
        let room_id = self.rooms.create_room(&session.client_id);
        session.rooms.insert(room_id.clone());
        self.reply(
            &session.client_id,
            &ServerMessage::RoomCreated {
                room_id: room_id.clone(),
            },
        );
        RouteOutcome::RoomCreated(room_id)
    }

    fn join_room(&self, session: &mut Session, room_id: RoomId, state: DrawingState) -> RouteOutcome {
        let client_id = &session.client_id;
        let ack = encode(&ServerMessage::joined(room_id.clone(), state));

        // Acknowledge and replay while the room is locked so no live delta
        // reaches the joiner ahead of its history.
        let result = self.rooms.join_room_with(&room_id, client_id, |room| {
            if let Some(ack) = ack {
                self.deliver(client_id, ack);
            }
            for frame in room.history() {
                self.deliver(client_id, frame.clone());
            }
        });

        match result {
            JoinResult::Joined(existing) => {
                if let Some(notice) = encode(&ServerMessage::SomeoneJoined {
                    id: client_id.clone(),
                }) {
                    for member in &existing {
                        self.deliver(member, notice.clone());
                    }
                }
                session.rooms.insert(room_id.clone());
                RouteOutcome::Joined {
                    room_id,
                    notified: existing.len(),
                }
            }
            JoinResult::AlreadyMember => {
                self.reply(client_id, &ServerMessage::already_joined(room_id.clone()));
                RouteOutcome::AlreadyMember(room_id)
            }
            JoinResult::RoomNotFound => {
                warn!("Client {} tried to join unknown room {}", client_id, room_id);
                self.reply(client_id, &ServerMessage::room_not_found(room_id.clone()));
                RouteOutcome::RoomNotFound(room_id)
            }
        }
    }

    fn leave_room(&self, session: &mut Session, room_id: RoomId) -> RouteOutcome {
        let was_member = self.depart(session, &room_id);
        self.reply(
            &session.client_id,
            &ServerMessage::left(room_id.clone(), was_member),
        );
        RouteOutcome::Left { room_id, was_member }
    }

    /// Remove the session from every room it belongs to.
    pub fn leave_all(&self, session: &mut Session) {
        let rooms: Vec<RoomId> = session.rooms.iter().cloned().collect();
        for room_id in rooms {
            self.depart(session, &room_id);
        }
    }

    fn depart(&self, session: &mut Session, room_id: &RoomId) -> bool {
        session.rooms.remove(room_id);
        let Some(remaining) = self.rooms.remove_member(room_id, &session.client_id) else {
            return false;
        };

        if let Some(notice) = encode(&ServerMessage::SomeoneLeft {
            id: session.client_id.clone(),
        }) {
            for member in &remaining {
                self.deliver(member, notice.clone());
            }
        }
        true
    }

    fn forward(&self, session: &Session, frame: &Frame) -> RouteOutcome {
        if session.rooms.is_empty() {
            debug!("Client {} is in no room, nothing to relay", session.client_id);
        }

        let recipients: usize = session
            .rooms
            .iter()
            .filter_map(|room_id| {
                self.rooms.fan_out(room_id, &session.client_id, frame, |member| {
                    self.deliver(member, frame.clone());
                })
            })
            .sum();
        RouteOutcome::Forwarded { recipients }
    }

    fn reply(&self, to: &ClientId, message: &ServerMessage) {
        if let Some(frame) = encode(message) {
            self.deliver(to, frame);
        }
    }

    /// Queue a frame for one peer. Failures stay with that peer.
    fn deliver(&self, to: &ClientId, frame: Frame) -> bool {
        match self.registry.send(to, frame) {
            Ok(()) => true,
            Err(DeliveryError::Full) => {
                warn!("Outbox for {} is full, dropping frame", to);
                false
            }
            Err(e) => {
                debug!("Not delivering to {}: {}", to, e);
                false
            }
        }
    }
}

fn encode(message: &ServerMessage) -> Option<Frame> {
    match message.to_frame() {
        Ok(frame) => Some(frame),
        Err(e) => {
            error!("Failed to encode {:?}: {}", message, e);
            None
        }
    }
}
