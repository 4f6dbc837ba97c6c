//! Room directory: which clients collaborate in which room.
//!
//! Each room lives in its own [`DashMap`] entry, so the entry lock
//! serializes every mutation and fan-out for that room while unrelated rooms
//! proceed in parallel. Callbacks passed to [`RoomDirectory::join_room_with`]
//! and [`RoomDirectory::fan_out`] run with that lock held and must not touch
//! the directory again.

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::de::IgnoredAny;
use tracing::{debug, info};

use crate::protocol::{ClientId, Frame, RoomId};

/// Outcome of a join request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinResult {
    /// The client was already in the room; nothing changed.
    AlreadyMember,
    /// The client was added. Carries the members present before the join.
    Joined(Vec<ClientId>),
    RoomNotFound,
}

/// A recorded delta and the top-level fields it carries.
#[derive(Debug)]
struct Snapshot {
    fields: BTreeSet<String>,
    frame: Frame,
}

impl Snapshot {
    fn new(frame: Frame) -> Self {
        let fields = serde_json::from_str::<BTreeMap<String, IgnoredAny>>(&frame)
            .map(|object| object.into_keys().collect())
            .unwrap_or_default();
        Self { fields, frame }
    }

    /// Whether `newer` carries every field of this snapshot.
    fn superseded_by(&self, newer: &Snapshot) -> bool {
        !self.fields.is_empty() && self.fields.is_subset(&newer.fields)
    }
}

/// A collaboration room.
#[derive(Debug, Default)]
pub struct Room {
    members: HashSet<ClientId>,
    /// Latest delta per field set, least recently updated first. Clients
    /// send whole collections (`{"texts": [..]}`), so this is the room's
    /// current drawing as far as the relay has seen it.
    history: VecDeque<Snapshot>,
}

impl Room {
    fn with_owner(owner: ClientId) -> Self {
        let mut room = Self::default();
        room.members.insert(owner);
        room
    }

    pub fn members(&self) -> &HashSet<ClientId> {
        &self.members
    }

    pub fn history(&self) -> impl Iterator<Item = &Frame> {
        self.history.iter().map(|snapshot| &snapshot.frame)
    }

    /// Keep `frame` for late joiners. It replaces every older delta whose
    /// fields it covers; past `limit` entries the stalest is evicted.
    fn record(&mut self, frame: Frame, limit: usize) {
        if limit == 0 {
            return;
        }
        let snapshot = Snapshot::new(frame);
        self.history.retain(|old| !old.superseded_by(&snapshot));
        while self.history.len() >= limit {
            self.history.pop_front();
        }
        self.history.push_back(snapshot);
    }
}

/// All rooms known to the relay.
#[derive(Debug)]
pub struct RoomDirectory {
    rooms: DashMap<RoomId, Room>,
    history_limit: usize,
}

impl RoomDirectory {
    /// `history_limit` caps the snapshots kept per room; 0 disables replay.
    pub fn new(history_limit: usize) -> Self {
        Self {
            rooms: DashMap::new(),
            history_limit,
        }
    }

    /// Open a new room whose only member is `owner`.
    pub fn create_room(&self, owner: &ClientId) -> RoomId {
        loop {
            let room_id = RoomId::generate();
            if let Entry::Vacant(slot) = self.rooms.entry(room_id.clone()) {
                slot.insert(Room::with_owner(owner.clone()));
                info!("Client {} created room {}", owner, room_id);
                return room_id;
            }
        }
    }

    pub fn join_room(&self, room_id: &RoomId, client_id: &ClientId) -> JoinResult {
        self.join_room_with(room_id, client_id, |_| {})
    }

    /// Join a room, running `on_joined` under the room lock after the client
    /// has been added. Anything `on_joined` queues for the joiner is therefore
    /// ordered before any later broadcast into the room.
    pub fn join_room_with<F>(&self, room_id: &RoomId, client_id: &ClientId, on_joined: F) -> JoinResult
    where
        F: FnOnce(&Room),
    {
        let Some(mut room) = self.rooms.get_mut(room_id) else {
            return JoinResult::RoomNotFound;
        };
        if room.members.contains(client_id) {
            return JoinResult::AlreadyMember;
        }

        let existing: Vec<ClientId> = room.members.iter().cloned().collect();
        room.members.insert(client_id.clone());
        on_joined(room.value());

        info!("Client {} joined room {} ({} members)", client_id, room_id, room.members.len());
        JoinResult::Joined(existing)
    }

    /// Snapshot of a room's members.
    pub fn members_of(&self, room_id: &RoomId) -> Option<HashSet<ClientId>> {
        self.rooms.get(room_id).map(|room| room.members.clone())
    }

    /// Remove one member. Returns the remaining members, or `None` when the
    /// client was not in the room. A room left empty is dropped.
    pub fn remove_member(&self, room_id: &RoomId, client_id: &ClientId) -> Option<Vec<ClientId>> {
        let Entry::Occupied(mut entry) = self.rooms.entry(room_id.clone()) else {
            return None;
        };
        if !entry.get_mut().members.remove(client_id) {
            return None;
        }

        if entry.get().members.is_empty() {
            entry.remove();
            info!("Room {} is empty, dropping it", room_id);
            return Some(Vec::new());
        }

        debug!("Client {} left room {}", client_id, room_id);
        Some(entry.get().members.iter().cloned().collect())
    }

    /// Record `frame` in the room history and call `deliver` for every member
    /// other than `sender`, all under the room lock.
    ///
    /// Returns the number of recipients, or `None` if the room does not exist
    /// or `sender` is not a member.
    pub fn fan_out<F>(&self, room_id: &RoomId, sender: &ClientId, frame: &Frame, mut deliver: F) -> Option<usize>
    where
        F: FnMut(&ClientId),
    {
        let mut room = self.rooms.get_mut(room_id)?;
        if !room.members.contains(sender) {
            return None;
        }

        room.record(frame.clone(), self.history_limit);

        let mut recipients = 0;
        for member in room.members.iter().filter(|m| *m != sender) {
            deliver(member);
            recipients += 1;
        }
        Some(recipients)
    }

    pub fn contains(&self, room_id: &RoomId) -> bool {
        self.rooms.contains_key(room_id)
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}
