use std::collections::HashMap;

use super::types::{ConnectionId, Participant, RoomId};

/// In-memory room membership registry.
///
/// Rooms are created implicitly on first insert and deleted as soon as they
/// empty; no zero-participant room is ever observable. Participants are kept
/// in insertion order. All access goes through the relay actor, so the
/// registry itself carries no locking.
#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: HashMap<RoomId, Vec<Participant>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a participant, creating the room if absent.
    ///
    /// Not idempotent: inserting the same connection twice produces a
    /// duplicate entry. The relay checks `contains` before calling.
    pub fn add_participant(&mut self, room_id: RoomId, participant: Participant) {
        self.rooms.entry(room_id).or_default().push(participant);
    }

    /// Current members in insertion order, empty for an unknown room.
    pub fn participants(&self, room_id: &RoomId) -> &[Participant] {
        self.rooms.get(room_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, room_id: &RoomId, conn_id: &ConnectionId) -> bool {
        self.participants(room_id).iter().any(|p| p.id == *conn_id)
    }

    /// Remove the matching entry if present; returns whether anything was
    /// removed. Deletes the room when it empties.
    pub fn remove_participant(&mut self, room_id: &RoomId, conn_id: &ConnectionId) -> bool {
        let Some(members) = self.rooms.get_mut(room_id) else {
            return false;
        };
        let before = members.len();
        members.retain(|p| p.id != *conn_id);
        let removed = members.len() != before;
        if members.is_empty() {
            self.rooms.remove(room_id);
        }
        removed
    }

    /// Remove a connection from every room it appears in, deleting rooms
    /// left empty. Returns the affected room ids so the caller can notify
    /// remaining members. Used on transport disconnect.
    pub fn remove_connection(&mut self, conn_id: &ConnectionId) -> Vec<RoomId> {
        let affected: Vec<RoomId> = self
            .rooms
            .iter()
            .filter(|(_, members)| members.iter().any(|p| p.id == *conn_id))
            .map(|(room_id, _)| room_id.clone())
            .collect();

        for room_id in &affected {
            self.remove_participant(room_id, conn_id);
        }
        affected
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}
