use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::types::{ConnectionId, Participant, RoomId};

/// Messages sent from client to server.
///
/// Event and field names are fixed by the existing client wire contract.
/// Offer/answer/candidate payloads are opaque to the relay.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Enter a room, creating it if it does not exist yet
    #[serde(rename = "join-room")]
    JoinRoom {
        #[serde(rename = "roomId")]
        room_id: RoomId,
        email: String,
    },

    /// Session description offer for one recipient
    #[serde(rename = "offer")]
    Offer { to: ConnectionId, offer: Value },

    /// Session description answer for one recipient
    #[serde(rename = "answer")]
    Answer { to: ConnectionId, answer: Value },

    /// Network candidate for one recipient
    #[serde(rename = "ice-candidate")]
    IceCandidate { to: ConnectionId, candidate: Value },

    /// Leave a room explicitly
    #[serde(rename = "leave-room")]
    LeaveRoom {
        #[serde(rename = "roomId")]
        room_id: RoomId,
    },
}

/// Messages sent from server to client
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Another user entered the room
    #[serde(rename = "user-joined")]
    UserJoined {
        #[serde(rename = "userId")]
        user_id: ConnectionId,
        email: String,
    },

    /// Membership as it existed before the recipient's own join
    #[serde(rename = "room-users")]
    RoomUsers { users: Vec<Participant> },

    /// Relayed offer
    #[serde(rename = "offer")]
    Offer { from: ConnectionId, offer: Value },

    /// Relayed answer
    #[serde(rename = "answer")]
    Answer { from: ConnectionId, answer: Value },

    /// Relayed network candidate
    #[serde(rename = "ice-candidate")]
    IceCandidate { from: ConnectionId, candidate: Value },

    /// A user left the room or disconnected
    #[serde(rename = "user-left")]
    UserLeft {
        #[serde(rename = "userId")]
        user_id: ConnectionId,
    },

    /// Error response
    #[serde(rename = "error")]
    Error { message: String },
}
