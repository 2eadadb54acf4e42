use std::collections::HashMap;

use tokio::sync::mpsc;
use tracing::{debug, info};

use super::messages::ServerMessage;
use super::registry::RoomRegistry;
use super::types::{ConnectionId, OutboundMessage, Participant, RoomId};

/// Commands sent to the relay actor
pub(crate) enum RelayCommand {
    Connect {
        conn_id: ConnectionId,
        tx: mpsc::UnboundedSender<OutboundMessage>,
    },
    Join {
        conn_id: ConnectionId,
        room_id: RoomId,
        email: String,
    },
    /// Point-to-point relay of an already-encoded message. No registry access.
    Forward {
        to: ConnectionId,
        message: OutboundMessage,
    },
    Leave {
        conn_id: ConnectionId,
        room_id: RoomId,
    },
    Disconnect {
        conn_id: ConnectionId,
    },
}

/// Single owner of the room registry and the connection sender map.
/// Commands are processed one at a time, so registry mutations never
/// interleave and membership reads used for fan-out are consistent.
pub(crate) async fn relay_actor(mut rx: mpsc::Receiver<RelayCommand>) {
    let mut registry = RoomRegistry::new();
    let mut connections: HashMap<ConnectionId, mpsc::UnboundedSender<OutboundMessage>> =
        HashMap::new();

    while let Some(cmd) = rx.recv().await {
        match cmd {
            RelayCommand::Connect { conn_id, tx } => {
                connections.insert(conn_id, tx);
                info!("User connected: {}", conn_id);
            }

            RelayCommand::Join {
                conn_id,
                room_id,
                email,
            } => {
                if registry.contains(&room_id, &conn_id) {
                    debug!("Duplicate join ignored: {} already in {}", conn_id, room_id);
                    continue;
                }

                // Membership before the join doubles as the joiner's roster
                // and the user-joined broadcast target set.
                let others = registry.participants(&room_id).to_vec();

                broadcast(
                    &connections,
                    &others,
                    &ServerMessage::UserJoined {
                        user_id: conn_id,
                        email: email.clone(),
                    },
                );

                registry.add_participant(
                    room_id.clone(),
                    Participant { id: conn_id, email },
                );

                if let Some(tx) = connections.get(&conn_id) {
                    let roster = ServerMessage::RoomUsers { users: others };
                    let _ = tx.send(encode(&roster));
                }

                info!(
                    "{} joined room {} ({} users)",
                    conn_id,
                    room_id,
                    registry.participants(&room_id).len()
                );
            }

            RelayCommand::Forward { to, message } => match connections.get(&to) {
                Some(tx) => {
                    let _ = tx.send(message);
                }
                None => debug!("Relay target not connected: {}", to),
            },

            RelayCommand::Leave { conn_id, room_id } => {
                if registry.remove_participant(&room_id, &conn_id) {
                    broadcast(
                        &connections,
                        registry.participants(&room_id),
                        &ServerMessage::UserLeft { user_id: conn_id },
                    );
                    info!("{} left room {}", conn_id, room_id);
                }
            }

            RelayCommand::Disconnect { conn_id } => {
                connections.remove(&conn_id);

                for room_id in registry.remove_connection(&conn_id) {
                    // Emptied rooms were deleted by the scan; their slice is
                    // empty and nothing is sent.
                    broadcast(
                        &connections,
                        registry.participants(&room_id),
                        &ServerMessage::UserLeft { user_id: conn_id },
                    );
                }
                info!("User disconnected: {}", conn_id);
            }
        }
    }
}

fn encode(msg: &ServerMessage) -> OutboundMessage {
    let json =
        serde_json::to_string(msg).expect("ServerMessage serialization should never fail");
    OutboundMessage::from(json)
}

/// Serialize once, clone the Arc-backed message per recipient.
fn broadcast(
    connections: &HashMap<ConnectionId, mpsc::UnboundedSender<OutboundMessage>>,
    members: &[Participant],
    msg: &ServerMessage,
) {
    if members.is_empty() {
        return;
    }
    let out = encode(msg);
    for member in members {
        if let Some(tx) = connections.get(&member.id) {
            let _ = tx.send(out.clone());
        }
    }
}

/// Handle to communicate with the relay actor.
/// All sends are fire-and-forget; responses, where the protocol has any,
/// arrive through the connection's own outbound channel.
#[derive(Clone)]
pub struct RelayHandle {
    pub(crate) tx: mpsc::Sender<RelayCommand>,
}

impl RelayHandle {
    /// Register a freshly accepted connection and its outbound channel
    pub async fn connect(&self, conn_id: ConnectionId, tx: mpsc::UnboundedSender<OutboundMessage>) {
        let _ = self.tx.send(RelayCommand::Connect { conn_id, tx }).await;
    }

    /// Enter a room, creating it if absent
    pub async fn join(&self, conn_id: ConnectionId, room_id: RoomId, email: String) {
        let _ = self
            .tx
            .send(RelayCommand::Join {
                conn_id,
                room_id,
                email,
            })
            .await;
    }

    /// Relay an encoded message to one recipient
    pub async fn forward(&self, to: ConnectionId, message: OutboundMessage) {
        let _ = self.tx.send(RelayCommand::Forward { to, message }).await;
    }

    /// Leave a room explicitly
    pub async fn leave(&self, conn_id: ConnectionId, room_id: RoomId) {
        let _ = self.tx.send(RelayCommand::Leave { conn_id, room_id }).await;
    }

    /// Transport-level disconnect: remove the connection everywhere
    pub async fn disconnect(&self, conn_id: ConnectionId) {
        let _ = self.tx.send(RelayCommand::Disconnect { conn_id }).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn spawn_relay() -> RelayHandle {
        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(relay_actor(rx));
        RelayHandle { tx }
    }

    async fn connect_peer(
        handle: &RelayHandle,
        id: &str,
    ) -> (ConnectionId, mpsc::UnboundedReceiver<OutboundMessage>) {
        let conn_id = ConnectionId::from(id);
        let (tx, rx) = mpsc::unbounded_channel();
        handle.connect(conn_id, tx).await;
        (conn_id, rx)
    }

    async fn recv_json(rx: &mut mpsc::UnboundedReceiver<OutboundMessage>) -> Value {
        let msg = rx.recv().await.expect("expected a message");
        serde_json::from_str(msg.as_str()).expect("outbound message is valid JSON")
    }

    #[tokio::test]
    async fn join_sends_roster_and_notifies_existing_members() {
        let handle = spawn_relay();
        let (a, mut a_rx) = connect_peer(&handle, "conn_0000000a").await;
        let (b, mut b_rx) = connect_peer(&handle, "conn_0000000b").await;

        handle.join(a, RoomId::from("r"), "a@x.com".into()).await;
        handle.join(b, RoomId::from("r"), "b@x.com".into()).await;

        // First joiner: empty roster, then the second joiner's announcement
        let roster = recv_json(&mut a_rx).await;
        assert_eq!(roster["type"], "room-users");
        assert_eq!(roster["users"], serde_json::json!([]));

        let joined = recv_json(&mut a_rx).await;
        assert_eq!(joined["type"], "user-joined");
        assert_eq!(joined["userId"], "conn_0000000b");
        assert_eq!(joined["email"], "b@x.com");

        // Second joiner: roster listing only the first
        let roster = recv_json(&mut b_rx).await;
        assert_eq!(roster["type"], "room-users");
        assert_eq!(roster["users"][0]["id"], "conn_0000000a");
        assert_eq!(roster["users"][0]["email"], "a@x.com");
        assert!(b_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn duplicate_join_is_ignored() {
        let handle = spawn_relay();
        let (a, mut a_rx) = connect_peer(&handle, "conn_0000000a").await;
        let (b, mut b_rx) = connect_peer(&handle, "conn_0000000b").await;

        handle.join(a, RoomId::from("r"), "a@x.com".into()).await;
        handle.join(a, RoomId::from("r"), "a@x.com".into()).await;
        handle.join(b, RoomId::from("r"), "b@x.com".into()).await;

        let roster = recv_json(&mut b_rx).await;
        assert_eq!(roster["users"].as_array().unwrap().len(), 1);

        // First join produced the empty roster, the duplicate nothing,
        // then B's announcement.
        let _ = recv_json(&mut a_rx).await;
        let joined = recv_json(&mut a_rx).await;
        assert_eq!(joined["type"], "user-joined");
        assert!(a_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn forward_reaches_only_the_target() {
        let handle = spawn_relay();
        let (_a, _a_rx) = connect_peer(&handle, "conn_0000000a").await;
        let (b, mut b_rx) = connect_peer(&handle, "conn_0000000b").await;
        let (_c, mut c_rx) = connect_peer(&handle, "conn_0000000c").await;

        let offer = ServerMessage::Offer {
            from: ConnectionId::from("conn_0000000a"),
            offer: serde_json::json!({"sdp": "v=0"}),
        };
        handle
            .forward(b, OutboundMessage::from(serde_json::to_string(&offer).unwrap()))
            .await;

        let relayed = recv_json(&mut b_rx).await;
        assert_eq!(relayed["type"], "offer");
        assert_eq!(relayed["from"], "conn_0000000a");
        assert_eq!(relayed["offer"]["sdp"], "v=0");
        assert!(c_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn forward_to_unknown_target_is_dropped() {
        let handle = spawn_relay();
        let (_a, mut a_rx) = connect_peer(&handle, "conn_0000000a").await;

        handle
            .forward(
                ConnectionId::from("conn_000000ff"),
                OutboundMessage::new("{}"),
            )
            .await;

        // Flush: a later forward to A arrives without anything before it.
        handle
            .forward(ConnectionId::from("conn_0000000a"), OutboundMessage::new("\"ping\""))
            .await;
        let next = recv_json(&mut a_rx).await;
        assert_eq!(next, serde_json::json!("ping"));
    }

    #[tokio::test]
    async fn leave_notifies_remaining_members() {
        let handle = spawn_relay();
        let (a, mut a_rx) = connect_peer(&handle, "conn_0000000a").await;
        let (b, mut b_rx) = connect_peer(&handle, "conn_0000000b").await;

        handle.join(a, RoomId::from("r"), "a@x.com".into()).await;
        handle.join(b, RoomId::from("r"), "b@x.com".into()).await;
        handle.leave(a, RoomId::from("r")).await;

        let _roster = recv_json(&mut b_rx).await;
        let left = recv_json(&mut b_rx).await;
        assert_eq!(left["type"], "user-left");
        assert_eq!(left["userId"], "conn_0000000a");

        // The leaver itself hears nothing beyond its own earlier traffic.
        let _ = recv_json(&mut a_rx).await; // empty roster
        let _ = recv_json(&mut a_rx).await; // user-joined for B
        assert!(a_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn leave_when_not_a_member_is_silent() {
        let handle = spawn_relay();
        let (a, mut a_rx) = connect_peer(&handle, "conn_0000000a").await;
        let (b, _b_rx) = connect_peer(&handle, "conn_0000000b").await;

        handle.join(a, RoomId::from("r"), "a@x.com".into()).await;
        handle.leave(b, RoomId::from("r")).await;

        let _roster = recv_json(&mut a_rx).await;
        // Flush to prove no user-left was broadcast in between.
        handle.forward(a, OutboundMessage::new("\"ping\"")).await;
        let next = recv_json(&mut a_rx).await;
        assert_eq!(next, serde_json::json!("ping"));
    }

    #[tokio::test]
    async fn disconnect_notifies_every_room_once() {
        let handle = spawn_relay();
        let (a, _a_rx) = connect_peer(&handle, "conn_0000000a").await;
        let (b, mut b_rx) = connect_peer(&handle, "conn_0000000b").await;
        let (c, mut c_rx) = connect_peer(&handle, "conn_0000000c").await;

        handle.join(a, RoomId::from("r1"), "a@x.com".into()).await;
        handle.join(b, RoomId::from("r1"), "b@x.com".into()).await;
        handle.join(a, RoomId::from("r2"), "a@x.com".into()).await;
        handle.join(c, RoomId::from("r2"), "c@x.com".into()).await;

        handle.disconnect(a).await;

        let _roster = recv_json(&mut b_rx).await;
        let left = recv_json(&mut b_rx).await;
        assert_eq!(left["type"], "user-left");
        assert_eq!(left["userId"], "conn_0000000a");
        assert!(b_rx.try_recv().is_err());

        let _roster = recv_json(&mut c_rx).await;
        let left = recv_json(&mut c_rx).await;
        assert_eq!(left["type"], "user-left");
        assert_eq!(left["userId"], "conn_0000000a");
        assert!(c_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn disconnect_of_sole_member_notifies_nobody() {
        let handle = spawn_relay();
        let (a, _a_rx) = connect_peer(&handle, "conn_0000000a").await;
        let (b, mut b_rx) = connect_peer(&handle, "conn_0000000b").await;

        handle.join(a, RoomId::from("solo"), "a@x.com".into()).await;
        handle.disconnect(a).await;

        handle.forward(b, OutboundMessage::new("\"ping\"")).await;
        let next = recv_json(&mut b_rx).await;
        assert_eq!(next, serde_json::json!("ping"));
    }
}
