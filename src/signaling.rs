//! WebSocket signaling relay for P2P call negotiation

mod actor;
mod messages;
mod registry;
mod server;
mod types;

pub use actor::RelayHandle;
pub use messages::{ClientMessage, ServerMessage};
pub use registry::RoomRegistry;
pub use server::SignalingServer;
pub use types::{ConnectionId, OutboundMessage, Participant, RoomId, SignalingError};
