//! WebSocket signaling broker for WebRTC P2P coordination

mod actor;
mod broker;
mod messages;
mod reconnect;
mod registry;
mod router;
mod server;
mod types;

pub use broker::{Broker, DEFAULT_RECONNECT_TTL};
pub use messages::{Envelope, P2PRejectReason};
pub use server::{DEFAULT_SIGNALING_PORT, SignalingServer};
pub use types::{
    ConnId, GameId, HELLO_NO_TRICKLE_ICE, HELLO_WEBRTC_SUPPORTED, IceServer, OFFER_EMULATED,
    OutboundMessage, PeerId, ReconnectToken, SignalError,
};
