//! Heliograph: a WebSocket signaling broker for WebRTC peer-to-peer game
//! networking.
//!
//! Clients authenticate into a game, receive a stable peer id plus ICE
//! server configuration, and exchange offer/answer/candidate envelopes
//! through the broker until their data channels come up. A per-game alias
//! registry gives peers symbolic names, and reconnect tokens let a client
//! reclaim its identity after a dropped transport.

pub mod signaling;
