use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::types::{PeerId, ReconnectToken};

/// Reason carried by a P2PReject envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum P2PRejectReason {
    /// The target explicitly refused the connection (or cannot satisfy it).
    #[serde(rename = "peer_refused")]
    PeerRefused,
    /// The target peer is unknown, or no negotiation with it exists.
    #[serde(rename = "not_found")]
    NotFound,
}

/// The signaling wire union. The same tag set travels in both directions;
/// which tags a party may legally send is enforced by the session state
/// machine, not by the codec.
///
/// In P2P envelopes the `peer` field names the counterparty: the target
/// when a client sends the envelope, the originator when the broker
/// forwards it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Envelope {
    /// Client -> broker: authenticate into a game.
    #[serde(rename = "hello_server")]
    HelloServer {
        game: String,
        flags: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reconnect_token: Option<ReconnectToken>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        attributes: Option<HashMap<String, String>>,
    },

    /// Broker -> client: authentication succeeded.
    #[serde(rename = "hello_client")]
    HelloClient {
        peer: PeerId,
        reconnect_token: ReconnectToken,
        /// ICE servers in legacy `url;username;credential` form.
        ice_servers: Vec<String>,
    },

    /// SDP offer to open a connection with `peer`.
    #[serde(rename = "p2p_offer")]
    P2POffer {
        peer: PeerId,
        flags: u32,
        offer: String,
    },

    /// SDP answer to a previously received offer.
    #[serde(rename = "p2p_answer")]
    P2PAnswer { peer: PeerId, offer: String },

    /// Broker -> client: `peer` wants to connect (forwarded offer).
    #[serde(rename = "p2p_connect")]
    P2PConnect {
        peer: PeerId,
        flags: u32,
        offer: String,
    },

    /// Broker -> client: `peer` answered (forwarded answer).
    #[serde(rename = "p2p_response")]
    P2PResponse { peer: PeerId, offer: String },

    /// Negotiation completed notification.
    #[serde(rename = "p2p_connected")]
    P2PConnected,

    /// Negotiation abandoned notification.
    #[serde(rename = "p2p_disconnect")]
    P2PDisconnect {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        peer: Option<PeerId>,
    },

    /// Refusal, either client-originated or synthesized by the broker.
    #[serde(rename = "p2p_reject")]
    P2PReject {
        peer: PeerId,
        reason: P2PRejectReason,
    },

    /// Trickle ICE candidate for an ongoing negotiation.
    #[serde(rename = "ice_candidate")]
    IceCandidate { peer: PeerId, candidate: String },

    /// Opaque payload relayed verbatim through the broker.
    #[serde(rename = "p2p_relay_data")]
    P2PRelayData { peer: PeerId, data: Vec<u8> },

    /// Claim a symbolic name within the game.
    #[serde(rename = "alias_register")]
    AliasRegister { alias: String },

    /// Release one alias, or all of the sender's aliases when absent.
    #[serde(rename = "alias_unregister")]
    AliasUnregister {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        alias: Option<String>,
    },

    /// Resolve an alias to a peer id.
    #[serde(rename = "alias_lookup")]
    AliasLookup { alias: String },

    /// Broker -> client: lookup result, `peer` is 0 when unresolved.
    #[serde(rename = "alias_resolved")]
    AliasResolved { alias: String, peer: PeerId },

    /// Broker -> client: outcome of a register/unregister request. `alias`
    /// is absent for unregister-all, which always succeeds.
    #[serde(rename = "alias_result")]
    AliasResult {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        alias: Option<String>,
        success: bool,
    },
}

impl Envelope {
    /// Wire tag, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Envelope::HelloServer { .. } => "hello_server",
            Envelope::HelloClient { .. } => "hello_client",
            Envelope::P2POffer { .. } => "p2p_offer",
            Envelope::P2PAnswer { .. } => "p2p_answer",
            Envelope::P2PConnect { .. } => "p2p_connect",
            Envelope::P2PResponse { .. } => "p2p_response",
            Envelope::P2PConnected => "p2p_connected",
            Envelope::P2PDisconnect { .. } => "p2p_disconnect",
            Envelope::P2PReject { .. } => "p2p_reject",
            Envelope::IceCandidate { .. } => "ice_candidate",
            Envelope::P2PRelayData { .. } => "p2p_relay_data",
            Envelope::AliasRegister { .. } => "alias_register",
            Envelope::AliasUnregister { .. } => "alias_unregister",
            Envelope::AliasLookup { .. } => "alias_lookup",
            Envelope::AliasResolved { .. } => "alias_resolved",
            Envelope::AliasResult { .. } => "alias_result",
        }
    }
}
