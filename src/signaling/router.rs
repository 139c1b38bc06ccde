//! Outbound send helpers: build an envelope, encode it, and enqueue it on
//! the target session's outbound channel. The channel doubles as the
//! outbound buffer; its forwarding task wakes on the empty -> non-empty
//! transition, and per-sender enqueue order is delivery order.

use tokio::sync::mpsc;
use tracing::warn;

use super::messages::{Envelope, P2PRejectReason};
use super::types::{IceServer, OutboundMessage, PeerId, ReconnectToken};

/// Encode and enqueue. An envelope that fails to encode is logged and
/// dropped; the session stays up.
pub(crate) fn send(tx: &mpsc::UnboundedSender<OutboundMessage>, envelope: &Envelope) {
    match serde_json::to_string(envelope) {
        Ok(json) => {
            let _ = tx.send(OutboundMessage::from(json));
        }
        Err(e) => warn!("dropping {} frame that failed to encode: {}", envelope.kind(), e),
    }
}

pub(crate) fn send_hello_client(
    tx: &mpsc::UnboundedSender<OutboundMessage>,
    peer: PeerId,
    reconnect_token: ReconnectToken,
    ice_servers: &[IceServer],
) {
    send(
        tx,
        &Envelope::HelloClient {
            peer,
            reconnect_token,
            ice_servers: ice_servers.iter().map(IceServer::to_legacy).collect(),
        },
    );
}

/// Tell the originator its target does not exist (or no negotiation does).
pub(crate) fn send_no_such_peer(tx: &mpsc::UnboundedSender<OutboundMessage>, peer: PeerId) {
    send(
        tx,
        &Envelope::P2PReject {
            peer,
            reason: P2PRejectReason::NotFound,
        },
    );
}

pub(crate) fn send_peer_refused(tx: &mpsc::UnboundedSender<OutboundMessage>, peer: PeerId) {
    send(
        tx,
        &Envelope::P2PReject {
            peer,
            reason: P2PRejectReason::PeerRefused,
        },
    );
}

pub(crate) fn send_p2p_connect(
    tx: &mpsc::UnboundedSender<OutboundMessage>,
    from_peer: PeerId,
    flags: u32,
    offer: &str,
) {
    send(
        tx,
        &Envelope::P2PConnect {
            peer: from_peer,
            flags,
            offer: offer.to_string(),
        },
    );
}

pub(crate) fn send_p2p_response(
    tx: &mpsc::UnboundedSender<OutboundMessage>,
    from_peer: PeerId,
    offer: &str,
) {
    send(
        tx,
        &Envelope::P2PResponse {
            peer: from_peer,
            offer: offer.to_string(),
        },
    );
}

pub(crate) fn send_ice_candidate(
    tx: &mpsc::UnboundedSender<OutboundMessage>,
    from_peer: PeerId,
    candidate: &str,
) {
    send(
        tx,
        &Envelope::IceCandidate {
            peer: from_peer,
            candidate: candidate.to_string(),
        },
    );
}

pub(crate) fn send_relay_data(
    tx: &mpsc::UnboundedSender<OutboundMessage>,
    from_peer: PeerId,
    data: Vec<u8>,
) {
    send(
        tx,
        &Envelope::P2PRelayData {
            peer: from_peer,
            data,
        },
    );
}

pub(crate) fn send_alias_resolved(
    tx: &mpsc::UnboundedSender<OutboundMessage>,
    alias: &str,
    peer: PeerId,
) {
    send(
        tx,
        &Envelope::AliasResolved {
            alias: alias.to_string(),
            peer,
        },
    );
}

pub(crate) fn send_alias_result(
    tx: &mpsc::UnboundedSender<OutboundMessage>,
    alias: Option<&str>,
    success: bool,
) {
    send(
        tx,
        &Envelope::AliasResult {
            alias: alias.map(str::to_string),
            success,
        },
    );
}
