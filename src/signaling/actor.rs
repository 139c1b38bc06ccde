use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use super::messages::Envelope;
use super::reconnect::ReconnectStore;
use super::registry::{PeerEntry, PeerRegistry};
use super::router;
use super::types::{
    ConnId, GameId, IceServer, OFFER_EMULATED, OutboundMessage, PeerId, ReconnectToken,
    SignalError,
};

const GAME_COMMAND_QUEUE: usize = 1024;

/// Authentication parameters forwarded from a connection that passed the
/// broker's credential and capability checks.
pub(crate) struct HelloRequest {
    pub conn_id: ConnId,
    pub url: String,
    pub trickle_ice: bool,
    pub reconnect_token: Option<ReconnectToken>,
    pub attributes: Option<HashMap<String, String>>,
    pub tx: mpsc::UnboundedSender<OutboundMessage>,
}

/// Commands sent to a game actor
pub(crate) enum GameCommand {
    Hello {
        request: HelloRequest,
        reply: oneshot::Sender<PeerId>,
    },
    Frame {
        peer_id: PeerId,
        conn_id: ConnId,
        envelope: Envelope,
    },
    Leave {
        peer_id: PeerId,
        conn_id: ConnId,
    },
}

/// One game: its peer/alias registry and the session state machine.
///
/// Owned by a single actor task, so every mutation of the registry and of
/// any session's negotiation set is serialized per game; games run in
/// parallel with each other.
struct Game {
    game_id: GameId,
    registry: PeerRegistry,
    reconnect: Arc<ReconnectStore>,
    ice_servers: Arc<Vec<IceServer>>,
}

async fn game_actor(mut game: Game, mut rx: mpsc::Receiver<GameCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            GameCommand::Hello { request, reply } => {
                let peer_id = game.hello(request);
                let _ = reply.send(peer_id);
            }
            GameCommand::Frame {
                peer_id,
                conn_id,
                envelope,
            } => game.frame(peer_id, conn_id, envelope),
            GameCommand::Leave { peer_id, conn_id } => game.leave(peer_id, conn_id),
        }
    }
}

impl Game {
    /// Bind an authenticated connection to a peer id, reclaiming a prior
    /// identity when a valid reconnect token is presented.
    fn hello(&mut self, request: HelloRequest) -> PeerId {
        let HelloRequest {
            conn_id,
            url,
            trickle_ice,
            reconnect_token,
            attributes,
            tx,
        } = request;

        let peer_id = match reconnect_token {
            Some(token) => match self.reconnect.claim(&token, self.game_id) {
                Some(record) => {
                    self.registry.adopt_peer_id(record.peer_id);
                    for alias in &record.aliases {
                        if !self.registry.restore_alias(alias, record.peer_id) {
                            info!(
                                "alias '{}' was claimed while peer {} was away",
                                alias, record.peer_id
                            );
                        }
                    }
                    info!("re-establishing state for peer {}", record.peer_id);
                    record.peer_id
                }
                None => {
                    info!("reconnect token from \"{}\" is no longer valid", url);
                    self.registry.allocate_peer_id()
                }
            },
            None => self.registry.allocate_peer_id(),
        };

        let platform = attributes
            .as_ref()
            .and_then(|a| a.get("platform").cloned())
            .unwrap_or_default();
        info!(
            "hello from \"{}\" (peer {}, game {}, platform: {}, trickle ICE: {})",
            url, peer_id, self.game_id, platform, trickle_ice
        );

        let token = ReconnectToken::generate(peer_id);
        let hello_tx = tx.clone();
        let entry = PeerEntry {
            conn_id,
            url,
            webrtc_support: true,
            trickle_ice,
            reconnect_token: token,
            connected_peers: HashSet::new(),
            tx,
        };
        if let Some(old) = self.registry.insert_peer(peer_id, entry) {
            warn!(
                "peer {} rebound while previous connection \"{}\" was still open",
                peer_id, old.url
            );
        }
        self.reconnect.issue(token, peer_id, self.game_id);

        router::send_hello_client(&hello_tx, peer_id, token, &self.ice_servers);
        peer_id
    }

    /// Dispatch one inbound envelope from an authenticated session.
    fn frame(&mut self, from: PeerId, conn_id: ConnId, envelope: Envelope) {
        let kind = envelope.kind();
        let Some(entry) = self.registry.peer(from) else {
            debug!("dropping {} from unbound peer {}", kind, from);
            return;
        };
        if entry.conn_id != conn_id {
            debug!("dropping {} from stale connection of peer {}", kind, from);
            return;
        }
        let origin_tx = entry.tx.clone();

        match envelope {
            Envelope::P2POffer { peer, flags, offer } => {
                self.on_offer(from, &origin_tx, peer, flags, &offer)
            }
            Envelope::P2PAnswer { peer, offer } => {
                self.on_answer(from, &origin_tx, peer, &offer)
            }
            Envelope::IceCandidate { peer, candidate } => {
                self.on_ice_candidate(from, &origin_tx, peer, &candidate)
            }
            Envelope::P2PReject { peer, reason: _ } => self.on_reject(from, peer),
            Envelope::P2PConnected => {
                info!("p2p_connected from peer {}", from);
            }
            Envelope::P2PDisconnect { peer } => self.on_disconnect(from, peer),
            Envelope::P2PRelayData { peer, data } => {
                self.on_relay_data(from, &origin_tx, peer, data)
            }
            Envelope::AliasRegister { alias } => self.on_alias_register(from, &origin_tx, &alias),
            Envelope::AliasUnregister { alias } => {
                self.on_alias_unregister(from, &origin_tx, alias.as_deref())
            }
            Envelope::AliasLookup { alias } => self.on_alias_lookup(from, &origin_tx, &alias),
            Envelope::HelloServer { .. } => {
                error!("got hello_server from peer {} which already has a peer id", from)
            }
            Envelope::HelloClient { .. } => {
                error!("got hello_client from peer {}, not supposed to happen", from)
            }
            Envelope::P2PConnect { .. }
            | Envelope::P2PResponse { .. }
            | Envelope::AliasResolved { .. }
            | Envelope::AliasResult { .. } => {
                warn!("unhandled {} from peer {}", kind, from)
            }
        }
    }

    fn on_offer(
        &mut self,
        from: PeerId,
        origin_tx: &mpsc::UnboundedSender<OutboundMessage>,
        target: PeerId,
        flags: u32,
        offer: &str,
    ) {
        info!("p2p_offer from peer {} to peer {}", from, target);

        if flags & OFFER_EMULATED != 0 {
            info!("refusing emulated connection request from peer {}", from);
            router::send_no_such_peer(origin_tx, target);
            return;
        }

        match self.registry.peer(target) {
            None => {
                warn!("p2p_offer from peer {} to nonexistent peer {}", from, target);
                router::send_no_such_peer(origin_tx, target);
            }
            Some(other) if !other.webrtc_support => {
                info!(
                    "refusing p2p_offer to peer {} (\"{}\"): target doesn't support WebRTC",
                    target, other.url
                );
                router::send_peer_refused(origin_tx, target);
            }
            Some(other) => {
                if !other.trickle_ice {
                    debug!("peer {} negotiates without trickle ICE", target);
                }
                let target_tx = other.tx.clone();
                if let Some(origin) = self.registry.peer_mut(from) {
                    origin.connected_peers.insert(target);
                }
                // peer is set to the originator so the target knows who is calling
                router::send_p2p_connect(&target_tx, from, flags, offer);
            }
        }
    }

    fn on_answer(
        &mut self,
        from: PeerId,
        origin_tx: &mpsc::UnboundedSender<OutboundMessage>,
        target: PeerId,
        offer: &str,
    ) {
        match self.registry.peer(target) {
            None => {
                warn!(
                    "p2p_answer from peer {} to nonexistent peer {}",
                    from, target
                );
                router::send_no_such_peer(origin_tx, target);
            }
            Some(other) if !other.connected_peers.contains(&from) => {
                // answer with no recorded offer: client is confused or malicious
                warn!(
                    "p2p_answer from peer {} to peer {} which has not requested a connection",
                    from, target
                );
                router::send_no_such_peer(origin_tx, target);
            }
            Some(other) => {
                let target_tx = other.tx.clone();
                if let Some(origin) = self.registry.peer_mut(from) {
                    origin.connected_peers.insert(target);
                }
                router::send_p2p_response(&target_tx, from, offer);
            }
        }
    }

    fn on_ice_candidate(
        &mut self,
        from: PeerId,
        origin_tx: &mpsc::UnboundedSender<OutboundMessage>,
        target: PeerId,
        candidate: &str,
    ) {
        match self.registry.peer(target) {
            None => {
                warn!(
                    "ice_candidate from peer {} to nonexistent peer {}",
                    from, target
                );
                router::send_no_such_peer(origin_tx, target);
            }
            Some(other) => router::send_ice_candidate(&other.tx, from, candidate),
        }
    }

    fn on_reject(&mut self, from: PeerId, target: PeerId) {
        match self.registry.peer(target) {
            None => {
                warn!(
                    "peer {} tried to refuse connection from nonexistent peer {}",
                    from, target
                );
            }
            Some(other) => {
                info!("peer {} refused connection from peer {}", from, target);
                router::send_peer_refused(&other.tx, from);
            }
        }
    }

    fn on_disconnect(&mut self, from: PeerId, target: Option<PeerId>) {
        info!("p2p_disconnect from peer {}", from);
        if let Some(target) = target {
            if let Some(origin) = self.registry.peer_mut(from) {
                origin.connected_peers.remove(&target);
            }
            if let Some(other) = self.registry.peer_mut(target) {
                other.connected_peers.remove(&from);
            }
        }
    }

    fn on_relay_data(
        &mut self,
        from: PeerId,
        origin_tx: &mpsc::UnboundedSender<OutboundMessage>,
        target: PeerId,
        data: Vec<u8>,
    ) {
        debug!(
            "p2p_relay_data relaying {} bytes from peer {} to {}",
            data.len(),
            from,
            target
        );
        match self.registry.peer(target) {
            None => {
                warn!(
                    "p2p_relay_data from peer {} to nonexistent peer {}",
                    from, target
                );
                router::send_no_such_peer(origin_tx, target);
            }
            Some(other) => router::send_relay_data(&other.tx, from, data),
        }
    }

    fn on_alias_register(
        &mut self,
        from: PeerId,
        origin_tx: &mpsc::UnboundedSender<OutboundMessage>,
        alias: &str,
    ) {
        let success = self.registry.register_alias(alias, from);
        if success {
            info!("registering alias '{}' to peer {}", alias, from);
        } else {
            info!(
                "rejecting peer {}'s request to register alias '{}' which is registered to peer {}",
                from,
                alias,
                self.registry.lookup_alias(alias)
            );
        }
        router::send_alias_result(origin_tx, Some(alias), success);
    }

    fn on_alias_unregister(
        &mut self,
        from: PeerId,
        origin_tx: &mpsc::UnboundedSender<OutboundMessage>,
        alias: Option<&str>,
    ) {
        match alias {
            Some(alias) => {
                let success = self.registry.unregister_alias(alias, from);
                if success {
                    info!("unregistering alias '{}' for peer {}", alias, from);
                } else {
                    info!("rejecting unregister of alias '{}' for peer {}", alias, from);
                }
                router::send_alias_result(origin_tx, Some(alias), success);
            }
            None => {
                let removed = self.registry.unregister_all_aliases(from);
                info!("unregistering all {} aliases for peer {}", removed.len(), from);
                router::send_alias_result(origin_tx, None, true);
            }
        }
    }

    fn on_alias_lookup(
        &mut self,
        from: PeerId,
        origin_tx: &mpsc::UnboundedSender<OutboundMessage>,
        alias: &str,
    ) {
        let resolved = self.registry.lookup_alias(alias);
        if resolved.is_none() {
            info!("lookup of alias '{}' for peer {} failed, no alias registered", alias, from);
        } else {
            info!(
                "lookup of alias '{}' for peer {} resolved to peer {}",
                alias, from, resolved
            );
        }
        router::send_alias_resolved(origin_tx, alias, resolved);
    }

    /// Session teardown on transport close.
    fn leave(&mut self, peer_id: PeerId, conn_id: ConnId) {
        // a newer connection may have rebound the peer id; leave it alone
        let Some(entry) = self.registry.remove_peer(peer_id, conn_id) else {
            return;
        };

        let aliases = self.registry.unregister_all_aliases(peer_id);

        // collapse negotiation state on both sides of every edge and tell
        // the surviving counterparties the peer is gone
        let mut notify = self.registry.purge_connected(peer_id);
        for other in &entry.connected_peers {
            if !notify.contains(other) && self.registry.peer(*other).is_some() {
                notify.push(*other);
            }
        }
        for other_id in notify {
            if let Some(other) = self.registry.peer(other_id) {
                router::send_peer_refused(&other.tx, peer_id);
            }
        }

        self.reconnect
            .preserve(entry.reconnect_token, peer_id, self.game_id, aliases);

        info!(
            "peer {} (\"{}\") left game {}, {} peers remain",
            peer_id,
            entry.url,
            self.game_id,
            self.registry.peer_count()
        );
    }
}

/// Handle to communicate with a game actor
#[derive(Clone)]
pub(crate) struct GameHandle {
    game_id: GameId,
    tx: mpsc::Sender<GameCommand>,
}

impl GameHandle {
    /// Spawn the actor task for a newly created game.
    pub fn spawn(
        game_id: GameId,
        reconnect: Arc<ReconnectStore>,
        ice_servers: Arc<Vec<IceServer>>,
    ) -> Self {
        let (tx, rx) = mpsc::channel(GAME_COMMAND_QUEUE);
        let game = Game {
            game_id,
            registry: PeerRegistry::new(),
            reconnect,
            ice_servers,
        };
        tokio::spawn(game_actor(game, rx));
        Self { game_id, tx }
    }

    pub fn game_id(&self) -> GameId {
        self.game_id
    }

    /// Authenticate a connection into this game; resolves once the actor
    /// has bound a peer id and emitted hello_client.
    pub async fn hello(&self, request: HelloRequest) -> Result<PeerId, SignalError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let _ = self
            .tx
            .send(GameCommand::Hello {
                request,
                reply: reply_tx,
            })
            .await;
        reply_rx
            .await
            .map_err(|_| SignalError::Internal("game actor channel closed".to_string()))
    }

    /// Forward one decoded envelope from an authenticated connection.
    pub async fn frame(&self, peer_id: PeerId, conn_id: ConnId, envelope: Envelope) {
        let _ = self
            .tx
            .send(GameCommand::Frame {
                peer_id,
                conn_id,
                envelope,
            })
            .await;
    }

    /// Tear down the session bound to this connection.
    pub async fn leave(&self, peer_id: PeerId, conn_id: ConnId) {
        let _ = self.tx.send(GameCommand::Leave { peer_id, conn_id }).await;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::signaling::messages::P2PRejectReason;

    fn game() -> Game {
        game_with_store(Arc::new(ReconnectStore::new(Duration::from_secs(60))))
    }

    fn game_with_store(reconnect: Arc<ReconnectStore>) -> Game {
        Game {
            game_id: GameId(1),
            registry: PeerRegistry::new(),
            reconnect,
            ice_servers: Arc::new(vec![IceServer::stun("stun:stun.example.com:3478")]),
        }
    }

    struct TestPeer {
        peer_id: PeerId,
        conn_id: ConnId,
        rx: mpsc::UnboundedReceiver<OutboundMessage>,
    }

    fn join(game: &mut Game, conn_id: ConnId) -> TestPeer {
        join_with_token(game, conn_id, None)
    }

    fn join_with_token(
        game: &mut Game,
        conn_id: ConnId,
        reconnect_token: Option<ReconnectToken>,
    ) -> TestPeer {
        let (tx, rx) = mpsc::unbounded_channel();
        let peer_id = game.hello(HelloRequest {
            conn_id,
            url: format!("conn-{}", conn_id),
            trickle_ice: true,
            reconnect_token,
            attributes: None,
            tx,
        });
        TestPeer {
            peer_id,
            conn_id,
            rx,
        }
    }

    fn recv(peer: &mut TestPeer) -> Envelope {
        let msg = peer.rx.try_recv().expect("expected an outbound frame");
        serde_json::from_str(msg.as_str()).expect("outbound frame parses")
    }

    fn assert_silent(peer: &mut TestPeer) {
        assert!(peer.rx.try_recv().is_err(), "expected no outbound frame");
    }

    fn hello_token(peer: &mut TestPeer) -> ReconnectToken {
        match recv(peer) {
            Envelope::HelloClient {
                reconnect_token, ..
            } => reconnect_token,
            other => panic!("expected hello_client, got {}", other.kind()),
        }
    }

    fn frame(game: &mut Game, peer: &TestPeer, envelope: Envelope) {
        game.frame(peer.peer_id, peer.conn_id, envelope);
    }

    #[test]
    fn hello_assigns_sequential_ids_and_advertises_ice() {
        let mut game = game();
        let mut a = join(&mut game, 1);
        let mut b = join(&mut game, 2);
        assert_eq!(a.peer_id, PeerId::new(1));
        assert_eq!(b.peer_id, PeerId::new(2));

        match recv(&mut a) {
            Envelope::HelloClient {
                peer,
                reconnect_token,
                ice_servers,
            } => {
                assert_eq!(peer, PeerId::new(1));
                assert_eq!(reconnect_token.as_str().len(), 32);
                assert_eq!(ice_servers, vec!["stun:stun.example.com:3478".to_string()]);
            }
            other => panic!("expected hello_client, got {}", other.kind()),
        }
        hello_token(&mut b);
    }

    #[test]
    fn offer_and_answer_are_forwarded() {
        let mut game = game();
        let mut a = join(&mut game, 1);
        let mut b = join(&mut game, 2);
        hello_token(&mut a);
        hello_token(&mut b);

        frame(
            &mut game,
            &a,
            Envelope::P2POffer {
                peer: b.peer_id,
                flags: 0,
                offer: "sdp-a".to_string(),
            },
        );
        match recv(&mut b) {
            Envelope::P2PConnect { peer, flags, offer } => {
                assert_eq!(peer, a.peer_id);
                assert_eq!(flags, 0);
                assert_eq!(offer, "sdp-a");
            }
            other => panic!("expected p2p_connect, got {}", other.kind()),
        }

        frame(
            &mut game,
            &b,
            Envelope::P2PAnswer {
                peer: a.peer_id,
                offer: "sdp-b".to_string(),
            },
        );
        match recv(&mut a) {
            Envelope::P2PResponse { peer, offer } => {
                assert_eq!(peer, b.peer_id);
                assert_eq!(offer, "sdp-b");
            }
            other => panic!("expected p2p_response, got {}", other.kind()),
        }
        assert_silent(&mut a);
        assert_silent(&mut b);
    }

    #[test]
    fn offer_to_unknown_peer_is_rejected() {
        let mut game = game();
        let mut a = join(&mut game, 1);
        let mut b = join(&mut game, 2);
        hello_token(&mut a);
        hello_token(&mut b);

        frame(
            &mut game,
            &a,
            Envelope::P2POffer {
                peer: PeerId::new(99),
                flags: 0,
                offer: "sdp-a".to_string(),
            },
        );
        match recv(&mut a) {
            Envelope::P2PReject { peer, reason } => {
                assert_eq!(peer, PeerId::new(99));
                assert_eq!(reason, P2PRejectReason::NotFound);
            }
            other => panic!("expected p2p_reject, got {}", other.kind()),
        }
        assert_silent(&mut b);
    }

    #[test]
    fn emulated_offer_is_refused_without_touching_target() {
        let mut game = game();
        let mut a = join(&mut game, 1);
        let mut b = join(&mut game, 2);
        hello_token(&mut a);
        hello_token(&mut b);

        frame(
            &mut game,
            &a,
            Envelope::P2POffer {
                peer: b.peer_id,
                flags: OFFER_EMULATED,
                offer: "sdp-a".to_string(),
            },
        );
        match recv(&mut a) {
            Envelope::P2PReject { peer, reason } => {
                assert_eq!(peer, b.peer_id);
                assert_eq!(reason, P2PRejectReason::NotFound);
            }
            other => panic!("expected p2p_reject, got {}", other.kind()),
        }
        assert_silent(&mut b);
        assert!(
            game.registry
                .peer(a.peer_id)
                .unwrap()
                .connected_peers
                .is_empty()
        );
    }

    #[test]
    fn offer_to_peer_without_webrtc_is_refused() {
        let mut game = game();
        let mut a = join(&mut game, 1);
        let mut b = join(&mut game, 2);
        hello_token(&mut a);
        hello_token(&mut b);
        game.registry.peer_mut(b.peer_id).unwrap().webrtc_support = false;

        frame(
            &mut game,
            &a,
            Envelope::P2POffer {
                peer: b.peer_id,
                flags: 0,
                offer: "sdp-a".to_string(),
            },
        );
        match recv(&mut a) {
            Envelope::P2PReject { peer, reason } => {
                assert_eq!(peer, b.peer_id);
                assert_eq!(reason, P2PRejectReason::PeerRefused);
            }
            other => panic!("expected p2p_reject, got {}", other.kind()),
        }
        assert_silent(&mut b);
    }

    #[test]
    fn answer_without_prior_offer_is_rejected() {
        let mut game = game();
        let mut a = join(&mut game, 1);
        let mut b = join(&mut game, 2);
        hello_token(&mut a);
        hello_token(&mut b);

        frame(
            &mut game,
            &b,
            Envelope::P2PAnswer {
                peer: a.peer_id,
                offer: "sdp-b".to_string(),
            },
        );
        match recv(&mut b) {
            Envelope::P2PReject { peer, reason } => {
                assert_eq!(peer, a.peer_id);
                assert_eq!(reason, P2PRejectReason::NotFound);
            }
            other => panic!("expected p2p_reject, got {}", other.kind()),
        }
        assert_silent(&mut a);
    }

    #[test]
    fn ice_candidates_are_forwarded_in_order() {
        let mut game = game();
        let mut a = join(&mut game, 1);
        let mut b = join(&mut game, 2);
        hello_token(&mut a);
        hello_token(&mut b);

        for i in 0..3 {
            frame(
                &mut game,
                &a,
                Envelope::IceCandidate {
                    peer: b.peer_id,
                    candidate: format!("candidate-{}", i),
                },
            );
        }
        for i in 0..3 {
            match recv(&mut b) {
                Envelope::IceCandidate { peer, candidate } => {
                    assert_eq!(peer, a.peer_id);
                    assert_eq!(candidate, format!("candidate-{}", i));
                }
                other => panic!("expected ice_candidate, got {}", other.kind()),
            }
        }
    }

    #[test]
    fn ice_candidate_to_unknown_peer_is_rejected() {
        let mut game = game();
        let mut a = join(&mut game, 1);
        hello_token(&mut a);

        frame(
            &mut game,
            &a,
            Envelope::IceCandidate {
                peer: PeerId::new(42),
                candidate: "candidate".to_string(),
            },
        );
        match recv(&mut a) {
            Envelope::P2PReject { peer, reason } => {
                assert_eq!(peer, PeerId::new(42));
                assert_eq!(reason, P2PRejectReason::NotFound);
            }
            other => panic!("expected p2p_reject, got {}", other.kind()),
        }
    }

    #[test]
    fn reject_is_relayed_as_refusal() {
        let mut game = game();
        let mut a = join(&mut game, 1);
        let mut b = join(&mut game, 2);
        hello_token(&mut a);
        hello_token(&mut b);

        frame(
            &mut game,
            &b,
            Envelope::P2PReject {
                peer: a.peer_id,
                reason: P2PRejectReason::PeerRefused,
            },
        );
        match recv(&mut a) {
            Envelope::P2PReject { peer, reason } => {
                assert_eq!(peer, b.peer_id);
                assert_eq!(reason, P2PRejectReason::PeerRefused);
            }
            other => panic!("expected p2p_reject, got {}", other.kind()),
        }

        // refusing a nonexistent peer is log-only
        frame(
            &mut game,
            &b,
            Envelope::P2PReject {
                peer: PeerId::new(77),
                reason: P2PRejectReason::NotFound,
            },
        );
        assert_silent(&mut b);
    }

    #[test]
    fn relay_data_is_forwarded_verbatim() {
        let mut game = game();
        let mut a = join(&mut game, 1);
        let mut b = join(&mut game, 2);
        hello_token(&mut a);
        hello_token(&mut b);

        frame(
            &mut game,
            &a,
            Envelope::P2PRelayData {
                peer: b.peer_id,
                data: vec![1, 2, 3, 255],
            },
        );
        match recv(&mut b) {
            Envelope::P2PRelayData { peer, data } => {
                assert_eq!(peer, a.peer_id);
                assert_eq!(data, vec![1, 2, 3, 255]);
            }
            other => panic!("expected p2p_relay_data, got {}", other.kind()),
        }
    }

    #[test]
    fn p2p_disconnect_clears_both_edges() {
        let mut game = game();
        let mut a = join(&mut game, 1);
        let mut b = join(&mut game, 2);
        hello_token(&mut a);
        hello_token(&mut b);

        frame(
            &mut game,
            &a,
            Envelope::P2POffer {
                peer: b.peer_id,
                flags: 0,
                offer: "sdp-a".to_string(),
            },
        );
        frame(
            &mut game,
            &b,
            Envelope::P2PAnswer {
                peer: a.peer_id,
                offer: "sdp-b".to_string(),
            },
        );
        frame(
            &mut game,
            &a,
            Envelope::P2PDisconnect {
                peer: Some(b.peer_id),
            },
        );
        assert!(
            game.registry
                .peer(a.peer_id)
                .unwrap()
                .connected_peers
                .is_empty()
        );
        assert!(
            game.registry
                .peer(b.peer_id)
                .unwrap()
                .connected_peers
                .is_empty()
        );
    }

    #[test]
    fn alias_lifecycle() {
        let mut game = game();
        let mut a = join(&mut game, 1);
        let mut b = join(&mut game, 2);
        hello_token(&mut a);
        hello_token(&mut b);

        frame(
            &mut game,
            &a,
            Envelope::AliasRegister {
                alias: "alice".to_string(),
            },
        );
        match recv(&mut a) {
            Envelope::AliasResult { alias, success } => {
                assert_eq!(alias.as_deref(), Some("alice"));
                assert!(success);
            }
            other => panic!("expected alias_result, got {}", other.kind()),
        }

        frame(
            &mut game,
            &b,
            Envelope::AliasLookup {
                alias: "alice".to_string(),
            },
        );
        match recv(&mut b) {
            Envelope::AliasResolved { alias, peer } => {
                assert_eq!(alias, "alice");
                assert_eq!(peer, a.peer_id);
            }
            other => panic!("expected alias_resolved, got {}", other.kind()),
        }

        // collision with another peer's name fails
        frame(
            &mut game,
            &b,
            Envelope::AliasRegister {
                alias: "alice".to_string(),
            },
        );
        match recv(&mut b) {
            Envelope::AliasResult { success, .. } => assert!(!success),
            other => panic!("expected alias_result, got {}", other.kind()),
        }

        // re-registration by the owner stays a success
        frame(
            &mut game,
            &a,
            Envelope::AliasRegister {
                alias: "alice".to_string(),
            },
        );
        match recv(&mut a) {
            Envelope::AliasResult { success, .. } => assert!(success),
            other => panic!("expected alias_result, got {}", other.kind()),
        }

        frame(
            &mut game,
            &a,
            Envelope::AliasUnregister {
                alias: Some("alice".to_string()),
            },
        );
        match recv(&mut a) {
            Envelope::AliasResult { success, .. } => assert!(success),
            other => panic!("expected alias_result, got {}", other.kind()),
        }

        frame(
            &mut game,
            &b,
            Envelope::AliasLookup {
                alias: "alice".to_string(),
            },
        );
        match recv(&mut b) {
            Envelope::AliasResolved { peer, .. } => assert_eq!(peer, PeerId::NONE),
            other => panic!("expected alias_resolved, got {}", other.kind()),
        }
    }

    #[test]
    fn alias_unregister_all_releases_every_name() {
        let mut game = game();
        let mut a = join(&mut game, 1);
        hello_token(&mut a);

        for alias in ["alice", "alpha"] {
            frame(
                &mut game,
                &a,
                Envelope::AliasRegister {
                    alias: alias.to_string(),
                },
            );
            recv(&mut a);
        }
        frame(&mut game, &a, Envelope::AliasUnregister { alias: None });
        match recv(&mut a) {
            Envelope::AliasResult { alias, success } => {
                assert!(alias.is_none());
                assert!(success);
            }
            other => panic!("expected alias_result, got {}", other.kind()),
        }
        assert_eq!(game.registry.lookup_alias("alice"), PeerId::NONE);
        assert_eq!(game.registry.lookup_alias("alpha"), PeerId::NONE);
    }

    #[test]
    fn unregister_foreign_alias_fails() {
        let mut game = game();
        let mut a = join(&mut game, 1);
        let mut b = join(&mut game, 2);
        hello_token(&mut a);
        hello_token(&mut b);

        frame(
            &mut game,
            &a,
            Envelope::AliasRegister {
                alias: "alice".to_string(),
            },
        );
        recv(&mut a);
        frame(
            &mut game,
            &b,
            Envelope::AliasUnregister {
                alias: Some("alice".to_string()),
            },
        );
        match recv(&mut b) {
            Envelope::AliasResult { success, .. } => assert!(!success),
            other => panic!("expected alias_result, got {}", other.kind()),
        }
        assert_eq!(game.registry.lookup_alias("alice"), a.peer_id);
    }

    #[test]
    fn leave_notifies_counterparties_and_unbinds() {
        let mut game = game();
        let mut a = join(&mut game, 1);
        let mut b = join(&mut game, 2);
        hello_token(&mut a);
        hello_token(&mut b);

        frame(
            &mut game,
            &a,
            Envelope::P2POffer {
                peer: b.peer_id,
                flags: 0,
                offer: "sdp-a".to_string(),
            },
        );
        recv(&mut b);
        frame(
            &mut game,
            &a,
            Envelope::AliasRegister {
                alias: "alice".to_string(),
            },
        );
        recv(&mut a);

        game.leave(a.peer_id, a.conn_id);

        // the callee had no edge back yet, but still learns the caller left
        match recv(&mut b) {
            Envelope::P2PReject { peer, reason } => {
                assert_eq!(peer, a.peer_id);
                assert_eq!(reason, P2PRejectReason::PeerRefused);
            }
            other => panic!("expected p2p_reject, got {}", other.kind()),
        }
        assert!(game.registry.peer(a.peer_id).is_none());
        assert_eq!(game.registry.lookup_alias("alice"), PeerId::NONE);
        assert!(
            game.registry
                .peer(b.peer_id)
                .unwrap()
                .connected_peers
                .is_empty()
        );
    }

    #[test]
    fn leave_from_stale_connection_is_ignored() {
        let mut game = game();
        let mut a = join(&mut game, 1);
        hello_token(&mut a);

        game.leave(a.peer_id, 99);
        assert!(game.registry.peer(a.peer_id).is_some());
    }

    #[test]
    fn reconnect_restores_peer_id_and_aliases() {
        let mut game = game();
        let mut a = join(&mut game, 1);
        let token = hello_token(&mut a);

        frame(
            &mut game,
            &a,
            Envelope::AliasRegister {
                alias: "alice".to_string(),
            },
        );
        recv(&mut a);
        game.leave(a.peer_id, a.conn_id);

        let mut a2 = join_with_token(&mut game, 3, Some(token));
        assert_eq!(a2.peer_id, a.peer_id);
        hello_token(&mut a2);

        let mut b = join(&mut game, 4);
        hello_token(&mut b);
        frame(
            &mut game,
            &b,
            Envelope::AliasLookup {
                alias: "alice".to_string(),
            },
        );
        match recv(&mut b) {
            Envelope::AliasResolved { peer, .. } => assert_eq!(peer, a.peer_id),
            other => panic!("expected alias_resolved, got {}", other.kind()),
        }

        // reclaimed id never collides with future allocations
        assert!(b.peer_id.value() > a2.peer_id.value());
    }

    #[test]
    fn stale_reconnect_token_gets_fresh_id() {
        let mut game = game();
        let mut a = join(&mut game, 1);
        hello_token(&mut a);
        game.leave(a.peer_id, a.conn_id);

        let bogus = ReconnectToken::from("ffffffffffffffffffffffffffffffff");
        let mut a2 = join_with_token(&mut game, 2, Some(bogus));
        assert_ne!(a2.peer_id, a.peer_id);
        hello_token(&mut a2);
    }

    #[test]
    fn token_from_another_game_is_not_honored() {
        let store = Arc::new(ReconnectStore::new(Duration::from_secs(60)));
        let mut game_one = game_with_store(store.clone());
        let mut other = Game {
            game_id: GameId(2),
            registry: PeerRegistry::new(),
            reconnect: store,
            ice_servers: Arc::new(Vec::new()),
        };

        let mut a = join(&mut game_one, 1);
        let token = hello_token(&mut a);
        game_one.leave(a.peer_id, a.conn_id);

        let mut stranger = join_with_token(&mut other, 2, Some(token));
        assert_eq!(stranger.peer_id, PeerId::new(1));
        hello_token(&mut stranger);

        // the record stayed claimable by its own game
        let mut a2 = join_with_token(&mut game_one, 3, Some(token));
        assert_eq!(a2.peer_id, a.peer_id);
        hello_token(&mut a2);
    }

    #[test]
    fn rebound_peer_id_drops_frames_from_stale_connection() {
        let mut game = game();
        let mut a = join(&mut game, 1);
        let token = hello_token(&mut a);

        // same client reconnects before the old transport noticed
        let mut a2 = join_with_token(&mut game, 2, Some(token));
        assert_eq!(a2.peer_id, a.peer_id);
        hello_token(&mut a2);

        game.frame(
            a.peer_id,
            a.conn_id,
            Envelope::AliasRegister {
                alias: "alice".to_string(),
            },
        );
        assert_silent(&mut a2);
        assert_eq!(game.registry.lookup_alias("alice"), PeerId::NONE);

        // the stale connection's teardown must not unbind the new session
        game.leave(a.peer_id, a.conn_id);
        assert!(game.registry.peer(a2.peer_id).is_some());
    }
}
