use std::collections::{HashMap, HashSet};

use tokio::sync::mpsc;

use super::types::{ConnId, OutboundMessage, PeerId, ReconnectToken};

/// Per-session record owned by the game that authenticated it.
///
/// `connected_peers` holds peer-id handles, never session references;
/// entries are dereferenced through the registry at use time, so a peer
/// that has already disconnected simply fails the lookup.
#[derive(Debug)]
pub(crate) struct PeerEntry {
    pub conn_id: ConnId,
    /// Diagnostic label from the transport layer.
    pub url: String,
    pub webrtc_support: bool,
    pub trickle_ice: bool,
    pub reconnect_token: ReconnectToken,
    /// Peers this session is currently negotiating with. Asymmetric until
    /// the answer is observed: only the offerer records the target.
    pub connected_peers: HashSet<PeerId>,
    pub tx: mpsc::UnboundedSender<OutboundMessage>,
}

/// Peer and alias maps of a single game, plus the id allocator.
///
/// Only ever touched from the owning game's actor task.
#[derive(Debug, Default)]
pub(crate) struct PeerRegistry {
    peers: HashMap<PeerId, PeerEntry>,
    aliases: HashMap<String, PeerId>,
    next_peer_id: u32,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a game-unique, never-previously-issued peer id.
    pub fn allocate_peer_id(&mut self) -> PeerId {
        self.next_peer_id += 1;
        PeerId::new(self.next_peer_id)
    }

    /// Reclaim a previously issued id (reconnect path). Bumps the
    /// allocator's high-water mark so the id can never be issued again.
    pub fn adopt_peer_id(&mut self, peer_id: PeerId) {
        self.next_peer_id = self.next_peer_id.max(peer_id.value());
    }

    /// Bind a peer id to a session, returning the replaced entry if the id
    /// was already bound (stale session from a previous connection).
    pub fn insert_peer(&mut self, peer_id: PeerId, entry: PeerEntry) -> Option<PeerEntry> {
        self.peers.insert(peer_id, entry)
    }

    /// Unbind a peer iff it is still bound to the given connection.
    pub fn remove_peer(&mut self, peer_id: PeerId, conn_id: ConnId) -> Option<PeerEntry> {
        if self.peers.get(&peer_id)?.conn_id != conn_id {
            return None;
        }
        self.peers.remove(&peer_id)
    }

    pub fn peer(&self, peer_id: PeerId) -> Option<&PeerEntry> {
        self.peers.get(&peer_id)
    }

    pub fn peer_mut(&mut self, peer_id: PeerId) -> Option<&mut PeerEntry> {
        self.peers.get_mut(&peer_id)
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// Register an alias. Succeeds when the name is free or already owned
    /// by the same peer (idempotent); fails on a foreign owner.
    pub fn register_alias(&mut self, alias: &str, peer_id: PeerId) -> bool {
        match self.aliases.get(alias) {
            Some(owner) => *owner == peer_id,
            None => {
                self.aliases.insert(alias.to_string(), peer_id);
                true
            }
        }
    }

    /// Re-insert an alias from a reconnect record, unless the name was
    /// claimed by another peer in the meantime.
    pub fn restore_alias(&mut self, alias: &str, peer_id: PeerId) -> bool {
        match self.aliases.get(alias) {
            Some(owner) => *owner == peer_id,
            None => {
                self.aliases.insert(alias.to_string(), peer_id);
                true
            }
        }
    }

    /// Remove one alias iff owned by the given peer.
    pub fn unregister_alias(&mut self, alias: &str, peer_id: PeerId) -> bool {
        if self.aliases.get(alias) == Some(&peer_id) {
            self.aliases.remove(alias);
            true
        } else {
            false
        }
    }

    /// Remove every alias owned by the given peer, returning the names.
    pub fn unregister_all_aliases(&mut self, peer_id: PeerId) -> Vec<String> {
        let names: Vec<String> = self
            .aliases
            .iter()
            .filter(|(_, owner)| **owner == peer_id)
            .map(|(name, _)| name.clone())
            .collect();
        for name in &names {
            self.aliases.remove(name);
        }
        names
    }

    /// Resolve an alias; `PeerId::NONE` means "not found".
    pub fn lookup_alias(&self, alias: &str) -> PeerId {
        self.aliases.get(alias).copied().unwrap_or(PeerId::NONE)
    }

    /// Erase a departed peer from every remaining session's negotiation
    /// set, returning the ids of the sessions that held an edge to it.
    pub fn purge_connected(&mut self, peer_id: PeerId) -> Vec<PeerId> {
        let mut affected = Vec::new();
        for (other_id, entry) in self.peers.iter_mut() {
            if entry.connected_peers.remove(&peer_id) {
                affected.push(*other_id);
            }
        }
        affected
    }
}
