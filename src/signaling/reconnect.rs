use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::debug;

use super::types::{GameId, PeerId, ReconnectToken};

/// Identity preserved for a disconnected peer within the reconnect window.
#[derive(Debug, Clone)]
pub(crate) struct PeerRecord {
    pub peer_id: PeerId,
    pub game_id: GameId,
    pub aliases: Vec<String>,
    expires_at: Instant,
}

/// Process-wide map of reconnect token -> preserved peer record.
///
/// Its own serialization domain: game actors reach it through short
/// critical sections only. Expired records are dropped lazily on access.
#[derive(Debug)]
pub(crate) struct ReconnectStore {
    records: Mutex<HashMap<ReconnectToken, PeerRecord>>,
    ttl: Duration,
}

impl ReconnectStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Record a freshly issued token. Called once per HelloServer success.
    pub fn issue(&self, token: ReconnectToken, peer_id: PeerId, game_id: GameId) {
        self.put_at(token, peer_id, game_id, Vec::new(), Instant::now());
    }

    /// Refresh the record at session teardown with the aliases the peer
    /// held, restarting the expiry window.
    pub fn preserve(
        &self,
        token: ReconnectToken,
        peer_id: PeerId,
        game_id: GameId,
        aliases: Vec<String>,
    ) {
        self.put_at(token, peer_id, game_id, aliases, Instant::now());
    }

    /// Consume a presented token. Returns the record only when it has not
    /// expired and belongs to the requesting game; a game mismatch leaves
    /// the record in place so the rightful game can still claim it.
    pub fn claim(&self, token: &ReconnectToken, game_id: GameId) -> Option<PeerRecord> {
        self.claim_at(token, game_id, Instant::now())
    }

    fn put_at(
        &self,
        token: ReconnectToken,
        peer_id: PeerId,
        game_id: GameId,
        aliases: Vec<String>,
        now: Instant,
    ) {
        let mut records = lock(&self.records);
        records.retain(|_, record| record.expires_at > now);
        records.insert(
            token,
            PeerRecord {
                peer_id,
                game_id,
                aliases,
                expires_at: now + self.ttl,
            },
        );
    }

    fn claim_at(
        &self,
        token: &ReconnectToken,
        game_id: GameId,
        now: Instant,
    ) -> Option<PeerRecord> {
        let mut records = lock(&self.records);
        let record = records.get(token)?;
        if record.expires_at <= now {
            records.remove(token);
            return None;
        }
        if record.game_id != game_id {
            debug!(
                "reconnect token for game {} presented to game {}",
                record.game_id, game_id
            );
            return None;
        }
        records.remove(token)
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        lock(&self.records).len()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
