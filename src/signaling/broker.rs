use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{info, warn};

use super::actor::GameHandle;
use super::reconnect::ReconnectStore;
use super::types::{ConnId, GameId, IceServer, SignalError};

/// Default reconnect window.
pub const DEFAULT_RECONNECT_TTL: Duration = Duration::from_secs(120);

/// Top-level coordinator: resolves HelloServer credentials into game
/// handles, owns the reconnect store and the advertised ICE configuration.
///
/// Games are created lazily on first authenticated peer and live for the
/// rest of the process; their actors run independently of each other.
pub struct Broker {
    games: Mutex<HashMap<String, GameHandle>>,
    /// Credentials accepted at HelloServer; `None` means open registration.
    allowed_games: Option<HashSet<String>>,
    reconnect: Arc<ReconnectStore>,
    ice_servers: Arc<Vec<IceServer>>,
    next_game_id: AtomicU32,
    next_conn_id: AtomicU64,
}

impl Broker {
    pub fn new(
        ice_servers: Vec<IceServer>,
        allowed_games: Option<HashSet<String>>,
        reconnect_ttl: Duration,
    ) -> Self {
        Self {
            games: Mutex::new(HashMap::new()),
            allowed_games,
            reconnect: Arc::new(ReconnectStore::new(reconnect_ttl)),
            ice_servers: Arc::new(ice_servers),
            next_game_id: AtomicU32::new(1),
            next_conn_id: AtomicU64::new(1),
        }
    }

    /// Allocate an id for a freshly accepted transport connection.
    pub(crate) fn allocate_conn_id(&self) -> ConnId {
        self.next_conn_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Verify a HelloServer credential and resolve it to its game,
    /// spawning the game actor on first contact.
    pub(crate) fn verify_game(&self, credential: &str) -> Result<GameHandle, SignalError> {
        if credential.is_empty() {
            warn!("rejecting hello_server with empty game credential");
            return Err(SignalError::Unauthorized);
        }
        if let Some(allowed) = &self.allowed_games {
            if !allowed.contains(credential) {
                warn!("rejecting hello_server for unknown game credential");
                return Err(SignalError::Unauthorized);
            }
        }

        let mut games = self
            .games
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let handle = games.entry(credential.to_string()).or_insert_with(|| {
            let game_id = GameId(self.next_game_id.fetch_add(1, Ordering::Relaxed));
            info!("creating game {}", game_id);
            GameHandle::spawn(game_id, self.reconnect.clone(), self.ice_servers.clone())
        });
        Ok(handle.clone())
    }
}
