use std::fmt;

use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;
use tokio_tungstenite::tungstenite::Utf8Bytes;

/// Signaling broker errors
#[derive(Debug, Error)]
pub enum SignalError {
    #[error("game credential rejected")]
    Unauthorized,

    #[error("got {0} from unauthenticated connection")]
    NotAuthenticated(&'static str),

    #[error("malformed frame: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

/// HelloServer flag bit 0: client supports WebRTC (required).
pub const HELLO_WEBRTC_SUPPORTED: u32 = 0x1;
/// HelloServer flag bit 1: disable trickle ICE.
pub const HELLO_NO_TRICKLE_ICE: u32 = 0x2;
/// P2POffer flag bit 0: emulated-connection request (always refused).
pub const OFFER_EMULATED: u32 = 0x1;

const TOKEN_LEN: usize = 32;
const HEX_CHARS: &[u8] = b"0123456789abcdef";

/// Peer id: unique within a game, 0 means "none/unassigned".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(u32);

impl PeerId {
    pub const NONE: PeerId = PeerId(0);

    pub fn new(value: u32) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u32 {
        self.0
    }

    pub fn is_none(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Game id: process-local, allocated by the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GameId(pub u32);

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Transport connection id, used to detect stale sessions after a peer id
/// has been rebound to a newer connection.
pub type ConnId = u64;

/// Reconnect token: 32 hex chars in a fixed array, issued at HelloServer
/// and treated as a bearer credential within the reconnect window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReconnectToken {
    bytes: [u8; TOKEN_LEN],
    len: u8,
}

impl ReconnectToken {
    /// Generate a fresh token for a newly assigned peer id, folding the id
    /// into the leading nibbles.
    pub fn generate(peer_id: PeerId) -> Self {
        let mut rng = rand::rng();
        let lead = peer_id.value().rotate_left(16) ^ rng.random::<u32>();

        let mut bytes = [0u8; TOKEN_LEN];
        for (i, byte) in bytes.iter_mut().enumerate() {
            let nibble = if i < 8 {
                ((lead >> (28 - i * 4)) & 0xF) as usize
            } else {
                rng.random_range(0..HEX_CHARS.len())
            };
            *byte = HEX_CHARS[nibble];
        }
        Self {
            bytes,
            len: TOKEN_LEN as u8,
        }
    }

    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.bytes[..self.len as usize]).unwrap_or("")
    }
}

impl fmt::Display for ReconnectToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for ReconnectToken {
    fn from(s: &str) -> Self {
        let mut bytes = [0u8; TOKEN_LEN];
        let src = s.as_bytes();
        let len = src.len().min(TOKEN_LEN);
        bytes[..len].copy_from_slice(&src[..len]);
        Self {
            bytes,
            len: len as u8,
        }
    }
}

impl Serialize for ReconnectToken {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ReconnectToken {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(ReconnectToken::from(s.as_str()))
    }
}

/// One STUN/TURN server advertised to clients at HelloClient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IceServer {
    pub url: String,
    pub username: String,
    pub credential: String,
}

impl IceServer {
    pub fn stun(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            username: String::new(),
            credential: String::new(),
        }
    }

    /// Legacy wire form: `url` for credential-less servers, otherwise
    /// `url;username;credential`.
    pub fn to_legacy(&self) -> String {
        if self.username.is_empty() {
            self.url.clone()
        } else {
            format!("{};{};{}", self.url, self.username, self.credential)
        }
    }

    /// Parse the legacy `;`-separated form.
    pub fn from_legacy(s: &str) -> Option<Self> {
        let mut parts = s.split(';');
        let url = parts.next()?.trim();
        if url.is_empty() {
            return None;
        }
        Some(Self {
            url: url.to_string(),
            username: parts.next().unwrap_or("").trim().to_string(),
            credential: parts.next().unwrap_or("").trim().to_string(),
        })
    }

    /// Public STUN servers advertised when no ICE configuration is given.
    pub fn default_stun() -> Vec<Self> {
        vec![
            Self::stun("stun:stun.l.google.com:19302"),
            Self::stun("stun:stun1.l.google.com:19302"),
        ]
    }
}

/// Wrapper for outbound WebSocket frames using tungstenite's Utf8Bytes.
#[derive(Debug, Clone)]
pub struct OutboundMessage(Utf8Bytes);

impl OutboundMessage {
    /// Create a new outbound message from any string type
    pub fn new(s: impl Into<Utf8Bytes>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Get the inner Utf8Bytes for tungstenite Message::Text
    pub fn into_inner(self) -> Utf8Bytes {
        self.0
    }
}

impl From<String> for OutboundMessage {
    fn from(s: String) -> Self {
        Self(Utf8Bytes::from(s))
    }
}
