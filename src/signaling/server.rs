use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{Bytes, Message};
use tracing::{debug, error, info, warn};

use super::actor::{GameHandle, HelloRequest};
use super::broker::Broker;
use super::messages::Envelope;
use super::types::{
    ConnId, HELLO_NO_TRICKLE_ICE, HELLO_WEBRTC_SUPPORTED, OutboundMessage, PeerId, SignalError,
};

pub const DEFAULT_SIGNALING_PORT: u16 = 8089;
const PING_INTERVAL: Duration = Duration::from_secs(30);
const PONG_TIMEOUT: Duration = Duration::from_secs(10);

pub struct SignalingServer {
    broker: Arc<Broker>,
}

impl SignalingServer {
    pub fn new(broker: Broker) -> Self {
        Self {
            broker: Arc::new(broker),
        }
    }

    pub async fn run(&self, addr: &str) -> std::io::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        info!("Signaling broker listening on {}", addr);

        loop {
            let (stream, addr) = listener.accept().await?;
            let broker = self.broker.clone();

            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, addr, broker).await {
                    error!("Connection error from {}: {}", addr, e);
                }
            });
        }
    }
}

/// Connection-local view of an authenticated session.
struct AuthedPeer {
    game: GameHandle,
    peer_id: PeerId,
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    broker: Arc<Broker>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let ws_stream = tokio_tungstenite::accept_async(stream).await?;
    let (mut ws_tx, mut ws_rx) = ws_stream.split();
    let conn_id = broker.allocate_conn_id();

    info!("WebSocket connection from {}", addr);

    let (tx, mut rx) = mpsc::unbounded_channel::<OutboundMessage>();
    let (ctrl_tx, mut ctrl_rx) = mpsc::unbounded_channel::<Message>();

    let mut auth: Option<AuthedPeer> = None;
    let mut ping_interval = tokio::time::interval(PING_INTERVAL);
    let mut waiting_for_pong = false;
    let mut pong_deadline: Option<tokio::time::Instant> = None;

    let send_task = tokio::spawn(async move {
        loop {
            tokio::select! {
                Some(msg) = rx.recv() => {
                    let ws_msg = Message::Text(msg.into_inner());
                    if ws_tx.send(ws_msg).await.is_err() {
                        break;
                    }
                }
                Some(ctrl_msg) = ctrl_rx.recv() => {
                    if ws_tx.send(ctrl_msg).await.is_err() {
                        break;
                    }
                }
                else => break,
            }
        }
    });

    loop {
        let pong_timeout = async {
            match pong_deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            _ = ping_interval.tick() => {
                if waiting_for_pong {
                    warn!("No Pong received, disconnecting {}", addr);
                    break;
                }
                if ctrl_tx.send(Message::Ping(Bytes::new())).is_err() {
                    break;
                }
                waiting_for_pong = true;
                pong_deadline = Some(tokio::time::Instant::now() + PONG_TIMEOUT);
                debug!("Ping sent to {}", addr);
            }

            _ = pong_timeout => {
                warn!("Pong timeout, disconnecting {}", addr);
                break;
            }

            msg = ws_rx.next() => {
                let msg = match msg {
                    Some(Ok(m)) => m,
                    Some(Err(e)) => {
                        warn!("WebSocket error: {}", e);
                        break;
                    }
                    None => break,
                };

                match msg {
                    Message::Text(text) => {
                        if let Err(e) = handle_frame(&text, addr, conn_id, &broker, &tx, &mut auth).await {
                            warn!("Closing connection {}: {}", addr, e);
                            break;
                        }
                    }
                    Message::Pong(_) => {
                        waiting_for_pong = false;
                        pong_deadline = None;
                        debug!("Pong received from {}", addr);
                    }
                    Message::Close(_) => {
                        info!("Close received from {}", addr);
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    if let Some(peer) = &auth {
        peer.game.leave(peer.peer_id, conn_id).await;
    }

    send_task.abort();
    info!("WebSocket disconnected: {}", addr);

    Ok(())
}

/// Decode and dispatch one inbound frame. A returned error closes the
/// transport: decode failures, unauthenticated non-hello traffic, and
/// rejected game credentials are the only fatal cases.
async fn handle_frame(
    text: &str,
    addr: SocketAddr,
    conn_id: ConnId,
    broker: &Broker,
    tx: &mpsc::UnboundedSender<OutboundMessage>,
    auth: &mut Option<AuthedPeer>,
) -> Result<(), SignalError> {
    let envelope: Envelope = serde_json::from_str(text)?;

    match envelope {
        Envelope::HelloServer {
            game,
            flags,
            reconnect_token,
            attributes,
        } => {
            if auth.is_some() {
                error!("Got hello_server from {} which already has a peer id", addr);
                return Ok(());
            }
            if flags & HELLO_WEBRTC_SUPPORTED == 0 {
                error!("Client {} does not support WebRTC", addr);
                return Ok(());
            }

            let handle = broker.verify_game(&game)?;
            let peer_id = handle
                .hello(HelloRequest {
                    conn_id,
                    url: addr.to_string(),
                    trickle_ice: flags & HELLO_NO_TRICKLE_ICE == 0,
                    reconnect_token,
                    attributes,
                    tx: tx.clone(),
                })
                .await?;

            debug!(
                "Connection {} authenticated as peer {} in game {}",
                addr,
                peer_id,
                handle.game_id()
            );
            *auth = Some(AuthedPeer {
                game: handle,
                peer_id,
            });
            Ok(())
        }

        envelope => match auth {
            Some(peer) => {
                peer.game.frame(peer.peer_id, conn_id, envelope).await;
                Ok(())
            }
            None => {
                warn!(
                    "Got {} from non-authenticated connection \"{}\"",
                    envelope.kind(),
                    addr
                );
                Err(SignalError::NotAuthenticated(envelope.kind()))
            }
        },
    }
}
