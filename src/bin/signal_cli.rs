use std::error::Error;

use futures_util::{SinkExt, StreamExt};
use heliograph::signaling::{DEFAULT_SIGNALING_PORT, Envelope, HELLO_WEBRTC_SUPPORTED};
use tokio::io::{self, AsyncBufReadExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

/// Interactive debug client: authenticates into a game, then passes stdin
/// JSON envelopes through to the broker and prints whatever comes back.
///
/// Usage: signal_cli [ws-url] [game]
#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let mut args = std::env::args().skip(1);
    let url = args
        .next()
        .unwrap_or_else(|| format!("ws://127.0.0.1:{}", DEFAULT_SIGNALING_PORT));
    let game = args.next().unwrap_or_else(|| "demo".to_string());

    let (ws_stream, _) = connect_async(url.as_str()).await?;
    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    let hello = Envelope::HelloServer {
        game,
        flags: HELLO_WEBRTC_SUPPORTED,
        reconnect_token: None,
        attributes: None,
    };
    ws_tx
        .send(Message::Text(serde_json::to_string(&hello)?.into()))
        .await?;

    // Print every inbound envelope as it arrives
    tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_rx.next().await {
            if let Message::Text(text) = msg {
                match serde_json::from_str::<Envelope>(&text) {
                    Ok(envelope) => println!("< [{}] {}", envelope.kind(), text),
                    Err(_) => println!("< {}", text),
                }
            }
        }
        println!("Connection closed by broker");
    });

    println!("Connected to {}. Type envelopes to send, e.g.:", url);
    println!(r#"  {{"type": "alias_register", "alias": "alice"}}"#);
    println!(r#"  {{"type": "p2p_offer", "peer": 2, "flags": 0, "offer": "sdp"}}"#);

    let mut stdin = io::BufReader::new(io::stdin()).lines();
    while let Ok(Some(line)) = stdin.next_line().await {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if serde_json::from_str::<Envelope>(line).is_err() {
            println!("Not a valid envelope, skipping");
            continue;
        }
        ws_tx.send(Message::Text(line.to_string().into())).await?;
    }

    Ok(())
}
