use std::collections::HashSet;
use std::time::Duration;

use heliograph::signaling::{
    Broker, DEFAULT_RECONNECT_TTL, DEFAULT_SIGNALING_PORT, IceServer, SignalingServer,
};
use tracing::{error, info};

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt::init();

    let bind_addr = std::env::var("HELIOGRAPH_BIND")
        .unwrap_or_else(|_| format!("0.0.0.0:{}", DEFAULT_SIGNALING_PORT));

    let ice_servers: Vec<IceServer> = match std::env::var("HELIOGRAPH_ICE_SERVERS") {
        Ok(raw) => raw.split(',').filter_map(IceServer::from_legacy).collect(),
        Err(_) => IceServer::default_stun(),
    };

    let allowed_games: Option<HashSet<String>> = std::env::var("HELIOGRAPH_GAMES")
        .ok()
        .map(|raw| {
            raw.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect::<HashSet<_>>()
        })
        .filter(|games| !games.is_empty());

    let reconnect_ttl = std::env::var("HELIOGRAPH_RECONNECT_TTL_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_RECONNECT_TTL);

    info!("Heliograph signaling broker starting...");
    info!("Listening: {} (WebSocket)", bind_addr);
    info!("ICE:       {} server(s)", ice_servers.len());
    match &allowed_games {
        Some(games) => info!("Games:     {} allowed", games.len()),
        None => info!("Games:     open registration"),
    }

    let server = SignalingServer::new(Broker::new(ice_servers, allowed_games, reconnect_ttl));

    let server_handle = tokio::spawn(async move {
        if let Err(e) = server.run(&bind_addr).await {
            error!("Signaling server error: {}", e);
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, stopping server...");

    server_handle.abort();

    info!("Server stopped. Goodbye!");
    Ok(())
}
