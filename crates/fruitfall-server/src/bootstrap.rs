//! Turns a loaded [`Config`] into the server's runtime pieces.

use std::sync::Arc;

use fruitfall_config::{Config, ConfigError, ModeSetting};
use fruitfall_multiplayer::{DispatchConfig, Dispatcher, LobbyBroadcaster, MemoryRoomStore, RoomRegistry};
use fruitfall_net::{FrameConfig, GameMode, GameServer, ModeKind, ServerConfig, StaticTokenVerifier};

pub fn server_config(config: &Config) -> Result<ServerConfig, ConfigError> {
    let network = &config.network;
    Ok(ServerConfig {
        bind_addr: network.socket_addr()?,
        max_connections: network.max_connections,
        handshake_timeout: network.handshake_timeout(),
        outbound_queue: network.outbound_queue,
        frame: FrameConfig {
            max_payload_size: network.max_frame_bytes,
        },
    })
}

pub fn dispatch_config(config: &Config) -> DispatchConfig {
    let kind = match config.game.default_mode {
        ModeSetting::Moves => ModeKind::Moves,
        ModeSetting::Time => ModeKind::Time,
    };
    DispatchConfig {
        state_interval: config.game.state_throttle(),
        default_mode: GameMode {
            kind,
            limit: config.game.default_limit,
        },
    }
}

pub fn token_verifier(config: &Config) -> StaticTokenVerifier {
    let mut verifier = StaticTokenVerifier::new();
    for (token, entry) in &config.auth.tokens {
        verifier.insert(token.as_str(), entry.identity.as_str(), entry.name.as_str());
    }
    verifier
}

/// A ready-to-run server with an empty registry and in-memory room store.
pub fn build_server(config: &Config) -> Result<GameServer, ConfigError> {
    let verifier = token_verifier(config);
    if verifier.is_empty() {
        tracing::warn!("No auth tokens configured; every connection will be rejected");
    }

    let dispatcher = Dispatcher::new(
        Arc::new(RoomRegistry::new()),
        Arc::new(LobbyBroadcaster::new()),
        Arc::new(MemoryRoomStore::new()),
        dispatch_config(config),
    );
    Ok(GameServer::new(
        server_config(config)?,
        Arc::new(verifier),
        Arc::new(dispatcher),
    ))
}
