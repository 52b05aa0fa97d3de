// src/main.rs
//
// portscope: multi-channel serial port monitoring server. Bridges physical
// serial devices to WebSocket/REST clients with live line framing, protocol
// decoding, per-channel buffering, macro playback and export.

mod channel;
mod config;
mod decode;
mod error;
mod events;
mod export;
mod macros;
mod ports;
mod server;
mod store;
mod types;

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use channel::manager::ChannelManager;
use channel::SystemPortOpener;
use config::ServerConfig;
use decode::DecoderRegistry;
use events::EventBus;
use ports::PortWatcher;
use server::AppState;
use store::{MacroStore, ProfileStore};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::parse();
    if let Err(e) = run(config).await {
        error!("fatal: {}", e);
        std::process::exit(1);
    }
}

async fn run(config: ServerConfig) -> Result<(), String> {
    if config.tls_enabled {
        warn!("TLS termination is delegated to a fronting proxy; serving plain HTTP");
    }
    if config.auth_enabled && config.auth_user.is_none() {
        warn!("AUTH_ENABLED is set without AUTH_USER; all requests will be rejected");
    }

    let decoders = Arc::new(match config.decoder_keys() {
        Some(keys) => DecoderRegistry::with_enabled(&keys),
        None => DecoderRegistry::with_all(),
    });

    let bus = EventBus::new();
    let manager = Arc::new(ChannelManager::new(
        bus.clone(),
        decoders.clone(),
        Arc::new(SystemPortOpener),
    ));
    let macros = Arc::new(MacroStore::load(config.macros_path()));
    let profiles = Arc::new(ProfileStore::load(config.profiles_path()));

    let watcher = PortWatcher::system(bus.clone());
    watcher.start(config.poll_interval_ms);

    let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
    let port = config.port;
    let state = AppState {
        config: Arc::new(config),
        manager: manager.clone(),
        decoders,
        macros,
        profiles,
        shutdown: shutdown_tx,
    };
    let app = server::router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| format!("failed to bind {}: {}", addr, e))?;
    info!("listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => info!("interrupt received"),
                _ = shutdown_rx.recv() => info!("shutdown requested over REST"),
            }
        })
        .await
        .map_err(|e| format!("server error: {}", e))?;

    // Best-effort cleanup; shutdown never propagates errors
    manager.shutdown_all().await;
    watcher.stop().await;
    info!("shutdown complete");
    Ok(())
}
