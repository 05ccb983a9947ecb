//! Group-chat server - entry point
//!
//! Wires the pieces together: logging, config, store migration, one-time
//! fleet seeding, the session hub, and the accept loop.

use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use chathub::{handle_connection, Config, RoomRegistry, ServerPool, SessionHub, Store};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // RUST_LOG controls verbosity, e.g. RUST_LOG=chathub=debug
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("chathub=info")),
        )
        .init();

    let config = Config::from_env();

    let store = Store::connect(&config.database_url).await?;
    store.migrate().await?;
    info!("store ready at {}", config.database_url);

    // Idempotent: a no-op on every start after the first.
    ServerPool::new(store.clone()).ensure_seeded().await?;

    let registry = RoomRegistry::new(store, &config);
    let hub = SessionHub::spawn();

    let listener = TcpListener::bind(&config.bind_addr).await?;
    info!("chat server listening on {}", config.bind_addr);

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                info!("new connection from {}", addr);
                let registry = registry.clone();
                let hub = hub.clone();

                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, registry, hub).await {
                        error!("connection handler error: {}", e);
                    }
                });
            }
            Err(e) => {
                error!("failed to accept connection: {}", e);
            }
        }
    }
}
