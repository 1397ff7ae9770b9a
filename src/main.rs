//! Knock 31 Game Server
//!
//! Authoritative server for the card game 31. Binds a WebSocket
//! listener and coordinates rooms until shut down.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use knock31::{GameServer, ServerConfig, MAX_PLAYERS, VERSION};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = ServerConfig::default();
    if let Ok(addr) = std::env::var("KNOCK31_ADDR") {
        config.bind_addr = addr.parse()?;
    }
    if let Ok(secs) = std::env::var("KNOCK31_GRACE_SECS") {
        config.disconnect_grace = Duration::from_secs(secs.parse()?);
    }

    info!("Knock 31 Server v{}", VERSION);
    info!("Rooms seat 2-{} players", MAX_PLAYERS);
    info!(
        "Disconnect grace: {}s",
        config.disconnect_grace.as_secs()
    );

    let server = Arc::new(GameServer::new(config));
    let mut runner = {
        let server = server.clone();
        tokio::spawn(async move { server.run().await })
    };

    tokio::select! {
        result = &mut runner => result??,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received, notifying clients");
            server.shutdown();
            runner.await??;
        }
    }

    Ok(())
}
