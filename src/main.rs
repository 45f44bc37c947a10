//! Wager Referee Server
//!
//! Loads the signing key, then serves matches over WebSocket until Ctrl-C.
//! A missing or malformed signing key or configuration value aborts startup.

use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use wager_referee::{
    network::{AuthConfig, RefereeServer, ServerConfig},
    AttestationSigner, EcdsaSigner, MatchRegistry, Referee, RefereeConfig, VERSION,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Wager Referee v{}", VERSION);

    let signer = EcdsaSigner::from_env().context("Failed to load referee signing key")?;
    let referee_config = RefereeConfig::from_env().context("Invalid referee configuration")?;
    let server_config = ServerConfig::from_env().context("Invalid server configuration")?;
    let auth_config = AuthConfig::from_env();

    info!("Referee address: {}", signer.address());
    info!("Chain id: {}", referee_config.chain_id);
    info!("Replay starter: {:?}", referee_config.replay_starter);
    if !auth_config.is_configured() {
        warn!("No auth provider configured: any connection can play as any address");
    }

    let referee = Referee::new(
        referee_config,
        Arc::new(MatchRegistry::new()),
        Arc::new(signer),
    );
    let server = Arc::new(RefereeServer::new(server_config, auth_config, Arc::new(referee)));

    let shutdown_server = server.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            return;
        }
        info!("Ctrl-C received, shutting down");
        shutdown_server.shutdown();
    });

    server.run().await.context("Referee server failed")?;
    info!("Referee stopped");
    Ok(())
}
