//! Role wiring for the training stand pair.
//!
//! # Environment
//!
//! | Variable                  | Meaning                                   |
//! |---------------------------|-------------------------------------------|
//! | `STANDLINK_ROLE`          | `hub` (laptop, default) or `tablet`       |
//! | `STANDLINK_PORT`          | WebSocket port (default 8080)             |
//! | `STANDLINK_DISCOVERY_PORT`| UDP discovery port (default 15000)        |
//! | `STANDLINK_SERVER_ADDR`   | Tablet only: skip discovery, dial directly|
//! | `STANDLINK_STAND_PREFIX`  | Expected hub name prefix (default `stand`)|

use std::sync::Arc;

use anyhow::Context;
use standlink_core::{
    EndpointOptions, StandNameValidator, TrailingDigitsExtractor,
};
use standlink_discovery::{Broadcaster, Listener};
use standlink_protocol::commands::RestoredStateCommand;
use standlink_protocol::{Command, CommandKind, CommandRegistry};
use standlink_session::{
    run_with_reconnect, LaptopServer, StandNotifier, TabletClient,
};
use standlink_core::types::StandState;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub async fn run() -> anyhow::Result<()> {
    let role = std::env::var("STANDLINK_ROLE").unwrap_or_else(|_| "hub".to_owned());
    let options = options_from_env()?;

    match role.as_str() {
        "hub" => run_hub(options).await,
        "tablet" => run_tablet(options).await,
        other => anyhow::bail!("Unknown STANDLINK_ROLE '{other}' (expected 'hub' or 'tablet')"),
    }
}

fn options_from_env() -> anyhow::Result<EndpointOptions> {
    let mut options = EndpointOptions::default();
    if let Ok(port) = std::env::var("STANDLINK_PORT") {
        options.port = port.parse().context("STANDLINK_PORT must be a port number")?;
    }
    if let Ok(port) = std::env::var("STANDLINK_DISCOVERY_PORT") {
        options.discovery_port =
            port.parse().context("STANDLINK_DISCOVERY_PORT must be a port number")?;
    }
    if let Ok(addr) = std::env::var("STANDLINK_SERVER_ADDR") {
        options.server_address = addr;
    }
    Ok(options)
}

// MARK: - Hub role

/// Laptop hub: listen, announce over discovery, answer stand connects with
/// the restored state.
async fn run_hub(mut options: EndpointOptions) -> anyhow::Result<()> {
    let broadcaster = Broadcaster::for_local_host(options.port, options.discovery_port);
    // Context dispatch routes on the hub's own stand name.
    options.peer_name = Some(broadcaster.name().to_owned());

    let registry = CommandRegistry::with_builtin_commands(Arc::new(TrailingDigitsExtractor));
    let server = LaptopServer::with_broadcaster(options, Arc::clone(&registry), broadcaster);

    install_hub_handlers(&registry, &server)?;

    let addr = server.start().await.context("hub failed to start")?;
    info!("Hub ready on {}", addr);

    tokio::signal::ctrl_c().await.context("signal handler")?;
    info!("Shutting down");
    server.stop().await;
    Ok(())
}

fn install_hub_handlers(
    registry: &Arc<CommandRegistry>,
    server: &Arc<LaptopServer>,
) -> anyhow::Result<()> {
    // A tablet announcing itself gets the stand's current state back; the
    // handler calls back into the session through the serialized send path.
    let respond_to = Arc::clone(server);
    registry
        .set_context_handler(CommandKind::StandConnect.discriminator(), move |stand, command| {
            info!("Stand {} connect frame: {:?}", stand.stand_number, command);
            let server = Arc::clone(&respond_to);
            let restored = Command::RestoredState(RestoredStateCommand {
                stand_number: stand.stand_number,
                restored_state: StandState::new(stand.stand_number),
            });
            tokio::spawn(async move {
                if let Err(e) = server.send(&restored).await {
                    warn!("Could not answer stand connect: {}", e);
                }
            });
            Ok(())
        })?;

    for kind in [CommandKind::Sensor, CommandKind::StandState, CommandKind::EmergencyShutdown] {
        registry
            .set_handler(kind.discriminator(), move |command| {
                info!("{} from tablet: {:?}", kind, command);
                Ok(())
            })?;
    }
    Ok(())
}

// MARK: - Tablet role

/// Tablet: discover a hub (or dial `STANDLINK_SERVER_ADDR` directly), then
/// keep the session alive until interrupted.
async fn run_tablet(mut options: EndpointOptions) -> anyhow::Result<()> {
    let extractor = Arc::new(TrailingDigitsExtractor);
    let registry = CommandRegistry::with_builtin_commands(extractor.clone());
    registry
        .set_context_handler(CommandKind::RestoredState.discriminator(), |stand, command| {
            info!("Stand {} restored state: {:?}", stand.stand_number, command);
            Ok(())
        })?;

    let notifier = StandNotifier::new(extractor);
    let mut stand_events = notifier.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = stand_events.recv().await {
            info!("Stand event: {:?}", event);
        }
    });

    let token = CancellationToken::new();

    if options.server_address.is_empty() {
        let peer = discover_hub(&options, &token).await?;
        notifier.notify_connected(&peer.0);
        options.server_address = peer.1;
        options.peer_name = Some(peer.0);
        options.port = peer.2;
    }

    let client = TabletClient::new(options, registry);

    let session_token = token.clone();
    let session = tokio::spawn(async move {
        // The endpoint never retries internally; the caller owns the policy.
        run_with_reconnect(&client, session_token).await;
    });

    tokio::signal::ctrl_c().await.context("signal handler")?;
    info!("Shutting down");
    token.cancel();
    let _ = session.await;
    Ok(())
}

/// Wait for the first hub whose name passes validation.
async fn discover_hub(
    options: &EndpointOptions,
    token: &CancellationToken,
) -> anyhow::Result<(String, String, u16)> {
    let prefix =
        std::env::var("STANDLINK_STAND_PREFIX").unwrap_or_else(|_| "stand".to_owned());
    let validator = StandNameValidator::new(&prefix);

    let listener = Listener::new(options.discovery_port);
    let mut peers = listener
        .start_browsing(token.child_token())
        .await
        .context("discovery browse failed")?;

    info!("Waiting for a hub announcement on UDP {}", options.discovery_port);
    while let Some(peer) = peers.recv().await {
        if validator.is_valid(&peer.name) {
            info!("Discovered hub '{}' at {}:{}", peer.name, peer.address, peer.port);
            return Ok((peer.name, peer.address.to_string(), peer.port));
        }
        info!("Ignoring peer '{}': name fails validation", peer.name);
    }
    anyhow::bail!("discovery channel closed before a hub was found")
}
