//! PeerLink node entry point.
//!
//! Runs a headless demonstration on an in-process loopback LAN: the local node
//! and a simulated peer that accepts every pairing request and echoes every
//! text it receives.  The node runs one discovery window, pairs with the
//! simulated peer, exchanges a message and then waits for Ctrl-C.
//!
//! # Usage
//!
//! ```text
//! peerlink-node [OPTIONS]
//!
//! Options:
//!   --config <PATH>   Config file [default: platform config dir]
//!   --dev             Use the development pairing timeout
//!   --name <NAME>     Device name advertised to peers
//! ```
//!
//! Each option can also be set with `PEERLINK_CONFIG`, `PEERLINK_DEV` and
//! `PEERLINK_NAME`.  CLI args take precedence.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ load config, init tracing
//!  └─ LoopbackNetwork
//!       ├─ local node  ── Coordinator task ── AppState (presentation bridge)
//!       └─ echo peer   (Tokio task)
//! ```

use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use peerlink_core::{PairStatus, PeerRecord, TransportEvent};
use peerlink_node::application::coordinator::{Coordinator, CoordinatorView};
use peerlink_node::application::transport::Transport;
use peerlink_node::infrastructure::network::{LoopbackNetwork, LoopbackTransport};
use peerlink_node::infrastructure::storage::config::{self, AppConfig, Mode};
use peerlink_node::infrastructure::ui_bridge::{self, AppState};

const DEMO_PORT: u16 = 53317;
const ECHO_PEER_ID: &str = "echo-peer";

/// PeerLink node: LAN discovery, pairing and message exchange.
#[derive(Debug, Parser)]
#[command(name = "peerlink-node", version)]
struct Cli {
    /// Path to the TOML config file.
    ///
    /// Defaults to `config.toml` in the platform config directory.
    #[arg(long, env = "PEERLINK_CONFIG")]
    config: Option<PathBuf>,

    /// Development mode: use the short pairing timeout.
    #[arg(long, env = "PEERLINK_DEV")]
    dev: bool,

    /// Device name advertised to peers.
    #[arg(long, env = "PEERLINK_NAME")]
    name: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = resolve_config(&cli)?;

    // Level is overridden by `RUST_LOG`.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.general.log_level)),
        )
        .init();

    info!(
        device_name = %config.general.device_name,
        mode = ?config.general.mode,
        "PeerLink node starting"
    );

    // ── Loopback LAN ──────────────────────────────────────────────────────────
    let network = LoopbackNetwork::new();
    let localhost = IpAddr::V4(Ipv4Addr::LOCALHOST);
    let me = network.join(PeerRecord::new(
        Uuid::new_v4().to_string(),
        config.general.device_name.clone(),
        localhost,
        DEMO_PORT,
    ));
    let echo = network.join(PeerRecord::new(ECHO_PEER_ID, "echo", localhost, DEMO_PORT + 1));
    let echo_task = spawn_echo_peer(echo)
        .await
        .context("failed to start the simulated peer")?;

    // ── Coordinator ───────────────────────────────────────────────────────────
    let handle = Coordinator::spawn(Arc::new(me), config.coordinator_settings())
        .context("failed to start the coordinator")?;
    let state = AppState::new(handle.clone(), config.clone());

    if let Err(e) = run_demo(&state, &config).await {
        warn!("demo did not complete: {e:#}");
    }

    let view = ui_bridge::get_view(Arc::clone(&state)).await;
    info!(
        "final view:\n{}",
        serde_json::to_string_pretty(&view).context("failed to render the view")?
    );

    info!("PeerLink node ready.  Press Ctrl-C to exit.");
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    info!("shutdown signal received");

    handle.shutdown().await.context("coordinator shutdown")?;
    echo_task.abort();
    info!("PeerLink node stopped");
    Ok(())
}

/// Loads the config file and applies CLI overrides.
fn resolve_config(cli: &Cli) -> anyhow::Result<AppConfig> {
    let mut config = match &cli.config {
        Some(path) => config::load_config_from(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => config::load_config().context("failed to load config")?,
    };
    if cli.dev {
        config.general.mode = Mode::Development;
    }
    if let Some(name) = &cli.name {
        config.general.device_name = name.clone();
    }
    config.validate().context("invalid configuration")?;
    Ok(config)
}

/// Discover the echo peer, pair with it and exchange one message.
async fn run_demo(state: &Arc<AppState>, config: &AppConfig) -> anyhow::Result<()> {
    let coordinator = &state.coordinator;
    let window = Duration::from_secs(config.discovery.window_secs);

    coordinator.start_discovery().await?;
    wait_for(state, window, "the echo peer to be discovered", |v| {
        v.discovery.peers.iter().any(|p| p.id == ECHO_PEER_ID)
    })
    .await?;
    info!(peers = ?ui_bridge::get_peers(Arc::clone(state)).await.data, "peers discovered");

    coordinator.send_pair_request(ECHO_PEER_ID).await?;
    wait_for(state, config.pairing_timeout(), "pairing to conclude", |v| {
        v.pairing.statuses.get(ECHO_PEER_ID).is_some_and(|s| s.is_terminal())
    })
    .await?;
    let outcome = coordinator.view().pairing.statuses.get(ECHO_PEER_ID).copied();
    coordinator.dismiss_notification().await?;
    if outcome != Some(PairStatus::Paired) {
        bail!("the echo peer did not pair: {outcome:?}");
    }

    coordinator.update_draft(ECHO_PEER_ID, "hello from PeerLink").await?;
    coordinator.send_message(ECHO_PEER_ID).await?;
    wait_for(state, Duration::from_secs(5), "the echo reply", |v| {
        v.sessions
            .iter()
            .any(|s| s.peer_id == ECHO_PEER_ID && s.timeline.len() >= 2)
    })
    .await?;
    Ok(())
}

/// Waits until `done` holds for the published view, for at most `limit`.
async fn wait_for(
    state: &AppState,
    limit: Duration,
    what: &str,
    done: impl FnMut(&CoordinatorView) -> bool,
) -> anyhow::Result<()> {
    let mut view = state.coordinator.watch();
    tokio::time::timeout(limit, view.wait_for(done))
        .await
        .with_context(|| format!("timed out waiting for {what}"))?
        .context("coordinator stopped")?;
    Ok(())
}

/// Starts the simulated peer: always visible, accepts every pairing request
/// and replies to every text with an echo.
async fn spawn_echo_peer(transport: LoopbackTransport) -> anyhow::Result<JoinHandle<()>> {
    let mut events = transport.subscribe()?;
    transport.start_broadcasting().await?;
    transport.start_listening().await?;

    Ok(tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                TransportEvent::PairUpdate {
                    peer_id,
                    status: PairStatus::RequestReceived,
                } => {
                    debug!(peer_id = %peer_id, "echo peer accepting pairing");
                    if let Err(e) = transport.respond_pair_request(&peer_id, true).await {
                        warn!("echo peer could not accept pairing: {e}");
                    }
                }
                TransportEvent::TransferUpdate(update) => {
                    let Some(text) = update.transfer_type.text() else {
                        continue;
                    };
                    let reply = format!("echo: {text}");
                    if let Err(e) = transport.send_text(&update.peer_id, &reply).await {
                        warn!("echo peer could not reply: {e}");
                    }
                }
                TransportEvent::PairUpdate { .. } => {}
            }
        }
    }))
}
