//! Discovery lifecycle: the bounded window during which the node broadcasts
//! its presence and polls the transport for peers.
//!
//! ```text
//! NotStarted ──start()──► Running ──window expiry──► Ended
//!                            ▲                          │
//!                            └────────── reset() ◄──────┘
//! ```
//!
//! While `Running`, every poll tick fetches the transport's full peer list and
//! replaces the candidate set with it.  A failed poll skips that tick only.
//! `reset()` cancels the window's timers unconditionally before starting a new
//! window, so two windows never run at once.

use std::time::Duration;

use peerlink_core::{PeerRecord, PeerSet};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::timers::{self, TimerEvent, TimerGuard};
use super::transport::{Transport, TransportError};

/// Error type for discovery operations.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DiscoveryError {
    #[error("failed to start broadcasting: {0}")]
    StartBroadcasting(#[source] TransportError),
    #[error("failed to start listening: {0}")]
    StartListening(#[source] TransportError),
}

/// Lifecycle state of the discovery window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WindowState {
    NotStarted,
    Running,
    Ended,
}

/// Timing of a discovery window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoverySettings {
    pub poll_interval: Duration,
    pub window: Duration,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            window: Duration::from_secs(10),
        }
    }
}

/// Read-only snapshot of the discovery state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscoveryView {
    pub window: WindowState,
    /// Poll attempts made in the current window, failed ones included.
    pub polls: u32,
    pub peers: Vec<PeerRecord>,
}

/// Owns the peer candidate set and the timers of the current window.
pub struct DiscoveryManager {
    settings: DiscoverySettings,
    peers: PeerSet,
    window: WindowState,
    /// Identifies the current window; timer events from older windows are dropped.
    epoch: u64,
    polls: u32,
    timer: Option<TimerGuard>,
}

impl DiscoveryManager {
    pub fn new(settings: DiscoverySettings) -> Self {
        Self {
            settings,
            peers: PeerSet::new(),
            window: WindowState::NotStarted,
            epoch: 0,
            polls: 0,
            timer: None,
        }
    }

    pub fn window(&self) -> WindowState {
        self.window
    }

    pub fn peers(&self) -> &PeerSet {
        &self.peers
    }

    pub fn view(&self) -> DiscoveryView {
        DiscoveryView {
            window: self.window,
            polls: self.polls,
            peers: self.peers.sorted(),
        }
    }

    /// Starts broadcasting, then listening, then the window timers.
    ///
    /// Any timers of a previous window are cancelled first.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError`] if either transport call fails.  If
    /// listening fails, broadcasting is stopped again before returning.
    pub async fn start(
        &mut self,
        transport: &dyn Transport,
        timer_tx: &mpsc::Sender<TimerEvent>,
    ) -> Result<(), DiscoveryError> {
        self.cancel_timers();

        transport
            .start_broadcasting()
            .await
            .map_err(DiscoveryError::StartBroadcasting)?;

        if let Err(e) = transport.start_listening().await {
            if let Err(stop_err) = transport.stop_broadcasting().await {
                warn!("failed to stop broadcasting after listen failure: {stop_err}");
            }
            return Err(DiscoveryError::StartListening(e));
        }

        self.polls = 0;
        self.window = WindowState::Running;
        self.timer = Some(timers::spawn_discovery_window(
            timer_tx.clone(),
            self.epoch,
            self.settings.poll_interval,
            self.settings.window,
        ));
        info!(
            epoch = self.epoch,
            window_secs = self.settings.window.as_secs(),
            "discovery window started"
        );
        Ok(())
    }

    /// Handles a poll tick.  Ticks from a cancelled window are ignored.
    pub async fn on_poll_tick(&mut self, transport: &dyn Transport, epoch: u64) {
        if !self.is_current(epoch) {
            debug!(epoch, current = self.epoch, "dropping stale poll tick");
            return;
        }

        self.polls += 1;
        match transport.get_peers().await {
            Ok(snapshot) => {
                debug!(poll = self.polls, peers = snapshot.len(), "peer snapshot received");
                self.peers.replace_with(snapshot);
            }
            Err(e) => warn!(poll = self.polls, "peer poll failed, skipping tick: {e}"),
        }
    }

    /// Handles the end of the discovery window.
    pub async fn on_window_expired(&mut self, transport: &dyn Transport, epoch: u64) {
        if !self.is_current(epoch) {
            debug!(epoch, current = self.epoch, "dropping stale window expiry");
            return;
        }

        self.cancel_timers();
        self.stop_transport(transport).await;
        self.window = WindowState::Ended;
        info!(polls = self.polls, peers = self.peers.len(), "discovery window ended");
    }

    /// Clears the candidate set, cancels both timers and starts a new window.
    ///
    /// A running window is ended first, so a failed restart leaves the window
    /// `Ended` with broadcasting and listening stopped.
    ///
    /// # Errors
    ///
    /// Propagates [`DiscoveryError`] from the restart.
    pub async fn reset(
        &mut self,
        transport: &dyn Transport,
        timer_tx: &mpsc::Sender<TimerEvent>,
    ) -> Result<(), DiscoveryError> {
        info!("resetting discovery");
        self.shutdown(transport).await;
        self.peers.clear();
        self.polls = 0;
        if let Err(e) = transport.clear_peers().await {
            warn!("transport failed to clear peers: {e}");
        }
        self.start(transport, timer_tx).await
    }

    /// Cancels the window and stops broadcasting/listening if it was running.
    pub async fn shutdown(&mut self, transport: &dyn Transport) {
        let was_running = self.window == WindowState::Running;
        self.cancel_timers();
        if was_running {
            self.stop_transport(transport).await;
            self.window = WindowState::Ended;
        }
    }

    fn is_current(&self, epoch: u64) -> bool {
        epoch == self.epoch && self.window == WindowState::Running && self.timer.is_some()
    }

    /// Aborts the window task and invalidates anything it already queued.
    fn cancel_timers(&mut self) {
        self.timer = None;
        self.epoch += 1;
    }

    async fn stop_transport(&self, transport: &dyn Transport) {
        if let Err(e) = transport.stop_broadcasting().await {
            warn!("failed to stop broadcasting: {e}");
        }
        if let Err(e) = transport.stop_listening().await {
            warn!("failed to stop listening: {e}");
        }
    }
}
