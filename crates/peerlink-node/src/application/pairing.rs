//! Pairing handshake state machine.
//!
//! The transport is authoritative: every `pair-update` notification is adopted
//! as the peer's status, and the only state the node decides on its own is
//! the optimistic `REQUESTED` after a local request and the implicit rejection
//! when a negotiation times out.
//!
//! # Negotiation dialog
//!
//! A `REQUESTED` or `REQUEST_RECEIVED` notification opens the negotiation
//! dialog and starts a countdown.  The countdown ticks once per second; when it
//! reaches zero the node rejects on the user's behalf, exactly once.  Whether
//! the dialog is open and how many seconds remain are tracked separately, and
//! every new negotiation restarts the countdown from the full timeout.
//!
//! Answering a request hides the dialog but keeps the deadline running until
//! the transport reports the outcome.  If no outcome arrives in time the
//! negotiation is abandoned and the peer returns to `NONE`.
//!
//! # One negotiation at a time
//!
//! While a negotiation is active, negotiation events for any other peer are
//! answered with an immediate rejection and never open a dialog.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use peerlink_core::{PairRole, PairStatus, PeerId};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::notification::Notification;
use super::timers::{self, TimerEvent, TimerGuard};
use super::transport::{Transport, TransportError};

const COUNTDOWN_STEP: Duration = Duration::from_secs(1);

/// Error type for pairing operations.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PairingError {
    /// The operation is not valid from the peer's current status.
    #[error("cannot {operation} for peer {peer_id} while its status is {status}")]
    InvalidTransition {
        peer_id: PeerId,
        status: PairStatus,
        operation: &'static str,
    },
    /// Another negotiation is still open.
    #[error("a pairing negotiation with {active} is already in progress")]
    NegotiationInProgress { active: PeerId },
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

/// The current (or last, until acknowledged) negotiation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PairingSession {
    pub peer_id: PeerId,
    /// Assigned once the first negotiating notification arrives.
    pub role: Option<PairRole>,
    pub status: PairStatus,
}

impl PairingSession {
    fn is_active(&self) -> bool {
        self.status.is_negotiating()
    }
}

/// Read-only snapshot of the open dialog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DialogView {
    pub peer_id: PeerId,
    pub status: PairStatus,
    pub role: Option<PairRole>,
    pub remaining_secs: u64,
}

/// Read-only snapshot of the pairing state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PairingView {
    pub statuses: BTreeMap<PeerId, PairStatus>,
    pub session: Option<PairingSession>,
    pub dialog: Option<DialogView>,
}

/// What handling a `pair-update` changed, for the coordinator to act on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairUpdateEffect {
    /// The notification only updated the status mirror.
    Mirrored,
    /// A negotiation dialog opened with a fresh countdown.
    DialogOpened,
    /// A negotiation with another peer is active; this one was rejected.
    RejectedBusy,
    /// The negotiation reached a terminal status.
    Concluded {
        status: PairStatus,
        notification: Option<Notification>,
    },
}

pub struct PairingMachine {
    statuses: HashMap<PeerId, PairStatus>,
    session: Option<PairingSession>,
    dialog_open: bool,
    remaining_secs: u64,
    timeout_secs: u64,
    /// Identifies the running countdown; ticks from older ones are dropped.
    epoch: u64,
    countdown: Option<TimerGuard>,
}

impl PairingMachine {
    pub fn new(timeout: Duration) -> Self {
        let timeout_secs = timeout.as_secs().max(1);
        Self {
            statuses: HashMap::new(),
            session: None,
            dialog_open: false,
            remaining_secs: timeout_secs,
            timeout_secs,
            epoch: 0,
            countdown: None,
        }
    }

    /// Mirrored status of `peer_id`; `NONE` when nothing was reported.
    pub fn status(&self, peer_id: &str) -> PairStatus {
        self.statuses.get(peer_id).copied().unwrap_or_default()
    }

    pub fn session(&self) -> Option<&PairingSession> {
        self.session.as_ref()
    }

    pub fn is_dialog_open(&self) -> bool {
        self.dialog_open
    }

    pub fn remaining_secs(&self) -> u64 {
        self.remaining_secs
    }

    /// Peer of the active (non-terminal) negotiation, if any.
    pub fn active_peer(&self) -> Option<&str> {
        self.session
            .as_ref()
            .filter(|s| s.is_active())
            .map(|s| s.peer_id.as_str())
    }

    pub fn view(&self) -> PairingView {
        let dialog = match (&self.session, self.dialog_open) {
            (Some(session), true) => Some(DialogView {
                peer_id: session.peer_id.clone(),
                status: session.status,
                role: session.role,
                remaining_secs: self.remaining_secs,
            }),
            _ => None,
        };
        PairingView {
            statuses: self
                .statuses
                .iter()
                .map(|(id, status)| (id.clone(), *status))
                .collect(),
            session: self.session.clone(),
            dialog,
        }
    }

    /// Asks `peer_id` to pair.
    ///
    /// The status moves to `REQUESTED` before the request is dispatched and
    /// falls back to `NONE` if the dispatch fails.
    ///
    /// # Errors
    ///
    /// - [`PairingError::NegotiationInProgress`] if a negotiation is open.
    /// - [`PairingError::InvalidTransition`] unless the peer is at `NONE`.
    /// - [`PairingError::Transport`] if the request could not be sent.
    pub async fn send_pair_request(
        &mut self,
        transport: &dyn Transport,
        peer_id: &str,
    ) -> Result<(), PairingError> {
        if let Some(active) = self.active_peer() {
            return Err(PairingError::NegotiationInProgress {
                active: active.to_string(),
            });
        }
        let status = self.status(peer_id);
        if status != PairStatus::None {
            return Err(PairingError::InvalidTransition {
                peer_id: peer_id.to_string(),
                status,
                operation: "send a pairing request",
            });
        }

        self.release_outcome(peer_id);
        self.statuses
            .insert(peer_id.to_string(), PairStatus::Requested);
        self.session = Some(PairingSession {
            peer_id: peer_id.to_string(),
            role: None,
            status: PairStatus::Requested,
        });
        info!(peer_id, "pairing request sent");

        if let Err(e) = transport.send_pair_request(peer_id).await {
            warn!(peer_id, "pairing request failed: {e}");
            self.statuses.remove(peer_id);
            self.session = None;
            return Err(e.into());
        }
        Ok(())
    }

    /// Sends the user's decision on a received request.
    ///
    /// The terminal status is not set here; it arrives with the transport's
    /// follow-up notification.  On success the dialog closes while the
    /// deadline keeps running; on failure the dialog stays open.
    ///
    /// # Errors
    ///
    /// - [`PairingError::InvalidTransition`] unless the peer is at
    ///   `REQUEST_RECEIVED`.
    /// - [`PairingError::Transport`] if the decision could not be sent.
    pub async fn respond(
        &mut self,
        transport: &dyn Transport,
        peer_id: &str,
        accepted: bool,
    ) -> Result<(), PairingError> {
        let status = self.status(peer_id);
        if status != PairStatus::RequestReceived {
            return Err(PairingError::InvalidTransition {
                peer_id: peer_id.to_string(),
                status,
                operation: "respond to a pairing request",
            });
        }

        transport
            .respond_pair_request(peer_id, accepted)
            .await
            .map_err(|e| {
                warn!(peer_id, accepted, "pairing response failed: {e}");
                PairingError::Transport(e)
            })?;

        info!(peer_id, accepted, "pairing response sent");
        if self.is_session_peer(peer_id) {
            self.dialog_open = false;
        }
        Ok(())
    }

    /// Adopts a `pair-update` notification.
    pub async fn on_pair_update(
        &mut self,
        transport: &dyn Transport,
        timer_tx: &mpsc::Sender<TimerEvent>,
        peer_id: &str,
        status: PairStatus,
    ) -> PairUpdateEffect {
        debug!(peer_id, %status, "pair-update received");

        if status.is_negotiating() {
            if let Some(active) = self.active_peer() {
                if active != peer_id {
                    return self.reject_busy(transport, peer_id, status).await;
                }
            }
            self.statuses.insert(peer_id.to_string(), status);
            self.open_dialog(timer_tx, peer_id, status);
            return PairUpdateEffect::DialogOpened;
        }

        let previous = self.statuses.get(peer_id).copied().unwrap_or_default();

        if status == PairStatus::None {
            self.statuses.remove(peer_id);
            if self.is_session_peer(peer_id) {
                self.close_dialog();
                self.session = None;
            }
            return PairUpdateEffect::Mirrored;
        }

        // Terminal status for a peer that is not part of the current
        // negotiation: nothing to acknowledge, so a rejection goes straight
        // back to NONE.
        if !self.is_session_peer(peer_id) && self.active_peer().is_some() {
            if status == PairStatus::Rejected {
                self.statuses.remove(peer_id);
            } else {
                self.statuses.insert(peer_id.to_string(), status);
            }
            return PairUpdateEffect::Mirrored;
        }

        self.statuses.insert(peer_id.to_string(), status);
        self.close_dialog();

        let role = match self.session.as_mut() {
            Some(session) if session.peer_id == peer_id => {
                session.status = status;
                session.role
            }
            _ => {
                self.release_outcome(peer_id);
                self.session = Some(PairingSession {
                    peer_id: peer_id.to_string(),
                    role: None,
                    status,
                });
                None
            }
        };

        let notification = (previous != status).then(|| {
            info!(peer_id, %status, "pairing concluded");
            Notification::pair_outcome(peer_id, status, role)
        });
        PairUpdateEffect::Concluded {
            status,
            notification,
        }
    }

    /// Handles one countdown tick.
    ///
    /// On reaching zero an open dialog rejects implicitly; an answered
    /// negotiation still waiting for its outcome is abandoned.  Returns the
    /// notification to raise when the deadline fires.
    pub async fn on_countdown_tick(
        &mut self,
        transport: &dyn Transport,
        epoch: u64,
    ) -> Option<Notification> {
        if epoch != self.epoch || self.active_peer().is_none() {
            debug!(epoch, current = self.epoch, "dropping stale countdown tick");
            return None;
        }

        self.remaining_secs = self.remaining_secs.saturating_sub(1);
        if self.remaining_secs > 0 {
            return None;
        }

        if self.dialog_open {
            self.reject_on_timeout(transport).await
        } else {
            self.abandon()
        }
    }

    /// Acknowledges a concluded negotiation.
    ///
    /// A rejected peer returns to `NONE`; a paired peer keeps its status.
    /// Active negotiations are unaffected.
    pub fn acknowledge(&mut self) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        if !session.status.is_terminal() {
            return;
        }
        if session.status == PairStatus::Rejected {
            self.statuses.remove(&session.peer_id);
        }
        debug!(peer_id = %session.peer_id, status = %session.status, "pairing outcome acknowledged");
        self.session = None;
    }

    /// Cancels the countdown.  Used on coordinator teardown.
    pub fn shutdown(&mut self) {
        self.close_dialog();
    }

    fn is_session_peer(&self, peer_id: &str) -> bool {
        self.session
            .as_ref()
            .is_some_and(|s| s.peer_id == peer_id)
    }

    /// Drops a concluded session that is being replaced before it was
    /// acknowledged, releasing a rejected peer other than `next_peer`.
    fn release_outcome(&mut self, next_peer: &str) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        if !session.status.is_terminal() {
            return;
        }
        if session.status == PairStatus::Rejected && session.peer_id != next_peer {
            self.statuses.remove(&session.peer_id);
        }
        debug!(peer_id = %session.peer_id, status = %session.status, "unacknowledged outcome replaced");
        self.session = None;
    }

    fn open_dialog(&mut self, timer_tx: &mpsc::Sender<TimerEvent>, peer_id: &str, status: PairStatus) {
        self.release_outcome(peer_id);
        self.session = Some(PairingSession {
            peer_id: peer_id.to_string(),
            role: PairRole::for_status(status),
            status,
        });
        self.epoch += 1;
        self.remaining_secs = self.timeout_secs;
        self.dialog_open = true;
        self.countdown = Some(timers::spawn_countdown(
            timer_tx.clone(),
            self.epoch,
            COUNTDOWN_STEP,
        ));
        info!(peer_id, %status, timeout_secs = self.timeout_secs, "negotiation dialog opened");
    }

    fn close_dialog(&mut self) {
        self.countdown = None;
        self.epoch += 1;
        self.dialog_open = false;
    }

    async fn reject_busy(
        &mut self,
        transport: &dyn Transport,
        peer_id: &str,
        status: PairStatus,
    ) -> PairUpdateEffect {
        warn!(
            peer_id,
            %status,
            active = self.active_peer().unwrap_or_default(),
            "negotiation already in progress, rejecting"
        );
        self.statuses.insert(peer_id.to_string(), status);
        if let Err(e) = transport.respond_pair_request(peer_id, false).await {
            warn!(peer_id, "busy rejection could not be sent: {e}");
        }
        PairUpdateEffect::RejectedBusy
    }

    fn abandon(&mut self) -> Option<Notification> {
        self.close_dialog();
        let session = self.session.take()?;
        self.statuses.remove(&session.peer_id);
        warn!(peer_id = %session.peer_id, "no pairing outcome before the deadline, abandoning");
        Some(Notification::error(
            Some(&session.peer_id),
            format!("Pairing with {} got no answer", session.peer_id),
        ))
    }

    async fn reject_on_timeout(&mut self, transport: &dyn Transport) -> Option<Notification> {
        self.close_dialog();
        let session = self.session.as_mut()?;
        let peer_id = session.peer_id.clone();
        session.status = PairStatus::Rejected;
        let role = session.role;
        self.statuses.insert(peer_id.clone(), PairStatus::Rejected);
        info!(peer_id = %peer_id, "pairing timed out, rejecting");

        if let Err(e) = transport.respond_pair_request(&peer_id, false).await {
            warn!(peer_id = %peer_id, "implicit rejection could not be sent: {e}");
        }
        Some(Notification::pair_outcome(&peer_id, PairStatus::Rejected, role))
    }
}
