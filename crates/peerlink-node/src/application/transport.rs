//! The transport port: everything the node needs from the LAN layer.
//!
//! The coordinator only talks to the network through the [`Transport`]
//! trait.  Commands are async and fallible; events arrive on an
//! [`EventSubscription`] that releases itself when dropped.

use async_trait::async_trait;
use peerlink_core::{PeerId, PeerRecord, TransportEvent};
use thiserror::Error;
use tokio::sync::mpsc;

/// Error type for transport commands.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TransportError {
    /// The target peer is not known to the transport.
    #[error("peer not found: {0}")]
    PeerNotFound(PeerId),
    /// The transport could not be reached at all.
    #[error("transport unavailable: {0}")]
    Unavailable(String),
    /// The command reached the transport but failed there.
    #[error("{operation} failed: {reason}")]
    Failed {
        operation: &'static str,
        reason: String,
    },
}

/// Commands the node issues to the LAN transport.
///
/// Infrastructure implementations own sockets; test implementations record
/// calls and inject failures.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// Opens a stream of `pair-update` / `transfer-update` events.
    fn subscribe(&self) -> Result<EventSubscription, TransportError>;

    async fn start_broadcasting(&self) -> Result<(), TransportError>;

    async fn stop_broadcasting(&self) -> Result<(), TransportError>;

    async fn start_listening(&self) -> Result<(), TransportError>;

    async fn stop_listening(&self) -> Result<(), TransportError>;

    /// Returns the full list of peers currently known to the transport.
    async fn get_peers(&self) -> Result<Vec<PeerRecord>, TransportError>;

    /// Forgets every peer the transport has collected so far.
    async fn clear_peers(&self) -> Result<(), TransportError>;

    async fn send_pair_request(&self, target: &str) -> Result<(), TransportError>;

    async fn respond_pair_request(&self, target: &str, accepted: bool)
        -> Result<(), TransportError>;

    /// Sends a text message and returns the transport's task id as the ack.
    async fn send_text(&self, target: &str, content: &str) -> Result<String, TransportError>;
}

/// A live event subscription.
///
/// Dropping the subscription runs its release hook exactly once, so the
/// transport stops delivering to a receiver nobody reads.
pub struct EventSubscription {
    events: mpsc::Receiver<TransportEvent>,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl EventSubscription {
    /// Wraps `events`, running `release` when the subscription is dropped.
    pub fn new(events: mpsc::Receiver<TransportEvent>, release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            events,
            release: Some(Box::new(release)),
        }
    }

    /// Wraps `events` without a release hook.
    pub fn detached(events: mpsc::Receiver<TransportEvent>) -> Self {
        Self {
            events,
            release: None,
        }
    }

    /// Waits for the next event; `None` once the transport side is gone.
    pub async fn recv(&mut self) -> Option<TransportEvent> {
        self.events.recv().await
    }
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl std::fmt::Debug for EventSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSubscription")
            .field("has_release_hook", &self.release.is_some())
            .finish()
    }
}
