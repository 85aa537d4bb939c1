//! Pairing handshake vocabulary: statuses, roles and user-facing tips.
//!
//! ```text
//! NONE ──► REQUESTED ─────────┐
//!   │                         ├──► PAIRED
//!   └────► REQUEST_RECEIVED ──┴──► REJECTED
//! ```
//!
//! `PAIRED` and `REJECTED` are terminal.  The transport is the authority on a
//! peer's status; the node only mirrors what it is told.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Pairing status of one peer, as reported by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PairStatus {
    None,
    /// This node sent a request and is waiting for the answer.
    Requested,
    /// A remote peer asked this node to pair.
    RequestReceived,
    Paired,
    Rejected,
}

impl PairStatus {
    /// `true` for `Paired` and `Rejected`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Paired | Self::Rejected)
    }

    /// `true` while a negotiation is waiting on a decision.
    pub fn is_negotiating(self) -> bool {
        matches!(self, Self::Requested | Self::RequestReceived)
    }

    /// Short user-facing description of the status.
    pub fn tip(self) -> &'static str {
        match self {
            Self::None => "",
            Self::Requested => "sent a pairing request, waiting for a response",
            Self::RequestReceived => "received a pairing request",
            Self::Paired => "accepted the pairing request, paired",
            Self::Rejected => "rejected the pairing request",
        }
    }
}

impl Default for PairStatus {
    fn default() -> Self {
        Self::None
    }
}

impl fmt::Display for PairStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "NONE",
            Self::Requested => "REQUESTED",
            Self::RequestReceived => "REQUEST_RECEIVED",
            Self::Paired => "PAIRED",
            Self::Rejected => "REJECTED",
        };
        f.write_str(name)
    }
}

/// Role label attached to an open negotiation.
///
/// The labels are inverted with respect to who sent the request: the node
/// that *received* the request is labelled `Initiator` and the node that sent
/// it is labelled `Responder`.  Presentation text depends on this mapping, so
/// it is kept as is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PairRole {
    Initiator,
    Responder,
}

impl PairRole {
    /// Maps a negotiating status to its role label.
    ///
    /// Returns `None` for statuses that do not open a negotiation.
    pub fn for_status(status: PairStatus) -> Option<Self> {
        match status {
            PairStatus::RequestReceived => Some(Self::Initiator),
            PairStatus::Requested => Some(Self::Responder),
            _ => None,
        }
    }

    /// Subject used when announcing an outcome to the user.
    pub fn subject(self) -> &'static str {
        match self {
            Self::Initiator => "You",
            Self::Responder => "Peer",
        }
    }
}
