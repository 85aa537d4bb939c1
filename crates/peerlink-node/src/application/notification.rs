//! Transient notifications raised for the presentation layer.
//!
//! At most one notification is pending at a time.  A pairing outcome stays
//! pending until the consumer dismisses it; dismissal is what lets a rejected
//! negotiation fall back to `NONE`.

use std::fmt;

use peerlink_core::{PairRole, PairStatus, PeerId};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationKind {
    /// A negotiation reached a terminal status.
    PairOutcome {
        status: PairStatus,
        role: Option<PairRole>,
    },
    /// A command failed; the message is meant for the user.
    Error { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub peer_id: Option<PeerId>,
    pub kind: NotificationKind,
}

impl Notification {
    pub fn pair_outcome(peer_id: &str, status: PairStatus, role: Option<PairRole>) -> Self {
        Self {
            peer_id: Some(peer_id.to_string()),
            kind: NotificationKind::PairOutcome { status, role },
        }
    }

    pub fn error(peer_id: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            peer_id: peer_id.map(str::to_string),
            kind: NotificationKind::Error {
                message: message.into(),
            },
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.kind, NotificationKind::Error { .. })
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            NotificationKind::PairOutcome { status, role } => {
                let subject = role.map(PairRole::subject).unwrap_or("Peer");
                write!(f, "{subject} {}", status.tip())
            }
            NotificationKind::Error { message } => f.write_str(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_text_uses_role_subject() {
        let mine = Notification::pair_outcome("p", PairStatus::Paired, Some(PairRole::Initiator));
        let theirs = Notification::pair_outcome("p", PairStatus::Rejected, Some(PairRole::Responder));

        assert_eq!(mine.to_string(), "You accepted the pairing request, paired");
        assert_eq!(theirs.to_string(), "Peer rejected the pairing request");
    }

    #[test]
    fn test_error_notification_displays_message() {
        let n = Notification::error(Some("p"), "peer not found: p");
        assert!(n.is_error());
        assert_eq!(n.to_string(), "peer not found: p");
        assert_eq!(n.peer_id.as_deref(), Some("p"));
    }
}
