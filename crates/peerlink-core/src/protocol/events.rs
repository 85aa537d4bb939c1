//! Transport event wire format.
//!
//! The transport emits named events with JSON payloads:
//!
//! | Event name        | Payload                                   |
//! |-------------------|-------------------------------------------|
//! | `pair-update`     | `["<peer id>", "<PAIR_STATUS>"]`          |
//! | `transfer-update` | `{ "id", "peer_id", "transfer_type" }`    |
//!
//! [`decode_event`] turns one of these into a typed [`TransportEvent`];
//! [`encode_event`] produces the name/payload pair for a typed event.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{pairing::PairStatus, peer::PeerId, transfer::TransferUpdate};

/// Name of the pairing status event.
pub const PAIR_UPDATE: &str = "pair-update";
/// Name of the transfer progress / delivery event.
pub const TRANSFER_UPDATE: &str = "transfer-update";

/// Errors produced while decoding an event payload.
#[derive(Debug, Error)]
pub enum EventDecodeError {
    #[error("unknown event name: {0}")]
    UnknownEvent(String),
    #[error("malformed {event} payload: {source}")]
    Malformed {
        event: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// An event pushed by the transport to the node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TransportEvent {
    PairUpdate { peer_id: PeerId, status: PairStatus },
    TransferUpdate(TransferUpdate),
}

impl TransportEvent {
    /// Wire name of this event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::PairUpdate { .. } => PAIR_UPDATE,
            Self::TransferUpdate(_) => TRANSFER_UPDATE,
        }
    }
}

/// Decodes a named event payload.
///
/// # Errors
///
/// Returns [`EventDecodeError::UnknownEvent`] for names other than
/// [`PAIR_UPDATE`] and [`TRANSFER_UPDATE`], and
/// [`EventDecodeError::Malformed`] when the JSON does not match the payload
/// shape.
pub fn decode_event(name: &str, payload: &str) -> Result<TransportEvent, EventDecodeError> {
    match name {
        PAIR_UPDATE => {
            let (peer_id, status): (PeerId, PairStatus) = serde_json::from_str(payload)
                .map_err(|source| EventDecodeError::Malformed {
                    event: PAIR_UPDATE,
                    source,
                })?;
            Ok(TransportEvent::PairUpdate { peer_id, status })
        }
        TRANSFER_UPDATE => {
            let update: TransferUpdate =
                serde_json::from_str(payload).map_err(|source| EventDecodeError::Malformed {
                    event: TRANSFER_UPDATE,
                    source,
                })?;
            Ok(TransportEvent::TransferUpdate(update))
        }
        other => Err(EventDecodeError::UnknownEvent(other.to_string())),
    }
}

/// Encodes an event into its wire name and JSON payload.
///
/// # Errors
///
/// Propagates `serde_json` serialization failures.
pub fn encode_event(event: &TransportEvent) -> Result<(&'static str, String), serde_json::Error> {
    let payload = match event {
        TransportEvent::PairUpdate { peer_id, status } => serde_json::to_string(&(peer_id, status))?,
        TransportEvent::TransferUpdate(update) => serde_json::to_string(update)?,
    };
    Ok((event.name(), payload))
}
