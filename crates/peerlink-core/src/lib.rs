//! # peerlink-core
//!
//! Shared library for PeerLink containing the domain entities and the event
//! wire types exchanged with the LAN transport.
//!
//! This crate has no dependencies on async runtimes, sockets, or UI
//! frameworks.
//!
//! - **`domain`** – Peers discovered on the LAN, the pairing handshake
//!   vocabulary, timeline messages and staged attachments, transfer updates.
//! - **`protocol`** – The `pair-update` / `transfer-update` event codec and
//!   the per-session [`SequenceCounter`].

pub mod domain;
pub mod protocol;

// Re-export the most-used types at the crate root.
pub use domain::message::{Direction, FileInfo, Message, MessageKind, SelectedFile};
pub use domain::pairing::{PairRole, PairStatus};
pub use domain::peer::{OsInfo, OsType, PeerId, PeerRecord, PeerSet, PeerStatus};
pub use domain::transfer::{TransferKind, TransferStatus, TransferUpdate};
pub use protocol::events::{decode_event, encode_event, EventDecodeError, TransportEvent};
pub use protocol::sequence::SequenceCounter;
