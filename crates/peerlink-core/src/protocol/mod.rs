//! Transport-facing wire types: event names and payloads, plus the sequence
//! counter used to number timeline messages.

pub mod events;
pub mod sequence;

pub use events::{decode_event, encode_event, EventDecodeError, TransportEvent};
pub use sequence::SequenceCounter;
