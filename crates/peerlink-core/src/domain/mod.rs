//! Domain entities for PeerLink.
//!
//! Pure data types and rules with no I/O: peers found on the LAN, the pairing
//! handshake vocabulary, timeline messages and the transfer updates the
//! transport reports.  Everything here can be tested without a runtime.

pub mod message;
pub mod pairing;
pub mod peer;
pub mod transfer;
