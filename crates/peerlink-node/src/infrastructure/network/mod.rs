//! Network infrastructure for a PeerLink node.
//!
//! # Sub-modules
//!
//! - **`loopback`** – An in-process LAN hub implementing the transport port.
//!   Any number of nodes can join; visibility follows their broadcasting /
//!   listening flags and pairing / text commands are mirrored to both sides
//!   as `pair-update` and `transfer-update` events.  Used by the headless demo
//!   and the integration tests.

pub mod loopback;

pub use loopback::{LoopbackNetwork, LoopbackTransport, Operation};
