//! Infrastructure layer for a PeerLink node.
//!
//! Contains the adapters around the application layer: the loopback LAN
//! transport, file-system config storage and the presentation command bridge.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `peerlink_core`, but MUST NOT be imported by the `application` layer.

pub mod network;
pub mod storage;
pub mod ui_bridge;
