//! Application layer use cases for a PeerLink node.
//!
//! # What is the "application" layer?
//!
//! In Clean Architecture the *application* layer sits between the domain
//! (pure types in `peerlink_core`) and the infrastructure (sockets, files,
//! the presentation bridge).
//!
//! Use cases in this layer:
//!
//! - **Orchestrate** domain objects to fulfil a user goal (e.g., "find peers
//!   on the LAN for ten seconds, then stop advertising").
//! - **Depend on abstractions** (the [`transport::Transport`] trait) rather
//!   than concrete implementations, so the LAN layer can be swapped without
//!   changing this code.
//! - **Contain no socket or file system access**.
//!
//! # Sub-modules
//!
//! - **`coordinator`**  – The actor task that owns all node state and
//!   serialises commands, transport events and timer firings.
//! - **`discovery`**    – The bounded discovery window and the peer set.
//! - **`pairing`**      – The pairing handshake state machine and its
//!   countdown.
//! - **`session`**      – Per-peer message timelines, drafts and staged files.
//! - **`notification`** – Transient outcome / error notifications.
//! - **`timers`**       – Cancellable timer tasks feeding the coordinator.
//! - **`transport`**    – The transport port and its event subscription.

pub mod coordinator;
pub mod discovery;
pub mod notification;
pub mod pairing;
pub mod session;
pub mod timers;
pub mod transport;
