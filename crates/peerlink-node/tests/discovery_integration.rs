//! Integration tests for the discovery window.
//!
//! # Purpose
//!
//! These tests drive a coordinator over the loopback LAN with a paused Tokio
//! clock and verify:
//!
//! - A 10 s window polling every second issues exactly 10 peer polls, then
//!   stops broadcasting and listening.
//! - The peer set equals the latest snapshot the transport returned.
//! - A reset cancels the running window: no tick of the old window fires
//!   afterwards, and the new window polls 10 times on its own.
//! - A failed poll only skips that tick.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

use peerlink_core::PeerRecord;
use peerlink_node::application::coordinator::{Coordinator, CoordinatorHandle, CoordinatorSettings};
use peerlink_node::application::discovery::WindowState;
use peerlink_node::application::transport::Transport;
use peerlink_node::infrastructure::network::{LoopbackNetwork, LoopbackTransport, Operation};
use tokio_test::assert_ok;

fn record(id: &str, hostname: &str) -> PeerRecord {
    PeerRecord::new(id, hostname, IpAddr::V4(Ipv4Addr::LOCALHOST), 53317)
}

/// Local node "me" plus a broadcasting peer "b".  Returns the coordinator,
/// a probe on the local transport and the peer's transport.
async fn setup(network: &LoopbackNetwork) -> (CoordinatorHandle, LoopbackTransport, LoopbackTransport) {
    let me = network.join(record("me", "alpha"));
    let probe = me.clone();
    let b = network.join(record("b", "bravo"));
    assert_ok!(b.start_broadcasting().await);

    let handle = assert_ok!(Coordinator::spawn(Arc::new(me), CoordinatorSettings::default()));
    (handle, probe, b)
}

async fn wait_until_ended(handle: &CoordinatorHandle) {
    let mut view = handle.watch();
    assert_ok!(
        view.wait_for(|v| v.discovery.window == WindowState::Ended)
            .await
            .map(|_| ())
    );
}

#[tokio::test(start_paused = true)]
async fn test_window_polls_ten_times_then_stops_advertising() {
    // Arrange
    let network = LoopbackNetwork::new();
    let (handle, probe, _b) = setup(&network).await;

    // Act
    assert_ok!(handle.start_discovery().await);
    wait_until_ended(&handle).await;

    // Assert
    let view = handle.view();
    assert_eq!(view.discovery.polls, 10);
    assert_eq!(probe.calls(Operation::GetPeers), 10);
    assert_eq!(probe.calls(Operation::StopBroadcasting), 1);
    assert_eq!(probe.calls(Operation::StopListening), 1);
    let ids: Vec<&str> = view.discovery.peers.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, vec!["b"]);

    // No stray tick after the window ended.
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(probe.calls(Operation::GetPeers), 10);
}

#[tokio::test(start_paused = true)]
async fn test_reset_cancels_running_window_and_starts_a_fresh_one() {
    // Arrange
    let network = LoopbackNetwork::new();
    let (handle, probe, _b) = setup(&network).await;
    assert_ok!(handle.start_discovery().await);
    tokio::time::sleep(Duration::from_millis(3500)).await;
    assert_eq!(probe.calls(Operation::GetPeers), 3);

    // Act
    assert_ok!(handle.reset_discovery().await);

    // Assert – cleared immediately, then exactly ten more polls
    assert!(handle.view().discovery.peers.is_empty());
    assert_eq!(handle.view().discovery.polls, 0);
    assert_eq!(probe.calls(Operation::ClearPeers), 1);
    wait_until_ended(&handle).await;
    assert_eq!(probe.calls(Operation::GetPeers), 13);
    assert_eq!(handle.view().discovery.polls, 10);
    assert_eq!(probe.calls(Operation::StartBroadcasting), 2);
}

#[tokio::test(start_paused = true)]
async fn test_peer_set_follows_latest_snapshot() {
    // Arrange
    let network = LoopbackNetwork::new();
    let (handle, _probe, _b) = setup(&network).await;
    let c = network.join(record("c", "charlie"));
    assert_ok!(handle.start_discovery().await);
    let mut view = handle.watch();
    assert_ok!(view.wait_for(|v| v.discovery.peers.len() == 1).await.map(|_| ()));

    // Act
    assert_ok!(c.start_broadcasting().await);
    assert_ok!(
        view.wait_for(|v| v.discovery.peers.len() == 2)
            .await
            .map(|_| ())
    );

    // Assert – listed by hostname
    let hostnames: Vec<String> = handle
        .view()
        .discovery
        .peers
        .iter()
        .map(|p| p.hostname.clone())
        .collect();
    assert_eq!(hostnames, vec!["bravo", "charlie"]);
}

#[tokio::test(start_paused = true)]
async fn test_failed_poll_skips_only_that_tick() {
    // Arrange
    let network = LoopbackNetwork::new();
    let (handle, probe, _b) = setup(&network).await;
    probe.fail_next(Operation::GetPeers);

    // Act
    assert_ok!(handle.start_discovery().await);
    tokio::time::sleep(Duration::from_millis(1500)).await;
    let after_failure = handle.view();
    wait_until_ended(&handle).await;

    // Assert
    assert_eq!(after_failure.discovery.polls, 1);
    assert!(after_failure.discovery.peers.is_empty());
    assert_eq!(handle.view().discovery.polls, 10);
    assert_eq!(handle.view().discovery.peers.len(), 1);
}

#[tokio::test]
async fn test_start_failure_is_reported_and_window_does_not_run() {
    let network = LoopbackNetwork::new();
    let (handle, probe, _b) = setup(&network).await;
    probe.fail_next(Operation::StartListening);

    let result = handle.start_discovery().await;

    assert!(result.is_err());
    assert_eq!(handle.view().discovery.window, WindowState::NotStarted);
    assert_eq!(probe.calls(Operation::StopBroadcasting), 1);
}
