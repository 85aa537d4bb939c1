//! Integration tests for the pairing handshake and message exchange.
//!
//! # Purpose
//!
//! Two (or three) coordinators share one loopback LAN, so every pairing
//! command on one node produces real `pair-update` events on the other.  The
//! tests verify:
//!
//! - Accept: A requests, B accepts, both end PAIRED with a transfer session.
//! - Timeout: nobody answers, the countdown rejects on the user's behalf and
//!   both sides end REJECTED.
//! - Rejection is released back to NONE once the notification is dismissed.
//! - A second request while a negotiation is open is answered with a
//!   rejection without disturbing the open one.
//! - Text and attachments flow through the paired session.
//!
//! ```text
//! A                                   B
//! ─                                   ─
//! send_pair_request(B)
//!   pair-update(B, REQUESTED)         pair-update(A, REQUEST_RECEIVED)
//!                                     respond_pair_request(A, true)
//!   pair-update(B, PAIRED)            pair-update(A, PAIRED)
//! ```

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

use peerlink_core::{Direction, MessageKind, PairStatus, PeerRecord, SelectedFile};
use peerlink_node::application::coordinator::{
    Coordinator, CoordinatorHandle, CoordinatorSettings, CoordinatorView,
};
use peerlink_node::application::discovery::DiscoverySettings;
use peerlink_node::application::transport::Transport;
use peerlink_node::infrastructure::network::{LoopbackNetwork, LoopbackTransport, Operation};
use tokio_test::assert_ok;

const TIMEOUT: Duration = Duration::from_secs(10);

struct Node {
    handle: CoordinatorHandle,
    probe: LoopbackTransport,
}

fn join(network: &LoopbackNetwork, id: &str) -> Node {
    join_with_timeout(network, id, TIMEOUT)
}

fn join_with_timeout(network: &LoopbackNetwork, id: &str, pairing_timeout: Duration) -> Node {
    let transport = network.join(PeerRecord::new(
        id,
        format!("{id}-host"),
        IpAddr::V4(Ipv4Addr::LOCALHOST),
        53317,
    ));
    let probe = transport.clone();
    let settings = CoordinatorSettings {
        discovery: DiscoverySettings::default(),
        pairing_timeout,
    };
    let handle = assert_ok!(Coordinator::spawn(Arc::new(transport), settings));
    Node { handle, probe }
}

async fn wait_for(node: &Node, done: impl FnMut(&CoordinatorView) -> bool) -> CoordinatorView {
    let mut view = node.handle.watch();
    let state = assert_ok!(view.wait_for(done).await).clone();
    state
}

fn status_of(view: &CoordinatorView, peer_id: &str) -> PairStatus {
    view.pairing
        .statuses
        .get(peer_id)
        .copied()
        .unwrap_or_default()
}

/// Runs the accept handshake between `a` and `b`.
async fn pair(a: &Node, b: &Node, a_id: &str, b_id: &str) {
    assert_ok!(a.handle.send_pair_request(b_id).await);
    wait_for(b, |v| v.pairing.dialog.is_some()).await;
    assert_ok!(b.handle.respond_pair_request(a_id, true).await);
    wait_for(a, |v| !v.sessions.is_empty()).await;
    wait_for(b, |v| !v.sessions.is_empty()).await;
}

#[tokio::test]
async fn test_accepted_request_pairs_both_sides() {
    // Arrange
    let network = LoopbackNetwork::new();
    let a = join(&network, "a");
    let b = join(&network, "b");

    // Act
    assert_ok!(a.handle.send_pair_request("b").await);
    let b_view = wait_for(&b, |v| v.pairing.dialog.is_some()).await;
    let a_view = wait_for(&a, |v| v.pairing.dialog.is_some()).await;

    // Assert – both sides negotiating
    assert_eq!(status_of(&a_view, "b"), PairStatus::Requested);
    assert_eq!(status_of(&b_view, "a"), PairStatus::RequestReceived);
    assert_eq!(b_view.pairing.dialog.as_ref().map(|d| d.remaining_secs), Some(10));

    // Act
    assert_ok!(b.handle.respond_pair_request("a", true).await);
    let a_view = wait_for(&a, |v| !v.sessions.is_empty()).await;
    let b_view = wait_for(&b, |v| !v.sessions.is_empty()).await;

    // Assert – both sides paired, dialogs closed
    assert_eq!(status_of(&a_view, "b"), PairStatus::Paired);
    assert_eq!(status_of(&b_view, "a"), PairStatus::Paired);
    assert!(a_view.pairing.dialog.is_none());
    assert!(b_view.pairing.dialog.is_none());
    assert_eq!(
        a_view.notification.map(|n| n.to_string()).as_deref(),
        Some("Peer accepted the pairing request, paired")
    );
    assert_eq!(
        b_view.notification.map(|n| n.to_string()).as_deref(),
        Some("You accepted the pairing request, paired")
    );
}

#[tokio::test(start_paused = true)]
async fn test_unanswered_request_times_out_on_both_sides() {
    // Arrange – B's deadline comes first, so B rejects on A's behalf
    let network = LoopbackNetwork::new();
    let a = join_with_timeout(&network, "a", TIMEOUT * 2);
    let b = join(&network, "b");

    // Act – nobody answers; the clock runs past the timeout
    assert_ok!(a.handle.send_pair_request("b").await);
    let a_view = wait_for(&a, |v| status_of(v, "b") == PairStatus::Rejected).await;
    let b_view = wait_for(&b, |v| status_of(v, "a") == PairStatus::Rejected).await;

    // Assert
    assert!(a_view.pairing.dialog.is_none());
    assert!(b_view.pairing.dialog.is_none());
    assert!(a_view.sessions.is_empty());
    assert!(b_view.sessions.is_empty());
    assert_eq!(b.probe.calls(Operation::RespondPairRequest), 1);
    assert_eq!(a.probe.calls(Operation::RespondPairRequest), 0);
    assert!(b_view.notification.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_countdown_rejects_once_and_never_goes_negative() {
    // Arrange – "a" is a bare transport, so only B runs a countdown
    let network = LoopbackNetwork::new();
    let a = network.join(PeerRecord::new(
        "a",
        "a-host",
        IpAddr::V4(Ipv4Addr::LOCALHOST),
        53317,
    ));
    let b = join(&network, "b");
    assert_ok!(a.send_pair_request("b").await);
    let mut view = b.handle.watch();
    assert_ok!(view.wait_for(|v| v.pairing.dialog.is_some()).await.map(|_| ()));

    // Act – record every published remaining time on B
    let mut remaining = Vec::new();
    loop {
        assert_ok!(view.changed().await);
        let current = view.borrow_and_update().clone();
        match current.pairing.dialog {
            Some(dialog) => remaining.push(dialog.remaining_secs),
            None => break,
        }
    }
    tokio::time::sleep(Duration::from_secs(30)).await;

    // Assert
    assert!(remaining.windows(2).all(|w| w[0] >= w[1]), "{remaining:?}");
    assert!(remaining.iter().all(|r| *r < 10));
    assert_eq!(status_of(&b.handle.view(), "a"), PairStatus::Rejected);
    assert_eq!(b.probe.calls(Operation::RespondPairRequest), 1);
}

#[tokio::test]
async fn test_rejection_returns_to_none_after_dismissal() {
    // Arrange
    let network = LoopbackNetwork::new();
    let a = join(&network, "a");
    let b = join(&network, "b");
    assert_ok!(a.handle.send_pair_request("b").await);
    wait_for(&b, |v| v.pairing.dialog.is_some()).await;

    // Act
    assert_ok!(b.handle.respond_pair_request("a", false).await);
    let a_view = wait_for(&a, |v| status_of(v, "b") == PairStatus::Rejected).await;
    assert_eq!(
        a_view.notification.map(|n| n.to_string()).as_deref(),
        Some("Peer rejected the pairing request")
    );
    assert_ok!(a.handle.dismiss_notification().await);

    // Assert – A may ask again
    assert_eq!(status_of(&a.handle.view(), "b"), PairStatus::None);
    assert_ok!(a.handle.send_pair_request("b").await);
}

#[tokio::test]
async fn test_second_request_during_negotiation_is_rejected() {
    // Arrange
    let network = LoopbackNetwork::new();
    let a = join(&network, "a");
    let b = join(&network, "b");
    let c = join(&network, "c");
    assert_ok!(a.handle.send_pair_request("c").await);
    wait_for(&c, |v| v.pairing.dialog.is_some()).await;

    // Act
    assert_ok!(b.handle.send_pair_request("c").await);
    let b_view = wait_for(&b, |v| status_of(v, "c") == PairStatus::Rejected).await;

    // Assert
    assert!(b_view.pairing.dialog.is_none());
    let c_view = c.handle.view();
    assert_eq!(c_view.pairing.dialog.map(|d| d.peer_id).as_deref(), Some("a"));

    // C still accepts A
    assert_ok!(c.handle.respond_pair_request("a", true).await);
    let a_view = wait_for(&a, |v| !v.sessions.is_empty()).await;
    assert_eq!(status_of(&a_view, "c"), PairStatus::Paired);
}

#[tokio::test]
async fn test_text_message_reaches_paired_peer() {
    // Arrange
    let network = LoopbackNetwork::new();
    let a = join(&network, "a");
    let b = join(&network, "b");
    pair(&a, &b, "a", "b").await;

    // Act
    assert_ok!(a.handle.update_draft("b", "  hi  ").await);
    let sent = assert_ok!(a.handle.send_message("b").await).expect("message sent");
    let b_view = wait_for(&b, |v| v.sessions[0].timeline.len() == 1).await;

    // Assert
    assert_eq!(sent.sequence_id, 1);
    assert_eq!(sent.text.as_deref(), Some("hi"));
    let received = &b_view.sessions[0].timeline[0];
    assert_eq!(received.direction, Direction::Inbound);
    assert_eq!(received.text.as_deref(), Some("hi"));
    assert_eq!(received.sequence_id, 1);
    assert!(a.handle.view().sessions[0].draft.is_empty());
}

#[tokio::test]
async fn test_text_with_attachments_is_sent_as_mixed_message() {
    // Arrange
    let network = LoopbackNetwork::new();
    let a = join(&network, "a");
    let b = join(&network, "b");
    pair(&a, &b, "a", "b").await;
    let files = vec![
        SelectedFile {
            name: "notes.txt".to_string(),
            size_bytes: 512,
            mime_type: "text/plain".to_string(),
        },
        SelectedFile {
            name: "photo.jpg".to_string(),
            size_bytes: 3 * 1024 * 1024,
            mime_type: "image/jpeg".to_string(),
        },
    ];

    // Act
    assert_ok!(a.handle.update_draft("b", "see attached").await);
    let staged = assert_ok!(a.handle.add_files("b", files).await);
    let sent = assert_ok!(a.handle.send_message("b").await).expect("message sent");

    // Assert
    assert_eq!(sent.kind, MessageKind::Mixed);
    assert_eq!(sent.attachments, staged);
    assert_eq!(sent.attachments[1].size_label, "3 MB");
    let session = &a.handle.view().sessions[0];
    assert!(session.draft.is_empty());
    assert!(session.staged.is_empty());
    assert_eq!(a.probe.calls(Operation::SendText), 1);
}

#[tokio::test]
async fn test_empty_draft_sends_nothing() {
    let network = LoopbackNetwork::new();
    let a = join(&network, "a");
    let b = join(&network, "b");
    pair(&a, &b, "a", "b").await;

    assert_ok!(a.handle.update_draft("b", "   ").await);
    let sent = assert_ok!(a.handle.send_message("b").await);

    assert!(sent.is_none());
    assert!(a.handle.view().sessions[0].timeline.is_empty());
    assert_eq!(a.probe.calls(Operation::SendText), 0);
}
