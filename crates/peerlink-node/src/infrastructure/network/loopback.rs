//! In-process LAN used by the demo binary and the integration tests.
//!
//! A [`LoopbackNetwork`] is a hub that any number of nodes join.  Each node
//! gets a [`LoopbackTransport`] implementing the transport port with the same
//! observable behaviour as the real LAN layer:
//!
//! - A node is visible to others while it broadcasts; a node only collects
//!   peers while it listens.  Collected peers stay cached until
//!   `clear_peers`, even after they stop broadcasting.
//! - `send_pair_request` emits `REQUESTED` to the sender and
//!   `REQUEST_RECEIVED` to the target.
//! - `respond_pair_request` emits the terminal status to both sides.
//! - `send_text` emits a text `transfer-update` to the target and returns the
//!   task id as acknowledgement.
//!
//! Events cross the hub in their wire form: each is encoded to its event name
//! and JSON payload and decoded again on delivery.
//!
//! Any operation can be made to fail once with
//! [`LoopbackTransport::fail_next`], and calls are counted per operation.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use peerlink_core::{
    decode_event, encode_event, PairStatus, PeerId, PeerRecord, TransferKind, TransferUpdate,
    TransportEvent,
};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::application::transport::{EventSubscription, Transport, TransportError};

/// Buffered events per subscriber before new ones are dropped.
const SUBSCRIBER_CAPACITY: usize = 256;

/// A transport operation, for failure injection and call counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    StartBroadcasting,
    StopBroadcasting,
    StartListening,
    StopListening,
    GetPeers,
    ClearPeers,
    SendPairRequest,
    RespondPairRequest,
    SendText,
}

impl Operation {
    fn name(self) -> &'static str {
        match self {
            Self::StartBroadcasting => "start_broadcasting",
            Self::StopBroadcasting => "stop_broadcasting",
            Self::StartListening => "start_listening",
            Self::StopListening => "stop_listening",
            Self::GetPeers => "get_peers",
            Self::ClearPeers => "clear_peers",
            Self::SendPairRequest => "send_pair_request",
            Self::RespondPairRequest => "respond_pair_request",
            Self::SendText => "send_text",
        }
    }
}

struct Node {
    record: PeerRecord,
    broadcasting: bool,
    listening: bool,
    seen: HashMap<PeerId, PeerRecord>,
    subscribers: Vec<(u64, mpsc::Sender<TransportEvent>)>,
    fail_next: HashSet<Operation>,
    calls: HashMap<Operation, usize>,
}

impl Node {
    fn new(record: PeerRecord) -> Self {
        Self {
            record,
            broadcasting: false,
            listening: false,
            seen: HashMap::new(),
            subscribers: Vec::new(),
            fail_next: HashSet::new(),
            calls: HashMap::new(),
        }
    }

    fn deliver(&mut self, event: TransportEvent) {
        let node_id = &self.record.id;
        self.subscribers.retain(|(_, tx)| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(node = %node_id, event = event.name(), "subscriber backlog full, dropping event");
                true
            }
            Err(TrySendError::Closed(_)) => false,
        });
    }
}

#[derive(Default)]
struct Hub {
    nodes: HashMap<PeerId, Node>,
    next_subscriber: u64,
}

impl Hub {
    fn node_mut(&mut self, id: &str) -> Result<&mut Node, TransportError> {
        self.nodes
            .get_mut(id)
            .ok_or_else(|| TransportError::PeerNotFound(id.to_string()))
    }

    /// Counts the call and consumes an injected failure, if any.
    fn enter(&mut self, id: &str, op: Operation) -> Result<&mut Node, TransportError> {
        let node = self.node_mut(id)?;
        *node.calls.entry(op).or_default() += 1;
        if node.fail_next.remove(&op) {
            return Err(TransportError::Failed {
                operation: op.name(),
                reason: "injected failure".to_string(),
            });
        }
        Ok(node)
    }

    fn deliver(&mut self, to: &str, event: TransportEvent) {
        let Some(node) = self.nodes.get_mut(to) else {
            return;
        };
        let (name, payload) = match encode_event(&event) {
            Ok(wire) => wire,
            Err(e) => {
                error!(to, event = event.name(), "failed to encode event: {e}");
                return;
            }
        };
        match decode_event(name, &payload) {
            Ok(event) => {
                debug!(to, event = name, %payload, "loopback event");
                node.deliver(event);
            }
            Err(e) => warn!(to, event = name, "dropping undecodable event: {e}"),
        }
    }
}

/// The shared hub every [`LoopbackTransport`] talks through.
#[derive(Clone, Default)]
pub struct LoopbackNetwork {
    hub: Arc<Mutex<Hub>>,
}

impl LoopbackNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node described by `record` and returns its transport.
    ///
    /// Joining again with the same id replaces the earlier node.
    pub fn join(&self, record: PeerRecord) -> LoopbackTransport {
        let id = record.id.clone();
        lock(&self.hub).nodes.insert(id.clone(), Node::new(record));
        LoopbackTransport {
            id,
            hub: Arc::clone(&self.hub),
        }
    }

    /// Number of nodes on the network.
    pub fn len(&self) -> usize {
        lock(&self.hub).nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One node's view of a [`LoopbackNetwork`].
#[derive(Clone)]
pub struct LoopbackTransport {
    id: PeerId,
    hub: Arc<Mutex<Hub>>,
}

impl LoopbackTransport {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Makes the next call of `op` on this node fail.
    pub fn fail_next(&self, op: Operation) {
        if let Some(node) = lock(&self.hub).nodes.get_mut(&self.id) {
            node.fail_next.insert(op);
        }
    }

    /// How often `op` was called on this node.
    pub fn calls(&self, op: Operation) -> usize {
        lock(&self.hub)
            .nodes
            .get(&self.id)
            .and_then(|node| node.calls.get(&op).copied())
            .unwrap_or(0)
    }

    /// Number of live event subscriptions on this node.
    pub fn subscriber_count(&self) -> usize {
        lock(&self.hub)
            .nodes
            .get(&self.id)
            .map_or(0, |node| node.subscribers.len())
    }

    fn set_flags(&self, op: Operation, apply: impl FnOnce(&mut Node)) -> Result<(), TransportError> {
        let mut hub = lock(&self.hub);
        let node = hub.enter(&self.id, op)?;
        apply(node);
        debug!(node = %self.id, operation = op.name(), "loopback flag change");
        Ok(())
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    fn subscribe(&self) -> Result<EventSubscription, TransportError> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_CAPACITY);
        let subscriber = {
            let mut hub = lock(&self.hub);
            let subscriber = hub.next_subscriber;
            hub.next_subscriber += 1;
            hub.node_mut(&self.id)?.subscribers.push((subscriber, tx));
            subscriber
        };

        let hub = Arc::clone(&self.hub);
        let id = self.id.clone();
        Ok(EventSubscription::new(rx, move || {
            if let Some(node) = lock(&hub).nodes.get_mut(&id) {
                node.subscribers.retain(|(s, _)| *s != subscriber);
            }
            debug!(node = %id, subscriber, "loopback subscription released");
        }))
    }

    async fn start_broadcasting(&self) -> Result<(), TransportError> {
        self.set_flags(Operation::StartBroadcasting, |node| node.broadcasting = true)
    }

    async fn stop_broadcasting(&self) -> Result<(), TransportError> {
        self.set_flags(Operation::StopBroadcasting, |node| node.broadcasting = false)
    }

    async fn start_listening(&self) -> Result<(), TransportError> {
        self.set_flags(Operation::StartListening, |node| node.listening = true)
    }

    async fn stop_listening(&self) -> Result<(), TransportError> {
        self.set_flags(Operation::StopListening, |node| node.listening = false)
    }

    async fn get_peers(&self) -> Result<Vec<PeerRecord>, TransportError> {
        let mut hub = lock(&self.hub);
        let listening = hub.enter(&self.id, Operation::GetPeers)?.listening;

        if listening {
            let now = unix_secs();
            let visible: Vec<PeerRecord> = hub
                .nodes
                .values()
                .filter(|node| node.broadcasting && node.record.id != self.id)
                .map(|node| PeerRecord {
                    last_seen: now,
                    ..node.record.clone()
                })
                .collect();
            let me = hub.node_mut(&self.id)?;
            for record in visible {
                me.seen.insert(record.id.clone(), record);
            }
        }

        Ok(hub.node_mut(&self.id)?.seen.values().cloned().collect())
    }

    async fn clear_peers(&self) -> Result<(), TransportError> {
        let mut hub = lock(&self.hub);
        hub.enter(&self.id, Operation::ClearPeers)?.seen.clear();
        Ok(())
    }

    async fn send_pair_request(&self, target: &str) -> Result<(), TransportError> {
        let mut hub = lock(&self.hub);
        hub.enter(&self.id, Operation::SendPairRequest)?;
        hub.node_mut(target)?;

        hub.deliver(
            &self.id,
            TransportEvent::PairUpdate {
                peer_id: target.to_string(),
                status: PairStatus::Requested,
            },
        );
        hub.deliver(
            target,
            TransportEvent::PairUpdate {
                peer_id: self.id.clone(),
                status: PairStatus::RequestReceived,
            },
        );
        Ok(())
    }

    async fn respond_pair_request(&self, target: &str, accepted: bool) -> Result<(), TransportError> {
        let mut hub = lock(&self.hub);
        hub.enter(&self.id, Operation::RespondPairRequest)?;
        hub.node_mut(target)?;

        let status = if accepted {
            PairStatus::Paired
        } else {
            PairStatus::Rejected
        };
        hub.deliver(
            &self.id,
            TransportEvent::PairUpdate {
                peer_id: target.to_string(),
                status,
            },
        );
        hub.deliver(
            target,
            TransportEvent::PairUpdate {
                peer_id: self.id.clone(),
                status,
            },
        );
        Ok(())
    }

    async fn send_text(&self, target: &str, content: &str) -> Result<String, TransportError> {
        let mut hub = lock(&self.hub);
        hub.enter(&self.id, Operation::SendText)?;
        hub.node_mut(target)?;

        let task_id = Uuid::new_v4().to_string();
        hub.deliver(
            target,
            TransportEvent::TransferUpdate(TransferUpdate {
                id: task_id.clone(),
                peer_id: self.id.clone(),
                transfer_type: TransferKind::Text {
                    content: content.to_string(),
                },
            }),
        );
        Ok(task_id)
    }
}

/// Locks the hub, recovering from a poisoned lock.
///
/// Every mutation leaves the hub consistent, so a panic elsewhere while
/// holding the lock does not invalidate it.
fn lock(hub: &Mutex<Hub>) -> MutexGuard<'_, Hub> {
    hub.lock().unwrap_or_else(PoisonError::into_inner)
}

fn unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
