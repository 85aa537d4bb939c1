//! The coordinator actor.
//!
//! One Tokio task owns the discovery manager, the pairing state machine, the
//! transfer sessions and the pending notification.  Everything that changes
//! that state reaches the task through a channel:
//!
//! - commands from [`CoordinatorHandle`]s (each with a oneshot reply),
//! - transport events from the [`EventSubscription`],
//! - timer events from the discovery window and the pairing countdown.
//!
//! After each handled input the task publishes a fresh [`CoordinatorView`] on
//! a `watch` channel, so any number of readers can observe state without
//! taking part in it.
//!
//! The task tears down (timers cancelled, discovery stopped, subscription
//! released) on [`CoordinatorHandle::shutdown`] or when the last handle is
//! dropped.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use peerlink_core::{FileInfo, Message, PairStatus, PeerId, SelectedFile, TransportEvent};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use super::discovery::{DiscoveryError, DiscoveryManager, DiscoverySettings, DiscoveryView};
use super::notification::Notification;
use super::pairing::{PairUpdateEffect, PairingError, PairingMachine, PairingView};
use super::session::{SessionError, SessionRegistry, SessionView};
use super::timers::TimerEvent;
use super::transport::{EventSubscription, Transport, TransportError};

const COMMAND_CHANNEL_CAPACITY: usize = 32;
const TIMER_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum CoordinatorError {
    /// The coordinator task is no longer running.
    #[error("coordinator has stopped")]
    Stopped,
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
    #[error(transparent)]
    Pairing(#[from] PairingError),
    #[error(transparent)]
    Session(#[from] SessionError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorSettings {
    pub discovery: DiscoverySettings,
    pub pairing_timeout: Duration,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            discovery: DiscoverySettings::default(),
            pairing_timeout: Duration::from_secs(30),
        }
    }
}

/// Everything a presentation layer needs to render the node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoordinatorView {
    pub discovery: DiscoveryView,
    pub pairing: PairingView,
    pub sessions: Vec<SessionView>,
    pub notification: Option<Notification>,
}

type Reply<T> = oneshot::Sender<Result<T, CoordinatorError>>;

enum Command {
    StartDiscovery(Reply<()>),
    ResetDiscovery(Reply<()>),
    SendPairRequest {
        peer_id: PeerId,
        reply: Reply<()>,
    },
    RespondPairRequest {
        peer_id: PeerId,
        accepted: bool,
        reply: Reply<()>,
    },
    UpdateDraft {
        peer_id: PeerId,
        text: String,
        reply: Reply<()>,
    },
    AddFiles {
        peer_id: PeerId,
        files: Vec<SelectedFile>,
        reply: Reply<Vec<FileInfo>>,
    },
    RemoveFile {
        peer_id: PeerId,
        file_id: String,
        reply: Reply<bool>,
    },
    SendMessage {
        peer_id: PeerId,
        reply: Reply<Option<Message>>,
    },
    DismissNotification(Reply<()>),
    Shutdown(oneshot::Sender<()>),
}

/// Cloneable front door to the coordinator task.
#[derive(Debug, Clone)]
pub struct CoordinatorHandle {
    commands: mpsc::Sender<Command>,
    view: watch::Receiver<CoordinatorView>,
}

impl CoordinatorHandle {
    /// Starts the first discovery window.
    pub async fn start_discovery(&self) -> Result<(), CoordinatorError> {
        self.request(Command::StartDiscovery).await
    }

    /// Clears the peer list and restarts the discovery window.
    pub async fn reset_discovery(&self) -> Result<(), CoordinatorError> {
        self.request(Command::ResetDiscovery).await
    }

    pub async fn send_pair_request(&self, peer_id: impl Into<PeerId>) -> Result<(), CoordinatorError> {
        let peer_id = peer_id.into();
        self.request(|reply| Command::SendPairRequest { peer_id, reply })
            .await
    }

    pub async fn respond_pair_request(
        &self,
        peer_id: impl Into<PeerId>,
        accepted: bool,
    ) -> Result<(), CoordinatorError> {
        let peer_id = peer_id.into();
        self.request(|reply| Command::RespondPairRequest {
            peer_id,
            accepted,
            reply,
        })
        .await
    }

    pub async fn update_draft(
        &self,
        peer_id: impl Into<PeerId>,
        text: impl Into<String>,
    ) -> Result<(), CoordinatorError> {
        let (peer_id, text) = (peer_id.into(), text.into());
        self.request(|reply| Command::UpdateDraft {
            peer_id,
            text,
            reply,
        })
        .await
    }

    /// Stages files for the next message and returns the staged entries.
    pub async fn add_files(
        &self,
        peer_id: impl Into<PeerId>,
        files: Vec<SelectedFile>,
    ) -> Result<Vec<FileInfo>, CoordinatorError> {
        let peer_id = peer_id.into();
        self.request(|reply| Command::AddFiles {
            peer_id,
            files,
            reply,
        })
        .await
    }

    pub async fn remove_file(
        &self,
        peer_id: impl Into<PeerId>,
        file_id: impl Into<String>,
    ) -> Result<bool, CoordinatorError> {
        let (peer_id, file_id) = (peer_id.into(), file_id.into());
        self.request(|reply| Command::RemoveFile {
            peer_id,
            file_id,
            reply,
        })
        .await
    }

    /// Sends the session's draft and staged files.
    ///
    /// Returns the appended message, or `None` if there was nothing to send.
    pub async fn send_message(
        &self,
        peer_id: impl Into<PeerId>,
    ) -> Result<Option<Message>, CoordinatorError> {
        let peer_id = peer_id.into();
        self.request(|reply| Command::SendMessage { peer_id, reply })
            .await
    }

    pub async fn dismiss_notification(&self) -> Result<(), CoordinatorError> {
        self.request(Command::DismissNotification).await
    }

    /// The latest published view.
    pub fn view(&self) -> CoordinatorView {
        self.view.borrow().clone()
    }

    /// A receiver that is notified every time the view changes.
    pub fn watch(&self) -> watch::Receiver<CoordinatorView> {
        self.view.clone()
    }

    /// Stops the coordinator and waits until teardown has finished.
    pub async fn shutdown(&self) -> Result<(), CoordinatorError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::Shutdown(tx))
            .await
            .map_err(|_| CoordinatorError::Stopped)?;
        rx.await.map_err(|_| CoordinatorError::Stopped)
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(Reply<T>) -> Command,
    ) -> Result<T, CoordinatorError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(command(tx))
            .await
            .map_err(|_| CoordinatorError::Stopped)?;
        rx.await.map_err(|_| CoordinatorError::Stopped)?
    }
}

pub struct Coordinator {
    transport: Arc<dyn Transport>,
    events: EventSubscription,
    events_open: bool,
    timer_tx: mpsc::Sender<TimerEvent>,
    timer_rx: mpsc::Receiver<TimerEvent>,
    discovery: DiscoveryManager,
    pairing: PairingMachine,
    sessions: SessionRegistry,
    notification: Option<Notification>,
    view_tx: watch::Sender<CoordinatorView>,
}

impl Coordinator {
    /// Subscribes to `transport` and spawns the coordinator task.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::Transport`] if the event subscription
    /// cannot be opened.
    pub fn spawn(
        transport: Arc<dyn Transport>,
        settings: CoordinatorSettings,
    ) -> Result<CoordinatorHandle, CoordinatorError> {
        let events = transport.subscribe()?;
        let (timer_tx, timer_rx) = mpsc::channel(TIMER_CHANNEL_CAPACITY);
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);

        let discovery = DiscoveryManager::new(settings.discovery);
        let pairing = PairingMachine::new(settings.pairing_timeout);
        let sessions = SessionRegistry::new();
        let (view_tx, view_rx) = watch::channel(CoordinatorView {
            discovery: discovery.view(),
            pairing: pairing.view(),
            sessions: sessions.views(),
            notification: None,
        });

        let coordinator = Self {
            transport,
            events,
            events_open: true,
            timer_tx,
            timer_rx,
            discovery,
            pairing,
            sessions,
            notification: None,
            view_tx,
        };
        tokio::spawn(coordinator.run(command_rx));
        info!(
            pairing_timeout_secs = settings.pairing_timeout.as_secs(),
            "coordinator started"
        );

        Ok(CoordinatorHandle {
            commands: command_tx,
            view: view_rx,
        })
    }

    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        loop {
            tokio::select! {
                biased;
                command = commands.recv() => match command {
                    Some(command) => {
                        if self.handle_command(command).await.is_break() {
                            return;
                        }
                    }
                    None => {
                        debug!("all coordinator handles dropped");
                        self.teardown().await;
                        return;
                    }
                },
                event = self.events.recv(), if self.events_open => match event {
                    Some(event) => self.handle_event(event).await,
                    None => {
                        warn!("transport event stream closed");
                        self.events_open = false;
                    }
                },
                Some(timer) = self.timer_rx.recv() => self.handle_timer(timer).await,
            }
            self.publish();
        }
    }

    async fn handle_command(&mut self, command: Command) -> ControlFlow<()> {
        match command {
            Command::StartDiscovery(reply) => {
                let result = self
                    .discovery
                    .start(self.transport.as_ref(), &self.timer_tx)
                    .await
                    .map_err(CoordinatorError::from);
                self.reply(reply, result);
            }
            Command::ResetDiscovery(reply) => {
                let result = self
                    .discovery
                    .reset(self.transport.as_ref(), &self.timer_tx)
                    .await
                    .map_err(CoordinatorError::from);
                self.reply(reply, result);
            }
            Command::SendPairRequest { peer_id, reply } => {
                let result = self
                    .pairing
                    .send_pair_request(self.transport.as_ref(), &peer_id)
                    .await;
                let result = self.surface_failure(&peer_id, result);
                self.reply(reply, result);
            }
            Command::RespondPairRequest {
                peer_id,
                accepted,
                reply,
            } => {
                let result = self
                    .pairing
                    .respond(self.transport.as_ref(), &peer_id, accepted)
                    .await;
                let result = self.surface_failure(&peer_id, result);
                self.reply(reply, result);
            }
            Command::UpdateDraft {
                peer_id,
                text,
                reply,
            } => {
                let result = self
                    .sessions
                    .get_mut(&peer_id)
                    .map(|session| session.update_draft(text))
                    .map_err(CoordinatorError::from);
                self.reply(reply, result);
            }
            Command::AddFiles {
                peer_id,
                files,
                reply,
            } => {
                let result = self
                    .sessions
                    .get_mut(&peer_id)
                    .map(|session| session.add_files(files))
                    .map_err(CoordinatorError::from);
                self.reply(reply, result);
            }
            Command::RemoveFile {
                peer_id,
                file_id,
                reply,
            } => {
                let result = self
                    .sessions
                    .get_mut(&peer_id)
                    .map(|session| session.remove_file(&file_id))
                    .map_err(CoordinatorError::from);
                self.reply(reply, result);
            }
            Command::SendMessage { peer_id, reply } => {
                let result = self.send_message(&peer_id).await;
                self.reply(reply, result);
            }
            Command::DismissNotification(reply) => {
                self.notification = None;
                self.pairing.acknowledge();
                self.reply(reply, Ok(()));
            }
            Command::Shutdown(done) => {
                self.teardown().await;
                let _ = done.send(());
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    async fn handle_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::PairUpdate { peer_id, status } => {
                let effect = self
                    .pairing
                    .on_pair_update(self.transport.as_ref(), &self.timer_tx, &peer_id, status)
                    .await;
                if let PairUpdateEffect::Concluded {
                    status,
                    notification,
                } = effect
                {
                    if status == PairStatus::Paired {
                        self.sessions.open(&peer_id);
                    }
                    if notification.is_some() {
                        self.notification = notification;
                    }
                }
            }
            TransportEvent::TransferUpdate(update) => match self.sessions.get_mut(&update.peer_id) {
                Ok(session) => {
                    session.ingest(&update);
                }
                Err(e) => warn!(task = %update.id, "dropping transfer update: {e}"),
            },
        }
    }

    async fn handle_timer(&mut self, timer: TimerEvent) {
        let transport = self.transport.as_ref();
        match timer {
            TimerEvent::PollTick { epoch } => self.discovery.on_poll_tick(transport, epoch).await,
            TimerEvent::WindowExpired { epoch } => {
                self.discovery.on_window_expired(transport, epoch).await
            }
            TimerEvent::CountdownTick { epoch } => {
                if let Some(notification) = self.pairing.on_countdown_tick(transport, epoch).await {
                    self.notification = Some(notification);
                }
            }
        }
    }

    async fn send_message(&mut self, peer_id: &str) -> Result<Option<Message>, CoordinatorError> {
        let Some(message) = self.sessions.get_mut(peer_id)?.prepare_outbound() else {
            return Ok(None);
        };

        if let Some(text) = message.text.as_deref() {
            match self.transport.send_text(peer_id, text).await {
                Ok(ack) => debug!(peer_id, ack = %ack, "text delivered to transport"),
                Err(e) => {
                    warn!(peer_id, sequence_id = message.sequence_id, "text delivery failed: {e}");
                    self.notification = Some(Notification::error(
                        Some(peer_id),
                        format!("message could not be delivered: {e}"),
                    ));
                }
            }
        }

        self.sessions
            .get_mut(peer_id)?
            .commit_outbound(message.clone());
        Ok(Some(message))
    }

    /// Turns a transport failure of a pairing command into an error
    /// notification.
    fn surface_failure(
        &mut self,
        peer_id: &str,
        result: Result<(), PairingError>,
    ) -> Result<(), CoordinatorError> {
        if let Err(PairingError::Transport(e)) = &result {
            self.notification = Some(Notification::error(Some(peer_id), e.to_string()));
        }
        result.map_err(CoordinatorError::from)
    }

    /// Publishes the view before replying, so a caller that awaited the
    /// reply already sees its effect.
    fn reply<T>(&self, reply: Reply<T>, result: Result<T, CoordinatorError>) {
        self.publish();
        let _ = reply.send(result);
    }

    fn publish(&self) {
        self.view_tx.send_replace(CoordinatorView {
            discovery: self.discovery.view(),
            pairing: self.pairing.view(),
            sessions: self.sessions.views(),
            notification: self.notification.clone(),
        });
    }

    async fn teardown(&mut self) {
        info!("coordinator shutting down");
        self.pairing.shutdown();
        self.discovery.shutdown(self.transport.as_ref()).await;
        self.publish();
    }
}
