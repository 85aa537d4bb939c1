//! Presentation bridge: exposes coordinator operations to a UI front-end.
//!
//! Every command function here takes the shared [`AppState`] and returns a
//! [`CommandResult`].  A desktop shell or any other presentation layer wires
//! these functions to its own command mechanism; nothing in `application`
//! imports this module.
//!
//! # Data Transfer Objects (DTOs)
//!
//! The application layer publishes a [`CoordinatorView`] with internal types.
//! DTOs flatten it into plain JSON-friendly structs (strings, numbers, lists)
//! so the front-end does not need to know about enums such as `PairStatus` or
//! `WindowState`.
//!
//! # `CommandResult<T>` wrapper
//!
//! All commands return `CommandResult<T>` rather than `Result<T, E>`.  Every
//! response therefore has the same shape:
//! `{ success: bool, data: T | null, error: string | null }`.

use std::fmt::Display;
use std::sync::Arc;

use peerlink_core::{
    Direction, FileInfo, Message, MessageKind, PairStatus, PeerRecord, SelectedFile,
};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::application::coordinator::{CoordinatorHandle, CoordinatorView};
use crate::application::discovery::WindowState;
use crate::application::session::SessionView;
use crate::infrastructure::storage::config::{AppConfig, Mode};

// ── Shared application state ──────────────────────────────────────────────────

/// State shared between command invocations.
pub struct AppState {
    /// Front door to the coordinator task.
    pub coordinator: CoordinatorHandle,
    /// The configuration the node was started with.
    pub config: Mutex<AppConfig>,
}

impl AppState {
    pub fn new(coordinator: CoordinatorHandle, config: AppConfig) -> Arc<Self> {
        Arc::new(Self {
            coordinator,
            config: Mutex::new(config),
        })
    }
}

// ── Data Transfer Objects ─────────────────────────────────────────────────────

/// One discovered peer, with its pairing status.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PeerDto {
    pub id: String,
    pub hostname: String,
    pub address: String,
    pub port: u16,
    pub os: String,
    pub version: String,
    pub pair_status: String,
}

impl PeerDto {
    fn new(record: &PeerRecord, pair_status: PairStatus) -> Self {
        Self {
            id: record.id.clone(),
            hostname: record.hostname.clone(),
            address: record.address.to_string(),
            port: record.port,
            os: record.os_info.os_type.to_string(),
            version: record.version.clone(),
            pair_status: pair_status.to_string(),
        }
    }
}

/// The open negotiation dialog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DialogDto {
    pub peer_id: String,
    pub status: String,
    /// What the dialog should say, e.g. "received a pairing request".
    pub tip: String,
    /// `"You"` or `"Peer"`.
    pub subject: String,
    pub remaining_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotificationDto {
    pub peer_id: Option<String>,
    pub message: String,
    pub is_error: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileDto {
    pub id: String,
    pub name: String,
    pub size_label: String,
    pub mime_type: String,
}

impl From<&FileInfo> for FileDto {
    fn from(f: &FileInfo) -> Self {
        Self {
            id: f.id.clone(),
            name: f.name.clone(),
            size_label: f.size_label.clone(),
            mime_type: f.mime_type.clone(),
        }
    }
}

/// A file picked in the front-end, before staging.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SelectedFileDto {
    pub name: String,
    pub size_bytes: u64,
    pub mime_type: String,
}

impl From<SelectedFileDto> for SelectedFile {
    fn from(dto: SelectedFileDto) -> Self {
        Self {
            name: dto.name,
            size_bytes: dto.size_bytes,
            mime_type: dto.mime_type,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageDto {
    pub sequence_id: u64,
    pub outbound: bool,
    pub kind: String,
    pub text: Option<String>,
    pub attachments: Vec<FileDto>,
    pub timestamp_ms: u64,
}

impl From<&Message> for MessageDto {
    fn from(m: &Message) -> Self {
        Self {
            sequence_id: m.sequence_id,
            outbound: m.direction == Direction::Outbound,
            kind: match m.kind {
                MessageKind::Text => "text",
                MessageKind::Mixed => "mixed",
            }
            .to_string(),
            text: m.text.clone(),
            attachments: m.attachments.iter().map(FileDto::from).collect(),
            timestamp_ms: m.timestamp_ms,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionDto {
    pub peer_id: String,
    pub messages: Vec<MessageDto>,
    pub draft: String,
    pub staged: Vec<FileDto>,
}

impl From<&SessionView> for SessionDto {
    fn from(s: &SessionView) -> Self {
        Self {
            peer_id: s.peer_id.clone(),
            messages: s.timeline.iter().map(MessageDto::from).collect(),
            draft: s.draft.clone(),
            staged: s.staged.iter().map(FileDto::from).collect(),
        }
    }
}

/// Everything the front-end renders.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ViewDto {
    /// `"not_started"`, `"running"` or `"ended"`.
    pub discovery: String,
    pub peers: Vec<PeerDto>,
    pub dialog: Option<DialogDto>,
    pub sessions: Vec<SessionDto>,
    pub notification: Option<NotificationDto>,
}

impl From<&CoordinatorView> for ViewDto {
    fn from(view: &CoordinatorView) -> Self {
        let discovery = match view.discovery.window {
            WindowState::NotStarted => "not_started",
            WindowState::Running => "running",
            WindowState::Ended => "ended",
        };
        let dialog = view.pairing.dialog.as_ref().map(|d| DialogDto {
            peer_id: d.peer_id.clone(),
            status: d.status.to_string(),
            tip: d.status.tip().to_string(),
            subject: d.role.map_or("Peer", |r| r.subject()).to_string(),
            remaining_secs: d.remaining_secs,
        });
        let notification = view.notification.as_ref().map(|n| NotificationDto {
            peer_id: n.peer_id.clone(),
            message: n.to_string(),
            is_error: n.is_error(),
        });

        Self {
            discovery: discovery.to_string(),
            peers: peer_dtos(view),
            dialog,
            sessions: view.sessions.iter().map(SessionDto::from).collect(),
            notification,
        }
    }
}

/// The running configuration, as shown in a settings panel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SettingsDto {
    pub device_name: String,
    pub development_mode: bool,
    pub pairing_timeout_secs: u64,
    pub discovery_window_secs: u64,
}

/// Unified response wrapper used by bridge commands.
#[derive(Debug, Serialize, Deserialize)]
pub struct CommandResult<T: Serialize> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize> CommandResult<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

impl<T: Serialize, E: Display> From<Result<T, E>> for CommandResult<T> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(e) => Self::err(e.to_string()),
        }
    }
}

fn peer_dtos(view: &CoordinatorView) -> Vec<PeerDto> {
    view.discovery
        .peers
        .iter()
        .map(|record| {
            let status = view
                .pairing
                .statuses
                .get(&record.id)
                .copied()
                .unwrap_or_default();
            PeerDto::new(record, status)
        })
        .collect()
}

// ── Commands ──────────────────────────────────────────────────────────────────

/// Returns discovered peers sorted by hostname.
///
/// # Example (frontend)
/// ```ts
/// const peers = await invoke<CommandResult<PeerDto[]>>('get_peers');
/// ```
pub async fn get_peers(state: Arc<AppState>) -> CommandResult<Vec<PeerDto>> {
    CommandResult::ok(peer_dtos(&state.coordinator.view()))
}

/// Returns the full view.
pub async fn get_view(state: Arc<AppState>) -> CommandResult<ViewDto> {
    CommandResult::ok(ViewDto::from(&state.coordinator.view()))
}

/// Clears the peer list and starts a new discovery window.
pub async fn reset_discovery(state: Arc<AppState>) -> CommandResult<()> {
    state.coordinator.reset_discovery().await.into()
}

pub async fn send_pair_request(state: Arc<AppState>, peer_id: String) -> CommandResult<()> {
    state.coordinator.send_pair_request(peer_id).await.into()
}

pub async fn respond_pair_request(
    state: Arc<AppState>,
    peer_id: String,
    accepted: bool,
) -> CommandResult<()> {
    state
        .coordinator
        .respond_pair_request(peer_id, accepted)
        .await
        .into()
}

pub async fn update_draft(state: Arc<AppState>, peer_id: String, text: String) -> CommandResult<()> {
    state.coordinator.update_draft(peer_id, text).await.into()
}

/// Stages files and returns them with their generated ids.
pub async fn add_files(
    state: Arc<AppState>,
    peer_id: String,
    files: Vec<SelectedFileDto>,
) -> CommandResult<Vec<FileDto>> {
    let files = files.into_iter().map(SelectedFile::from).collect();
    state
        .coordinator
        .add_files(peer_id, files)
        .await
        .map(|staged| staged.iter().map(FileDto::from).collect())
        .into()
}

pub async fn remove_file(state: Arc<AppState>, peer_id: String, file_id: String) -> CommandResult<bool> {
    state.coordinator.remove_file(peer_id, file_id).await.into()
}

/// Sends the draft and staged files; `data` is `null` when there was
/// nothing to send.
pub async fn send_message(state: Arc<AppState>, peer_id: String) -> CommandResult<Option<MessageDto>> {
    state
        .coordinator
        .send_message(peer_id)
        .await
        .map(|sent| sent.as_ref().map(MessageDto::from))
        .into()
}

pub async fn dismiss_notification(state: Arc<AppState>) -> CommandResult<()> {
    state.coordinator.dismiss_notification().await.into()
}

pub async fn get_settings(state: Arc<AppState>) -> CommandResult<SettingsDto> {
    let cfg = state.config.lock().await;
    CommandResult::ok(SettingsDto {
        device_name: cfg.general.device_name.clone(),
        development_mode: cfg.general.mode == Mode::Development,
        pairing_timeout_secs: cfg.pairing_timeout().as_secs(),
        discovery_window_secs: cfg.discovery.window_secs,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
