//! Transfer sessions: one message timeline per paired peer.
//!
//! A session owns its timeline, the draft text the user is composing and the
//! files staged for the next message.  Sequence ids come from the session's
//! own [`SequenceCounter`], so they keep increasing even though the timeline
//! is only ever appended to by the coordinator.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use peerlink_core::{
    Direction, FileInfo, Message, MessageKind, PeerId, SelectedFile, SequenceCounter,
    TransferKind, TransferUpdate,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("no transfer session with peer {0}")]
    NoSession(PeerId),
}

/// Read-only snapshot of one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionView {
    pub peer_id: PeerId,
    pub timeline: Vec<Message>,
    pub draft: String,
    pub staged: Vec<FileInfo>,
}

#[derive(Debug)]
pub struct TransferSession {
    peer_id: PeerId,
    timeline: Vec<Message>,
    seq: SequenceCounter,
    draft: String,
    staged: Vec<FileInfo>,
}

impl TransferSession {
    pub fn new(peer_id: impl Into<PeerId>) -> Self {
        Self {
            peer_id: peer_id.into(),
            timeline: Vec::new(),
            seq: SequenceCounter::new(),
            draft: String::new(),
            staged: Vec::new(),
        }
    }

    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    pub fn timeline(&self) -> &[Message] {
        &self.timeline
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn staged(&self) -> &[FileInfo] {
        &self.staged
    }

    pub fn update_draft(&mut self, text: impl Into<String>) {
        self.draft = text.into();
    }

    /// Stages `files`, each under a new id, and returns what was staged.
    pub fn add_files(&mut self, files: Vec<SelectedFile>) -> Vec<FileInfo> {
        let staged: Vec<FileInfo> = files.into_iter().map(FileInfo::stage).collect();
        self.staged.extend(staged.iter().cloned());
        staged
    }

    /// Unstages the file with `id`.  Returns whether anything was removed.
    pub fn remove_file(&mut self, id: &str) -> bool {
        let before = self.staged.len();
        self.staged.retain(|f| f.id != id);
        self.staged.len() != before
    }

    /// Builds the outbound message for the current draft and staged files.
    ///
    /// Returns `None` when the trimmed draft is empty and nothing is staged.
    /// The message is not part of the timeline until
    /// [`commit_outbound`](Self::commit_outbound) is called.
    pub fn prepare_outbound(&self) -> Option<Message> {
        let text = self.draft.trim();
        if text.is_empty() && self.staged.is_empty() {
            return None;
        }

        Some(Message {
            sequence_id: self.seq.next(),
            direction: Direction::Outbound,
            kind: MessageKind::for_attachment_count(self.staged.len()),
            text: (!text.is_empty()).then(|| text.to_string()),
            attachments: self.staged.clone(),
            timestamp_ms: now_ms(),
        })
    }

    /// Appends a prepared message and clears the draft and staging together.
    pub fn commit_outbound(&mut self, message: Message) {
        debug!(peer_id = %self.peer_id, sequence_id = message.sequence_id, "outbound message appended");
        self.timeline.push(message);
        self.draft.clear();
        self.staged.clear();
    }

    /// Applies an inbound `transfer-update`.
    ///
    /// Text content becomes one inbound message; file and directory progress
    /// leaves the timeline untouched.
    pub fn ingest(&mut self, update: &TransferUpdate) -> Option<&Message> {
        let Some(content) = update.transfer_type.text() else {
            if let TransferKind::File { name, progress, .. } = &update.transfer_type {
                debug!(peer_id = %self.peer_id, task = %update.id, name = %name, progress, "file transfer progress");
            } else {
                debug!(peer_id = %self.peer_id, task = %update.id, "directory transfer update");
            }
            return None;
        };

        let message = Message {
            sequence_id: self.seq.next(),
            direction: Direction::Inbound,
            kind: MessageKind::Text,
            text: Some(content.to_string()),
            attachments: Vec::new(),
            timestamp_ms: now_ms(),
        };
        info!(peer_id = %self.peer_id, sequence_id = message.sequence_id, "inbound message");
        self.timeline.push(message);
        self.timeline.last()
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            peer_id: self.peer_id.clone(),
            timeline: self.timeline.clone(),
            draft: self.draft.clone(),
            staged: self.staged.clone(),
        }
    }
}

/// All transfer sessions, keyed by peer.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<PeerId, TransferSession>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a session for `peer_id` unless one exists.  Returns whether a
    /// new session was created.
    pub fn open(&mut self, peer_id: &str) -> bool {
        if self.sessions.contains_key(peer_id) {
            return false;
        }
        info!(peer_id, "transfer session opened");
        self.sessions
            .insert(peer_id.to_string(), TransferSession::new(peer_id));
        true
    }

    pub fn get(&self, peer_id: &str) -> Option<&TransferSession> {
        self.sessions.get(peer_id)
    }

    /// # Errors
    ///
    /// [`SessionError::NoSession`] if `peer_id` is not paired.
    pub fn get_mut(&mut self, peer_id: &str) -> Result<&mut TransferSession, SessionError> {
        self.sessions
            .get_mut(peer_id)
            .ok_or_else(|| SessionError::NoSession(peer_id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Session snapshots ordered by peer id.
    pub fn views(&self) -> Vec<SessionView> {
        let mut views: Vec<SessionView> = self.sessions.values().map(TransferSession::view).collect();
        views.sort_by(|a, b| a.peer_id.cmp(&b.peer_id));
        views
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
