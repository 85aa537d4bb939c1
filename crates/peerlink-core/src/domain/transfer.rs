//! Transfer updates delivered by the transport.
//!
//! A `transfer-update` event carries one of three payload shapes, told apart
//! by their fields rather than by an explicit tag:
//!
//! ```json
//! { "content": "hi" }                                                   // text
//! { "path": "/tmp/a.txt", "name": "a.txt", "size": 12,
//!   "progress": 0.5, "status": "Transferring" }                        // file
//! { "path": "/tmp/photos", "total_files": 42 }                          // directory
//! ```

use serde::{Deserialize, Serialize};

use super::peer::PeerId;

/// Progress status of a file transfer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TransferStatus {
    Pending,
    Transferring,
    Completed,
    Failed(String),
    Cancelled,
}

/// Payload of a transfer update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TransferKind {
    File {
        path: String,
        name: String,
        size: u64,
        progress: f32,
        status: TransferStatus,
    },
    Directory {
        path: String,
        total_files: u32,
    },
    Text {
        content: String,
    },
}

impl TransferKind {
    /// Returns the text content for text payloads.
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Text { content } => Some(content),
            _ => None,
        }
    }
}

/// A `transfer-update` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferUpdate {
    /// Transport-assigned task id.
    pub id: String,
    pub peer_id: PeerId,
    pub transfer_type: TransferKind,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_payload_deserializes_as_text() {
        let kind: TransferKind = serde_json::from_str(r#"{"content":"hi"}"#).unwrap();
        assert_eq!(kind.text(), Some("hi"));
    }

    #[test]
    fn test_file_payload_deserializes_as_file() {
        let json = r#"{"path":"/tmp/a.txt","name":"a.txt","size":12,"progress":0.5,"status":"Transferring"}"#;
        let kind: TransferKind = serde_json::from_str(json).unwrap();
        assert!(matches!(
            kind,
            TransferKind::File { size: 12, status: TransferStatus::Transferring, .. }
        ));
        assert_eq!(kind.text(), None);
    }

    #[test]
    fn test_directory_payload_deserializes_as_directory() {
        let json = r#"{"path":"/tmp/photos","total_files":42}"#;
        let kind: TransferKind = serde_json::from_str(json).unwrap();
        assert_eq!(
            kind,
            TransferKind::Directory {
                path: "/tmp/photos".to_string(),
                total_files: 42
            }
        );
    }

    #[test]
    fn test_failed_status_carries_reason() {
        let json = r#"{"path":"/x","name":"x","size":1,"progress":0.0,"status":{"Failed":"disk full"}}"#;
        let kind: TransferKind = serde_json::from_str(json).unwrap();
        match kind {
            TransferKind::File { status, .. } => {
                assert_eq!(status, TransferStatus::Failed("disk full".to_string()));
            }
            other => panic!("expected file payload, got {other:?}"),
        }
    }
}
