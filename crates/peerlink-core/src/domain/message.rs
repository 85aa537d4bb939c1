//! Timeline messages and staged attachments.
//!
//! A [`Message`] is immutable once created.  Attachments are described by
//! [`FileInfo`] values that live in a session's staging list until the message
//! carrying them is sent.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which side produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Outbound,
    Inbound,
}

/// Content classification of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// Text only.
    Text,
    /// Carries at least one attachment, with or without text.
    Mixed,
}

impl MessageKind {
    /// Classifies a message by whether it carries attachments.
    pub fn for_attachment_count(count: usize) -> Self {
        if count > 0 {
            Self::Mixed
        } else {
            Self::Text
        }
    }
}

/// A file the user selected, before it is staged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedFile {
    pub name: String,
    pub size_bytes: u64,
    pub mime_type: String,
}

/// A staged attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    /// Opaque id generated when the file is staged.
    pub id: String,
    pub name: String,
    /// Human-readable size, e.g. `"1.5 MB"`.
    pub size_label: String,
    pub mime_type: String,
}

impl FileInfo {
    /// Stages `file` under a freshly generated id.
    pub fn stage(file: SelectedFile) -> Self {
        Self {
            id: Uuid::new_v4().simple().to_string(),
            size_label: format_file_size(file.size_bytes),
            name: file.name,
            mime_type: file.mime_type,
        }
    }
}

/// One entry of a transfer session's timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Strictly increasing within the owning session, starting at 1.
    pub sequence_id: u64,
    pub direction: Direction,
    pub kind: MessageKind,
    pub text: Option<String>,
    pub attachments: Vec<FileInfo>,
    /// Milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
}

/// Formats a byte count with binary units and at most one decimal.
///
/// ```rust
/// use peerlink_core::domain::message::format_file_size;
///
/// assert_eq!(format_file_size(512), "512 B");
/// assert_eq!(format_file_size(1536), "1.5 KB");
/// ```
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];

    if bytes < 1024 {
        return format!("{bytes} B");
    }

    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let mut rounded = (value * 10.0).round() / 10.0;
    if rounded >= 1024.0 && unit < UNITS.len() - 1 {
        rounded = 1.0;
        unit += 1;
    }
    if rounded.fract() == 0.0 {
        format!("{} {}", rounded as u64, UNITS[unit])
    } else {
        format!("{rounded:.1} {}", UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_is_mixed_when_attachments_present() {
        assert_eq!(MessageKind::for_attachment_count(0), MessageKind::Text);
        assert_eq!(MessageKind::for_attachment_count(2), MessageKind::Mixed);
    }

    #[test]
    fn test_format_file_size_bytes() {
        assert_eq!(format_file_size(0), "0 B");
        assert_eq!(format_file_size(1023), "1023 B");
    }

    #[test]
    fn test_format_file_size_carries_into_next_unit_after_rounding() {
        // Arrange
        let just_under_mb = 1024 * 1024 - 1;
        let just_under_gb = 1024 * 1024 * 1024 - 1;

        // Act / Assert
        assert_eq!(format_file_size(just_under_mb), "1 MB");
        assert_eq!(format_file_size(just_under_gb), "1 GB");
    }

    #[test]
    fn test_format_file_size_scales_units() {
        assert_eq!(format_file_size(1024), "1 KB");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(5 * 1024 * 1024), "5 MB");
        assert_eq!(format_file_size(3 * 1024 * 1024 * 1024), "3 GB");
    }

    #[test]
    fn test_stage_generates_distinct_ids() {
        // Arrange
        let file = SelectedFile {
            name: "report.pdf".to_string(),
            size_bytes: 2048,
            mime_type: "application/pdf".to_string(),
        };

        // Act
        let a = FileInfo::stage(file.clone());
        let b = FileInfo::stage(file);

        // Assert
        assert_ne!(a.id, b.id);
        assert_eq!(a.name, "report.pdf");
        assert_eq!(a.size_label, "2 KB");
        assert_eq!(a.mime_type, "application/pdf");
    }

    #[test]
    fn test_direction_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&Direction::Inbound).unwrap(),
            "\"inbound\""
        );
        assert_eq!(
            serde_json::to_string(&MessageKind::Mixed).unwrap(),
            "\"mixed\""
        );
    }
}
