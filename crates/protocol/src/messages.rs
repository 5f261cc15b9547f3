//! API message definitions for LanShare.
//!
//! This module defines the JSON bodies exchanged between the daemon and the
//! browsing client, plus the change-event type pushed over the event stream.

use serde::{Deserialize, Serialize};

/// Event name used for directory-content change notifications.
pub const EVENT_FILE_CHANGE: &str = "file_change";

/// Event name emitted once when a notification stream opens.
pub const EVENT_CONNECTED: &str = "connected";

/// One row of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    /// Entry name (no path components).
    pub name: String,
    /// Path relative to the share root, slash-separated.
    pub path: String,
    /// Whether the entry is a directory.
    pub is_dir: bool,
    /// Human-formatted size; present for files only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
}

/// Response body for a directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListResponse {
    /// The listed directory, relative to the share root ("" for the root).
    pub path: String,
    /// Nesting depth of the listed directory (root is 0).
    pub depth: usize,
    /// Whether a new child folder may be created at this level.
    pub can_create_folder: bool,
    /// Immediate children, directories first, case-insensitive name order.
    pub entries: Vec<DirectoryEntry>,
}

/// Request body for folder creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateFolderRequest {
    /// Name of the folder to create.
    pub name: String,
}

/// Response body for folder creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderCreated {
    /// Root-relative path of the new folder.
    pub path: String,
}

/// Request body for renaming an entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameRequest {
    /// The new name (no path components).
    pub new_name: String,
}

/// Response body for a rename.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Renamed {
    /// The entry's new name after sanitization.
    pub name: String,
}

/// Request body for moving an entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveRequest {
    /// Root-relative path of the destination directory ("" for the root).
    pub destination: String,
}

/// Response body for a move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Moved {
    /// Root-relative path of the entry at its new location.
    pub path: String,
}

/// Response body for a delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deleted {
    /// Root-relative path of the removed entry.
    pub deleted: String,
}

/// Per-file failure inside an upload batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadFailure {
    /// Sanitized name of the file that failed.
    pub name: String,
    /// Human-readable failure reason.
    pub error: String,
}

/// Aggregate outcome of an upload batch.
///
/// `error` is set only when the whole batch failed, so the body still carries
/// the standard `{"error": ...}` key alongside the per-file detail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResponse {
    /// Batch-level failure message; absent on full or partial success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Number of files written and verified.
    pub uploaded: usize,
    /// Per-file failures, empty on full success.
    #[serde(default)]
    pub errors: Vec<UploadFailure>,
}

/// Standard JSON error body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Short human-readable message.
    pub error: String,
}

impl ErrorBody {
    /// Build an error body from any displayable message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}

/// A change notification fanned out to every open event stream.
///
/// `path` names the directory whose listing may be stale, relative to the
/// share root; the empty string denotes the root itself. Consumers treat it
/// as a refresh hint, not a precise diff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Event kind; currently always [`EVENT_FILE_CHANGE`].
    pub kind: String,
    /// Affected directory, relative to the share root ("" for the root).
    pub path: String,
}

impl ChangeEvent {
    /// A `file_change` event scoped to `dir`.
    pub fn file_change(dir: impl Into<String>) -> Self {
        Self {
            kind: EVENT_FILE_CHANGE.to_string(),
            path: dir.into(),
        }
    }
}

/// Format a byte count for display: one decimal place, base-1024 units.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 6] = ["B", "KB", "MB", "GB", "TB", "PB"];

    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", size, UNITS[unit])
}
