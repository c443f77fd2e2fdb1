use thiserror::Error;

use crate::draft::{NoteId, ResourceId};

/// Failure of a save attempt. Recoverable: the autosave scheduler keeps the
/// last one around until the next successful attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SaveError {
    #[error("note {0} was not found")]
    NotFound(NoteId),
    #[error("save rejected: {0}")]
    Rejected(String),
    #[error("storage failure: {0}")]
    Storage(String),
    #[error("a save is already in progress")]
    InFlight,
    #[error("note has never been persisted")]
    NoBaseline,
}

impl From<std::io::Error> for SaveError {
    fn from(err: std::io::Error) -> Self {
        SaveError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for SaveError {
    fn from(err: serde_json::Error) -> Self {
        SaveError::Storage(err.to_string())
    }
}

/// Failure to store an attachment. Surfaced as a notification only.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UploadError {
    #[error("{filename} is too large ({size} bytes, limit {limit} bytes)")]
    TooLarge {
        filename: String,
        size: u64,
        limit: u64,
    },
    #[error("resource {0} was not found")]
    NotFound(ResourceId),
    #[error("upload failed: {0}")]
    Storage(String),
}

impl From<std::io::Error> for UploadError {
    fn from(err: std::io::Error) -> Self {
        UploadError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for UploadError {
    fn from(err: serde_json::Error) -> Self {
        UploadError::Storage(err.to_string())
    }
}
