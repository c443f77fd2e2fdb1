//! Draft and persisted-note model shared by the session, the autosave
//! scheduler and the stores.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type NoteId = i64;
pub type ResourceId = i64;

/// Id used for relations of a note that has not been persisted yet.
pub const UNKNOWN_ID: NoteId = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Visibility {
    #[default]
    Private,
    Protected,
    Public,
}

impl Visibility {
    pub const ALL: [Visibility; 3] = [Visibility::Private, Visibility::Protected, Visibility::Public];

    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Private => "PRIVATE",
            Visibility::Protected => "PROTECTED",
            Visibility::Public => "PUBLIC",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let value = value.to_ascii_uppercase();
        Self::ALL.into_iter().find(|v| v.as_str() == value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationKind {
    Reference,
    Comment,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Relation {
    pub memo_id: NoteId,
    pub related_memo_id: NoteId,
    pub kind: RelationKind,
}

impl Relation {
    pub fn reference(memo_id: NoteId, related_memo_id: NoteId) -> Self {
        Self {
            memo_id,
            related_memo_id,
            kind: RelationKind::Reference,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RowStatus {
    #[default]
    Normal,
    Archived,
}

/// Attachment metadata returned by the blob store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub id: ResourceId,
    pub filename: String,
    pub mime_type: String,
    pub size: u64,
    #[serde(default)]
    pub memo_id: Option<NoteId>,
}

/// A file handed to the blob store for upload.
#[derive(Debug, Clone)]
pub struct BlobUpload {
    pub filename: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// In-memory state of the note being edited.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Draft {
    pub content: String,
    pub visibility: Visibility,
    pub resource_ids: Vec<ResourceId>,
    pub relations: Vec<Relation>,
}

impl Draft {
    /// Change detection used by autosave: only the trimmed content counts.
    pub fn has_changed(&self, baseline: &Note) -> bool {
        self.content.trim() != baseline.content.trim()
    }
}

/// A persisted note, used as the baseline for change detection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub id: NoteId,
    pub content: String,
    pub visibility: Visibility,
    #[serde(default)]
    pub resources: Vec<Resource>,
    #[serde(default)]
    pub relations: Vec<Relation>,
    #[serde(default)]
    pub row_status: RowStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Note {
    pub fn to_draft(&self) -> Draft {
        Draft {
            content: self.content.clone(),
            visibility: self.visibility,
            resource_ids: self.resources.iter().map(|resource| resource.id).collect(),
            relations: self.relations.clone(),
        }
    }
}
