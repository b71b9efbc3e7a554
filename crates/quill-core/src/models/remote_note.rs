//! Remote-side note records and change events

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Note, NoteId, RemoteId, UserId};

/// A note as stored by the remote store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteNote {
    pub remote_id: RemoteId,
    /// Local id on the device that created the record, when known
    pub client_id: Option<NoteId>,
    pub owner_id: UserId,
    pub title: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RemoteNote {
    /// Materialize a fresh local note bound to this remote record
    #[must_use]
    pub fn to_new_local(&self) -> Note {
        Note {
            id: NoteId::new(),
            remote_id: Some(self.remote_id.clone()),
            title: self.title.clone(),
            body: self.body.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            owner_id: Some(self.owner_id.clone()),
            dirty: false,
            deleted: false,
        }
    }
}

/// Acknowledgement returned by a successful remote upsert
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertAck {
    pub remote_id: RemoteId,
    pub updated_at: DateTime<Utc>,
}

/// Push-based change delivered by a remote subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    Insert(RemoteNote),
    Update(RemoteNote),
    Delete { remote_id: RemoteId },
}

impl ChangeEvent {
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Insert(_) => "insert",
            Self::Update(_) => "update",
            Self::Delete { .. } => "delete",
        }
    }
}
