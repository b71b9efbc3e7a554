//! Mutation log model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::NoteId;
use crate::util;

/// Monotonic local sequence number of a queued mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MutationId(pub i64);

impl fmt::Display for MutationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a queued mutation asks the remote store to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationKind {
    Upsert,
    Delete,
}

impl MutationKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Upsert => "upsert",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MutationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "upsert" => Ok(Self::Upsert),
            "delete" => Ok(Self::Delete),
            other => Err(format!("unknown mutation kind '{other}'")),
        }
    }
}

/// Snapshot of the note content at enqueue time.
///
/// Kept for diagnostics only; a flush always reads the current note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationPayload {
    pub title: String,
    pub body: String,
}

/// A mutation waiting to be appended to the queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMutation {
    pub kind: MutationKind,
    pub note_id: NoteId,
    pub payload: Option<MutationPayload>,
    pub enqueued_at: DateTime<Utc>,
}

impl NewMutation {
    #[must_use]
    pub fn upsert(note_id: NoteId, payload: MutationPayload) -> Self {
        Self {
            kind: MutationKind::Upsert,
            note_id,
            payload: Some(payload),
            enqueued_at: util::now(),
        }
    }

    #[must_use]
    pub fn delete(note_id: NoteId) -> Self {
        Self {
            kind: MutationKind::Delete,
            note_id,
            payload: None,
            enqueued_at: util::now(),
        }
    }
}

/// A queued mutation with its assigned sequence number
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mutation {
    pub id: MutationId,
    pub kind: MutationKind,
    pub note_id: NoteId,
    pub payload: Option<MutationPayload>,
    pub enqueued_at: DateTime<Utc>,
}
