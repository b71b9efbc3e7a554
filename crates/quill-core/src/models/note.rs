//! Note model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::util;

/// Local identifier for a note, a random (v4) UUID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NoteId(Uuid);

impl NoteId {
    /// Create a new unique note ID
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for NoteId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for NoteId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Identifier assigned to a note by the remote store
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteId(String);

impl RemoteId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RemoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of an authenticated user
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A note as held on this device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    /// Local identifier, stable for the lifetime of the note on this device
    pub id: NoteId,
    /// Identifier assigned by the remote store on first successful push
    pub remote_id: Option<RemoteId>,
    pub title: String,
    pub body: String,
    /// Creation timestamp, set once
    pub created_at: DateTime<Utc>,
    /// Last local edit or applied remote change; never moves backward
    pub updated_at: DateTime<Utc>,
    /// Owning user, set on first successful sync
    pub owner_id: Option<UserId>,
    /// Local changes not yet confirmed by the remote store
    pub dirty: bool,
    /// Tombstone flag
    pub deleted: bool,
}

impl Note {
    /// Create a new local-only note
    #[must_use]
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        let now = util::now();
        Self {
            id: NoteId::new(),
            remote_id: None,
            title: title.into(),
            body: body.into(),
            created_at: now,
            updated_at: now,
            owner_id: None,
            dirty: false,
            deleted: false,
        }
    }

    /// Move `updated_at` forward for a local edit.
    ///
    /// Always strictly increases, even when the clock reads behind the
    /// stored timestamp.
    pub fn touch(&mut self) {
        let now = util::now();
        self.updated_at = if now > self.updated_at {
            now
        } else {
            self.updated_at + chrono::Duration::microseconds(1)
        };
    }

    /// Title, or the first line of the body when the title is blank,
    /// truncated to `max_len` characters
    #[must_use]
    pub fn preview(&self, max_len: usize) -> String {
        let source = if self.title.trim().is_empty() {
            self.body.lines().next().unwrap_or("")
        } else {
            self.title.as_str()
        };
        source.trim().chars().take(max_len).collect()
    }

    /// Check if both title and body are empty (whitespace-only counts as empty)
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.title.trim().is_empty() && self.body.trim().is_empty()
    }
}
