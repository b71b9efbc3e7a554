//! Note storage on top of `SQLite`

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT/OFFSET

use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{Error, Result};
use crate::models::{Note, NoteId, RemoteId, UserId};
use crate::util;

use super::SqliteStore;

const NOTE_COLUMNS: &str =
    "id, remote_id, title, body, created_at, updated_at, owner_id, dirty, deleted";

/// Trait for note storage operations
pub trait NoteStore {
    /// Get a note by ID, tombstones included
    fn get(&self, id: &NoteId) -> Result<Option<Note>>;

    /// Insert or update a note.
    ///
    /// Returns `false` when the stored record already has the same title, body,
    /// `updated_at` and tombstone state and the write was skipped. An assigned
    /// `remote_id`/`owner_id` is never cleared by this call.
    fn put(&self, note: &Note) -> Result<bool>;

    /// Batched `put` in a single transaction; returns how many rows changed
    fn bulk_put(&self, notes: &[Note]) -> Result<usize>;

    /// Non-deleted notes, most recently updated first, as of this call
    fn query_active(&self) -> Result<ActiveNotes>;

    /// One page of non-deleted notes, most recently updated first
    fn list_active(&self, limit: usize, offset: usize) -> Result<Vec<Note>>;

    /// Find the note bound to a remote id, preferring a live record over a tombstone
    fn find_by_remote_id(&self, remote_id: &RemoteId) -> Result<Option<Note>>;

    /// Record a successful remote upsert.
    ///
    /// Binds the remote id and owner, lifts `updated_at` to the remote timestamp
    /// when that is newer, and clears `dirty` unless the note was edited after
    /// the snapshot that was pushed.
    fn mark_pushed(
        &self,
        id: &NoteId,
        remote_id: &RemoteId,
        owner_id: &UserId,
        pushed_updated_at: DateTime<Utc>,
        remote_updated_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Tombstone a note and mark the deletion as confirmed
    fn mark_deleted(&self, id: &NoteId) -> Result<()>;

    /// Bind a remote record to an unbound tombstone and reopen the deletion
    /// so the record gets deleted remotely
    fn bind_tombstone(&self, id: &NoteId, remote_id: &RemoteId, owner_id: &UserId) -> Result<()>;

    /// Tombstone the note bound to `remote_id` after a remote-side delete
    fn apply_remote_delete(&self, remote_id: &RemoteId) -> Result<Option<NoteId>>;

    /// Physically remove confirmed tombstones last touched before `age` ago
    fn purge_tombstones_older_than(&self, age: Duration) -> Result<usize>;
}

/// Snapshot of active notes taken when [`NoteStore::query_active`] was called.
///
/// Finite; call `query_active` again to restart from fresh store state.
#[derive(Debug)]
pub struct ActiveNotes {
    inner: std::vec::IntoIter<Note>,
}

impl Iterator for ActiveNotes {
    type Item = Note;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for ActiveNotes {}

/// Parse a note from a database row
fn parse_note(row: &rusqlite::Row<'_>) -> rusqlite::Result<Note> {
    let id: String = row.get(0)?;
    let id = id
        .parse()
        .map_err(|error| conversion_error(0, rusqlite::types::Type::Text, error))?;
    Ok(Note {
        id,
        remote_id: row.get::<_, Option<String>>(1)?.map(RemoteId::new),
        title: row.get(2)?,
        body: row.get(3)?,
        created_at: parse_timestamp(row, 4)?,
        updated_at: parse_timestamp(row, 5)?,
        owner_id: row.get::<_, Option<String>>(6)?.map(UserId::new),
        dirty: row.get::<_, i32>(7)? != 0,
        deleted: row.get::<_, i32>(8)? != 0,
    })
}

pub(super) fn parse_timestamp(row: &rusqlite::Row<'_>, index: usize) -> rusqlite::Result<DateTime<Utc>> {
    let micros: i64 = row.get(index)?;
    util::from_micros(micros).ok_or_else(|| {
        conversion_error(
            index,
            rusqlite::types::Type::Integer,
            format!("timestamp out of range: {micros}"),
        )
    })
}

pub(super) fn conversion_error(
    index: usize,
    kind: rusqlite::types::Type,
    error: impl Into<Box<dyn std::error::Error + Send + Sync>>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(index, kind, error.into())
}

pub(super) fn cutoff_micros(age: Duration) -> Result<i64> {
    let age = chrono::Duration::from_std(age)
        .map_err(|error| Error::InvalidInput(format!("retention window too large: {error}")))?;
    Ok((util::now() - age).timestamp_micros())
}

fn put_with(conn: &Connection, note: &Note) -> Result<bool> {
    let rows = conn.execute(
        "INSERT INTO notes (id, remote_id, title, body, created_at, updated_at, owner_id, dirty, deleted)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
         ON CONFLICT(id) DO UPDATE SET
            title = excluded.title,
            body = excluded.body,
            updated_at = excluded.updated_at,
            dirty = excluded.dirty,
            deleted = excluded.deleted,
            remote_id = COALESCE(notes.remote_id, excluded.remote_id),
            owner_id = COALESCE(notes.owner_id, excluded.owner_id)
         WHERE NOT (
            notes.title = excluded.title
            AND notes.body = excluded.body
            AND notes.updated_at = excluded.updated_at
            AND notes.deleted = excluded.deleted
         )",
        params![
            note.id.as_str(),
            note.remote_id.as_ref().map(RemoteId::as_str),
            note.title,
            note.body,
            note.created_at.timestamp_micros(),
            note.updated_at.timestamp_micros(),
            note.owner_id.as_ref().map(UserId::as_str),
            i32::from(note.dirty),
            i32::from(note.deleted),
        ],
    )?;
    Ok(rows > 0)
}

impl NoteStore for SqliteStore {
    fn get(&self, id: &NoteId) -> Result<Option<Note>> {
        let db = self.lock()?;
        let note = db
            .connection()
            .query_row(
                &format!("SELECT {NOTE_COLUMNS} FROM notes WHERE id = ?"),
                params![id.as_str()],
                parse_note,
            )
            .optional()?;
        Ok(note)
    }

    fn put(&self, note: &Note) -> Result<bool> {
        let db = self.lock()?;
        put_with(db.connection(), note)
    }

    fn bulk_put(&self, notes: &[Note]) -> Result<usize> {
        if notes.is_empty() {
            return Ok(0);
        }

        let mut db = self.lock()?;
        let tx = db.connection_mut().transaction()?;
        let mut written = 0;
        for note in notes {
            if put_with(&tx, note)? {
                written += 1;
            }
        }
        tx.commit()?;
        Ok(written)
    }

    fn query_active(&self) -> Result<ActiveNotes> {
        let db = self.lock()?;
        let mut stmt = db.connection().prepare(&format!(
            "SELECT {NOTE_COLUMNS} FROM notes WHERE deleted = 0 ORDER BY updated_at DESC, id ASC"
        ))?;
        let notes = stmt
            .query_map([], parse_note)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(ActiveNotes {
            inner: notes.into_iter(),
        })
    }

    fn list_active(&self, limit: usize, offset: usize) -> Result<Vec<Note>> {
        let db = self.lock()?;
        let mut stmt = db.connection().prepare(&format!(
            "SELECT {NOTE_COLUMNS}
             FROM notes
             WHERE deleted = 0
             ORDER BY updated_at DESC, id ASC
             LIMIT ? OFFSET ?"
        ))?;

        let notes = stmt
            .query_map(params![limit as i64, offset as i64], parse_note)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(notes)
    }

    fn find_by_remote_id(&self, remote_id: &RemoteId) -> Result<Option<Note>> {
        let db = self.lock()?;
        let note = db
            .connection()
            .query_row(
                &format!(
                    "SELECT {NOTE_COLUMNS} FROM notes WHERE remote_id = ?
                     ORDER BY deleted ASC, updated_at DESC LIMIT 1"
                ),
                params![remote_id.as_str()],
                parse_note,
            )
            .optional()?;
        Ok(note)
    }

    fn mark_pushed(
        &self,
        id: &NoteId,
        remote_id: &RemoteId,
        owner_id: &UserId,
        pushed_updated_at: DateTime<Utc>,
        remote_updated_at: DateTime<Utc>,
    ) -> Result<()> {
        let db = self.lock()?;
        let rows = db.connection().execute(
            "UPDATE notes SET
                remote_id = ?2,
                owner_id = ?3,
                dirty = CASE WHEN updated_at > ?4 THEN dirty ELSE 0 END,
                updated_at = MAX(updated_at, ?5)
             WHERE id = ?1",
            params![
                id.as_str(),
                remote_id.as_str(),
                owner_id.as_str(),
                pushed_updated_at.timestamp_micros(),
                remote_updated_at.timestamp_micros(),
            ],
        )?;

        if rows == 0 {
            return Err(Error::NotFound(id.to_string()));
        }
        Ok(())
    }

    fn mark_deleted(&self, id: &NoteId) -> Result<()> {
        let db = self.lock()?;
        let rows = db.connection().execute(
            "UPDATE notes SET deleted = 1, dirty = 0 WHERE id = ?",
            params![id.as_str()],
        )?;

        if rows == 0 {
            return Err(Error::NotFound(id.to_string()));
        }
        Ok(())
    }

    fn bind_tombstone(&self, id: &NoteId, remote_id: &RemoteId, owner_id: &UserId) -> Result<()> {
        let db = self.lock()?;
        let rows = db.connection().execute(
            "UPDATE notes SET remote_id = ?2, owner_id = ?3, dirty = 1
             WHERE id = ?1 AND deleted = 1",
            params![id.as_str(), remote_id.as_str(), owner_id.as_str()],
        )?;

        if rows == 0 {
            return Err(Error::NotFound(id.to_string()));
        }
        Ok(())
    }

    fn apply_remote_delete(&self, remote_id: &RemoteId) -> Result<Option<NoteId>> {
        let Some(note) = self.find_by_remote_id(remote_id)? else {
            return Ok(None);
        };
        self.mark_deleted(&note.id)?;
        Ok(Some(note.id))
    }

    fn purge_tombstones_older_than(&self, age: Duration) -> Result<usize> {
        let cutoff = cutoff_micros(age)?;
        let db = self.lock()?;
        let rows = db.connection().execute(
            "DELETE FROM notes WHERE deleted = 1 AND dirty = 0 AND updated_at < ?",
            params![cutoff],
        )?;
        Ok(rows)
    }
}
