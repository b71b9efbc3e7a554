//! Durable mutation log awaiting remote application

#![allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)] // SQLite uses i64 for LIMIT and COUNT

use std::time::Duration;

use rusqlite::params;

use crate::error::Result;
use crate::models::{Mutation, MutationId, MutationPayload, NewMutation};

use super::repository::{cutoff_micros, parse_timestamp};
use super::SqliteStore;

/// Trait for the ordered log of pending local edits
pub trait MutationQueue {
    /// Append a mutation and assign its sequence id
    fn enqueue(&self, mutation: NewMutation) -> Result<Mutation>;

    /// Oldest `batch_size` mutations in enqueue order; nothing is removed
    fn drain(&self, batch_size: usize) -> Result<Vec<Mutation>>;

    /// Remove a mutation after its remote operation succeeded
    fn acknowledge(&self, id: MutationId) -> Result<()>;

    /// Drop mutations enqueued before `age` ago, acknowledged or not
    fn purge_older_than(&self, age: Duration) -> Result<usize>;

    /// Number of mutations still waiting
    fn queue_len(&self) -> Result<usize>;
}

/// Parse a mutation row.
///
/// Returns `Ok(Err(id))` for rows that cannot be interpreted so the caller can
/// drop them instead of wedging the queue.
fn parse_mutation(
    row: &rusqlite::Row<'_>,
) -> rusqlite::Result<std::result::Result<Mutation, MutationId>> {
    let id = MutationId(row.get(0)?);
    let kind: String = row.get(1)?;
    let note_id: String = row.get(2)?;
    let payload: Option<String> = row.get(3)?;

    let (Ok(kind), Ok(note_id)) = (kind.parse(), note_id.parse()) else {
        return Ok(Err(id));
    };
    let payload = match payload {
        Some(raw) => match serde_json::from_str::<MutationPayload>(&raw) {
            Ok(payload) => Some(payload),
            Err(_) => return Ok(Err(id)),
        },
        None => None,
    };

    Ok(Ok(Mutation {
        id,
        kind,
        note_id,
        payload,
        enqueued_at: parse_timestamp(row, 4)?,
    }))
}

impl MutationQueue for SqliteStore {
    fn enqueue(&self, mutation: NewMutation) -> Result<Mutation> {
        let payload = mutation
            .payload
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let db = self.lock()?;
        db.connection().execute(
            "INSERT INTO mutations (kind, note_id, payload, enqueued_at) VALUES (?, ?, ?, ?)",
            params![
                mutation.kind.as_str(),
                mutation.note_id.as_str(),
                payload,
                mutation.enqueued_at.timestamp_micros(),
            ],
        )?;
        let id = MutationId(db.connection().last_insert_rowid());

        Ok(Mutation {
            id,
            kind: mutation.kind,
            note_id: mutation.note_id,
            payload: mutation.payload,
            enqueued_at: mutation.enqueued_at,
        })
    }

    fn drain(&self, batch_size: usize) -> Result<Vec<Mutation>> {
        let corrupt = {
            let db = self.lock()?;
            let mut stmt = db.connection().prepare(
                "SELECT id, kind, note_id, payload, enqueued_at
                 FROM mutations
                 ORDER BY id ASC
                 LIMIT ?",
            )?;
            let rows = stmt
                .query_map(params![batch_size as i64], parse_mutation)?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            let mut parsed = Vec::with_capacity(rows.len());
            let mut corrupt = Vec::new();
            for row in rows {
                match row {
                    Ok(mutation) => parsed.push(mutation),
                    Err(id) => corrupt.push(id),
                }
            }
            if corrupt.is_empty() {
                return Ok(parsed);
            }
            corrupt
        };

        for id in corrupt {
            tracing::warn!("Dropping unreadable queued mutation {id}");
            self.acknowledge(id)?;
        }
        self.drain(batch_size)
    }

    fn acknowledge(&self, id: MutationId) -> Result<()> {
        let db = self.lock()?;
        db.connection()
            .execute("DELETE FROM mutations WHERE id = ?", params![id.0])?;
        Ok(())
    }

    fn purge_older_than(&self, age: Duration) -> Result<usize> {
        let cutoff = cutoff_micros(age)?;
        let db = self.lock()?;
        let rows = db.connection().execute(
            "DELETE FROM mutations WHERE enqueued_at < ?",
            params![cutoff],
        )?;
        Ok(rows)
    }

    fn queue_len(&self) -> Result<usize> {
        let db = self.lock()?;
        let count: i64 = db
            .connection()
            .query_row("SELECT COUNT(*) FROM mutations", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}
