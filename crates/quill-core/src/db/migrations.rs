//! Database migrations

use crate::error::Result;
use rusqlite::{Connection, OptionalExtension};

/// Current schema version
const CURRENT_VERSION: i32 = 2;

/// Run all pending migrations
pub fn run(conn: &mut Connection) -> Result<()> {
    let version = get_version(conn)?;

    if version < 1 {
        migrate_v1(conn)?;
    }
    if version < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

/// Get the current schema version
fn get_version(conn: &Connection) -> Result<i32> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
        [],
        |row| row.get(0),
    )?;

    if !exists {
        return Ok(0);
    }

    let version: Option<i32> = conn
        .query_row("SELECT MAX(version) FROM schema_version", [], |row| {
            row.get(0)
        })
        .optional()?
        .flatten();

    Ok(version.unwrap_or(0))
}

/// Migration to version 1: notes and the mutation log
fn migrate_v1(conn: &mut Connection) -> Result<()> {
    let tx = conn.transaction()?;

    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );

        CREATE TABLE IF NOT EXISTS notes (
            id TEXT PRIMARY KEY,
            remote_id TEXT,
            title TEXT NOT NULL,
            body TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            owner_id TEXT,
            dirty INTEGER NOT NULL DEFAULT 0,
            deleted INTEGER NOT NULL DEFAULT 0
        );
        CREATE INDEX IF NOT EXISTS idx_notes_active_updated ON notes(deleted, updated_at DESC);
        CREATE INDEX IF NOT EXISTS idx_notes_remote_id ON notes(remote_id);

        CREATE TABLE IF NOT EXISTS mutations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            kind TEXT NOT NULL,
            note_id TEXT NOT NULL,
            payload TEXT,
            enqueued_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_mutations_enqueued ON mutations(enqueued_at);
        CREATE INDEX IF NOT EXISTS idx_mutations_note ON mutations(note_id);

        INSERT INTO schema_version (version) VALUES (1);",
    )?;

    tx.commit()?;
    tracing::info!("Migrated database to version 1");
    Ok(())
}

/// Migration to version 2: remote id uniqueness and the LWW timestamp guard
fn migrate_v2(conn: &mut Connection) -> Result<()> {
    let tx = conn.transaction()?;

    tx.execute_batch(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_notes_remote_id_live
            ON notes(remote_id)
            WHERE remote_id IS NOT NULL AND deleted = 0;

        CREATE TRIGGER IF NOT EXISTS notes_lww_guard BEFORE UPDATE ON notes
        FOR EACH ROW
        WHEN NEW.updated_at < OLD.updated_at
        BEGIN
            SELECT RAISE(IGNORE);
        END;

        INSERT INTO schema_version (version) VALUES (2);",
    )?;

    tx.commit()?;
    tracing::info!("Migrated database to version {CURRENT_VERSION}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_is_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        run(&mut conn).unwrap();
        run(&mut conn).unwrap();
        assert_eq!(get_version(&conn).unwrap(), CURRENT_VERSION);
    }

    #[test]
    fn lww_guard_ignores_backward_updates() {
        let mut conn = Connection::open_in_memory().unwrap();
        run(&mut conn).unwrap();

        conn.execute(
            "INSERT INTO notes (id, title, body, created_at, updated_at) VALUES ('n1', 'a', 'b', 10, 20)",
            [],
        )
        .unwrap();
        conn.execute(
            "UPDATE notes SET title = 'stale', updated_at = 15 WHERE id = 'n1'",
            [],
        )
        .unwrap();

        let (title, updated_at): (String, i64) = conn
            .query_row("SELECT title, updated_at FROM notes WHERE id = 'n1'", [], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .unwrap();
        assert_eq!(title, "a");
        assert_eq!(updated_at, 20);
    }
}
