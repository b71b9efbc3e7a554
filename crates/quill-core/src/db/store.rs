//! Shared `SQLite` store used by the UI and the sync engine.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use crate::error::{Error, Result};

use super::Database;

/// Thread-safe handle over one `SQLite` database.
///
/// Implements both [`NoteStore`](super::NoteStore) and
/// [`MutationQueue`](super::MutationQueue). Every call takes the lock, runs to
/// completion and releases it, so no guard is ever held across an `.await`.
pub struct SqliteStore {
    db: Mutex<Database>,
}

impl SqliteStore {
    /// Open a store at the given filesystem path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::from_database(Database::open(path)?))
    }

    /// Open an in-memory store (primarily for tests).
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::from_database(Database::open_in_memory()?))
    }

    pub const fn from_database(db: Database) -> Self {
        Self { db: Mutex::new(db) }
    }

    pub(super) fn lock(&self) -> Result<MutexGuard<'_, Database>> {
        self.db
            .lock()
            .map_err(|_| Error::Database("store lock poisoned".to_string()))
    }
}
