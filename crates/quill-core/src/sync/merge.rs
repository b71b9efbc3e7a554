//! Last-write-wins reconciliation of remote records into the local store

use crate::models::{Note, RemoteNote};
use crate::util;

/// Whether `remote` should replace `local`.
///
/// Strictly newer wins; on a tie the local copy stays.
pub fn remote_wins(local: &Note, remote: &RemoteNote) -> bool {
    util::truncate_micros(remote.updated_at) > local.updated_at
}

/// Result of reconciling one remote record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Write this note to the store
    Apply(Note),
    /// Local copy is newer or equal
    Keep,
    /// The record belongs to a note deleted here before it was ever bound;
    /// the note now carries the remote id and the record must be deleted
    DeleteRemote(Note),
}

/// Reconcile `remote` against the matching local note, if one exists.
///
/// A matched note keeps its local id. An unbound live note that keeps its
/// content also stays unbound; its queued upsert finds the record by client id.
/// An unbound tombstone that keeps its content claims the record instead.
pub fn reconcile(local: Option<Note>, remote: &RemoteNote) -> Resolution {
    let Some(mut local) = local else {
        return Resolution::Apply(remote.to_new_local());
    };

    if !remote_wins(&local, remote) {
        if local.deleted && local.remote_id.is_none() {
            local.remote_id = Some(remote.remote_id.clone());
            local.owner_id = Some(remote.owner_id.clone());
            return Resolution::DeleteRemote(local);
        }
        return Resolution::Keep;
    }

    local.remote_id = Some(remote.remote_id.clone());
    local.owner_id = Some(remote.owner_id.clone());
    local.title.clone_from(&remote.title);
    local.body.clone_from(&remote.body);
    local.updated_at = util::truncate_micros(remote.updated_at);
    local.deleted = false;
    local.dirty = false;
    Resolution::Apply(local)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NoteId, RemoteId, UserId};
    use chrono::Duration;

    fn remote_copy(local: &Note, offset_ms: i64) -> RemoteNote {
        RemoteNote {
            remote_id: RemoteId::new("rn-1"),
            client_id: Some(local.id),
            owner_id: UserId::new("u1"),
            title: "remote".to_string(),
            body: "remote body".to_string(),
            created_at: local.created_at,
            updated_at: local.updated_at + Duration::milliseconds(offset_ms),
        }
    }

    #[test]
    fn tie_keeps_local() {
        let mut local = Note::new("local", "");
        local.remote_id = Some(RemoteId::new("rn-1"));
        let remote = remote_copy(&local, 0);
        assert!(!remote_wins(&local, &remote));
        assert_eq!(reconcile(Some(local), &remote), Resolution::Keep);
    }

    #[test]
    fn newer_remote_replaces_content_and_keeps_local_id() {
        let local = Note::new("local", "");
        let id = local.id;
        let remote = remote_copy(&local, 5);

        let Resolution::Apply(merged) = reconcile(Some(local), &remote) else {
            panic!("expected remote to win");
        };
        assert_eq!(merged.id, id);
        assert_eq!(merged.title, "remote");
        assert_eq!(merged.updated_at, remote.updated_at);
        assert!(!merged.dirty);
    }

    #[test]
    fn older_remote_never_overwrites() {
        let mut local = Note::new("local", "");
        local.dirty = true;
        let remote = remote_copy(&local, -5);
        assert_eq!(reconcile(Some(local), &remote), Resolution::Keep);
    }

    #[test]
    fn newer_remote_revives_tombstone() {
        let mut local = Note::new("local", "");
        local.deleted = true;
        let remote = remote_copy(&local, 1);

        let Resolution::Apply(merged) = reconcile(Some(local), &remote) else {
            panic!("expected remote to win");
        };
        assert!(!merged.deleted);
    }

    #[test]
    fn unbound_tombstone_claims_older_record_for_deletion() {
        let mut local = Note::new("local", "");
        local.deleted = true;
        let remote = remote_copy(&local, -5);

        let Resolution::DeleteRemote(bound) = reconcile(Some(local.clone()), &remote) else {
            panic!("expected the record to be claimed for deletion");
        };
        assert_eq!(bound.id, local.id);
        assert_eq!(bound.remote_id, Some(remote.remote_id.clone()));
        assert!(bound.deleted);

        local.remote_id = Some(RemoteId::new("rn-1"));
        assert_eq!(reconcile(Some(local), &remote), Resolution::Keep);
    }

    #[test]
    fn unknown_remote_materializes_with_fresh_id() {
        let remote = RemoteNote {
            client_id: Some(NoteId::new()),
            ..remote_copy(&Note::new("x", ""), 0)
        };
        let Resolution::Apply(note) = reconcile(None, &remote) else {
            panic!("expected new note");
        };
        assert_ne!(Some(note.id), remote.client_id);
        assert_eq!(note.remote_id, Some(remote.remote_id.clone()));
        assert_eq!(note.updated_at, remote.updated_at);
    }
}
