//! In-process remote store.
//!
//! Behaves like a hosted notes table with row-level access: records belong to
//! a user, every write is broadcast to that user's subscribers (including the
//! writer's own echo), and writes made through the `*_external` helpers stand
//! in for another device.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};

use super::{ChangeSubscription, RemoteError, RemoteResult, RemoteStore};
use crate::models::{ChangeEvent, Note, NoteId, RemoteId, RemoteNote, UpsertAck, UserId};

/// A call observed by [`InMemoryRemote`], in arrival order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    Upsert {
        client_id: NoteId,
        remote_id: Option<RemoteId>,
    },
    Delete(RemoteId),
    List,
    Subscribe,
}

#[derive(Default)]
struct RemoteState {
    user: Option<UserId>,
    notes: BTreeMap<RemoteId, RemoteNote>,
    next_id: u64,
    offline: bool,
    failing_notes: HashSet<NoteId>,
    calls: Vec<RemoteCall>,
    subscribers: Vec<(UserId, mpsc::UnboundedSender<ChangeEvent>)>,
}

impl RemoteState {
    fn allocate_id(&mut self) -> RemoteId {
        self.next_id += 1;
        RemoteId::new(format!("rn-{:06}", self.next_id))
    }

    fn broadcast(&mut self, owner: &UserId, event: &ChangeEvent) {
        self.subscribers.retain(|(_, sender)| !sender.is_closed());
        for (user, sender) in &self.subscribers {
            if user == owner {
                let _ = sender.send(event.clone());
            }
        }
    }

    fn ensure_reachable(&self) -> RemoteResult<()> {
        if self.offline {
            Err(RemoteError::Unavailable("simulated network outage".to_string()))
        } else {
            Ok(())
        }
    }
}

struct Inner {
    state: Mutex<RemoteState>,
    gate: watch::Sender<bool>,
}

/// Shared in-memory remote; clones observe the same records
#[derive(Clone)]
pub struct InMemoryRemote {
    inner: Arc<Inner>,
}

impl Default for InMemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRemote {
    /// A remote with no signed-in user
    pub fn new() -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(RemoteState::default()),
                gate,
            }),
        }
    }

    /// A remote with `user` signed in
    pub fn with_user(user: impl Into<String>) -> Self {
        let remote = Self::new();
        remote.set_user(Some(UserId::new(user)));
        remote
    }

    fn state(&self) -> MutexGuard<'_, RemoteState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    async fn wait_for_gate(&self) {
        let mut gate = self.inner.gate.subscribe();
        while !*gate.borrow_and_update() {
            if gate.changed().await.is_err() {
                break;
            }
        }
    }

    pub fn set_user(&self, user: Option<UserId>) {
        self.state().user = user;
    }

    /// Make every call fail with [`RemoteError::Unavailable`]
    pub fn set_offline(&self, offline: bool) {
        self.state().offline = offline;
    }

    /// Fail upserts and deletes issued for this local note
    pub fn fail_writes_for(&self, note_id: NoteId) {
        self.state().failing_notes.insert(note_id);
    }

    pub fn clear_failures(&self) {
        self.state().failing_notes.clear();
    }

    /// Hold every call until [`resume`](Self::resume)
    pub fn pause(&self) {
        self.inner.gate.send_replace(false);
    }

    pub fn resume(&self) {
        self.inner.gate.send_replace(true);
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.state().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    /// Number of live change subscriptions
    pub fn subscriber_count(&self) -> usize {
        let mut state = self.state();
        state.subscribers.retain(|(_, sender)| !sender.is_closed());
        state.subscribers.len()
    }

    /// Records owned by `user`, most recently updated first
    pub fn notes_for(&self, user: &UserId) -> Vec<RemoteNote> {
        let mut notes: Vec<RemoteNote> = self
            .state()
            .notes
            .values()
            .filter(|note| &note.owner_id == user)
            .cloned()
            .collect();
        notes.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        notes
    }

    pub fn get(&self, remote_id: &RemoteId) -> Option<RemoteNote> {
        self.state().notes.get(remote_id).cloned()
    }

    /// Create a record as another device would
    pub fn insert_external(
        &self,
        user: &UserId,
        title: &str,
        body: &str,
        updated_at: DateTime<Utc>,
    ) -> RemoteNote {
        let mut state = self.state();
        let remote_id = state.allocate_id();
        let note = RemoteNote {
            remote_id: remote_id.clone(),
            client_id: Some(NoteId::new()),
            owner_id: user.clone(),
            title: title.to_string(),
            body: body.to_string(),
            created_at: updated_at,
            updated_at,
        };
        state.notes.insert(remote_id, note.clone());
        state.broadcast(user, &ChangeEvent::Insert(note.clone()));
        note
    }

    /// Edit a record as another device would
    pub fn update_external(
        &self,
        remote_id: &RemoteId,
        title: &str,
        body: &str,
        updated_at: DateTime<Utc>,
    ) -> Option<RemoteNote> {
        let mut state = self.state();
        let note = state.notes.get_mut(remote_id)?;
        note.title = title.to_string();
        note.body = body.to_string();
        note.updated_at = updated_at;
        let note = note.clone();
        state.broadcast(&note.owner_id, &ChangeEvent::Update(note.clone()));
        Some(note)
    }

    /// Delete a record as another device would
    pub fn delete_external(&self, remote_id: &RemoteId) -> Option<RemoteNote> {
        let mut state = self.state();
        let note = state.notes.remove(remote_id)?;
        state.broadcast(
            &note.owner_id,
            &ChangeEvent::Delete {
                remote_id: remote_id.clone(),
            },
        );
        Some(note)
    }
}

impl RemoteStore for InMemoryRemote {
    async fn current_user_id(&self) -> Option<UserId> {
        self.state().user.clone()
    }

    async fn upsert(&self, user_id: &UserId, note: &Note) -> RemoteResult<UpsertAck> {
        self.wait_for_gate().await;
        let mut state = self.state();
        state.calls.push(RemoteCall::Upsert {
            client_id: note.id,
            remote_id: note.remote_id.clone(),
        });
        state.ensure_reachable()?;
        if state.failing_notes.contains(&note.id) {
            return Err(RemoteError::Api {
                status: 503,
                message: format!("simulated upsert failure for {}", note.id),
            });
        }

        let existing = match &note.remote_id {
            Some(remote_id) => Some(remote_id.clone()),
            None => state
                .notes
                .values()
                .find(|record| &record.owner_id == user_id && record.client_id == Some(note.id))
                .map(|record| record.remote_id.clone()),
        };

        let (remote_id, created) = match existing {
            Some(remote_id) => {
                let created = !state.notes.contains_key(&remote_id);
                (remote_id, created)
            }
            None => (state.allocate_id(), true),
        };

        let created_at = state
            .notes
            .get(&remote_id)
            .map_or(note.created_at, |record| record.created_at);
        let record = RemoteNote {
            remote_id: remote_id.clone(),
            client_id: Some(note.id),
            owner_id: user_id.clone(),
            title: note.title.clone(),
            body: note.body.clone(),
            created_at,
            updated_at: note.updated_at,
        };
        state.notes.insert(remote_id.clone(), record.clone());

        let event = if created {
            ChangeEvent::Insert(record)
        } else {
            ChangeEvent::Update(record)
        };
        state.broadcast(user_id, &event);

        Ok(UpsertAck {
            remote_id,
            updated_at: note.updated_at,
        })
    }

    async fn delete(&self, remote_id: &RemoteId) -> RemoteResult<()> {
        self.wait_for_gate().await;
        let mut state = self.state();
        state.calls.push(RemoteCall::Delete(remote_id.clone()));
        state.ensure_reachable()?;

        let failing = state.notes.get(remote_id).is_some_and(|record| {
            record
                .client_id
                .is_some_and(|client_id| state.failing_notes.contains(&client_id))
        });
        if failing {
            return Err(RemoteError::Api {
                status: 503,
                message: format!("simulated delete failure for {remote_id}"),
            });
        }

        if let Some(record) = state.notes.remove(remote_id) {
            state.broadcast(
                &record.owner_id,
                &ChangeEvent::Delete {
                    remote_id: remote_id.clone(),
                },
            );
        }
        Ok(())
    }

    async fn list_notes(&self, user_id: &UserId, limit: usize) -> RemoteResult<Vec<RemoteNote>> {
        self.wait_for_gate().await;
        {
            let mut state = self.state();
            state.calls.push(RemoteCall::List);
            state.ensure_reachable()?;
        }
        let mut notes = self.notes_for(user_id);
        notes.truncate(limit);
        Ok(notes)
    }

    async fn subscribe_changes(&self, user_id: &UserId) -> RemoteResult<ChangeSubscription> {
        let mut state = self.state();
        state.calls.push(RemoteCall::Subscribe);
        state.ensure_reachable()?;

        let (sender, receiver) = mpsc::unbounded_channel();
        state.subscribers.push((user_id.clone(), sender));
        Ok(ChangeSubscription::new(receiver))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util;

    #[tokio::test]
    async fn redelivered_create_updates_existing_record() {
        let remote = InMemoryRemote::with_user("u1");
        let user = UserId::new("u1");
        let note = Note::new("a", "b");

        let first = remote.upsert(&user, &note).await.unwrap();
        let second = remote.upsert(&user, &note).await.unwrap();

        assert_eq!(first.remote_id, second.remote_id);
        assert_eq!(remote.notes_for(&user).len(), 1);
    }

    #[tokio::test]
    async fn offline_remote_rejects_calls() {
        let remote = InMemoryRemote::with_user("u1");
        remote.set_offline(true);
        let result = remote.list_notes(&UserId::new("u1"), 10).await;
        assert!(matches!(result, Err(RemoteError::Unavailable(_))));
    }

    #[tokio::test]
    async fn subscribers_only_see_their_own_records() {
        let remote = InMemoryRemote::new();
        let alice = UserId::new("alice");
        let bob = UserId::new("bob");
        let mut alice_feed = remote.subscribe_changes(&alice).await.unwrap();
        let _bob_feed = remote.subscribe_changes(&bob).await.unwrap();

        let record = remote.insert_external(&alice, "t", "b", util::now());

        assert_eq!(alice_feed.recv().await, Some(ChangeEvent::Insert(record)));
        assert_eq!(remote.subscriber_count(), 2);
        drop(alice_feed);
        assert_eq!(remote.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn list_is_bounded_and_newest_first() {
        let remote = InMemoryRemote::new();
        let user = UserId::new("u1");
        let base = util::now();
        for offset in 0..5 {
            let updated_at = base + chrono::Duration::seconds(offset);
            remote.insert_external(&user, &format!("n{offset}"), "", updated_at);
        }

        let listed = remote.list_notes(&user, 3).await.unwrap();
        let titles: Vec<&str> = listed.iter().map(|note| note.title.as_str()).collect();
        assert_eq!(titles, vec!["n4", "n3", "n2"]);
    }
}
