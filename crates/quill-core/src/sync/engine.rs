//! The sync engine.
//!
//! Local writes land in the store and the mutation queue first, then a
//! single-flight cycle pushes queued mutations and pulls remote records.
//! Requests arriving while a cycle runs are folded into one follow-up cycle.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tokio::time::Instant;

use super::config::{RetryPolicy, SyncSettings};
use super::merge::{self, Resolution};
use super::status::{CycleReport, SyncOutcome, SyncPhase, SyncStats, SyncStatus};
use crate::db::{MutationQueue, NoteStore, SqliteStore};
use crate::error::{Error, Result};
use crate::models::{
    ChangeEvent, Mutation, MutationKind, MutationPayload, NewMutation, Note, RemoteId, RemoteNote,
    UserId,
};
use crate::remote::RemoteStore;
use crate::util;

#[derive(Debug, Default)]
struct FlightState {
    in_flight: bool,
    pending: bool,
    last_started: Option<Instant>,
}

/// Local-first sync engine over a note store and a remote store.
///
/// Share it as `Arc<SyncEngine<..>>`; the trigger methods that start
/// background cycles take `self: &Arc<Self>`.
pub struct SyncEngine<R, S = SqliteStore> {
    store: S,
    remote: R,
    settings: SyncSettings,
    online: AtomicBool,
    flight: Mutex<FlightState>,
    status: watch::Sender<SyncStatus>,
    stats: Mutex<SyncStats>,
}

impl<R, S> std::fmt::Debug for SyncEngine<R, S> {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("SyncEngine")
            .field("settings", &self.settings)
            .field("online", &self.online.load(Ordering::SeqCst))
            .field("status", &*self.status.borrow())
            .finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<R, S> SyncEngine<R, S>
where
    R: RemoteStore,
    S: NoteStore + MutationQueue + Send + Sync + 'static,
{
    /// Create an engine that starts out online and idle
    pub fn new(store: S, remote: R, settings: SyncSettings) -> Self {
        let (status, _) = watch::channel(SyncStatus::Idle);
        Self {
            store,
            remote,
            settings,
            online: AtomicBool::new(true),
            flight: Mutex::new(FlightState::default()),
            status,
            stats: Mutex::new(SyncStats::default()),
        }
    }

    pub const fn store(&self) -> &S {
        &self.store
    }

    pub const fn remote(&self) -> &R {
        &self.remote
    }

    pub const fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    // --- UI operations ---

    /// A fresh note that is not persisted until [`save_note`](Self::save_note)
    pub fn create_draft_note(&self) -> Note {
        Note::new("", "")
    }

    /// Persist a local edit, queue it for the remote store and request a sync.
    ///
    /// Returns the note as stored.
    pub fn save_note(self: &Arc<Self>, mut note: Note) -> Result<Note> {
        let stored = self.store.get(&note.id)?;
        if note.deleted || stored.as_ref().is_some_and(|stored| stored.deleted) {
            return Err(Error::InvalidInput(format!(
                "note {} is deleted and cannot be edited",
                note.id
            )));
        }

        if let Some(stored) = stored {
            // The engine owns the remote binding; a stale copy must not drop it.
            note.remote_id = stored.remote_id.or(note.remote_id);
            note.owner_id = stored.owner_id.or(note.owner_id);
            note.updated_at = note.updated_at.max(stored.updated_at);
        }
        note.touch();
        note.dirty = true;

        self.store.put(&note)?;
        self.store.enqueue(NewMutation::upsert(
            note.id,
            MutationPayload {
                title: note.title.clone(),
                body: note.body.clone(),
            },
        ))?;
        tracing::debug!("Saved note {} and queued upsert", note.id);

        self.request_sync();
        Ok(note)
    }

    /// Tombstone a note locally, queue the remote delete and request a sync
    pub fn delete_note(self: &Arc<Self>, note: &Note) -> Result<()> {
        let mut stored = self
            .store
            .get(&note.id)?
            .ok_or_else(|| Error::NotFound(note.id.to_string()))?;
        if stored.deleted && !stored.dirty {
            return Ok(());
        }

        stored.deleted = true;
        stored.dirty = true;
        stored.touch();
        self.store.put(&stored)?;
        self.store.enqueue(NewMutation::delete(stored.id))?;
        tracing::debug!("Deleted note {} and queued remote delete", stored.id);

        self.request_sync();
        Ok(())
    }

    /// Mutations still waiting for the remote store
    pub fn queue_length(&self) -> Result<usize> {
        self.store.queue_len()
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Whether a cycle is running or about to run
    pub fn current_sync_status(&self) -> SyncPhase {
        if lock(&self.flight).in_flight {
            SyncPhase::Syncing
        } else {
            SyncPhase::Idle
        }
    }

    /// Watch status transitions
    pub fn subscribe_status(&self) -> watch::Receiver<SyncStatus> {
        self.status.subscribe()
    }

    pub fn stats(&self) -> SyncStats {
        lock(&self.stats).clone()
    }

    // --- Triggers ---

    /// Ask for a sync cycle in the background.
    ///
    /// No-op while offline or outside a tokio runtime; while a cycle runs the
    /// request is folded into a single follow-up cycle.
    pub fn request_sync(self: &Arc<Self>) {
        if !self.is_online() {
            tracing::debug!("Offline; sync request ignored");
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::debug!("No async runtime; sync deferred to the next trigger");
            return;
        };

        if self.try_begin() {
            let engine = Arc::clone(self);
            runtime.spawn(async move {
                engine.drive().await;
            });
        }
    }

    /// User-initiated sync
    pub fn request_immediate_sync(self: &Arc<Self>) {
        tracing::info!("Sync requested by user");
        self.request_sync();
    }

    /// Connectivity transition reported by the host
    pub fn on_connectivity_changed(self: &Arc<Self>, online: bool) {
        let was_online = self.online.swap(online, Ordering::SeqCst);
        if was_online == online {
            return;
        }

        if online {
            tracing::info!("Connectivity restored");
            self.request_sync();
        } else {
            tracing::info!("Connectivity lost");
        }
    }

    /// Periodic timer: sync only when online and idle
    pub fn on_timer_tick(self: &Arc<Self>) {
        if self.is_online() && self.current_sync_status() == SyncPhase::Idle {
            self.request_sync();
        }
    }

    /// Apply a push-based remote change to the local store.
    ///
    /// Inserts and updates use the same last-write-wins rule as the pull phase.
    pub fn on_remote_change(&self, event: ChangeEvent) -> Result<()> {
        match event {
            ChangeEvent::Insert(remote) | ChangeEvent::Update(remote) => {
                if self.merge_remote(&remote)? {
                    tracing::debug!("Merged remote change {}", remote.remote_id);
                }
            }
            ChangeEvent::Delete { remote_id } => {
                if let Some(id) = self.store.apply_remote_delete(&remote_id)? {
                    tracing::debug!("Remote deleted {}; tombstoned note {}", remote_id, id);
                }
            }
        }
        Ok(())
    }

    // --- Cycles ---

    /// Run a cycle now and wait for it.
    ///
    /// Returns [`SyncOutcome::Coalesced`] when another cycle is already
    /// running; that cycle runs once more on its own.
    pub async fn sync_now(&self) -> SyncOutcome {
        if !self.try_begin() {
            return SyncOutcome::Coalesced;
        }
        SyncOutcome::Completed(self.drive().await)
    }

    /// Run full cycles until one completes, backing off between attempts
    pub async fn sync_with_retry(&self, policy: &RetryPolicy) -> Result<CycleReport> {
        let attempts = policy.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 0..attempts {
            let delay = policy.delay_for_attempt(attempt);
            if !delay.is_zero() {
                tracing::debug!("Retrying sync in {:?}", delay);
                tokio::time::sleep(delay).await;
            }

            let report = self.run_exclusive().await;
            match report.error() {
                None => return Ok(report),
                Some(error) => {
                    tracing::warn!(
                        "Sync attempt {}/{} incomplete: {}",
                        attempt + 1,
                        attempts,
                        error
                    );
                    last_error = error;
                }
            }
        }

        Err(Error::SyncFailed {
            attempts,
            reason: last_error,
        })
    }

    /// Wait until no cycle is running
    pub async fn wait_until_idle(&self) {
        let mut status = self.status.subscribe();
        while status.borrow_and_update().is_syncing() {
            if status.changed().await.is_err() {
                return;
            }
        }
    }

    async fn run_exclusive(&self) -> CycleReport {
        loop {
            match self.sync_now().await {
                SyncOutcome::Completed(report) => return report,
                SyncOutcome::Coalesced => self.wait_until_idle().await,
            }
        }
    }

    fn try_begin(&self) -> bool {
        let mut flight = lock(&self.flight);
        if flight.in_flight {
            flight.pending = true;
            return false;
        }
        flight.in_flight = true;
        self.status.send_replace(SyncStatus::Syncing);
        true
    }

    async fn drive(&self) -> CycleReport {
        loop {
            self.wait_for_cooldown().await;
            let report = self.run_cycle().await;

            let follow_up = {
                let mut flight = lock(&self.flight);
                if flight.pending && !self.is_online() {
                    tracing::debug!("Went offline; dropping coalesced follow-up cycle");
                    flight.pending = false;
                }
                if flight.pending {
                    flight.pending = false;
                    true
                } else {
                    flight.in_flight = false;
                    let status = if report.is_complete() {
                        SyncStatus::Synced
                    } else {
                        SyncStatus::Incomplete
                    };
                    self.status.send_replace(status);
                    false
                }
            };

            if !follow_up {
                return report;
            }
            tracing::debug!("Running coalesced follow-up cycle");
        }
    }

    async fn wait_for_cooldown(&self) {
        let remaining = lock(&self.flight).last_started.map(|started| {
            self.settings
                .cooldown
                .saturating_sub(started.elapsed())
        });
        if let Some(remaining) = remaining.filter(|remaining| !remaining.is_zero()) {
            tracing::debug!("Sync cooldown; deferring cycle by {:?}", remaining);
            tokio::time::sleep(remaining).await;
        }
        lock(&self.flight).last_started = Some(Instant::now());
    }

    async fn run_cycle(&self) -> CycleReport {
        let mut report = CycleReport::default();

        if let Some(user) = self.remote.current_user_id().await {
            if let Err(error) = self.push(&user, &mut report).await {
                tracing::warn!("Push halted: {}", error);
                report.push_error = Some(error.to_string());
            }
            if let Err(error) = self.pull(&user, &mut report).await {
                tracing::warn!("Pull failed: {}", error);
                report.pull_error = Some(error.to_string());
            }
        } else {
            tracing::debug!("No signed-in user; skipping push and pull");
            report.identity_missing = true;
        }

        if report.is_complete() {
            self.run_maintenance();
        }

        lock(&self.stats).record(&report, util::now());
        tracing::info!(
            "Sync cycle finished: {} pushed, {} merged, {} skipped, {} removed{}",
            report.pushed,
            report.merged,
            report.skipped,
            report.removed,
            report
                .error()
                .map(|error| format!(" ({error})"))
                .unwrap_or_default()
        );
        report
    }

    async fn push(&self, user: &UserId, report: &mut CycleReport) -> Result<()> {
        loop {
            let batch = self.store.drain(self.settings.push_batch_size)?;
            if batch.is_empty() {
                return Ok(());
            }

            for mutation in &batch {
                if self.push_one(user, mutation).await? {
                    report.pushed += 1;
                }
                self.store.acknowledge(mutation.id)?;
                report.acknowledged += 1;
            }
        }
    }

    /// Apply one mutation remotely; `true` when a remote call succeeded
    async fn push_one(&self, user: &UserId, mutation: &Mutation) -> Result<bool> {
        let Some(note) = self.store.get(&mutation.note_id)? else {
            tracing::warn!(
                "Queued mutation {} targets missing note {}; dropping it",
                mutation.id,
                mutation.note_id
            );
            return Ok(false);
        };

        if mutation.kind == MutationKind::Delete || note.deleted {
            let pushed = match &note.remote_id {
                Some(remote_id) => {
                    self.remote.delete(remote_id).await?;
                    true
                }
                None => false,
            };
            self.store.mark_deleted(&note.id)?;
            tracing::debug!("Pushed delete of note {}", note.id);
            return Ok(pushed);
        }

        if !note.dirty && note.remote_id.is_some() {
            tracing::debug!("Note {} already in sync; skipping upsert", note.id);
            return Ok(false);
        }

        let ack = self.remote.upsert(user, &note).await?;
        self.store
            .mark_pushed(&note.id, &ack.remote_id, user, note.updated_at, ack.updated_at)?;
        tracing::debug!("Pushed note {} as {}", note.id, ack.remote_id);
        Ok(true)
    }

    async fn pull(&self, user: &UserId, report: &mut CycleReport) -> Result<()> {
        let records = self
            .remote
            .list_notes(user, self.settings.pull_page_size)
            .await?;

        let mut writes = Vec::new();
        let mut claimed = false;
        for remote in &records {
            match merge::reconcile(self.local_match(remote)?, remote) {
                Resolution::Apply(note) => writes.push(note),
                Resolution::Keep => {
                    tracing::debug!("Kept local copy of {}", remote.remote_id);
                    report.skipped += 1;
                }
                Resolution::DeleteRemote(note) => {
                    self.claim_for_deletion(&note)?;
                    claimed = true;
                }
            }
        }

        report.merged += self.store.bulk_put(&writes)?;

        if records.len() < self.settings.pull_page_size {
            report.removed += self.remove_missing(user, &records)?;
        }
        if claimed {
            lock(&self.flight).pending = true;
        }
        Ok(())
    }

    /// Write a single remote record if it wins; `true` when the store changed
    fn merge_remote(&self, remote: &RemoteNote) -> Result<bool> {
        match merge::reconcile(self.local_match(remote)?, remote) {
            Resolution::Apply(note) => self.store.put(&note),
            Resolution::Keep => Ok(false),
            Resolution::DeleteRemote(note) => {
                self.claim_for_deletion(&note)?;
                Ok(true)
            }
        }
    }

    /// Bind a record to a tombstone that never saw its create acknowledged,
    /// and queue the remote delete that the tombstone owes
    fn claim_for_deletion(&self, note: &Note) -> Result<()> {
        let (Some(remote_id), Some(owner_id)) = (&note.remote_id, &note.owner_id) else {
            return Ok(());
        };
        self.store.bind_tombstone(&note.id, remote_id, owner_id)?;
        // A dirty tombstone already has its delete queued.
        if !note.dirty {
            self.store.enqueue(NewMutation::delete(note.id))?;
        }
        tracing::debug!("Tombstone {} bound to {}; remote delete queued", note.id, remote_id);
        Ok(())
    }

    /// Tombstone synced notes whose record is absent from a complete listing.
    ///
    /// Only clean notes owned by `user` qualify; a dirty note still has a
    /// queued upsert that recreates the record.
    fn remove_missing(&self, user: &UserId, records: &[RemoteNote]) -> Result<usize> {
        let listed: HashSet<&RemoteId> = records.iter().map(|remote| &remote.remote_id).collect();
        let mut removed = 0;
        for note in self.store.query_active()? {
            let Some(remote_id) = &note.remote_id else {
                continue;
            };
            if note.dirty || note.owner_id.as_ref() != Some(user) || listed.contains(remote_id) {
                continue;
            }
            self.store.mark_deleted(&note.id)?;
            tracing::debug!("Record {} is gone remotely; tombstoned note {}", remote_id, note.id);
            removed += 1;
        }
        Ok(removed)
    }

    /// The local note a remote record belongs to.
    ///
    /// Bound notes match by remote id; a note this device created but never
    /// saw acknowledged matches by client id.
    fn local_match(&self, remote: &RemoteNote) -> Result<Option<Note>> {
        if let Some(note) = self.store.find_by_remote_id(&remote.remote_id)? {
            return Ok(Some(note));
        }
        let Some(client_id) = remote.client_id else {
            return Ok(None);
        };
        Ok(self
            .store
            .get(&client_id)?
            .filter(|note| note.remote_id.is_none()))
    }

    fn run_maintenance(&self) {
        match self
            .store
            .purge_older_than(self.settings.mutation_retention)
        {
            Ok(0) => {}
            Ok(purged) => tracing::info!("Purged {} stale queued mutation(s)", purged),
            Err(error) => tracing::warn!("Failed to purge stale mutations: {}", error),
        }
        match self
            .store
            .purge_tombstones_older_than(self.settings.tombstone_retention)
        {
            Ok(0) => {}
            Ok(purged) => tracing::info!("Removed {} confirmed tombstone(s)", purged),
            Err(error) => tracing::warn!("Failed to remove old tombstones: {}", error),
        }
    }
}
