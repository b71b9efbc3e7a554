//! Observable sync state

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Engine status broadcast to subscribers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// No cycle has run yet
    Idle,
    Syncing,
    /// Last cycle pushed and pulled without error
    Synced,
    /// Last cycle finished but a phase failed or had no identity
    Incomplete,
}

impl SyncStatus {
    pub const fn is_syncing(self) -> bool {
        matches!(self, Self::Syncing)
    }
}

/// Coarse phase exposed to hosts through `current_sync_status`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncPhase {
    Idle,
    Syncing,
}

/// What a single push + pull cycle did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    /// Remote writes that succeeded
    pub pushed: usize,
    /// Mutations removed from the queue, no-ops included
    pub acknowledged: usize,
    /// Remote records written to the local store
    pub merged: usize,
    /// Remote records that lost the last-write-wins comparison
    pub skipped: usize,
    /// Bound local notes tombstoned because their record left a complete listing
    pub removed: usize,
    /// No signed-in user; both phases were skipped
    pub identity_missing: bool,
    pub push_error: Option<String>,
    pub pull_error: Option<String>,
}

impl CycleReport {
    pub const fn is_complete(&self) -> bool {
        !self.identity_missing && self.push_error.is_none() && self.pull_error.is_none()
    }

    /// First failure of the cycle, if any
    pub fn error(&self) -> Option<String> {
        if self.identity_missing {
            return Some("no authenticated user".to_string());
        }
        match (&self.push_error, &self.pull_error) {
            (Some(push), Some(pull)) => Some(format!("push: {push}; pull: {pull}")),
            (Some(push), None) => Some(format!("push: {push}")),
            (None, Some(pull)) => Some(format!("pull: {pull}")),
            (None, None) => None,
        }
    }
}

/// Outcome of [`SyncEngine::sync_now`](super::SyncEngine::sync_now)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// This call ran the cycle
    Completed(CycleReport),
    /// A cycle was already running; one follow-up cycle is scheduled
    Coalesced,
}

/// Running totals since the engine was created
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStats {
    pub cycles_completed: u64,
    pub mutations_pushed: u64,
    pub notes_merged: u64,
    pub last_error: Option<String>,
    pub last_completed_at: Option<DateTime<Utc>>,
}

impl SyncStats {
    pub(super) fn record(&mut self, report: &CycleReport, finished_at: DateTime<Utc>) {
        self.cycles_completed += 1;
        self.mutations_pushed += report.pushed as u64;
        self.notes_merged += report.merged as u64;
        self.last_error = report.error();
        self.last_completed_at = Some(finished_at);
    }
}
