//! Remote store contract and adapters.
//!
//! The sync engine only talks to a [`RemoteStore`]. Two adapters ship with the
//! crate: [`InMemoryRemote`] (tests, demos, second-device simulation) and
//! [`RestRemote`] for a PostgREST-style `notes` table.

mod memory;
mod rest;

use std::future::Future;

use thiserror::Error;
use tokio::sync::mpsc;

use crate::models::{ChangeEvent, Note, RemoteId, RemoteNote, UpsertAck, UserId};

pub use memory::{InMemoryRemote, RemoteCall};
pub use rest::{RemoteConfig, RestRemote};

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("Remote store is unreachable: {0}")]
    Unavailable(String),
    #[error("Remote HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Remote API error: {message} ({status})")]
    Api { status: u16, message: String },
    #[error("Invalid remote payload: {0}")]
    InvalidPayload(String),
    #[error("No authenticated user")]
    Unauthenticated,
    #[error("Invalid remote configuration: {0}")]
    InvalidConfiguration(String),
}

pub type RemoteResult<T> = Result<T, RemoteError>;

/// A remote document store with per-user row-level access.
///
/// Implementations are expected to fail fast and carry their own request
/// timeouts; the engine adds none.
pub trait RemoteStore: Send + Sync + 'static {
    /// Identity of the signed-in user, if any
    fn current_user_id(&self) -> impl Future<Output = Option<UserId>> + Send;

    /// Create or update a note for `user_id`.
    ///
    /// Keyed by `note.remote_id` when present, otherwise creates a record. A
    /// create carries the local id as client id so a redelivered create
    /// updates the record it already made instead of duplicating it.
    fn upsert(
        &self,
        user_id: &UserId,
        note: &Note,
    ) -> impl Future<Output = RemoteResult<UpsertAck>> + Send;

    /// Delete a record; deleting an unknown id succeeds
    fn delete(&self, remote_id: &RemoteId) -> impl Future<Output = RemoteResult<()>> + Send;

    /// The user's notes, most recently updated first, at most `limit` records
    fn list_notes(
        &self,
        user_id: &UserId,
        limit: usize,
    ) -> impl Future<Output = RemoteResult<Vec<RemoteNote>>> + Send;

    /// Subscribe to push-based changes for the user's notes
    fn subscribe_changes(
        &self,
        user_id: &UserId,
    ) -> impl Future<Output = RemoteResult<ChangeSubscription>> + Send;
}

/// Live change feed handed out by [`RemoteStore::subscribe_changes`].
///
/// Dropping the subscription unsubscribes.
pub struct ChangeSubscription {
    events: mpsc::UnboundedReceiver<ChangeEvent>,
    // Held by feeds that never deliver so `recv` stays pending instead of ending.
    idle_sender: Option<mpsc::UnboundedSender<ChangeEvent>>,
    on_close: Option<Box<dyn FnOnce() + Send>>,
}

impl ChangeSubscription {
    pub fn new(events: mpsc::UnboundedReceiver<ChangeEvent>) -> Self {
        Self {
            events,
            idle_sender: None,
            on_close: None,
        }
    }

    /// A subscription that never delivers an event
    pub fn idle() -> Self {
        let (sender, events) = mpsc::unbounded_channel();
        Self {
            events,
            idle_sender: Some(sender),
            on_close: None,
        }
    }

    /// Run `on_close` when the subscription is dropped
    #[must_use]
    pub fn with_close_hook(mut self, on_close: impl FnOnce() + Send + 'static) -> Self {
        self.on_close = Some(Box::new(on_close));
        self
    }

    /// Next change, or `None` once the remote side closed the feed
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        self.events.recv().await
    }
}

impl Drop for ChangeSubscription {
    fn drop(&mut self) {
        self.events.close();
        if let Some(on_close) = self.on_close.take() {
            on_close();
        }
    }
}

impl std::fmt::Debug for ChangeSubscription {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("ChangeSubscription")
            .field("idle", &self.idle_sender.is_some())
            .finish_non_exhaustive()
    }
}
