//! Remote store used by the CLI: the REST adapter when configured, otherwise
//! a local-only stand-in with no signed-in user.

use quill_core::models::{Note, RemoteId, RemoteNote, UpsertAck, UserId};
use quill_core::remote::{ChangeSubscription, RemoteError, RemoteResult, RemoteStore, RestRemote};

pub enum CliRemote {
    Rest(RestRemote),
    LocalOnly,
}

impl CliRemote {
    pub const fn is_configured(&self) -> bool {
        matches!(self, Self::Rest(_))
    }
}

impl RemoteStore for CliRemote {
    async fn current_user_id(&self) -> Option<UserId> {
        match self {
            Self::Rest(remote) => remote.current_user_id().await,
            Self::LocalOnly => None,
        }
    }

    async fn upsert(&self, user_id: &UserId, note: &Note) -> RemoteResult<UpsertAck> {
        match self {
            Self::Rest(remote) => remote.upsert(user_id, note).await,
            Self::LocalOnly => Err(RemoteError::Unauthenticated),
        }
    }

    async fn delete(&self, remote_id: &RemoteId) -> RemoteResult<()> {
        match self {
            Self::Rest(remote) => remote.delete(remote_id).await,
            Self::LocalOnly => Err(RemoteError::Unauthenticated),
        }
    }

    async fn list_notes(&self, user_id: &UserId, limit: usize) -> RemoteResult<Vec<RemoteNote>> {
        match self {
            Self::Rest(remote) => remote.list_notes(user_id, limit).await,
            Self::LocalOnly => Err(RemoteError::Unauthenticated),
        }
    }

    async fn subscribe_changes(&self, user_id: &UserId) -> RemoteResult<ChangeSubscription> {
        match self {
            Self::Rest(remote) => remote.subscribe_changes(user_id).await,
            Self::LocalOnly => Ok(ChangeSubscription::idle()),
        }
    }
}
