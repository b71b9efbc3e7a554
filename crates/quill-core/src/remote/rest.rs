//! PostgREST-style remote store over HTTP.
//!
//! Talks to a `notes` table exposed at `<base_url>/rest/v1/notes` with row-level
//! security keyed on `user_id`. Real-time delivery needs a websocket channel
//! this adapter does not open, so its change subscription is idle and the
//! notifier's periodic timer keeps devices converging.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::{RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};

use super::{ChangeSubscription, RemoteError, RemoteResult, RemoteStore};
use crate::models::{Note, RemoteId, RemoteNote, UpsertAck, UserId};
use crate::util::{compact_text, is_http_url, normalize_text_option};

const NOTES_PATH: &str = "/rest/v1/notes";
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Connection settings for [`RestRemote`]
#[derive(Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    /// Project base URL, e.g. `https://project.supabase.co`
    pub base_url: String,
    /// Public API key sent as the `apikey` header
    pub api_key: String,
    /// Bearer token of the signed-in user
    pub access_token: Option<String>,
    /// Identity the access token belongs to
    pub user_id: Option<String>,
    /// Per-request timeout
    pub timeout: Duration,
}

impl std::fmt::Debug for RemoteConfig {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("RemoteConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("user_id", &self.user_id)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl RemoteConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            access_token: None,
            user_id: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Attach the signed-in user's session
    #[must_use]
    pub fn with_session(mut self, user_id: impl Into<String>, access_token: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self.access_token = Some(access_token.into());
        self
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Trim values and reject unusable settings
    pub fn validate(self) -> RemoteResult<Self> {
        let base_url = normalize_text_option(Some(self.base_url)).ok_or_else(|| {
            RemoteError::InvalidConfiguration("base URL must not be empty".to_string())
        })?;
        if !is_http_url(&base_url) {
            return Err(RemoteError::InvalidConfiguration(
                "base URL must include http:// or https://".to_string(),
            ));
        }
        let api_key = normalize_text_option(Some(self.api_key)).ok_or_else(|| {
            RemoteError::InvalidConfiguration("API key must not be empty".to_string())
        })?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            access_token: normalize_text_option(self.access_token),
            user_id: normalize_text_option(self.user_id),
            timeout: self.timeout,
        })
    }
}

/// HTTP adapter for a hosted notes table
#[derive(Clone)]
pub struct RestRemote {
    endpoint: String,
    api_key: String,
    session: Option<(UserId, String)>,
    client: reqwest::Client,
}

impl RestRemote {
    pub fn new(config: RemoteConfig) -> RemoteResult<Self> {
        let config = config.validate()?;
        let session = match (config.user_id, config.access_token) {
            (Some(user_id), Some(token)) => Some((UserId::new(user_id), token)),
            _ => None,
        };

        Ok(Self {
            endpoint: format!("{}{NOTES_PATH}", config.base_url),
            api_key: config.api_key,
            session,
            client: reqwest::Client::builder().timeout(config.timeout).build()?,
        })
    }

    fn authorized(&self, request: RequestBuilder) -> RemoteResult<RequestBuilder> {
        let (_, token) = self.session.as_ref().ok_or(RemoteError::Unauthenticated)?;
        Ok(request
            .header("apikey", &self.api_key)
            .bearer_auth(token)
            .header(reqwest::header::ACCEPT, "application/json"))
    }

    async fn send(&self, request: RequestBuilder) -> RemoteResult<reqwest::Response> {
        let response = self.authorized(request)?.send().await?;
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(RemoteError::Api {
            status: status.as_u16(),
            message: parse_api_error(status, &body),
        })
    }
}

#[derive(Debug, Serialize)]
struct NoteRowWrite<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<&'a str>,
    client_id: String,
    user_id: &'a str,
    title: &'a str,
    body: &'a str,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct NoteRow {
    id: String,
    #[serde(default)]
    client_id: Option<String>,
    user_id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    body: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl NoteRow {
    fn into_ack(self) -> UpsertAck {
        UpsertAck {
            remote_id: RemoteId::new(self.id),
            updated_at: self.updated_at,
        }
    }
}

impl From<NoteRow> for RemoteNote {
    fn from(row: NoteRow) -> Self {
        Self {
            remote_id: RemoteId::new(row.id),
            client_id: row.client_id.and_then(|raw| raw.parse().ok()),
            owner_id: UserId::new(row.user_id),
            title: row.title,
            body: row.body,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: Option<String>,
    error: Option<String>,
    hint: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return match payload.hint {
                Some(hint) => format!("{} (hint: {})", message.trim(), hint.trim()),
                None => message.trim().to_string(),
            };
        }
    }

    let trimmed = compact_text(body);
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        trimmed
    }
}

fn write_row<'a>(user_id: &'a UserId, note: &'a Note) -> NoteRowWrite<'a> {
    NoteRowWrite {
        id: note.remote_id.as_ref().map(RemoteId::as_str),
        client_id: note.id.as_str(),
        user_id: user_id.as_str(),
        title: &note.title,
        body: &note.body,
        created_at: note.created_at,
        updated_at: note.updated_at,
    }
}

impl RemoteStore for RestRemote {
    async fn current_user_id(&self) -> Option<UserId> {
        self.session.as_ref().map(|(user_id, _)| user_id.clone())
    }

    async fn upsert(&self, user_id: &UserId, note: &Note) -> RemoteResult<UpsertAck> {
        let row = write_row(user_id, note);

        if let Some(remote_id) = &note.remote_id {
            let request = self
                .client
                .patch(&self.endpoint)
                .query(&[("id", format!("eq.{remote_id}"))])
                .header("Prefer", "return=representation")
                .json(&row);
            let rows = self.send(request).await?.json::<Vec<NoteRow>>().await?;
            if let Some(updated) = rows.into_iter().next() {
                return Ok(updated.into_ack());
            }
            tracing::debug!("Remote record {} is gone, recreating it", remote_id);
        }

        let request = self
            .client
            .post(&self.endpoint)
            .query(&[("on_conflict", "client_id")])
            .header("Prefer", "resolution=merge-duplicates,return=representation")
            .json(&[row]);
        let rows = self.send(request).await?.json::<Vec<NoteRow>>().await?;
        rows.into_iter()
            .next()
            .map(NoteRow::into_ack)
            .ok_or_else(|| {
                RemoteError::InvalidPayload("upsert returned no representation".to_string())
            })
    }

    async fn delete(&self, remote_id: &RemoteId) -> RemoteResult<()> {
        let request = self
            .client
            .delete(&self.endpoint)
            .query(&[("id", format!("eq.{remote_id}"))]);
        self.send(request).await?;
        Ok(())
    }

    async fn list_notes(&self, user_id: &UserId, limit: usize) -> RemoteResult<Vec<RemoteNote>> {
        let request = self.client.get(&self.endpoint).query(&[
            ("select", "*".to_string()),
            ("user_id", format!("eq.{user_id}")),
            ("order", "updated_at.desc".to_string()),
            ("limit", limit.to_string()),
        ]);

        let rows = self.send(request).await?.json::<Vec<NoteRow>>().await?;
        Ok(rows.into_iter().map(RemoteNote::from).collect())
    }

    async fn subscribe_changes(&self, user_id: &UserId) -> RemoteResult<ChangeSubscription> {
        tracing::debug!(
            "REST remote has no push channel; changes for {} arrive by polling",
            user_id
        );
        Ok(ChangeSubscription::idle())
    }
}
