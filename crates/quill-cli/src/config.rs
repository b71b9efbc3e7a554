//! Persistent CLI configuration with environment overrides.

use std::path::{Path, PathBuf};
use std::time::Duration;

use quill_core::remote::RemoteConfig;
use quill_core::util::{is_http_url, normalize_text_option};
use quill_core::{NotifierConfig, SyncSettings};
use serde::{Deserialize, Serialize};

const CONFIG_FILE_NAME: &str = "config.json";

pub const ENV_DB_PATH: &str = "QUILL_DB_PATH";
pub const ENV_REMOTE_URL: &str = "QUILL_REMOTE_URL";
pub const ENV_API_KEY: &str = "QUILL_API_KEY";
pub const ENV_ACCESS_TOKEN: &str = "QUILL_ACCESS_TOKEN";
pub const ENV_USER_ID: &str = "QUILL_USER_ID";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CliConfig {
    #[serde(default = "default_config_version")]
    pub version: u32,
    #[serde(default)]
    pub db_path: Option<PathBuf>,
    #[serde(default)]
    pub remote_url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub sync: SyncOptions,
}

/// Engine tunables; unset values keep the engine defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncOptions {
    #[serde(default)]
    pub cooldown_secs: Option<u64>,
    #[serde(default)]
    pub push_batch_size: Option<usize>,
    #[serde(default)]
    pub pull_page_size: Option<usize>,
    #[serde(default)]
    pub tick_interval_secs: Option<u64>,
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

const fn default_config_version() -> u32 {
    1
}

pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("quill")
        .join(CONFIG_FILE_NAME)
}

impl CliConfig {
    /// Load the config file and apply environment overrides
    pub fn load() -> Result<Self, String> {
        let mut config = Self::load_from_path(&default_config_path())?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn load_from_path(path: &Path) -> Result<Self, String> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)
            .map_err(|error| format!("Failed to read config at {}: {}", path.display(), error))?;
        let mut config = serde_json::from_str::<Self>(&raw)
            .map_err(|error| format!("Failed to parse config at {}: {}", path.display(), error))?;
        config.normalize();
        Ok(config)
    }

    /// Override file values with whatever `lookup` finds
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = normalize_text_option(lookup(ENV_DB_PATH)) {
            self.db_path = Some(PathBuf::from(path));
        }
        if let Some(url) = normalize_text_option(lookup(ENV_REMOTE_URL)) {
            self.remote_url = Some(url);
        }
        if let Some(key) = normalize_text_option(lookup(ENV_API_KEY)) {
            self.api_key = Some(key);
        }
        if let Some(token) = normalize_text_option(lookup(ENV_ACCESS_TOKEN)) {
            self.access_token = Some(token);
        }
        if let Some(user_id) = normalize_text_option(lookup(ENV_USER_ID)) {
            self.user_id = Some(user_id);
        }
    }

    fn normalize(&mut self) {
        self.remote_url = normalize_text_option(self.remote_url.take())
            .map(|url| url.trim_end_matches('/').to_string());
        self.api_key = normalize_text_option(self.api_key.take());
        self.access_token = normalize_text_option(self.access_token.take());
        self.user_id = normalize_text_option(self.user_id.take());
    }

    /// Database path: explicit flag, then config/env, then the data directory
    pub fn resolve_db_path(&self, cli_db_path: Option<PathBuf>) -> PathBuf {
        cli_db_path
            .or_else(|| self.db_path.clone())
            .unwrap_or_else(default_db_path)
    }

    /// Remote settings, or `None` when the CLI runs local-only
    pub fn remote_config(&self) -> Result<Option<RemoteConfig>, String> {
        let (Some(url), Some(api_key)) = (self.remote_url.as_deref(), self.api_key.as_deref())
        else {
            return Ok(None);
        };
        if !is_http_url(url) {
            return Err(format!("remote URL must include http:// or https://: {url}"));
        }

        let mut config = RemoteConfig::new(url, api_key);
        if let (Some(user_id), Some(token)) = (&self.user_id, &self.access_token) {
            config = config.with_session(user_id, token);
        }
        if let Some(seconds) = self.sync.request_timeout_secs {
            config = config.with_timeout(Duration::from_secs(seconds));
        }
        Ok(Some(config))
    }

    pub fn sync_settings(&self) -> SyncSettings {
        let mut settings = SyncSettings::default();
        if let Some(seconds) = self.sync.cooldown_secs {
            settings = settings.with_cooldown(Duration::from_secs(seconds));
        }
        if let Some(size) = self.sync.push_batch_size {
            settings = settings.with_push_batch_size(size);
        }
        if let Some(size) = self.sync.pull_page_size {
            settings = settings.with_pull_page_size(size);
        }
        settings
    }

    pub fn notifier_config(&self) -> NotifierConfig {
        let mut config = NotifierConfig::default();
        if let Some(seconds) = self.sync.tick_interval_secs.filter(|seconds| *seconds > 0) {
            config.tick_interval = Duration::from_secs(seconds);
        }
        config
    }
}

pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("quill")
        .join("quill.db")
}
