use std::env;
use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use quill_core::db::{NoteStore, SqliteStore};
use quill_core::remote::RestRemote;
use quill_core::{Note, NoteId, SyncEngine};
use serde::Serialize;

use crate::config::CliConfig;
use crate::error::CliError;
use crate::remote::CliRemote;

pub type Engine = SyncEngine<CliRemote>;

/// How a command uses the engine
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineMode {
    /// Local edits only; cycles run when a sync command asks for them
    Local,
    /// Background sync enabled; fails when no remote is configured
    RequireSync,
}

pub struct Context {
    pub config: CliConfig,
    pub db_path: PathBuf,
}

impl Context {
    pub fn load(cli_db_path: Option<PathBuf>) -> Result<Self, CliError> {
        let config = CliConfig::load().map_err(CliError::Config)?;
        let db_path = config.resolve_db_path(cli_db_path);
        Ok(Self { config, db_path })
    }

    pub fn open_engine(&self, mode: EngineMode) -> Result<Arc<Engine>, CliError> {
        open_engine(&self.config, &self.db_path, mode)
    }
}

pub fn open_engine(
    config: &CliConfig,
    db_path: &Path,
    mode: EngineMode,
) -> Result<Arc<Engine>, CliError> {
    let remote = match config.remote_config().map_err(CliError::Config)? {
        Some(remote_config) => CliRemote::Rest(
            RestRemote::new(remote_config)
                .map_err(|error| CliError::Config(error.to_string()))?,
        ),
        None if mode == EngineMode::RequireSync => return Err(CliError::SyncNotConfigured),
        None => {
            tracing::debug!("Running in local-only mode (no remote config)");
            CliRemote::LocalOnly
        }
    };

    let store = SqliteStore::open(db_path)?;
    let engine = Arc::new(SyncEngine::new(store, remote, config.sync_settings()));
    if mode == EngineMode::Local {
        engine.on_connectivity_changed(false);
    }
    Ok(engine)
}

#[derive(Debug, Serialize)]
pub struct NoteListItem {
    pub id: String,
    pub title: String,
    pub preview: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub relative_time: String,
    pub synced: bool,
}

pub fn list_notes(engine: &Engine, limit: usize) -> Result<Vec<Note>, CliError> {
    Ok(engine.store().list_active(limit, 0)?)
}

pub fn resolve_note(note_query: &str, engine: &Engine) -> Result<Note, CliError> {
    if let Ok(note_id) = note_query.parse::<NoteId>() {
        if let Some(note) = engine.store().get(&note_id)?.filter(|note| !note.deleted) {
            return Ok(note);
        }
    }

    let mut matches = engine
        .store()
        .query_active()?
        .filter(|note| note.id.to_string().starts_with(note_query))
        .take(3)
        .collect::<Vec<_>>();

    match matches.len() {
        0 => Err(CliError::NoteNotFound(note_query.to_string())),
        1 => Ok(matches.remove(0)),
        _ => {
            let options = matches
                .iter()
                .map(|note| note.id.to_string().chars().take(13).collect::<String>())
                .collect::<Vec<_>>()
                .join(", ");

            Err(CliError::AmbiguousNoteId(format!(
                "ID prefix '{note_query}' is ambiguous; matches: {options}"
            )))
        }
    }
}

pub fn format_note_lines(notes: &[Note]) -> Vec<String> {
    let now = Utc::now();
    notes
        .iter()
        .map(|note| {
            let id = note.id.to_string();
            let short_id = id.chars().take(13).collect::<String>();
            let preview = note_preview(note, 40);
            let relative_time = format_relative_time(note.updated_at, now);
            let marker = if note.dirty { "*" } else { " " };

            format!("{short_id:<13} {marker} {preview:<40}  {relative_time}")
        })
        .collect()
}

pub fn note_to_list_item(note: &Note) -> NoteListItem {
    NoteListItem {
        id: note.id.to_string(),
        title: note.title.clone(),
        preview: note_preview(note, 80),
        body: note.body.clone(),
        created_at: note.created_at,
        updated_at: note.updated_at,
        relative_time: format_relative_time(note.updated_at, Utc::now()),
        synced: !note.dirty && note.remote_id.is_some(),
    }
}

pub fn note_preview(note: &Note, max_chars: usize) -> String {
    let collapsed = note
        .preview(usize::MAX)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    if collapsed.chars().count() <= max_chars {
        collapsed
    } else {
        let take_len = max_chars.saturating_sub(3);
        let mut truncated = collapsed.chars().take(take_len).collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

pub fn format_relative_time(timestamp: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let diff = (now - timestamp).num_seconds().max(0);
    let minute = 60;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}

/// Split raw text into a title (first line) and body (the rest)
pub fn split_content(content: &str) -> (String, String) {
    let mut parts = content.trim().splitn(2, '\n');
    let title = parts.next().unwrap_or("").trim().to_string();
    let body = parts.next().unwrap_or("").trim().to_string();
    (title, body)
}

/// Inverse of [`split_content`]
pub fn join_content(note: &Note) -> String {
    if note.body.is_empty() {
        note.title.clone()
    } else {
        format!("{}\n{}", note.title, note.body)
    }
}

pub fn resolve_note_content(content_parts: &[String]) -> Result<String, CliError> {
    if let Some(content) = normalize_content(&content_parts.join(" ")) {
        return Ok(content);
    }

    if let Some(content) = read_piped_stdin()? {
        return Ok(content);
    }

    if let Some(content) = capture_editor_input()? {
        return Ok(content);
    }

    Err(CliError::EmptyContent)
}

pub fn normalize_content(content: &str) -> Option<String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub fn normalize_note_identifier(id: &str) -> Result<String, CliError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptyNoteId)
    } else {
        Ok(trimmed.to_string())
    }
}

pub fn read_piped_stdin() -> Result<Option<String>, CliError> {
    let stdin = io::stdin();
    if stdin.is_terminal() {
        return Ok(None);
    }

    let mut buffer = String::new();
    stdin.lock().read_to_string(&mut buffer)?;
    Ok(normalize_content(&buffer))
}

pub fn capture_editor_input() -> Result<Option<String>, CliError> {
    capture_editor_input_with_initial("")
}

pub fn capture_editor_input_with_initial(
    initial_content: &str,
) -> Result<Option<String>, CliError> {
    let editor = preferred_editor();
    let temp_file = create_temp_note_file_path();
    std::fs::write(&temp_file, initial_content)?;

    let launch_result = launch_editor(&editor, &temp_file);
    let note_content = std::fs::read_to_string(&temp_file)?;
    let _ = std::fs::remove_file(&temp_file);

    launch_result?;
    Ok(normalize_content(&note_content))
}

pub fn launch_editor(editor: &str, file_path: &Path) -> Result<(), CliError> {
    let mut parts = editor.split_whitespace();
    let Some(program) = parts.next() else {
        return Err(CliError::EditorFailed("empty EDITOR command".into()));
    };

    let status = Command::new(program).args(parts).arg(file_path).status()?;
    if status.success() {
        Ok(())
    } else {
        Err(CliError::EditorFailed(format!(
            "`{editor}` exited with status {status}"
        )))
    }
}

pub fn preferred_editor() -> String {
    env::var("VISUAL")
        .or_else(|_| env::var("EDITOR"))
        .unwrap_or_else(|_| default_editor().to_string())
}

pub const fn default_editor() -> &'static str {
    if cfg!(windows) {
        "notepad"
    } else {
        "vi"
    }
}

pub fn create_temp_note_file_path() -> PathBuf {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_nanos());
    env::temp_dir().join(format!("quill-note-{}-{now}.md", std::process::id()))
}
