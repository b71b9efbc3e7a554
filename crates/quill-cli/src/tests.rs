use std::path::Path;

use chrono::{Duration, TimeZone, Utc};
use pretty_assertions::assert_eq;
use quill_core::db::{MutationQueue, NoteStore};
use quill_core::Note;
use tempfile::TempDir;

use crate::commands::add::run_add;
use crate::commands::common::{
    default_editor, format_relative_time, join_content, list_notes, normalize_content,
    normalize_note_identifier, note_preview, open_engine, resolve_note, split_content, Context,
    EngineMode,
};
use crate::commands::delete::run_delete;
use crate::commands::edit::run_edit;
use crate::commands::status::collect_status;
use crate::commands::sync::run_sync;
use crate::config::{
    CliConfig, ENV_ACCESS_TOKEN, ENV_API_KEY, ENV_DB_PATH, ENV_REMOTE_URL, ENV_USER_ID,
};
use crate::error::CliError;

fn test_context(dir: &TempDir) -> Context {
    Context {
        config: CliConfig::default(),
        db_path: dir.path().join("quill.db"),
    }
}

fn note_with_id(id: &str, title: &str) -> Note {
    let mut note = Note::new(title, "");
    note.id = id.parse().unwrap();
    note
}

fn seed(ctx: &Context, notes: &[Note]) {
    let engine = ctx.open_engine(EngineMode::Local).unwrap();
    for note in notes {
        engine.store().put(note).unwrap();
    }
}

#[test]
fn normalize_content_trims_and_rejects_empty() {
    assert_eq!(normalize_content("  hello  "), Some("hello".to_string()));
    assert_eq!(normalize_content(" \n\t "), None);
}

#[test]
fn normalize_content_keeps_multiline_text() {
    assert_eq!(
        normalize_content("line 1\nline 2\n"),
        Some("line 1\nline 2".to_string())
    );
}

#[test]
fn default_editor_is_defined() {
    assert!(!default_editor().is_empty());
}

#[test]
fn normalize_note_identifier_rejects_empty() {
    assert!(matches!(
        normalize_note_identifier("   "),
        Err(CliError::EmptyNoteId)
    ));
    assert_eq!(normalize_note_identifier(" abc ").unwrap(), "abc");
}

#[test]
fn split_content_uses_first_line_as_title() {
    assert_eq!(
        split_content("  Groceries\nmilk\neggs \n"),
        ("Groceries".to_string(), "milk\neggs".to_string())
    );
    assert_eq!(
        split_content("just a title"),
        ("just a title".to_string(), String::new())
    );
}

#[test]
fn join_content_restores_split_text() {
    let note = Note::new("Groceries", "milk\neggs");
    assert_eq!(join_content(&note), "Groceries\nmilk\neggs");
    assert_eq!(join_content(&Note::new("solo", "")), "solo");
}

#[test]
fn format_relative_time_units() {
    let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
    assert_eq!(format_relative_time(now - Duration::seconds(30), now), "just now");
    assert_eq!(format_relative_time(now - Duration::minutes(2), now), "2m ago");
    assert_eq!(format_relative_time(now - Duration::hours(2), now), "2h ago");
    assert_eq!(format_relative_time(now - Duration::days(3), now), "3d ago");
    assert_eq!(format_relative_time(now + Duration::hours(1), now), "just now");
}

#[test]
fn note_preview_truncates_with_ellipsis() {
    let note = Note::new("This is a very long sentence that should be shortened", "");
    assert_eq!(note_preview(&note, 20), "This is a very lo...");
}

#[test]
fn note_preview_falls_back_to_body() {
    let note = Note::new("  ", "first line\nsecond line");
    assert_eq!(note_preview(&note, 40), "first line");
}

#[test]
fn resolve_note_supports_exact_and_prefix_id() {
    let dir = TempDir::new().unwrap();
    let ctx = test_context(&dir);
    seed(
        &ctx,
        &[
            note_with_id("11111111-1111-4111-8111-111111111111", "Note A"),
            note_with_id("11111111-1111-4111-8111-222222222222", "Note B"),
        ],
    );

    let engine = ctx.open_engine(EngineMode::Local).unwrap();
    let by_exact = resolve_note("11111111-1111-4111-8111-111111111111", &engine).unwrap();
    assert_eq!(by_exact.title, "Note A");

    let by_prefix = resolve_note("11111111-1111-4111-8111-2", &engine).unwrap();
    assert_eq!(by_prefix.title, "Note B");
}

#[test]
fn resolve_note_rejects_ambiguous_prefix() {
    let dir = TempDir::new().unwrap();
    let ctx = test_context(&dir);
    seed(
        &ctx,
        &[
            note_with_id("aaaaaaaa-aaaa-4aaa-8aaa-aaaaaaaaaaaa", "Left"),
            note_with_id("aaaaaaaa-aaaa-4aaa-8aaa-bbbbbbbbbbbb", "Right"),
        ],
    );

    let engine = ctx.open_engine(EngineMode::Local).unwrap();
    let error = resolve_note("aaaaaaaa-aaaa-4aaa-8aaa", &engine).unwrap_err();
    assert!(matches!(error, CliError::AmbiguousNoteId(_)));
}

#[test]
fn resolve_note_rejects_missing_note() {
    let dir = TempDir::new().unwrap();
    let engine = test_context(&dir).open_engine(EngineMode::Local).unwrap();

    let error = resolve_note("does-not-exist", &engine).unwrap_err();
    assert!(matches!(error, CliError::NoteNotFound(_)));
}

#[test]
fn add_edit_and_delete_queue_mutations_while_local_only() {
    let dir = TempDir::new().unwrap();
    let ctx = test_context(&dir);

    run_add(&["Groceries\nmilk".to_string()], &ctx).unwrap();
    let engine = ctx.open_engine(EngineMode::Local).unwrap();
    let note = list_notes(&engine, 10).unwrap().remove(0);
    assert_eq!(note.title, "Groceries");
    assert_eq!(note.body, "milk");
    assert!(note.dirty);

    let prefix = note.id.to_string()[..8].to_string();
    run_edit(&prefix, &["Groceries\nmilk, eggs".to_string()], &ctx).unwrap();
    let edited = engine.store().get(&note.id).unwrap().unwrap();
    assert_eq!(edited.body, "milk, eggs");
    assert!(edited.updated_at > note.updated_at);

    run_delete(&prefix, &ctx).unwrap();
    assert!(list_notes(&engine, 10).unwrap().is_empty());
    assert!(engine.store().get(&note.id).unwrap().unwrap().deleted);
    assert_eq!(engine.store().queue_len().unwrap(), 3);
}

#[test]
fn delete_leaves_other_notes_untouched() {
    let dir = TempDir::new().unwrap();
    let ctx = test_context(&dir);
    let keep = note_with_id("bbbbbbbb-bbbb-4bbb-8bbb-111111111111", "Keep me");
    let doomed = note_with_id("bbbbbbbb-bbbb-4bbb-8bbb-222222222222", "Delete me");
    seed(&ctx, &[keep.clone(), doomed.clone()]);

    run_delete("bbbbbbbb-bbbb-4bbb-8bbb-2", &ctx).unwrap();

    let engine = ctx.open_engine(EngineMode::Local).unwrap();
    let titles = list_notes(&engine, 10)
        .unwrap()
        .into_iter()
        .map(|note| note.title)
        .collect::<Vec<_>>();
    assert_eq!(titles, vec!["Keep me".to_string()]);
}

#[tokio::test]
async fn run_sync_requires_remote_configuration() {
    let dir = TempDir::new().unwrap();
    let ctx = test_context(&dir);

    let error = run_sync(3, &ctx).await.unwrap_err();
    assert!(matches!(error, CliError::SyncNotConfigured));
}

#[tokio::test]
async fn status_reports_counts_in_local_only_mode() {
    let dir = TempDir::new().unwrap();
    let ctx = test_context(&dir);
    run_add(&["first".to_string()], &ctx).unwrap();
    run_add(&["second".to_string()], &ctx).unwrap();

    let report = collect_status(&ctx).await.unwrap();
    assert_eq!(report.active_notes, 2);
    assert_eq!(report.queued_mutations, 2);
    assert!(!report.remote_configured);
    assert_eq!(report.user_id, None);
}

#[test]
fn apply_env_overrides_file_values() {
    let mut config = CliConfig {
        remote_url: Some("https://file.example.com".to_string()),
        ..CliConfig::default()
    };

    config.apply_env(|key| match key {
        ENV_DB_PATH => Some("/tmp/quill-env.db".to_string()),
        ENV_REMOTE_URL => Some(" https://env.example.com ".to_string()),
        ENV_API_KEY => Some("anon-key".to_string()),
        ENV_ACCESS_TOKEN => Some("token".to_string()),
        ENV_USER_ID => Some("   ".to_string()),
        _ => None,
    });

    assert_eq!(config.db_path.as_deref(), Some(Path::new("/tmp/quill-env.db")));
    assert_eq!(config.remote_url.as_deref(), Some("https://env.example.com"));
    assert_eq!(config.api_key.as_deref(), Some("anon-key"));
    assert_eq!(config.access_token.as_deref(), Some("token"));
    assert_eq!(config.user_id, None);
}

#[test]
fn load_from_path_reads_and_normalizes_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(
        &path,
        r#"{
            "remote_url": "https://notes.example.com/",
            "api_key": "  key  ",
            "sync": { "cooldown_secs": 5, "tick_interval_secs": 120 }
        }"#,
    )
    .unwrap();

    let config = CliConfig::load_from_path(&path).unwrap();
    assert_eq!(config.version, 1);
    assert_eq!(config.remote_url.as_deref(), Some("https://notes.example.com"));
    assert_eq!(config.api_key.as_deref(), Some("key"));
    assert_eq!(
        config.sync_settings().cooldown,
        std::time::Duration::from_secs(5)
    );
    assert_eq!(
        config.notifier_config().tick_interval,
        std::time::Duration::from_secs(120)
    );
}

#[test]
fn load_from_path_defaults_when_missing_and_rejects_garbage() {
    let dir = TempDir::new().unwrap();
    let missing = CliConfig::load_from_path(&dir.path().join("absent.json")).unwrap();
    assert_eq!(missing, CliConfig::default());

    let broken = dir.path().join("broken.json");
    std::fs::write(&broken, "{ not json").unwrap();
    assert!(CliConfig::load_from_path(&broken).is_err());
}

#[test]
fn remote_config_requires_url_and_key() {
    let mut config = CliConfig::default();
    assert!(config.remote_config().unwrap().is_none());

    config.remote_url = Some("notes.example.com".to_string());
    config.api_key = Some("key".to_string());
    assert!(config.remote_config().is_err());

    config.remote_url = Some("https://notes.example.com".to_string());
    assert!(config.remote_config().unwrap().is_some());
}

#[test]
fn configured_remote_without_session_has_no_user() {
    let dir = TempDir::new().unwrap();
    let config = CliConfig {
        remote_url: Some("https://notes.example.com".to_string()),
        api_key: Some("key".to_string()),
        ..CliConfig::default()
    };

    let engine = open_engine(&config, &dir.path().join("quill.db"), EngineMode::Local).unwrap();
    assert!(engine.remote().is_configured());
    assert!(!engine.is_online());
}
