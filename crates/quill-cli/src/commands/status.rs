use quill_core::db::NoteStore;
use quill_core::remote::RemoteStore;
use serde::Serialize;

use crate::commands::common::{Context, EngineMode};
use crate::error::CliError;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub db_path: String,
    pub active_notes: usize,
    pub queued_mutations: usize,
    pub remote_configured: bool,
    pub user_id: Option<String>,
}

pub async fn collect_status(ctx: &Context) -> Result<StatusReport, CliError> {
    let engine = ctx.open_engine(EngineMode::Local)?;
    let active_notes = engine.store().query_active()?.count();
    let queued_mutations = engine.queue_length()?;
    let user_id = engine
        .remote()
        .current_user_id()
        .await
        .map(|user| user.as_str().to_string());

    Ok(StatusReport {
        db_path: ctx.db_path.display().to_string(),
        active_notes,
        queued_mutations,
        remote_configured: engine.remote().is_configured(),
        user_id,
    })
}

pub async fn run_status(as_json: bool, ctx: &Context) -> Result<(), CliError> {
    let report = collect_status(ctx).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Database:        {}", report.db_path);
    println!("Active notes:    {}", report.active_notes);
    println!("Pending changes: {}", report.queued_mutations);
    match (report.remote_configured, report.user_id.as_deref()) {
        (false, _) => println!("Remote:          not configured (local-only)"),
        (true, None) => println!("Remote:          configured, not signed in"),
        (true, Some(user)) => println!("Remote:          signed in as {user}"),
    }
    Ok(())
}
