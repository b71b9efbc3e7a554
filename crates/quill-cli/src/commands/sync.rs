use quill_core::RetryPolicy;

use crate::commands::common::{Context, EngineMode};
use crate::error::CliError;

pub async fn run_sync(retries: u32, ctx: &Context) -> Result<(), CliError> {
    let engine = ctx.open_engine(EngineMode::RequireSync)?;
    let report = engine.sync_with_retry(&RetryPolicy::new(retries)).await?;
    println!(
        "Sync completed: {} pushed, {} merged, {} removed, {} unchanged",
        report.pushed, report.merged, report.removed, report.skipped
    );
    Ok(())
}
