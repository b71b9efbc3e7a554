use crate::commands::common::{normalize_note_identifier, resolve_note, Context, EngineMode};
use crate::error::CliError;

pub fn run_delete(id: &str, ctx: &Context) -> Result<(), CliError> {
    let normalized_id = normalize_note_identifier(id)?;
    let engine = ctx.open_engine(EngineMode::Local)?;
    let note = resolve_note(&normalized_id, &engine)?;

    engine.delete_note(&note)?;
    println!("{}", note.id);
    Ok(())
}
