use quill_core::Note;

use crate::commands::common::{resolve_note_content, split_content, Context, EngineMode};
use crate::error::CliError;

pub fn run_add(content_parts: &[String], ctx: &Context) -> Result<(), CliError> {
    let content = resolve_note_content(content_parts)?;
    let (title, body) = split_content(&content);

    let engine = ctx.open_engine(EngineMode::Local)?;
    let note = engine.save_note(Note::new(title, body))?;

    println!("{}", note.id);
    Ok(())
}
