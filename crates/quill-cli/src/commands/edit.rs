use crate::commands::common::{
    capture_editor_input_with_initial, join_content, normalize_content,
    normalize_note_identifier, resolve_note, split_content, Context, EngineMode,
};
use crate::error::CliError;

pub fn run_edit(id: &str, content_parts: &[String], ctx: &Context) -> Result<(), CliError> {
    let normalized_id = normalize_note_identifier(id)?;
    let engine = ctx.open_engine(EngineMode::Local)?;
    let mut note = resolve_note(&normalized_id, &engine)?;
    let current = join_content(&note);

    let edited_content = match normalize_content(&content_parts.join(" ")) {
        Some(content) => content,
        None => capture_editor_input_with_initial(&current)?.ok_or(CliError::EmptyEditedContent)?,
    };

    if edited_content == current {
        println!("{}", note.id);
        return Ok(());
    }

    let (title, body) = split_content(&edited_content);
    note.title = title;
    note.body = body;
    let updated = engine.save_note(note)?;
    println!("{}", updated.id);
    Ok(())
}
