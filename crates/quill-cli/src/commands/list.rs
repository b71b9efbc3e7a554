use crate::commands::common::{
    format_note_lines, list_notes, note_to_list_item, Context, EngineMode, NoteListItem,
};
use crate::error::CliError;

pub fn run_list(limit: usize, as_json: bool, ctx: &Context) -> Result<(), CliError> {
    let engine = ctx.open_engine(EngineMode::Local)?;
    let notes = list_notes(&engine, limit)?;

    if as_json {
        let json_items = notes
            .iter()
            .map(note_to_list_item)
            .collect::<Vec<NoteListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
    } else if notes.is_empty() {
        println!("No notes yet.");
    } else {
        for line in format_note_lines(&notes) {
            println!("{line}");
        }
    }

    Ok(())
}
