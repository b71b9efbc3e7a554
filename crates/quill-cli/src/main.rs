//! Quill CLI - capture notes from the terminal and sync them across devices

mod cli;
mod commands;
mod config;
mod error;
mod remote;
#[cfg(test)]
mod tests;

use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::commands::add::run_add;
use crate::commands::common::Context;
use crate::commands::delete::run_delete;
use crate::commands::edit::run_edit;
use crate::commands::list::run_list;
use crate::commands::status::run_status;
use crate::commands::sync::run_sync;
use crate::commands::watch::run_watch;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("quill_core=info,quill=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let ctx = Context::load(cli.db_path)?;

    match cli.command {
        Some(Commands::Add { content }) => run_add(&content, &ctx)?,
        Some(Commands::List { limit, json }) => run_list(limit, json, &ctx)?,
        Some(Commands::Edit { id, content }) => run_edit(&id, &content, &ctx)?,
        Some(Commands::Delete { id }) => run_delete(&id, &ctx)?,
        Some(Commands::Sync { retries }) => run_sync(retries, &ctx).await?,
        Some(Commands::Status { json }) => run_status(json, &ctx).await?,
        Some(Commands::Watch) => run_watch(&ctx).await?,
        None => {
            // Quick capture mode: quill "my thought"
            if cli.note.is_empty() {
                Cli::command().print_help().map_err(CliError::Io)?;
                println!();
            } else {
                run_add(&cli.note, &ctx)?;
            }
        }
    }

    Ok(())
}
