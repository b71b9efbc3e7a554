use quill_core::{ChangeNotifier, SyncStatus};

use crate::commands::common::{Context, EngineMode};
use crate::error::CliError;

/// Run the engine in the foreground: realtime changes, the backstop timer,
/// and a cycle on start. Returns after Ctrl-C once the running cycle ends.
pub async fn run_watch(ctx: &Context) -> Result<(), CliError> {
    let engine = ctx.open_engine(EngineMode::RequireSync)?;
    let mut status = engine.subscribe_status();
    let notifier = ChangeNotifier::spawn(engine.clone(), ctx.config.notifier_config());

    println!("Watching for changes (Ctrl-C to stop)");
    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                break;
            }
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *status.borrow_and_update();
                match current {
                    SyncStatus::Synced => {
                        let stats = engine.stats();
                        println!(
                            "Synced ({} pending, {} cycles)",
                            engine.queue_length()?,
                            stats.cycles_completed
                        );
                    }
                    SyncStatus::Incomplete => {
                        let reason = engine.stats().last_error.unwrap_or_default();
                        eprintln!("Sync incomplete: {reason}");
                    }
                    SyncStatus::Idle | SyncStatus::Syncing => {}
                }
            }
        }
    }

    notifier.shutdown().await;
    engine.wait_until_idle().await;
    Ok(())
}
