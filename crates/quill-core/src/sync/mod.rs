//! Local-first synchronization between the note store and a remote store.

mod config;
mod engine;
pub mod merge;
mod status;


pub use config::{RetryPolicy, SyncSettings};
pub use engine::SyncEngine;
pub use status::{CycleReport, SyncOutcome, SyncPhase, SyncStats, SyncStatus};
