//! quill-core - Core library for Quill
//!
//! Local-first note storage and the sync engine that reconciles it with a
//! remote multi-device store. Hosts (the CLI, or any other front end) edit
//! notes through [`SyncEngine`] and feed it host events through
//! [`ChangeNotifier`].

pub mod db;
pub mod error;
pub mod models;
pub mod notifier;
pub mod remote;
pub mod sync;
pub mod util;

pub use error::{Error, Result};
pub use models::{Note, NoteId};
pub use notifier::{ChangeNotifier, HostSignal, NotifierConfig, NotifierHandle};
pub use sync::{RetryPolicy, SyncEngine, SyncSettings, SyncStatus};
