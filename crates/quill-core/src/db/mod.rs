//! Local store for Quill: notes and the mutation log in `SQLite`

mod connection;
mod migrations;
mod mutation_queue;
mod repository;
mod store;

pub use connection::Database;
pub use mutation_queue::MutationQueue;
pub use repository::{ActiveNotes, NoteStore};
pub use store::SqliteStore;
