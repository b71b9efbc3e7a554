//! Data models for Quill

mod mutation;
mod note;
mod remote_note;

pub use mutation::{Mutation, MutationId, MutationKind, MutationPayload, NewMutation};
pub use note::{Note, NoteId, RemoteId, UserId};
pub use remote_note::{ChangeEvent, RemoteNote, UpsertAck};
