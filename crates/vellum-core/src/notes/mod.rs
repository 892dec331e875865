//! Encrypted notes: data types and the repository.
//!
//! The metadata/blob split keeps every byte of note text end-to-end
//! encrypted while the structural fields the backend needs (ids, paths,
//! versions, digests, tags) stay queryable. Titles are part of the text:
//! metadata carries a fixed placeholder and the real title travels inside
//! the blob.

pub mod repository;
pub mod types;

pub use repository::{NoteRepository, RepositoryConfig};
pub use types::{
    NewNote, Note, NoteBatch, NoteFailure, NotePlaintext, NoteRecord, NoteUpdate,
    PasswordChangeReport, RecordPatch, REDACTED_TITLE,
};
