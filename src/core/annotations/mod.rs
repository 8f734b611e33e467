pub mod annotation_models;
pub mod annotation_service;
pub mod annotation_store;

pub use annotation_models::{ModNote, NewModNote, UserTag, WatchlistEntry};
pub use annotation_service::{NoteService, TagService, WatchlistService};
pub use annotation_store::AnnotationStore;
