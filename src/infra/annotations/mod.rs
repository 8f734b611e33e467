#[cfg(test)]
pub mod in_memory;
pub mod sqlite_store;

#[cfg(test)]
pub use in_memory::InMemoryAnnotationStore;
pub use sqlite_store::SqliteAnnotationStore;
