//! flowindex-storage — storage backends for FlowIndex.
//!
//! Backends:
//! - [`memory`] — checkpoints in RAM; streams live in
//!   [`flowindex_core::InMemoryStreamStore`]
//! - [`sqlite`] — SQLite via `sqlx` (single-file persistence of streams,
//!   revisions and checkpoints)

#[cfg(feature = "memory")]
pub mod memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use flowindex_core::InMemoryStreamStore;
#[cfg(feature = "memory")]
pub use memory::InMemoryCheckpointStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStreamStore;
