//! Local snapshot persistence
//!
//! The snapshot is written wholesale by a refresh and read through simple point
//! and indexed lookups afterwards. A lookup that finds nothing is not an error:
//! it returns `None` or an empty list and the caller picks a fallback.

use thiserror::Error;

use crate::artifacts::{ArtifactKind, Assignment};

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Errors raised by the storage layer itself (never by a missing row)
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Unable to create cache directory {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Read access to a snapshot
pub trait SnapshotReader {
    /// Look up a group ID by display name. When several groups share the
    /// name, the lowest ID wins.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the underlying store cannot be queried.
    fn group_id_by_name(&self, name: &str) -> Result<Option<String>, StoreError>;

    /// # Errors
    ///
    /// Returns `StoreError` if the underlying store cannot be queried.
    fn group_name(&self, group_id: &str) -> Result<Option<String>, StoreError>;

    /// Groups that directly contain `child_id`, ordered by ID.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the underlying store cannot be queried.
    fn parents_of(&self, child_id: &str) -> Result<Vec<String>, StoreError>;

    /// Groups directly contained in `parent_id`, ordered by ID.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the underlying store cannot be queried.
    fn children_of(&self, parent_id: &str) -> Result<Vec<String>, StoreError>;

    /// # Errors
    ///
    /// Returns `StoreError` if the underlying store cannot be queried.
    fn artifact_name(
        &self,
        kind: ArtifactKind,
        artifact_id: &str,
    ) -> Result<Option<String>, StoreError>;

    /// Assignment edges of `kind` that target `group_id`, in storage order.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the underlying store cannot be queried.
    fn assignments_to(
        &self,
        kind: ArtifactKind,
        group_id: &str,
    ) -> Result<Vec<Assignment>, StoreError>;
}
