//! Libris DB - redb implementation of the persistence collaborator.

pub mod persistence;
pub mod tables;

pub use persistence::RedbPersistence;

use std::path::Path;
use std::sync::Arc;

use redb::Database;

use libris_core::StorageError;

/// Open (or create) a database file with all required tables.
pub fn init_database(path: impl AsRef<Path>) -> Result<Arc<Database>, StorageError> {
    let db = Database::create(path).map_err(|e| StorageError::Database(e.to_string()))?;

    RedbPersistence::init_tables(&db)?;

    Ok(Arc::new(db))
}
