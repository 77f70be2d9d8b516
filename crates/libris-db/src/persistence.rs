use std::sync::Arc;

use redb::{Database, ReadableTable};
use serde_json::Value;

use libris_core::{Persistence, StorageError, WriteOp};

use crate::tables::RECORDS_TABLE;

fn db_error(e: impl std::fmt::Display) -> StorageError {
    StorageError::Database(e.to_string())
}

/// redb implementation of Persistence.
///
/// Every write runs in its own write transaction, so an `apply` batch is
/// committed as a whole or not at all.
pub struct RedbPersistence {
    db: Arc<Database>,
}

impl RedbPersistence {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Initialize the database tables.
    pub fn init_tables(db: &Database) -> Result<(), StorageError> {
        let write_txn = db.begin_write().map_err(db_error)?;
        {
            let _ = write_txn.open_table(RECORDS_TABLE).map_err(db_error)?;
        }
        write_txn.commit().map_err(db_error)?;
        Ok(())
    }

    /// Names of every stored table.
    #[cfg(test)]
    fn keys(&self) -> Result<Vec<String>, StorageError> {
        let read_txn = self.db.begin_read().map_err(db_error)?;
        let table = read_txn.open_table(RECORDS_TABLE).map_err(db_error)?;

        let mut keys = Vec::new();
        for entry in table.iter().map_err(db_error)? {
            let (key, _) = entry.map_err(db_error)?;
            keys.push(key.value().to_string());
        }
        Ok(keys)
    }
}

impl Persistence for RedbPersistence {
    fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        let read_txn = self.db.begin_read().map_err(db_error)?;
        let table = read_txn.open_table(RECORDS_TABLE).map_err(db_error)?;

        match table.get(key).map_err(db_error)? {
            Some(value) => {
                let decoded = serde_json::from_slice(value.value()).map_err(|e| {
                    tracing::error!("Corrupt value stored under {}: {}", key, e);
                    db_error(e)
                })?;
                Ok(Some(decoded))
            }
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        self.apply(vec![WriteOp::Set(key.to_string(), value)])
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.apply(vec![WriteOp::Remove(key.to_string())])
    }

    fn clear(&self) -> Result<(), StorageError> {
        let write_txn = self.db.begin_write().map_err(db_error)?;
        write_txn.delete_table(RECORDS_TABLE).map_err(db_error)?;
        {
            let _ = write_txn.open_table(RECORDS_TABLE).map_err(db_error)?;
        }
        write_txn.commit().map_err(db_error)?;

        tracing::warn!("Cleared all library data");
        Ok(())
    }

    fn apply(&self, batch: Vec<WriteOp>) -> Result<(), StorageError> {
        let write_txn = self.db.begin_write().map_err(db_error)?;
        {
            let mut table = write_txn.open_table(RECORDS_TABLE).map_err(db_error)?;

            for op in &batch {
                match op {
                    WriteOp::Set(key, value) => {
                        let bytes = serde_json::to_vec(value).map_err(db_error)?;
                        table
                            .insert(key.as_str(), bytes.as_slice())
                            .map_err(db_error)?;
                    }
                    WriteOp::Remove(key) => {
                        table.remove(key.as_str()).map_err(db_error)?;
                    }
                }
            }
        }
        write_txn.commit().map_err(db_error)?;

        tracing::debug!("Committed batch of {} writes", batch.len());
        Ok(())
    }
}
