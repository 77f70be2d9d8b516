use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::StorageError;
use crate::models::tables;

/// A record that lives in one named table and is addressed by a string key.
pub trait Record: Serialize + DeserializeOwned + Clone + Send + 'static {
    /// Name of the table (persistence key) holding this record type.
    const TABLE: &'static str;

    fn key(&self) -> &str;
}

/// A single write in an atomic batch.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    Set(String, Value),
    Remove(String),
}

/// Key/value persistence collaborator.
///
/// Each table name is a key whose value is a JSON array of records.
pub trait Persistence: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Value>, StorageError>;

    fn set(&self, key: &str, value: Value) -> Result<(), StorageError>;

    fn remove(&self, key: &str) -> Result<(), StorageError>;

    fn clear(&self) -> Result<(), StorageError>;

    /// Apply every write in the batch, or none of them.
    fn apply(&self, batch: Vec<WriteOp>) -> Result<(), StorageError>;
}

/// Typed table storage over a [`Persistence`] backend.
///
/// Reads always re-fetch the whole table. All writes go through a
/// [`UnitOfWork`], which holds the store-wide write lock until it is
/// committed or dropped.
pub struct RecordStore {
    persistence: Arc<dyn Persistence>,
    writer: Mutex<()>,
}

impl RecordStore {
    pub fn new(persistence: Arc<dyn Persistence>) -> Self {
        Self {
            persistence,
            writer: Mutex::new(()),
        }
    }

    /// Make sure every known table exists, creating empty ones as needed.
    pub fn init(&self) -> Result<(), StorageError> {
        let _guard = self.writer.lock();
        let mut batch = Vec::new();
        for table in tables::ALL {
            if self.persistence.get(table)?.is_none() {
                batch.push(WriteOp::Set(table.to_string(), Value::Array(Vec::new())));
            }
        }
        if !batch.is_empty() {
            tracing::info!("Creating {} empty tables", batch.len());
            self.persistence.apply(batch)?;
        }
        Ok(())
    }

    pub fn all<R: Record>(&self) -> Result<Vec<R>, StorageError> {
        load_table(self.persistence.as_ref())
    }

    pub fn get<R: Record>(&self, id: &str) -> Result<Option<R>, StorageError> {
        Ok(self.all::<R>()?.into_iter().find(|r| r.key() == id))
    }

    pub fn query<R: Record>(&self, pred: impl Fn(&R) -> bool) -> Result<Vec<R>, StorageError> {
        Ok(self.all::<R>()?.into_iter().filter(|r| pred(r)).collect())
    }

    pub fn insert<R: Record>(&self, record: R) -> Result<(), StorageError> {
        let mut uow = self.begin();
        uow.insert(record)?;
        uow.commit()
    }

    /// Read-modify-write a single record under the write lock.
    /// Returns the updated record, or `None` if no record has that key.
    pub fn update<R: Record>(
        &self,
        id: &str,
        mutate: impl FnOnce(&mut R),
    ) -> Result<Option<R>, StorageError> {
        let mut uow = self.begin();
        let updated = uow.update(id, mutate)?;
        uow.commit()?;
        Ok(updated)
    }

    pub fn delete<R: Record>(&self, id: &str) -> Result<bool, StorageError> {
        let mut uow = self.begin();
        let removed = uow.delete::<R>(id)?;
        uow.commit()?;
        Ok(removed)
    }

    /// Start a unit of work. Blocks until no other unit of work is open.
    pub fn begin(&self) -> UnitOfWork<'_> {
        UnitOfWork {
            persistence: self.persistence.as_ref(),
            tables: HashMap::new(),
            _guard: self.writer.lock(),
        }
    }

    pub fn clear(&self) -> Result<(), StorageError> {
        let _guard = self.writer.lock();
        self.persistence.clear()
    }
}

fn load_table<R: Record>(persistence: &dyn Persistence) -> Result<Vec<R>, StorageError> {
    match persistence.get(R::TABLE)? {
        Some(value) => serde_json::from_value(value)
            .map_err(|e| StorageError::Serialization(R::TABLE, e.to_string())),
        None => Ok(Vec::new()),
    }
}

/// Log a failed read and degrade to an empty result.
pub(crate) fn or_empty<T: Default>(result: Result<T, StorageError>, table: &str) -> T {
    result.unwrap_or_else(|e| {
        tracing::error!("Failed to read {}: {}", table, e);
        T::default()
    })
}

trait StagedTable: Send {
    /// Encoded table contents, or `None` if nothing changed.
    fn encode(&self) -> Result<Option<Value>, StorageError>;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

struct Staged<R> {
    rows: Vec<R>,
    dirty: bool,
}

impl<R: Record> StagedTable for Staged<R> {
    fn encode(&self) -> Result<Option<Value>, StorageError> {
        if !self.dirty {
            return Ok(None);
        }
        serde_json::to_value(&self.rows)
            .map(Some)
            .map_err(|e| StorageError::Serialization(R::TABLE, e.to_string()))
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// A set of staged table writes that commit together.
///
/// Tables are loaded on first touch and kept in memory; nothing reaches the
/// persistence backend until [`UnitOfWork::commit`]. Dropping the unit of
/// work without committing discards every staged change.
pub struct UnitOfWork<'a> {
    persistence: &'a dyn Persistence,
    tables: HashMap<&'static str, Box<dyn StagedTable>>,
    _guard: MutexGuard<'a, ()>,
}

impl UnitOfWork<'_> {
    fn staged<R: Record>(&mut self) -> Result<&mut Staged<R>, StorageError> {
        if !self.tables.contains_key(R::TABLE) {
            let rows = load_table::<R>(self.persistence)?;
            self.tables
                .insert(R::TABLE, Box::new(Staged { rows, dirty: false }));
        }
        self.tables
            .get_mut(R::TABLE)
            .and_then(|t| t.as_any_mut().downcast_mut::<Staged<R>>())
            .ok_or_else(|| {
                StorageError::Serialization(R::TABLE, "table staged as another type".to_string())
            })
    }

    pub fn all<R: Record>(&mut self) -> Result<Vec<R>, StorageError> {
        Ok(self.staged::<R>()?.rows.clone())
    }

    pub fn get<R: Record>(&mut self, id: &str) -> Result<Option<R>, StorageError> {
        Ok(self
            .staged::<R>()?
            .rows
            .iter()
            .find(|r| r.key() == id)
            .cloned())
    }

    pub fn query<R: Record>(&mut self, pred: impl Fn(&R) -> bool) -> Result<Vec<R>, StorageError> {
        Ok(self
            .staged::<R>()?
            .rows
            .iter()
            .filter(|r| pred(r))
            .cloned()
            .collect())
    }

    pub fn insert<R: Record>(&mut self, record: R) -> Result<(), StorageError> {
        let table = self.staged::<R>()?;
        table.rows.push(record);
        table.dirty = true;
        Ok(())
    }

    /// Replace the record with the same key, or append it if none exists.
    pub fn put<R: Record>(&mut self, record: R) -> Result<(), StorageError> {
        let table = self.staged::<R>()?;
        match table.rows.iter_mut().find(|r| r.key() == record.key()) {
            Some(existing) => *existing = record,
            None => table.rows.push(record),
        }
        table.dirty = true;
        Ok(())
    }

    pub fn update<R: Record>(
        &mut self,
        id: &str,
        mutate: impl FnOnce(&mut R),
    ) -> Result<Option<R>, StorageError> {
        let table = self.staged::<R>()?;
        match table.rows.iter_mut().find(|r| r.key() == id) {
            Some(record) => {
                mutate(record);
                table.dirty = true;
                Ok(Some(record.clone()))
            }
            None => Ok(None),
        }
    }

    /// Mutate every record matching `pred`. Returns how many were touched.
    pub fn update_where<R: Record>(
        &mut self,
        pred: impl Fn(&R) -> bool,
        mut mutate: impl FnMut(&mut R),
    ) -> Result<usize, StorageError> {
        let table = self.staged::<R>()?;
        let mut touched = 0;
        for record in table.rows.iter_mut().filter(|r| pred(&**r)) {
            mutate(record);
            touched += 1;
        }
        if touched > 0 {
            table.dirty = true;
        }
        Ok(touched)
    }

    pub fn delete<R: Record>(&mut self, id: &str) -> Result<bool, StorageError> {
        let table = self.staged::<R>()?;
        let before = table.rows.len();
        table.rows.retain(|r| r.key() != id);
        let removed = table.rows.len() != before;
        if removed {
            table.dirty = true;
        }
        Ok(removed)
    }

    /// Write every changed table back in one atomic batch.
    pub fn commit(self) -> Result<(), StorageError> {
        let mut batch = Vec::new();
        for (name, table) in &self.tables {
            if let Some(value) = table.encode()? {
                batch.push(WriteOp::Set(name.to_string(), value));
            }
        }
        if batch.is_empty() {
            return Ok(());
        }
        self.persistence.apply(batch)
    }
}

// In-memory persistence for testing
#[cfg(any(test, feature = "test-utils"))]
pub mod memory {
    use super::*;
    use parking_lot::RwLock;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// In-memory persistence backend.
    #[derive(Default)]
    pub struct MemoryPersistence {
        data: RwLock<HashMap<String, Value>>,
        fail_writes: AtomicBool,
    }

    impl MemoryPersistence {
        pub fn new() -> Self {
            Self::default()
        }

        /// Make every subsequent write fail, to exercise rollback paths.
        pub fn fail_writes(&self, fail: bool) {
            self.fail_writes.store(fail, Ordering::SeqCst);
        }

        fn check_writable(&self) -> Result<(), StorageError> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(StorageError::Database("writes disabled".to_string()));
            }
            Ok(())
        }
    }

    impl Persistence for MemoryPersistence {
        fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
            Ok(self.data.read().get(key).cloned())
        }

        fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
            self.check_writable()?;
            self.data.write().insert(key.to_string(), value);
            Ok(())
        }

        fn remove(&self, key: &str) -> Result<(), StorageError> {
            self.check_writable()?;
            self.data.write().remove(key);
            Ok(())
        }

        fn clear(&self) -> Result<(), StorageError> {
            self.check_writable()?;
            self.data.write().clear();
            Ok(())
        }

        fn apply(&self, batch: Vec<WriteOp>) -> Result<(), StorageError> {
            self.check_writable()?;
            let mut data = self.data.write();
            for op in batch {
                match op {
                    WriteOp::Set(key, value) => {
                        data.insert(key, value);
                    }
                    WriteOp::Remove(key) => {
                        data.remove(&key);
                    }
                }
            }
            Ok(())
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::models::{Category, Reader};

        fn make_store() -> (Arc<MemoryPersistence>, RecordStore) {
            let persistence = Arc::new(MemoryPersistence::new());
            let store = RecordStore::new(persistence.clone());
            (persistence, store)
        }

        fn make_reader(id: &str) -> Reader {
            Reader::new(id.to_string(), format!("user-{}", id))
        }

        #[test]
        fn test_missing_table_reads_empty() {
            let (_, store) = make_store();
            assert!(store.all::<Reader>().unwrap().is_empty());
        }

        #[test]
        fn test_init_creates_all_tables() {
            let (persistence, store) = make_store();
            store.init().unwrap();

            for table in tables::ALL {
                assert_eq!(
                    persistence.get(table).unwrap(),
                    Some(Value::Array(Vec::new()))
                );
            }
        }

        #[test]
        fn test_insert_get_update_delete() {
            let (_, store) = make_store();

            store.insert(make_reader("r1")).unwrap();
            store.insert(make_reader("r2")).unwrap();

            let fetched: Reader = store.get("r1").unwrap().unwrap();
            assert_eq!(fetched.user_id, "user-r1");

            let updated = store
                .update::<Reader>("r2", |r| r.borrowed_count = 3)
                .unwrap()
                .unwrap();
            assert_eq!(updated.borrowed_count, 3);
            assert_eq!(store.get::<Reader>("r2").unwrap().unwrap().borrowed_count, 3);

            assert!(store.update::<Reader>("missing", |_| {}).unwrap().is_none());

            assert!(store.delete::<Reader>("r1").unwrap());
            assert!(!store.delete::<Reader>("r1").unwrap());
            assert_eq!(store.all::<Reader>().unwrap().len(), 1);
        }

        #[test]
        fn test_table_order_is_preserved() {
            let (_, store) = make_store();
            for id in ["c", "a", "b"] {
                store.insert(make_reader(id)).unwrap();
            }

            let ids: Vec<String> = store
                .all::<Reader>()
                .unwrap()
                .into_iter()
                .map(|r| r.reader_id)
                .collect();
            assert_eq!(ids, vec!["c", "a", "b"]);
        }

        #[test]
        fn test_query_filters() {
            let (_, store) = make_store();
            store.insert(make_reader("r1")).unwrap();
            store.update::<Reader>("r1", |r| r.credit_score = 40).unwrap();
            store.insert(make_reader("r2")).unwrap();

            let low = store.query::<Reader>(|r| r.credit_score < 60).unwrap();
            assert_eq!(low.len(), 1);
            assert_eq!(low[0].reader_id, "r1");
        }

        #[test]
        fn test_unit_of_work_spans_tables() {
            let (_, store) = make_store();
            store.insert(make_reader("r1")).unwrap();

            let mut uow = store.begin();
            uow.update::<Reader>("r1", |r| r.borrowed_count += 1).unwrap();
            uow.insert(Category {
                category_id: "cat-1".to_string(),
                category_name: "History".to_string(),
                parent_category_id: None,
                description: String::new(),
            })
            .unwrap();
            // Staged reads see staged writes
            assert_eq!(uow.get::<Reader>("r1").unwrap().unwrap().borrowed_count, 1);
            uow.commit().unwrap();

            assert_eq!(store.get::<Reader>("r1").unwrap().unwrap().borrowed_count, 1);
            assert!(store.get::<Category>("cat-1").unwrap().is_some());
        }

        #[test]
        fn test_dropped_unit_of_work_discards_changes() {
            let (_, store) = make_store();
            store.insert(make_reader("r1")).unwrap();

            {
                let mut uow = store.begin();
                uow.update::<Reader>("r1", |r| r.borrowed_count = 5).unwrap();
                uow.delete::<Reader>("r1").unwrap();
            }

            let reader = store.get::<Reader>("r1").unwrap().unwrap();
            assert_eq!(reader.borrowed_count, 0);
        }

        #[test]
        fn test_failed_commit_writes_nothing() {
            let (persistence, store) = make_store();
            store.insert(make_reader("r1")).unwrap();

            persistence.fail_writes(true);
            let mut uow = store.begin();
            uow.update::<Reader>("r1", |r| r.borrowed_count = 2).unwrap();
            uow.insert(make_reader("r2")).unwrap();
            assert!(uow.commit().is_err());
            persistence.fail_writes(false);

            assert_eq!(store.all::<Reader>().unwrap().len(), 1);
            assert_eq!(store.get::<Reader>("r1").unwrap().unwrap().borrowed_count, 0);
        }

        #[test]
        fn test_put_replaces_or_appends() {
            let (_, store) = make_store();
            store.insert(make_reader("r1")).unwrap();

            let mut uow = store.begin();
            let mut reader = uow.get::<Reader>("r1").unwrap().unwrap();
            reader.credit_score = 150;
            uow.put(reader).unwrap();
            uow.put(make_reader("r2")).unwrap();
            uow.commit().unwrap();

            assert_eq!(store.get::<Reader>("r1").unwrap().unwrap().credit_score, 150);
            assert_eq!(store.all::<Reader>().unwrap().len(), 2);
        }

        #[test]
        fn test_update_where_counts_touched() {
            let (_, store) = make_store();
            for id in ["r1", "r2", "r3"] {
                store.insert(make_reader(id)).unwrap();
            }

            let mut uow = store.begin();
            let touched = uow
                .update_where::<Reader>(|r| r.reader_id != "r2", |r| r.borrow_limit = 10)
                .unwrap();
            uow.commit().unwrap();

            assert_eq!(touched, 2);
            assert_eq!(store.get::<Reader>("r2").unwrap().unwrap().borrow_limit, 7);
            assert_eq!(store.get::<Reader>("r3").unwrap().unwrap().borrow_limit, 10);
        }

        #[test]
        fn test_corrupt_table_reports_serialization_error() {
            let (persistence, store) = make_store();
            persistence
                .set(tables::READERS, serde_json::json!({"not": "an array"}))
                .unwrap();

            let err = store.all::<Reader>().unwrap_err();
            assert!(matches!(err, StorageError::Serialization("readers", _)));
        }
    }
}
