//! In-memory implementation of the Repository trait.
//!
//! This is primarily for testing. It follows the file store's semantics
//! (fresh ids, insertion order, single-reader cursor) with no persistence,
//! and can be told to fail writes to exercise error paths.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;

use convpipe_core::{Record, RecordId};

use crate::error::{Result, StoreError};
use crate::traits::Repository;

/// In-memory repository.
///
/// All data is lost when the repository is dropped. Thread-safe via RwLock.
pub struct MemoryRepository<T: Record> {
    inner: RwLock<MemoryInner<T>>,
    fail_writes: AtomicBool,
    closed: AtomicUsize,
}

struct MemoryInner<T> {
    records: Vec<T>,
    cursor: usize,
}

impl<T: Record> MemoryRepository<T> {
    /// Create a new empty repository.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryInner {
                records: Vec::new(),
                cursor: 0,
            }),
            fail_writes: AtomicBool::new(false),
            closed: AtomicUsize::new(0),
        }
    }

    /// Make every subsequent create/update/delete fail (or succeed again).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// How many times `close` was called.
    pub fn close_count(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("{} repository is failing writes", T::KIND),
            )));
        }
        Ok(())
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, MemoryInner<T>> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, MemoryInner<T>> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl<T: Record> Default for MemoryRepository<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: Record> Repository<T> for MemoryRepository<T> {
    async fn create(&self, mut record: T) -> Result<T> {
        self.check_writable()?;
        let mut inner = self.write();

        let mut id = RecordId::generate();
        while inner.records.iter().any(|r| r.id() == &id) {
            id = RecordId::generate();
        }
        record.set_id(id);
        inner.records.push(record.clone());
        Ok(record)
    }

    async fn get_by_id(&self, id: &RecordId) -> Result<Option<T>> {
        Ok(self.read().records.iter().find(|r| r.id() == id).cloned())
    }

    async fn get_all(&self) -> Result<Vec<T>> {
        Ok(self.read().records.clone())
    }

    async fn update(&self, record: T) -> Result<bool> {
        self.check_writable()?;
        let mut inner = self.write();
        match inner.records.iter_mut().find(|r| r.id() == record.id()) {
            Some(slot) => {
                *slot = record;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, id: &RecordId) -> Result<bool> {
        self.check_writable()?;
        let mut inner = self.write();
        let Some(pos) = inner.records.iter().position(|r| r.id() == id) else {
            return Ok(false);
        };
        inner.records.remove(pos);
        if pos < inner.cursor {
            inner.cursor -= 1;
        }
        Ok(true)
    }

    async fn get_new_since_cursor(&self) -> Result<Vec<T>> {
        let mut inner = self.write();
        let start = inner.cursor.min(inner.records.len());
        let fresh = inner.records[start..].to_vec();
        inner.cursor = inner.records.len();
        Ok(fresh)
    }

    async fn close(&self) -> Result<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
