//! Generic persisted store: in-memory list + read cursor + append-only log.
//!
//! One instance per record type. The instance exclusively owns its list,
//! cursor and file handle behind a single mutex; callers only use methods.
//!
//! Every create appends one JSON line and flushes. Update and delete apply
//! the change in memory first, then rewrite the whole log from memory
//! (rewrite-compaction) through a temp file and an atomic rename. A failed
//! append or rewrite is logged and leaves memory and disk diverged until
//! the next successful rewrite; callers are not told.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, error, info};

use convpipe_core::{Record, RecordId};

use crate::error::{Result, StoreError};
use crate::jsonl::{self, LoadOutcome};

/// A lock-protected, file-backed list of records of one type.
pub struct PersistedStore<T: Record> {
    path: PathBuf,
    inner: Mutex<StoreInner<T>>,
}

struct StoreInner<T> {
    records: Vec<T>,
    /// Index of the first record not yet returned by `get_new_since_cursor`.
    cursor: usize,
    /// Append handle; `None` only while a rewrite is in progress or after
    /// reopening failed.
    file: Option<File>,
    /// Memory holds changes the log does not.
    diverged: bool,
}

impl<T: Record> PersistedStore<T> {
    /// Open the store at `path`, creating the parent directory if needed.
    ///
    /// Existing lines are loaded; malformed ones are skipped with a warning.
    /// The cursor starts after the loaded records, so they are not "new".
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let LoadOutcome { records, skipped } = jsonl::read_records_from_path::<T>(&path)?;

        let mut file = open_append(&path)?;
        if missing_trailing_newline(&path)? {
            file.write_all(b"\n")?;
        }

        info!(
            kind = %T::KIND,
            path = %path.display(),
            loaded = records.len(),
            skipped,
            "persisted store opened"
        );

        let cursor = records.len();
        Ok(Self {
            path,
            inner: Mutex::new(StoreInner {
                records,
                cursor,
                file: Some(file),
                diverged: false,
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner<T>> {
        // Every mutation finishes before its guard drops, so a poisoned
        // lock still guards a consistent list.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Assign a fresh id, keep the record in memory and append it to the log.
    ///
    /// Returns the stored record. A failed append is logged, not returned.
    pub fn create(&self, mut record: T) -> T {
        let mut inner = self.lock();

        let id = inner.fresh_id();
        record.set_id(id);
        inner.records.push(record.clone());

        match inner.append(&record) {
            Ok(()) => debug!(kind = %T::KIND, id = %record.id(), "record appended"),
            Err(e) => {
                inner.diverged = true;
                error!(
                    kind = %T::KIND,
                    id = %record.id(),
                    path = %self.path.display(),
                    error = %e,
                    "failed to append record, keeping it in memory only"
                );
            }
        }

        record
    }

    /// First record with the given id.
    pub fn get_by_id(&self, id: &RecordId) -> Option<T> {
        self.lock().records.iter().find(|r| r.id() == id).cloned()
    }

    /// A copy of every record, in insertion order.
    pub fn get_all(&self) -> Vec<T> {
        self.lock().records.clone()
    }

    /// Replace the record carrying the same id, then rewrite the log.
    ///
    /// Returns `false` when no record has that id.
    pub fn update(&self, record: T) -> bool {
        let mut inner = self.lock();

        let Some(pos) = inner.records.iter().position(|r| r.id() == record.id()) else {
            return false;
        };

        debug!(kind = %T::KIND, id = %record.id(), "record updated");
        inner.records[pos] = record;
        self.compact(&mut inner);
        true
    }

    /// Remove every record with the given id, then rewrite the log.
    ///
    /// Returns `false` when nothing was removed.
    pub fn delete(&self, id: &RecordId) -> bool {
        let mut inner = self.lock();

        let cursor = inner.cursor;
        let before = inner.records.len();
        let mut index = 0;
        let mut removed_before_cursor = 0;
        inner.records.retain(|r| {
            let keep = r.id() != id;
            if !keep && index < cursor {
                removed_before_cursor += 1;
            }
            index += 1;
            keep
        });

        let removed = before - inner.records.len();
        if removed == 0 {
            return false;
        }

        // Keep the cursor on the same unread record.
        inner.cursor -= removed_before_cursor;

        debug!(kind = %T::KIND, id = %id, removed, "record deleted");
        self.compact(&mut inner);
        true
    }

    /// Records added since the previous call, advancing the cursor.
    ///
    /// Single-reader contract: concurrent callers each get a disjoint part.
    pub fn get_new_since_cursor(&self) -> Vec<T> {
        let mut inner = self.lock();
        let start = inner.cursor.min(inner.records.len());
        let fresh = inner.records[start..].to_vec();
        inner.cursor = inner.records.len();
        fresh
    }

    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().records.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.lock().cursor
    }

    /// Whether memory holds changes the log on disk does not.
    pub fn is_diverged(&self) -> bool {
        self.lock().diverged
    }

    /// Flush the log to stable storage.
    pub fn sync(&self) -> Result<()> {
        let inner = self.lock();
        match inner.file.as_ref() {
            Some(file) => Ok(file.sync_all()?),
            None => Err(no_backing_file(&self.path)),
        }
    }

    /// Hold the store lock for `held`, signalling once it is taken.
    #[cfg(test)]
    pub(crate) fn hold_lock_for(
        &self,
        held: std::time::Duration,
        locked: std::sync::mpsc::Sender<()>,
    ) {
        let _inner = self.lock();
        let _ = locked.send(());
        std::thread::sleep(held);
    }

    fn compact(&self, inner: &mut StoreInner<T>) {
        inner.file = None;

        match jsonl::write_records_atomic(&self.path, &inner.records) {
            Ok(()) => {
                inner.diverged = false;
                debug!(
                    kind = %T::KIND,
                    path = %self.path.display(),
                    records = inner.records.len(),
                    "log rewritten"
                );
            }
            Err(e) => {
                inner.diverged = true;
                error!(
                    kind = %T::KIND,
                    path = %self.path.display(),
                    error = %e,
                    "log rewrite failed, memory and disk diverge"
                );
            }
        }

        match open_append(&self.path) {
            Ok(file) => inner.file = Some(file),
            Err(e) => {
                inner.diverged = true;
                error!(
                    kind = %T::KIND,
                    path = %self.path.display(),
                    error = %e,
                    "failed to reopen log for append"
                );
            }
        }
    }
}

impl<T: Record> StoreInner<T> {
    fn fresh_id(&self) -> RecordId {
        loop {
            let id = RecordId::generate();
            if !self.records.iter().any(|r| r.id() == &id) {
                return id;
            }
        }
    }

    fn append(&mut self, record: &T) -> Result<()> {
        let line = jsonl::encode_line(record)?;
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| StoreError::InvalidData("log is not open for append".into()))?;
        // One write per line keeps concurrent appends from interleaving.
        file.write_all(line.as_bytes())?;
        file.flush()?;
        Ok(())
    }
}

fn open_append(path: &Path) -> Result<File> {
    Ok(OpenOptions::new().create(true).append(true).open(path)?)
}

fn missing_trailing_newline(path: &Path) -> Result<bool> {
    let mut file = File::open(path)?;
    if file.metadata()?.len() == 0 {
        return Ok(false);
    }
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}

fn no_backing_file(path: &Path) -> StoreError {
    StoreError::NotFound(format!("no open log for {}", path.display()))
}
