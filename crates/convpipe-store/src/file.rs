//! File-backed implementation of the Repository trait.
//!
//! Wraps a [`PersistedStore`] per record type. Every store call runs on
//! `spawn_blocking` like the SQLite adapter does: mutations do file I/O, and
//! reads wait on the same lock a rewrite holds through its fsyncs.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use convpipe_core::{ConversionLog, ConversionRequest, ConversionResponse, Record, RecordId};

use crate::error::{Result, StoreError};
use crate::persisted::PersistedStore;
use crate::traits::{Repository, RepositorySet};

/// Log file locations for the three record types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePaths {
    pub requests: PathBuf,
    pub responses: PathBuf,
    pub logs: PathBuf,
}

impl FilePaths {
    /// `requests.jsonl`, `responses.jsonl` and `logs.jsonl` under `dir`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            requests: dir.join("requests.jsonl"),
            responses: dir.join("responses.jsonl"),
            logs: dir.join("logs.jsonl"),
        }
    }
}

impl Default for FilePaths {
    fn default() -> Self {
        Self::in_dir("data")
    }
}

/// Repository over one persisted store.
pub struct FileRepository<T: Record> {
    store: Arc<PersistedStore<T>>,
}

impl<T: Record> FileRepository<T> {
    /// Open (or create) the log at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::from_store(PersistedStore::open(path)?))
    }

    pub fn from_store(store: PersistedStore<T>) -> Self {
        Self {
            store: Arc::new(store),
        }
    }

    /// The underlying store, for introspection.
    pub fn store(&self) -> &PersistedStore<T> {
        &self.store
    }

    async fn blocking<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&PersistedStore<T>) -> R + Send + 'static,
        R: Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || f(&store))
            .await
            .map_err(|e| StoreError::Task(format!("{} store: {e}", T::KIND)))
    }
}

#[async_trait]
impl<T: Record> Repository<T> for FileRepository<T> {
    async fn create(&self, record: T) -> Result<T> {
        self.blocking(move |store| store.create(record)).await
    }

    async fn get_by_id(&self, id: &RecordId) -> Result<Option<T>> {
        let id = id.clone();
        self.blocking(move |store| store.get_by_id(&id)).await
    }

    async fn get_all(&self) -> Result<Vec<T>> {
        self.blocking(|store| store.get_all()).await
    }

    async fn update(&self, record: T) -> Result<bool> {
        self.blocking(move |store| store.update(record)).await
    }

    async fn delete(&self, id: &RecordId) -> Result<bool> {
        let id = id.clone();
        self.blocking(move |store| store.delete(&id)).await
    }

    async fn get_new_since_cursor(&self) -> Result<Vec<T>> {
        self.blocking(|store| store.get_new_since_cursor()).await
    }

    async fn close(&self) -> Result<()> {
        self.blocking(|store| store.sync()).await?
    }
}

/// Open file-backed repositories for all three record types.
pub fn open_file_repositories(paths: &FilePaths) -> Result<RepositorySet> {
    let requests = FileRepository::<ConversionRequest>::open(&paths.requests)?;
    let responses = FileRepository::<ConversionResponse>::open(&paths.responses)?;
    let logs = FileRepository::<ConversionLog>::open(&paths.logs)?;

    Ok(RepositorySet::new(
        Arc::new(requests),
        Arc::new(responses),
        Arc::new(logs),
    ))
}
