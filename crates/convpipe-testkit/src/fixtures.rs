//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tempfile::TempDir;

use convpipe::{StorageConfig, StorageKind};
use convpipe_core::{ConversionLog, ConversionRequest, ConversionResponse, Record, RecordId};
use convpipe_store::{
    open_file_repositories, FilePaths, MemoryRepository, Repository, RepositorySet, Result,
};

/// A scratch directory holding every backend's files.
pub struct StorageFixture {
    pub dir: TempDir,
    pub paths: FilePaths,
    pub sqlite_path: PathBuf,
}

impl StorageFixture {
    pub fn new() -> io::Result<Self> {
        let dir = tempfile::tempdir()?;
        let paths = FilePaths::in_dir(dir.path().join("data"));
        let sqlite_path = dir.path().join("data").join("convpipe.db");
        Ok(Self {
            dir,
            paths,
            sqlite_path,
        })
    }

    /// Storage configuration pointing into the scratch directory.
    pub fn config(&self, kind: StorageKind) -> StorageConfig {
        StorageConfig {
            kind,
            requests_path: self.paths.requests.clone(),
            responses_path: self.paths.responses.clone(),
            logs_path: self.paths.logs.clone(),
            sqlite_path: self.sqlite_path.clone(),
        }
    }

    /// Open file-backed repositories on the scratch logs.
    pub fn open_files(&self) -> Result<RepositorySet> {
        open_file_repositories(&self.paths)
    }
}

/// Parse every non-blank line of a JSONL file, failing on the first bad one.
pub fn parse_lines<T: DeserializeOwned>(path: &Path) -> std::result::Result<Vec<T>, String> {
    let text = fs::read_to_string(path).map_err(|e| e.to_string())?;
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .enumerate()
        .map(|(i, line)| {
            serde_json::from_str(line).map_err(|e| format!("line {}: {}: {}", i + 1, e, line))
        })
        .collect()
}

/// In-memory sink the reporter can write into while a test reads it.
#[derive(Clone, Default)]
pub struct SharedOutput(Arc<Mutex<Vec<u8>>>);

impl SharedOutput {
    pub fn text(&self) -> String {
        let bytes = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl Write for SharedOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Memory repository whose `create` takes a fixed time, so queues back up.
pub struct SlowRepository<T: Record> {
    inner: MemoryRepository<T>,
    delay: Duration,
}

impl<T: Record> SlowRepository<T> {
    pub fn new(delay: Duration) -> Self {
        Self {
            inner: MemoryRepository::new(),
            delay,
        }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[async_trait]
impl<T: Record> Repository<T> for SlowRepository<T> {
    async fn create(&self, record: T) -> Result<T> {
        tokio::time::sleep(self.delay).await;
        self.inner.create(record).await
    }

    async fn get_by_id(&self, id: &RecordId) -> Result<Option<T>> {
        self.inner.get_by_id(id).await
    }

    async fn get_all(&self) -> Result<Vec<T>> {
        self.inner.get_all().await
    }

    async fn update(&self, record: T) -> Result<bool> {
        self.inner.update(record).await
    }

    async fn delete(&self, id: &RecordId) -> Result<bool> {
        self.inner.delete(id).await
    }

    async fn get_new_since_cursor(&self) -> Result<Vec<T>> {
        self.inner.get_new_since_cursor().await
    }
}

/// Slow repositories for all three record types, plus the set wrapping them.
pub struct SlowFixture {
    pub requests: Arc<SlowRepository<ConversionRequest>>,
    pub responses: Arc<SlowRepository<ConversionResponse>>,
    pub logs: Arc<SlowRepository<ConversionLog>>,
}

impl SlowFixture {
    pub fn new(delay: Duration) -> Self {
        Self {
            requests: Arc::new(SlowRepository::new(delay)),
            responses: Arc::new(SlowRepository::new(delay)),
            logs: Arc::new(SlowRepository::new(delay)),
        }
    }

    pub fn set(&self) -> RepositorySet {
        RepositorySet::new(
            self.requests.clone(),
            self.responses.clone(),
            self.logs.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_lines_reports_bad_line() {
        let fixture = StorageFixture::new().unwrap();
        let path = fixture.dir.path().join("bad.jsonl");
        let good = r#"{"id":"a","from":"USD","to":"EUR","amount":1.0}"#;
        fs::write(&path, format!("{good}\nnope\n")).unwrap();

        let err = parse_lines::<ConversionRequest>(&path).unwrap_err();
        assert!(err.starts_with("line 2"));
    }

    #[test]
    fn test_config_points_into_fixture() {
        let fixture = StorageFixture::new().unwrap();
        let config = fixture.config(StorageKind::RelationalStore);
        assert!(config.sqlite_path.starts_with(fixture.dir.path()));
        assert!(config.requests_path.starts_with(fixture.dir.path()));
    }
}
