//! Pipeline and storage configuration.
//!
//! The storage selector is resolved once, before the pipeline is wired;
//! the pipeline itself only ever sees a [`RepositorySet`].

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::info;

use convpipe_store::{
    open_document_repositories, open_file_repositories, open_sqlite_repositories, FilePaths,
    RepositorySet,
};

use crate::error::{PipelineError, Result};

/// Runtime tuning for queues, reporter and deadline.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Capacity of each of the three queues.
    pub queue_capacity: usize,

    /// Reporter polling interval.
    pub poll_interval: Duration,

    /// Upper bound on how long the reporter waits for consumers to drain
    /// once every queue is closed.
    pub drain_grace: Duration,

    /// Cancel the whole pipeline after this long.
    pub run_timeout: Option<Duration>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 10,
            poll_interval: Duration::from_millis(200),
            drain_grace: Duration::from_millis(500),
            run_timeout: None,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 {
            return Err(PipelineError::Config(
                "queue capacity must be at least 1".into(),
            ));
        }
        if self.poll_interval.is_zero() {
            return Err(PipelineError::Config(
                "poll interval must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

/// Which backend the repositories are built on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageKind {
    /// JSONL logs, one per record type.
    #[default]
    File,
    /// JSON documents with a change journal.
    DocumentStore,
    /// One SQLite table per record type.
    RelationalStore,
}

impl StorageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageKind::File => "file",
            StorageKind::DocumentStore => "document-store",
            StorageKind::RelationalStore => "relational-store",
        }
    }
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StorageKind {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(StorageKind::File),
            "document-store" | "document" => Ok(StorageKind::DocumentStore),
            "relational-store" | "relational" | "sqlite" => Ok(StorageKind::RelationalStore),
            other => Err(PipelineError::Config(format!(
                "unknown storage type: {:?}",
                other
            ))),
        }
    }
}

/// Where records are kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    pub kind: StorageKind,
    pub requests_path: PathBuf,
    pub responses_path: PathBuf,
    pub logs_path: PathBuf,
    /// Database for the document and relational backends.
    pub sqlite_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let files = FilePaths::default();
        Self {
            kind: StorageKind::File,
            requests_path: files.requests,
            responses_path: files.responses,
            logs_path: files.logs,
            sqlite_path: PathBuf::from("data/convpipe.db"),
        }
    }
}

impl StorageConfig {
    pub fn file_paths(&self) -> FilePaths {
        FilePaths {
            requests: self.requests_path.clone(),
            responses: self.responses_path.clone(),
            logs: self.logs_path.clone(),
        }
    }
}

/// Build the repository set for the configured backend.
pub fn open_repositories(config: &StorageConfig) -> Result<RepositorySet> {
    info!(storage = %config.kind, "opening repositories");
    let repos = match config.kind {
        StorageKind::File => open_file_repositories(&config.file_paths())?,
        StorageKind::DocumentStore => open_document_repositories(&config.sqlite_path)?,
        StorageKind::RelationalStore => open_sqlite_repositories(&config.sqlite_path)?,
    };
    Ok(repos)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_kind_parsing() {
        assert_eq!("file".parse::<StorageKind>().unwrap(), StorageKind::File);
        assert_eq!(
            "Document-Store".parse::<StorageKind>().unwrap(),
            StorageKind::DocumentStore
        );
        assert_eq!(
            "sqlite".parse::<StorageKind>().unwrap(),
            StorageKind::RelationalStore
        );
        assert!("mongo".parse::<StorageKind>().is_err());
    }

    #[test]
    fn test_storage_kind_display_round_trip() {
        for kind in [
            StorageKind::File,
            StorageKind::DocumentStore,
            StorageKind::RelationalStore,
        ] {
            assert_eq!(kind.to_string().parse::<StorageKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(PipelineConfig::default().validate().is_ok());

        let zero = PipelineConfig {
            queue_capacity: 0,
            ..PipelineConfig::default()
        };
        assert!(matches!(zero.validate(), Err(PipelineError::Config(_))));
    }

    #[tokio::test]
    async fn test_open_each_backend() {
        let dir = tempfile::tempdir().unwrap();
        for kind in [
            StorageKind::File,
            StorageKind::DocumentStore,
            StorageKind::RelationalStore,
        ] {
            let config = StorageConfig {
                kind,
                requests_path: dir.path().join("requests.jsonl"),
                responses_path: dir.path().join("responses.jsonl"),
                logs_path: dir.path().join("logs.jsonl"),
                sqlite_path: dir.path().join(format!("{}.db", kind)),
            };
            let repos = open_repositories(&config).unwrap();
            assert!(repos.requests.get_all().await.unwrap().is_empty());
            assert_eq!(
                repos.requests.supports_cursor(),
                kind != StorageKind::DocumentStore
            );
            repos.close().await.unwrap();
        }
    }
}
