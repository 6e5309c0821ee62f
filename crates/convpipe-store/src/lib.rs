//! # Convpipe Store
//!
//! Storage abstraction for the conversion pipeline. Provides a trait-based
//! interface for record persistence with file, relational and document
//! implementations.
//!
//! ## Overview
//!
//! The pipeline only sees the [`Repository`] trait, one instance per record
//! type, bundled in a [`RepositorySet`]. The primary implementation is
//! [`FileRepository`], which wraps a [`PersistedStore`]: an in-memory list
//! mirrored to an append-only JSONL log with a read cursor.
//!
//! ## Key Types
//!
//! - [`Repository`] - The async trait for all storage operations
//! - [`PersistedStore`] - Generic list + cursor + JSONL log
//! - [`FileRepository`] - Repository over a persisted store
//! - [`SqliteRepository`] - One relational table per record type
//! - [`DocumentRepository`] - JSON documents with a change journal
//! - [`MemoryRepository`] - In-memory repository for tests
//!
//! ## Usage
//!
//! ```rust,no_run
//! use convpipe_core::ConversionRequest;
//! use convpipe_store::{open_file_repositories, FilePaths};
//!
//! async fn example() {
//!     let repos = open_file_repositories(&FilePaths::in_dir("data")).unwrap();
//!
//!     let stored = repos
//!         .requests
//!         .create(ConversionRequest::new("USD", "EUR", 105.0))
//!         .await
//!         .unwrap();
//!     println!("{}", stored);
//!
//!     for fresh in repos.requests.get_new_since_cursor().await.unwrap() {
//!         println!("  {}", fresh);
//!     }
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Store-assigned ids**: `create` ignores any id on the input
//! - **Rewrite-compaction**: file update/delete rewrite the whole log atomically
//! - **Tolerant load**: malformed log lines are skipped with a warning
//! - **Optional cursor**: the document backend has none and returns nothing new

pub mod connection;
pub mod document;
pub mod error;
pub mod file;
pub mod jsonl;
pub mod memory;
pub mod migration;
pub mod persisted;
pub mod sqlite;
pub mod traits;

pub use connection::SharedConnection;
pub use document::{
    open_document_repositories, open_document_repositories_memory, ChangeAction,
    DocumentChange, DocumentRepository,
};
pub use error::{Result, StoreError};
pub use file::{open_file_repositories, FilePaths, FileRepository};
pub use memory::MemoryRepository;
pub use persisted::PersistedStore;
pub use sqlite::{
    open_sqlite_repositories, open_sqlite_repositories_memory, RelationalRecord,
    SqliteRepository,
};
pub use traits::{Repository, RepositorySet};
