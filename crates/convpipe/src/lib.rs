//! # Convpipe
//!
//! Concurrent ingestion pipeline for currency-conversion records: bounded
//! queues feed one consumer per record type into a repository, while a
//! cursor reporter prints what is new.
//!
//! ## Overview
//!
//! ```text
//! producer ─▶ queue ─▶ consumer ─▶ Repository ◀─ reporter (polls cursor)
//! ```
//!
//! - **Queues**: one bounded FIFO per record type; sending waits when full
//! - **Consumers**: drain their queue, stop on close or cancellation
//! - **Reporter**: polls "new since cursor" on a fixed interval
//! - **Coordinator**: owns the cancellation signal and waits for every task
//!
//! ## Usage
//!
//! ```rust,no_run
//! use convpipe::{open_repositories, Coordinator, PipelineConfig, StorageConfig};
//! use convpipe::core::ConversionRequest;
//!
//! async fn example() {
//!     let repos = open_repositories(&StorageConfig::default()).unwrap();
//!     let (coordinator, ingress) = Coordinator::start(
//!         &PipelineConfig::default(),
//!         repos,
//!         Box::new(std::io::stdout()),
//!     )
//!     .unwrap();
//!
//!     ingress
//!         .requests
//!         .send(ConversionRequest::new("USD", "EUR", 105.0))
//!         .await
//!         .unwrap();
//!     ingress.close();
//!
//!     let report = coordinator.wait().await.unwrap();
//!     assert_eq!(report.requests.stored, 1);
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `convpipe::core` - Record types and validation
//! - `convpipe::store` - Repository trait and backends

pub mod config;
pub mod consumer;
pub mod error;
pub mod lifecycle;
pub mod producer;
pub mod queue;
pub mod reporter;
pub mod shutdown;

// Re-export component crates
pub use convpipe_core as core;
pub use convpipe_store as store;

// Re-export main types for convenience
pub use config::{open_repositories, PipelineConfig, StorageConfig, StorageKind};
pub use consumer::{run_consumer, spawn_consumer, ConsumerExit, ConsumerReport};
pub use error::{PipelineError, Result};
pub use lifecycle::{Coordinator, Ingress, PipelineReport};
pub use producer::{example_batch, ExampleBatch, ExampleProducer, ProducerConfig, ProducerReport};
pub use queue::{bounded, QueueReceiver, QueueSender, QueueState, QueueStatus};
pub use reporter::{CursorReporter, ReporterExit, ReporterReport};
pub use shutdown::{Shutdown, ShutdownListener};

pub use convpipe_core::{ConversionLog, ConversionRequest, ConversionResponse, RecordId, RecordKind};
pub use convpipe_store::{Repository, RepositorySet};
