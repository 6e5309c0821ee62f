//! Repository trait: the uniform contract the pipeline runs against.
//!
//! Implementations include the file-backed persisted store (primary), a
//! relational SQLite adapter and a document adapter.

use std::sync::Arc;

use async_trait::async_trait;

use convpipe_core::{ConversionLog, ConversionRequest, ConversionResponse, Record, RecordId};

use crate::error::Result;

/// CRUD plus "new since cursor" over one record type.
///
/// # Design Notes
///
/// - **Ids are store-assigned**: `create` always assigns a fresh id and
///   returns the stored record.
/// - **Boolean mutations**: `update`/`delete` report whether a matching
///   record existed. `Err` is reserved for backend failures.
/// - **Optional cursor**: backends without a cursor return an empty list
///   from `get_new_since_cursor` and `false` from `supports_cursor`.
/// - **Single reader**: the cursor is shared by every caller of one
///   repository instance; concurrent callers see disjoint batches.
#[async_trait]
pub trait Repository<T: Record>: Send + Sync {
    /// Store a new record under a fresh id.
    async fn create(&self, record: T) -> Result<T>;

    /// Get a record by id.
    async fn get_by_id(&self, id: &RecordId) -> Result<Option<T>>;

    /// Get every record.
    async fn get_all(&self) -> Result<Vec<T>>;

    /// Replace the record with the same id.
    async fn update(&self, record: T) -> Result<bool>;

    /// Remove the record with this id.
    async fn delete(&self, id: &RecordId) -> Result<bool>;

    /// Records created since the previous call.
    async fn get_new_since_cursor(&self) -> Result<Vec<T>>;

    /// Whether `get_new_since_cursor` is meaningful for this backend.
    fn supports_cursor(&self) -> bool {
        true
    }

    /// Flush and release backend resources.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// One repository per record type, as handed to the pipeline.
#[derive(Clone)]
pub struct RepositorySet {
    pub requests: Arc<dyn Repository<ConversionRequest>>,
    pub responses: Arc<dyn Repository<ConversionResponse>>,
    pub logs: Arc<dyn Repository<ConversionLog>>,
}

impl RepositorySet {
    pub fn new(
        requests: Arc<dyn Repository<ConversionRequest>>,
        responses: Arc<dyn Repository<ConversionResponse>>,
        logs: Arc<dyn Repository<ConversionLog>>,
    ) -> Self {
        Self {
            requests,
            responses,
            logs,
        }
    }

    /// Close all three repositories, reporting the first failure.
    pub async fn close(&self) -> Result<()> {
        let requests = self.requests.close().await;
        let responses = self.responses.close().await;
        let logs = self.logs.close().await;
        requests?;
        responses?;
        logs
    }
}
