//! Document-store implementation of the Repository trait.
//!
//! Each record is stored whole as a JSON body in a named collection. Every
//! mutation also appends to a change journal, which callers can read with
//! [`DocumentRepository::changes`]. There is no read cursor:
//! `get_new_since_cursor` always returns an empty list.

use std::fmt;
use std::marker::PhantomData;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use tracing::{debug, info};

use convpipe_core::{ConversionLog, ConversionRequest, ConversionResponse, Record, RecordId};

use crate::connection::SharedConnection;
use crate::error::{Result, StoreError};
use crate::traits::{Repository, RepositorySet};

/// Kind of mutation recorded in the change journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeAction {
    Create,
    Update,
    Delete,
}

impl ChangeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeAction::Create => "create",
            ChangeAction::Update => "update",
            ChangeAction::Delete => "delete",
        }
    }
}

impl fmt::Display for ChangeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeAction {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "create" => Ok(ChangeAction::Create),
            "update" => Ok(ChangeAction::Update),
            "delete" => Ok(ChangeAction::Delete),
            other => Err(StoreError::InvalidData(format!(
                "unknown change action: {}",
                other
            ))),
        }
    }
}

/// One journal entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentChange {
    pub seq: i64,
    pub record_id: RecordId,
    pub action: ChangeAction,
    /// Unix milliseconds.
    pub at: i64,
}

/// Document repository for one record type; the collection is named after
/// the record kind.
pub struct DocumentRepository<T: Record> {
    conn: SharedConnection,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Record> DocumentRepository<T> {
    pub fn new(conn: SharedConnection) -> Self {
        Self {
            conn,
            _marker: PhantomData,
        }
    }

    pub fn collection(&self) -> &'static str {
        T::KIND.as_str()
    }

    /// Journal entries for this collection with `seq > since`, oldest first.
    pub async fn changes(&self, since: i64) -> Result<Vec<DocumentChange>> {
        let collection = self.collection();
        self.conn
            .run(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT seq, record_id, action, at FROM document_changes
                     WHERE collection = ?1 AND seq > ?2 ORDER BY seq",
                )?;
                let rows = stmt.query_map(params![collection, since], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, i64>(3)?,
                    ))
                })?;

                let mut changes = Vec::new();
                for row in rows {
                    let (seq, record_id, action, at) = row?;
                    changes.push(DocumentChange {
                        seq,
                        record_id: RecordId::from(record_id),
                        action: action.parse()?,
                        at,
                    });
                }
                Ok(changes)
            })
            .await
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn journal(
    tx: &Transaction<'_>,
    collection: &str,
    id: &RecordId,
    action: ChangeAction,
) -> Result<()> {
    tx.execute(
        "INSERT INTO document_changes (collection, record_id, action, at) VALUES (?1, ?2, ?3, ?4)",
        params![collection, id.as_str(), action.as_str(), now_millis()],
    )?;
    Ok(())
}

fn document_exists(conn: &Connection, collection: &str, id: &RecordId) -> Result<bool> {
    Ok(conn
        .query_row(
            "SELECT 1 FROM documents WHERE collection = ?1 AND id = ?2",
            params![collection, id.as_str()],
            |_| Ok(()),
        )
        .optional()?
        .is_some())
}

#[async_trait]
impl<T: Record> Repository<T> for DocumentRepository<T> {
    async fn create(&self, mut record: T) -> Result<T> {
        let collection = self.collection();
        self.conn
            .run(move |conn| {
                let tx = conn.transaction()?;

                let mut id = RecordId::generate();
                while document_exists(&tx, collection, &id)? {
                    id = RecordId::generate();
                }
                record.set_id(id);

                let now = now_millis();
                tx.execute(
                    "INSERT INTO documents (collection, id, body, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?4)",
                    params![
                        collection,
                        record.id().as_str(),
                        serde_json::to_string(&record)?,
                        now
                    ],
                )?;
                journal(&tx, collection, record.id(), ChangeAction::Create)?;
                tx.commit()?;

                debug!(collection, id = %record.id(), "document inserted");
                Ok(record)
            })
            .await
    }

    async fn get_by_id(&self, id: &RecordId) -> Result<Option<T>> {
        let collection = self.collection();
        let id = id.clone();
        self.conn
            .run(move |conn| {
                let body: Option<String> = conn
                    .query_row(
                        "SELECT body FROM documents WHERE collection = ?1 AND id = ?2",
                        params![collection, id.as_str()],
                        |row| row.get(0),
                    )
                    .optional()?;
                body.map(|b| serde_json::from_str(&b).map_err(StoreError::from))
                    .transpose()
            })
            .await
    }

    async fn get_all(&self) -> Result<Vec<T>> {
        let collection = self.collection();
        self.conn
            .run(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT body FROM documents WHERE collection = ?1 ORDER BY rowid",
                )?;
                let bodies = stmt
                    .query_map(params![collection], |row| row.get::<_, String>(0))?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                bodies
                    .iter()
                    .map(|b| serde_json::from_str(b).map_err(StoreError::from))
                    .collect()
            })
            .await
    }

    async fn update(&self, record: T) -> Result<bool> {
        let collection = self.collection();
        self.conn
            .run(move |conn| {
                let tx = conn.transaction()?;
                let changed = tx.execute(
                    "UPDATE documents SET body = ?3, updated_at = ?4
                     WHERE collection = ?1 AND id = ?2",
                    params![
                        collection,
                        record.id().as_str(),
                        serde_json::to_string(&record)?,
                        now_millis()
                    ],
                )?;
                if changed > 0 {
                    journal(&tx, collection, record.id(), ChangeAction::Update)?;
                }
                tx.commit()?;
                Ok(changed > 0)
            })
            .await
    }

    async fn delete(&self, id: &RecordId) -> Result<bool> {
        let collection = self.collection();
        let id = id.clone();
        self.conn
            .run(move |conn| {
                let tx = conn.transaction()?;
                let changed = tx.execute(
                    "DELETE FROM documents WHERE collection = ?1 AND id = ?2",
                    params![collection, id.as_str()],
                )?;
                if changed > 0 {
                    journal(&tx, collection, &id, ChangeAction::Delete)?;
                }
                tx.commit()?;
                Ok(changed > 0)
            })
            .await
    }

    async fn get_new_since_cursor(&self) -> Result<Vec<T>> {
        Ok(Vec::new())
    }

    fn supports_cursor(&self) -> bool {
        false
    }
}

/// Open document repositories for all three record types on one database.
pub fn open_document_repositories(path: impl AsRef<Path>) -> Result<RepositorySet> {
    let path = path.as_ref();
    let conn = SharedConnection::open(path)?;
    info!(path = %path.display(), "document store opened");
    Ok(document_repositories(conn))
}

/// In-memory variant of [`open_document_repositories`].
pub fn open_document_repositories_memory() -> Result<RepositorySet> {
    Ok(document_repositories(SharedConnection::open_memory()?))
}

fn document_repositories(conn: SharedConnection) -> RepositorySet {
    RepositorySet::new(
        Arc::new(DocumentRepository::<ConversionRequest>::new(conn.clone())),
        Arc::new(DocumentRepository::<ConversionResponse>::new(conn.clone())),
        Arc::new(DocumentRepository::<ConversionLog>::new(conn)),
    )
}
