//! Relational SQLite implementation of the Repository trait.
//!
//! One table per record type. Nested records are stored as JSON text
//! columns. The AUTOINCREMENT `seq` column orders rows and backs the cursor.

use std::marker::PhantomData;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use tracing::{debug, info};

use convpipe_core::{ConversionLog, ConversionRequest, ConversionResponse, Info, Record, RecordId};

use crate::connection::SharedConnection;
use crate::error::Result;
use crate::traits::{Repository, RepositorySet};

/// Mapping between a record type and its table.
pub trait RelationalRecord: Record {
    const TABLE: &'static str;

    /// Stored columns, `id` first. Excludes `seq`.
    const COLUMNS: &'static [&'static str];

    /// Column values in `COLUMNS` order.
    fn to_values(&self) -> Result<Vec<Value>>;

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;
}

fn json_column<T: serde::de::DeserializeOwned>(row: &Row<'_>, name: &str) -> rusqlite::Result<T> {
    let text: String = row.get(name)?;
    serde_json::from_str(&text).map_err(|e| {
        let idx = row.as_ref().column_index(name).unwrap_or(0);
        rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
    })
}

impl RelationalRecord for ConversionRequest {
    const TABLE: &'static str = "requests";
    const COLUMNS: &'static [&'static str] = &["id", "from_currency", "to_currency", "amount"];

    fn to_values(&self) -> Result<Vec<Value>> {
        Ok(vec![
            Value::Text(self.id.as_str().to_string()),
            Value::Text(self.from.clone()),
            Value::Text(self.to.clone()),
            Value::Real(self.amount),
        ])
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: RecordId::from(row.get::<_, String>("id")?),
            from: row.get("from_currency")?,
            to: row.get("to_currency")?,
            amount: row.get("amount")?,
        })
    }
}

impl RelationalRecord for ConversionResponse {
    const TABLE: &'static str = "responses";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "success",
        "terms",
        "privacy",
        "query",
        "info_timestamp",
        "quote",
        "result",
    ];

    fn to_values(&self) -> Result<Vec<Value>> {
        Ok(vec![
            Value::Text(self.id.as_str().to_string()),
            Value::Integer(i64::from(self.success)),
            Value::Text(self.terms.clone()),
            Value::Text(self.privacy.clone()),
            Value::Text(serde_json::to_string(&self.query)?),
            Value::Integer(self.info.timestamp),
            Value::Real(self.info.quote),
            Value::Real(self.result),
        ])
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: RecordId::from(row.get::<_, String>("id")?),
            success: row.get::<_, i64>("success")? != 0,
            terms: row.get("terms")?,
            privacy: row.get("privacy")?,
            query: json_column(row, "query")?,
            info: Info {
                timestamp: row.get("info_timestamp")?,
                quote: row.get("quote")?,
            },
            result: row.get("result")?,
        })
    }
}

impl RelationalRecord for ConversionLog {
    const TABLE: &'static str = "conversion_logs";
    const COLUMNS: &'static [&'static str] = &["id", "timestamp", "request", "response"];

    fn to_values(&self) -> Result<Vec<Value>> {
        Ok(vec![
            Value::Text(self.id.as_str().to_string()),
            Value::Text(self.timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true)),
            Value::Text(serde_json::to_string(&self.request)?),
            Value::Text(serde_json::to_string(&self.response)?),
        ])
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let raw: String = row.get("timestamp")?;
        let timestamp = DateTime::parse_from_rfc3339(&raw)
            .map_err(|e| {
                let idx = row.as_ref().column_index("timestamp").unwrap_or(0);
                rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
            })?
            .with_timezone(&Utc);

        Ok(Self {
            id: RecordId::from(row.get::<_, String>("id")?),
            timestamp,
            request: json_column(row, "request")?,
            response: json_column(row, "response")?,
        })
    }
}

/// Relational repository for one record type.
///
/// The cursor is the highest `seq` already returned. It starts at the
/// current maximum, so rows present at open time are not "new".
pub struct SqliteRepository<T: RelationalRecord> {
    conn: SharedConnection,
    cursor: Arc<Mutex<i64>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: RelationalRecord> SqliteRepository<T> {
    pub fn new(conn: SharedConnection) -> Result<Self> {
        let start = conn.call(|conn| max_seq(conn, T::TABLE))?;
        debug!(kind = %T::KIND, cursor = start, "relational repository ready");
        Ok(Self {
            conn,
            cursor: Arc::new(Mutex::new(start)),
            _marker: PhantomData,
        })
    }

    fn select_sql(tail: &str) -> String {
        format!(
            "SELECT seq, {} FROM {} {}",
            T::COLUMNS.join(", "),
            T::TABLE,
            tail
        )
    }
}

fn max_seq(conn: &Connection, table: &str) -> Result<i64> {
    Ok(conn.query_row(
        &format!("SELECT COALESCE(MAX(seq), 0) FROM {}", table),
        [],
        |row| row.get(0),
    )?)
}

fn id_exists(conn: &Connection, table: &str, id: &RecordId) -> Result<bool> {
    Ok(conn
        .query_row(
            &format!("SELECT 1 FROM {} WHERE id = ?1", table),
            params![id.as_str()],
            |_| Ok(()),
        )
        .optional()?
        .is_some())
}

fn collect_rows<T: RelationalRecord>(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<(i64, T)>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, |row| Ok((row.get::<_, i64>("seq")?, T::from_row(row)?)))?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

#[async_trait]
impl<T: RelationalRecord> Repository<T> for SqliteRepository<T> {
    async fn create(&self, mut record: T) -> Result<T> {
        self.conn
            .run(move |conn| {
                let mut id = RecordId::generate();
                while id_exists(conn, T::TABLE, &id)? {
                    id = RecordId::generate();
                }
                record.set_id(id);

                let placeholders: Vec<String> =
                    (1..=T::COLUMNS.len()).map(|i| format!("?{}", i)).collect();
                conn.execute(
                    &format!(
                        "INSERT INTO {} ({}) VALUES ({})",
                        T::TABLE,
                        T::COLUMNS.join(", "),
                        placeholders.join(", ")
                    ),
                    params_from_iter(record.to_values()?),
                )?;
                debug!(kind = %T::KIND, id = %record.id(), "row inserted");
                Ok(record)
            })
            .await
    }

    async fn get_by_id(&self, id: &RecordId) -> Result<Option<T>> {
        let id = id.clone();
        self.conn
            .run(move |conn| {
                let sql = Self::select_sql("WHERE id = ?1");
                Ok(collect_rows::<T>(conn, &sql, params![id.as_str()])?
                    .into_iter()
                    .next()
                    .map(|(_, record)| record))
            })
            .await
    }

    async fn get_all(&self) -> Result<Vec<T>> {
        self.conn
            .run(|conn| {
                let sql = Self::select_sql("ORDER BY seq");
                Ok(collect_rows::<T>(conn, &sql, [])?
                    .into_iter()
                    .map(|(_, record)| record)
                    .collect())
            })
            .await
    }

    async fn update(&self, record: T) -> Result<bool> {
        self.conn
            .run(move |conn| {
                let assignments: Vec<String> = T::COLUMNS
                    .iter()
                    .enumerate()
                    .skip(1)
                    .map(|(i, col)| format!("{} = ?{}", col, i + 1))
                    .collect();
                let changed = conn.execute(
                    &format!(
                        "UPDATE {} SET {} WHERE id = ?1",
                        T::TABLE,
                        assignments.join(", ")
                    ),
                    params_from_iter(record.to_values()?),
                )?;
                Ok(changed > 0)
            })
            .await
    }

    async fn delete(&self, id: &RecordId) -> Result<bool> {
        let id = id.clone();
        self.conn
            .run(move |conn| {
                let changed = conn.execute(
                    &format!("DELETE FROM {} WHERE id = ?1", T::TABLE),
                    params![id.as_str()],
                )?;
                Ok(changed > 0)
            })
            .await
    }

    async fn get_new_since_cursor(&self) -> Result<Vec<T>> {
        let cursor = Arc::clone(&self.cursor);
        self.conn
            .run(move |conn| {
                let mut cursor = cursor.lock().unwrap_or_else(PoisonError::into_inner);
                let sql = Self::select_sql("WHERE seq > ?1 ORDER BY seq");
                let rows = collect_rows::<T>(conn, &sql, params![*cursor])?;
                if let Some((seq, _)) = rows.last() {
                    *cursor = *seq;
                }
                Ok(rows.into_iter().map(|(_, record)| record).collect())
            })
            .await
    }
}

/// Open relational repositories for all three record types on one database.
pub fn open_sqlite_repositories(path: impl AsRef<Path>) -> Result<RepositorySet> {
    let path = path.as_ref();
    let conn = SharedConnection::open(path)?;
    info!(path = %path.display(), "relational store opened");
    sqlite_repositories(conn)
}

/// In-memory variant of [`open_sqlite_repositories`].
pub fn open_sqlite_repositories_memory() -> Result<RepositorySet> {
    sqlite_repositories(SharedConnection::open_memory()?)
}

fn sqlite_repositories(conn: SharedConnection) -> Result<RepositorySet> {
    Ok(RepositorySet::new(
        Arc::new(SqliteRepository::<ConversionRequest>::new(conn.clone())?),
        Arc::new(SqliteRepository::<ConversionResponse>::new(conn.clone())?),
        Arc::new(SqliteRepository::<ConversionLog>::new(conn)?),
    ))
}
