//! Database schema migrations for SQLite.
//!
//! Each migration transforms the schema from version N-1 to N. Version 1
//! holds the relational tables, version 2 the document tables.

use rusqlite::Connection;

use crate::error::{Result, StoreError};

/// Highest schema version this build knows how to reach.
pub const CURRENT_VERSION: u32 = 2;

type Step = fn(&Connection) -> Result<()>;

/// Ordered migration steps; entry `i` brings the schema to version `i + 1`.
const STEPS: [Step; CURRENT_VERSION as usize] = [apply_v1, apply_v2];

/// Bring the schema up to [`CURRENT_VERSION`], applying only missing steps.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let applied = get_version(conn)?;
    if applied > CURRENT_VERSION {
        return Err(StoreError::Migration(format!(
            "database is at schema version {applied}, newer than {CURRENT_VERSION}"
        )));
    }
    if applied == CURRENT_VERSION {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for (version, step) in (1..=CURRENT_VERSION).zip(STEPS).skip(applied as usize) {
        step(&tx)?;
        tx.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
            rusqlite::params![version, chrono::Utc::now().timestamp_millis()],
        )?;
    }
    tx.commit()?;
    Ok(())
}

/// Highest applied version, or 0 on a fresh database.
pub fn get_version(conn: &Connection) -> Result<u32> {
    let version = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;
    Ok(version)
}

/// Migration v1: relational tables, one per record type.
///
/// `seq` is never reused, so it doubles as the cursor position.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE requests (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            id TEXT NOT NULL UNIQUE,
            from_currency TEXT NOT NULL,
            to_currency TEXT NOT NULL,
            amount REAL NOT NULL
        );

        CREATE TABLE responses (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            id TEXT NOT NULL UNIQUE,
            success INTEGER NOT NULL,
            terms TEXT NOT NULL,
            privacy TEXT NOT NULL,
            query TEXT NOT NULL,              -- JSON snapshot of the request
            info_timestamp INTEGER NOT NULL,  -- Unix seconds
            quote REAL NOT NULL,
            result REAL NOT NULL
        );

        CREATE TABLE conversion_logs (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            id TEXT NOT NULL UNIQUE,
            timestamp TEXT NOT NULL,          -- RFC 3339
            request TEXT NOT NULL,            -- JSON snapshot
            response TEXT NOT NULL            -- JSON snapshot
        );
        "#,
    )?;
    Ok(())
}

/// Migration v2: document collections and their change journal.
fn apply_v2(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE documents (
            collection TEXT NOT NULL,
            id TEXT NOT NULL,
            body TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            PRIMARY KEY (collection, id)
        );

        CREATE TABLE document_changes (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            collection TEXT NOT NULL,
            record_id TEXT NOT NULL,
            action TEXT NOT NULL,
            at INTEGER NOT NULL
        );

        CREATE INDEX idx_document_changes_collection ON document_changes(collection, seq);
        "#,
    )?;
    Ok(())
}
