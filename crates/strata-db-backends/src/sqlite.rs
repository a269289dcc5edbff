//! SQLite database backend using `rusqlite`.
//!
//! This module provides the [`SqliteBackend`] which implements the
//! [`DatabaseBackend`](crate::base::DatabaseBackend) trait using `rusqlite`
//! wrapped in `tokio::task::spawn_blocking` for async compatibility.
//!
//! Features:
//! - A single handle behind an async `Mutex`; concurrent callers queue on it
//! - In-memory database support via the `:memory:` path (great for testing)
//! - The parent directory of a file database is created on open

use std::path::{Path, PathBuf};
use std::sync::Arc;

use strata_core::{StrataError, StrataResult};
use strata_db::dialect::Dialect;
use strata_db::executor::{QueryOutput, StatementKind};
use strata_db::row::Row;
use strata_db::value::Value;
use tokio::sync::Mutex;

use crate::base::{connection_error, driver_error, DatabaseBackend};

const VENDOR: &str = "sqlite";

/// A SQLite database backend.
///
/// Uses `rusqlite` with a `Mutex`-based concurrency model. All operations
/// run via `tokio::task::spawn_blocking` to avoid blocking the runtime.
pub struct SqliteBackend {
    /// The path to the database file (or ":memory:").
    path: PathBuf,
    /// The connection; `None` once closed.
    conn: Arc<Mutex<Option<rusqlite::Connection>>>,
}

impl SqliteBackend {
    /// Opens a SQLite database at the given path.
    ///
    /// If the path is `:memory:`, an in-memory database is created. For
    /// file databases the parent directory is created when missing and WAL
    /// journaling is turned on.
    pub fn open(path: impl Into<PathBuf>) -> StrataResult<Self> {
        let path = path.into();
        let in_memory = path.to_str() == Some(":memory:");
        let conn = if in_memory {
            rusqlite::Connection::open_in_memory()
        } else {
            if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                std::fs::create_dir_all(dir)?;
            }
            rusqlite::Connection::open(&path)
        }
        .map_err(|e| connection_error(VENDOR, e))?;

        let pragmas = if in_memory {
            "PRAGMA foreign_keys=ON;"
        } else {
            "PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;"
        };
        conn.execute_batch(pragmas)
            .map_err(|e| connection_error(VENDOR, e))?;

        tracing::debug!(path = %path.display(), "opened sqlite database");
        Ok(Self {
            path,
            conn: Arc::new(Mutex::new(Some(conn))),
        })
    }

    /// Opens an in-memory database (convenience constructor).
    pub fn memory() -> StrataResult<Self> {
        Self::open(":memory:")
    }

    /// Returns the database file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Binds values to a prepared statement, 1-based.
    fn bind_params(stmt: &mut rusqlite::Statement<'_>, params: &[Value]) -> rusqlite::Result<()> {
        for (i, param) in params.iter().enumerate() {
            let idx = i + 1;
            match param {
                Value::Null => stmt.raw_bind_parameter(idx, rusqlite::types::Null),
                Value::Bool(b) => stmt.raw_bind_parameter(idx, b),
                Value::Int(v) => stmt.raw_bind_parameter(idx, v),
                Value::Float(v) => stmt.raw_bind_parameter(idx, v),
                Value::String(s) => stmt.raw_bind_parameter(idx, s.as_str()),
                Value::Bytes(b) => stmt.raw_bind_parameter(idx, b.as_slice()),
                Value::DateTimeTz(dt) => stmt.raw_bind_parameter(idx, dt.to_rfc3339()),
                Value::Json(j) => stmt.raw_bind_parameter(idx, j.to_string()),
                Value::Date(_) | Value::DateTime(_) | Value::Time(_) | Value::Uuid(_) => {
                    stmt.raw_bind_parameter(idx, param.to_string())
                }
            }?;
        }
        Ok(())
    }

    /// Converts a `rusqlite::Row` to our generic `Row`.
    fn convert_row(sqlite_row: &rusqlite::Row<'_>, column_names: &[String]) -> Row {
        let values: Vec<Value> = (0..column_names.len())
            .map(|i| {
                let val_ref = sqlite_row
                    .get_ref(i)
                    .unwrap_or(rusqlite::types::ValueRef::Null);
                match val_ref {
                    rusqlite::types::ValueRef::Null => Value::Null,
                    rusqlite::types::ValueRef::Integer(v) => Value::Int(v),
                    rusqlite::types::ValueRef::Real(v) => Value::Float(v),
                    rusqlite::types::ValueRef::Text(b) => {
                        Value::String(String::from_utf8_lossy(b).to_string())
                    }
                    rusqlite::types::ValueRef::Blob(b) => Value::Bytes(b.to_vec()),
                }
            })
            .collect();

        Row::new(column_names.to_vec(), values)
    }

    /// Runs one statement on a locked connection.
    fn run(conn: &rusqlite::Connection, sql: &str, params: &[Value]) -> rusqlite::Result<QueryOutput> {
        let kind = StatementKind::classify(sql);

        // Schema scripts may hold several statements.
        if kind == StatementKind::Ddl && params.is_empty() {
            conn.execute_batch(sql)?;
            return Ok(QueryOutput::Done);
        }

        let mut stmt = conn.prepare(sql)?;
        Self::bind_params(&mut stmt, params)?;

        if kind == StatementKind::Select || (kind == StatementKind::Other && stmt.column_count() > 0) {
            let column_names: Vec<String> = stmt
                .column_names()
                .into_iter()
                .map(String::from)
                .collect();
            let mut raw_rows = stmt.raw_query();
            let mut rows = Vec::new();
            while let Some(row) = raw_rows.next()? {
                rows.push(Self::convert_row(row, &column_names));
            }
            return Ok(QueryOutput::Rows(rows));
        }

        let affected = stmt.raw_execute()? as u64;
        let last_id = (kind == StatementKind::Insert).then(|| Value::Int(conn.last_insert_rowid()));
        Ok(QueryOutput::from_counts(kind, affected, last_id))
    }
}

#[async_trait::async_trait]
impl DatabaseBackend for SqliteBackend {
    fn vendor(&self) -> &str {
        VENDOR
    }

    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    async fn query(&self, sql: &str, params: &[Value]) -> StrataResult<QueryOutput> {
        let conn = self.conn.clone();
        let owned_sql = sql.to_string();
        let params = params.to_vec();

        let result = tokio::task::spawn_blocking(move || {
            let guard = conn.blocking_lock();
            let Some(conn) = guard.as_ref() else {
                return Ok(Err(StrataError::DriverError(
                    "SQLite connection is closed".to_string(),
                )));
            };
            Self::run(conn, &owned_sql, &params).map(Ok)
        })
        .await
        .map_err(|e| StrataError::DriverError(format!("Task join error: {e}")))?;

        result.map_err(|e| driver_error(VENDOR, sql, e))?
    }

    async fn schema_exists(&self) -> StrataResult<bool> {
        Ok(true)
    }

    async fn create_schema(&self) -> StrataResult<bool> {
        Ok(false)
    }

    async fn close(&self) -> StrataResult<()> {
        let conn = self.conn.lock().await.take();
        if let Some(conn) = conn {
            conn.close()
                .map_err(|(_, e)| StrataError::DriverError(format!("SQLite close failed: {e}")))?;
            tracing::debug!(path = %self.path.display(), "closed sqlite database");
        }
        Ok(())
    }
}
