//! Relational sessions.

use crate::error::{BackendError, BackendErrorKind};
use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::types::ValueRef;
use rusqlite::{params, Connection, ErrorCode};
use serde_json::Value;
use std::path::Path;

/// Caller-owned relational connection
#[async_trait]
pub trait SqlSession: Send + Sync {
    /// Run every statement as one transaction, returning the affected row count
    async fn execute(&self, statements: &[String]) -> Result<usize, BackendError>;

    /// Run a query, returning the raw column values of every row
    async fn query(&self, sql: &str) -> Result<Vec<Vec<Value>>, BackendError>;

    /// Run an INSERT and return the identity assigned to the new row
    async fn insert_returning_id(&self, sql: &str) -> Result<i64, BackendError>;
}

/// [`SqlSession`] over a rusqlite connection
pub struct SqliteSession {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteSession").finish_non_exhaustive()
    }
}

fn backend_error(err: rusqlite::Error) -> BackendError {
    let kind = match err.sqlite_error_code() {
        Some(ErrorCode::ConstraintViolation) => BackendErrorKind::Constraint,
        _ => BackendErrorKind::Io,
    };
    BackendError::new(kind, err.to_string())
}

fn value_from_ref(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Value::from(f),
        ValueRef::Text(bytes) => Value::from(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::from(bytes.to_vec()),
    }
}

impl SqliteSession {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self, BackendError> {
        Ok(Self::new(Connection::open(path).map_err(backend_error)?))
    }

    pub fn open_in_memory() -> Result<Self, BackendError> {
        Ok(Self::new(Connection::open_in_memory().map_err(backend_error)?))
    }
}

#[async_trait]
impl SqlSession for SqliteSession {
    async fn execute(&self, statements: &[String]) -> Result<usize, BackendError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(backend_error)?;
        let mut affected = 0;
        for (index, sql) in statements.iter().enumerate() {
            affected += tx
                .execute(sql, params![])
                .map_err(|err| backend_error(err).at(index))?;
        }
        tx.commit().map_err(backend_error)?;
        Ok(affected)
    }

    async fn query(&self, sql: &str) -> Result<Vec<Vec<Value>>, BackendError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(sql).map_err(backend_error)?;
        let columns = stmt.column_count();
        let rows = stmt
            .query_map(params![], |row| {
                (0..columns)
                    .map(|i| row.get_ref(i).map(value_from_ref))
                    .collect::<rusqlite::Result<Vec<Value>>>()
            })
            .map_err(backend_error)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(backend_error)
    }

    async fn insert_returning_id(&self, sql: &str) -> Result<i64, BackendError> {
        let conn = self.conn.lock();
        conn.execute(sql, params![]).map_err(backend_error)?;
        Ok(conn.last_insert_rowid())
    }
}
