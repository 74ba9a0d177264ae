//! Relational Mapping
//!
//! One table per Poco, Dictionary or Set shape, laid out as head-key columns, an
//! optional entry-key column and value columns, with a composite primary key over
//! head keys and entry key. Statements are rendered as literal SQL text by a
//! [`SqlProvider`] dialect and submitted through a caller-owned [`SqlSession`];
//! every statement of one mapper call goes out as one batch.

mod container;
mod dictionary;
mod poco;
mod session;
mod set;

pub use container::ContainerTable;
pub use dictionary::DictionaryTable;
pub use poco::PocoTable;
pub use session::{SqlSession, SqliteSession};
pub use set::SetTable;

use super::{check_arity, display_keys, Key, Mapper};
use crate::change::{from_value, to_value, ChangeSet};
use crate::error::{BackendError, BackendErrorKind, MapperError};
use crate::registry::{Shape, ValueKind};
use crate::tracker::ChangeSource;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, trace};

const BACKEND: &str = "sql";

/// Column definition for head keys, entry keys and single value columns
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    pub kind: ValueKind,
    pub length: Option<usize>,
    /// Value assigned by the backend on insert
    pub identity: bool,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            name: name.into(),
            kind,
            length: None,
            identity: false,
        }
    }

    pub fn with_length(mut self, length: usize) -> Self {
        self.length = Some(length);
        self
    }

    pub fn identity(mut self) -> Self {
        self.identity = true;
        self
    }
}

/// SQL dialect: name escaping, type names, literals and DDL
pub trait SqlProvider: fmt::Debug + Send + Sync {
    fn escape_name(&self, name: &str) -> String;

    fn sql_type(&self, kind: ValueKind, length: Option<usize>) -> String;

    /// Render a dynamic value as a literal of the given column kind
    fn literal(&self, value: &Value, kind: ValueKind) -> Result<String, MapperError>;

    /// Convert a raw column value read back from the backend
    fn decode(&self, raw: Value, kind: ValueKind) -> Result<Value, MapperError>;

    fn build_create_table(
        &self,
        table: &str,
        columns: &[ColumnDef],
        primary_keys: &[String],
        drop_if_exists: bool,
    ) -> Result<Vec<String>, MapperError>;
}

/// SQLite dialect
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteProvider;

fn quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

fn render_error(value: &Value, kind: ValueKind) -> MapperError {
    MapperError::Schema(format!("Cannot render {} as {:?}", value, kind))
}

impl SqlProvider for SqliteProvider {
    fn escape_name(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    fn sql_type(&self, kind: ValueKind, length: Option<usize>) -> String {
        match (kind, length) {
            (ValueKind::Bool | ValueKind::Int, _) => "INTEGER".to_string(),
            (ValueKind::Float, _) => "REAL".to_string(),
            (ValueKind::Text, Some(length)) => format!("VARCHAR({})", length),
            (ValueKind::Text | ValueKind::Json, _) => "TEXT".to_string(),
            (ValueKind::Bytes, _) => "BLOB".to_string(),
        }
    }

    fn literal(&self, value: &Value, kind: ValueKind) -> Result<String, MapperError> {
        if value.is_null() {
            return Ok("NULL".to_string());
        }
        match (kind, value) {
            (ValueKind::Bool | ValueKind::Int, Value::Bool(b)) => {
                Ok(if *b { "1" } else { "0" }.to_string())
            }
            (ValueKind::Bool | ValueKind::Int | ValueKind::Float, Value::Number(n)) => {
                Ok(n.to_string())
            }
            (ValueKind::Int, Value::String(s)) => s
                .parse::<i64>()
                .map(|i| i.to_string())
                .map_err(|_| render_error(value, kind)),
            (ValueKind::Float, Value::String(s)) => s
                .parse::<f64>()
                .map(|f| f.to_string())
                .map_err(|_| render_error(value, kind)),
            (ValueKind::Text, Value::String(s)) => Ok(quote(s)),
            (ValueKind::Text, other) => Ok(quote(&other.to_string())),
            (ValueKind::Bytes, Value::Array(items)) => {
                let mut hex = String::with_capacity(items.len() * 2 + 3);
                hex.push_str("X'");
                for item in items {
                    let byte = item
                        .as_u64()
                        .filter(|b| *b <= u8::MAX as u64)
                        .ok_or_else(|| render_error(value, kind))?;
                    hex.push_str(&format!("{:02X}", byte));
                }
                hex.push('\'');
                Ok(hex)
            }
            (ValueKind::Json, other) => Ok(quote(&other.to_string())),
            _ => Err(render_error(value, kind)),
        }
    }

    fn decode(&self, raw: Value, kind: ValueKind) -> Result<Value, MapperError> {
        match (kind, raw) {
            (_, Value::Null) => Ok(Value::Null),
            (ValueKind::Bool, Value::Number(n)) => Ok(Value::Bool(n.as_i64() != Some(0))),
            (ValueKind::Json, Value::String(text)) => Ok(serde_json::from_str(&text)?),
            (_, raw) => Ok(raw),
        }
    }

    fn build_create_table(
        &self,
        table: &str,
        columns: &[ColumnDef],
        primary_keys: &[String],
        drop_if_exists: bool,
    ) -> Result<Vec<String>, MapperError> {
        let identity = columns.iter().find(|c| c.identity);
        if let Some(identity) = identity {
            if primary_keys.len() != 1 || primary_keys[0] != identity.name {
                return Err(MapperError::Schema(format!(
                    "Identity column {} must be the only primary key of {}",
                    identity.name, table
                )));
            }
        }

        let mut definitions: Vec<String> = columns
            .iter()
            .map(|column| {
                let mut definition = format!(
                    "{} {}",
                    self.escape_name(&column.name),
                    self.sql_type(column.kind, column.length)
                );
                if column.identity {
                    definition.push_str(" PRIMARY KEY AUTOINCREMENT");
                } else if primary_keys.contains(&column.name) {
                    definition.push_str(" NOT NULL");
                }
                definition
            })
            .collect();
        if identity.is_none() && !primary_keys.is_empty() {
            let keys: Vec<String> = primary_keys.iter().map(|k| self.escape_name(k)).collect();
            definitions.push(format!("PRIMARY KEY ({})", keys.join(", ")));
        }

        let mut statements = Vec::new();
        if drop_if_exists {
            statements.push(format!("DROP TABLE IF EXISTS {}", self.escape_name(table)));
        }
        statements.push(format!(
            "CREATE TABLE {} ({})",
            self.escape_name(table),
            definitions.join(", ")
        ));
        Ok(statements)
    }
}

/// Conjunction of `column = literal` terms, or `None` when `pairs` is empty
pub(crate) fn where_clause(
    provider: &dyn SqlProvider,
    pairs: &[(&ColumnDef, Value)],
) -> Result<Option<String>, MapperError> {
    if pairs.is_empty() {
        return Ok(None);
    }
    let terms = pairs
        .iter()
        .map(|(column, value)| {
            Ok(format!(
                "{} = {}",
                provider.escape_name(&column.name),
                provider.literal(value, column.kind)?
            ))
        })
        .collect::<Result<Vec<_>, MapperError>>()?;
    Ok(Some(terms.join(" AND ")))
}

pub(crate) fn with_where(sql: String, clause: Option<String>) -> String {
    match clause {
        Some(clause) => format!("{} WHERE {}", sql, clause),
        None => sql,
    }
}

/// Head-key columns paired with the leading key components
pub(crate) fn head_pairs<'a>(
    head_keys: &'a [ColumnDef],
    keys: &[Key],
) -> Vec<(&'a ColumnDef, Value)> {
    head_keys.iter().zip(keys).map(|(c, k)| (c, k.to_value())).collect()
}

/// Multi-row INSERT statements, at most `max_rows` rows each
pub(crate) fn insert_batches(
    provider: &dyn SqlProvider,
    table: &str,
    columns: &[&ColumnDef],
    rows: &[Vec<Value>],
    max_rows: usize,
) -> Result<Vec<String>, MapperError> {
    let names: Vec<String> = columns.iter().map(|c| provider.escape_name(&c.name)).collect();
    let header = format!(
        "INSERT INTO {} ({}) VALUES ",
        provider.escape_name(table),
        names.join(", ")
    );
    let mut statements = Vec::new();
    for chunk in rows.chunks(max_rows.max(1)) {
        let tuples = chunk
            .iter()
            .map(|row| {
                let literals = columns
                    .iter()
                    .zip(row)
                    .map(|(column, value)| provider.literal(value, column.kind))
                    .collect::<Result<Vec<_>, MapperError>>()?;
                Ok(format!("({})", literals.join(", ")))
            })
            .collect::<Result<Vec<_>, MapperError>>()?;
        statements.push(format!("{}{}", header, tuples.join(", ")));
    }
    Ok(statements)
}

/// Statement builder for one table layout, working on dynamic values
pub trait Table: fmt::Debug + Send + Sync {
    fn shape(&self) -> Shape;

    /// Number of leading key components identifying the row family
    fn head_count(&self) -> usize;

    fn create_table(&self, drop_if_exists: bool) -> Result<Vec<String>, MapperError>;

    fn insert(&self, value: &Value, keys: &[Key]) -> Result<Vec<String>, MapperError>;

    fn update(&self, change_set: &ChangeSet, keys: &[Key]) -> Result<Vec<String>, MapperError>;

    fn delete(&self, keys: &[Key]) -> Result<Vec<String>, MapperError>;

    /// Queries whose results `decode` consumes, in order
    fn select(&self, keys: &[Key]) -> Result<Vec<String>, MapperError>;

    fn decode(
        &self,
        results: Vec<Vec<Vec<Value>>>,
        keys: &[Key],
    ) -> Result<Option<Value>, MapperError>;

    /// Every row matched by `select`, one value each
    fn decode_rows(&self, _results: Vec<Vec<Vec<Value>>>) -> Result<Vec<Value>, MapperError> {
        Err(MapperError::UnsupportedOperation {
            backend: BACKEND,
            operation: format!("load_all on a {:?} table", self.shape()),
        })
    }

    /// Field whose value the backend assigns on insert
    fn identity_field(&self) -> Option<&str> {
        None
    }

    /// True when `keys` address a sub-value rather than the root value
    fn is_partial(&self, keys: &[Key]) -> bool {
        keys.len() > self.head_count()
    }
}

/// Error mapping for inserts of a new root value
///
/// Only there does a constraint violation mean the primary key already exists.
fn duplicate_on_constraint(err: BackendError) -> MapperError {
    match err.kind {
        BackendErrorKind::Constraint => MapperError::Duplicate(err.message),
        _ => MapperError::Backend(err),
    }
}

/// Typed relational mapper over a [`Table`] layout
#[derive(Debug)]
pub struct SqlMapper<T> {
    table: Arc<dyn Table>,
    _value: PhantomData<fn() -> T>,
}

impl<T> Clone for SqlMapper<T> {
    fn clone(&self) -> Self {
        Self {
            table: self.table.clone(),
            _value: PhantomData,
        }
    }
}

impl<T> SqlMapper<T> {
    pub fn from_table(table: impl Table + 'static) -> Self {
        Self {
            table: Arc::new(table),
            _value: PhantomData,
        }
    }

    pub fn table(&self) -> &dyn Table {
        self.table.as_ref()
    }

    /// Issue the table DDL, optionally dropping an existing table first
    pub async fn create_table(
        &self,
        session: &dyn SqlSession,
        drop_if_exists: bool,
    ) -> Result<usize, MapperError> {
        let statements = self.table.create_table(drop_if_exists)?;
        debug!(statements = statements.len(), "Creating table");
        Ok(session.execute(&statements).await?)
    }

    /// Load a sub-value addressed by a key path longer than the head keys
    pub async fn load_partial<U: DeserializeOwned>(
        &self,
        session: &dyn SqlSession,
        keys: &[Key],
    ) -> Result<Option<U>, MapperError> {
        check_arity(keys, self.table.head_count())?;
        match self.query(session, keys).await? {
            Some(value) => Ok(Some(from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Load every row whose keys start with `keys`
    pub async fn load_all(
        &self,
        session: &dyn SqlSession,
        keys: &[Key],
    ) -> Result<Vec<T>, MapperError>
    where
        T: DeserializeOwned,
    {
        check_arity(keys, self.table.head_count())?;
        let results = self.fetch(session, keys).await?;
        self.table
            .decode_rows(results)?
            .into_iter()
            .map(|value| Ok(from_value(value)?))
            .collect()
    }

    async fn query(
        &self,
        session: &dyn SqlSession,
        keys: &[Key],
    ) -> Result<Option<Value>, MapperError> {
        let results = self.fetch(session, keys).await?;
        self.table.decode(results, keys)
    }

    async fn fetch(
        &self,
        session: &dyn SqlSession,
        keys: &[Key],
    ) -> Result<Vec<Vec<Vec<Value>>>, MapperError> {
        let queries = self.table.select(keys)?;
        let mut results = Vec::with_capacity(queries.len());
        for sql in &queries {
            trace!(%sql, "Query");
            results.push(session.query(sql).await?);
        }
        debug!(keys = %display_keys(keys), queries = queries.len(), "Loaded rows");
        Ok(results)
    }

    async fn submit(
        &self,
        session: &dyn SqlSession,
        statements: Vec<String>,
        keys: &[Key],
    ) -> Result<usize, BackendError> {
        if statements.is_empty() {
            return Ok(0);
        }
        for sql in &statements {
            trace!(%sql, "Statement");
        }
        debug!(keys = %display_keys(keys), statements = statements.len(), "Executing batch");
        session.execute(&statements).await
    }
}

#[async_trait]
impl<T> Mapper for SqlMapper<T>
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    type Session = dyn SqlSession;
    type Value = T;

    async fn create(
        &self,
        session: &Self::Session,
        value: &T,
        keys: &[Key],
    ) -> Result<usize, MapperError> {
        check_arity(keys, self.table.head_count())?;
        let statements = self.table.insert(&to_value(value)?, keys)?;
        self.submit(session, statements, keys)
            .await
            .map_err(duplicate_on_constraint)
    }

    async fn load(&self, session: &Self::Session, keys: &[Key]) -> Result<Option<T>, MapperError> {
        check_arity(keys, self.table.head_count())?;
        if self.table.is_partial(keys) {
            return Err(MapperError::UnsupportedOperation {
                backend: BACKEND,
                operation: "load of a sub-path; use load_partial".to_string(),
            });
        }
        match self.query(session, keys).await? {
            Some(value) => Ok(Some(from_value(value)?)),
            None => Ok(None),
        }
    }

    async fn save(
        &self,
        session: &Self::Session,
        changes: &dyn ChangeSource,
        keys: &[Key],
    ) -> Result<usize, MapperError> {
        check_arity(keys, self.table.head_count())?;
        if !changes.has_change() {
            return Ok(0);
        }
        let statements = self.table.update(&changes.change_set()?, keys)?;
        Ok(self.submit(session, statements, keys).await?)
    }

    async fn delete(&self, session: &Self::Session, keys: &[Key]) -> Result<usize, MapperError> {
        check_arity(keys, self.table.head_count())?;
        let statements = self.table.delete(keys)?;
        Ok(self.submit(session, statements, keys).await?)
    }
}
