use super::{
    head_pairs, insert_batches, where_clause, with_where, ColumnDef, SqlMapper, SqlProvider,
    SqlSession, SqliteProvider, Table,
};
use crate::change::{key_string, ChangeSet, DictionaryOperation};
use crate::config::{SqlSettings, DEFAULT_MAX_BATCH_ROWS};
use crate::error::MapperError;
use crate::mapper::{check_arity, Key};
use crate::registry::{Schema, Shape};
use crate::trackable::{Element, MapKey, TrackableDictionary};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::sync::Arc;

static NULL: Value = Value::Null;

/// Value layout of a dictionary table
#[derive(Debug, Clone)]
enum ValueColumns {
    Single(ColumnDef),
    /// Scalar fields of a Poco value, one column each
    Poco(Arc<Schema>),
}

/// One row per entry: head keys, entry key, value column(s)
#[derive(Debug, Clone)]
pub struct DictionaryTable {
    provider: Arc<dyn SqlProvider>,
    name: String,
    head_keys: Vec<ColumnDef>,
    key_column: ColumnDef,
    values: ValueColumns,
    max_batch_rows: usize,
}

impl DictionaryTable {
    /// Table storing each value in a single column
    pub fn new(name: impl Into<String>, key_column: ColumnDef, value_column: ColumnDef) -> Self {
        Self::with_values(name, key_column, ValueColumns::Single(value_column))
    }

    /// Table storing Poco values, one column per scalar field
    pub fn with_poco_values(
        name: impl Into<String>,
        key_column: ColumnDef,
        schema: Arc<Schema>,
    ) -> Self {
        Self::with_values(name, key_column, ValueColumns::Poco(schema))
    }

    fn with_values(name: impl Into<String>, key_column: ColumnDef, values: ValueColumns) -> Self {
        Self {
            provider: Arc::new(SqliteProvider),
            name: name.into(),
            head_keys: Vec::new(),
            key_column,
            values,
            max_batch_rows: DEFAULT_MAX_BATCH_ROWS,
        }
    }

    pub fn with_provider(mut self, provider: impl SqlProvider + 'static) -> Self {
        self.provider = Arc::new(provider);
        self
    }

    pub fn with_head_key(mut self, column: ColumnDef) -> Self {
        self.head_keys.push(column);
        self
    }

    /// Cap on the rows of one multi-row INSERT
    pub fn with_max_batch_rows(mut self, max_batch_rows: usize) -> Self {
        self.max_batch_rows = max_batch_rows.max(1);
        self
    }

    pub fn with_settings(self, settings: &SqlSettings) -> Self {
        self.with_max_batch_rows(settings.max_batch_rows)
    }

    fn value_columns(&self) -> Vec<(Option<String>, ColumnDef)> {
        match &self.values {
            ValueColumns::Single(column) => vec![(None, column.clone())],
            ValueColumns::Poco(schema) => schema
                .value_fields()
                .map(|f| (Some(f.name.clone()), ColumnDef::new(f.stored_name(), f.kind)))
                .collect(),
        }
    }

    fn value_cells(&self, value: &Value) -> Vec<Value> {
        self.value_columns()
            .into_iter()
            .map(|(field, _)| match field {
                None => value.clone(),
                Some(field) => value.get(&field).cloned().unwrap_or(Value::Null),
            })
            .collect()
    }

    fn decode_value(&self, raw: Vec<Value>) -> Result<Value, MapperError> {
        let mut decoded = Vec::with_capacity(raw.len());
        for ((_, column), raw) in self.value_columns().into_iter().zip(raw) {
            decoded.push(self.provider.decode(raw, column.kind)?);
        }
        match &self.values {
            ValueColumns::Single(_) => Ok(decoded.into_iter().next().unwrap_or(Value::Null)),
            ValueColumns::Poco(_) => {
                let mut object = Map::new();
                for ((field, _), value) in self.value_columns().into_iter().zip(decoded) {
                    if let Some(field) = field {
                        object.insert(field, value);
                    }
                }
                Ok(Value::Object(object))
            }
        }
    }

    fn rows<'a>(
        &self,
        keys: &[Key],
        entries: impl Iterator<Item = (Value, &'a Value)>,
    ) -> Vec<Vec<Value>> {
        let head: Vec<Value> = keys
            .iter()
            .take(self.head_keys.len())
            .map(Key::to_value)
            .collect();
        entries
            .map(|(key, value)| {
                let mut row = head.clone();
                row.push(key);
                row.extend(self.value_cells(value));
                row
            })
            .collect()
    }

    fn columns(&self) -> Vec<ColumnDef> {
        let mut columns = self.head_keys.clone();
        columns.push(self.key_column.clone());
        columns.extend(self.value_columns().into_iter().map(|(_, c)| c));
        columns
    }

    fn head_clause(&self, keys: &[Key]) -> Result<Option<String>, MapperError> {
        where_clause(self.provider.as_ref(), &head_pairs(&self.head_keys, keys))
    }

    /// Head-key terms plus the entry key when the path addresses one entry
    fn entry_clause(&self, keys: &[Key]) -> Result<Option<String>, MapperError> {
        let mut pairs = head_pairs(&self.head_keys, keys);
        if let Some(key) = keys.get(self.head_keys.len()) {
            pairs.push((&self.key_column, key.to_value()));
        }
        where_clause(self.provider.as_ref(), &pairs)
    }

    fn key_term(&self, key: &Value, keys: &[Key]) -> Result<Option<String>, MapperError> {
        let mut pairs = head_pairs(&self.head_keys, keys);
        pairs.push((&self.key_column, key.clone()));
        where_clause(self.provider.as_ref(), &pairs)
    }
}

impl Table for DictionaryTable {
    fn shape(&self) -> Shape {
        Shape::Dictionary
    }

    fn head_count(&self) -> usize {
        self.head_keys.len()
    }

    fn create_table(&self, drop_if_exists: bool) -> Result<Vec<String>, MapperError> {
        let mut primary_keys: Vec<String> = self.head_keys.iter().map(|c| c.name.clone()).collect();
        primary_keys.push(self.key_column.name.clone());
        self.provider
            .build_create_table(&self.name, &self.columns(), &primary_keys, drop_if_exists)
    }

    fn insert(&self, value: &Value, keys: &[Key]) -> Result<Vec<String>, MapperError> {
        let Value::Object(entries) = value else {
            return Err(MapperError::Schema(format!("Expected a map for table {}", self.name)));
        };
        let rows = self.rows(keys, entries.iter().map(|(k, v)| (Value::from(k.as_str()), v)));
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let columns = self.columns();
        let columns: Vec<&ColumnDef> = columns.iter().collect();
        insert_batches(self.provider.as_ref(), &self.name, &columns, &rows, self.max_batch_rows)
    }

    fn update(&self, change_set: &ChangeSet, keys: &[Key]) -> Result<Vec<String>, MapperError> {
        let ChangeSet::Dictionary(changes) = change_set else {
            return Err(change_set.mismatch(Shape::Dictionary).into());
        };
        let mut statements = Vec::new();

        let removed: Vec<&Value> = changes
            .iter()
            .filter(|(_, c)| c.op == DictionaryOperation::Remove)
            .map(|(k, _)| k)
            .collect();
        if !removed.is_empty() {
            let literals = removed
                .iter()
                .map(|k| self.provider.literal(k, self.key_column.kind))
                .collect::<Result<Vec<_>, MapperError>>()?;
            let term = format!(
                "{} IN ({})",
                self.provider.escape_name(&self.key_column.name),
                literals.join(", ")
            );
            let clause = match self.head_clause(keys)? {
                Some(head) => format!("{} AND {}", head, term),
                None => term,
            };
            statements.push(format!(
                "DELETE FROM {} WHERE {}",
                self.provider.escape_name(&self.name),
                clause
            ));
        }

        for (key, change) in changes.iter().filter(|(_, c)| c.op == DictionaryOperation::Modify) {
            let new = change.new.as_ref().unwrap_or(&NULL);
            let assignments = self
                .value_columns()
                .iter()
                .zip(self.value_cells(new))
                .map(|((_, column), cell)| {
                    Ok(format!(
                        "{} = {}",
                        self.provider.escape_name(&column.name),
                        self.provider.literal(&cell, column.kind)?
                    ))
                })
                .collect::<Result<Vec<_>, MapperError>>()?;
            let sql = format!(
                "UPDATE {} SET {}",
                self.provider.escape_name(&self.name),
                assignments.join(", ")
            );
            statements.push(with_where(sql, self.key_term(key, keys)?));
        }

        let added = changes
            .iter()
            .filter(|(_, c)| c.op == DictionaryOperation::Add)
            .map(|(k, c)| (k.clone(), c.new.as_ref().unwrap_or(&NULL)));
        let rows = self.rows(keys, added);
        if !rows.is_empty() {
            let columns = self.columns();
            let columns: Vec<&ColumnDef> = columns.iter().collect();
            statements.extend(insert_batches(
                self.provider.as_ref(),
                &self.name,
                &columns,
                &rows,
                self.max_batch_rows,
            )?);
        }
        Ok(statements)
    }

    fn delete(&self, keys: &[Key]) -> Result<Vec<String>, MapperError> {
        let sql = format!("DELETE FROM {}", self.provider.escape_name(&self.name));
        Ok(vec![with_where(sql, self.entry_clause(keys)?)])
    }

    fn select(&self, keys: &[Key]) -> Result<Vec<String>, MapperError> {
        let mut names = vec![self.provider.escape_name(&self.key_column.name)];
        names.extend(
            self.value_columns()
                .iter()
                .map(|(_, c)| self.provider.escape_name(&c.name)),
        );
        let sql = with_where(
            format!(
                "SELECT {} FROM {}",
                names.join(", "),
                self.provider.escape_name(&self.name)
            ),
            self.entry_clause(keys)?,
        );
        Ok(vec![format!(
            "{} ORDER BY {}",
            sql,
            self.provider.escape_name(&self.key_column.name)
        )])
    }

    fn decode(
        &self,
        results: Vec<Vec<Vec<Value>>>,
        keys: &[Key],
    ) -> Result<Option<Value>, MapperError> {
        let rows = results.into_iter().next().unwrap_or_default();
        if rows.is_empty() {
            return Ok(None);
        }
        let partial = self.is_partial(keys);
        let mut map = Map::new();
        for row in rows {
            let mut cells = row.into_iter();
            let key = self
                .provider
                .decode(cells.next().unwrap_or(Value::Null), self.key_column.kind)?;
            let value = self.decode_value(cells.collect())?;
            if partial {
                return Ok(Some(value));
            }
            map.insert(key_string(&key), value);
        }
        Ok(Some(Value::Object(map)))
    }
}

impl<K: MapKey, V: Element> SqlMapper<TrackableDictionary<K, V>> {
    /// Load the single entry addressed by head keys plus an entry key
    pub async fn load_entry(
        &self,
        session: &dyn SqlSession,
        keys: &[Key],
    ) -> Result<Option<V>, MapperError>
    where
        V: DeserializeOwned,
    {
        check_arity(keys, self.table.head_count() + 1)?;
        self.load_partial(session, keys).await
    }
}
