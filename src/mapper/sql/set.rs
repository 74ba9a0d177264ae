use super::{
    head_pairs, insert_batches, where_clause, with_where, ColumnDef, SqlProvider, SqliteProvider,
    Table,
};
use crate::change::{ChangeSet, SetOperation};
use crate::config::{SqlSettings, DEFAULT_MAX_BATCH_ROWS};
use crate::error::MapperError;
use crate::mapper::Key;
use crate::registry::Shape;
use serde_json::Value;
use std::sync::Arc;

/// One row per member: head keys and the member column, all primary key
#[derive(Debug, Clone)]
pub struct SetTable {
    provider: Arc<dyn SqlProvider>,
    name: String,
    head_keys: Vec<ColumnDef>,
    value_column: ColumnDef,
    max_batch_rows: usize,
}

impl SetTable {
    pub fn new(name: impl Into<String>, value_column: ColumnDef) -> Self {
        Self {
            provider: Arc::new(SqliteProvider),
            name: name.into(),
            head_keys: Vec::new(),
            value_column,
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

    pub fn with_max_batch_rows(mut self, max_batch_rows: usize) -> Self {
        self.max_batch_rows = max_batch_rows.max(1);
        self
    }

    pub fn with_settings(self, settings: &SqlSettings) -> Self {
        self.with_max_batch_rows(settings.max_batch_rows)
    }

    fn columns(&self) -> Vec<&ColumnDef> {
        self.head_keys.iter().chain(Some(&self.value_column)).collect()
    }

    fn insert_members<'a>(
        &self,
        members: impl Iterator<Item = &'a Value>,
        keys: &[Key],
    ) -> Result<Vec<String>, MapperError> {
        let head: Vec<Value> = keys.iter().take(self.head_keys.len()).map(Key::to_value).collect();
        let rows: Vec<Vec<Value>> = members
            .map(|member| {
                let mut row = head.clone();
                row.push(member.clone());
                row
            })
            .collect();
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        insert_batches(
            self.provider.as_ref(),
            &self.name,
            &self.columns(),
            &rows,
            self.max_batch_rows,
        )
    }

    fn head_clause(&self, keys: &[Key]) -> Result<Option<String>, MapperError> {
        where_clause(self.provider.as_ref(), &head_pairs(&self.head_keys, keys))
    }
}

impl Table for SetTable {
    fn shape(&self) -> Shape {
        Shape::Set
    }

    fn head_count(&self) -> usize {
        self.head_keys.len()
    }

    fn create_table(&self, drop_if_exists: bool) -> Result<Vec<String>, MapperError> {
        let columns: Vec<ColumnDef> = self.columns().into_iter().cloned().collect();
        let primary_keys: Vec<String> = columns.iter().map(|c| c.name.clone()).collect();
        self.provider
            .build_create_table(&self.name, &columns, &primary_keys, drop_if_exists)
    }

    fn insert(&self, value: &Value, keys: &[Key]) -> Result<Vec<String>, MapperError> {
        let Value::Array(members) = value else {
            return Err(MapperError::Schema(format!("Expected a sequence for table {}", self.name)));
        };
        self.insert_members(members.iter(), keys)
    }

    fn update(&self, change_set: &ChangeSet, keys: &[Key]) -> Result<Vec<String>, MapperError> {
        let ChangeSet::Set(changes) = change_set else {
            return Err(change_set.mismatch(Shape::Set).into());
        };
        let mut statements = Vec::new();

        let removed = changes
            .iter()
            .filter(|(_, op)| *op == SetOperation::Remove)
            .map(|(member, _)| self.provider.literal(member, self.value_column.kind))
            .collect::<Result<Vec<_>, MapperError>>()?;
        if !removed.is_empty() {
            let term = format!(
                "{} IN ({})",
                self.provider.escape_name(&self.value_column.name),
                removed.join(", ")
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

        let added = changes
            .iter()
            .filter(|(_, op)| *op == SetOperation::Add)
            .map(|(member, _)| member);
        statements.extend(self.insert_members(added, keys)?);
        Ok(statements)
    }

    fn delete(&self, keys: &[Key]) -> Result<Vec<String>, MapperError> {
        let sql = format!("DELETE FROM {}", self.provider.escape_name(&self.name));
        Ok(vec![with_where(sql, self.head_clause(keys)?)])
    }

    fn select(&self, keys: &[Key]) -> Result<Vec<String>, MapperError> {
        let column = self.provider.escape_name(&self.value_column.name);
        let sql = with_where(
            format!("SELECT {} FROM {}", column, self.provider.escape_name(&self.name)),
            self.head_clause(keys)?,
        );
        Ok(vec![format!("{} ORDER BY {}", sql, column)])
    }

    fn decode(
        &self,
        results: Vec<Vec<Vec<Value>>>,
        _keys: &[Key],
    ) -> Result<Option<Value>, MapperError> {
        let rows = results.into_iter().next().unwrap_or_default();
        if rows.is_empty() {
            return Ok(None);
        }
        let members = rows
            .into_iter()
            .filter_map(|row| row.into_iter().next())
            .map(|raw| self.provider.decode(raw, self.value_column.kind))
            .collect::<Result<Vec<_>, MapperError>>()?;
        Ok(Some(Value::Array(members)))
    }

    fn is_partial(&self, _keys: &[Key]) -> bool {
        false
    }
}
