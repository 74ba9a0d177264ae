use super::{
    duplicate_on_constraint, head_pairs, insert_batches, where_clause, with_where, ColumnDef,
    SqlMapper, SqlProvider, SqlSession, SqliteProvider, Table,
};
use crate::change::{to_value, ChangeSet};
use crate::error::MapperError;
use crate::mapper::{check_arity, Key};
use crate::registry::{FieldOptions, FieldSpec, Schema, Shape, ShapeRegistry};
use crate::trackable::{Poco, Tracked};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// One row per Poco: head-key columns followed by the non-ignored scalar fields
///
/// The primary key is the head keys plus every `is_primary_key` field. Key
/// components after the head keys address those fields in declaration order.
#[derive(Debug, Clone)]
pub struct PocoTable {
    provider: Arc<dyn SqlProvider>,
    name: String,
    head_keys: Vec<ColumnDef>,
    schema: Arc<Schema>,
}

fn column(field: &FieldSpec) -> ColumnDef {
    let column = ColumnDef::new(field.stored_name(), field.kind);
    if field.options.is_identity {
        column.identity()
    } else {
        column
    }
}

impl PocoTable {
    pub fn new(name: impl Into<String>, schema: Arc<Schema>) -> Self {
        Self {
            provider: Arc::new(SqliteProvider),
            name: name.into(),
            head_keys: Vec::new(),
            schema,
        }
    }

    /// Table for a Poco type registered in `registry`
    pub fn from_registry<P: Poco>(
        registry: &ShapeRegistry,
        name: impl Into<String>,
    ) -> Result<Self, MapperError> {
        Ok(Self::new(name, registry.poco::<P>()?))
    }

    pub fn with_provider(mut self, provider: impl SqlProvider + 'static) -> Self {
        self.provider = Arc::new(provider);
        self
    }

    pub fn with_head_key(mut self, column: ColumnDef) -> Self {
        self.head_keys.push(column);
        self
    }

    /// Override the options of one field of the registered schema
    pub fn with_field_options(
        mut self,
        field: &str,
        options: FieldOptions,
    ) -> Result<Self, MapperError> {
        let mut overrides = HashMap::new();
        overrides.insert(field.to_string(), options);
        self.schema = Arc::new(self.schema.as_ref().clone().with_overrides(&overrides)?);
        Ok(self)
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    fn value_columns(&self) -> Vec<(&FieldSpec, ColumnDef)> {
        self.schema.value_fields().map(|f| (f, column(f))).collect()
    }

    /// Head keys followed by the primary-key fields
    fn key_columns(&self) -> Vec<ColumnDef> {
        self.head_keys
            .iter()
            .cloned()
            .chain(
                self.schema
                    .value_fields()
                    .filter(|f| f.options.is_primary_key)
                    .map(column),
            )
            .collect()
    }

    fn key_clause(&self, keys: &[Key], full: bool) -> Result<Option<String>, MapperError> {
        let key_columns = self.key_columns();
        if full {
            check_arity(keys, key_columns.len())?;
        }
        where_clause(self.provider.as_ref(), &head_pairs(&key_columns, keys))
    }

    fn decode_row(&self, row: Vec<Value>) -> Result<Value, MapperError> {
        let mut object = Map::new();
        for ((field, column), raw) in self.value_columns().into_iter().zip(row) {
            object.insert(field.name.clone(), self.provider.decode(raw, column.kind)?);
        }
        Ok(Value::Object(object))
    }
}

impl Table for PocoTable {
    fn shape(&self) -> Shape {
        Shape::Poco
    }

    fn head_count(&self) -> usize {
        self.head_keys.len()
    }

    fn create_table(&self, drop_if_exists: bool) -> Result<Vec<String>, MapperError> {
        let mut columns = self.head_keys.clone();
        columns.extend(self.value_columns().into_iter().map(|(_, c)| c));
        let primary_keys: Vec<String> = self.key_columns().into_iter().map(|c| c.name).collect();
        self.provider
            .build_create_table(&self.name, &columns, &primary_keys, drop_if_exists)
    }

    fn insert(&self, value: &Value, keys: &[Key]) -> Result<Vec<String>, MapperError> {
        let value_columns = self.value_columns();
        let mut columns: Vec<&ColumnDef> = self.head_keys.iter().collect();
        let mut row: Vec<Value> = keys
            .iter()
            .take(self.head_keys.len())
            .map(Key::to_value)
            .collect();
        for (field, column) in &value_columns {
            if column.identity {
                continue;
            }
            columns.push(column);
            row.push(value.get(&field.name).cloned().unwrap_or(Value::Null));
        }
        insert_batches(self.provider.as_ref(), &self.name, &columns, &[row], 1)
    }

    fn update(&self, change_set: &ChangeSet, keys: &[Key]) -> Result<Vec<String>, MapperError> {
        let ChangeSet::Poco(changes) = change_set else {
            return Err(change_set.mismatch(Shape::Poco).into());
        };
        let clause = self.key_clause(keys, true)?;
        let mut assignments = Vec::new();
        for (field, change) in changes {
            let Some(spec) = self.schema.value_fields().find(|f| &f.name == field) else {
                continue;
            };
            assignments.push(format!(
                "{} = {}",
                self.provider.escape_name(spec.stored_name()),
                self.provider.literal(&change.new, spec.kind)?
            ));
        }
        if assignments.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "UPDATE {} SET {}",
            self.provider.escape_name(&self.name),
            assignments.join(", ")
        );
        Ok(vec![with_where(sql, clause)])
    }

    fn delete(&self, keys: &[Key]) -> Result<Vec<String>, MapperError> {
        let sql = format!("DELETE FROM {}", self.provider.escape_name(&self.name));
        Ok(vec![with_where(sql, self.key_clause(keys, false)?)])
    }

    fn select(&self, keys: &[Key]) -> Result<Vec<String>, MapperError> {
        let names: Vec<String> = self
            .value_columns()
            .iter()
            .map(|(_, c)| self.provider.escape_name(&c.name))
            .collect();
        let order: Vec<String> = self
            .key_columns()
            .iter()
            .map(|c| self.provider.escape_name(&c.name))
            .collect();
        let mut sql = with_where(
            format!(
                "SELECT {} FROM {}",
                names.join(", "),
                self.provider.escape_name(&self.name)
            ),
            self.key_clause(keys, false)?,
        );
        if !order.is_empty() {
            sql = format!("{} ORDER BY {}", sql, order.join(", "));
        }
        Ok(vec![sql])
    }

    fn decode(
        &self,
        results: Vec<Vec<Vec<Value>>>,
        _keys: &[Key],
    ) -> Result<Option<Value>, MapperError> {
        let Some(row) = results.into_iter().next().and_then(|rows| rows.into_iter().next()) else {
            return Ok(None);
        };
        self.decode_row(row).map(Some)
    }

    fn decode_rows(&self, results: Vec<Vec<Vec<Value>>>) -> Result<Vec<Value>, MapperError> {
        results
            .into_iter()
            .next()
            .unwrap_or_default()
            .into_iter()
            .map(|row| self.decode_row(row))
            .collect()
    }

    fn identity_field(&self) -> Option<&str> {
        self.schema.identity().map(|f| f.name.as_str())
    }

    fn is_partial(&self, _keys: &[Key]) -> bool {
        false
    }
}

impl<P: Poco + Tracked> SqlMapper<P> {
    /// Insert a Poco whose identity column is assigned by the backend
    ///
    /// The assigned identity is written back into `value` without being recorded
    /// by its tracker.
    pub async fn create_with_identity(
        &self,
        session: &dyn SqlSession,
        value: &mut P,
        keys: &[Key],
    ) -> Result<i64, MapperError> {
        check_arity(keys, self.table.head_count())?;
        let field = self
            .table
            .identity_field()
            .ok_or_else(|| MapperError::Schema("No identity field declared".to_string()))?
            .to_string();
        let statements = self.table.insert(&to_value(&*value)?, keys)?;
        let [sql] = statements.as_slice() else {
            return Err(MapperError::Schema(
                "Identity insert must be a single statement".to_string(),
            ));
        };
        let id = session.insert_returning_id(sql).await.map_err(duplicate_on_constraint)?;
        debug!(id, field = %field, "Assigned identity");

        let tracker = value.replace_tracker(None);
        let assigned = value.set_field_value(&field, Value::from(id));
        value.replace_tracker(tracker);
        assigned?;
        Ok(id)
    }
}
