use super::{Table, BACKEND};
use crate::change::ChangeSet;
use crate::error::{MapperError, TrackError};
use crate::mapper::Key;
use crate::registry::{Schema, Shape, ShapeRegistry};
use crate::trackable::Container;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Container layout: one table per non-ignored field
///
/// A key path longer than the head keys names a field, followed by the key
/// components of that field's table.
#[derive(Debug, Clone)]
pub struct ContainerTable {
    schema: Arc<Schema>,
    fields: Vec<(String, Arc<dyn Table>)>,
}

impl ContainerTable {
    pub fn new(schema: Arc<Schema>) -> Self {
        Self {
            schema,
            fields: Vec::new(),
        }
    }

    pub fn from_registry<C: Container>(registry: &ShapeRegistry) -> Result<Self, MapperError> {
        Ok(Self::new(registry.container::<C>()?))
    }

    /// Map one field to its table
    pub fn with_field(
        mut self,
        name: &str,
        table: impl Table + 'static,
    ) -> Result<Self, MapperError> {
        let spec = self
            .schema
            .get(name)
            .ok_or_else(|| TrackError::UnknownField(name.to_string()))?;
        if spec.shape == Shape::List {
            return Err(list_unsupported(name));
        }
        if spec.shape != table.shape() {
            return Err(MapperError::Schema(format!(
                "Field {} is {:?}, table is {:?}",
                name,
                spec.shape,
                table.shape()
            )));
        }
        if let Some((_, first)) = self.fields.first() {
            if first.head_count() != table.head_count() {
                return Err(MapperError::Schema(format!(
                    "Field {} table has {} head keys, expected {}",
                    name,
                    table.head_count(),
                    first.head_count()
                )));
            }
        }
        self.fields.retain(|(field, _)| field != name);
        self.fields.push((name.to_string(), Arc::new(table)));
        Ok(self)
    }

    /// Check that every persisted field has a table
    pub fn build(self) -> Result<Self, MapperError> {
        for spec in self.schema.persisted_fields() {
            if spec.shape == Shape::List {
                return Err(list_unsupported(&spec.name));
            }
            if self.table(&spec.name).is_none() {
                return Err(MapperError::Schema(format!(
                    "No table for field {} of {}",
                    spec.name, self.schema.type_name
                )));
            }
        }
        Ok(self)
    }

    fn table(&self, name: &str) -> Option<&dyn Table> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, table)| table.as_ref())
    }

    /// Field table and its key path for a partial address
    fn resolve<'a>(&'a self, keys: &[Key]) -> Result<(&'a dyn Table, Vec<Key>), MapperError> {
        let head = self.head_count();
        let name = match keys.get(head) {
            Some(Key::Text(name)) => name.as_str(),
            Some(other) => return Err(TrackError::UnknownField(other.to_string()).into()),
            None => return Err(TrackError::UnknownPath(String::new()).into()),
        };
        let table = self
            .table(name)
            .ok_or_else(|| TrackError::UnknownField(name.to_string()))?;
        let mut field_keys = keys[..head].to_vec();
        field_keys.extend_from_slice(&keys[head + 1..]);
        Ok((table, field_keys))
    }

    fn collect(
        &self,
        mut each: impl FnMut(&dyn Table) -> Result<Vec<String>, MapperError>,
    ) -> Result<Vec<String>, MapperError> {
        let mut statements = Vec::new();
        for (_, table) in &self.fields {
            statements.extend(each(table.as_ref())?);
        }
        Ok(statements)
    }
}

fn list_unsupported(field: &str) -> MapperError {
    MapperError::UnsupportedOperation {
        backend: BACKEND,
        operation: format!("list field {}", field),
    }
}

impl Table for ContainerTable {
    fn shape(&self) -> Shape {
        Shape::Container
    }

    fn head_count(&self) -> usize {
        self.fields.first().map_or(0, |(_, table)| table.head_count())
    }

    fn create_table(&self, drop_if_exists: bool) -> Result<Vec<String>, MapperError> {
        self.collect(|table| table.create_table(drop_if_exists))
    }

    fn insert(&self, value: &Value, keys: &[Key]) -> Result<Vec<String>, MapperError> {
        let mut statements = Vec::new();
        for (name, table) in &self.fields {
            match value.get(name) {
                Some(field) if !field.is_null() => statements.extend(table.insert(field, keys)?),
                _ => {}
            }
        }
        Ok(statements)
    }

    fn update(&self, change_set: &ChangeSet, keys: &[Key]) -> Result<Vec<String>, MapperError> {
        let ChangeSet::Container(fields) = change_set else {
            return Err(change_set.mismatch(Shape::Container).into());
        };
        let mut statements = Vec::new();
        for (name, field) in fields {
            if field.is_empty() {
                continue;
            }
            let table = self
                .table(name)
                .ok_or_else(|| TrackError::UnknownField(name.clone()))?;
            statements.extend(table.update(field, keys)?);
        }
        Ok(statements)
    }

    fn delete(&self, keys: &[Key]) -> Result<Vec<String>, MapperError> {
        if self.is_partial(keys) {
            let (table, field_keys) = self.resolve(keys)?;
            return table.delete(&field_keys);
        }
        self.collect(|table| table.delete(keys))
    }

    fn select(&self, keys: &[Key]) -> Result<Vec<String>, MapperError> {
        if self.is_partial(keys) {
            let (table, field_keys) = self.resolve(keys)?;
            return table.select(&field_keys);
        }
        self.collect(|table| table.select(keys))
    }

    fn decode(
        &self,
        results: Vec<Vec<Vec<Value>>>,
        keys: &[Key],
    ) -> Result<Option<Value>, MapperError> {
        if self.is_partial(keys) {
            let (table, field_keys) = self.resolve(keys)?;
            return table.decode(results, &field_keys);
        }
        let mut results = results.into_iter();
        let mut object = Map::new();
        for (name, table) in &self.fields {
            let count = table.select(keys)?.len();
            let field_results: Vec<_> = results.by_ref().take(count).collect();
            if let Some(value) = table.decode(field_results, keys)? {
                object.insert(name.clone(), value);
            }
        }
        if object.is_empty() {
            return Ok(None);
        }
        Ok(Some(Value::Object(object)))
    }
}
