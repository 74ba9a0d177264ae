//! Type and Shape Registry
//!
//! Static per-field shape tags and declarative field options, resolved once when a
//! mapper is constructed. The registry is an ordinary value owned by the caller and
//! passed into mapper constructors; nothing here is global.

use crate::error::MapperError;
use crate::trackable::{Container, Poco};
use serde::{Deserialize, Serialize};
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

/// Structural shape of a value or field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Shape {
    /// Plain scalar or serde value, not trackable on its own
    Value,
    Poco,
    Container,
    Dictionary,
    List,
    Set,
}

impl Shape {
    pub fn is_trackable(self) -> bool {
        !matches!(self, Shape::Value)
    }
}

/// Storage kind of a scalar column or field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Bool,
    Int,
    Float,
    Text,
    Bytes,
    /// Arbitrary serde value stored in its JSON text form
    Json,
}

/// Per-field persistence options (generator hints)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldOptions {
    pub ignore: bool,
    pub renamed_as: Option<String>,
    pub is_primary_key: bool,
    pub is_identity: bool,
}

impl FieldOptions {
    pub fn ignored() -> Self {
        Self {
            ignore: true,
            ..Self::default()
        }
    }

    pub fn primary_key() -> Self {
        Self {
            is_primary_key: true,
            ..Self::default()
        }
    }

    /// Primary key whose value is assigned by the backend
    pub fn identity() -> Self {
        Self {
            is_primary_key: true,
            is_identity: true,
            ..Self::default()
        }
    }

    pub fn renamed(name: impl Into<String>) -> Self {
        Self {
            renamed_as: Some(name.into()),
            ..Self::default()
        }
    }
}

/// One declared field of a Poco or Container type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub shape: Shape,
    pub kind: ValueKind,
    pub options: FieldOptions,
}

impl FieldSpec {
    /// Scalar field stored as `kind`
    pub fn value(name: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            name: name.into(),
            shape: Shape::Value,
            kind,
            options: FieldOptions::default(),
        }
    }

    /// Field holding a nested trackable of the given shape
    pub fn trackable(name: impl Into<String>, shape: Shape) -> Self {
        Self {
            name: name.into(),
            shape,
            kind: ValueKind::Json,
            options: FieldOptions::default(),
        }
    }

    pub fn with_options(mut self, options: FieldOptions) -> Self {
        self.options = options;
        self
    }

    /// Name used by backends: `renamed_as` when present, the declared name otherwise
    pub fn stored_name(&self) -> &str {
        self.options.renamed_as.as_deref().unwrap_or(&self.name)
    }
}

/// Static description of a Poco or Container type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    pub type_name: String,
    pub shape: Shape,
    pub fields: Vec<FieldSpec>,
}

impl Schema {
    pub fn poco(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            shape: Shape::Poco,
            fields: Vec::new(),
        }
    }

    pub fn container(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            shape: Shape::Container,
            fields: Vec::new(),
        }
    }

    /// Append a field (builder style)
    pub fn field(mut self, spec: FieldSpec) -> Self {
        self.fields.push(spec);
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Non-ignored scalar fields, in declaration order
    pub fn value_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields
            .iter()
            .filter(|f| !f.options.ignore && f.shape == Shape::Value)
    }

    /// Non-ignored fields of any shape, in declaration order
    pub fn persisted_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter().filter(|f| !f.options.ignore)
    }

    pub fn identity(&self) -> Option<&FieldSpec> {
        self.value_fields().find(|f| f.options.is_identity)
    }

    /// Apply option overrides by field name; unknown names are rejected
    pub fn with_overrides(
        mut self,
        overrides: &HashMap<String, FieldOptions>,
    ) -> Result<Self, MapperError> {
        for (name, options) in overrides {
            let field = self
                .fields
                .iter_mut()
                .find(|f| &f.name == name)
                .ok_or_else(|| {
                    MapperError::Schema(format!(
                        "No field '{}' in type '{}'",
                        name, self.type_name
                    ))
                })?;
            field.options = options.clone();
        }
        Ok(self)
    }
}

/// Schema of a Poco type
pub type PocoSchema = Schema;

/// Schema of a Container type; every field is trackable
pub type ContainerSchema = Schema;

/// Caller-owned registry of Poco and Container schemas
#[derive(Debug, Default, Clone)]
pub struct ShapeRegistry {
    schemas: HashMap<TypeId, Arc<Schema>>,
}

impl ShapeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a Poco type's schema
    pub fn register_poco<P: Poco>(&mut self) -> &mut Self {
        self.schemas.insert(TypeId::of::<P>(), Arc::new(P::schema()));
        self
    }

    /// Register a Container type's schema
    pub fn register_container<C: Container>(&mut self) -> &mut Self {
        self.schemas.insert(TypeId::of::<C>(), Arc::new(C::schema()));
        self
    }

    pub fn poco<P: Poco>(&self) -> Result<Arc<Schema>, MapperError> {
        self.lookup::<P>(std::any::type_name::<P>())
    }

    pub fn container<C: Container>(&self) -> Result<Arc<Schema>, MapperError> {
        self.lookup::<C>(std::any::type_name::<C>())
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    fn lookup<T: 'static>(&self, name: &str) -> Result<Arc<Schema>, MapperError> {
        self.schemas
            .get(&TypeId::of::<T>())
            .cloned()
            .ok_or_else(|| MapperError::Unregistered(name.to_string()))
    }
}
