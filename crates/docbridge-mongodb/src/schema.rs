//! Model schemas and the field registry
//!
//! The host framework this adapter serves attaches fields to models through
//! dynamic descriptors. Here the mapping is explicit: a model registers a
//! `ModelSchema` once, and every field is a tagged `FieldSpec` variant
//! resolved at definition time rather than per access.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use docbridge_common::{BridgeError, Result};

use crate::ordering::OrderingPolicy;
use crate::value::Value;

/// Scalar storage kinds supported by the codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    Bool,
    Int,
    Float,
    Decimal,
    String,
    DateTime,
    ObjectId,
}

impl ScalarKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::Decimal => "decimal",
            Self::String => "string",
            Self::DateTime => "datetime",
            Self::ObjectId => "objectid",
        }
    }
}

/// Element kind of a list-valued field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementKind {
    /// Heterogeneous elements, stored as-is. Nested lists are still
    /// rejected at save time.
    Untyped,
    Scalar(ScalarKind),
    /// Embedded instances, optionally restricted to a declared model.
    Embedded(Option<String>),
    /// Foreign-key identities referencing another model's primary key.
    ForeignKey { target: String },
}

/// Field kinds: the tagged variants of the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    Scalar(ScalarKind),
    List(ElementKind),
    /// Zero or one embedded instance; `None` means untyped, which persists
    /// a model discriminator alongside the document.
    Embedded(Option<String>),
    ForeignKey { target: String },
}

/// Declaration of a single model field.
#[derive(Clone)]
pub struct FieldSpec {
    kind: FieldKind,
    nullable: bool,
    primary_key: bool,
    default: Option<Value>,
    db_column: Option<String>,
    auto_now: bool,
    auto_now_add: bool,
    ordering: Option<Arc<dyn OrderingPolicy>>,
}

impl FieldSpec {
    fn with_kind(kind: FieldKind) -> Self {
        Self {
            kind,
            nullable: false,
            primary_key: false,
            default: None,
            db_column: None,
            auto_now: false,
            auto_now_add: false,
            ordering: None,
        }
    }

    pub fn scalar(kind: ScalarKind) -> Self {
        Self::with_kind(FieldKind::Scalar(kind))
    }

    pub fn list(element: ElementKind) -> Self {
        Self::with_kind(FieldKind::List(element))
    }

    pub fn embedded(model: impl Into<String>) -> Self {
        Self::with_kind(FieldKind::Embedded(Some(model.into())))
    }

    pub fn embedded_untyped() -> Self {
        Self::with_kind(FieldKind::Embedded(None))
    }

    pub fn foreign_key(target: impl Into<String>) -> Self {
        Self::with_kind(FieldKind::ForeignKey {
            target: target.into(),
        })
    }

    /// Permit an absent value, distinct from an empty sequence for
    /// list-valued fields.
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// Default value, cloned into each new instance.
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Store the field under a different document key.
    pub fn db_column(mut self, column: impl Into<String>) -> Self {
        self.db_column = Some(column.into());
        self
    }

    /// Refresh this datetime field on every save.
    pub fn auto_now(mut self) -> Self {
        self.auto_now = true;
        self
    }

    /// Populate this datetime field on first save only.
    pub fn auto_now_add(mut self) -> Self {
        self.auto_now_add = true;
        self
    }

    /// Sort the stored sequence by the given policy at save time.
    /// Assignment order is left untouched.
    pub fn ordered_by(mut self, policy: Arc<dyn OrderingPolicy>) -> Self {
        self.ordering = Some(policy);
        self
    }

    pub fn kind(&self) -> &FieldKind {
        &self.kind
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn is_primary_key(&self) -> bool {
        self.primary_key
    }

    pub fn default(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    pub fn is_auto_now(&self) -> bool {
        self.auto_now
    }

    pub fn is_auto_now_add(&self) -> bool {
        self.auto_now_add
    }

    pub fn ordering(&self) -> Option<&Arc<dyn OrderingPolicy>> {
        self.ordering.as_ref()
    }
}

impl fmt::Debug for FieldSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldSpec")
            .field("kind", &self.kind)
            .field("nullable", &self.nullable)
            .field("primary_key", &self.primary_key)
            .field("default", &self.default)
            .field("db_column", &self.db_column)
            .field("auto_now", &self.auto_now)
            .field("auto_now_add", &self.auto_now_add)
            .field("ordering", &self.ordering.is_some())
            .finish()
    }
}

/// One model's field registry, resolved at definition time.
#[derive(Debug, Clone)]
pub struct ModelSchema {
    name: String,
    collection: String,
    fields: Vec<(String, FieldSpec)>,
    by_name: HashMap<String, usize>,
}

impl ModelSchema {
    /// New schema; the collection name defaults to the model name.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            collection: name.clone(),
            name,
            fields: Vec::new(),
            by_name: HashMap::new(),
        }
    }

    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = collection.into();
        self
    }

    /// Declare a field. Re-declaring a name replaces the earlier spec.
    pub fn field(mut self, name: impl Into<String>, spec: FieldSpec) -> Self {
        let name = name.into();
        match self.by_name.get(&name) {
            Some(&index) => self.fields[index].1 = spec,
            None => {
                self.by_name.insert(name.clone(), self.fields.len());
                self.fields.push((name, spec));
            }
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Fields in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldSpec)> {
        self.fields.iter().map(|(name, spec)| (name.as_str(), spec))
    }

    pub fn spec(&self, field: &str) -> Option<&FieldSpec> {
        self.by_name.get(field).map(|&index| &self.fields[index].1)
    }

    /// The primary-key field, if one was declared.
    pub fn pk_field(&self) -> Option<(&str, &FieldSpec)> {
        self.fields
            .iter()
            .find(|(_, spec)| spec.is_primary_key())
            .map(|(name, spec)| (name.as_str(), spec))
    }

    /// Document key a field is stored under. The primary key always maps to
    /// `_id`; foreign keys store the raw identity under `<name>_id` unless a
    /// column override says otherwise.
    pub fn column(&self, field: &str) -> String {
        match self.spec(field) {
            Some(spec) if spec.is_primary_key() => "_id".to_string(),
            Some(spec) => match (&spec.db_column, spec.kind()) {
                (Some(column), _) => column.clone(),
                (None, FieldKind::ForeignKey { .. }) => format!("{field}_id"),
                (None, _) => field.to_string(),
            },
            None => field.to_string(),
        }
    }
}

/// Registry mapping model names to schemas. The restore path uses it to
/// resolve untyped embedded discriminators back to concrete models.
#[derive(Debug, Default, Clone)]
pub struct SchemaRegistry {
    schemas: HashMap<String, Arc<ModelSchema>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, schema: ModelSchema) -> Arc<ModelSchema> {
        let schema = Arc::new(schema);
        self.schemas
            .insert(schema.name().to_string(), Arc::clone(&schema));
        schema
    }

    pub fn get(&self, model: &str) -> Option<&Arc<ModelSchema>> {
        self.schemas.get(model)
    }

    /// Lookup that treats an unknown model as a schema wiring bug.
    pub fn expect(&self, model: &str) -> Result<&Arc<ModelSchema>> {
        self.get(model)
            .ok_or_else(|| BridgeError::Internal(format!("unknown model '{model}'")))
    }
}
