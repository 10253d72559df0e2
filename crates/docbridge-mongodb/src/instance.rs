//! Runtime model instances
//!
//! An `Instance` is a mapping from field name to value, owned by the
//! calling context. Attribute assignment performs no coercion; values are
//! coerced when the save pipeline hands them to the codec.

use std::collections::BTreeMap;

use crate::schema::ModelSchema;
use crate::value::Value;

/// A runtime model object.
#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    model: String,
    values: BTreeMap<String, Value>,
}

impl Instance {
    /// Create an instance of the given model with its default values
    /// materialized. Defaults are cloned per call, so two instances never
    /// share a backing sequence.
    pub fn new(schema: &ModelSchema) -> Self {
        let mut values = BTreeMap::new();
        for (name, spec) in schema.fields() {
            if let Some(default) = spec.default() {
                values.insert(name.to_string(), default.clone());
            }
        }
        Self {
            model: schema.name().to_string(),
            values,
        }
    }

    /// The owning model's name.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Assign a field value. No coercion happens here; a wrong-typed value
    /// only surfaces when the instance is saved.
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.values.insert(field.into(), value.into());
        self
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }

    pub fn get_mut(&mut self, field: &str) -> Option<&mut Value> {
        self.values.get_mut(field)
    }

    /// Remove a field value, returning it if present.
    pub fn unset(&mut self, field: &str) -> Option<Value> {
        self.values.remove(field)
    }

    /// Iterate over assigned fields.
    pub fn values(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// The identity value, if assigned. Embedded instances keep this unset
    /// unless the caller assigns one explicitly.
    pub fn pk<'a>(&'a self, schema: &ModelSchema) -> Option<&'a Value> {
        let (name, _) = schema.pk_field()?;
        self.values.get(name).filter(|v| !v.is_null())
    }

    pub fn set_pk(&mut self, schema: &ModelSchema, value: impl Into<Value>) {
        if let Some((name, _)) = schema.pk_field() {
            self.values.insert(name.to_string(), value.into());
        }
    }
}
