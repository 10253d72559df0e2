//! Value codec: prepare/restore between runtime values and BSON
//!
//! `prepare` coerces a runtime value to the storable representation its
//! field declares; `restore` reconstructs the runtime value from a stored
//! document. Coercion happens here, at persistence time, never at
//! assignment time. Prepare allocates its output and never mutates the
//! input instance; pre-save mutation belongs to the save pipeline.

use bson::{Bson, Decimal128, Document as BsonDocument};
use docbridge_common::{BridgeError, Result};
use rust_decimal::Decimal;

use crate::instance::Instance;
use crate::ordering;
use crate::schema::{ElementKind, FieldKind, FieldSpec, ModelSchema, ScalarKind, SchemaRegistry};
use crate::value::Value;

/// Key under which untyped embedded documents persist their concrete model.
pub const MODEL_DISCRIMINATOR: &str = "_model";

/// Coerce a field value to its storable representation.
pub fn prepare(
    registry: &SchemaRegistry,
    field: &str,
    spec: &FieldSpec,
    value: &Value,
) -> Result<Bson> {
    if value.is_null() {
        // An absent list is only distinct from an empty one when the field
        // is nullable.
        return Ok(match spec.kind() {
            FieldKind::List(_) if !spec.is_nullable() => Bson::Array(Vec::new()),
            _ => Bson::Null,
        });
    }
    match spec.kind() {
        FieldKind::Scalar(kind) => prepare_scalar(field, *kind, value),
        FieldKind::List(element) => prepare_list(registry, field, spec, element, value),
        FieldKind::Embedded(declared) => {
            prepare_embedded(registry, field, declared.as_deref(), value)
        }
        FieldKind::ForeignKey { target } => prepare_foreign_key(registry, field, target, value),
    }
}

/// Restore a stored representation to a runtime value.
pub fn restore(
    registry: &SchemaRegistry,
    field: &str,
    spec: &FieldSpec,
    stored: &Bson,
) -> Result<Value> {
    if matches!(stored, Bson::Null) {
        return Ok(Value::Null);
    }
    match spec.kind() {
        FieldKind::Scalar(kind) => restore_scalar(field, *kind, stored),
        FieldKind::List(element) => {
            let Bson::Array(items) = stored else {
                return Err(BridgeError::Deserialization(format!(
                    "field '{field}': expected a stored array, got {}",
                    bson_type_name(stored)
                )));
            };
            items
                .iter()
                .map(|item| restore_element(registry, field, element, item))
                .collect::<Result<Vec<_>>>()
                .map(Value::List)
        }
        FieldKind::Embedded(declared) => {
            restore_embedded(registry, field, declared.as_deref(), stored)
        }
        FieldKind::ForeignKey { target } => {
            let kind = referenced_key_kind(registry, target)?;
            restore_scalar(field, kind, stored)
        }
    }
}

/// Serialize a whole instance through its schema. Every assigned value goes
/// through prepare; the primary key, when set, lands under `_id`. Unset
/// primary keys are skipped so the store can assign one. Embedded primary
/// keys are never auto-populated.
pub fn serialize_instance(
    registry: &SchemaRegistry,
    schema: &ModelSchema,
    instance: &Instance,
) -> Result<BsonDocument> {
    let mut doc = BsonDocument::new();
    for (name, spec) in schema.fields() {
        let value = instance.get(name);
        if spec.is_primary_key() && value.map_or(true, Value::is_null) {
            continue;
        }
        let value = value.unwrap_or(&Value::Null);
        doc.insert(schema.column(name), prepare(registry, name, spec, value)?);
    }
    Ok(doc)
}

/// Rebuild an instance from a stored document. Fields the document lacks
/// keep their schema defaults.
pub fn restore_instance(
    registry: &SchemaRegistry,
    schema: &ModelSchema,
    doc: &BsonDocument,
) -> Result<Instance> {
    let mut instance = Instance::new(schema);
    for (name, spec) in schema.fields() {
        if let Some(stored) = doc.get(schema.column(name)) {
            let value = restore(registry, name, spec, stored)?;
            instance.set(name, value);
        }
    }
    Ok(instance)
}

/// Restore a bare identity (e.g. a driver-assigned insert id) through the
/// model's primary-key spec.
pub fn restore_identity(
    registry: &SchemaRegistry,
    schema: &ModelSchema,
    stored: &Bson,
) -> Result<Value> {
    let (pk_name, pk_spec) = schema
        .pk_field()
        .ok_or_else(|| BridgeError::Internal(format!("model '{}' has no primary key", schema.name())))?;
    restore(registry, pk_name, pk_spec, stored)
}

fn prepare_scalar(field: &str, kind: ScalarKind, value: &Value) -> Result<Bson> {
    coerce_scalar(kind, value).ok_or_else(|| {
        BridgeError::TypeMismatch(format!(
            "field '{field}': cannot coerce {} to {}",
            value.type_name(),
            kind.name()
        ))
    })
}

/// The coercion ladder applied at persistence time. Returns None when the
/// value cannot represent the declared kind.
fn coerce_scalar(kind: ScalarKind, value: &Value) -> Option<Bson> {
    match (kind, value) {
        (ScalarKind::Bool, Value::Bool(b)) => Some(Bson::Boolean(*b)),

        (ScalarKind::Int, Value::Int(i)) => Some(Bson::Int64(*i)),
        (ScalarKind::Int, Value::String(s)) => s.trim().parse::<i64>().ok().map(Bson::Int64),
        (ScalarKind::Int, Value::Float(f)) if f.fract() == 0.0 => Some(Bson::Int64(*f as i64)),

        (ScalarKind::Float, Value::Float(f)) => Some(Bson::Double(*f)),
        (ScalarKind::Float, Value::Int(i)) => Some(Bson::Double(*i as f64)),
        (ScalarKind::Float, Value::String(s)) => s.trim().parse::<f64>().ok().map(Bson::Double),

        (ScalarKind::Decimal, Value::Decimal(d)) => decimal_to_bson(d),
        (ScalarKind::Decimal, Value::Int(i)) => decimal_to_bson(&Decimal::from(*i)),
        (ScalarKind::Decimal, Value::Float(f)) => {
            Decimal::try_from(*f).ok().as_ref().and_then(decimal_to_bson)
        }
        (ScalarKind::Decimal, Value::String(s)) => s
            .trim()
            .parse::<Decimal>()
            .ok()
            .as_ref()
            .and_then(decimal_to_bson),

        (ScalarKind::String, Value::String(s)) => Some(Bson::String(s.clone())),
        (ScalarKind::String, Value::Int(i)) => Some(Bson::String(i.to_string())),
        (ScalarKind::String, Value::Float(f)) => Some(Bson::String(f.to_string())),

        (ScalarKind::DateTime, Value::DateTime(dt)) => {
            Some(Bson::DateTime(bson::DateTime::from_chrono(*dt)))
        }

        (ScalarKind::ObjectId, Value::ObjectId(oid)) => Some(Bson::ObjectId(*oid)),
        // The declared kind is the explicit hint that makes hex-string
        // conversion safe; undeclared strings stay strings.
        (ScalarKind::ObjectId, Value::String(s)) => {
            bson::oid::ObjectId::parse_str(s).ok().map(Bson::ObjectId)
        }

        _ => None,
    }
}

fn decimal_to_bson(d: &Decimal) -> Option<Bson> {
    d.to_string().parse::<Decimal128>().ok().map(Bson::Decimal128)
}

fn prepare_list(
    registry: &SchemaRegistry,
    field: &str,
    spec: &FieldSpec,
    element: &ElementKind,
    value: &Value,
) -> Result<Bson> {
    let Value::List(items) = value else {
        return Err(BridgeError::TypeMismatch(format!(
            "field '{field}': expected a list, got {}",
            value.type_name()
        )));
    };
    let ordered;
    let items: &[Value] = match spec.ordering() {
        Some(policy) => {
            ordered = ordering::sorted_by_policy(policy.as_ref(), items);
            &ordered
        }
        None => items,
    };
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        out.push(prepare_element(registry, field, element, item)?);
    }
    Ok(Bson::Array(out))
}

/// Prepare one list element. Lists do not nest; an inner list fails
/// explicitly instead of corrupting the stored sequence.
pub(crate) fn prepare_element(
    registry: &SchemaRegistry,
    field: &str,
    element: &ElementKind,
    item: &Value,
) -> Result<Bson> {
    if matches!(item, Value::List(_)) {
        return Err(BridgeError::TypeMismatch(format!(
            "field '{field}': list fields cannot contain nested lists"
        )));
    }
    match element {
        ElementKind::Untyped => prepare_untyped(registry, field, item),
        ElementKind::Scalar(kind) => prepare_scalar(field, *kind, item),
        ElementKind::Embedded(declared) => {
            prepare_embedded(registry, field, declared.as_deref(), item)
        }
        ElementKind::ForeignKey { target } => prepare_foreign_key(registry, field, target, item),
    }
}

/// Heterogeneous element without a declared kind: stored in its natural
/// representation. Embedded instances get a discriminator so restore can
/// find its way back.
fn prepare_untyped(registry: &SchemaRegistry, field: &str, item: &Value) -> Result<Bson> {
    Ok(match item {
        Value::Null => Bson::Null,
        Value::Bool(b) => Bson::Boolean(*b),
        Value::Int(i) => Bson::Int64(*i),
        Value::Float(f) => Bson::Double(*f),
        Value::Decimal(d) => decimal_to_bson(d).ok_or_else(|| {
            BridgeError::Serialization(format!(
                "field '{field}': decimal value does not fit Decimal128"
            ))
        })?,
        Value::String(s) => Bson::String(s.clone()),
        Value::DateTime(dt) => Bson::DateTime(bson::DateTime::from_chrono(*dt)),
        Value::ObjectId(oid) => Bson::ObjectId(*oid),
        Value::Embedded(_) => prepare_embedded(registry, field, None, item)?,
        Value::List(_) => {
            return Err(BridgeError::TypeMismatch(format!(
                "field '{field}': list fields cannot contain nested lists"
            )))
        }
    })
}

fn prepare_embedded(
    registry: &SchemaRegistry,
    _field: &str,
    declared: Option<&str>,
    value: &Value,
) -> Result<Bson> {
    let Value::Embedded(instance) = value else {
        return Err(BridgeError::expected_instance_of(
            declared.unwrap_or("Model"),
        ));
    };
    if let Some(declared) = declared {
        if instance.model() != declared {
            return Err(BridgeError::expected_instance_of(declared));
        }
    }
    let schema = registry.expect(instance.model())?;
    let mut doc = serialize_instance(registry, schema, instance)?;
    if declared.is_none() {
        doc.insert(MODEL_DISCRIMINATOR, instance.model());
    }
    Ok(Bson::Document(doc))
}

/// Foreign keys store the referenced identity coerced to the referenced
/// primary key's native kind. An embedded operand contributes its own
/// primary key.
fn prepare_foreign_key(
    registry: &SchemaRegistry,
    field: &str,
    target: &str,
    value: &Value,
) -> Result<Bson> {
    let target_schema = registry.expect(target)?;
    let (pk_name, _) = target_schema.pk_field().ok_or_else(|| {
        BridgeError::Internal(format!("model '{target}' has no primary key"))
    })?;
    let identity = match value {
        Value::Embedded(instance) => {
            if instance.model() != target {
                return Err(BridgeError::expected_instance_of(target));
            }
            instance
                .get(pk_name)
                .filter(|v| !v.is_null())
                .ok_or_else(|| {
                    BridgeError::TypeMismatch(format!(
                        "field '{field}': referenced {target} instance has no primary key"
                    ))
                })?
        }
        other => other,
    };
    let kind = referenced_key_kind(registry, target)?;
    prepare_scalar(field, kind, identity)
}

/// Native scalar kind of a referenced model's primary key.
fn referenced_key_kind(registry: &SchemaRegistry, target: &str) -> Result<ScalarKind> {
    let target_schema = registry.expect(target)?;
    let (_, pk_spec) = target_schema.pk_field().ok_or_else(|| {
        BridgeError::Internal(format!("model '{target}' has no primary key"))
    })?;
    match pk_spec.kind() {
        FieldKind::Scalar(kind) => Ok(*kind),
        _ => Err(BridgeError::Internal(format!(
            "model '{target}' has a non-scalar primary key"
        ))),
    }
}

fn restore_scalar(field: &str, kind: ScalarKind, stored: &Bson) -> Result<Value> {
    let restored = match (kind, stored) {
        (ScalarKind::Bool, Bson::Boolean(b)) => Some(Value::Bool(*b)),

        (ScalarKind::Int, Bson::Int64(i)) => Some(Value::Int(*i)),
        (ScalarKind::Int, Bson::Int32(i)) => Some(Value::Int(i64::from(*i))),
        // Stores may widen integers on the way in.
        (ScalarKind::Int, Bson::Double(f)) if f.fract() == 0.0 => Some(Value::Int(*f as i64)),

        (ScalarKind::Float, Bson::Double(f)) => Some(Value::Float(*f)),
        (ScalarKind::Float, Bson::Int32(i)) => Some(Value::Float(f64::from(*i))),
        (ScalarKind::Float, Bson::Int64(i)) => Some(Value::Float(*i as f64)),

        (ScalarKind::Decimal, Bson::Decimal128(d)) => {
            d.to_string().parse::<Decimal>().ok().map(Value::Decimal)
        }
        (ScalarKind::Decimal, Bson::Int32(i)) => Some(Value::Decimal(Decimal::from(*i))),
        (ScalarKind::Decimal, Bson::Int64(i)) => Some(Value::Decimal(Decimal::from(*i))),
        (ScalarKind::Decimal, Bson::String(s)) => s.parse::<Decimal>().ok().map(Value::Decimal),

        (ScalarKind::String, Bson::String(s)) => Some(Value::String(s.clone())),

        (ScalarKind::DateTime, Bson::DateTime(dt)) => Some(Value::DateTime(dt.to_chrono())),

        (ScalarKind::ObjectId, Bson::ObjectId(oid)) => Some(Value::ObjectId(*oid)),

        _ => None,
    };
    restored.ok_or_else(|| {
        BridgeError::Deserialization(format!(
            "field '{field}': cannot restore {} as {}",
            bson_type_name(stored),
            kind.name()
        ))
    })
}

fn restore_element(
    registry: &SchemaRegistry,
    field: &str,
    element: &ElementKind,
    item: &Bson,
) -> Result<Value> {
    if matches!(item, Bson::Null) {
        return Ok(Value::Null);
    }
    match element {
        ElementKind::Untyped => restore_untyped(registry, field, item),
        ElementKind::Scalar(kind) => restore_scalar(field, *kind, item),
        ElementKind::Embedded(declared) => {
            restore_embedded(registry, field, declared.as_deref(), item)
        }
        ElementKind::ForeignKey { target } => {
            let kind = referenced_key_kind(registry, target)?;
            restore_scalar(field, kind, item)
        }
    }
}

fn restore_untyped(registry: &SchemaRegistry, field: &str, item: &Bson) -> Result<Value> {
    Ok(match item {
        Bson::Null => Value::Null,
        Bson::Boolean(b) => Value::Bool(*b),
        Bson::Int32(i) => Value::Int(i64::from(*i)),
        Bson::Int64(i) => Value::Int(*i),
        Bson::Double(f) => Value::Float(*f),
        Bson::Decimal128(d) => d
            .to_string()
            .parse::<Decimal>()
            .map(Value::Decimal)
            .map_err(|_| {
                BridgeError::Deserialization(format!(
                    "field '{field}': unreadable Decimal128 value"
                ))
            })?,
        Bson::String(s) => Value::String(s.clone()),
        Bson::DateTime(dt) => Value::DateTime(dt.to_chrono()),
        Bson::ObjectId(oid) => Value::ObjectId(*oid),
        Bson::Document(_) => restore_embedded(registry, field, None, item)?,
        other => {
            return Err(BridgeError::Deserialization(format!(
                "field '{field}': cannot restore stored {} without a declared kind",
                bson_type_name(other)
            )))
        }
    })
}

fn restore_embedded(
    registry: &SchemaRegistry,
    field: &str,
    declared: Option<&str>,
    stored: &Bson,
) -> Result<Value> {
    let Bson::Document(doc) = stored else {
        return Err(BridgeError::Deserialization(format!(
            "field '{field}': expected an embedded document, got {}",
            bson_type_name(stored)
        )));
    };
    let model = match declared {
        // A declared field always restores as the declared model.
        Some(model) => model.to_string(),
        None => doc
            .get_str(MODEL_DISCRIMINATOR)
            .map_err(|_| {
                BridgeError::Deserialization(format!(
                    "field '{field}': embedded document is missing its model discriminator"
                ))
            })?
            .to_string(),
    };
    let schema = registry.get(&model).ok_or_else(|| {
        BridgeError::Deserialization(format!(
            "field '{field}': unknown embedded model '{model}'"
        ))
    })?;
    let instance = restore_instance(registry, schema, doc)?;
    Ok(Value::Embedded(Box::new(instance)))
}

/// BSON type name for error messages.
fn bson_type_name(value: &Bson) -> &'static str {
    match value {
        Bson::Double(_) => "double",
        Bson::String(_) => "string",
        Bson::Array(_) => "array",
        Bson::Document(_) => "object",
        Bson::Boolean(_) => "bool",
        Bson::Null => "null",
        Bson::Int32(_) => "int32",
        Bson::Int64(_) => "int64",
        Bson::Timestamp(_) => "timestamp",
        Bson::Binary(_) => "binary",
        Bson::ObjectId(_) => "objectid",
        Bson::DateTime(_) => "datetime",
        Bson::Decimal128(_) => "decimal128",
        _ => "unknown",
    }
}
