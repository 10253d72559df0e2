//! Update/save pipeline
//!
//! A save is one deterministic pass: validate, run pre-save hooks
//! depth-first (children before parents), serialize. Hooks mutate the
//! in-memory instance; a failure after that point leaves the timestamps in
//! place and the caller discards or retries the instance wholesale.

use bson::{doc, Document as BsonDocument};
use chrono::{DateTime, Utc};
use docbridge_common::{BridgeError, Result};
use tracing::debug;

use crate::codec;
use crate::instance::Instance;
use crate::schema::{ElementKind, FieldKind, ModelSchema, ScalarKind, SchemaRegistry};
use crate::value::Value;

/// Phases of a single save operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SavePhase {
    New,
    Validating,
    PreSaveHooks,
    Serializing,
    Persisted,
    Failed,
}

pub(crate) fn log_phase(schema: &ModelSchema, phase: SavePhase) {
    debug!(model = schema.name(), phase = ?phase, "save phase");
}

/// Run the local (store-independent) part of a save and return the document
/// to persist. The store round-trip that follows marks the operation
/// persisted.
pub fn prepare_save(
    registry: &SchemaRegistry,
    schema: &ModelSchema,
    instance: &mut Instance,
    now: DateTime<Utc>,
) -> Result<BsonDocument> {
    log_phase(schema, SavePhase::New);

    log_phase(schema, SavePhase::Validating);
    if let Err(err) = validate(registry, schema, instance) {
        log_phase(schema, SavePhase::Failed);
        return Err(err);
    }

    log_phase(schema, SavePhase::PreSaveHooks);
    run_pre_save_hooks(registry, schema, instance, now)?;

    log_phase(schema, SavePhase::Serializing);
    match codec::serialize_instance(registry, schema, instance) {
        Ok(document) => Ok(document),
        Err(err) => {
            log_phase(schema, SavePhase::Failed);
            Err(err)
        }
    }
}

/// Declared-type conformance for composite fields. Scalar coercion failures
/// surface later from the codec; this pass catches structural violations so
/// hooks never run over a malformed instance.
fn validate(registry: &SchemaRegistry, schema: &ModelSchema, instance: &Instance) -> Result<()> {
    for (name, spec) in schema.fields() {
        let Some(value) = instance.get(name) else {
            continue;
        };
        if value.is_null() {
            continue;
        }
        match spec.kind() {
            FieldKind::Embedded(declared) => check_embedded(registry, declared.as_deref(), value)?,
            FieldKind::List(element) => {
                let Value::List(items) = value else {
                    return Err(BridgeError::TypeMismatch(format!(
                        "field '{name}': expected a list, got {}",
                        value.type_name()
                    )));
                };
                for item in items {
                    if matches!(item, Value::List(_)) {
                        return Err(BridgeError::TypeMismatch(format!(
                            "field '{name}': list fields cannot contain nested lists"
                        )));
                    }
                    if let ElementKind::Embedded(declared) = element {
                        check_embedded(registry, declared.as_deref(), item)?;
                    }
                }
            }
            _ => {}
        }
    }
    Ok(())
}

fn check_embedded(
    registry: &SchemaRegistry,
    declared: Option<&str>,
    value: &Value,
) -> Result<()> {
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
    validate(registry, schema, instance)
}

/// Depth-first pre-save traversal. Every embedded instance reachable
/// through embedded and list-of-embedded fields is visited before its
/// parent's own derived fields are set, so timestamps populate bottom-up
/// exactly once per save.
pub fn run_pre_save_hooks(
    registry: &SchemaRegistry,
    schema: &ModelSchema,
    instance: &mut Instance,
    now: DateTime<Utc>,
) -> Result<()> {
    for (name, spec) in schema.fields() {
        match spec.kind() {
            FieldKind::Embedded(_) => {
                if let Some(Value::Embedded(child)) = instance.get_mut(name) {
                    let child_schema = registry.expect(child.model())?.clone();
                    run_pre_save_hooks(registry, &child_schema, child, now)?;
                }
            }
            FieldKind::List(ElementKind::Embedded(_) | ElementKind::Untyped) => {
                if let Some(Value::List(items)) = instance.get_mut(name) {
                    for item in items {
                        if let Value::Embedded(child) = item {
                            let child_schema = registry.expect(child.model())?.clone();
                            run_pre_save_hooks(registry, &child_schema, child, now)?;
                        }
                    }
                }
            }
            _ => {}
        }
    }
    apply_auto_timestamps(schema, instance, now);
    Ok(())
}

fn apply_auto_timestamps(schema: &ModelSchema, instance: &mut Instance, now: DateTime<Utc>) {
    for (name, spec) in schema.fields() {
        if !matches!(spec.kind(), FieldKind::Scalar(ScalarKind::DateTime)) {
            continue;
        }
        if spec.is_auto_now() {
            instance.set(name, Value::DateTime(now));
        } else if spec.is_auto_now_add() {
            let unset = matches!(instance.get(name), None | Some(Value::Null));
            if unset {
                instance.set(name, Value::DateTime(now));
            }
        }
    }
}

/// Build a `$set` document for a field-level update. Every new value passes
/// through codec prepare, so foreign-key identities inside list values are
/// coerced to the referenced key's native kind. Embedded operand instances
/// get their hooks run first; unrelated fields are not traversed.
pub fn prepare_update(
    registry: &SchemaRegistry,
    schema: &ModelSchema,
    changes: Vec<(String, Value)>,
    now: DateTime<Utc>,
) -> Result<BsonDocument> {
    let mut set_doc = BsonDocument::new();
    for (name, mut value) in changes {
        let spec = schema.spec(&name).ok_or_else(|| {
            BridgeError::Query(format!(
                "unknown field '{name}' on model '{}'",
                schema.name()
            ))
        })?;
        hook_embedded_operands(registry, &mut value, now)?;
        set_doc.insert(
            schema.column(&name),
            codec::prepare(registry, &name, spec, &value)?,
        );
    }
    Ok(doc! { "$set": set_doc })
}

fn hook_embedded_operands(
    registry: &SchemaRegistry,
    value: &mut Value,
    now: DateTime<Utc>,
) -> Result<()> {
    match value {
        Value::Embedded(child) => {
            let child_schema = registry.expect(child.model())?.clone();
            run_pre_save_hooks(registry, &child_schema, child, now)
        }
        Value::List(items) => {
            for item in items {
                hook_embedded_operands(registry, item, now)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}
