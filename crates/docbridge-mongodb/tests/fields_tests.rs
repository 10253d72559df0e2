//! End-to-end behavior of composite fields: list values, embedded
//! documents, foreign keys, ordering policies and lookup translation,
//! exercised through the schema registry without a live server.

use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;

use bson::{doc, Bson};
use chrono::{DateTime, TimeZone, Utc};
use docbridge_mongodb::{
    codec, prepare_save, prepare_update, BridgeError, ElementKind, FieldSpec, Filter, Instance,
    Lookup, ModelQuery, ModelSchema, OrderingPolicy, ScalarKind, SchemaRegistry,
    StoreCapabilities, Value,
};

/// Externally-owned ordering policy wrapper: the registry holds one Arc,
/// the test keeps another to observe invocations.
struct CountingNatural {
    calls: AtomicUsize,
}

impl CountingNatural {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(AtomicOrdering::SeqCst)
    }
}

impl OrderingPolicy for CountingNatural {
    fn sort_key(&self, element: &Value) -> Value {
        self.calls.fetch_add(1, AtomicOrdering::SeqCst);
        element.clone()
    }
}

/// Order embedded elements by their `index` field.
fn by_index(element: &Value) -> Value {
    match element {
        Value::Embedded(instance) => instance.get("index").cloned().unwrap_or(Value::Null),
        other => other.clone(),
    }
}

fn base_registry() -> SchemaRegistry {
    let mut registry = SchemaRegistry::new();
    registry.register(
        ModelSchema::new("Target")
            .field("id", FieldSpec::scalar(ScalarKind::ObjectId).primary_key())
            .field("index", FieldSpec::scalar(ScalarKind::Int)),
    );
    registry.register(
        ModelSchema::new("DecimalKey").field(
            "decimal",
            FieldSpec::scalar(ScalarKind::Decimal).primary_key(),
        ),
    );
    registry.register(
        ModelSchema::new("DecimalParent")
            .field("id", FieldSpec::scalar(ScalarKind::ObjectId).primary_key())
            .field("child", FieldSpec::foreign_key("DecimalKey")),
    );
    registry.register(
        ModelSchema::new("DecimalsList")
            .field("id", FieldSpec::scalar(ScalarKind::ObjectId).primary_key())
            .field(
                "decimals",
                FieldSpec::list(ElementKind::ForeignKey {
                    target: "DecimalKey".to_string(),
                }),
            ),
    );
    registry.register(
        ModelSchema::new("ListModel")
            .field("integer", FieldSpec::scalar(ScalarKind::Int).primary_key())
            .field("floating_point", FieldSpec::scalar(ScalarKind::Float))
            .field(
                "names",
                FieldSpec::list(ElementKind::Scalar(ScalarKind::String)),
            )
            .field(
                "names_with_default",
                FieldSpec::list(ElementKind::Scalar(ScalarKind::String))
                    .default_value(Value::List(Vec::new())),
            )
            .field(
                "names_nullable",
                FieldSpec::list(ElementKind::Scalar(ScalarKind::String)).nullable(),
            ),
    );
    registry.register(
        ModelSchema::new("OrderedListModel")
            .field("id", FieldSpec::scalar(ScalarKind::ObjectId).primary_key())
            .field(
                "ordered_ints",
                FieldSpec::list(ElementKind::Scalar(ScalarKind::Int))
                    .default_value(Value::List(Vec::new()))
                    .ordered_by(Arc::new(docbridge_mongodb::NaturalOrder))
                    .nullable(),
            )
            .field(
                "ordered_nullable",
                FieldSpec::list(ElementKind::Untyped)
                    .ordered_by(Arc::new(docbridge_mongodb::NaturalOrder))
                    .nullable(),
            ),
    );
    registry.register(
        ModelSchema::new("EmbeddedModel")
            .field("id", FieldSpec::scalar(ScalarKind::ObjectId).primary_key())
            .field("some_relation", FieldSpec::foreign_key("Target").nullable())
            .field(
                "someint",
                FieldSpec::scalar(ScalarKind::Int).db_column("custom").nullable(),
            )
            .field(
                "auto_now",
                FieldSpec::scalar(ScalarKind::DateTime).auto_now().nullable(),
            )
            .field(
                "auto_now_add",
                FieldSpec::scalar(ScalarKind::DateTime)
                    .auto_now_add()
                    .nullable(),
            ),
    );
    registry.register(
        ModelSchema::new("EmbeddedModelFieldModel")
            .field("id", FieldSpec::scalar(ScalarKind::ObjectId).primary_key())
            .field("simple", FieldSpec::embedded("EmbeddedModel").nullable())
            .field("simple_untyped", FieldSpec::embedded_untyped().nullable())
            .field(
                "decimal_parent",
                FieldSpec::embedded("DecimalParent").nullable(),
            )
            .field(
                "typed_list2",
                FieldSpec::list(ElementKind::Embedded(Some("EmbeddedModel".to_string()))),
            )
            .field(
                "untyped_list",
                FieldSpec::list(ElementKind::Embedded(None)),
            )
            .field(
                "ordered_list",
                FieldSpec::list(ElementKind::Embedded(None)).ordered_by(Arc::new(by_index)),
            ),
    );
    registry.register(
        ModelSchema::new("Child")
            .field("id", FieldSpec::scalar(ScalarKind::ObjectId).primary_key()),
    );
    registry.register(
        ModelSchema::new("ReferenceList")
            .field("id", FieldSpec::scalar(ScalarKind::ObjectId).primary_key())
            .field(
                "keys",
                FieldSpec::list(ElementKind::ForeignKey {
                    target: "Target".to_string(),
                }),
            ),
    );
    registry.register(
        ModelSchema::new("Parent")
            .field("id", FieldSpec::scalar(ScalarKind::Int).primary_key())
            .field(
                "integer_list",
                FieldSpec::list(ElementKind::Scalar(ScalarKind::Int)),
            )
            .field(
                "embedded_list",
                FieldSpec::list(ElementKind::Embedded(Some("Child".to_string()))),
            ),
    );
    registry
}

fn at(secs: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, secs).unwrap()
}

// ---------------------------------------------------------------------------
// List fields
// ---------------------------------------------------------------------------

#[test]
fn default_list_values_are_independent_per_instance() {
    let registry = base_registry();
    let schema = registry.get("ListModel").unwrap().clone();

    let mut first = Instance::new(&schema);
    if let Some(Value::List(items)) = first.get_mut("names_with_default") {
        items.push(Value::from(2));
    }
    let second = Instance::new(&schema);
    assert_eq!(
        second.get("names_with_default"),
        Some(&Value::List(Vec::new()))
    );
}

#[test]
fn nullable_list_stays_absent_while_default_stays_empty() {
    let registry = base_registry();
    let schema = registry.get("ListModel").unwrap().clone();

    let mut instance = Instance::new(&schema);
    instance.set("integer", 1);
    instance.set("floating_point", 5.3);
    instance.set("names", Value::list(["Kakashi"]));

    let doc = prepare_save(&registry, &schema, &mut instance, at(0)).unwrap();
    assert_eq!(doc.get_array("names_with_default").unwrap().len(), 0);
    assert_eq!(doc.get("names_nullable"), Some(&Bson::Null));
}

#[test]
fn ordering_policy_runs_at_save_not_assignment() {
    let mut registry = base_registry();
    let spy = CountingNatural::new();
    registry.register(
        ModelSchema::new("OrderedListModel")
            .field("id", FieldSpec::scalar(ScalarKind::ObjectId).primary_key())
            .field(
                "ordered_ints",
                FieldSpec::list(ElementKind::Scalar(ScalarKind::Int))
                    .default_value(Value::List(Vec::new()))
                    .ordered_by(spy.clone())
                    .nullable(),
            ),
    );
    let schema = registry.get("OrderedListModel").unwrap().clone();

    let unordered = [4, 2, 6, 1];
    let mut instance = Instance::new(&schema);
    instance.set("ordered_ints", Value::list(unordered));
    // Assignment does not order.
    assert_eq!(spy.calls(), 0);
    assert_eq!(instance.get("ordered_ints"), Some(&Value::list(unordered)));

    let doc = prepare_save(&registry, &schema, &mut instance, at(0)).unwrap();
    let stored: Vec<i64> = doc
        .get_array("ordered_ints")
        .unwrap()
        .iter()
        .map(|b| b.as_i64().unwrap())
        .collect();
    assert_eq!(stored, vec![1, 2, 4, 6]);
    // The key function runs at most once per element.
    assert!(spy.calls() <= unordered.len());
}

#[test]
fn ordered_embedded_list_sorts_by_extracted_key() {
    let registry = base_registry();
    let holder_schema = registry.get("EmbeddedModelFieldModel").unwrap().clone();
    let target_schema = registry.get("Target").unwrap().clone();

    let targets: Vec<Value> = (1..=5)
        .rev()
        .map(|index| {
            let mut target = Instance::new(&target_schema);
            target.set("index", index);
            Value::from(target)
        })
        .collect();

    let mut holder = Instance::new(&holder_schema);
    holder.set("ordered_list", Value::List(targets));

    let doc = prepare_save(&registry, &holder_schema, &mut holder, at(0)).unwrap();
    let indices: Vec<i64> = doc
        .get_array("ordered_list")
        .unwrap()
        .iter()
        .map(|b| b.as_document().unwrap().get_i64("index").unwrap())
        .collect();
    assert_eq!(indices, vec![1, 2, 3, 4, 5]);
}

#[test]
fn nested_lists_fail_explicitly() {
    let registry = base_registry();
    let schema = registry.get("ListModel").unwrap().clone();
    let mut instance = Instance::new(&schema);
    instance.set("integer", 1);
    instance.set("floating_point", 0.0);
    instance.set(
        "names",
        Value::List(vec![Value::from("ok"), Value::list(["nested"])]),
    );

    let err = prepare_save(&registry, &schema, &mut instance, at(0)).unwrap_err();
    assert!(matches!(err, BridgeError::TypeMismatch(_)));
    assert!(err.to_string().contains("nested lists"));
}

// ---------------------------------------------------------------------------
// Lookup translation
// ---------------------------------------------------------------------------

#[test]
fn startswith_scalar_matches_element_prefixes() {
    let registry = base_registry();
    let schema = registry.get("ListModel").unwrap().clone();
    let translated = docbridge_mongodb::query::translate(
        &registry,
        &schema,
        &Filter::cmp("names", Lookup::StartsWith, "Sa"),
        StoreCapabilities::MONGODB,
    )
    .unwrap();
    assert_eq!(translated, doc! { "names": { "$regex": "^Sa" } });
}

#[test]
fn startswith_sequence_is_a_positional_prefix() {
    let registry = base_registry();
    let schema = registry.get("ListModel").unwrap().clone();

    // ["Kakashi", "Naruto"] pins the first two positions: the stored
    // sequence ["Kakashi", "Naruto", "Sasuke"] matches, ["Naruto", ...]
    // cannot.
    let matching = docbridge_mongodb::query::translate(
        &registry,
        &schema,
        &Filter::cmp(
            "names",
            Lookup::StartsWith,
            Value::list(["Kakashi", "Naruto"]),
        ),
        StoreCapabilities::MONGODB,
    )
    .unwrap();
    assert_eq!(
        matching,
        doc! { "names.0": "Kakashi", "names.1": "Naruto" }
    );

    let non_matching = docbridge_mongodb::query::translate(
        &registry,
        &schema,
        &Filter::cmp("names", Lookup::StartsWith, Value::list(["Naruto"])),
        StoreCapabilities::MONGODB,
    )
    .unwrap();
    assert_eq!(non_matching, doc! { "names.0": "Naruto" });
}

#[test]
fn inequalities_use_native_sequence_comparison() {
    let registry = base_registry();
    let schema = registry.get("ListModel").unwrap().clone();
    let translated = docbridge_mongodb::query::translate(
        &registry,
        &schema,
        &Filter::cmp("names", Lookup::Gt, Value::list(["Kakashi"])),
        StoreCapabilities::MONGODB,
    )
    .unwrap();
    assert_eq!(translated, doc! { "names": { "$gt": ["Kakashi"] } });
}

#[test]
fn chained_filters_compose_conjunctively() {
    let registry = base_registry();
    let schema = registry.get("ListModel").unwrap().clone();
    let query = ModelQuery::new(schema)
        .filter(Filter::exact("floating_point", 9.1))
        .filter(Filter::cmp("names", Lookup::StartsWith, "Sa"));
    let translated = query.to_filter_document(&registry).unwrap();
    assert_eq!(
        translated,
        doc! { "$and": [
            { "floating_point": 9.1 },
            { "names": { "$regex": "^Sa" } },
        ] }
    );
}

#[test]
fn boolean_combinators_pass_through() {
    let registry = base_registry();
    let schema = registry.get("ListModel").unwrap().clone();
    // exclude(names < "Sakura" OR names >= "Sasuke")
    let query = ModelQuery::new(schema).exclude(Filter::or(vec![
        Filter::cmp("names", Lookup::Lt, "Sakura"),
        Filter::cmp("names", Lookup::Gte, "Sasuke"),
    ]));
    let translated = query.to_filter_document(&registry).unwrap();
    assert_eq!(
        translated,
        doc! { "$nor": [ { "$or": [
            { "names": { "$lt": "Sakura" } },
            { "names": { "$gte": "Sasuke" } },
        ] } ] }
    );
}

#[test]
fn capped_stores_reject_multi_path_inequalities() {
    let registry = base_registry();
    let schema = registry.get("ListModel").unwrap().clone();
    let filter = Filter::and(vec![
        Filter::cmp("floating_point", Lookup::Gt, 1.0),
        Filter::cmp("names", Lookup::Lt, "Sakura"),
    ]);

    let err = docbridge_mongodb::query::translate(
        &registry,
        &schema,
        &filter,
        StoreCapabilities::SINGLE_INEQUALITY,
    )
    .unwrap_err();
    assert!(matches!(err, BridgeError::UnsupportedLookupCombination(_)));

    // MongoDB expresses the same combination.
    assert!(docbridge_mongodb::query::translate(
        &registry,
        &schema,
        &filter,
        StoreCapabilities::MONGODB
    )
    .is_ok());
}

#[test]
fn foreign_key_list_operands_coerce_to_referenced_key() {
    let registry = base_registry();
    let schema = registry.get("DecimalsList").unwrap().clone();
    let translated = docbridge_mongodb::query::translate(
        &registry,
        &schema,
        &Filter::exact("decimals", Value::list(["1.5"])),
        StoreCapabilities::MONGODB,
    )
    .unwrap();
    let stored = translated.get_array("decimals").unwrap();
    assert!(matches!(stored[0], Bson::Decimal128(_)));
}

// ---------------------------------------------------------------------------
// Embedded documents and pre-save hooks
// ---------------------------------------------------------------------------

#[test]
fn embedded_values_coerce_and_keep_pk_unset() {
    let registry = base_registry();
    let holder_schema = registry.get("EmbeddedModelFieldModel").unwrap().clone();
    let embedded_schema = registry.get("EmbeddedModel").unwrap().clone();

    let mut embedded = Instance::new(&embedded_schema);
    embedded.set("someint", "5");
    let mut holder = Instance::new(&holder_schema);
    holder.set("simple", embedded);

    let doc = prepare_save(&registry, &holder_schema, &mut holder, at(0)).unwrap();
    let simple = doc.get_document("simple").unwrap();
    // Coerced through the codec and stored under the column override.
    assert_eq!(simple.get_i64("custom").unwrap(), 5);
    // Embedded documents have no independent identity unless assigned.
    assert!(!simple.contains_key("_id"));

    let restored = codec::restore_instance(&registry, &holder_schema, &doc).unwrap();
    let Some(Value::Embedded(restored_embedded)) = restored.get("simple") else {
        panic!("embedded instance expected");
    };
    assert_eq!(restored_embedded.get("someint"), Some(&Value::Int(5)));
    assert!(restored_embedded.pk(&embedded_schema).is_none());
}

#[test]
fn embedded_pk_is_stored_once_assigned() {
    let registry = base_registry();
    let holder_schema = registry.get("EmbeddedModelFieldModel").unwrap().clone();
    let embedded_schema = registry.get("EmbeddedModel").unwrap().clone();

    let id = bson::oid::ObjectId::new();
    let mut embedded = Instance::new(&embedded_schema);
    embedded.set("id", id);
    let mut holder = Instance::new(&holder_schema);
    holder.set("simple", embedded);

    let doc = prepare_save(&registry, &holder_schema, &mut holder, at(0)).unwrap();
    assert_eq!(
        doc.get_document("simple").unwrap().get_object_id("_id").unwrap(),
        id
    );
}

#[test]
fn auto_timestamps_populate_depth_first_and_increase() {
    let registry = base_registry();
    let holder_schema = registry.get("EmbeddedModelFieldModel").unwrap().clone();
    let embedded_schema = registry.get("EmbeddedModel").unwrap().clone();

    for field in ["simple", "simple_untyped"] {
        let mut holder = Instance::new(&holder_schema);
        holder.set(field, Instance::new(&embedded_schema));

        prepare_save(&registry, &holder_schema, &mut holder, at(1)).unwrap();
        let embedded = |holder: &Instance| -> Instance {
            let Some(Value::Embedded(instance)) = holder.get(field) else {
                panic!("embedded instance expected");
            };
            (**instance).clone()
        };
        assert_eq!(
            embedded(&holder).get("auto_now"),
            Some(&Value::DateTime(at(1)))
        );
        assert_eq!(
            embedded(&holder).get("auto_now_add"),
            Some(&Value::DateTime(at(1)))
        );

        // A later save refreshes auto_now only.
        prepare_save(&registry, &holder_schema, &mut holder, at(2)).unwrap();
        assert_eq!(
            embedded(&holder).get("auto_now"),
            Some(&Value::DateTime(at(2)))
        );
        assert_eq!(
            embedded(&holder).get("auto_now_add"),
            Some(&Value::DateTime(at(1)))
        );
    }
}

#[test]
fn auto_timestamps_reach_embedded_lists() {
    let registry = base_registry();
    let holder_schema = registry.get("EmbeddedModelFieldModel").unwrap().clone();
    let embedded_schema = registry.get("EmbeddedModel").unwrap().clone();

    let mut holder = Instance::new(&holder_schema);
    holder.set(
        "typed_list2",
        Value::List(vec![Instance::new(&embedded_schema).into()]),
    );
    prepare_save(&registry, &holder_schema, &mut holder, at(1)).unwrap();

    // Append a second element and save again: the first keeps its creation
    // stamp, the new one gets both.
    if let Some(Value::List(items)) = holder.get_mut("typed_list2") {
        items.push(Instance::new(&embedded_schema).into());
    }
    prepare_save(&registry, &holder_schema, &mut holder, at(2)).unwrap();

    let Some(Value::List(items)) = holder.get("typed_list2") else {
        panic!("list expected");
    };
    let stamps: Vec<(&Value, &Value)> = items
        .iter()
        .map(|item| {
            let Value::Embedded(instance) = item else {
                panic!("embedded element expected");
            };
            (
                instance.get("auto_now").unwrap(),
                instance.get("auto_now_add").unwrap(),
            )
        })
        .collect();
    assert_eq!(stamps[0], (&Value::DateTime(at(2)), &Value::DateTime(at(1))));
    assert_eq!(stamps[1], (&Value::DateTime(at(2)), &Value::DateTime(at(2))));
}

#[test]
fn wrong_typed_embedded_values_fail_at_save_time() {
    let registry = base_registry();
    let holder_schema = registry.get("EmbeddedModelFieldModel").unwrap().clone();

    for (field, expected) in [("simple", "EmbeddedModel"), ("simple_untyped", "Model")] {
        let mut holder = Instance::new(&holder_schema);
        // Construction and assignment succeed; only the save fails.
        holder.set(field, 42);
        let err = prepare_save(&registry, &holder_schema, &mut holder, at(0)).unwrap_err();
        assert_eq!(
            err.to_string(),
            format!("Type mismatch: Expected instance of type {expected}")
        );
    }
}

#[test]
fn untyped_embedded_list_restores_concrete_models() {
    let registry = base_registry();
    let holder_schema = registry.get("EmbeddedModelFieldModel").unwrap().clone();
    let embedded_schema = registry.get("EmbeddedModel").unwrap().clone();
    let ordered_schema = registry.get("OrderedListModel").unwrap().clone();

    let mut embedded = Instance::new(&embedded_schema);
    embedded.set("someint", 7);
    let mut ordered = Instance::new(&ordered_schema);
    ordered.set("ordered_ints", Value::list([5, 4, 3, 2, 1]));

    let mut holder = Instance::new(&holder_schema);
    holder.set(
        "untyped_list",
        Value::List(vec![embedded.into(), ordered.into()]),
    );

    let doc = prepare_save(&registry, &holder_schema, &mut holder, at(3)).unwrap();
    let restored = codec::restore_instance(&registry, &holder_schema, &doc).unwrap();
    let Some(Value::List(items)) = restored.get("untyped_list") else {
        panic!("list expected");
    };

    let Value::Embedded(first) = &items[0] else {
        panic!("embedded element expected");
    };
    assert_eq!(first.model(), "EmbeddedModel");
    assert_eq!(first.get("someint"), Some(&Value::Int(7)));
    assert_eq!(first.get("auto_now"), Some(&Value::DateTime(at(3))));

    let Value::Embedded(second) = &items[1] else {
        panic!("embedded element expected");
    };
    assert_eq!(second.model(), "OrderedListModel");
    assert_eq!(second.get("ordered_ints"), Some(&Value::list([1, 2, 3, 4, 5])));
}

#[test]
fn foreign_keys_in_embedded_documents_store_raw_identities() {
    let registry = base_registry();
    let holder_schema = registry.get("EmbeddedModelFieldModel").unwrap().clone();
    let embedded_schema = registry.get("EmbeddedModel").unwrap().clone();
    let target_schema = registry.get("Target").unwrap().clone();

    let target_id = bson::oid::ObjectId::new();
    let mut target = Instance::new(&target_schema);
    target.set("id", target_id);
    target.set("index", 1);

    let mut embedded = Instance::new(&embedded_schema);
    embedded.set("some_relation", target);
    let mut holder = Instance::new(&holder_schema);
    holder.set("simple", embedded);

    let doc = prepare_save(&registry, &holder_schema, &mut holder, at(0)).unwrap();
    let simple = doc.get_document("simple").unwrap();
    // Only the identity is stored, under the reference column.
    assert_eq!(simple.get_object_id("some_relation_id").unwrap(), target_id);
    assert!(!simple.contains_key("some_relation"));

    // Restoring yields the identity for on-demand resolution.
    let restored = codec::restore_instance(&registry, &holder_schema, &doc).unwrap();
    let Some(Value::Embedded(restored_embedded)) = restored.get("simple") else {
        panic!("embedded instance expected");
    };
    assert_eq!(
        restored_embedded.get("some_relation"),
        Some(&Value::ObjectId(target_id))
    );
}

#[test]
fn embedded_foreign_keys_coerce_to_decimal_identities() {
    let registry = base_registry();
    let holder_schema = registry.get("EmbeddedModelFieldModel").unwrap().clone();
    let parent_schema = registry.get("DecimalParent").unwrap().clone();

    let mut parent = Instance::new(&parent_schema);
    parent.set("child", Value::Decimal("1.5".parse().unwrap()));
    let mut holder = Instance::new(&holder_schema);
    holder.set("decimal_parent", parent);

    let doc = prepare_save(&registry, &holder_schema, &mut holder, at(0)).unwrap();
    let stored = doc
        .get_document("decimal_parent")
        .unwrap()
        .get("child_id")
        .unwrap();
    assert!(matches!(stored, Bson::Decimal128(_)));
}

// ---------------------------------------------------------------------------
// Partial updates
// ---------------------------------------------------------------------------

#[test]
fn updates_coerce_values_per_collection_field() {
    let registry = base_registry();
    let parent_schema = registry.get("Parent").unwrap().clone();
    let child_schema = registry.get("Child").unwrap().clone();

    let child_id = bson::oid::ObjectId::new();
    let mut child = Instance::new(&child_schema);
    child.set("id", child_id);

    let update = prepare_update(
        &registry,
        &parent_schema,
        vec![
            ("integer_list".to_string(), Value::list(["3"])),
            ("embedded_list".to_string(), Value::List(vec![child.into()])),
        ],
        at(0),
    )
    .unwrap();

    let set = update.get_document("$set").unwrap();
    assert_eq!(set.get_array("integer_list").unwrap()[0], Bson::Int64(3));
    let embedded = set.get_array("embedded_list").unwrap()[0]
        .as_document()
        .unwrap();
    assert_eq!(embedded.get_object_id("_id").unwrap(), child_id);
}

#[test]
fn update_coerces_foreign_key_identities_inside_lists() {
    let registry = base_registry();
    let schema = registry.get("ReferenceList").unwrap().clone();

    // Hex-string identities coerce to the referenced key's native kind.
    let target_id = bson::oid::ObjectId::new();
    let update = prepare_update(
        &registry,
        &schema,
        vec![("keys".to_string(), Value::list([target_id.to_hex()]))],
        at(0),
    )
    .unwrap();
    let keys = update.get_document("$set").unwrap().get_array("keys").unwrap();
    assert_eq!(keys[0], Bson::ObjectId(target_id));
}

#[test]
fn update_rejects_unknown_fields() {
    let registry = base_registry();
    let parent_schema = registry.get("Parent").unwrap().clone();
    let err = prepare_update(
        &registry,
        &parent_schema,
        vec![("ghost".to_string(), Value::Int(1))],
        at(0),
    )
    .unwrap_err();
    assert!(matches!(err, BridgeError::Query(_)));
}

// ---------------------------------------------------------------------------
// Round trips
// ---------------------------------------------------------------------------

#[test]
fn whole_instance_round_trip_preserves_field_values() {
    let registry = base_registry();
    let schema = registry.get("ListModel").unwrap().clone();

    let names = ["Kakashi", "Naruto", "Sasuke", "Sakura"];
    for count in 1..=names.len() {
        let mut instance = Instance::new(&schema);
        instance.set("integer", count as i64);
        instance.set("floating_point", 5.3);
        instance.set("names", Value::list(names[..count].iter().copied()));

        let doc = prepare_save(&registry, &schema, &mut instance, at(0)).unwrap();
        assert_eq!(doc.get_i64("_id").unwrap(), count as i64);

        let restored = codec::restore_instance(&registry, &schema, &doc).unwrap();
        assert_eq!(restored.get("names"), instance.get("names"));
        assert_eq!(restored.get("floating_point"), Some(&Value::Float(5.3)));
    }
}
