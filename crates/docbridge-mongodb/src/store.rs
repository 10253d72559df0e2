//! Store-facing CRUD carrying codec output
//!
//! `Documents` is the per-model handle: it pairs one collection with the
//! model's schema and the shared registry, pushes codec output across the
//! wire and restores raw documents on the way back. Driver failures come
//! back as store errors with the original cause attached; the core never
//! retries.

use std::sync::Arc;

use bson::{doc, Document as BsonDocument};
use chrono::Utc;
use docbridge_common::{BridgeError, Result};
use futures::TryStreamExt;
use mongodb::{Collection, Database};
use tracing::debug;

use crate::codec;
use crate::instance::Instance;
use crate::query::{self, Filter, ModelQuery, StoreCapabilities};
use crate::save::{self, SavePhase};
use crate::schema::{ModelSchema, SchemaRegistry};
use crate::value::Value;

/// Handle for one model's documents.
pub struct Documents {
    registry: Arc<SchemaRegistry>,
    schema: Arc<ModelSchema>,
    collection: Collection<BsonDocument>,
}

impl Documents {
    pub fn new(db: &Database, registry: Arc<SchemaRegistry>, schema: Arc<ModelSchema>) -> Self {
        let collection = db.collection(schema.collection());
        Self {
            registry,
            schema,
            collection,
        }
    }

    pub fn schema(&self) -> &Arc<ModelSchema> {
        &self.schema
    }

    /// Insert a new document; returns the stored identity. When the
    /// instance's primary key is unset the store assigns one, which is
    /// written back onto the instance.
    pub async fn insert(&self, instance: &mut Instance) -> Result<Value> {
        let document = save::prepare_save(&self.registry, &self.schema, instance, Utc::now())?;
        let result = self.collection.insert_one(document).await.map_err(|e| {
            BridgeError::store_with(
                format!("insert into '{}' failed", self.schema.collection()),
                e,
            )
        })?;
        let id = codec::restore_identity(&self.registry, &self.schema, &result.inserted_id)?;
        if instance.pk(&self.schema).is_none() {
            instance.set_pk(&self.schema, id.clone());
        }
        save::log_phase(&self.schema, SavePhase::Persisted);
        debug!(model = self.schema.name(), "inserted document");
        Ok(id)
    }

    /// Rewrite an existing document in place. Requires the primary key to
    /// be set; embedded instances the previous version held are simply
    /// overwritten.
    pub async fn save(&self, instance: &mut Instance) -> Result<bool> {
        let (pk_name, pk_spec) = self.schema.pk_field().ok_or_else(|| {
            BridgeError::Internal(format!("model '{}' has no primary key", self.schema.name()))
        })?;
        let id = instance
            .pk(&self.schema)
            .cloned()
            .ok_or_else(|| BridgeError::store("cannot save an instance without a primary key"))?;
        let id_bson = codec::prepare(&self.registry, pk_name, pk_spec, &id)?;

        let mut document = save::prepare_save(&self.registry, &self.schema, instance, Utc::now())?;
        document.remove("_id");

        let result = self
            .collection
            .update_one(doc! { "_id": id_bson }, doc! { "$set": document })
            .await
            .map_err(|e| {
                BridgeError::store_with(
                    format!("save into '{}' failed", self.schema.collection()),
                    e,
                )
            })?;
        save::log_phase(&self.schema, SavePhase::Persisted);
        Ok(result.modified_count > 0)
    }

    /// Fetch the single document matching a filter.
    pub async fn get(&self, filter: Filter) -> Result<Option<Instance>> {
        let filter_doc = query::translate(
            &self.registry,
            &self.schema,
            &filter,
            StoreCapabilities::MONGODB,
        )?;
        let found = self
            .collection
            .find_one(filter_doc)
            .await
            .map_err(|e| BridgeError::store_with("find_one failed", e))?;
        found
            .map(|doc| codec::restore_instance(&self.registry, &self.schema, &doc))
            .transpose()
    }

    /// Fetch every document matching a query.
    pub async fn fetch(&self, query: &ModelQuery) -> Result<Vec<Instance>> {
        let filter_doc = query.to_filter_document(&self.registry)?;
        let mut find = self.collection.find(filter_doc);
        if let Some(sort) = query.get_sort() {
            find = find.sort(sort.clone());
        }
        if let Some(skip) = query.get_skip() {
            find = find.skip(skip);
        }
        if let Some(limit) = query.get_limit() {
            find = find.limit(limit);
        }
        let cursor = find
            .await
            .map_err(|e| BridgeError::store_with("find failed", e))?;
        let docs: Vec<BsonDocument> = cursor
            .try_collect()
            .await
            .map_err(|e| BridgeError::store_with("cursor drain failed", e))?;
        debug!(
            model = self.schema.name(),
            count = docs.len(),
            "fetched documents"
        );
        docs.iter()
            .map(|doc| codec::restore_instance(&self.registry, &self.schema, doc))
            .collect()
    }

    /// Field-level update of every document matching a filter. Updated
    /// values are coerced; unrelated fields are untouched.
    pub async fn update(&self, filter: Filter, changes: Vec<(String, Value)>) -> Result<u64> {
        let filter_doc = query::translate(
            &self.registry,
            &self.schema,
            &filter,
            StoreCapabilities::MONGODB,
        )?;
        let update_doc = save::prepare_update(&self.registry, &self.schema, changes, Utc::now())?;
        let result = self
            .collection
            .update_many(filter_doc, update_doc)
            .await
            .map_err(|e| {
                BridgeError::store_with(
                    format!("update of '{}' failed", self.schema.collection()),
                    e,
                )
            })?;
        Ok(result.modified_count)
    }

    /// Delete every document matching a filter; returns the count removed.
    pub async fn delete(&self, filter: Filter) -> Result<u64> {
        let filter_doc = query::translate(
            &self.registry,
            &self.schema,
            &filter,
            StoreCapabilities::MONGODB,
        )?;
        let result = self
            .collection
            .delete_many(filter_doc)
            .await
            .map_err(|e| BridgeError::store_with("delete failed", e))?;
        Ok(result.deleted_count)
    }

    /// Count documents matching an optional filter.
    pub async fn count(&self, filter: Option<Filter>) -> Result<u64> {
        let filter_doc = match filter {
            Some(filter) => query::translate(
                &self.registry,
                &self.schema,
                &filter,
                StoreCapabilities::MONGODB,
            )?,
            None => BsonDocument::new(),
        };
        self.collection
            .count_documents(filter_doc)
            .await
            .map_err(|e| BridgeError::store_with("count failed", e))
    }
}

/// On-demand foreign-key resolution: identity in, instance out. Embedded
/// documents keep only the raw identity, so cycles cannot form.
pub async fn resolve_reference(
    db: &Database,
    registry: &SchemaRegistry,
    target: &str,
    identity: &Value,
) -> Result<Option<Instance>> {
    let schema = registry.expect(target)?;
    let (pk_name, pk_spec) = schema
        .pk_field()
        .ok_or_else(|| BridgeError::Internal(format!("model '{target}' has no primary key")))?;
    let id_bson = codec::prepare(registry, pk_name, pk_spec, identity)?;
    let collection: Collection<BsonDocument> = db.collection(schema.collection());
    let found = collection
        .find_one(doc! { "_id": id_bson })
        .await
        .map_err(|e| BridgeError::store_with(format!("resolving {target} reference failed"), e))?;
    found
        .map(|doc| codec::restore_instance(registry, schema, &doc))
        .transpose()
}
