//! Query lookup translation
//!
//! Filter trees carry relational-style lookups over composite fields;
//! translation emits the equivalent BSON filter document. Boolean
//! combinators pass through structurally. A store capability profile
//! rejects combinations the target cannot express instead of letting them
//! silently mis-filter.

use std::collections::BTreeSet;
use std::sync::Arc;

use bson::{doc, Bson, Document as BsonDocument};
use docbridge_common::{BridgeError, Result};

use crate::codec;
use crate::schema::{FieldKind, FieldSpec, ModelSchema, SchemaRegistry};
use crate::value::Value;

/// Relational lookup kinds supported over composite fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    /// Order-sensitive sequence equality for list operands; element
    /// membership for scalar operands.
    Exact,
    /// Element membership; sequence operands match by positional prefix.
    Contains,
    /// Scalar operand: any element starts with the operand text. Sequence
    /// operand: the stored sequence begins with the operand sequence.
    StartsWith,
    Gt,
    Gte,
    Lt,
    Lte,
    /// Field absent or explicitly null.
    IsNull,
}

impl Lookup {
    /// Range-style lookups. Capped stores allow only a fixed number of
    /// distinct paths carrying one of these in a single query.
    pub fn is_inequality(self) -> bool {
        matches!(self, Self::Gt | Self::Gte | Self::Lt | Self::Lte)
    }

    fn operator(self) -> Option<&'static str> {
        match self {
            Self::Gt => Some("$gt"),
            Self::Gte => Some("$gte"),
            Self::Lt => Some("$lt"),
            Self::Lte => Some("$lte"),
            _ => None,
        }
    }
}

/// A filter tree over one model's fields.
#[derive(Debug, Clone)]
pub enum Filter {
    Cmp {
        path: String,
        lookup: Lookup,
        operand: Value,
    },
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
}

impl Filter {
    pub fn cmp(path: impl Into<String>, lookup: Lookup, operand: impl Into<Value>) -> Self {
        Self::Cmp {
            path: path.into(),
            lookup,
            operand: operand.into(),
        }
    }

    pub fn exact(path: impl Into<String>, operand: impl Into<Value>) -> Self {
        Self::cmp(path, Lookup::Exact, operand)
    }

    pub fn and(parts: Vec<Filter>) -> Self {
        Self::And(parts)
    }

    pub fn or(parts: Vec<Filter>) -> Self {
        Self::Or(parts)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(inner: Filter) -> Self {
        Self::Not(Box::new(inner))
    }
}

/// What the target store's query planner can express.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreCapabilities {
    /// Maximum number of distinct field paths carrying an inequality lookup
    /// in one query; None means uncapped.
    pub max_inequality_paths: Option<usize>,
}

impl StoreCapabilities {
    /// MongoDB composes arbitrary range predicates under `$and`.
    pub const MONGODB: Self = Self {
        max_inequality_paths: None,
    };

    /// Profile for stores whose planner refuses more than one
    /// inequality-filtered path per query.
    pub const SINGLE_INEQUALITY: Self = Self {
        max_inequality_paths: Some(1),
    };
}

impl Default for StoreCapabilities {
    fn default() -> Self {
        Self::MONGODB
    }
}

/// Translate a filter tree into a BSON filter document.
pub fn translate(
    registry: &SchemaRegistry,
    schema: &ModelSchema,
    filter: &Filter,
    capabilities: StoreCapabilities,
) -> Result<BsonDocument> {
    check_capabilities(filter, capabilities)?;
    translate_node(registry, schema, filter)
}

fn check_capabilities(filter: &Filter, capabilities: StoreCapabilities) -> Result<()> {
    let Some(cap) = capabilities.max_inequality_paths else {
        return Ok(());
    };
    let mut paths = BTreeSet::new();
    collect_inequality_paths(filter, &mut paths);
    if paths.len() > cap {
        let listed = paths.into_iter().collect::<Vec<_>>().join(", ");
        return Err(BridgeError::UnsupportedLookupCombination(format!(
            "store allows at most {cap} inequality-filtered path(s) per query, got: {listed}"
        )));
    }
    Ok(())
}

fn collect_inequality_paths(filter: &Filter, paths: &mut BTreeSet<String>) {
    match filter {
        Filter::Cmp { path, lookup, .. } => {
            if lookup.is_inequality() {
                paths.insert(path.clone());
            }
        }
        Filter::And(parts) | Filter::Or(parts) => {
            for part in parts {
                collect_inequality_paths(part, paths);
            }
        }
        Filter::Not(inner) => collect_inequality_paths(inner, paths),
    }
}

fn translate_node(
    registry: &SchemaRegistry,
    schema: &ModelSchema,
    filter: &Filter,
) -> Result<BsonDocument> {
    match filter {
        Filter::Cmp {
            path,
            lookup,
            operand,
        } => translate_cmp(registry, schema, path, *lookup, operand),
        Filter::And(parts) => {
            let translated = parts
                .iter()
                .map(|part| translate_node(registry, schema, part))
                .collect::<Result<Vec<_>>>()?;
            Ok(doc! { "$and": translated })
        }
        Filter::Or(parts) => {
            let translated = parts
                .iter()
                .map(|part| translate_node(registry, schema, part))
                .collect::<Result<Vec<_>>>()?;
            Ok(doc! { "$or": translated })
        }
        // $nor negates any subexpression, compound or simple.
        Filter::Not(inner) => {
            let translated = translate_node(registry, schema, inner)?;
            Ok(doc! { "$nor": [translated] })
        }
    }
}

fn translate_cmp(
    registry: &SchemaRegistry,
    schema: &ModelSchema,
    path: &str,
    lookup: Lookup,
    operand: &Value,
) -> Result<BsonDocument> {
    let (field, spec) = resolve_path(schema, path)?;
    let column = schema.column(field);

    match lookup {
        Lookup::IsNull => {
            let wanted = matches!(operand, Value::Bool(true));
            if wanted {
                let mut absent = BsonDocument::new();
                absent.insert(column.as_str(), doc! { "$exists": false });
                let mut null_match = BsonDocument::new();
                null_match.insert(column.as_str(), Bson::Null);
                Ok(doc! { "$or": [null_match, absent] })
            } else {
                let mut out = BsonDocument::new();
                out.insert(column, doc! { "$exists": true, "$ne": Bson::Null });
                Ok(out)
            }
        }
        Lookup::Exact | Lookup::Contains => {
            if matches!(lookup, Lookup::Contains) {
                if let Value::List(_) = operand {
                    return positional_prefix(registry, field, spec, &column, operand);
                }
            }
            // Scalar operands ride on the store's native element-membership
            // match; list operands compare the whole array, order included.
            let prepared = prepare_operand(registry, field, spec, operand)?;
            let mut out = BsonDocument::new();
            out.insert(column, prepared);
            Ok(out)
        }
        Lookup::StartsWith => match operand {
            Value::String(text) => {
                let mut out = BsonDocument::new();
                out.insert(column, doc! { "$regex": format!("^{}", regex::escape(text)) });
                Ok(out)
            }
            Value::List(_) => positional_prefix(registry, field, spec, &column, operand),
            other => Err(BridgeError::Query(format!(
                "startswith requires a string or sequence operand, got {}",
                other.type_name()
            ))),
        },
        Lookup::Gt | Lookup::Gte | Lookup::Lt | Lookup::Lte => {
            let operator = lookup.operator().ok_or_else(|| {
                BridgeError::Internal(format!("{lookup:?} is not a range lookup"))
            })?;
            let prepared = prepare_operand(registry, field, spec, operand)?;
            let mut inner = BsonDocument::new();
            inner.insert(operator, prepared);
            let mut out = BsonDocument::new();
            out.insert(column, inner);
            Ok(out)
        }
    }
}

/// Sequence-prefix match: element i of the operand must equal element i of
/// the stored sequence. Longer stored sequences still match; shorter ones
/// cannot.
fn positional_prefix(
    registry: &SchemaRegistry,
    field: &str,
    spec: &FieldSpec,
    column: &str,
    operand: &Value,
) -> Result<BsonDocument> {
    let Value::List(items) = operand else {
        return Err(BridgeError::Query(
            "sequence prefix lookups require a list operand".to_string(),
        ));
    };
    let FieldKind::List(element) = spec.kind() else {
        return Err(BridgeError::Query(format!(
            "sequence prefix lookups require a list-valued field, '{field}' is not one"
        )));
    };
    if items.is_empty() {
        // An empty prefix matches any present value.
        let mut out = BsonDocument::new();
        out.insert(column, doc! { "$exists": true });
        return Ok(out);
    }
    let mut out = BsonDocument::new();
    for (index, item) in items.iter().enumerate() {
        out.insert(
            format!("{column}.{index}"),
            codec::prepare_element(registry, field, element, item)?,
        );
    }
    Ok(out)
}

/// Coerce a lookup operand through the codec. Scalar operands against
/// list-valued fields coerce as a single element; list operands coerce
/// element-wise.
fn prepare_operand(
    registry: &SchemaRegistry,
    field: &str,
    spec: &FieldSpec,
    operand: &Value,
) -> Result<Bson> {
    match (spec.kind(), operand) {
        (FieldKind::List(element), Value::List(items)) => {
            let prepared = items
                .iter()
                .map(|item| codec::prepare_element(registry, field, element, item))
                .collect::<Result<Vec<_>>>()?;
            Ok(Bson::Array(prepared))
        }
        (FieldKind::List(element), scalar) => {
            codec::prepare_element(registry, field, element, scalar)
        }
        _ => codec::prepare(registry, field, spec, operand),
    }
}

fn resolve_path<'a>(schema: &'a ModelSchema, path: &'a str) -> Result<(&'a str, &'a FieldSpec)> {
    if path == "pk" {
        return schema.pk_field().ok_or_else(|| {
            BridgeError::Query(format!("model '{}' has no primary key", schema.name()))
        });
    }
    let spec = schema.spec(path).ok_or_else(|| {
        BridgeError::Query(format!(
            "unknown field '{path}' on model '{}'",
            schema.name()
        ))
    })?;
    Ok((path, spec))
}

/// Query over one model: filter tree plus sort/skip/limit, translated
/// lazily against a capability profile.
#[derive(Clone)]
pub struct ModelQuery {
    schema: Arc<ModelSchema>,
    filter: Option<Filter>,
    sort: Option<BsonDocument>,
    skip: Option<u64>,
    limit: Option<i64>,
    capabilities: StoreCapabilities,
}

impl ModelQuery {
    pub fn new(schema: Arc<ModelSchema>) -> Self {
        Self {
            schema,
            filter: None,
            sort: None,
            skip: None,
            limit: None,
            capabilities: StoreCapabilities::default(),
        }
    }

    /// Add a filter; successive calls compose conjunctively.
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => Filter::And(vec![existing, filter]),
            None => filter,
        });
        self
    }

    /// Add a negated filter conjunctively.
    pub fn exclude(self, filter: Filter) -> Self {
        self.filter(Filter::not(filter))
    }

    pub fn sort(mut self, sort: BsonDocument) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_capabilities(mut self, capabilities: StoreCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn schema(&self) -> &Arc<ModelSchema> {
        &self.schema
    }

    pub fn get_sort(&self) -> Option<&BsonDocument> {
        self.sort.as_ref()
    }

    pub fn get_skip(&self) -> Option<u64> {
        self.skip
    }

    pub fn get_limit(&self) -> Option<i64> {
        self.limit
    }

    /// Translate the accumulated filter; no filter means match-all.
    pub fn to_filter_document(&self, registry: &SchemaRegistry) -> Result<BsonDocument> {
        match &self.filter {
            Some(filter) => translate(registry, &self.schema, filter, self.capabilities),
            None => Ok(BsonDocument::new()),
        }
    }
}
