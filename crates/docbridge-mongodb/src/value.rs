//! Runtime values for schema-driven documents
//!
//! `Value` is the dynamic value type that flows between application code,
//! the codec and the store. Its comparison order mirrors the BSON type
//! ladder so that ordering-policy sorts agree with what the server would
//! produce.

use std::cmp::Ordering;

use bson::oid::ObjectId;
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::instance::Instance;

/// A runtime value held by a model instance field.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Decimal(Decimal),
    String(String),
    DateTime(DateTime<Utc>),
    ObjectId(ObjectId),
    List(Vec<Value>),
    Embedded(Box<Instance>),
}

impl Value {
    /// Human-readable type name for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Int(_) => "integer",
            Self::Float(_) => "float",
            Self::Decimal(_) => "decimal",
            Self::String(_) => "string",
            Self::DateTime(_) => "datetime",
            Self::ObjectId(_) => "objectid",
            Self::List(_) => "list",
            Self::Embedded(_) => "embedded instance",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Build a list value from anything convertible element-wise.
    pub fn list<I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Value>,
    {
        Self::List(items.into_iter().map(Into::into).collect())
    }

    /// Rank on the store's comparison ladder. MongoDB sorts mixed types as
    /// null < numbers < strings < objects < arrays < objectids < booleans
    /// < dates.
    fn type_rank(&self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Int(_) | Self::Float(_) | Self::Decimal(_) => 1,
            Self::String(_) => 2,
            Self::Embedded(_) => 3,
            Self::List(_) => 4,
            Self::ObjectId(_) => 5,
            Self::Bool(_) => 6,
            Self::DateTime(_) => 7,
        }
    }

    /// Total order over values following the store's comparison ladder.
    /// This backs save-time ordering policies; it is not application-level
    /// equality.
    pub fn store_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a.cmp(b),
            (Self::Float(a), Self::Float(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
            (Self::Decimal(a), Self::Decimal(b)) => a.cmp(b),
            (Self::Int(a), Self::Float(b)) => {
                (*a as f64).partial_cmp(b).unwrap_or(Ordering::Equal)
            }
            (Self::Float(a), Self::Int(b)) => {
                a.partial_cmp(&(*b as f64)).unwrap_or(Ordering::Equal)
            }
            (Self::Int(a), Self::Decimal(b)) => Decimal::from(*a).cmp(b),
            (Self::Decimal(a), Self::Int(b)) => a.cmp(&Decimal::from(*b)),
            (Self::Float(a), Self::Decimal(b)) => a
                .partial_cmp(&b.to_f64().unwrap_or(f64::NAN))
                .unwrap_or(Ordering::Equal),
            (Self::Decimal(a), Self::Float(b)) => a
                .to_f64()
                .unwrap_or(f64::NAN)
                .partial_cmp(b)
                .unwrap_or(Ordering::Equal),
            (Self::String(a), Self::String(b)) => a.cmp(b),
            (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
            (Self::DateTime(a), Self::DateTime(b)) => a.cmp(b),
            (Self::ObjectId(a), Self::ObjectId(b)) => a.bytes().cmp(&b.bytes()),
            (Self::List(a), Self::List(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    let ord = x.store_cmp(y);
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                a.len().cmp(&b.len())
            }
            // Embedded documents have no useful sort key of their own;
            // policies over them extract a field instead.
            (Self::Embedded(_), Self::Embedded(_)) => Ordering::Equal,
            _ => self.type_rank().cmp(&other.type_rank()),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<Decimal> for Value {
    fn from(v: Decimal) -> Self {
        Self::Decimal(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Self::DateTime(v)
    }
}

impl From<ObjectId> for Value {
    fn from(v: ObjectId) -> Self {
        Self::ObjectId(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Self::List(v)
    }
}

impl From<Instance> for Value {
    fn from(v: Instance) -> Self {
        Self::Embedded(Box::new(v))
    }
}
