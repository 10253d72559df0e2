//! Error types for docbridge

use thiserror::Error;

/// Result type alias for docbridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Unified error type for all docbridge operations
#[derive(Error, Debug)]
pub enum BridgeError {
    /// A value does not conform to its declared scalar or composite type.
    /// Surfaced immediately; never retried.
    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    /// A required connection setting is absent. Surfaced to the caller
    /// before any store contact.
    #[error("Missing connection setting: {0}")]
    MissingSetting(String),

    /// The translator cannot express a requested filter combination against
    /// the target store.
    #[error("Unsupported lookup combination: {0}")]
    UnsupportedLookupCombination(String),

    /// Opaque failure reported by the underlying document store. The
    /// original driver error travels along as the source; retry policy, if
    /// any, belongs to the caller.
    #[error("Store error: {message}")]
    Store {
        message: String,
        #[source]
        cause: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl BridgeError {
    /// Composite-type rejection naming the declared type.
    pub fn expected_instance_of(type_name: &str) -> Self {
        Self::TypeMismatch(format!("Expected instance of type {type_name}"))
    }

    /// Store failure without a driver-level cause.
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
            cause: None,
        }
    }

    /// Store failure carrying the original driver error as source.
    pub fn store_with(
        message: impl Into<String>,
        cause: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Store {
            message: message.into(),
            cause: Some(Box::new(cause)),
        }
    }

    /// Returns true if this error came back from the store round-trip
    /// rather than from local validation or translation.
    pub fn is_store_error(&self) -> bool {
        matches!(self, Self::Store { .. })
    }
}

// MongoDB-specific error conversions (when mongodb-errors feature is enabled)
#[cfg(feature = "mongodb-errors")]
impl From<mongodb::error::Error> for BridgeError {
    fn from(err: mongodb::error::Error) -> Self {
        Self::Store {
            message: err.to_string(),
            cause: Some(Box::new(err)),
        }
    }
}

#[cfg(feature = "mongodb-errors")]
impl From<bson::ser::Error> for BridgeError {
    fn from(err: bson::ser::Error) -> Self {
        Self::Serialization(format!("BSON serialization error: {err}"))
    }
}

#[cfg(feature = "mongodb-errors")]
impl From<bson::de::Error> for BridgeError {
    fn from(err: bson::de::Error) -> Self {
        Self::Deserialization(format!("BSON deserialization error: {err}"))
    }
}
