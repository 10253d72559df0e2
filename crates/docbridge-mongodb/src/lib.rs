//! MongoDB adapter for relational-style models
//!
//! docbridge maps an ORM-shaped model layer (typed fields, list-valued
//! fields, embedded documents, foreign keys, filter trees) onto MongoDB
//! while preserving relational semantics: persistence-time coercion, stable
//! save-time list ordering, depth-first pre-save hooks and lookup
//! translation.
//!
//! # Example
//!
//! ```ignore
//! use docbridge_mongodb::{
//!     Connection, Documents, FieldSpec, Filter, Instance, ModelSchema, ScalarKind,
//!     SchemaRegistry, Value,
//! };
//!
//! let mut registry = SchemaRegistry::new();
//! let schema = registry.register(
//!     ModelSchema::new("Player")
//!         .field("id", FieldSpec::scalar(ScalarKind::ObjectId).primary_key())
//!         .field("name", FieldSpec::scalar(ScalarKind::String)),
//! );
//!
//! let mut player = Instance::new(&schema);
//! player.set("name", "Kakashi");
//!
//! let conn = Connection::new("mongodb://localhost:27017/game").await?;
//! let players = Documents::new(conn.database(), registry.into(), schema);
//! players.insert(&mut player).await?;
//! ```

pub mod client;
pub mod codec;
pub mod connection;
pub mod instance;
pub mod ordering;
pub mod query;
pub mod save;
pub mod schema;
pub mod store;
pub mod value;

pub use client::{settings_to_cmd_args_env, ClientSettings, ClientSettingsOptions};
pub use connection::{Connection, PoolConfig};
pub use docbridge_common::{BridgeError, Result};
pub use instance::Instance;
pub use ordering::{NaturalOrder, OrderingPolicy};
pub use query::{Filter, Lookup, ModelQuery, StoreCapabilities};
pub use save::{prepare_save, prepare_update, SavePhase};
pub use schema::{ElementKind, FieldKind, FieldSpec, ModelSchema, ScalarKind, SchemaRegistry};
pub use store::{resolve_reference, Documents};
pub use value::Value;
