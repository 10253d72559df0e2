//! MongoDB connection management with pool configuration and health checking

use bson::{doc, Document as BsonDocument};
use docbridge_common::{BridgeError, Result};
use mongodb::{
    options::{ClientOptions as DriverOptions, ServerApi, ServerApiVersion},
    Client, Collection, Database,
};
use std::time::Duration;
use tracing::info;

use crate::client::ClientSettings;

/// Connection pool configuration
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Connections kept warm in the pool
    pub min_pool_size: Option<u32>,
    /// Upper bound on pooled connections
    pub max_pool_size: Option<u32>,
    /// Idle time after which a pooled connection is closed
    pub max_idle_time: Option<Duration>,
    /// Connection establishment timeout
    pub connect_timeout: Option<Duration>,
    /// Server selection timeout
    pub server_selection_timeout: Option<Duration>,
    /// Application name reported in server logs
    pub app_name: Option<String>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_pool_size: Some(2),
            max_pool_size: Some(10),
            max_idle_time: None,
            connect_timeout: Some(Duration::from_secs(10)),
            server_selection_timeout: Some(Duration::from_secs(30)),
            app_name: Some("docbridge".to_string()),
        }
    }
}

/// Pooled MongoDB connection bound to one database.
pub struct Connection {
    client: Client,
    database: Database,
    database_name: String,
}

impl Connection {
    /// Connect with default pool settings.
    pub async fn new(connection_string: &str) -> Result<Self> {
        Self::with_config(connection_string, PoolConfig::default()).await
    }

    /// Connect using connection settings (the same mapping the shell client
    /// consumes).
    pub async fn from_settings(settings: &ClientSettings) -> Result<Self> {
        Self::new(&settings.connection_string()?).await
    }

    /// Connect with custom pool configuration.
    pub async fn with_config(connection_string: &str, config: PoolConfig) -> Result<Self> {
        let mut options = DriverOptions::parse(connection_string)
            .await
            .map_err(|e| BridgeError::Connection(format!("invalid connection string: {e}")))?;

        if let Some(min) = config.min_pool_size {
            options.min_pool_size = Some(min);
        }
        if let Some(max) = config.max_pool_size {
            options.max_pool_size = Some(max);
        }
        if let Some(idle) = config.max_idle_time {
            options.max_idle_time = Some(idle);
        }
        if let Some(connect) = config.connect_timeout {
            options.connect_timeout = Some(connect);
        }
        if let Some(selection) = config.server_selection_timeout {
            options.server_selection_timeout = Some(selection);
        }
        if let Some(app) = config.app_name {
            options.app_name = Some(app);
        }

        // Pin the stable server API so behavior doesn't drift across server
        // upgrades.
        options.server_api = Some(ServerApi::builder().version(ServerApiVersion::V1).build());

        let client = Client::with_options(options)
            .map_err(|e| BridgeError::Connection(format!("client construction failed: {e}")))?;

        let database = client.default_database().ok_or_else(|| {
            BridgeError::Connection(
                "no default database specified in connection string".to_string(),
            )
        })?;
        let database_name = database.name().to_string();
        info!(database = database_name.as_str(), "connected");

        Ok(Self {
            client,
            database,
            database_name,
        })
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn database_name(&self) -> &str {
        &self.database_name
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Untyped collection handle by name.
    pub fn collection(&self, name: &str) -> Collection<BsonDocument> {
        self.database.collection(name)
    }

    /// Switch to a different database on the same client.
    pub fn use_database(&self, name: &str) -> Database {
        self.client.database(name)
    }

    /// Ping the server to verify the connection is healthy.
    pub async fn ping(&self) -> Result<()> {
        self.database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| BridgeError::Connection(format!("ping failed: {e}")))?;
        Ok(())
    }

    pub async fn list_collection_names(&self) -> Result<Vec<String>> {
        self.database
            .list_collection_names()
            .await
            .map_err(|e| BridgeError::store_with("listing collections failed", e))
    }

    /// Drop the bound database. Destructive; intended for test teardown.
    pub async fn drop_database(&self) -> Result<()> {
        self.database
            .drop()
            .await
            .map_err(|e| BridgeError::store_with("dropping database failed", e))
    }
}
