use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use async_trait::async_trait;
use mongodb::{
    Client, Collection,
    bson::{doc, oid::ObjectId},
    options::ClientOptions,
};
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;

use crate::{bounded::bounded, cnfg::StoreConfig, error::StoreError};

/// The one document shape this service writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub name: String,
}

impl Record {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
        }
    }
}

/// Driver options applied when the connection is first opened.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectOptions {
    pub app_name: Option<String>,
    pub connect_timeout: Option<Duration>,
}

#[async_trait]
pub trait StoreConnector: Send + Sync {
    /// Resolves once the connection is open and usable.
    async fn connect(&self, options: &ConnectOptions) -> Result<Arc<dyn DocumentStore>>;
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert `record` and return the identifier the store assigned to it.
    async fn insert(&self, record: &Record) -> Result<ObjectId>;

    async fn close(&self) -> Result<()>;
}

/// Owns at most one store connection for the life of the server.
pub struct StoreManager {
    connector: Box<dyn StoreConnector>,
    timeout: Duration,
    connection: OnceCell<Arc<dyn DocumentStore>>,
}

impl StoreManager {
    pub fn new(connector: Box<dyn StoreConnector>, timeout: Duration) -> Self {
        Self {
            connector,
            timeout,
            connection: OnceCell::new(),
        }
    }

    /// Return the open connection, connecting first if needed.
    ///
    /// `options` only matter for the call that actually connects.
    pub async fn acquire(
        &self,
        options: &ConnectOptions,
        cancel: &CancellationToken,
    ) -> Result<Arc<dyn DocumentStore>, StoreError> {
        if let Some(connection) = self.connection.get() {
            tracing::debug!("document store connection already open");
            return Ok(Arc::clone(connection));
        }

        let connection = self
            .connection
            .get_or_try_init(|| async move {
                let connection = bounded(
                    cancel,
                    "store connect",
                    self.timeout,
                    self.connector.connect(options),
                )
                .await?
                .map_err(StoreError::Connection)?;

                tracing::info!(?options, "document store connection open");
                Ok::<_, StoreError>(connection)
            })
            .await?;

        Ok(Arc::clone(connection))
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn is_connected(&self) -> bool {
        self.connection.initialized()
    }

    pub async fn shutdown(&self) {
        let Some(connection) = self.connection.get() else {
            return;
        };

        match tokio::time::timeout(self.timeout, connection.close()).await {
            Ok(Ok(())) => tracing::info!("document store connection closed"),
            Ok(Err(e)) => tracing::warn!("failed to close document store connection: {:#}", e),
            Err(_) => tracing::warn!("timed out closing document store connection"),
        }
    }
}

/// Persist `record`, returning it with the store-assigned id.
///
/// An absent record is rejected with [`StoreError::InvalidInput`] before the
/// store is touched.
pub async fn save(
    store: &dyn DocumentStore,
    record: Option<Record>,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<Record, StoreError> {
    let mut record = record.ok_or(StoreError::InvalidInput("missing record"))?;

    let id = bounded(cancel, "store write", timeout, store.insert(&record))
        .await?
        .map_err(StoreError::Write)?;

    record.id = Some(id);
    Ok(record)
}

/// Connects to MongoDB with the official driver.
pub struct MongoConnector {
    uri: String,
    database: String,
    collection: String,
}

impl MongoConnector {
    pub fn new(config: &StoreConfig) -> Self {
        Self {
            uri: config.uri(),
            database: config.database.clone(),
            collection: config.collection.clone(),
        }
    }
}

#[async_trait]
impl StoreConnector for MongoConnector {
    async fn connect(&self, options: &ConnectOptions) -> Result<Arc<dyn DocumentStore>> {
        let mut client_options = ClientOptions::parse(&self.uri)
            .await
            .with_context(|| format!("parsing {}", self.uri))?;
        if let Some(app_name) = &options.app_name {
            client_options.app_name = Some(app_name.clone());
        }
        if let Some(connect_timeout) = options.connect_timeout {
            client_options.connect_timeout = Some(connect_timeout);
            client_options.server_selection_timeout = Some(connect_timeout);
        }

        let client = Client::with_options(client_options)?;
        let database = client.database(&self.database);

        // The driver connects lazily; a ping proves the server is reachable.
        database
            .run_command(doc! { "ping": 1 })
            .await
            .context("pinging document store")?;

        Ok(Arc::new(MongoStore {
            collection: database.collection(&self.collection),
            client,
        }))
    }
}

pub struct MongoStore {
    client: Client,
    collection: Collection<Record>,
}

#[async_trait]
impl DocumentStore for MongoStore {
    async fn insert(&self, record: &Record) -> Result<ObjectId> {
        let result = self.collection.insert_one(record).await?;
        result
            .inserted_id
            .as_object_id()
            .context("store assigned a non-ObjectId identifier")
    }

    async fn close(&self) -> Result<()> {
        self.client.clone().shutdown().await;
        Ok(())
    }
}
