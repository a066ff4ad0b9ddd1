//! Persisted shared state read by result consumers.
//!
//! Three keys are shared: `currentSearchTerm`, `searchResults` (null while
//! a search is pending) and `storeSettings`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::config::StorageConfig;
use crate::models::{SearchSettings, StoreResult};
use crate::utils::error::Result;

pub const CURRENT_SEARCH_TERM: &str = "currentSearchTerm";
pub const SEARCH_RESULTS: &str = "searchResults";
pub const STORE_SETTINGS: &str = "storeSettings";

/// Key/value persistence of JSON documents.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn put(&self, key: &str, value: &Value) -> Result<()>;
    async fn get(&self, key: &str) -> Result<Option<Value>>;
}

pub struct SqliteStateStore {
    pool: SqlitePool,
}

impl SqliteStateStore {
    pub async fn connect(config: &StorageConfig) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&config.url)?.create_if_missing(true);

        // Every in-memory connection would otherwise get its own database.
        let in_memory = config.url.contains(":memory:");
        if !in_memory {
            let filename = options.clone().get_filename();
            if let Some(parent) = filename.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
        }
        let max_connections = if in_memory { 1 } else { config.max_connections };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        tracing::info!("Shared state store ready at {}", config.url);
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS shared_state ( \
                 key        TEXT PRIMARY KEY, \
                 value      TEXT NOT NULL, \
                 updated_at TEXT NOT NULL \
             )",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl StateStore for SqliteStateStore {
    async fn put(&self, key: &str, value: &Value) -> Result<()> {
        sqlx::query(
            "INSERT INTO shared_state (key, value, updated_at) \
             VALUES (?, ?, ?) \
             ON CONFLICT (key) DO UPDATE SET \
                 value      = excluded.value, \
                 updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(serde_json::to_string(value)?)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let raw = sqlx::query_scalar::<_, String>("SELECT value FROM shared_state WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        match raw {
            Some(text) => Ok(Some(serde_json::from_str(&text)?)),
            None => Ok(None),
        }
    }
}

#[derive(Default)]
pub struct MemoryStateStore {
    values: RwLock<HashMap<String, Value>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn put(&self, key: &str, value: &Value) -> Result<()> {
        self.values.write().await.insert(key.to_string(), value.clone());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.values.read().await.get(key).cloned())
    }
}

/// Everything a consumer can see, as served by `GET /api/results`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StateSnapshot {
    pub current_search_term: Option<String>,
    pub search_results: Option<Vec<StoreResult>>,
    pub store_settings: Option<SearchSettings>,
}

/// Typed access to the shared keys.
#[derive(Clone)]
pub struct SharedState {
    store: Arc<dyn StateStore>,
}

impl SharedState {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStateStore::new()))
    }

    /// Records a new term and settings and marks results as pending.
    pub async fn begin_search(&self, term: &str, settings: &SearchSettings) -> Result<()> {
        self.store.put(CURRENT_SEARCH_TERM, &Value::String(term.to_string())).await?;
        self.store.put(SEARCH_RESULTS, &Value::Null).await?;
        self.store.put(STORE_SETTINGS, &serde_json::to_value(settings)?).await
    }

    pub async fn publish_results(&self, results: &[StoreResult]) -> Result<()> {
        self.store.put(SEARCH_RESULTS, &serde_json::to_value(results)?).await
    }

    /// `None` while the current search is still pending.
    pub async fn current_results(&self) -> Result<Option<Vec<StoreResult>>> {
        self.read(SEARCH_RESULTS).await
    }

    pub async fn current_term(&self) -> Result<Option<String>> {
        self.read(CURRENT_SEARCH_TERM).await
    }

    pub async fn store_settings(&self) -> Result<Option<SearchSettings>> {
        self.read(STORE_SETTINGS).await
    }

    pub async fn snapshot(&self) -> Result<StateSnapshot> {
        Ok(StateSnapshot {
            current_search_term: self.current_term().await?,
            search_results: self.current_results().await?,
            store_settings: self.store_settings().await?,
        })
    }

    async fn read<T: serde::de::DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.store.get(key).await? {
            None | Some(Value::Null) => Ok(None),
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
        }
    }
}
