//! Runtime properties recorded for an agent

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::config::AgentConfig;
use crate::error::CoreError;

/// Property holding the agent record after `create`
pub const RUNTIME_PROPERTY: &str = "worker_agent";

/// What `create` records about an installed agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRecord {
    /// Configuration with defaults resolved
    #[serde(flatten)]
    pub config: AgentConfig,
    pub created_at: DateTime<Utc>,
}

/// Key-value store for runtime properties of one agent
#[async_trait]
pub trait RuntimeStore: Send + Sync {
    /// Read a property
    async fn get(&self, key: &str) -> Result<Option<Value>, CoreError>;

    /// Write a property, replacing any previous value
    async fn set(&self, key: &str, value: Value) -> Result<(), CoreError>;

    /// Remove a property, returning the old value
    async fn remove(&self, key: &str) -> Result<Option<Value>, CoreError>;
}

/// In-memory store, lost when the process exits
#[derive(Debug, Default)]
pub struct MemoryStore {
    props: RwLock<Map<String, Value>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RuntimeStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, CoreError> {
        Ok(self.props.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), CoreError> {
        self.props.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<Option<Value>, CoreError> {
        Ok(self.props.write().await.remove(key))
    }
}

/// Store backed by one JSON object file per agent
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    /// Serializes read-modify-write cycles
    lock: Mutex<()>,
}

impl JsonFileStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Store for agent `name` under `state_dir`
    #[must_use]
    pub fn for_agent(state_dir: &Path, name: &str) -> Self {
        Self::new(state_dir.join(format!("{name}.json")))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<Map<String, Value>, CoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                CoreError::Store(format!("invalid state file {}: {e}", self.path.display()))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Map::new()),
            Err(e) => Err(CoreError::Store(format!(
                "failed to read {}: {e}",
                self.path.display()
            ))),
        }
    }

    async fn save(&self, props: &Map<String, Value>) -> Result<(), CoreError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                CoreError::Store(format!("failed to create {}: {e}", parent.display()))
            })?;
        }

        let json = serde_json::to_vec_pretty(props)
            .map_err(|e| CoreError::Store(format!("failed to encode state: {e}")))?;

        // atomic replace
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| CoreError::Store(format!("failed to write {}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(|e| {
            CoreError::Store(format!("failed to write {}: {e}", self.path.display()))
        })?;

        debug!(path = %self.path.display(), "saved runtime properties");
        Ok(())
    }
}

#[async_trait]
impl RuntimeStore for JsonFileStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, CoreError> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.remove(key))
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), CoreError> {
        let _guard = self.lock.lock().await;
        let mut props = self.load().await?;
        props.insert(key.to_string(), value);
        self.save(&props).await
    }

    async fn remove(&self, key: &str) -> Result<Option<Value>, CoreError> {
        let _guard = self.lock.lock().await;
        let mut props = self.load().await?;
        let old = props.remove(key);
        if old.is_some() {
            self.save(&props).await?;
        }
        Ok(old)
    }
}
