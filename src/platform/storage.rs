use async_trait::async_trait;
use log::{debug, info, warn};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::sync::RwLock;

use crate::error::{IntegrationError, Result};

/// Key/value storage with a separate namespace for secrets.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    async fn set(&self, key: &str, value: Value) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;

    async fn get_secret(&self, key: &str) -> Result<Option<String>>;

    async fn set_secret(&self, key: &str, value: &str) -> Result<()>;

    async fn delete_secret(&self, key: &str) -> Result<()>;

    /// Every plain entry whose key starts with `prefix`, ordered by key.
    async fn query_prefix(&self, prefix: &str) -> Result<Vec<(String, Value)>>;
}

/// Typed helpers over the raw JSON values.
pub async fn get_as<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Result<Option<T>> {
    store
        .get(key)
        .await?
        .map(serde_json::from_value)
        .transpose()
        .map_err(Into::into)
}

pub async fn set_as<T: Serialize + Sync>(store: &dyn KeyValueStore, key: &str, value: &T) -> Result<()> {
    store.set(key, serde_json::to_value(value)?).await
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoreData {
    #[serde(default)]
    entries: BTreeMap<String, Value>,
    #[serde(default)]
    secrets: BTreeMap<String, String>,
}

/// Store kept in memory and, when a path is given, mirrored to a JSON file
/// after every write.
pub struct LocalStore {
    path: Option<PathBuf>,
    data: RwLock<StoreData>,
}

impl LocalStore {
    pub fn in_memory() -> Self {
        Self {
            path: None,
            data: RwLock::new(StoreData::default()),
        }
    }

    /// Opens the store file, creating its directory. A missing file starts an
    /// empty store; an unreadable one is an error rather than silently reset.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the file is not
    /// valid store JSON.
    pub async fn open(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let data = match tokio::fs::read_to_string(&path).await {
            Ok(content) => {
                let data: StoreData = serde_json::from_str(&content).map_err(|e| {
                    IntegrationError::Storage(format!("Corrupt store file {}: {e}", path.display()))
                })?;
                debug!(
                    "Loaded {} entries and {} secrets from {}",
                    data.entries.len(),
                    data.secrets.len(),
                    path.display()
                );
                data
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StoreData::default(),
            Err(e) => return Err(e.into()),
        };

        info!("Key/value store at: {}", path.display());

        Ok(Self {
            path: Some(path),
            data: RwLock::new(data),
        })
    }

    /// Apply `change` and mirror the result to disk. Memory only takes the
    /// new state once the file write succeeded. `change` returns whether
    /// anything changed.
    async fn update<F>(&self, change: F) -> Result<()>
    where
        F: FnOnce(&mut StoreData) -> bool + Send,
    {
        let mut data = self.data.write().await;
        if self.path.is_none() {
            change(&mut data);
            return Ok(());
        }

        let mut next = data.clone();
        if change(&mut next) {
            self.persist(&next).await?;
            *data = next;
        }
        Ok(())
    }

    async fn persist(&self, data: &StoreData) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let content = serde_json::to_vec_pretty(data)?;
        tokio::fs::write(path, content).await.map_err(|e| {
            warn!("Failed to write store file {}: {e}", path.display());
            IntegrationError::from(e)
        })
    }
}

#[async_trait]
impl KeyValueStore for LocalStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.data.read().await.entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        self.update(|data| {
            data.entries.insert(key.to_string(), value);
            true
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.update(|data| data.entries.remove(key).is_some()).await
    }

    async fn get_secret(&self, key: &str) -> Result<Option<String>> {
        Ok(self.data.read().await.secrets.get(key).cloned())
    }

    async fn set_secret(&self, key: &str, value: &str) -> Result<()> {
        self.update(|data| {
            data.secrets.insert(key.to_string(), value.to_string());
            true
        })
        .await
    }

    async fn delete_secret(&self, key: &str) -> Result<()> {
        self.update(|data| data.secrets.remove(key).is_some()).await
    }

    async fn query_prefix(&self, prefix: &str) -> Result<Vec<(String, Value)>> {
        let data = self.data.read().await;
        Ok(data
            .entries
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }
}
