//! Per-chat roster storage.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};

use crate::conversation::{ChatConfig, ChatId};
use crate::error::StoreError;

/// Default group and members per chat.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// The chat's roster, if one was saved.
    async fn get(&self, chat_id: ChatId) -> Result<Option<ChatConfig>, StoreError>;

    /// Insert or replace the chat's roster.
    async fn put(&self, config: ChatConfig) -> Result<(), StoreError>;
}

/// Rosters kept as a JSON array in one file.
///
/// The file is re-read on every lookup so hand edits take effect without a
/// restart. A file that fails to parse reads as empty, but is never
/// overwritten: `put` reports it as corrupt instead.
pub struct JsonConfigStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<Vec<ChatConfig>, StoreError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        serde_json::from_slice(&bytes).map_err(|e| StoreError::Corrupt {
            path: self.path.clone(),
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl ConfigStore for JsonConfigStore {
    async fn get(&self, chat_id: ChatId) -> Result<Option<ChatConfig>, StoreError> {
        let configs = match self.load().await {
            Ok(configs) => configs,
            Err(StoreError::Corrupt { path, reason }) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %reason,
                    "Chat config file is unreadable, treating as empty"
                );
                Vec::new()
            }
            Err(e) => return Err(e),
        };
        Ok(configs.into_iter().find(|c| c.chat_id == chat_id))
    }

    async fn put(&self, config: ChatConfig) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;

        let mut configs = self.load().await?;
        match configs.iter_mut().find(|c| c.chat_id == config.chat_id) {
            Some(existing) => *existing = config,
            None => configs.push(config),
        }

        let json = serde_json::to_vec_pretty(&configs)?;
        super::write_atomic(&self.path, &json).await?;
        tracing::debug!(path = %self.path.display(), count = configs.len(), "Chat configs saved");
        Ok(())
    }
}

/// Rosters held in memory only.
#[derive(Default)]
pub struct InMemoryConfigStore {
    configs: RwLock<HashMap<ChatId, ChatConfig>>,
}

impl InMemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConfigStore for InMemoryConfigStore {
    async fn get(&self, chat_id: ChatId) -> Result<Option<ChatConfig>, StoreError> {
        Ok(self.configs.read().await.get(&chat_id).cloned())
    }

    async fn put(&self, config: ChatConfig) -> Result<(), StoreError> {
        self.configs.write().await.insert(config.chat_id, config);
        Ok(())
    }
}
