//! File index: catalog of every artifact the bot stores.
//!
//! Payloads live in the storage root under generated names (`<uuid><ext>`),
//! never under the user-supplied name. The catalog itself is
//! `files_index.json`, rewritten in full after each append.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::StoreError;

const INDEX_FILE: &str = "files_index.json";

/// One stored artifact. Records are never changed once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    pub id: Uuid,
    pub display_name: String,
    pub storage_path: PathBuf,
    /// Extension including the dot, lowercased (".docx").
    #[serde(rename = "type")]
    pub file_type: String,
    pub created_at: DateTime<Utc>,
    /// Coarse category ("Reporte", "Grafica", "Montaje").
    pub tag: String,
    /// Record this artifact was derived from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<Uuid>,
}

/// Append-only index over the storage root.
pub struct FileIndex {
    root: PathBuf,
    records: RwLock<Vec<FileRecord>>,
}

impl FileIndex {
    /// Open (or create) the index under `root`. An index file that cannot be
    /// parsed is an error: silently starting over would orphan every payload.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;

        let path = root.join(INDEX_FILE);
        let records = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                serde_json::from_slice(&bytes).map_err(|e| StoreError::Corrupt {
                    path: path.clone(),
                    reason: e.to_string(),
                })?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        tracing::info!(root = %root.display(), records = records.len(), "File index opened");
        Ok(Self {
            root,
            records: RwLock::new(records),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// A fresh, unused payload path carrying `display_name`'s extension.
    pub fn allocate(&self, display_name: &str) -> PathBuf {
        self.root
            .join(format!("{}{}", Uuid::new_v4(), extension_of(display_name)))
    }

    /// Append a record for a payload already written at `path`.
    pub async fn register(
        &self,
        path: &Path,
        display_name: &str,
        tag: &str,
        parent_id: Option<Uuid>,
    ) -> Result<FileRecord, StoreError> {
        let record = FileRecord {
            id: Uuid::new_v4(),
            display_name: display_name.to_string(),
            storage_path: path.to_path_buf(),
            file_type: extension_of(display_name),
            created_at: Utc::now(),
            tag: tag.to_string(),
            parent_id,
        };

        let mut records = self.records.write().await;
        records.push(record.clone());
        if let Err(e) = self.persist(&records).await {
            records.pop();
            return Err(e);
        }
        drop(records);

        tracing::info!(
            id = %record.id,
            name = %record.display_name,
            tag = %record.tag,
            "Artifact registered"
        );
        Ok(record)
    }

    /// Store `bytes` as a new payload and index it.
    pub async fn record_bytes(
        &self,
        bytes: &[u8],
        display_name: &str,
        tag: &str,
    ) -> Result<FileRecord, StoreError> {
        let path = self.allocate(display_name);
        tokio::fs::write(&path, bytes).await?;
        self.register(&path, display_name, tag, None).await
    }

    /// All records in insertion order.
    pub async fn list(&self) -> Vec<FileRecord> {
        self.records.read().await.clone()
    }

    pub async fn find(&self, id: Uuid) -> Option<FileRecord> {
        self.records.read().await.iter().find(|r| r.id == id).cloned()
    }

    async fn persist(&self, records: &[FileRecord]) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(records)?;
        super::write_atomic(&self.root.join(INDEX_FILE), &json).await
    }
}

/// Lowercased extension with its leading dot, or empty.
fn extension_of(name: &str) -> String {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_lowercase()))
        .unwrap_or_default()
}
