//! Persistence layer: live sessions, chat rosters and the file index.

pub mod chat_config;
pub mod files;
pub mod sessions;

use std::path::Path;

use tokio::io::AsyncWriteExt;

pub use chat_config::{ConfigStore, InMemoryConfigStore, JsonConfigStore};
pub use files::{FileIndex, FileRecord};
pub use sessions::SessionStore;

use crate::error::StoreError;

/// Replace `path` with `bytes` via a sibling temp file and a rename, so
/// readers never see a half-written file.
pub(crate) async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = std::path::PathBuf::from(tmp);

    let mut file = tokio::fs::File::create(&tmp).await?;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    drop(file);

    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}
