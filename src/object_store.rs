use async_trait::async_trait;
use tokio::fs;

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use crate::internal_error::{InternalError, InternalResult};

pub fn backup_key(user_id: &str, timestamp: &str) -> String {
    format!("{}/backup/{}.json", user_id, timestamp)
}

pub fn backup_prefix(user_id: &str) -> String {
    format!("{}/backup/", user_id)
}

pub fn attachment_key(user_id: &str, item_id: &str, file_name: &str) -> String {
    format!("uploads/{}/{}/{}", user_id, item_id, file_name)
}

/// Blob storage for backups and attachments, addressed by `/`-separated keys.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, body: &[u8]) -> InternalResult<()>;

    async fn get(&self, key: &str) -> InternalResult<Option<Vec<u8>>>;

    /// Names of the objects directly under `prefix`.
    async fn list(&self, prefix: &str) -> InternalResult<Vec<String>>;

    async fn delete(&self, key: &str) -> InternalResult<()>;
}

pub type SharedObjectStore = Arc<dyn ObjectStore>;

pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> InternalResult<FsObjectStore> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(FsObjectStore { root })
    }

    /// Maps a key into the root, refusing anything that could climb out of it.
    fn resolve(&self, key: &str) -> InternalResult<PathBuf> {
        let relative = Path::new(key.trim_end_matches('/'));
        let only_plain_segments = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));

        if key.is_empty() || key.contains('\\') || !only_plain_segments {
            return Err(InternalError::from(format!("invalid object key {}", key)));
        }

        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn put(&self, key: &str, body: &[u8]) -> InternalResult<()> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, body).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> InternalResult<Option<Vec<u8>>> {
        let path = self.resolve(key)?;
        match fs::read(&path).await {
            Ok(body) => Ok(Some(body)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self, prefix: &str) -> InternalResult<Vec<String>> {
        let path = self.resolve(prefix)?;
        let mut entries = match fs::read_dir(&path).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(e.into()),
        };

        let mut names = vec![];
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                names.push(entry.file_name().to_string_lossy().to_string());
            }
        }
        names.sort();

        Ok(names)
    }

    async fn delete(&self, key: &str) -> InternalResult<()> {
        let path = self.resolve(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
