//! Object storage for uploaded files.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

/// URL prefix stored objects are served under.
pub const FILES_ROUTE: &str = "/files";

/// Errors from the object store.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The key would escape the store root.
    #[error("Invalid object key: {0}")]
    InvalidKey(String),

    /// Filesystem failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    /// Key inside the store.
    pub key: String,
    /// Public URL of the object.
    pub url: String,
}

/// Somewhere to put uploaded bytes.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `bytes` under `key`, replacing any existing object.
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<StoredObject, StorageError>;

    /// Remove the object at `key`. Missing objects are not an error.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// Remove every object under `prefix`. A missing prefix is not an error.
    async fn delete_prefix(&self, prefix: &str) -> Result<(), StorageError>;
}

/// Key prefix holding all of a user's uploads.
pub fn user_prefix(user_id: &str) -> String {
    user_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}

/// Build a unique key for a user's upload: `{user_id}/{uuid}-{file_name}`.
pub fn object_key(user_id: &str, file_name: &str) -> String {
    format!(
        "{}/{}-{}",
        user_prefix(user_id),
        Uuid::new_v4(),
        sanitize_file_name(file_name)
    )
}

/// Keep a file name to ASCII letters, digits, `.`, `-` and `_`.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);

    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .take(100)
        .collect();

    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Filesystem-backed store; objects are served by the router under
/// [`FILES_ROUTE`].
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
    base_url: String,
}

impl LocalStore {
    /// Create the store, creating `root` if needed.
    pub async fn new(root: impl Into<PathBuf>, public_url: &str) -> Result<Self, StorageError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        info!(root = %root.display(), "Using local object store");

        Ok(Self {
            root,
            base_url: format!("{}{}", public_url.trim_end_matches('/'), FILES_ROUTE),
        })
    }

    /// Directory objects are written to.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(key);
        let is_plain = !key.is_empty()
            && relative
                .components()
                .all(|component| matches!(component, Component::Normal(_)));

        if !is_plain {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectStore for LocalStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<StoredObject, StorageError> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;

        debug!(key, size = bytes.len(), "Stored object");
        Ok(StoredObject {
            key: key.to_string(),
            url: format!("{}/{}", self.base_url, key),
        })
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!(key, "Deleted object");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<(), StorageError> {
        let path = self.path_for(prefix)?;
        match tokio::fs::remove_dir_all(&path).await {
            Ok(()) => {
                debug!(prefix, "Deleted objects under prefix");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
