use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs;
use tracing::{debug, info, warn};

use super::{ObjectStore, StorageError, key_from_url, object_key};

/// Stores blobs under a local directory. Objects are served back by the
/// `/media` route, so URLs are `<base_url>/media/<key>`.
pub struct LocalObjectStore {
    root: PathBuf,
    url_prefix: String,
}

impl LocalObjectStore {
    pub async fn new(root: PathBuf, public_base_url: &str) -> Result<Self, StorageError> {
        fs::create_dir_all(&root).await?;
        info!("Local object storage directory: {}", root.display());
        Ok(Self {
            root,
            url_prefix: format!("{}/media/", public_base_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn put(
        &self,
        bytes: Bytes,
        path_hint: &str,
        _content_type: &str,
        owner_id: &str,
    ) -> Result<String, StorageError> {
        let key = object_key(owner_id, path_hint);
        let path = self.root.join(&key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, &bytes).await?;

        debug!("Stored {} bytes at {}", bytes.len(), path.display());
        Ok(format!("{}{}", self.url_prefix, key))
    }

    async fn delete(&self, url: &str) -> Result<(), StorageError> {
        let key = key_from_url(url, &self.url_prefix)?;
        let path = self.root.join(key);
        match fs::remove_file(&path).await {
            Ok(()) => {
                info!("Deleted object {}", key);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Object {} already gone", key);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path().to_path_buf(), "http://localhost:8080/")
            .await
            .unwrap();

        let url = store
            .put(Bytes::from_static(b"audio"), "memo.m4a", "audio/mp4", "u1")
            .await
            .unwrap();
        assert!(url.starts_with("http://localhost:8080/media/memos/u1/"));
        assert!(url.ends_with(".m4a"));

        let key = url.strip_prefix("http://localhost:8080/media/").unwrap();
        let on_disk = dir.path().join(key);
        assert_eq!(fs::read(&on_disk).await.unwrap(), b"audio");

        store.delete(&url).await.unwrap();
        assert!(!on_disk.exists());

        // Second delete is a no-op.
        store.delete(&url).await.unwrap();
    }

    #[tokio::test]
    async fn delete_rejects_foreign_urls() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path().to_path_buf(), "http://localhost:8080")
            .await
            .unwrap();

        for url in [
            "https://placeholder.com/audio.m4a",
            "http://localhost:8080/media/../trailmemo.db",
            "http://localhost:8080/media/memos/../../trailmemo.db",
        ] {
            assert!(matches!(store.delete(url).await, Err(StorageError::ForeignUrl(_))));
        }
    }
}
