//! Blob storage for memo audio.

mod gcs;
mod local;

pub use gcs::{GcsObjectStore, ServiceAccount};
pub use local::LocalObjectStore;

use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage request failed: {0}")]
    Upstream(String),

    #[error("storage credentials: {0}")]
    Credentials(String),

    #[error("url is not managed by this store: {0}")]
    ForeignUrl(String),
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Stores `bytes` and returns the public URL of the new object.
    async fn put(
        &self,
        bytes: Bytes,
        path_hint: &str,
        content_type: &str,
        owner_id: &str,
    ) -> Result<String, StorageError>;

    /// Deletes an object by a URL previously returned from `put`.
    async fn delete(&self, url: &str) -> Result<(), StorageError>;
}

/// `memos/<owner>/<uuid><ext>`, where `<ext>` comes from the uploaded
/// filename.
pub fn object_key(owner_id: &str, path_hint: &str) -> String {
    format!(
        "memos/{}/{}{}",
        sanitize_segment(owner_id),
        Uuid::new_v4(),
        extension(path_hint)
    )
}

fn sanitize_segment(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if cleaned.is_empty() { "_".into() } else { cleaned }
}

fn extension(path_hint: &str) -> String {
    Path::new(path_hint)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| ext.len() <= 10 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| format!(".{}", ext.to_ascii_lowercase()))
        .unwrap_or_default()
}

/// Extracts the object key from a URL under `prefix`. Only keys this module
/// could have produced are accepted.
fn key_from_url<'a>(url: &'a str, prefix: &str) -> Result<&'a str, StorageError> {
    let key = url
        .strip_prefix(prefix)
        .ok_or_else(|| StorageError::ForeignUrl(url.to_string()))?;

    let valid = key.starts_with("memos/")
        && key
            .split('/')
            .all(|segment| !segment.is_empty() && segment != "." && segment != "..")
        && !key.contains('\\');
    if !valid {
        return Err(StorageError::ForeignUrl(url.to_string()));
    }
    Ok(key)
}
