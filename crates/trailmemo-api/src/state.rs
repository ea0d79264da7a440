use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::error;

use trailmemo_db::{Database, StoreError};

use crate::error::ApiError;
use crate::identity::IdentityVerifier;
use crate::storage::ObjectStore;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub identity: Arc<dyn IdentityVerifier>,
    pub objects: Arc<dyn ObjectStore>,
    pub settings: Settings,
}

#[derive(Debug, Clone)]
pub struct Settings {
    /// Largest accepted request body (and audio part), in bytes.
    pub max_upload_size: usize,
    pub request_timeout: Duration,
    /// Served at `/media` when set, for the local object store.
    pub media_dir: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_upload_size: 50 * 1024 * 1024,
            request_timeout: Duration::from_secs(30),
            media_dir: None,
        }
    }
}

impl AppStateInner {
    /// Runs a blocking store call off the async runtime.
    pub async fn run_db<F, T>(self: &Arc<Self>, f: F) -> Result<T, ApiError>
    where
        F: FnOnce(&Database) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let state = Arc::clone(self);
        tokio::task::spawn_blocking(move || f(&state.db))
            .await
            .map_err(|e| {
                error!("spawn_blocking join error: {}", e);
                ApiError::Persistence
            })?
            .map_err(ApiError::from)
    }
}
