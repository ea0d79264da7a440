mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use trailmemo_api::identity::{FirebaseVerifier, IdentityVerifier, SharedSecretVerifier};
use trailmemo_api::routes::build_router;
use trailmemo_api::state::{AppStateInner, Settings};
use trailmemo_api::storage::{GcsObjectStore, LocalObjectStore, ObjectStore, ServiceAccount};
use trailmemo_db::Database;

use config::{AuthConfig, Config, ServiceAccountSource, StorageConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "trailmemo=debug,trailmemo_api=debug,trailmemo_db=info,tower_http=debug".into()
            }),
        )
        .init();

    let config = Config::from_env()?;
    info!("Starting TrailMemo API ({} environment)", config.env);

    // Init database
    let db = Database::open(&config.database_path)
        .with_context(|| format!("opening database at {}", config.database_path.display()))?;

    let http = reqwest::Client::builder()
        .timeout(config.request_timeout)
        .build()
        .context("building HTTP client")?;

    let identity: Arc<dyn IdentityVerifier> = match &config.auth {
        AuthConfig::Firebase { project_id } => {
            info!("Verifying Firebase ID tokens for project {}", project_id);
            Arc::new(FirebaseVerifier::new(project_id.clone(), http.clone()))
        }
        AuthConfig::SharedSecret { secret } => {
            if config.env == "production" {
                warn!("Shared-secret tokens are enabled in production");
            }
            info!("Verifying shared-secret tokens");
            Arc::new(SharedSecretVerifier::new(secret))
        }
    };

    let mut media_dir = None;
    let objects: Arc<dyn ObjectStore> = match &config.storage {
        StorageConfig::Gcs {
            bucket,
            service_account,
        } => {
            let raw = match service_account {
                ServiceAccountSource::Json(json) => json.clone(),
                ServiceAccountSource::Path(path) => tokio::fs::read_to_string(path)
                    .await
                    .with_context(|| format!("reading service account {}", path.display()))?,
            };
            let account = ServiceAccount::from_json(&raw)?;
            Arc::new(GcsObjectStore::new(bucket.clone(), account, http.clone())?)
        }
        StorageConfig::Local {
            dir,
            public_base_url,
        } => {
            media_dir = Some(dir.clone());
            Arc::new(LocalObjectStore::new(dir.clone(), public_base_url).await?)
        }
    };

    // Shared state
    let state = Arc::new(AppStateInner {
        db,
        identity,
        objects,
        settings: Settings {
            max_upload_size: config.max_upload_size,
            request_timeout: config.request_timeout,
            media_dir,
        },
    });

    let app = build_router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("TrailMemo API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
