use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, bail};

const PLACEHOLDER_SECRETS: &[&str] = &[
    "dev-secret-change-me",
    "change-me",
    "changeme",
    "secret",
    "your-secret-key",
];

const MIN_SECRET_LEN: usize = 16;

#[derive(Debug, Clone, PartialEq)]
pub enum AuthConfig {
    Firebase { project_id: String },
    SharedSecret { secret: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ServiceAccountSource {
    Path(PathBuf),
    Json(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum StorageConfig {
    Gcs {
        bucket: String,
        service_account: ServiceAccountSource,
    },
    Local {
        dir: PathBuf,
        public_base_url: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub env: String,
    pub database_path: PathBuf,
    pub max_upload_size: usize,
    pub request_timeout: Duration,
    pub auth: AuthConfig,
    pub storage: StorageConfig,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let port: u16 = match get("PORT") {
            Some(raw) => raw.parse().with_context(|| format!("PORT must be a port number, got '{}'", raw))?,
            None => 8080,
        };
        let max_upload_size: usize = match get("MAX_UPLOAD_SIZE") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("MAX_UPLOAD_SIZE must be a byte count, got '{}'", raw))?,
            None => 50 * 1024 * 1024,
        };
        let timeout_secs: u64 = match get("REQUEST_TIMEOUT_SECS") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("REQUEST_TIMEOUT_SECS must be whole seconds, got '{}'", raw))?,
            None => 30,
        };
        if timeout_secs == 0 {
            bail!("REQUEST_TIMEOUT_SECS must be greater than zero");
        }

        let auth = match get("AUTH_PROVIDER").as_deref().unwrap_or("firebase") {
            "firebase" => AuthConfig::Firebase {
                project_id: get("FIREBASE_PROJECT_ID")
                    .context("FIREBASE_PROJECT_ID is required when AUTH_PROVIDER=firebase")?,
            },
            "jwt" => {
                let secret = get("JWT_SECRET").context("JWT_SECRET is required when AUTH_PROVIDER=jwt")?;
                check_secret(&secret)?;
                AuthConfig::SharedSecret { secret }
            }
            other => bail!("AUTH_PROVIDER must be 'firebase' or 'jwt', got '{}'", other),
        };

        let storage = match get("STORAGE_BACKEND").as_deref().unwrap_or("local") {
            "gcs" => {
                let bucket = get("FIREBASE_STORAGE_BUCKET")
                    .context("FIREBASE_STORAGE_BUCKET is required when STORAGE_BACKEND=gcs")?;
                let service_account = match (
                    get("FIREBASE_SERVICE_ACCOUNT_JSON"),
                    get("FIREBASE_SERVICE_ACCOUNT_PATH"),
                ) {
                    (Some(json), _) => ServiceAccountSource::Json(json),
                    (None, Some(path)) => ServiceAccountSource::Path(PathBuf::from(path)),
                    (None, None) => bail!(
                        "FIREBASE_SERVICE_ACCOUNT_JSON or FIREBASE_SERVICE_ACCOUNT_PATH is required when STORAGE_BACKEND=gcs"
                    ),
                };
                StorageConfig::Gcs {
                    bucket,
                    service_account,
                }
            }
            "local" => StorageConfig::Local {
                dir: PathBuf::from(get("STORAGE_DIR").unwrap_or_else(|| "./media".into())),
                public_base_url: get("PUBLIC_BASE_URL")
                    .unwrap_or_else(|| format!("http://localhost:{}", port)),
            },
            other => bail!("STORAGE_BACKEND must be 'gcs' or 'local', got '{}'", other),
        };

        Ok(Self {
            host: get("HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            env: get("ENV").unwrap_or_else(|| "development".into()),
            database_path: PathBuf::from(get("DATABASE_PATH").unwrap_or_else(|| "trailmemo.db".into())),
            max_upload_size,
            request_timeout: Duration::from_secs(timeout_secs),
            auth,
            storage,
        })
    }
}

fn check_secret(secret: &str) -> anyhow::Result<()> {
    if PLACEHOLDER_SECRETS.contains(&secret.to_ascii_lowercase().as_str()) {
        bail!("JWT_SECRET is a placeholder value; set a real secret");
    }
    if secret.len() < MIN_SECRET_LEN {
        bail!("JWT_SECRET must be at least {} characters", MIN_SECRET_LEN);
    }
    Ok(())
}
