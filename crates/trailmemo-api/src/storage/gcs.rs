use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{ObjectStore, StorageError, key_from_url, object_key};

const STORAGE_SCOPE: &str = "https://www.googleapis.com/auth/devstorage.read_write";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const PUBLIC_HOST: &str = "https://storage.googleapis.com";
const ASSERTION_LIFETIME_SECS: i64 = 3600;

/// Tokens are refreshed this long before Google says they expire.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// The fields of a Google service account key file that token minting needs.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccount {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl ServiceAccount {
    pub fn from_json(raw: &str) -> Result<Self, StorageError> {
        serde_json::from_str(raw)
            .map_err(|e| StorageError::Credentials(format!("invalid service account JSON: {}", e)))
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct AssertionClaims {
    iss: String,
    scope: String,
    aud: String,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

struct CachedToken {
    access_token: String,
    refresh_at: Instant,
}

/// Google Cloud Storage through the JSON API.
pub struct GcsObjectStore {
    bucket: String,
    account: ServiceAccount,
    signing_key: EncodingKey,
    http: reqwest::Client,
    token: Mutex<Option<CachedToken>>,
    url_prefix: String,
}

impl GcsObjectStore {
    pub fn new(
        bucket: impl Into<String>,
        account: ServiceAccount,
        http: reqwest::Client,
    ) -> Result<Self, StorageError> {
        let bucket = bucket.into();
        let signing_key = EncodingKey::from_rsa_pem(account.private_key.as_bytes())
            .map_err(|e| StorageError::Credentials(format!("invalid private key: {}", e)))?;

        info!("GCS object storage: bucket {} as {}", bucket, account.client_email);
        Ok(Self {
            url_prefix: format!("{}/{}/", PUBLIC_HOST, bucket),
            bucket,
            account,
            signing_key,
            http,
            token: Mutex::new(None),
        })
    }

    fn assertion(&self, issued_at: i64) -> Result<String, StorageError> {
        let claims = AssertionClaims {
            iss: self.account.client_email.clone(),
            scope: STORAGE_SCOPE.to_string(),
            aud: self.account.token_uri.clone(),
            iat: issued_at,
            exp: issued_at + ASSERTION_LIFETIME_SECS,
        };
        encode(&Header::new(Algorithm::RS256), &claims, &self.signing_key)
            .map_err(|e| StorageError::Credentials(format!("signing assertion: {}", e)))
    }

    async fn access_token(&self) -> Result<String, StorageError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.refresh_at {
                return Ok(token.access_token.clone());
            }
        }

        debug!("Requesting storage access token");
        let assertion = self.assertion(chrono::Utc::now().timestamp())?;
        let response = self
            .http
            .post(&self.account.token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await
            .map_err(|e| StorageError::Upstream(format!("token request: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::Credentials(format!(
                "token endpoint returned {}: {}",
                status, body
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| StorageError::Upstream(format!("token response: {}", e)))?;

        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(TOKEN_EXPIRY_MARGIN);
        *cached = Some(CachedToken {
            access_token: token.access_token.clone(),
            refresh_at: Instant::now() + lifetime,
        });
        Ok(token.access_token)
    }

    fn upload_url(&self) -> String {
        format!("{}/upload/storage/v1/b/{}/o", PUBLIC_HOST, self.bucket)
    }

    /// Object names go in a single path segment, so `/` is escaped.
    fn object_url(&self, key: &str) -> Result<Url, StorageError> {
        let mut url = Url::parse(PUBLIC_HOST)
            .map_err(|e| StorageError::Upstream(format!("storage url: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| StorageError::Upstream("storage url cannot be a base".into()))?
            .extend(["storage", "v1", "b", self.bucket.as_str(), "o", key]);
        Ok(url)
    }
}

#[async_trait]
impl ObjectStore for GcsObjectStore {
    async fn put(
        &self,
        bytes: Bytes,
        path_hint: &str,
        content_type: &str,
        owner_id: &str,
    ) -> Result<String, StorageError> {
        let key = object_key(owner_id, path_hint);
        let token = self.access_token().await?;
        let size = bytes.len();

        let response = self
            .http
            .post(self.upload_url())
            .query(&[("uploadType", "media"), ("name", key.as_str())])
            .bearer_auth(token)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await
            .map_err(|e| StorageError::Upstream(format!("upload: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::Upstream(format!("upload returned {}: {}", status, body)));
        }

        info!("Uploaded {} bytes to gs://{}/{}", size, self.bucket, key);
        Ok(format!("{}{}", self.url_prefix, key))
    }

    async fn delete(&self, url: &str) -> Result<(), StorageError> {
        let key = key_from_url(url, &self.url_prefix)?;
        let token = self.access_token().await?;

        let response = self
            .http
            .delete(self.object_url(key)?)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| StorageError::Upstream(format!("delete: {}", e)))?;

        match response.status() {
            status if status.is_success() => {
                info!("Deleted gs://{}/{}", self.bucket, key);
                Ok(())
            }
            StatusCode::NOT_FOUND => {
                warn!("Object gs://{}/{} already gone", self.bucket, key);
                Ok(())
            }
            status => Err(StorageError::Upstream(format!("delete returned {}", status))),
        }
    }
}
