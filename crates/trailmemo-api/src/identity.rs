//! Bearer token verification.
//!
//! Production tokens are Firebase ID tokens, checked offline against Google's
//! published signing keys. Development and tests use HS256 tokens signed with
//! a shared secret.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header, jwk::JwkSet};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

const GOOGLE_JWKS_URL: &str =
    "https://www.googleapis.com/service_accounts/v1/jwk/securetoken@system.gserviceaccount.com";

const KEY_CACHE_TTL: Duration = Duration::from_secs(60 * 60);

/// Minimum age of the cached key set before an unknown `kid` forces a refetch.
const KEY_REFRESH_COOLDOWN: Duration = Duration::from_secs(60);

/// The authenticated principal behind a request.
#[derive(Debug, Clone, PartialEq)]
pub struct Identity {
    pub subject: String,
    pub email: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("signing key fetch failed: {0}")]
    KeyFetch(String),
}

#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<Identity, AuthError>;
}

fn invalid(err: jsonwebtoken::errors::Error) -> AuthError {
    AuthError::InvalidToken(err.to_string())
}

fn require_subject(sub: String, email: Option<String>) -> Result<Identity, AuthError> {
    if sub.trim().is_empty() {
        return Err(AuthError::InvalidToken("empty subject".into()));
    }
    Ok(Identity {
        subject: sub,
        email,
    })
}

// -- Shared secret --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedSecretClaims {
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub exp: usize,
}

pub struct SharedSecretVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl SharedSecretVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }
}

#[async_trait]
impl IdentityVerifier for SharedSecretVerifier {
    async fn verify(&self, token: &str) -> Result<Identity, AuthError> {
        let data = decode::<SharedSecretClaims>(token, &self.key, &self.validation).map_err(invalid)?;
        require_subject(data.claims.sub, data.claims.email)
    }
}

// -- Firebase --

#[derive(Debug, Deserialize)]
struct FirebaseClaims {
    sub: String,
    #[serde(default)]
    email: Option<String>,
}

struct CachedKeys {
    set: JwkSet,
    fetched_at: Instant,
}

pub struct FirebaseVerifier {
    project_id: String,
    http: reqwest::Client,
    keys: RwLock<Option<CachedKeys>>,
}

impl FirebaseVerifier {
    pub fn new(project_id: impl Into<String>, http: reqwest::Client) -> Self {
        Self {
            project_id: project_id.into(),
            http,
            keys: RwLock::new(None),
        }
    }

    /// Starts with a known key set instead of fetching one on first use.
    pub fn with_keys(project_id: impl Into<String>, http: reqwest::Client, set: JwkSet) -> Self {
        Self {
            project_id: project_id.into(),
            http,
            keys: RwLock::new(Some(CachedKeys {
                set,
                fetched_at: Instant::now(),
            })),
        }
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[&self.project_id]);
        validation.set_issuer(&[format!("https://securetoken.google.com/{}", self.project_id)]);
        validation.set_required_spec_claims(&["exp", "aud", "iss", "sub"]);
        validation
    }

    async fn decoding_key(&self, kid: &str) -> Result<DecodingKey, AuthError> {
        {
            let cached = self.keys.read().await;
            if let Some(cached) = cached.as_ref() {
                let age = cached.fetched_at.elapsed();
                if age < KEY_CACHE_TTL {
                    if let Some(jwk) = cached.set.find(kid) {
                        return DecodingKey::from_jwk(jwk).map_err(invalid);
                    }
                    if age < KEY_REFRESH_COOLDOWN {
                        return Err(AuthError::InvalidToken(format!("unknown signing key '{}'", kid)));
                    }
                }
            }
        }

        let set = self.fetch_keys().await?;
        let key = match set.find(kid) {
            Some(jwk) => DecodingKey::from_jwk(jwk).map_err(invalid),
            None => Err(AuthError::InvalidToken(format!("unknown signing key '{}'", kid))),
        };

        *self.keys.write().await = Some(CachedKeys {
            set,
            fetched_at: Instant::now(),
        });
        key
    }

    async fn fetch_keys(&self) -> Result<JwkSet, AuthError> {
        debug!("Fetching Firebase signing keys");
        let response = self
            .http
            .get(GOOGLE_JWKS_URL)
            .send()
            .await
            .map_err(|e| AuthError::KeyFetch(e.to_string()))?
            .error_for_status()
            .map_err(|e| AuthError::KeyFetch(e.to_string()))?;

        let set: JwkSet = response
            .json()
            .await
            .map_err(|e| AuthError::KeyFetch(e.to_string()))?;

        info!("Loaded {} Firebase signing keys", set.keys.len());
        Ok(set)
    }
}

#[async_trait]
impl IdentityVerifier for FirebaseVerifier {
    async fn verify(&self, token: &str) -> Result<Identity, AuthError> {
        let header = decode_header(token).map_err(invalid)?;
        if header.alg != Algorithm::RS256 {
            return Err(AuthError::InvalidToken(format!("unexpected algorithm {:?}", header.alg)));
        }
        let kid = header
            .kid
            .ok_or_else(|| AuthError::InvalidToken("missing key id".into()))?;

        let key = self.decoding_key(&kid).await?;
        let data = decode::<FirebaseClaims>(token, &key, &self.validation()).map_err(invalid)?;
        require_subject(data.claims.sub, data.claims.email)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{TEST_SECRET, mint_token};
    use jsonwebtoken::{EncodingKey, Header, encode};

    const PROJECT: &str = "trailmemo-test";
    const KID: &str = "test-key-1";
    const PRIVATE_PEM: &str = include_str!("../testdata/rsa_private.pem");
    const MODULUS: &str = "o699tWkVVPrdNzT6CbYkVAXTbNRsK4U53HrNHuXslNccHwTaxssesvoiZGSir1FBHdjODImrroFIFVCY3c5AkNon288QjWxvwc0nc2fr9VgEIgyt85K3Q2GVAAPDaXIULFx4cJjy5YoiHs9mg9ZNopmhrEeYS4kzOIGSR_MF37k8qxRJBwNjOzPfhRIdjX4HPevuXJUrgxiM0NMwNypSq4OMBY7m2U24tlnPxt4Qt3rKgWe40zyCqPkJ_cM6HmROrEDQh1e2uESxA-tnE5QUUzGhpoB-v5I7vk6-F_pWC9mPrrfVdsUkIkw5yEi-XBx7z4zVUKCYCJPnRR5ahgu8yw";

    fn key_set() -> JwkSet {
        serde_json::from_value(serde_json::json!({
            "keys": [{
                "kty": "RSA",
                "alg": "RS256",
                "use": "sig",
                "kid": KID,
                "n": MODULUS,
                "e": "AQAB",
            }]
        }))
        .unwrap()
    }

    fn firebase_token(kid: &str, aud: &str, iss: &str, sub: &str) -> String {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(kid.into());
        let now = chrono::Utc::now().timestamp();
        let claims = serde_json::json!({
            "sub": sub,
            "email": "ranger@example.com",
            "aud": aud,
            "iss": iss,
            "iat": now,
            "exp": now + 3600,
        });
        encode(&header, &claims, &EncodingKey::from_rsa_pem(PRIVATE_PEM.as_bytes()).unwrap()).unwrap()
    }

    fn verifier() -> FirebaseVerifier {
        FirebaseVerifier::with_keys(PROJECT, reqwest::Client::new(), key_set())
    }

    fn issuer() -> String {
        format!("https://securetoken.google.com/{}", PROJECT)
    }

    #[tokio::test]
    async fn shared_secret_round_trip() {
        let verifier = SharedSecretVerifier::new(TEST_SECRET);
        let identity = verifier.verify(&mint_token("u1")).await.unwrap();
        assert_eq!(identity.subject, "u1");
        assert_eq!(identity.email.as_deref(), Some("u1@example.com"));
    }

    #[tokio::test]
    async fn shared_secret_rejects_wrong_secret_and_expiry() {
        let verifier = SharedSecretVerifier::new("another-secret");
        assert!(verifier.verify(&mint_token("u1")).await.is_err());

        let expired = SharedSecretClaims {
            sub: "u1".into(),
            email: None,
            exp: (chrono::Utc::now() - chrono::Duration::hours(1)).timestamp() as usize,
        };
        let token = encode(
            &Header::default(),
            &expired,
            &EncodingKey::from_secret(TEST_SECRET.as_bytes()),
        )
        .unwrap();
        let verifier = SharedSecretVerifier::new(TEST_SECRET);
        assert!(matches!(verifier.verify(&token).await, Err(AuthError::InvalidToken(_))));
    }

    #[tokio::test]
    async fn shared_secret_rejects_empty_subject() {
        let verifier = SharedSecretVerifier::new(TEST_SECRET);
        assert!(verifier.verify(&mint_token("")).await.is_err());
    }

    #[tokio::test]
    async fn firebase_accepts_valid_token() {
        let token = firebase_token(KID, PROJECT, &issuer(), "firebase-uid-123");
        let identity = verifier().verify(&token).await.unwrap();
        assert_eq!(identity.subject, "firebase-uid-123");
        assert_eq!(identity.email.as_deref(), Some("ranger@example.com"));
    }

    #[tokio::test]
    async fn firebase_checks_audience_and_issuer() {
        let wrong_aud = firebase_token(KID, "other-project", &issuer(), "uid");
        assert!(verifier().verify(&wrong_aud).await.is_err());

        let wrong_iss = firebase_token(KID, PROJECT, "https://accounts.example.com", "uid");
        assert!(verifier().verify(&wrong_iss).await.is_err());
    }

    #[tokio::test]
    async fn firebase_rejects_unknown_key_without_refetch() {
        let token = firebase_token("rotated-away", PROJECT, &issuer(), "uid");
        assert!(matches!(verifier().verify(&token).await, Err(AuthError::InvalidToken(_))));
    }

    #[tokio::test]
    async fn firebase_rejects_hs256() {
        let verifier = verifier();
        assert!(verifier.verify(&mint_token("uid")).await.is_err());
    }
}
