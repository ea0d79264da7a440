//! Router harness and test doubles shared by the handler tests.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use bytes::Bytes;
use http_body_util::BodyExt;
use jsonwebtoken::{EncodingKey, Header, encode};
use serde_json::{Value, json};
use tower::ServiceExt;

use trailmemo_db::Database;

use crate::identity::{SharedSecretClaims, SharedSecretVerifier};
use crate::routes::build_router;
use crate::state::{AppState, AppStateInner, Settings};
use crate::storage::{ObjectStore, StorageError};

pub(crate) const TEST_SECRET: &str = "trailmemo-test-secret";

const BOUNDARY: &str = "trailmemo-test-boundary";

/// HS256 token for `sub`, with email `<sub>@example.com`.
pub(crate) fn mint_token(sub: &str) -> String {
    let claims = SharedSecretClaims {
        sub: sub.into(),
        email: Some(format!("{sub}@example.com")),
        exp: (chrono::Utc::now() + chrono::Duration::hours(1)).timestamp() as usize,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(TEST_SECRET.as_bytes()),
    )
    .unwrap()
}

/// Keeps objects in memory under `memory://<key>` URLs.
#[derive(Default)]
pub(crate) struct MemoryObjectStore {
    objects: Mutex<HashMap<String, Bytes>>,
    fail_deletes: AtomicBool,
}

impl MemoryObjectStore {
    pub(crate) fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    pub(crate) fn get(&self, url: &str) -> Option<Bytes> {
        self.objects.lock().unwrap().get(url).cloned()
    }

    pub(crate) fn fail_deletes(&self) {
        self.fail_deletes.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(
        &self,
        bytes: Bytes,
        path_hint: &str,
        _content_type: &str,
        owner_id: &str,
    ) -> Result<String, StorageError> {
        let url = format!("memory://{}", crate::storage::object_key(owner_id, path_hint));
        self.objects.lock().unwrap().insert(url.clone(), bytes);
        Ok(url)
    }

    async fn delete(&self, url: &str) -> Result<(), StorageError> {
        if !url.starts_with("memory://") {
            return Err(StorageError::ForeignUrl(url.into()));
        }
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(StorageError::Upstream("delete refused".into()));
        }
        self.objects.lock().unwrap().remove(url);
        Ok(())
    }
}

pub(crate) struct TestApp {
    router: Router,
    pub(crate) state: AppState,
    pub(crate) objects: Arc<MemoryObjectStore>,
}

impl TestApp {
    pub(crate) fn new() -> Self {
        Self::with_settings(Settings::default())
    }

    pub(crate) fn with_max_upload(max_upload_size: usize) -> Self {
        Self::with_settings(Settings {
            max_upload_size,
            ..Settings::default()
        })
    }

    pub(crate) fn with_media_dir(dir: PathBuf) -> Self {
        Self::with_settings(Settings {
            media_dir: Some(dir),
            ..Settings::default()
        })
    }

    fn with_settings(settings: Settings) -> Self {
        let objects = Arc::new(MemoryObjectStore::default());
        let state = Arc::new(AppStateInner {
            db: Database::open_in_memory().unwrap(),
            identity: Arc::new(SharedSecretVerifier::new(TEST_SECRET)),
            objects: objects.clone(),
            settings,
        });
        Self {
            router: build_router(state.clone()),
            state,
            objects,
        }
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Bytes) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, bytes)
    }

    async fn send_json(&self, request: Request<Body>) -> (StatusCode, Value) {
        let (status, bytes) = self.send(request).await;
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn request(method: Method, path: &str, sub: &str) -> axum::http::request::Builder {
        Request::builder()
            .method(method)
            .uri(path)
            .header(header::AUTHORIZATION, format!("Bearer {}", mint_token(sub)))
    }

    pub(crate) async fn get(&self, path: &str, sub: &str) -> (StatusCode, Value) {
        let request = Self::request(Method::GET, path, sub).body(Body::empty()).unwrap();
        self.send_json(request).await
    }

    /// GET with an explicit (or absent) Authorization header.
    pub(crate) async fn get_raw(&self, path: &str, authorization: Option<&str>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(Method::GET).uri(path);
        if let Some(value) = authorization {
            builder = builder.header(header::AUTHORIZATION, value);
        }
        self.send_json(builder.body(Body::empty()).unwrap()).await
    }

    pub(crate) async fn get_bytes(&self, path: &str) -> (StatusCode, Bytes) {
        let request = Request::builder().uri(path).body(Body::empty()).unwrap();
        self.send(request).await
    }

    pub(crate) async fn delete(&self, path: &str, sub: &str) -> StatusCode {
        let request = Self::request(Method::DELETE, path, sub).body(Body::empty()).unwrap();
        self.send_json(request).await.0
    }

    pub(crate) async fn post_json(&self, path: &str, sub: &str, body: Value) -> (StatusCode, Value) {
        self.json_request(Method::POST, path, sub, body).await
    }

    pub(crate) async fn put_json(&self, path: &str, sub: &str, body: Value) -> (StatusCode, Value) {
        self.json_request(Method::PUT, path, sub, body).await
    }

    async fn json_request(&self, method: Method, path: &str, sub: &str, body: Value) -> (StatusCode, Value) {
        let request = Self::request(method, path, sub)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send_json(request).await
    }

    pub(crate) async fn post_multipart(
        &self,
        path: &str,
        sub: &str,
        fields: &[(&str, &str)],
        audio: Option<&[u8]>,
    ) -> (StatusCode, Value) {
        let mut body = Vec::new();
        for (name, value) in fields {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
                )
                .as_bytes(),
            );
        }
        if let Some(audio) = audio {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"audio\"; filename=\"memo.m4a\"\r\nContent-Type: audio/mp4\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(audio);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

        let request = Self::request(Method::POST, path, sub)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap();
        self.send_json(request).await
    }

    /// Registers `sub` in department "Trails".
    pub(crate) async fn register(&self, sub: &str, display_name: &str) -> Value {
        let (status, body) = self
            .post_json(
                "/api/v1/auth/register",
                sub,
                json!({"display_name": display_name, "department": "Trails"}),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body
    }

    pub(crate) async fn create_memo(&self, sub: &str, fields: &[(&str, &str)]) -> Value {
        let (status, body) = self.post_multipart("/api/v1/memos", sub, fields, None).await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body
    }

    pub(crate) async fn create_memo_with_audio(
        &self,
        sub: &str,
        fields: &[(&str, &str)],
        audio: &[u8],
    ) -> Value {
        let (status, body) = self.post_multipart("/api/v1/memos", sub, fields, Some(audio)).await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body
    }
}
