use std::time::Duration;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{Method, StatusCode, header},
    middleware,
    routing::{get, post},
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::middleware::require_auth;
use crate::state::AppState;
use crate::{auth, health, memos};

/// Headroom above the audio limit for the text fields of a memo form.
const FORM_OVERHEAD_BYTES: usize = 1024 * 1024;

const CORS_MAX_AGE: Duration = Duration::from_secs(12 * 60 * 60);

pub fn build_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/auth/register", post(auth::register))
        .route(
            "/auth/me",
            get(auth::me).put(auth::update_me).delete(auth::delete_me),
        )
        .route("/memos", get(memos::list_memos).post(memos::create_memo))
        .route("/memos/nearby", get(memos::nearby_memos))
        .route("/memos/search", get(memos::search_memos))
        .route(
            "/memos/{id}",
            get(memos::get_memo)
                .put(memos::update_memo)
                .delete(memos::delete_memo),
        )
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    let mut app = Router::new()
        .route("/health", get(health::health))
        .nest("/api/v1", protected);

    if let Some(dir) = &state.settings.media_dir {
        app = app.nest_service("/media", ServeDir::new(dir));
    }

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .max_age(CORS_MAX_AGE);

    app.layer(DefaultBodyLimit::max(
        state.settings.max_upload_size.saturating_add(FORM_OVERHEAD_BYTES),
    ))
    .layer(TimeoutLayer::with_status_code(
        StatusCode::REQUEST_TIMEOUT,
        state.settings.request_timeout,
    ))
    .layer(cors)
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;

    use crate::testing::TestApp;

    #[tokio::test]
    async fn health_is_public() {
        let app = TestApp::new();
        let (status, body) = app.get_raw("/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "trailmemo-api");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn api_routes_require_auth() {
        let app = TestApp::new();
        for path in ["/api/v1/memos", "/api/v1/memos/nearby", "/api/v1/memos/search?q=x"] {
            let (status, body) = app.get_raw(path, None).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "{path}");
            assert_eq!(body["error"]["code"], "AUTHENTICATION_ERROR");
        }
    }

    #[tokio::test]
    async fn serves_local_media() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("memos/u1")).unwrap();
        std::fs::write(dir.path().join("memos/u1/clip.m4a"), b"local-audio").unwrap();

        let app = TestApp::with_media_dir(dir.path().to_path_buf());
        let (status, bytes) = app.get_bytes("/media/memos/u1/clip.m4a").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(&bytes[..], b"local-audio");

        let (status, _) = app.get_bytes("/media/memos/u1/missing.m4a").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
