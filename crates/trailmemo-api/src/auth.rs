use axum::{
    Extension, Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::{info, warn};

use trailmemo_db::models::{NewUser, UserUpdate};
use trailmemo_types::PLACEHOLDER_AUDIO_URL;
use trailmemo_types::api::{RegisterRequest, UpdateProfileRequest};

use crate::error::ApiError;
use crate::identity::Identity;
use crate::state::AppState;

const MAX_NAME_LEN: usize = 100;

/// POST /api/v1/auth/register
pub async fn register(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = body?;
    let display_name = required_name(&req.display_name)?;
    let department = optional_text(req.department);

    let email = identity
        .email
        .filter(|email| !email.trim().is_empty())
        .ok_or_else(|| ApiError::Validation("Verified identity has no email address".into()))?;

    let subject = identity.subject.clone();
    let existing = state
        .run_db(move |db| db.get_user_by_id(&subject))
        .await?;
    if existing.is_some() {
        return Err(ApiError::Conflict("User already registered".into()));
    }

    let new_user = NewUser {
        user_id: identity.subject,
        email,
        display_name,
        department,
    };
    let user = state.run_db(move |db| db.create_user(&new_user)).await?;

    info!("Registered user {}", user.user_id);
    Ok((StatusCode::CREATED, Json(user)))
}

/// GET /api/v1/auth/me
pub async fn me(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state
        .run_db(move |db| db.get_user_by_id(&identity.subject))
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".into()))?;

    Ok(Json(user))
}

/// PUT /api/v1/auth/me
///
/// Memos keep the name they were created with.
pub async fn update_me(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    body: Result<Json<UpdateProfileRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = body?;
    let update = UserUpdate {
        display_name: req.display_name.as_deref().map(required_name).transpose()?,
        // A blank department clears it.
        department: req.department.map(|d| optional_text(Some(d))),
    };
    if update.is_empty() {
        return Err(ApiError::Validation("No fields to update".into()));
    }

    let user = state
        .run_db(move |db| db.update_user(&identity.subject, &update))
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".into()))?;

    Ok(Json(user))
}

/// DELETE /api/v1/auth/me
///
/// Removes the account and all of its memos. Audio cleanup is best-effort.
pub async fn delete_me(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    let subject = identity.subject.clone();
    let urls = state
        .run_db(move |db| {
            db.get_user_by_id(&subject)?
                .ok_or(trailmemo_db::StoreError::NotFound)?;
            db.audio_urls_for_user(&subject)
        })
        .await
        .map_err(|e| match e {
            ApiError::NotFound(_) => ApiError::NotFound("User not found".into()),
            other => other,
        })?;

    for url in urls.iter().filter(|url| url.as_str() != PLACEHOLDER_AUDIO_URL) {
        if let Err(e) = state.objects.delete(url).await {
            warn!("Failed to delete audio {}: {}", url, e);
        }
    }

    let subject = identity.subject.clone();
    state.run_db(move |db| db.delete_user(&subject)).await?;

    info!("Deleted user {} and {} memos", identity.subject, urls.len());
    Ok(StatusCode::NO_CONTENT)
}

fn required_name(raw: &str) -> Result<String, ApiError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(ApiError::Validation("display_name is required".into()));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(ApiError::Validation(format!(
            "display_name must be at most {} characters",
            MAX_NAME_LEN
        )));
    }
    Ok(name.to_string())
}

fn optional_text(raw: Option<String>) -> Option<String> {
    raw.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use crate::testing::TestApp;

    #[tokio::test]
    async fn register_and_fetch_profile() {
        let app = TestApp::new();

        let (status, body) = app
            .post_json("/api/v1/auth/register", "u1", json!({"display_name": " Ranger Rick ", "department": "Trails"}))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["user_id"], "u1");
        assert_eq!(body["email"], "u1@example.com");
        assert_eq!(body["display_name"], "Ranger Rick");
        assert_eq!(body["color"], "#3de1bd");

        let (status, me) = app.get("/api/v1/auth/me", "u1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(me, body);
    }

    #[tokio::test]
    async fn register_twice_conflicts() {
        let app = TestApp::new();
        app.register("u1", "First").await;

        let (status, body) = app
            .post_json("/api/v1/auth/register", "u1", json!({"display_name": "Again"}))
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "CONFLICT");
    }

    #[tokio::test]
    async fn register_validates_body() {
        let app = TestApp::new();

        let (status, body) = app
            .post_json("/api/v1/auth/register", "u1", json!({"display_name": "   "}))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

        let (status, _) = app
            .post_json("/api/v1/auth/register", "u1", json!({"department": "Trails"}))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn me_requires_registration_and_token() {
        let app = TestApp::new();

        let (status, body) = app.get("/api/v1/auth/me", "u1").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "NOT_FOUND");

        let (status, body) = app.get_raw("/api/v1/auth/me", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "AUTHENTICATION_ERROR");
        assert_eq!(body["error"]["message"], "Missing authorization header");

        let (status, body) = app.get_raw("/api/v1/auth/me", Some("Bearer not-a-token")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["message"], "Invalid or expired token");

        let (status, body) = app.get_raw("/api/v1/auth/me", Some("Token abc")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["message"], "Invalid authorization header format");
    }

    #[tokio::test]
    async fn update_profile_keeps_memo_snapshots() {
        let app = TestApp::new();
        app.register("u1", "Old Name").await;
        let memo = app.create_memo("u1", &[("text", "snapshot"), ("duration_seconds", "5")]).await;

        let (status, body) = app
            .put_json("/api/v1/auth/me", "u1", json!({"display_name": "New Name"}))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["display_name"], "New Name");
        assert_eq!(body["department"], "Trails");

        let (_, fetched) = app
            .get(&format!("/api/v1/memos/{}", memo["memo_id"].as_str().unwrap()), "u1")
            .await;
        assert_eq!(fetched["user_name"], "Old Name");

        let (status, _) = app.put_json("/api/v1/auth/me", "u1", json!({})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = app
            .put_json("/api/v1/auth/me", "ghost", json!({"display_name": "Nobody"}))
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn blank_department_clears_it() {
        let app = TestApp::new();
        app.register("u1", "Ranger").await;

        let (status, body) = app
            .put_json("/api/v1/auth/me", "u1", json!({"department": " Wildlife "}))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["department"], "Wildlife");

        let (status, body) = app
            .put_json("/api/v1/auth/me", "u1", json!({"department": ""}))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.get("department").map_or(true, |d| d.is_null()), "{body}");
        assert_eq!(body["display_name"], "Ranger");

        let (_, fetched) = app.get("/api/v1/auth/me", "u1").await;
        assert!(fetched.get("department").map_or(true, |d| d.is_null()));
    }

    #[tokio::test]
    async fn delete_account_removes_memos_and_audio() {
        let app = TestApp::new();
        app.register("u1", "Leaving").await;
        app.register("u2", "Staying").await;
        let with_audio = app
            .create_memo_with_audio("u1", &[("text", "recorded"), ("duration_seconds", "12")], b"m4a-bytes")
            .await;
        app.create_memo("u1", &[("text", "no audio"), ("duration_seconds", "1")]).await;
        app.create_memo("u2", &[("text", "someone else"), ("duration_seconds", "1")]).await;
        assert_eq!(app.objects.len(), 1);

        let status = app.delete("/api/v1/auth/me", "u1").await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert_eq!(app.objects.len(), 0);

        let (status, _) = app
            .get(&format!("/api/v1/memos/{}", with_audio["memo_id"].as_str().unwrap()), "u2")
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, list) = app.get("/api/v1/memos", "u2").await;
        assert_eq!(list["pagination"]["total_items"], 1);

        assert_eq!(app.delete("/api/v1/auth/me", "u1").await, StatusCode::NOT_FOUND);
    }
}
