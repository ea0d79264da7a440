use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use tracing::debug;

use crate::error::ApiError;
use crate::state::AppState;

/// Verifies the bearer token and stores the resulting `Identity` in the
/// request extensions.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .ok_or_else(|| ApiError::Authentication("Missing authorization header".into()))?
        .to_str()
        .map_err(|_| ApiError::Authentication("Invalid authorization header format".into()))?;

    let token = bearer_token(auth_header)
        .ok_or_else(|| ApiError::Authentication("Invalid authorization header format".into()))?;

    let identity = state.identity.verify(token).await.map_err(|e| {
        debug!("Token rejected: {}", e);
        ApiError::from(e)
    })?;

    req.extensions_mut().insert(identity);
    Ok(next.run(req).await)
}

fn bearer_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return None;
    }
    Some(token)
}
