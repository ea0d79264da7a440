use axum::Json;

use trailmemo_types::api::HealthResponse;

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        service: "trailmemo-api".into(),
        version: env!("CARGO_PKG_VERSION").into(),
    })
}
