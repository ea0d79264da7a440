use std::collections::HashMap;

use axum::{
    Extension, Json,
    extract::{
        Multipart, Path, Query, State,
        multipart::{MultipartError, MultipartRejection},
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
    response::IntoResponse,
};
use bytes::Bytes;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use trailmemo_db::models::{Coordinates, MemoFilter, MemoUpdate, NewMemo};
use trailmemo_types::PLACEHOLDER_AUDIO_URL;
use trailmemo_types::api::{
    MemosListResponse, NearbyMemosResponse, SearchResponse, UpdateMemoRequest,
};
use trailmemo_types::models::{Location, Memo, Pagination};

use crate::error::ApiError;
use crate::identity::Identity;
use crate::state::AppState;

const LIST_DEFAULT_LIMIT: u32 = 100;
const LIST_MAX_LIMIT: u32 = 500;
const SEARCH_DEFAULT_LIMIT: u32 = 20;
const SEARCH_MAX_LIMIT: u32 = 100;
const NEARBY_DEFAULT_LIMIT: u32 = 50;
const NEARBY_MAX_LIMIT: u32 = 200;
const NEARBY_DEFAULT_RADIUS: u32 = 1000;
const NEARBY_MAX_RADIUS: u32 = 50_000;

// -- Create --

struct AudioPart {
    bytes: Bytes,
    file_name: String,
    content_type: String,
}

/// A validated memo form, before the creator's profile is attached.
#[derive(Debug)]
struct MemoDraft {
    title: Option<String>,
    text: String,
    duration_seconds: i64,
    coordinates: Option<Coordinates>,
    location_accuracy: Option<f64>,
    address: Option<String>,
    park_name: Option<String>,
}

/// POST /api/v1/memos
///
/// Multipart form with an optional `audio` file part.
pub async fn create_memo(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let mut multipart = multipart
        .map_err(|e| ApiError::Validation(format!("Invalid multipart form: {}", e.body_text())))?;
    let max_size = state.settings.max_upload_size;

    let mut fields = HashMap::new();
    let mut audio = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, max_size))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name == "audio" {
            let file_name = field.file_name().unwrap_or_default().to_string();
            let content_type = field
                .content_type()
                .unwrap_or("application/octet-stream")
                .to_string();
            let bytes = field.bytes().await.map_err(|e| multipart_error(e, max_size))?;
            if bytes.len() > max_size {
                return Err(too_large(max_size));
            }
            // An empty file part counts as no audio.
            if !bytes.is_empty() {
                audio = Some(AudioPart {
                    bytes,
                    file_name,
                    content_type,
                });
            }
        } else {
            let value = field.text().await.map_err(|e| multipart_error(e, max_size))?;
            fields.insert(name, value);
        }
    }

    let draft = parse_memo_form(&fields)?;

    let subject = identity.subject.clone();
    let user = state
        .run_db(move |db| db.get_user_by_id(&subject))
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found. Please register first.".into()))?;

    let audio_url = match audio {
        Some(part) => {
            state
                .objects
                .put(part.bytes, &part.file_name, &part.content_type, &user.user_id)
                .await?
        }
        None => PLACEHOLDER_AUDIO_URL.to_string(),
    };

    let new_memo = NewMemo {
        user_id: user.user_id,
        user_name: user.display_name,
        user_color: user.color,
        title: draft.title,
        audio_url: audio_url.clone(),
        text: draft.text,
        duration_seconds: draft.duration_seconds,
        coordinates: draft.coordinates,
        location_accuracy: draft.location_accuracy,
        address: draft.address,
        park_name: draft.park_name,
    };

    let memo = match state.run_db(move |db| db.create_memo(&new_memo)).await {
        Ok(memo) => memo,
        Err(e) => {
            if audio_url != PLACEHOLDER_AUDIO_URL {
                if let Err(cleanup) = state.objects.delete(&audio_url).await {
                    warn!("Failed to remove orphaned audio {}: {}", audio_url, cleanup);
                }
            }
            return Err(e);
        }
    };

    info!("Created memo {} for user {}", memo.memo_id, memo.user_id);
    Ok((StatusCode::CREATED, Json(memo)))
}

fn multipart_error(err: MultipartError, max_size: usize) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return too_large(max_size);
    }
    ApiError::Validation(format!("Invalid multipart form: {}", err.body_text()))
}

fn too_large(max_size: usize) -> ApiError {
    ApiError::PayloadTooLarge {
        max_size_mb: (max_size / (1024 * 1024)) as u64,
    }
}

fn parse_memo_form(fields: &HashMap<String, String>) -> Result<MemoDraft, ApiError> {
    let field = |name: &str| {
        fields
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    };

    let text = field("text")
        .ok_or_else(|| ApiError::Validation("text is required".into()))?
        .to_string();

    let duration_seconds = field("duration_seconds")
        .ok_or_else(|| ApiError::Validation("duration_seconds is required".into()))?
        .parse::<i64>()
        .ok()
        .filter(|d| *d >= 0)
        .ok_or_else(|| {
            ApiError::Validation("duration_seconds must be a non-negative integer".into())
        })?;

    let coordinates = match (field("latitude"), field("longitude")) {
        (Some(lat), Some(lon)) => Some(Coordinates {
            latitude: parse_coordinate(lat, "latitude", 90.0)?,
            longitude: parse_coordinate(lon, "longitude", 180.0)?,
        }),
        (None, None) => None,
        _ => {
            return Err(ApiError::Validation(
                "latitude and longitude must be provided together".into(),
            ));
        }
    };

    let location_accuracy = field("location_accuracy")
        .map(|raw| {
            raw.parse::<f64>()
                .ok()
                .filter(|a| a.is_finite() && *a >= 0.0)
                .ok_or_else(|| ApiError::Validation("Invalid location_accuracy value".into()))
        })
        .transpose()?;

    Ok(MemoDraft {
        title: field("title").map(str::to_string),
        text,
        duration_seconds,
        coordinates,
        location_accuracy,
        address: field("address").map(str::to_string),
        park_name: field("park_name").map(str::to_string),
    })
}

fn parse_coordinate(raw: &str, name: &str, bound: f64) -> Result<f64, ApiError> {
    let value = raw
        .trim()
        .parse::<f64>()
        .map_err(|_| ApiError::Validation(format!("Invalid {} value", name)))?;
    if !value.is_finite() || value < -bound || value > bound {
        return Err(ApiError::Validation(format!(
            "{} must be between -{} and {}",
            name, bound, bound
        )));
    }
    Ok(value)
}

// -- Read --

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub park_name: Option<String>,
    pub user_id: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

/// GET /api/v1/memos
pub async fn list_memos(
    State(state): State<AppState>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(query) = query?;
    let page = page_param(query.page.as_deref());
    let limit = limit_param(query.limit.as_deref(), LIST_DEFAULT_LIMIT, LIST_MAX_LIMIT);

    let filter = MemoFilter {
        park_name: non_blank(query.park_name),
        user_id: non_blank(query.user_id),
        start_date: non_blank(query.start_date)
            .map(|raw| parse_date_bound(&raw, "start_date", false))
            .transpose()?,
        end_date: non_blank(query.end_date)
            .map(|raw| parse_date_bound(&raw, "end_date", true))
            .transpose()?,
    };

    let (memos, total) = state
        .run_db(move |db| db.list_memos(page, limit, &filter))
        .await?;

    Ok(Json(MemosListResponse {
        memos,
        pagination: Pagination::new(page, limit, total),
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct NearbyQuery {
    pub latitude: Option<String>,
    pub longitude: Option<String>,
    pub radius_meters: Option<String>,
    pub limit: Option<String>,
}

/// GET /api/v1/memos/nearby
pub async fn nearby_memos(
    State(state): State<AppState>,
    query: Result<Query<NearbyQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(query) = query?;
    let (Some(lat), Some(lon)) = (non_blank(query.latitude), non_blank(query.longitude)) else {
        return Err(ApiError::Validation("latitude and longitude are required".into()));
    };
    let latitude = parse_coordinate(&lat, "latitude", 90.0)?;
    let longitude = parse_coordinate(&lon, "longitude", 180.0)?;

    let radius_meters = query
        .radius_meters
        .as_deref()
        .and_then(|raw| raw.trim().parse::<i64>().ok())
        .filter(|r| (0..=i64::from(NEARBY_MAX_RADIUS)).contains(r))
        .map(|r| r as u32)
        .unwrap_or(NEARBY_DEFAULT_RADIUS);
    let limit = limit_param(query.limit.as_deref(), NEARBY_DEFAULT_LIMIT, NEARBY_MAX_LIMIT);

    let memos = state
        .run_db(move |db| db.nearby_memos(latitude, longitude, f64::from(radius_meters), limit))
        .await?;

    Ok(Json(NearbyMemosResponse {
        total_found: memos.len(),
        memos,
        center: Location {
            latitude,
            longitude,
            accuracy: None,
            address: None,
        },
        radius_meters,
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
}

/// GET /api/v1/memos/search
pub async fn search_memos(
    State(state): State<AppState>,
    query: Result<Query<SearchQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(query) = query?;
    let q = non_blank(query.q)
        .ok_or_else(|| ApiError::Validation("Search query (q) is required".into()))?;
    let page = page_param(query.page.as_deref());
    let limit = limit_param(query.limit.as_deref(), SEARCH_DEFAULT_LIMIT, SEARCH_MAX_LIMIT);

    let term = q.clone();
    let (results, total) = state
        .run_db(move |db| db.search_memos(&term, page, limit))
        .await?;

    Ok(Json(SearchResponse {
        results,
        query: q,
        pagination: Pagination::new(page, limit, total),
    }))
}

/// GET /api/v1/memos/{id}
pub async fn get_memo(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let memo_id = parse_memo_id(&id)?;
    Ok(Json(fetch_memo(&state, memo_id).await?))
}

// -- Mutations --

/// PUT /api/v1/memos/{id}
pub async fn update_memo(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
    body: Result<Json<UpdateMemoRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let memo_id = parse_memo_id(&id)?;
    let memo = fetch_memo(&state, memo_id).await?;
    require_owner(&memo, &identity, "update")?;

    let Json(req) = body?;
    // Blank optional fields clear the column.
    let update = MemoUpdate {
        title: req.title.map(|t| non_blank(Some(t))),
        text: req.text.map(|t| t.trim().to_string()),
        park_name: req.park_name.map(|p| non_blank(Some(p))),
    };
    if update.is_empty() {
        return Err(ApiError::Validation("No fields to update".into()));
    }
    if update.text.as_deref().is_some_and(str::is_empty) {
        return Err(ApiError::Validation("text cannot be empty".into()));
    }

    let updated = state
        .run_db(move |db| db.update_memo(memo_id, &update))
        .await?
        .ok_or_else(|| ApiError::NotFound("Memo not found".into()))?;

    Ok(Json(updated))
}

/// DELETE /api/v1/memos/{id}
pub async fn delete_memo(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let memo_id = parse_memo_id(&id)?;
    let memo = fetch_memo(&state, memo_id).await?;
    require_owner(&memo, &identity, "delete")?;

    if memo.audio_url != PLACEHOLDER_AUDIO_URL {
        if let Err(e) = state.objects.delete(&memo.audio_url).await {
            warn!("Failed to delete audio for memo {}: {}", memo_id, e);
        }
    }

    state
        .run_db(move |db| db.delete_memo(memo_id))
        .await
        .map_err(|e| match e {
            ApiError::NotFound(_) => ApiError::NotFound("Memo not found".into()),
            other => other,
        })?;

    info!("Deleted memo {}", memo_id);
    Ok(StatusCode::NO_CONTENT)
}

// -- Helpers --

async fn fetch_memo(state: &AppState, memo_id: Uuid) -> Result<Memo, ApiError> {
    state
        .run_db(move |db| db.get_memo(memo_id))
        .await?
        .ok_or_else(|| ApiError::NotFound("Memo not found".into()))
}

fn require_owner(memo: &Memo, identity: &Identity, action: &str) -> Result<(), ApiError> {
    if memo.user_id != identity.subject {
        return Err(ApiError::Authorization(format!(
            "You can only {} your own memos",
            action
        )));
    }
    Ok(())
}

fn parse_memo_id(raw: &str) -> Result<Uuid, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::Validation("Invalid memo ID".into()))
}

fn non_blank(raw: Option<String>) -> Option<String> {
    raw.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Missing, unparsable or non-positive pages read as page 1.
fn page_param(raw: Option<&str>) -> u32 {
    raw.and_then(|s| s.trim().parse::<i64>().ok())
        .filter(|p| *p >= 1)
        .map(|p| p.min(i64::from(u32::MAX)) as u32)
        .unwrap_or(1)
}

/// Limits outside `1..=max` fall back to the default rather than clamping.
fn limit_param(raw: Option<&str>, default: u32, max: u32) -> u32 {
    raw.and_then(|s| s.trim().parse::<i64>().ok())
        .filter(|l| (1..=i64::from(max)).contains(l))
        .map(|l| l as u32)
        .unwrap_or(default)
}

/// Accepts RFC 3339 or a bare `YYYY-MM-DD`. A bare date as an end bound
/// covers the whole day.
fn parse_date_bound(raw: &str, name: &str, end: bool) -> Result<DateTime<Utc>, ApiError> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }

    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
        ApiError::Validation(format!(
            "Invalid {} (expected RFC 3339 or YYYY-MM-DD)",
            name
        ))
    })?;
    let time = if end {
        NaiveTime::from_hms_micro_opt(23, 59, 59, 999_999)
    } else {
        Some(NaiveTime::MIN)
    };
    let time = time.ok_or_else(|| ApiError::Validation(format!("Invalid {}", name)))?;

    Ok(date.and_time(time).and_utc())
}
