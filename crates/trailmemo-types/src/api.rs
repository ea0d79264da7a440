use serde::{Deserialize, Serialize};

use crate::models::{Location, Memo, NearbyMemo, Pagination};

// -- Health --

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

// -- Auth --

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub display_name: String,
    #[serde(default)]
    pub department: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateProfileRequest {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
}

// -- Memos --

/// Only `title`, `text` and `park_name` are mutable after creation.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateMemoRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub park_name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MemosListResponse {
    pub memos: Vec<Memo>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<Memo>,
    pub query: String,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NearbyMemosResponse {
    pub memos: Vec<NearbyMemo>,
    pub center: Location,
    pub radius_meters: u32,
    pub total_found: usize,
}

// -- Errors --

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}
