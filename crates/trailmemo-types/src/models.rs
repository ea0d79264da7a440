use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub user_id: String,
    pub email: String,
    pub display_name: String,
    pub department: Option<String>,
    /// Hex color code (e.g. `#3de1bd`), derived from `user_id` at registration.
    pub color: String,
    pub created_at: DateTime<Utc>,
}

/// GPS view of a memo. Only exists when both coordinates are stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

/// A voice memo.
///
/// `user_name` and `user_color` are snapshots of the creator's profile taken
/// when the memo was created. Later profile edits do not touch them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Memo {
    pub memo_id: Uuid,
    pub user_id: String,
    pub user_name: String,
    pub user_color: String,
    pub title: Option<String>,
    pub audio_url: String,
    pub text: String,
    pub duration_seconds: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    pub park_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NearbyMemo {
    pub memo_id: Uuid,
    pub user_name: String,
    pub user_color: String,
    pub title: Option<String>,
    pub park_name: Option<String>,
    pub location: Location,
    /// Great-circle distance from the search center, rounded to centimeters.
    pub distance_meters: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub current_page: u32,
    pub total_pages: u64,
    pub total_items: u64,
    pub items_per_page: u32,
    pub has_next: bool,
    pub has_previous: bool,
}

impl Pagination {
    pub fn new(page: u32, limit: u32, total: u64) -> Self {
        let total_pages = if limit == 0 {
            0
        } else {
            total.div_ceil(u64::from(limit))
        };

        Self {
            current_page: page,
            total_pages,
            total_items: total,
            items_per_page: limit,
            has_next: u64::from(page) < total_pages,
            has_previous: page > 1,
        }
    }
}
