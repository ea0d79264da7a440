//! Database row types and store inputs.
//! Rows map directly to SQLite columns and are converted into the
//! trailmemo-types API models at the store boundary.

use chrono::{DateTime, Utc};
use rusqlite::Row;
use trailmemo_types::models::{Location, Memo, NearbyMemo, User};
use uuid::Uuid;

use crate::{StoreError, parse_timestamp};

pub struct UserRow {
    pub user_id: String,
    pub email: String,
    pub display_name: String,
    pub department: Option<String>,
    pub color: String,
    pub created_at: String,
}

impl UserRow {
    pub(crate) const COLUMNS: &'static str =
        "user_id, email, display_name, department, color, created_at";

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            user_id: row.get(0)?,
            email: row.get(1)?,
            display_name: row.get(2)?,
            department: row.get(3)?,
            color: row.get(4)?,
            created_at: row.get(5)?,
        })
    }

    pub fn into_user(self) -> Result<User, StoreError> {
        Ok(User {
            created_at: parse_timestamp(&self.created_at)?,
            user_id: self.user_id,
            email: self.email,
            display_name: self.display_name,
            department: self.department,
            color: self.color,
        })
    }
}

pub struct MemoRow {
    pub memo_id: String,
    pub user_id: String,
    pub user_name: String,
    pub user_color: String,
    pub title: Option<String>,
    pub audio_url: String,
    pub text: String,
    pub duration_seconds: i64,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub location_accuracy: Option<f64>,
    pub address: Option<String>,
    pub park_name: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl MemoRow {
    /// Qualified with the `m` alias; the text index also has a `text` column.
    pub(crate) const COLUMNS: &'static str = "m.memo_id, m.user_id, m.user_name, m.user_color, \
        m.title, m.audio_url, m.text, m.duration_seconds, m.latitude, m.longitude, \
        m.location_accuracy, m.address, m.park_name, m.created_at, m.updated_at";

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            memo_id: row.get(0)?,
            user_id: row.get(1)?,
            user_name: row.get(2)?,
            user_color: row.get(3)?,
            title: row.get(4)?,
            audio_url: row.get(5)?,
            text: row.get(6)?,
            duration_seconds: row.get(7)?,
            latitude: row.get(8)?,
            longitude: row.get(9)?,
            location_accuracy: row.get(10)?,
            address: row.get(11)?,
            park_name: row.get(12)?,
            created_at: row.get(13)?,
            updated_at: row.get(14)?,
        })
    }

    pub fn into_memo(self) -> Result<Memo, StoreError> {
        Ok(Memo {
            memo_id: parse_uuid(&self.memo_id)?,
            location: location_view(
                self.latitude,
                self.longitude,
                self.location_accuracy,
                self.address,
            ),
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
            user_id: self.user_id,
            user_name: self.user_name,
            user_color: self.user_color,
            title: self.title,
            audio_url: self.audio_url,
            text: self.text,
            duration_seconds: self.duration_seconds,
            park_name: self.park_name,
        })
    }
}

pub struct NearbyRow {
    pub memo_id: String,
    pub user_name: String,
    pub user_color: String,
    pub title: Option<String>,
    pub park_name: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub location_accuracy: Option<f64>,
    pub address: Option<String>,
    pub created_at: String,
    pub distance_meters: f64,
}

impl NearbyRow {
    pub fn into_nearby(self) -> Result<NearbyMemo, StoreError> {
        Ok(NearbyMemo {
            memo_id: parse_uuid(&self.memo_id)?,
            user_name: self.user_name,
            user_color: self.user_color,
            title: self.title,
            park_name: self.park_name,
            location: Location {
                latitude: self.latitude,
                longitude: self.longitude,
                accuracy: self.location_accuracy,
                address: self.address,
            },
            distance_meters: crate::geo::round_centimeters(self.distance_meters),
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

/// The `location` view exists only when both coordinates are present.
pub(crate) fn location_view(
    latitude: Option<f64>,
    longitude: Option<f64>,
    accuracy: Option<f64>,
    address: Option<String>,
) -> Option<Location> {
    match (latitude, longitude) {
        (Some(latitude), Some(longitude)) => Some(Location {
            latitude,
            longitude,
            accuracy,
            address,
        }),
        _ => None,
    }
}

fn parse_uuid(raw: &str) -> Result<Uuid, StoreError> {
    raw.parse()
        .map_err(|e| StoreError::Corrupt(format!("memo_id '{}': {}", raw, e)))
}

// -- Store inputs --

pub struct NewUser {
    pub user_id: String,
    pub email: String,
    pub display_name: String,
    pub department: Option<String>,
}

/// Profile fields a user may change. `None` leaves the column untouched;
/// `Some(None)` clears `department`.
#[derive(Debug, Default, Clone)]
pub struct UserUpdate {
    pub display_name: Option<String>,
    pub department: Option<Option<String>>,
}

impl UserUpdate {
    pub fn is_empty(&self) -> bool {
        self.display_name.is_none() && self.department.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

pub struct NewMemo {
    pub user_id: String,
    /// Snapshot of the creator's display name.
    pub user_name: String,
    /// Snapshot of the creator's color.
    pub user_color: String,
    pub title: Option<String>,
    pub audio_url: String,
    pub text: String,
    pub duration_seconds: i64,
    pub coordinates: Option<Coordinates>,
    pub location_accuracy: Option<f64>,
    pub address: Option<String>,
    pub park_name: Option<String>,
}

/// The mutable memo fields. `None` leaves the column untouched;
/// `Some(None)` clears an optional one.
#[derive(Debug, Default, Clone)]
pub struct MemoUpdate {
    pub title: Option<Option<String>>,
    pub text: Option<String>,
    pub park_name: Option<Option<String>>,
}

impl MemoUpdate {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.text.is_none() && self.park_name.is_none()
    }
}

/// Optional predicates for listing memos. Date bounds are inclusive.
#[derive(Debug, Default, Clone)]
pub struct MemoFilter {
    pub park_name: Option<String>,
    pub user_id: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}
