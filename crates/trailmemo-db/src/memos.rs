use chrono::{DateTime, Duration, Utc};
use rusqlite::Connection;
use rusqlite::types::Value;
use trailmemo_types::models::{Memo, NearbyMemo};
use uuid::Uuid;

use crate::models::{MemoFilter, MemoRow, MemoUpdate, NearbyRow, NewMemo, location_view};
use crate::{Database, OptionalExt, StoreError, format_timestamp, geo, now, parse_timestamp};

impl Database {
    // -- Create / read --

    /// Inserts a memo. The store assigns `memo_id`, `created_at` and
    /// `updated_at`.
    pub fn create_memo(&self, new_memo: &NewMemo) -> Result<Memo, StoreError> {
        let memo_id = Uuid::new_v4();
        let created_at = now();
        let (latitude, longitude) = match new_memo.coordinates {
            Some(c) => (Some(c.latitude), Some(c.longitude)),
            None => (None, None),
        };

        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO memos (
                    memo_id, user_id, user_name, user_color, title, audio_url, text,
                    duration_seconds, latitude, longitude, location_accuracy, address,
                    park_name, created_at, updated_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?14)",
                rusqlite::params![
                    memo_id.to_string(),
                    &new_memo.user_id,
                    &new_memo.user_name,
                    &new_memo.user_color,
                    &new_memo.title,
                    &new_memo.audio_url,
                    &new_memo.text,
                    new_memo.duration_seconds,
                    latitude,
                    longitude,
                    new_memo.location_accuracy,
                    &new_memo.address,
                    &new_memo.park_name,
                    format_timestamp(created_at),
                ],
            )
            .map_err(|e| StoreError::from_insert(e, "memo"))?;
            Ok(())
        })?;

        Ok(Memo {
            memo_id,
            user_id: new_memo.user_id.clone(),
            user_name: new_memo.user_name.clone(),
            user_color: new_memo.user_color.clone(),
            title: new_memo.title.clone(),
            audio_url: new_memo.audio_url.clone(),
            text: new_memo.text.clone(),
            duration_seconds: new_memo.duration_seconds,
            location: location_view(
                latitude,
                longitude,
                new_memo.location_accuracy,
                new_memo.address.clone(),
            ),
            park_name: new_memo.park_name.clone(),
            created_at,
            updated_at: created_at,
        })
    }

    pub fn get_memo(&self, memo_id: Uuid) -> Result<Option<Memo>, StoreError> {
        self.with_conn(|conn| query_memo(conn, memo_id))
    }

    /// One page of memos, newest first, plus the size of the whole filtered
    /// set. Count and page are read in one transaction.
    pub fn list_memos(
        &self,
        page: u32,
        limit: u32,
        filter: &MemoFilter,
    ) -> Result<(Vec<Memo>, u64), StoreError> {
        let (where_clause, mut params) = filter_clause(filter);
        let count_sql = format!("SELECT COUNT(*) FROM memos m {}", where_clause);
        let page_sql = format!(
            "SELECT {} FROM memos m {} ORDER BY m.created_at DESC, m.id DESC LIMIT ?{} OFFSET ?{}",
            MemoRow::COLUMNS,
            where_clause,
            params.len() + 1,
            params.len() + 2,
        );

        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;

            let total: i64 = tx.query_row(
                &count_sql,
                rusqlite::params_from_iter(params.iter()),
                |row| row.get(0),
            )?;

            params.push(Value::Integer(i64::from(limit)));
            params.push(Value::Integer(offset(page, limit)));
            let memos = query_memo_rows(&tx, &page_sql, &params)?;

            tx.commit()?;
            Ok((memos, total as u64))
        })
    }

    /// Full-text search over `text`, best match first, newer first among
    /// equal ranks. Every term of the query must match.
    pub fn search_memos(
        &self,
        query: &str,
        page: u32,
        limit: u32,
    ) -> Result<(Vec<Memo>, u64), StoreError> {
        let Some(expression) = match_expression(query) else {
            return Ok((Vec::new(), 0));
        };

        let page_sql = format!(
            "SELECT {} FROM memos_fts
             JOIN memos m ON m.id = memos_fts.rowid
             WHERE memos_fts MATCH ?1
             ORDER BY bm25(memos_fts) ASC, m.created_at DESC, m.id DESC
             LIMIT ?2 OFFSET ?3",
            MemoRow::COLUMNS,
        );

        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;

            let total: i64 = tx.query_row(
                "SELECT COUNT(*) FROM memos_fts WHERE memos_fts MATCH ?1",
                [&expression],
                |row| row.get(0),
            )?;

            let params = [
                Value::Text(expression.clone()),
                Value::Integer(i64::from(limit)),
                Value::Integer(offset(page, limit)),
            ];
            let memos = query_memo_rows(&tx, &page_sql, &params)?;

            tx.commit()?;
            Ok((memos, total as u64))
        })
    }

    /// Memos within `radius_meters` of the point, closest first. Only
    /// memos with coordinates are considered.
    pub fn nearby_memos(
        &self,
        latitude: f64,
        longitude: f64,
        radius_meters: f64,
        limit: u32,
    ) -> Result<Vec<NearbyMemo>, StoreError> {
        // No point farther apart in latitude than this can be in range, so
        // the location index narrows the scan before the exact distance.
        let span = geo::latitude_span_degrees(radius_meters) + 1e-9;

        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT memo_id, user_name, user_color, title, park_name,
                        latitude, longitude, location_accuracy, address,
                        created_at, distance_meters
                 FROM (
                    SELECT memo_id, user_name, user_color, title, park_name,
                           latitude, longitude, location_accuracy, address,
                           created_at,
                           haversine(?1, ?2, latitude, longitude) AS distance_meters
                    FROM memos
                    WHERE latitude IS NOT NULL AND longitude IS NOT NULL
                      AND latitude BETWEEN ?5 AND ?6
                 ) AS nearby
                 WHERE distance_meters <= ?3
                 ORDER BY distance_meters ASC
                 LIMIT ?4",
            )?;

            let rows = stmt
                .query_map(
                    rusqlite::params![
                        latitude,
                        longitude,
                        radius_meters,
                        limit,
                        latitude - span,
                        latitude + span,
                    ],
                    |row| {
                        Ok(NearbyRow {
                            memo_id: row.get(0)?,
                            user_name: row.get(1)?,
                            user_color: row.get(2)?,
                            title: row.get(3)?,
                            park_name: row.get(4)?,
                            latitude: row.get(5)?,
                            longitude: row.get(6)?,
                            location_accuracy: row.get(7)?,
                            address: row.get(8)?,
                            created_at: row.get(9)?,
                            distance_meters: row.get(10)?,
                        })
                    },
                )?
                .collect::<Result<Vec<_>, _>>()?;

            rows.into_iter().map(NearbyRow::into_nearby).collect()
        })
    }

    // -- Mutations --

    /// Applies the non-empty fields of `update` and refreshes `updated_at`.
    /// Returns the re-read memo, or `None` when it does not exist.
    pub fn update_memo(&self, memo_id: Uuid, update: &MemoUpdate) -> Result<Option<Memo>, StoreError> {
        if update.is_empty() {
            return Err(StoreError::InvalidArgument("no fields to update".into()));
        }

        let mut set_clauses = Vec::new();
        let mut params = Vec::new();
        for (column, value) in [
            ("title", update.title.as_ref().map(Option::as_deref)),
            ("text", update.text.as_deref().map(Some)),
            ("park_name", update.park_name.as_ref().map(Option::as_deref)),
        ] {
            if let Some(value) = value {
                params.push(value.map_or(Value::Null, |v| Value::Text(v.to_string())));
                set_clauses.push(format!("{} = ?{}", column, params.len()));
            }
        }

        self.with_conn_mut(|conn| {
            let tx = conn.unchecked_transaction()?;

            let previous: Option<String> = tx
                .query_row(
                    "SELECT updated_at FROM memos WHERE memo_id = ?1",
                    [memo_id.to_string()],
                    |row| row.get(0),
                )
                .optional()?;
            let Some(previous) = previous else {
                return Ok(None);
            };

            params.push(Value::Text(format_timestamp(next_update_stamp(
                parse_timestamp(&previous)?,
            ))));
            set_clauses.push(format!("updated_at = ?{}", params.len()));
            params.push(Value::Text(memo_id.to_string()));

            let sql = format!(
                "UPDATE memos SET {} WHERE memo_id = ?{}",
                set_clauses.join(", "),
                params.len()
            );
            tx.execute(&sql, rusqlite::params_from_iter(params.iter()))?;

            let memo = query_memo(&tx, memo_id)?;
            tx.commit()?;
            Ok(memo)
        })
    }

    pub fn delete_memo(&self, memo_id: Uuid) -> Result<(), StoreError> {
        self.with_conn_mut(|conn| {
            let deleted = conn.execute(
                "DELETE FROM memos WHERE memo_id = ?1",
                [memo_id.to_string()],
            )?;
            if deleted == 0 {
                return Err(StoreError::NotFound);
            }
            Ok(())
        })
    }

    /// Audio URLs of every memo owned by `user_id`.
    pub fn audio_urls_for_user(&self, user_id: &str) -> Result<Vec<String>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT audio_url FROM memos WHERE user_id = ?1")?;
            let urls = stmt
                .query_map([user_id], |row| row.get(0))?
                .collect::<Result<Vec<String>, _>>()?;
            Ok(urls)
        })
    }
}

fn query_memo(conn: &Connection, memo_id: Uuid) -> Result<Option<Memo>, StoreError> {
    let sql = format!("SELECT {} FROM memos m WHERE m.memo_id = ?1", MemoRow::COLUMNS);
    let mut stmt = conn.prepare(&sql)?;

    stmt.query_row([memo_id.to_string()], MemoRow::from_row)
        .optional()?
        .map(MemoRow::into_memo)
        .transpose()
}

fn query_memo_rows(conn: &Connection, sql: &str, params: &[Value]) -> Result<Vec<Memo>, StoreError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(params.iter()), MemoRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter().map(MemoRow::into_memo).collect()
}

fn offset(page: u32, limit: u32) -> i64 {
    i64::from(page.saturating_sub(1)) * i64::from(limit)
}

/// WHERE clause and positional parameters for a list filter. Shared by the
/// count and the page query so both see the same rows.
fn filter_clause(filter: &MemoFilter) -> (String, Vec<Value>) {
    let mut clauses = Vec::new();
    let mut params = Vec::new();

    if let Some(park_name) = &filter.park_name {
        params.push(Value::Text(park_name.clone()));
        clauses.push(format!("m.park_name = ?{}", params.len()));
    }
    if let Some(user_id) = &filter.user_id {
        params.push(Value::Text(user_id.clone()));
        clauses.push(format!("m.user_id = ?{}", params.len()));
    }
    if let Some(start) = filter.start_date {
        params.push(Value::Text(format_timestamp(start)));
        clauses.push(format!("m.created_at >= ?{}", params.len()));
    }
    if let Some(end) = filter.end_date {
        params.push(Value::Text(format_timestamp(end)));
        clauses.push(format!("m.created_at <= ?{}", params.len()));
    }

    if clauses.is_empty() {
        (String::new(), params)
    } else {
        (format!("WHERE {}", clauses.join(" AND ")), params)
    }
}

/// Turns free text into an FTS5 expression that requires every term. Terms
/// are quoted so operators and punctuation in user input stay literal.
/// Returns `None` when nothing searchable is left.
fn match_expression(query: &str) -> Option<String> {
    let terms: Vec<String> = query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|term| !term.is_empty())
        .map(|term| format!("\"{}\"", term))
        .collect();

    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" "))
    }
}

/// `updated_at` must move strictly forward even when two writes land in the
/// same microsecond.
fn next_update_stamp(previous: DateTime<Utc>) -> DateTime<Utc> {
    let current = now();
    if current > previous {
        current
    } else {
        previous + Duration::microseconds(1)
    }
}
