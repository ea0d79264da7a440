use rusqlite::Connection;
use trailmemo_types::models::User;

use crate::models::{NewUser, UserRow, UserUpdate};
use crate::{Database, OptionalExt, StoreError, color, format_timestamp, now};

impl Database {
    /// Registers a user. The color is derived here, once, and never changes.
    pub fn create_user(&self, new_user: &NewUser) -> Result<User, StoreError> {
        let user = User {
            user_id: new_user.user_id.clone(),
            email: new_user.email.clone(),
            display_name: new_user.display_name.clone(),
            department: new_user.department.clone(),
            color: color::derive_color(&new_user.user_id),
            created_at: now(),
        };

        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO users (user_id, email, display_name, department, color, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    &user.user_id,
                    &user.email,
                    &user.display_name,
                    &user.department,
                    &user.color,
                    format_timestamp(user.created_at),
                ],
            )
            .map_err(|e| StoreError::from_insert(e, "user"))?;
            Ok(())
        })?;

        Ok(user)
    }

    pub fn get_user_by_id(&self, user_id: &str) -> Result<Option<User>, StoreError> {
        self.with_conn(|conn| query_user(conn, "user_id", user_id))
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        self.with_conn(|conn| query_user(conn, "email", email))
    }

    /// Overwrites `display_name` and/or `department`. Returns `None` when the
    /// user does not exist.
    pub fn update_user(&self, user_id: &str, update: &UserUpdate) -> Result<Option<User>, StoreError> {
        if update.is_empty() {
            return Err(StoreError::InvalidArgument("no fields to update".into()));
        }

        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE users
                 SET display_name = COALESCE(?1, display_name),
                     department = CASE WHEN ?2 THEN ?3 ELSE department END
                 WHERE user_id = ?4",
                rusqlite::params![
                    &update.display_name,
                    update.department.is_some(),
                    update.department.as_ref().and_then(Option::as_deref),
                    user_id,
                ],
            )?;
            if changed == 0 {
                return Ok(None);
            }
            query_user(conn, "user_id", user_id)
        })
    }

    /// Removes the user and, through the foreign key, every memo they own.
    pub fn delete_user(&self, user_id: &str) -> Result<(), StoreError> {
        self.with_conn_mut(|conn| {
            let deleted = conn.execute("DELETE FROM users WHERE user_id = ?1", [user_id])?;
            if deleted == 0 {
                return Err(StoreError::NotFound);
            }
            Ok(())
        })
    }
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<User>, StoreError> {
    let sql = format!("SELECT {} FROM users WHERE {} = ?1", UserRow::COLUMNS, column);
    let mut stmt = conn.prepare(&sql)?;

    stmt.query_row([value], UserRow::from_row)
        .optional()?
        .map(UserRow::into_user)
        .transpose()
}
