use rusqlite::Connection;
use tracing::info;

use crate::StoreError;

pub fn run(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| {
            r.get(0)
        })?;

    if version < 1 {
        info!("Running migration v1 (users, memos)");
        conn.execute_batch(
            "
            BEGIN;

            CREATE TABLE users (
                user_id      TEXT PRIMARY KEY,
                email        TEXT NOT NULL UNIQUE,
                display_name TEXT NOT NULL,
                department   TEXT,
                color        TEXT NOT NULL,
                created_at   TEXT NOT NULL
            );

            -- `id` is the storage rowid the text index joins on; `memo_id` is
            -- the public identifier.
            CREATE TABLE memos (
                id                INTEGER PRIMARY KEY,
                memo_id           TEXT NOT NULL UNIQUE,
                user_id           TEXT NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
                user_name         TEXT NOT NULL,
                title             TEXT,
                audio_url         TEXT NOT NULL CHECK (audio_url <> ''),
                text              TEXT NOT NULL,
                duration_seconds  INTEGER NOT NULL DEFAULT 0,
                latitude          REAL,
                longitude         REAL,
                location_accuracy REAL,
                address           TEXT,
                park_name         TEXT,
                created_at        TEXT NOT NULL,
                updated_at        TEXT NOT NULL,
                CHECK ((latitude IS NULL) = (longitude IS NULL))
            );

            CREATE INDEX idx_memos_user_created ON memos(user_id, created_at);
            CREATE INDEX idx_memos_created ON memos(created_at);
            CREATE INDEX idx_memos_location ON memos(latitude, longitude);
            CREATE INDEX idx_memos_park ON memos(park_name);

            CREATE VIRTUAL TABLE memos_fts USING fts5(
                text,
                content = 'memos',
                content_rowid = 'id',
                tokenize = 'porter unicode61'
            );

            CREATE TRIGGER memos_fts_insert AFTER INSERT ON memos BEGIN
                INSERT INTO memos_fts(rowid, text) VALUES (new.id, new.text);
            END;

            CREATE TRIGGER memos_fts_delete AFTER DELETE ON memos BEGIN
                INSERT INTO memos_fts(memos_fts, rowid, text) VALUES ('delete', old.id, old.text);
            END;

            CREATE TRIGGER memos_fts_update AFTER UPDATE OF text ON memos BEGIN
                INSERT INTO memos_fts(memos_fts, rowid, text) VALUES ('delete', old.id, old.text);
                INSERT INTO memos_fts(rowid, text) VALUES (new.id, new.text);
            END;

            INSERT INTO schema_version (version) VALUES (1);

            COMMIT;
            ",
        )?;
    }

    if version < 2 {
        info!("Running migration v2 (memos.user_color)");
        conn.execute_batch(
            "
            BEGIN;
            ALTER TABLE memos ADD COLUMN user_color TEXT NOT NULL DEFAULT '#808080';
            INSERT INTO schema_version (version) VALUES (2);
            COMMIT;
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();
        run(&conn).unwrap();

        let version: i64 = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(version, 2);
    }

    #[test]
    fn unpaired_coordinates_are_rejected() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();
        conn.execute(
            "INSERT INTO users (user_id, email, display_name, color, created_at)
             VALUES ('u1', 'u1@example.com', 'U1', '#000000', '2024-01-01T00:00:00.000000Z')",
            [],
        )
        .unwrap();

        let result = conn.execute(
            "INSERT INTO memos (memo_id, user_id, user_name, audio_url, text, latitude, created_at, updated_at)
             VALUES ('m1', 'u1', 'U1', 'x', 'text', 45.0, 'a', 'a')",
            [],
        );
        assert!(result.is_err());
    }
}
