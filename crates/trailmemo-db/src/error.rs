use rusqlite::ErrorCode;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    #[error("{0} already exists")]
    Conflict(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("database unavailable: {0}")]
    Unavailable(String),

    #[error("corrupt row: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// Maps a uniqueness violation on insert to `Conflict`. Every other
    /// failure, foreign-key violations included, stays a database error.
    pub(crate) fn from_insert(err: rusqlite::Error, what: &str) -> Self {
        if let rusqlite::Error::SqliteFailure(ffi_err, _) = &err {
            if ffi_err.code == ErrorCode::ConstraintViolation
                && matches!(
                    ffi_err.extended_code,
                    rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                        | rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                )
            {
                return StoreError::Conflict(what.to_string());
            }
        }
        StoreError::Sqlite(err)
    }
}
