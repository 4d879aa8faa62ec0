//! Store error type.

/// Errors raised by the bucket store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),

    #[error("no bucket: {0}")]
    NoBucket(String),

    #[error("not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("encoding error: {0}")]
    Encoding(String),
}

impl StoreError {
    /// True for the "session was never created" family of errors.
    pub fn is_missing(&self) -> bool {
        matches!(self, Self::NoBucket(_) | Self::NotFound { .. })
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

impl From<std::string::FromUtf8Error> for StoreError {
    fn from(e: std::string::FromUtf8Error) -> Self {
        StoreError::Encoding(e.to_string())
    }
}
