/// Errors surfaced by the storage layer.
///
/// # Examples
///
/// ```
/// use vitals_storage::StorageError;
///
/// let err = StorageError::Other("backend offline".to_string());
/// assert!(err.to_string().contains("backend offline"));
/// assert!(!err.is_retryable());
/// ```
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// An underlying SQLite error.
    #[error("storage: SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Snapshot (de)serialization failure for the file backend.
    #[error("storage: snapshot codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O failure while reading or rewriting the on-disk snapshot.
    #[error("storage: I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A batch record failed validation before any write was applied.
    #[error("storage: invalid record: {0}")]
    InvalidRecord(#[from] vitals_common::metric::InvalidMetric),

    /// Generic storage error for cases not covered by other variants.
    #[error("storage: {0}")]
    Other(String),
}

impl StorageError {
    /// Whether the error is connection-class and safe to retry.
    ///
    /// For SQLite that means the database was busy or locked by another
    /// writer; every other failure propagates immediately.
    pub fn is_retryable(&self) -> bool {
        match self {
            StorageError::Sqlite(rusqlite::Error::SqliteFailure(e, _)) => matches!(
                e.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}

/// Convenience `Result` alias for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
