//! Error types for store operations

use pipe_core::error::ParseVariantError;
use thiserror::Error;

/// Result type alias for store operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors surfaced by the catalog and the ledger
///
/// Nothing is retried inside the store; every variant reaches the caller as is.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Requested key does not exist
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    /// Payload could not be serialized or a stored row could not be decoded
    #[error("failed to encode {entity} {key}: {source}")]
    Encoding {
        entity: &'static str,
        key: String,
        #[source]
        source: CodecError,
    },

    /// Durable read or write failed (I/O, lock wait timeout, constraint)
    #[error("storage failure during {op} of {key}: {source}")]
    Storage {
        op: &'static str,
        key: String,
        #[source]
        source: sqlx::Error,
    },
}

impl StoreError {
    pub fn not_found(entity: &'static str, key: impl ToString) -> Self {
        Self::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    /// Builds a `map_err` adapter tagging a sqlx error with operation and key
    pub fn storage(op: &'static str, key: impl ToString) -> impl FnOnce(sqlx::Error) -> Self {
        let key = key.to_string();
        move |source| Self::Storage { op, key, source }
    }

    /// Builds a `map_err` adapter tagging a codec failure with entity and key
    pub fn encoding<E: Into<CodecError>>(
        entity: &'static str,
        key: impl ToString,
    ) -> impl FnOnce(E) -> Self {
        let key = key.to_string();
        move |source| Self::Encoding {
            entity,
            key,
            source: source.into(),
        }
    }

    /// Check if this error is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Reasons a payload or column failed to round-trip
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("timestamp: {0}")]
    Timestamp(#[from] chrono::ParseError),

    #[error(transparent)]
    Variant(#[from] ParseVariantError),

    #[error("column {0} out of range")]
    OutOfRange(&'static str),
}
