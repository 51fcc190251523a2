//! Error taxonomy for the sync core.

use thiserror::Error;

use crate::sync::{classify_http_status, SyncRetryClass};

/// Result type alias used throughout the core crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// A record with this local id is already stored.
    #[error("Duplicate local id '{0}'")]
    DuplicateKey(String),

    /// More than one local record claims the same server id.
    #[error("Identity conflict: '{server_id}' is claimed by local records {local_ids:?}")]
    IdentityConflict {
        server_id: String,
        local_ids: Vec<String>,
    },

    #[error("Gateway failure: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("{0}")]
    Internal(String),
}

/// Input rejected before it reaches the store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("'{0}' is not a valid amount")]
    InvalidAmount(String),

    #[error("Amount must be greater than zero")]
    NonPositiveAmount,

    #[error("Field '{0}' must not be empty")]
    EmptyField(&'static str),

    #[error("'{0}' is not a #RRGGBB color")]
    InvalidColor(String),
}

/// Failure reported by a remote gateway call.
///
/// Gateway failures are always recoverable from the caller's point of view:
/// the engine records them on the affected record and retries later.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct GatewayError {
    pub status: Option<u16>,
    pub retry_class: SyncRetryClass,
    pub message: String,
}

impl GatewayError {
    /// Transport-level failure (no response at all). Treated as retryable.
    pub fn unreachable(message: impl Into<String>) -> Self {
        Self {
            status: None,
            retry_class: SyncRetryClass::Retryable,
            message: message.into(),
        }
    }

    /// Failure carrying an HTTP-like status code.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            retry_class: classify_http_status(status),
            message: message.into(),
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            status: None,
            retry_class: SyncRetryClass::Permanent,
            message: message.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.retry_class == SyncRetryClass::Retryable
    }

    /// The remote side reports the record does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self.status, Some(404) | Some(410))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_error_classifies_by_status() {
        assert!(GatewayError::from_status(503, "unavailable").is_retryable());
        assert_eq!(
            GatewayError::from_status(401, "expired").retry_class,
            SyncRetryClass::ReauthRequired
        );
        assert!(!GatewayError::from_status(422, "bad amount").is_retryable());
        assert!(GatewayError::unreachable("connection refused").is_retryable());
    }

    #[test]
    fn not_found_covers_gone() {
        assert!(GatewayError::from_status(404, "missing").is_not_found());
        assert!(GatewayError::from_status(410, "gone").is_not_found());
        assert!(!GatewayError::unreachable("timeout").is_not_found());
    }
}
