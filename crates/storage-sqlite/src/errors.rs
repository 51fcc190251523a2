//! Storage errors and their mapping into the core error taxonomy.

use diesel::result::{DatabaseErrorKind, Error as DieselError};
use thiserror::Error;

use pocketledger_core::errors::{DatabaseError, Error};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Connection pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),

    #[error("Connection failed: {0}")]
    Connection(#[from] diesel::ConnectionError),

    #[error("Query failed: {0}")]
    Query(#[from] DieselError),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Invalid stored value: {0}")]
    Corrupt(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<StorageError> for Error {
    fn from(err: StorageError) -> Self {
        let message = err.to_string();
        match err {
            StorageError::Pool(_) | StorageError::Connection(_) => {
                Error::Database(DatabaseError::ConnectionFailed(message))
            }
            StorageError::Query(_) => Error::Database(DatabaseError::QueryFailed(message)),
            StorageError::Migration(_) => Error::Database(DatabaseError::MigrationFailed(message)),
            StorageError::Corrupt(_) | StorageError::Io(_) => {
                Error::Database(DatabaseError::Internal(message))
            }
        }
    }
}

/// Maps a failed insert/update of one record. Unique violations become the
/// identity errors the sync engine understands.
pub(crate) fn write_error(err: DieselError, local_id: &str, server_id: Option<&str>) -> Error {
    if let DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) = &err {
        if info.message().contains("server_id") {
            return Error::IdentityConflict {
                server_id: server_id.unwrap_or_default().to_string(),
                local_ids: vec![local_id.to_string()],
            };
        }
        return Error::DuplicateKey(local_id.to_string());
    }
    StorageError::from(err).into()
}
