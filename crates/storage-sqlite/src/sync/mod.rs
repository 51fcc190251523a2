//! Column encoding shared by the record tables.

use chrono::{DateTime, SecondsFormat, Utc};

use pocketledger_core::errors::Result;
use pocketledger_core::sync::{SyncMetadata, SyncStatus};

use crate::errors::StorageError;

pub(crate) fn enum_to_db<T: serde::Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?.trim_matches('"').to_string())
}

pub(crate) fn enum_from_db<T: serde::de::DeserializeOwned>(value: &str) -> Result<T> {
    Ok(serde_json::from_str(&format!("\"{}\"", value))?)
}

/// Fixed-width RFC 3339, so text order is time order.
pub(crate) fn timestamp_to_db(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub(crate) fn timestamp_from_db(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::Corrupt(format!("timestamp '{}': {}", value, e)).into())
}

/// Metadata columns as stored in every record table.
pub(crate) struct SyncColumns {
    pub local_id: String,
    pub server_id: Option<String>,
    pub owner_id: String,
    pub sync_status: String,
    pub last_sync_attempt: Option<String>,
    pub sync_error: Option<String>,
    pub missing_remotely: bool,
    pub revision: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl SyncColumns {
    pub fn from_meta(meta: &SyncMetadata) -> Self {
        Self {
            local_id: meta.local_id.clone(),
            server_id: meta.server_id.clone(),
            owner_id: meta.owner_id.clone(),
            sync_status: meta.sync_status.as_str().to_string(),
            last_sync_attempt: meta.last_sync_attempt.as_ref().map(timestamp_to_db),
            sync_error: meta.sync_error.clone(),
            missing_remotely: meta.missing_remotely,
            revision: meta.revision,
            created_at: timestamp_to_db(&meta.created_at),
            updated_at: timestamp_to_db(&meta.updated_at),
        }
    }

    pub fn into_meta(self) -> Result<SyncMetadata> {
        Ok(SyncMetadata {
            local_id: self.local_id,
            server_id: self.server_id,
            owner_id: self.owner_id,
            sync_status: self.sync_status.parse::<SyncStatus>()?,
            last_sync_attempt: self
                .last_sync_attempt
                .as_deref()
                .map(timestamp_from_db)
                .transpose()?,
            sync_error: self.sync_error,
            missing_remotely: self.missing_remotely,
            revision: self.revision,
            created_at: timestamp_from_db(&self.created_at)?,
            updated_at: timestamp_from_db(&self.updated_at)?,
        })
    }
}
