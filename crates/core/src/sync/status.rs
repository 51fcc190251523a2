//! Per-record sync metadata and the status state machine.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{Error, Result};

/// Lifecycle status of a locally stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Local state not yet confirmed by the backend.
    Pending,
    /// Local state matches what the backend accepted.
    Synced,
    /// Marked for removal, waiting for the backend to confirm.
    PendingDelete,
}

impl SyncStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Synced => "synced",
            Self::PendingDelete => "pending_delete",
        }
    }

    pub fn needs_push(self) -> bool {
        match self {
            Self::Pending | Self::PendingDelete => true,
            Self::Synced => false,
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "pending" => Ok(Self::Pending),
            "synced" => Ok(Self::Synced),
            "pending_delete" => Ok(Self::PendingDelete),
            other => Err(Error::Serialization(format!(
                "Unknown sync status '{}'",
                other
            ))),
        }
    }
}

/// The network step a record needs next, derived from status and identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushAction {
    /// Never reached the backend; drop it locally.
    DeleteLocal,
    DeleteRemote { server_id: String },
    Create,
    Update { server_id: String },
}

/// Identity and sync bookkeeping shared by every synced entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncMetadata {
    pub local_id: String,
    pub server_id: Option<String>,
    pub owner_id: String,
    pub sync_status: SyncStatus,
    pub last_sync_attempt: Option<DateTime<Utc>>,
    pub sync_error: Option<String>,
    /// Set when a full server listing no longer contains this record.
    pub missing_remotely: bool,
    /// Local mutation counter; a push compares it before stamping success.
    pub revision: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SyncMetadata {
    /// Metadata for a record created on this device.
    pub fn new_local(owner_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            local_id: Uuid::new_v4().to_string(),
            server_id: None,
            owner_id: owner_id.into(),
            sync_status: SyncStatus::Pending,
            last_sync_attempt: None,
            sync_error: None,
            missing_remotely: false,
            revision: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Metadata for a record materialized from a server listing.
    pub fn from_server(
        owner_id: impl Into<String>,
        server_id: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            local_id: Uuid::new_v4().to_string(),
            server_id: Some(server_id.into()),
            owner_id: owner_id.into(),
            sync_status: SyncStatus::Synced,
            last_sync_attempt: Some(now),
            sync_error: None,
            missing_remotely: false,
            revision: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_pending_delete(&self) -> bool {
        self.sync_status == SyncStatus::PendingDelete
    }

    /// Identity equivalence: `id` names this record in either namespace.
    pub fn matches_id(&self, id: &str) -> bool {
        self.local_id == id || self.server_id.as_deref() == Some(id)
    }

    pub fn push_action(&self) -> Option<PushAction> {
        match (self.sync_status, self.server_id.as_ref()) {
            (SyncStatus::Synced, _) => None,
            (SyncStatus::PendingDelete, None) => Some(PushAction::DeleteLocal),
            (SyncStatus::PendingDelete, Some(server_id)) => Some(PushAction::DeleteRemote {
                server_id: server_id.clone(),
            }),
            (SyncStatus::Pending, None) => Some(PushAction::Create),
            (SyncStatus::Pending, Some(server_id)) => Some(PushAction::Update {
                server_id: server_id.clone(),
            }),
        }
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.updated_at {
            self.updated_at = now;
        }
        self.revision += 1;
    }

    /// `synced -> pending` (or `pending -> pending`) on a local edit.
    pub fn mark_modified(&mut self, now: DateTime<Utc>) -> Result<()> {
        match self.sync_status {
            SyncStatus::Pending | SyncStatus::Synced => {
                self.sync_status = SyncStatus::Pending;
                self.touch(now);
                Ok(())
            }
            SyncStatus::PendingDelete => Err(Error::NotFound(format!(
                "record '{}' is being deleted",
                self.local_id
            ))),
        }
    }

    /// `synced | pending -> pendingDelete` on a user delete.
    pub fn mark_pending_delete(&mut self, now: DateTime<Utc>) {
        match self.sync_status {
            SyncStatus::Pending | SyncStatus::Synced => {
                self.sync_status = SyncStatus::PendingDelete;
                self.touch(now);
            }
            SyncStatus::PendingDelete => {}
        }
    }

    /// Records the server id without changing status. A second, different
    /// server id is rejected.
    pub fn stamp_server_id(&mut self, server_id: &str) -> Result<()> {
        match self.server_id.as_deref() {
            Some(existing) if existing != server_id => Err(Error::IdentityConflict {
                server_id: server_id.to_string(),
                local_ids: vec![self.local_id.clone()],
            }),
            Some(_) => Ok(()),
            None => {
                self.server_id = Some(server_id.to_string());
                Ok(())
            }
        }
    }

    /// `pending -> synced` after the backend accepted the record.
    pub fn mark_synced(&mut self, server_id: &str, now: DateTime<Utc>) -> Result<()> {
        self.stamp_server_id(server_id)?;
        self.sync_status = SyncStatus::Synced;
        self.sync_error = None;
        self.last_sync_attempt = Some(now);
        self.missing_remotely = false;
        Ok(())
    }

    /// Failed attempt: status is left untouched so the record is retried.
    pub fn mark_failed(&mut self, message: impl Into<String>, now: DateTime<Utc>) {
        self.sync_error = Some(message.into());
        self.last_sync_attempt = Some(now);
    }

    /// Checks the invariants a store must never persist a violation of.
    pub fn validate(&self) -> Result<()> {
        if self.sync_status == SyncStatus::Synced && self.server_id.is_none() {
            return Err(Error::Unexpected(format!(
                "record '{}' is synced without a server id",
                self.local_id
            )));
        }
        if self.owner_id.trim().is_empty() {
            return Err(Error::Unexpected(format!(
                "record '{}' has no owner",
                self.local_id
            )));
        }
        Ok(())
    }
}

/// In-memory view of the coordinator's recent activity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncEngineStatus {
    pub last_push_at: Option<DateTime<Utc>>,
    pub last_pull_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub consecutive_failures: i32,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub last_cycle_duration_ms: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn meta() -> SyncMetadata {
        SyncMetadata::new_local("owner-1", Utc::now())
    }

    #[test]
    fn new_local_record_is_pending_without_server_id() {
        let m = meta();
        assert_eq!(m.sync_status, SyncStatus::Pending);
        assert!(m.server_id.is_none());
        assert_eq!(m.push_action(), Some(PushAction::Create));
    }

    #[test]
    fn server_record_starts_synced() {
        let m = SyncMetadata::from_server("owner-1", "srv-9", Utc::now());
        assert_eq!(m.sync_status, SyncStatus::Synced);
        assert_ne!(m.local_id, "srv-9");
        assert!(m.push_action().is_none());
        assert!(m.validate().is_ok());
    }

    #[test]
    fn modifying_synced_record_regresses_to_pending_and_bumps_updated_at() {
        let mut m = meta();
        let created = m.updated_at;
        m.mark_synced("srv-1", Utc::now()).unwrap();

        m.mark_modified(created + Duration::seconds(5)).unwrap();
        assert_eq!(m.sync_status, SyncStatus::Pending);
        assert!(m.updated_at > created);
        assert_eq!(m.revision, 1);
        assert_eq!(
            m.push_action(),
            Some(PushAction::Update {
                server_id: "srv-1".to_string()
            })
        );
    }

    #[test]
    fn updated_at_never_moves_backwards() {
        let mut m = meta();
        let before = m.updated_at;
        m.mark_modified(before - Duration::seconds(30)).unwrap();
        assert_eq!(m.updated_at, before);
        assert_eq!(m.revision, 1);
    }

    #[test]
    fn pending_delete_rejects_edits() {
        let mut m = meta();
        m.mark_pending_delete(Utc::now());
        assert!(matches!(m.mark_modified(Utc::now()), Err(Error::NotFound(_))));
        assert_eq!(m.push_action(), Some(PushAction::DeleteLocal));
    }

    #[test]
    fn server_id_is_fixed_once_stamped() {
        let mut m = meta();
        m.mark_synced("srv-1", Utc::now()).unwrap();
        let err = m.mark_synced("srv-2", Utc::now()).unwrap_err();
        assert!(matches!(err, Error::IdentityConflict { .. }));
        assert_eq!(m.server_id.as_deref(), Some("srv-1"));
    }

    #[test]
    fn failure_keeps_status_and_records_error() {
        let mut m = meta();
        m.mark_failed("offline", Utc::now());
        assert_eq!(m.sync_status, SyncStatus::Pending);
        assert_eq!(m.sync_error.as_deref(), Some("offline"));

        m.mark_synced("srv-1", Utc::now()).unwrap();
        assert!(m.sync_error.is_none());
    }

    #[test]
    fn matches_either_namespace() {
        let mut m = meta();
        let local = m.local_id.clone();
        m.mark_synced("srv-7", Utc::now()).unwrap();
        assert!(m.matches_id(&local));
        assert!(m.matches_id("srv-7"));
        assert!(!m.matches_id("srv-8"));
    }

    #[test]
    fn status_round_trips_through_text() {
        for status in [
            SyncStatus::Pending,
            SyncStatus::Synced,
            SyncStatus::PendingDelete,
        ] {
            assert_eq!(status.as_str().parse::<SyncStatus>().unwrap(), status);
        }
        assert!("deleted".parse::<SyncStatus>().is_err());
    }

    #[test]
    fn synced_without_server_id_is_invalid() {
        let mut m = meta();
        m.sync_status = SyncStatus::Synced;
        assert!(m.validate().is_err());
    }
}
