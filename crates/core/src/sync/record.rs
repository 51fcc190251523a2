//! The contract every synced entity implements.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::SyncMetadata;

/// Entity kinds participating in sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Transaction,
    Category,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transaction => f.write_str("transaction"),
            Self::Category => f.write_str("category"),
        }
    }
}

/// A locally stored entity with sync metadata and a server representation.
pub trait SyncRecord: Clone + PartialEq + Send + Sync + 'static {
    /// Server record as returned by the gateway, carrying a canonical `id`.
    type Dto: Clone + Send + Sync + 'static;
    /// Server-authoritative fields sent on create/update.
    type Payload: Clone + Send + Sync + 'static;

    const KIND: RecordKind;

    fn meta(&self) -> &SyncMetadata;
    fn meta_mut(&mut self) -> &mut SyncMetadata;

    fn dto_id(dto: &Self::Dto) -> &str;

    fn to_payload(&self) -> Self::Payload;

    /// Overwrites server-authoritative fields. Never touches identity.
    fn apply_server_fields(&mut self, dto: &Self::Dto);

    /// True when every server-authoritative field already equals `dto`.
    fn matches_server(&self, dto: &Self::Dto) -> bool;

    /// Materializes a new local record from a server record.
    fn from_server(owner_id: &str, dto: &Self::Dto, now: DateTime<Utc>) -> Self;

    fn local_id(&self) -> &str {
        &self.meta().local_id
    }
}
