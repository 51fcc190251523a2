//! Dual-identifier matching.
//!
//! A record is addressable by its `local_id` (assigned on creation, always
//! present) or by its `server_id` (assigned once the backend accepts it). All
//! matching between the two namespaces goes through [`resolve_single`] so the
//! rule cannot drift between call sites.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{EntityStore, SyncRecord};
use crate::errors::{Error, Result};

/// Picks the one record matching `id` in either namespace.
///
/// Stores pass every candidate row they found for `id`. Two distinct local
/// records matching the same id is an [`Error::IdentityConflict`].
pub fn resolve_single<E: SyncRecord>(id: &str, candidates: Vec<E>) -> Result<Option<E>> {
    let mut matching = candidates
        .into_iter()
        .filter(|record| record.meta().matches_id(id))
        .collect::<Vec<_>>();
    matching.sort_by(|a, b| a.local_id().cmp(b.local_id()));
    matching.dedup_by(|a, b| a.local_id() == b.local_id());

    match matching.len() {
        0 => Ok(None),
        1 => Ok(matching.pop()),
        _ => Err(Error::IdentityConflict {
            server_id: id.to_string(),
            local_ids: matching.iter().map(|r| r.local_id().to_string()).collect(),
        }),
    }
}

/// Server ids claimed by more than one local record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityConflictReport {
    pub server_id: String,
    pub local_ids: Vec<String>,
}

pub fn find_identity_conflicts<E: SyncRecord>(records: &[E]) -> Vec<IdentityConflictReport> {
    let mut owners: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    for record in records {
        if let Some(server_id) = record.meta().server_id.as_deref() {
            owners
                .entry(server_id)
                .or_default()
                .push(record.local_id().to_string());
        }
    }
    owners
        .into_iter()
        .filter(|(_, local_ids)| local_ids.len() > 1)
        .map(|(server_id, local_ids)| IdentityConflictReport {
            server_id: server_id.to_string(),
            local_ids,
        })
        .collect()
}

/// Weak reference to another record by either of its ids.
///
/// The target may not exist locally yet; resolve it at read time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordRef(String);

impl RecordRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn resolve<E: SyncRecord>(&self, store: &dyn EntityStore<E>) -> Result<Option<E>> {
        store.find_by_any_id(&self.0)
    }

    /// The id the backend knows the target by, when it is known locally.
    pub fn server_key<E: SyncRecord>(&self, store: &dyn EntityStore<E>) -> Result<ResolvedRef> {
        Ok(match self.resolve(store)? {
            Some(target) => match target.meta().server_id.clone() {
                Some(server_id) => ResolvedRef::Server(server_id),
                None => ResolvedRef::Unsynced(target.local_id().to_string()),
            },
            None => ResolvedRef::Unknown(self.0.clone()),
        })
    }
}

impl From<String> for RecordRef {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for RecordRef {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Outcome of mapping a [`RecordRef`] onto the server namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedRef {
    Server(String),
    /// Target exists locally but has not reached the backend yet.
    Unsynced(String),
    /// Target is not stored locally; the raw id is all we have.
    Unknown(String),
}
