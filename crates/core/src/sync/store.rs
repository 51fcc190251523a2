//! Entity store contract.
//!
//! The store exclusively owns canonical copies of records. Callers get
//! snapshots back; every change goes through [`EntityStore::mutate`], which a
//! store must run atomically for the addressed record.

use async_trait::async_trait;

use super::SyncRecord;
use crate::errors::{Error, Result};

/// How a mutation addresses its record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordKey {
    Local(String),
    /// Matches `local_id` or `server_id` (see [`super::resolve_single`]).
    AnyId(String),
}

impl RecordKey {
    pub fn id(&self) -> &str {
        match self {
            Self::Local(id) | Self::AnyId(id) => id,
        }
    }
}

/// What a mutation wants done with the record it inspected.
#[derive(Debug, Clone)]
pub enum StoreWrite<E> {
    Keep,
    /// Insert when nothing matched, otherwise replace the matched record.
    Put(E),
    Remove,
}

/// Read-modify-write step executed by the store under its write lock.
pub type RecordMutation<E> = Box<dyn FnOnce(Option<E>) -> Result<StoreWrite<E>> + Send>;

/// Concrete storage operation derived from a [`StoreWrite`].
#[derive(Debug, Clone)]
pub enum WritePlan<E> {
    Unchanged(Option<E>),
    Insert(E),
    Update(E),
    Delete(String),
}

/// Runs `mutation` against `current` and checks the record invariants on the
/// result. Stores execute the returned plan.
pub fn plan_write<E: SyncRecord>(
    current: Option<E>,
    mutation: RecordMutation<E>,
) -> Result<WritePlan<E>> {
    let snapshot = current.clone();
    let write = mutation(current)?;

    match (write, snapshot) {
        (StoreWrite::Keep, snapshot) => Ok(WritePlan::Unchanged(snapshot)),
        (StoreWrite::Remove, None) => Ok(WritePlan::Unchanged(None)),
        (StoreWrite::Remove, Some(existing)) => {
            Ok(WritePlan::Delete(existing.local_id().to_string()))
        }
        (StoreWrite::Put(record), None) => {
            record.meta().validate()?;
            Ok(WritePlan::Insert(record))
        }
        (StoreWrite::Put(record), Some(existing)) => {
            record.meta().validate()?;
            if record.local_id() != existing.local_id() {
                return Err(Error::Unexpected(format!(
                    "local id is immutable ('{}' -> '{}')",
                    existing.local_id(),
                    record.local_id()
                )));
            }
            if let (Some(before), Some(after)) = (
                existing.meta().server_id.as_deref(),
                record.meta().server_id.as_deref(),
            ) {
                if before != after {
                    return Err(Error::IdentityConflict {
                        server_id: after.to_string(),
                        local_ids: vec![existing.local_id().to_string()],
                    });
                }
            }
            Ok(WritePlan::Update(record))
        }
    }
}

#[async_trait]
pub trait EntityStore<E: SyncRecord>: Send + Sync {
    /// All records of this type owned by `owner_id`, including ones marked
    /// for deletion.
    fn fetch_all(&self, owner_id: &str) -> Result<Vec<E>>;

    fn find_by_local_id(&self, local_id: &str) -> Result<Option<E>>;

    /// The record whose `local_id` or `server_id` equals `id`.
    fn find_by_any_id(&self, id: &str) -> Result<Option<E>>;

    /// Records with status `pending` or `pending_delete`.
    fn list_unsynced(&self, owner_id: &str) -> Result<Vec<E>>;

    /// Atomic read-modify-write of one record. Returns the record as stored
    /// afterwards (`None` when absent or removed).
    async fn mutate(&self, key: RecordKey, mutation: RecordMutation<E>) -> Result<Option<E>>;

    async fn insert(&self, record: E) -> Result<E> {
        let local_id = record.local_id().to_string();
        let stored = self
            .mutate(
                RecordKey::Local(local_id.clone()),
                Box::new(move |current: Option<E>| match current {
                    Some(_) => Err(Error::DuplicateKey(record.local_id().to_string())),
                    None => Ok(StoreWrite::Put(record)),
                }),
            )
            .await?;
        stored.ok_or_else(|| Error::Unexpected(format!("insert of '{}' was dropped", local_id)))
    }

    async fn update(&self, record: E) -> Result<E> {
        let local_id = record.local_id().to_string();
        let stored = self
            .mutate(
                RecordKey::Local(local_id.clone()),
                Box::new(move |current: Option<E>| match current {
                    Some(_) => Ok(StoreWrite::Put(record)),
                    None => Err(Error::NotFound(record.local_id().to_string())),
                }),
            )
            .await?;
        stored.ok_or(Error::NotFound(local_id))
    }

    async fn delete(&self, local_id: &str) -> Result<()> {
        let missing = local_id.to_string();
        self.mutate(
            RecordKey::Local(local_id.to_string()),
            Box::new(move |current: Option<E>| match current {
                Some(_) => Ok(StoreWrite::Remove),
                None => Err(Error::NotFound(missing)),
            }),
        )
        .await?;
        Ok(())
    }
}
