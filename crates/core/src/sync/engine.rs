//! Reconciliation engine: pushes local mutations and merges server listings.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use log::{debug, error, info, warn};
use tokio::sync::RwLock;

use super::{
    find_identity_conflicts, EntityStore, IdentityConflictReport, InFlightRegistry,
    PayloadResolver, PushAction, RecordKey, RemoteGateway, StoreWrite, SyncRecord,
    SyncRetryClass, SyncStatus,
};
use crate::config::SyncConfig;
use crate::errors::{Error, Result};

/// Result of pushing one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    /// Nothing to send; the record is already synced.
    Unchanged,
    Created { server_id: String },
    Updated,
    DeletedRemote,
    /// Never reached the backend, removed without a network call.
    DeletedLocal,
    /// Recorded as `sync_error`; retried on the next opportunity.
    Failed {
        message: String,
        retry_class: SyncRetryClass,
    },
    /// A newer local change landed while the push was in flight.
    Requeued,
    /// The record no longer exists locally.
    Vanished,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub requeued: usize,
    /// Failures the backend answered with an authentication error.
    pub reauth_required: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PullSummary {
    pub received: usize,
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub conflicts: usize,
    pub flagged_missing: usize,
}

impl PullSummary {
    pub fn merged(&self) -> usize {
        self.inserted + self.updated
    }
}

/// What a user delete did locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteDisposition {
    /// Never synced: gone immediately.
    Removed,
    /// Marked `pending_delete`; a push will confirm it remotely.
    Queued,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MergeResult {
    Inserted,
    Updated,
    Unchanged,
}

pub struct SyncEngine<E: SyncRecord> {
    store: Arc<dyn EntityStore<E>>,
    gateway: Arc<dyn RemoteGateway<E>>,
    resolver: Option<Arc<dyn PayloadResolver<E>>>,
    in_flight: InFlightRegistry,
    /// Held shared by every push and exclusively by a pull-merge, so a merge
    /// never sees a server record whose create response is still unapplied.
    merge_gate: RwLock<()>,
    config: SyncConfig,
}

impl<E: SyncRecord> SyncEngine<E> {
    pub fn new(
        store: Arc<dyn EntityStore<E>>,
        gateway: Arc<dyn RemoteGateway<E>>,
        config: SyncConfig,
    ) -> Self {
        Self {
            store,
            gateway,
            resolver: None,
            in_flight: InFlightRegistry::new(),
            merge_gate: RwLock::new(()),
            config,
        }
    }

    pub fn with_payload_resolver(mut self, resolver: Arc<dyn PayloadResolver<E>>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn store(&self) -> &Arc<dyn EntityStore<E>> {
        &self.store
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn is_in_flight(&self, local_id: &str) -> bool {
        self.in_flight.is_in_flight(local_id)
    }

    pub async fn insert_local(&self, record: E) -> Result<E> {
        self.store.insert(record).await
    }

    /// Applies a user edit and regresses the record to `pending`.
    pub async fn modify<F>(&self, local_id: &str, edit: F) -> Result<E>
    where
        F: FnOnce(&mut E) -> Result<()> + Send + 'static,
    {
        let now = Utc::now();
        let missing = local_id.to_string();
        let stored = self
            .store
            .mutate(
                RecordKey::Local(local_id.to_string()),
                Box::new(move |current: Option<E>| {
                    let Some(mut record) = current else {
                        return Err(Error::NotFound(missing));
                    };
                    record.meta_mut().mark_modified(now)?;
                    edit(&mut record)?;
                    Ok(StoreWrite::Put(record))
                }),
            )
            .await?;
        stored.ok_or_else(|| Error::NotFound(local_id.to_string()))
    }

    /// User delete. Records that never reached the backend (and have no push
    /// in flight that could still create them) are removed outright.
    pub async fn mark_for_deletion(&self, local_id: &str) -> Result<DeleteDisposition> {
        let in_flight = self.in_flight.is_in_flight(local_id);
        let now = Utc::now();
        let missing = local_id.to_string();
        let stored = self
            .store
            .mutate(
                RecordKey::Local(local_id.to_string()),
                Box::new(move |current: Option<E>| {
                    let Some(mut record) = current else {
                        return Err(Error::NotFound(missing));
                    };
                    if record.meta().server_id.is_none() && !in_flight {
                        return Ok(StoreWrite::Remove);
                    }
                    record.meta_mut().mark_pending_delete(now);
                    Ok(StoreWrite::Put(record))
                }),
            )
            .await?;

        Ok(match stored {
            None => DeleteDisposition::Removed,
            Some(_) => DeleteDisposition::Queued,
        })
    }

    /// Pushes one record, serialized against any other sync of the same id.
    pub async fn push_record(&self, local_id: &str) -> Result<PushOutcome> {
        let _gate = self.merge_gate.read().await;
        let _guard = self.in_flight.acquire(local_id).await;
        let passes = self.config.max_push_passes.max(1);

        let mut outcome = PushOutcome::Unchanged;
        for pass in 1..=passes {
            outcome = match self.push_once(local_id).await {
                Ok(outcome) => outcome,
                Err(err) => {
                    if let Err(stamp_err) = self.stamp_failure(local_id, &err.to_string()).await {
                        warn!(
                            "[Sync] Could not record failure on {} {}: {}",
                            E::KIND,
                            local_id,
                            stamp_err
                        );
                    }
                    return Err(err);
                }
            };
            if outcome != PushOutcome::Requeued {
                break;
            }
            debug!(
                "[Sync] {} {} changed during push (pass {}/{})",
                E::KIND,
                local_id,
                pass,
                passes
            );
        }
        Ok(outcome)
    }

    /// Pushes every `pending`/`pending_delete` record of the owner. Distinct
    /// records are pushed concurrently.
    pub async fn push_pending(&self, owner_id: &str) -> PushReport {
        let pending = match self.store.list_unsynced(owner_id) {
            Ok(records) => records,
            Err(err) => {
                error!("[Sync] Failed to list unsynced {} records: {}", E::KIND, err);
                return PushReport::default();
            }
        };

        let outcomes = join_all(pending.iter().map(|r| self.push_record(r.local_id()))).await;

        let mut report = PushReport::default();
        for (record, outcome) in pending.iter().zip(outcomes) {
            report.attempted += 1;
            match outcome {
                Ok(PushOutcome::Failed { retry_class, .. }) => {
                    report.failed += 1;
                    if retry_class == SyncRetryClass::ReauthRequired {
                        report.reauth_required += 1;
                    }
                }
                Ok(PushOutcome::Requeued) => report.requeued += 1,
                Ok(PushOutcome::Unchanged) | Ok(PushOutcome::Vanished) => {}
                Ok(_) => report.succeeded += 1,
                Err(err) => {
                    error!(
                        "[Sync] {} {} push aborted: {}",
                        E::KIND,
                        record.local_id(),
                        err
                    );
                    report.failed += 1;
                }
            }
        }
        report
    }

    async fn push_once(&self, local_id: &str) -> Result<PushOutcome> {
        let Some(snapshot) = self.store.find_by_local_id(local_id)? else {
            return Ok(PushOutcome::Vanished);
        };
        let Some(action) = snapshot.meta().push_action() else {
            return Ok(PushOutcome::Unchanged);
        };

        match action {
            PushAction::DeleteLocal => {
                self.remove_local(local_id).await?;
                debug!("[Sync] {} {} removed locally", E::KIND, local_id);
                Ok(PushOutcome::DeletedLocal)
            }
            PushAction::DeleteRemote { server_id } => {
                match self.gateway.delete(&server_id).await {
                    Ok(()) => {}
                    Err(err) if err.is_not_found() => {
                        debug!(
                            "[Sync] {} {} already absent remotely",
                            E::KIND,
                            server_id
                        );
                    }
                    Err(err) => {
                        return self
                            .record_failure(local_id, &err.to_string(), err.retry_class)
                            .await
                    }
                }
                self.remove_local(local_id).await?;
                debug!("[Sync] {} {} deleted remotely", E::KIND, server_id);
                Ok(PushOutcome::DeletedRemote)
            }
            PushAction::Create => {
                let payload = match self.prepare_payload(&snapshot) {
                    Ok(payload) => payload,
                    Err(err) => {
                        return self
                            .record_failure(local_id, &err.to_string(), SyncRetryClass::Retryable)
                            .await
                    }
                };
                match self.gateway.create(&payload).await {
                    Ok(dto) => self.apply_push_success(&snapshot, dto, true).await,
                    Err(err) => {
                        self.record_failure(local_id, &err.to_string(), err.retry_class)
                            .await
                    }
                }
            }
            PushAction::Update { server_id } => {
                let payload = match self.prepare_payload(&snapshot) {
                    Ok(payload) => payload,
                    Err(err) => {
                        return self
                            .record_failure(local_id, &err.to_string(), SyncRetryClass::Retryable)
                            .await
                    }
                };
                match self.gateway.update(&server_id, &payload).await {
                    Ok(dto) => self.apply_push_success(&snapshot, dto, false).await,
                    Err(err) => {
                        self.record_failure(local_id, &err.to_string(), err.retry_class)
                            .await
                    }
                }
            }
        }
    }

    fn prepare_payload(&self, record: &E) -> Result<E::Payload> {
        let mut payload = record.to_payload();
        if let Some(resolver) = &self.resolver {
            resolver.resolve(&mut payload)?;
        }
        Ok(payload)
    }

    /// Stamps a gateway success, unless the record moved on since `snapshot`
    /// was taken: then only the server id is kept and the push is re-queued.
    async fn apply_push_success(
        &self,
        snapshot: &E,
        dto: E::Dto,
        created: bool,
    ) -> Result<PushOutcome> {
        let server_id = E::dto_id(&dto).to_string();
        let expected_revision = snapshot.meta().revision;
        let expected_status = snapshot.meta().sync_status;
        let now = Utc::now();
        let stamped_id = server_id.clone();

        let stored = self
            .store
            .mutate(
                RecordKey::Local(snapshot.local_id().to_string()),
                Box::new(move |current: Option<E>| {
                    let Some(mut record) = current else {
                        return Ok(StoreWrite::Keep);
                    };
                    let stale = record.meta().revision != expected_revision
                        || record.meta().sync_status != expected_status;
                    if stale {
                        let meta = record.meta_mut();
                        meta.stamp_server_id(&stamped_id)?;
                        meta.sync_error = None;
                        meta.last_sync_attempt = Some(now);
                    } else {
                        record.apply_server_fields(&dto);
                        record.meta_mut().mark_synced(&stamped_id, now)?;
                    }
                    Ok(StoreWrite::Put(record))
                }),
            )
            .await?;

        match stored {
            None => {
                if created {
                    self.discard_orphan(snapshot.local_id(), &server_id).await;
                }
                Ok(PushOutcome::Vanished)
            }
            Some(record) if record.meta().sync_status == SyncStatus::Synced => {
                debug!(
                    "[Sync] {} {} synced as {}",
                    E::KIND,
                    record.local_id(),
                    server_id
                );
                Ok(if created {
                    PushOutcome::Created { server_id }
                } else {
                    PushOutcome::Updated
                })
            }
            Some(_) => Ok(PushOutcome::Requeued),
        }
    }

    /// The record was deleted locally while its create was in flight.
    async fn discard_orphan(&self, local_id: &str, server_id: &str) {
        warn!(
            "[Sync] {} {} vanished during create; deleting orphan {}",
            E::KIND,
            local_id,
            server_id
        );
        if let Err(err) = self.gateway.delete(server_id).await {
            warn!(
                "[Sync] Could not delete orphan {} {}: {}",
                E::KIND,
                server_id,
                err
            );
        }
    }

    async fn record_failure(
        &self,
        local_id: &str,
        message: &str,
        retry_class: SyncRetryClass,
    ) -> Result<PushOutcome> {
        match retry_class {
            SyncRetryClass::ReauthRequired => warn!(
                "[Sync] Auth error pushing {} {}; token may need refresh: {}",
                E::KIND,
                local_id,
                message
            ),
            SyncRetryClass::Permanent => warn!(
                "[Sync] Backend rejected {} {}; kept pending for review: {}",
                E::KIND,
                local_id,
                message
            ),
            SyncRetryClass::Retryable => {
                warn!("[Sync] {} {} push failed: {}", E::KIND, local_id, message)
            }
        }
        self.stamp_failure(local_id, message).await?;
        Ok(PushOutcome::Failed {
            message: message.to_string(),
            retry_class,
        })
    }

    /// Leaves `sync_error` and `last_sync_attempt` on the record.
    async fn stamp_failure(&self, local_id: &str, message: &str) -> Result<()> {
        let now = Utc::now();
        let error_text = message.to_string();
        self.store
            .mutate(
                RecordKey::Local(local_id.to_string()),
                Box::new(move |current: Option<E>| match current {
                    Some(mut record) => {
                        record.meta_mut().mark_failed(error_text, now);
                        Ok(StoreWrite::Put(record))
                    }
                    None => Ok(StoreWrite::Keep),
                }),
            )
            .await?;
        Ok(())
    }

    async fn remove_local(&self, local_id: &str) -> Result<()> {
        self.store
            .mutate(
                RecordKey::Local(local_id.to_string()),
                Box::new(|current: Option<E>| {
                    Ok(match current {
                        Some(_) => StoreWrite::Remove,
                        None => StoreWrite::Keep,
                    })
                }),
            )
            .await?;
        Ok(())
    }

    /// Lists the owner's records on the backend.
    pub async fn fetch_remote(&self, owner_id: &str) -> Result<Vec<E::Dto>> {
        self.gateway.list_all(owner_id).await.map_err(|err| {
            warn!("[Sync] Listing {} records failed: {}", E::KIND, err);
            Error::Gateway(err)
        })
    }

    /// Fetches and merges the owner's server listing.
    pub async fn pull(&self, owner_id: &str) -> Result<PullSummary> {
        let listing = self.fetch_remote(owner_id).await?;
        self.merge_remote(owner_id, listing).await
    }

    /// Pull-merge of a complete server listing. Idempotent.
    pub async fn merge_remote(&self, owner_id: &str, listing: Vec<E::Dto>) -> Result<PullSummary> {
        let _gate = self.merge_gate.write().await;
        let now = Utc::now();
        let mut summary = PullSummary {
            received: listing.len(),
            ..PullSummary::default()
        };
        let mut seen = HashSet::new();

        for dto in listing {
            let server_id = E::dto_id(&dto).to_string();
            if !seen.insert(server_id.clone()) {
                warn!("[Sync] Duplicate {} {} in server listing", E::KIND, server_id);
                continue;
            }
            match self.merge_one(owner_id, dto, now).await {
                Ok(MergeResult::Inserted) => summary.inserted += 1,
                Ok(MergeResult::Updated) => summary.updated += 1,
                Ok(MergeResult::Unchanged) => summary.unchanged += 1,
                Err(Error::IdentityConflict {
                    server_id,
                    local_ids,
                }) => {
                    error!(
                        "[Sync] Identity conflict on {} {}: local records {:?} need manual resolution",
                        E::KIND,
                        server_id,
                        local_ids
                    );
                    summary.conflicts += 1;
                }
                Err(err) => return Err(err),
            }
        }

        if self.config.flag_missing_remote {
            summary.flagged_missing = self.flag_missing(owner_id, &seen).await?;
        }

        info!(
            "[Sync] Merged {} listing: {} inserted, {} updated, {} unchanged, {} missing remotely",
            E::KIND,
            summary.inserted,
            summary.updated,
            summary.unchanged,
            summary.flagged_missing
        );
        Ok(summary)
    }

    async fn merge_one(
        &self,
        owner_id: &str,
        dto: E::Dto,
        now: DateTime<Utc>,
    ) -> Result<MergeResult> {
        let server_id = E::dto_id(&dto).to_string();

        // No push runs while the merge gate is held exclusively.
        let before = self.store.find_by_any_id(&server_id)?;

        let candidate = E::from_server(owner_id, &dto, now);
        let candidate_id = candidate.local_id().to_string();
        let owner = owner_id.to_string();
        let matched_id = server_id.clone();

        let stored = self
            .store
            .mutate(
                RecordKey::AnyId(server_id),
                Box::new(move |current: Option<E>| {
                    let Some(mut record) = current else {
                        return Ok(StoreWrite::Put(candidate));
                    };
                    if record.meta().owner_id != owner {
                        return Err(Error::IdentityConflict {
                            server_id: matched_id,
                            local_ids: vec![record.local_id().to_string()],
                        });
                    }
                    let meta = record.meta();
                    let current_match = meta.sync_status == SyncStatus::Synced
                        && meta.server_id.as_deref() == Some(matched_id.as_str())
                        && !meta.missing_remotely
                        && record.matches_server(&dto);
                    if current_match {
                        return Ok(StoreWrite::Keep);
                    }
                    match record.meta().sync_status {
                        // A pending delete outranks whatever the server still holds.
                        SyncStatus::PendingDelete => {
                            record.meta_mut().stamp_server_id(&matched_id)?;
                        }
                        SyncStatus::Pending | SyncStatus::Synced => {
                            record.apply_server_fields(&dto);
                            record.meta_mut().mark_synced(&matched_id, now)?;
                        }
                    }
                    Ok(StoreWrite::Put(record))
                }),
            )
            .await?;

        Ok(match stored {
            Some(record) if record.local_id() == candidate_id => MergeResult::Inserted,
            Some(record) if before.as_ref() == Some(&record) => MergeResult::Unchanged,
            Some(_) => MergeResult::Updated,
            None => MergeResult::Unchanged,
        })
    }

    async fn flag_missing(&self, owner_id: &str, seen: &HashSet<String>) -> Result<usize> {
        let mut flagged = 0;
        for record in self.store.fetch_all(owner_id)? {
            let meta = record.meta();
            let Some(server_id) = meta.server_id.as_deref() else {
                continue;
            };
            if seen.contains(server_id)
                || meta.sync_status != SyncStatus::Synced
                || meta.missing_remotely
            {
                continue;
            }

            let stored = self
                .store
                .mutate(
                    RecordKey::Local(record.local_id().to_string()),
                    Box::new(|current: Option<E>| {
                        Ok(match current {
                            Some(mut r)
                                if r.meta().sync_status == SyncStatus::Synced
                                    && !r.meta().missing_remotely =>
                            {
                                r.meta_mut().missing_remotely = true;
                                StoreWrite::Put(r)
                            }
                            _ => StoreWrite::Keep,
                        })
                    }),
                )
                .await?;
            if stored.map(|r| r.meta().missing_remotely).unwrap_or(false) {
                info!(
                    "[Sync] {} {} is missing from the server listing; flagged for review",
                    E::KIND,
                    server_id
                );
                flagged += 1;
            }
        }
        Ok(flagged)
    }

    /// Inserts a server record as `synced` unless something local already
    /// answers to its id. Returns whether a record was inserted.
    pub async fn materialize_if_absent(&self, owner_id: &str, dto: &E::Dto) -> Result<bool> {
        let _gate = self.merge_gate.write().await;
        let candidate = E::from_server(owner_id, dto, Utc::now());
        let candidate_id = candidate.local_id().to_string();
        let stored = self
            .store
            .mutate(
                RecordKey::AnyId(E::dto_id(dto).to_string()),
                Box::new(move |current: Option<E>| {
                    Ok(match current {
                        Some(_) => StoreWrite::Keep,
                        None => StoreWrite::Put(candidate),
                    })
                }),
            )
            .await?;
        Ok(stored
            .map(|record| record.local_id() == candidate_id)
            .unwrap_or(false))
    }

    /// Server ids claimed by more than one local record of this owner.
    pub fn audit_identities(&self, owner_id: &str) -> Result<Vec<IdentityConflictReport>> {
        let records = self.store.fetch_all(owner_id)?;
        let conflicts = find_identity_conflicts(&records);
        for conflict in &conflicts {
            error!(
                "[Sync] {} {} is claimed by {:?}",
                E::KIND,
                conflict.server_id,
                conflict.local_ids
            );
        }
        Ok(conflicts)
    }
}
