use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use log::{debug, error, warn};

use super::{
    NewTransaction, Transaction, TransactionPayload, TransactionServiceTrait, TransactionUpdate,
};
use crate::categories::Category;
use crate::errors::{Error, Result};
use crate::sync::{
    AssumeOnline, BackgroundTasks, ConnectivityMonitor, DeleteDisposition, EntityStore,
    PayloadResolver, PullSummary, PushReport, RecordRef, ResolvedRef, SyncEngine,
};

/// Rewrites a transaction's category reference into the server namespace.
pub struct CategoryReferenceResolver {
    categories: Arc<dyn EntityStore<Category>>,
}

impl CategoryReferenceResolver {
    pub fn new(categories: Arc<dyn EntityStore<Category>>) -> Self {
        Self { categories }
    }
}

impl PayloadResolver<Transaction> for CategoryReferenceResolver {
    fn resolve(&self, payload: &mut TransactionPayload) -> Result<()> {
        let Some(reference) = payload.category_id.as_deref().map(RecordRef::from) else {
            return Ok(());
        };
        match reference.server_key(self.categories.as_ref())? {
            ResolvedRef::Server(server_id) => payload.category_id = Some(server_id),
            ResolvedRef::Unsynced(local_id) => {
                return Err(Error::Unexpected(format!(
                    "category '{}' is not synced yet",
                    local_id
                )));
            }
            ResolvedRef::Unknown(raw) => {
                debug!("[Sync] category '{}' unknown locally, sent as-is", raw);
            }
        }
        Ok(())
    }
}

pub struct TransactionService {
    engine: Arc<SyncEngine<Transaction>>,
    categories: Arc<SyncEngine<Category>>,
    connectivity: Arc<dyn ConnectivityMonitor>,
    background: BackgroundTasks,
}

impl TransactionService {
    pub fn new(
        engine: Arc<SyncEngine<Transaction>>,
        categories: Arc<SyncEngine<Category>>,
    ) -> Self {
        Self {
            engine,
            categories,
            connectivity: Arc::new(AssumeOnline),
            background: BackgroundTasks::default(),
        }
    }

    pub fn with_connectivity(mut self, connectivity: Arc<dyn ConnectivityMonitor>) -> Self {
        self.connectivity = connectivity;
        self
    }

    pub fn engine(&self) -> &Arc<SyncEngine<Transaction>> {
        &self.engine
    }

    fn schedule_push(&self, local_id: String) {
        let engine = Arc::clone(&self.engine);
        self.background.spawn(async move {
            match engine.push_record(&local_id).await {
                Ok(outcome) => debug!("[Sync] transaction {} push: {:?}", local_id, outcome),
                Err(err) => error!("[Sync] transaction {} push aborted: {}", local_id, err),
            }
        });
    }

    pub async fn push_pending(&self, owner_id: &str) -> PushReport {
        self.engine.push_pending(owner_id).await
    }

    /// Pulls transactions, materializing nested categories first so the
    /// references resolve locally.
    pub async fn pull_remote(&self, owner_id: &str) -> Result<PullSummary> {
        let listing = self.engine.fetch_remote(owner_id).await?;
        for dto in listing.iter().filter_map(|t| t.category.as_ref()) {
            match self.categories.materialize_if_absent(owner_id, dto).await {
                Ok(true) => debug!("[Sync] materialized nested category {}", dto.id),
                Ok(false) => {}
                Err(err) => warn!("[Sync] nested category {} skipped: {}", dto.id, err),
            }
        }
        self.engine.merge_remote(owner_id, listing).await
    }

    /// Best-effort push + pull. Categories go first so references resolve.
    pub async fn refresh(&self, owner_id: &str) {
        if !self.connectivity.is_online() {
            return;
        }
        self.categories.push_pending(owner_id).await;
        self.push_pending(owner_id).await;
        if let Err(err) = self.pull_remote(owner_id).await {
            debug!("[Sync] Serving local transactions, refresh failed: {}", err);
        }
    }

    pub async fn flush_background(&self) {
        self.background.flush().await;
    }

    fn visible(&self, owner_id: &str) -> Result<Vec<Transaction>> {
        let mut transactions = self
            .engine
            .store()
            .fetch_all(owner_id)?
            .into_iter()
            .filter(|t| !t.sync.is_pending_delete())
            .collect::<Vec<_>>();
        transactions.sort_by(|a, b| {
            b.date
                .cmp(&a.date)
                .then_with(|| b.sync.created_at.cmp(&a.sync.created_at))
        });
        Ok(transactions)
    }
}

#[async_trait]
impl TransactionServiceTrait for TransactionService {
    fn get_transaction(&self, local_id: &str) -> Result<Option<Transaction>> {
        Ok(self
            .engine
            .store()
            .find_by_local_id(local_id)?
            .filter(|t| !t.sync.is_pending_delete()))
    }

    async fn list_transactions(&self, owner_id: &str) -> Result<Vec<Transaction>> {
        if self.engine.config().pull_before_list {
            self.refresh(owner_id).await;
        }
        self.visible(owner_id)
    }

    fn list_unsynced(&self, owner_id: &str) -> Result<Vec<Transaction>> {
        self.engine.store().list_unsynced(owner_id)
    }

    async fn create_transaction(
        &self,
        owner_id: &str,
        input: NewTransaction,
    ) -> Result<Transaction> {
        let transaction = input.into_transaction(owner_id, Utc::now())?;
        let stored = self.engine.insert_local(transaction).await?;
        self.schedule_push(stored.sync.local_id.clone());
        Ok(stored)
    }

    async fn update_transaction(
        &self,
        local_id: &str,
        update: TransactionUpdate,
    ) -> Result<Transaction> {
        let update = update.validate()?;
        let stored = self
            .engine
            .modify(local_id, move |transaction| {
                update.apply(transaction);
                Ok(())
            })
            .await?;
        self.schedule_push(stored.sync.local_id.clone());
        Ok(stored)
    }

    async fn delete_transaction(&self, local_id: &str) -> Result<()> {
        match self.engine.mark_for_deletion(local_id).await? {
            DeleteDisposition::Removed => {
                debug!("[Sync] transaction {} removed locally", local_id);
            }
            DeleteDisposition::Queued => self.schedule_push(local_id.to_string()),
        }
        Ok(())
    }

    fn resolve_category(&self, transaction: &Transaction) -> Result<Option<Category>> {
        match &transaction.category_id {
            Some(reference) => reference.resolve(self.categories.store().as_ref()),
            None => Ok(None),
        }
    }
}
