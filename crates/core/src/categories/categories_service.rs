use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use log::{debug, error};

use super::{Category, CategoryServiceTrait, CategoryUpdate, NewCategory};
use crate::errors::{Error, Result};
use crate::sync::{
    AssumeOnline, BackgroundTasks, ConnectivityMonitor, DeleteDisposition, PullSummary,
    PushReport, SyncEngine,
};

pub struct CategoryService {
    engine: Arc<SyncEngine<Category>>,
    connectivity: Arc<dyn ConnectivityMonitor>,
    background: BackgroundTasks,
}

impl CategoryService {
    pub fn new(engine: Arc<SyncEngine<Category>>) -> Self {
        Self {
            engine,
            connectivity: Arc::new(AssumeOnline),
            background: BackgroundTasks::default(),
        }
    }

    pub fn with_connectivity(mut self, connectivity: Arc<dyn ConnectivityMonitor>) -> Self {
        self.connectivity = connectivity;
        self
    }

    pub fn engine(&self) -> &Arc<SyncEngine<Category>> {
        &self.engine
    }

    fn schedule_push(&self, local_id: String) {
        let engine = Arc::clone(&self.engine);
        self.background.spawn(async move {
            match engine.push_record(&local_id).await {
                Ok(outcome) => debug!("[Sync] category {} push: {:?}", local_id, outcome),
                Err(err) => error!("[Sync] category {} push aborted: {}", local_id, err),
            }
        });
    }

    pub async fn push_pending(&self, owner_id: &str) -> PushReport {
        self.engine.push_pending(owner_id).await
    }

    pub async fn pull_remote(&self, owner_id: &str) -> Result<PullSummary> {
        self.engine.pull(owner_id).await
    }

    /// Best-effort push + pull; failures only mean local data is served.
    pub async fn refresh(&self, owner_id: &str) {
        if !self.connectivity.is_online() {
            return;
        }
        self.push_pending(owner_id).await;
        if let Err(err) = self.pull_remote(owner_id).await {
            debug!("[Sync] Serving local categories, refresh failed: {}", err);
        }
    }

    /// Waits for every background push started so far.
    pub async fn flush_background(&self) {
        self.background.flush().await;
    }

    fn visible(&self, owner_id: &str) -> Result<Vec<Category>> {
        let mut categories = self
            .engine
            .store()
            .fetch_all(owner_id)?
            .into_iter()
            .filter(|c| !c.sync.is_pending_delete())
            .collect::<Vec<_>>();
        categories.sort_by(|a, b| {
            a.display_order
                .cmp(&b.display_order)
                .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
        });
        Ok(categories)
    }
}

#[async_trait]
impl CategoryServiceTrait for CategoryService {
    fn get_category(&self, local_id: &str) -> Result<Option<Category>> {
        Ok(self
            .engine
            .store()
            .find_by_local_id(local_id)?
            .filter(|c| !c.sync.is_pending_delete()))
    }

    async fn list_categories(&self, owner_id: &str) -> Result<Vec<Category>> {
        if self.engine.config().pull_before_list {
            self.refresh(owner_id).await;
        }
        self.visible(owner_id)
    }

    fn list_unsynced(&self, owner_id: &str) -> Result<Vec<Category>> {
        self.engine.store().list_unsynced(owner_id)
    }

    async fn create_category(&self, owner_id: &str, input: NewCategory) -> Result<Category> {
        input.validate()?;
        let next_order = self
            .visible(owner_id)?
            .iter()
            .map(|c| c.display_order + 1)
            .max()
            .unwrap_or(0);
        let category = Category::new_local(owner_id, input, next_order, Utc::now());
        let stored = self.engine.insert_local(category).await?;
        self.schedule_push(stored.sync.local_id.clone());
        Ok(stored)
    }

    async fn update_category(&self, local_id: &str, update: CategoryUpdate) -> Result<Category> {
        update.validate()?;
        let stored = self
            .engine
            .modify(local_id, move |category| {
                update.apply(category);
                Ok(())
            })
            .await?;
        self.schedule_push(stored.sync.local_id.clone());
        Ok(stored)
    }

    async fn delete_category(&self, local_id: &str) -> Result<()> {
        match self.engine.mark_for_deletion(local_id).await? {
            DeleteDisposition::Removed => {
                debug!("[Sync] category {} removed locally", local_id);
            }
            DeleteDisposition::Queued => self.schedule_push(local_id.to_string()),
        }
        Ok(())
    }

    async fn reorder_categories(
        &self,
        owner_id: &str,
        ordered_local_ids: Vec<String>,
    ) -> Result<Vec<Category>> {
        let current = self.visible(owner_id)?;
        for id in &ordered_local_ids {
            if !current.iter().any(|c| &c.sync.local_id == id) {
                return Err(Error::NotFound(format!("category '{}'", id)));
            }
        }

        for (position, id) in ordered_local_ids.iter().enumerate() {
            let order = position as i32;
            let unchanged = current
                .iter()
                .any(|c| &c.sync.local_id == id && c.display_order == order);
            if unchanged {
                continue;
            }
            self.engine
                .modify(id, move |category| {
                    category.display_order = order;
                    Ok(())
                })
                .await?;
            self.schedule_push(id.clone());
        }
        self.visible(owner_id)
    }
}
