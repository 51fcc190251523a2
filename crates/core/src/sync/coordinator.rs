//! Sync cycle runner and background loop.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use rand::Rng;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;

use super::{
    backoff_seconds, AssumeOnline, ConnectivityMonitor, SyncCycleMetrics, SyncCycleStatus,
    SyncEngineStatus, SyncRetryClass, SYNC_PENDING_WORK_DELAY_MS, SYNC_REAUTH_RETRY_SECS,
};
use crate::categories::{CategoryService, CategoryServiceTrait};
use crate::config::SyncConfig;
use crate::errors::Error;
use crate::transactions::{TransactionService, TransactionServiceTrait};

pub struct SyncCoordinator {
    categories: Arc<CategoryService>,
    transactions: Arc<TransactionService>,
    connectivity: Arc<dyn ConnectivityMonitor>,
    config: SyncConfig,
    status: Mutex<SyncEngineStatus>,
    cycle_mutex: AsyncMutex<()>,
    background_task: AsyncMutex<Option<JoinHandle<()>>>,
}

impl SyncCoordinator {
    pub fn new(
        categories: Arc<CategoryService>,
        transactions: Arc<TransactionService>,
        config: SyncConfig,
    ) -> Self {
        Self {
            categories,
            transactions,
            connectivity: Arc::new(AssumeOnline),
            config,
            status: Mutex::new(SyncEngineStatus::default()),
            cycle_mutex: AsyncMutex::new(()),
            background_task: AsyncMutex::new(None),
        }
    }

    pub fn with_connectivity(mut self, connectivity: Arc<dyn ConnectivityMonitor>) -> Self {
        self.connectivity = connectivity;
        self
    }

    pub fn status(&self) -> SyncEngineStatus {
        self.status
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Runs one push + pull cycle for `owner_id`. Categories go before
    /// transactions in both directions.
    pub async fn run_cycle(&self, owner_id: &str) -> SyncCycleMetrics {
        let _cycle_guard = self.cycle_mutex.lock().await;
        let started_at = Instant::now();

        if !self.connectivity.is_online() {
            debug!("[Sync] Offline; cycle skipped");
            return SyncCycleMetrics {
                pushed_count: 0,
                pulled_count: 0,
                failed_count: 0,
                duration_ms: started_at.elapsed().as_millis() as i64,
                status: SyncCycleStatus::Offline,
            };
        }

        let category_push = self.categories.push_pending(owner_id).await;
        let transaction_push = self.transactions.push_pending(owner_id).await;
        let pushed_count = category_push.succeeded + transaction_push.succeeded;
        let failed_count = category_push.failed + transaction_push.failed;
        let mut reauth_required =
            category_push.reauth_required + transaction_push.reauth_required > 0;

        let mut pulled_count = 0;
        let mut pull_error = None;
        match self.categories.pull_remote(owner_id).await {
            Ok(summary) => pulled_count += summary.received,
            Err(err) => {
                reauth_required |= requires_reauth(&err);
                pull_error = Some(format!("category pull failed: {}", err));
            }
        }
        if pull_error.is_none() {
            match self.transactions.pull_remote(owner_id).await {
                Ok(summary) => pulled_count += summary.received,
                Err(err) => {
                    reauth_required |= requires_reauth(&err);
                    pull_error = Some(format!("transaction pull failed: {}", err));
                }
            }
        }

        if let Err(err) = self.categories.engine().audit_identities(owner_id) {
            warn!("[Sync] Category identity audit failed: {}", err);
        }
        if let Err(err) = self.transactions.engine().audit_identities(owner_id) {
            warn!("[Sync] Transaction identity audit failed: {}", err);
        }

        let status = match (&pull_error, failed_count) {
            (Some(_), _) => SyncCycleStatus::Failed,
            (None, 0) => SyncCycleStatus::Ok,
            (None, _) => SyncCycleStatus::Partial,
        };
        let duration_ms = started_at.elapsed().as_millis() as i64;
        self.record_cycle(CycleRecord {
            status,
            pushed_count,
            failed_count,
            pull_error,
            reauth_required,
            duration_ms,
        });

        info!(
            "[Sync] Cycle complete status={:?} pushed={} pulled={} failed={} in {}ms",
            status, pushed_count, pulled_count, failed_count, duration_ms
        );
        SyncCycleMetrics {
            pushed_count,
            pulled_count,
            failed_count,
            duration_ms,
            status,
        }
    }

    fn record_cycle(&self, cycle: CycleRecord) {
        let CycleRecord {
            status,
            pushed_count,
            failed_count,
            pull_error,
            reauth_required,
            duration_ms,
        } = cycle;
        let now = Utc::now();
        let mut engine_status = self
            .status
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        engine_status.last_cycle_duration_ms = Some(duration_ms);
        if pushed_count > 0 {
            engine_status.last_push_at = Some(now);
        }
        if pull_error.is_none() {
            engine_status.last_pull_at = Some(now);
        }

        if status == SyncCycleStatus::Ok {
            engine_status.last_error = None;
            engine_status.consecutive_failures = 0;
            engine_status.next_retry_at = None;
            return;
        }

        engine_status.consecutive_failures = engine_status.consecutive_failures.saturating_add(1);
        if reauth_required {
            warn!("[Sync] Auth error during sync; token may need refresh");
            engine_status.next_retry_at =
                Some(now + chrono::Duration::seconds(SYNC_REAUTH_RETRY_SECS));
            engine_status.last_error = Some("Authentication required".to_string());
            return;
        }
        let delay = backoff_seconds(engine_status.consecutive_failures);
        engine_status.next_retry_at = Some(now + chrono::Duration::seconds(delay));
        engine_status.last_error = Some(
            pull_error.unwrap_or_else(|| format!("{} record(s) failed to push", failed_count)),
        );
    }

    /// Starts the periodic loop for `owner_id`. No-op while a loop runs.
    pub async fn start_background(self: &Arc<Self>, owner_id: &str) {
        let mut guard = self.background_task.lock().await;
        if let Some(handle) = guard.as_ref() {
            if !handle.is_finished() {
                return;
            }
            guard.take();
        }

        let coordinator = Arc::clone(self);
        let owner_id = owner_id.to_string();
        let handle = tokio::spawn(async move {
            loop {
                coordinator.run_cycle(&owner_id).await;
                let delay = coordinator.next_delay(&owner_id);
                tokio::time::sleep(delay).await;
            }
        });
        info!("[Sync] Background sync started");
        *guard = Some(handle);
    }

    pub async fn stop_background(&self) {
        let mut guard = self.background_task.lock().await;
        if let Some(handle) = guard.take() {
            handle.abort();
            info!("[Sync] Background sync stopped");
        }
    }

    pub async fn is_background_running(&self) -> bool {
        self.background_task
            .lock()
            .await
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    fn next_delay(&self, owner_id: &str) -> Duration {
        let jitter_bound = self.config.interval_jitter_secs.saturating_mul(1000);
        let jitter_ms = if jitter_bound > 0 {
            rand::thread_rng().gen_range(0..jitter_bound)
        } else {
            0
        };
        let interval_ms = self
            .config
            .foreground_interval_secs
            .saturating_mul(1000)
            .saturating_add(jitter_ms);

        let delay_ms = match self.status().next_retry_at {
            Some(retry_at) => millis_until(retry_at)
                .saturating_add(jitter_ms)
                .max(1_000),
            None if self.has_unsynced(owner_id) => {
                interval_ms.min(SYNC_PENDING_WORK_DELAY_MS + jitter_ms % 500)
            }
            None => interval_ms,
        };
        Duration::from_millis(delay_ms)
    }

    fn has_unsynced(&self, owner_id: &str) -> bool {
        let categories = self.categories.list_unsynced(owner_id);
        let transactions = self.transactions.list_unsynced(owner_id);
        matches!(categories, Ok(c) if !c.is_empty())
            || matches!(transactions, Ok(t) if !t.is_empty())
    }
}

struct CycleRecord {
    status: SyncCycleStatus,
    pushed_count: usize,
    failed_count: usize,
    pull_error: Option<String>,
    reauth_required: bool,
    duration_ms: i64,
}

fn requires_reauth(err: &Error) -> bool {
    matches!(err, Error::Gateway(gateway) if gateway.retry_class == SyncRetryClass::ReauthRequired)
}

fn millis_until(at: DateTime<Utc>) -> u64 {
    (at - Utc::now()).num_milliseconds().max(0) as u64
}
