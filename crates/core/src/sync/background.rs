use std::future::Future;
use std::sync::Mutex;

use log::warn;
use tokio::task::JoinHandle;

/// Fire-and-forget pushes started by the facades.
#[derive(Debug, Default)]
pub struct BackgroundTasks {
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl BackgroundTasks {
    /// Spawns `task` on the current runtime. Outside a runtime the task is
    /// dropped; the record stays pending for the next sync cycle.
    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime.spawn(task),
            Err(_) => {
                warn!("[Sync] No async runtime; background push deferred to next cycle");
                return;
            }
        };
        let mut handles = self
            .handles
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        handles.retain(|h| !h.is_finished());
        handles.push(handle);
    }

    /// Waits until every task spawned so far (and any spawned meanwhile) ends.
    pub async fn flush(&self) {
        loop {
            let pending = {
                let mut handles = self
                    .handles
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                std::mem::take(&mut *handles)
            };
            if pending.is_empty() {
                return;
            }
            for handle in pending {
                if let Err(err) = handle.await {
                    warn!("[Sync] Background task failed: {}", err);
                }
            }
        }
    }
}
