//! Wiring of stores, gateways and services for one host process.

use std::sync::Arc;

use crate::categories::{Category, CategoryService, CategoryServiceTrait};
use crate::config::SyncConfig;
use crate::sync::{
    AssumeOnline, ConnectivityMonitor, EntityStore, RemoteGateway, SyncCoordinator, SyncEngine,
};
use crate::transactions::{
    CategoryReferenceResolver, Transaction, TransactionService, TransactionServiceTrait,
};

/// Collaborators the host provides.
pub struct SyncBackends {
    pub category_store: Arc<dyn EntityStore<Category>>,
    pub transaction_store: Arc<dyn EntityStore<Transaction>>,
    pub category_gateway: Arc<dyn RemoteGateway<Category>>,
    pub transaction_gateway: Arc<dyn RemoteGateway<Transaction>>,
    pub connectivity: Option<Arc<dyn ConnectivityMonitor>>,
}

pub struct SyncContext {
    category_service: Arc<CategoryService>,
    transaction_service: Arc<TransactionService>,
    coordinator: Arc<SyncCoordinator>,
}

impl SyncContext {
    pub fn new(backends: SyncBackends, config: SyncConfig) -> Self {
        let connectivity = backends
            .connectivity
            .unwrap_or_else(|| Arc::new(AssumeOnline));

        let category_engine = Arc::new(SyncEngine::new(
            Arc::clone(&backends.category_store),
            backends.category_gateway,
            config.clone(),
        ));
        let transaction_engine = Arc::new(
            SyncEngine::new(
                backends.transaction_store,
                backends.transaction_gateway,
                config.clone(),
            )
            .with_payload_resolver(Arc::new(CategoryReferenceResolver::new(
                backends.category_store,
            ))),
        );

        let category_service = Arc::new(
            CategoryService::new(Arc::clone(&category_engine))
                .with_connectivity(Arc::clone(&connectivity)),
        );
        let transaction_service = Arc::new(
            TransactionService::new(transaction_engine, category_engine)
                .with_connectivity(Arc::clone(&connectivity)),
        );
        let coordinator = Arc::new(
            SyncCoordinator::new(
                Arc::clone(&category_service),
                Arc::clone(&transaction_service),
                config,
            )
            .with_connectivity(connectivity),
        );

        Self {
            category_service,
            transaction_service,
            coordinator,
        }
    }

    pub fn category_service(&self) -> Arc<dyn CategoryServiceTrait> {
        self.category_service.clone()
    }

    pub fn transaction_service(&self) -> Arc<dyn TransactionServiceTrait> {
        self.transaction_service.clone()
    }

    pub fn coordinator(&self) -> Arc<SyncCoordinator> {
        Arc::clone(&self.coordinator)
    }

    /// Waits for every fire-and-forget push issued through the services.
    pub async fn flush_background(&self) {
        self.category_service.flush_background().await;
        self.transaction_service.flush_background().await;
    }
}
