use std::sync::atomic::Ordering;
use std::sync::Arc;

use super::*;
use crate::config::SyncConfig;
use crate::errors::{Error, ValidationError};
use crate::sync::testing::{category_gateway, FakeGateway, MemoryStore};
use crate::sync::{ConnectivityMonitor, EntityStore, SyncEngine, SyncStatus};

const OWNER: &str = "owner-1";

struct Offline;

impl ConnectivityMonitor for Offline {
    fn is_online(&self) -> bool {
        false
    }
}

struct Harness {
    store: Arc<MemoryStore<Category>>,
    gateway: Arc<FakeGateway<Category>>,
    service: CategoryService,
}

fn harness_with(config: SyncConfig) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let gateway = Arc::new(category_gateway());
    let engine = Arc::new(SyncEngine::new(store.clone(), gateway.clone(), config));
    Harness {
        store,
        gateway,
        service: CategoryService::new(engine),
    }
}

fn harness() -> Harness {
    harness_with(SyncConfig::default())
}

fn new_category(name: &str) -> NewCategory {
    NewCategory {
        name: name.to_string(),
        color_hex: "#FF9800".to_string(),
        icon_name: "tag".to_string(),
        is_active: true,
        display_order: None,
    }
}

#[tokio::test]
async fn create_returns_pending_and_syncs_in_background() {
    let h = harness();
    let created = h
        .service
        .create_category(OWNER, new_category("Food"))
        .await
        .unwrap();
    assert!(created.sync.server_id.is_none());

    h.service.flush_background().await;
    let stored = h.service.get_category(&created.sync.local_id).unwrap().unwrap();
    assert_eq!(stored.sync.sync_status, SyncStatus::Synced);
    assert!(stored.sync.server_id.is_some());
    assert!(h.service.list_unsynced(OWNER).unwrap().is_empty());
}

#[tokio::test]
async fn invalid_input_is_rejected_before_storage() {
    let h = harness();
    let mut input = new_category("Food");
    input.color_hex = "orange".to_string();

    let err = h.service.create_category(OWNER, input).await.unwrap_err();
    assert!(matches!(
        err,
        Error::Validation(ValidationError::InvalidColor(_))
    ));
    assert_eq!(h.store.len(), 0);
}

#[tokio::test]
async fn new_categories_are_appended_in_order() {
    let h = harness();
    h.gateway.set_offline(true);
    let first = h
        .service
        .create_category(OWNER, new_category("Rent"))
        .await
        .unwrap();
    let second = h
        .service
        .create_category(OWNER, new_category("Coffee"))
        .await
        .unwrap();
    assert_eq!(first.display_order, 0);
    assert_eq!(second.display_order, 1);

    let names = h
        .service
        .list_categories(OWNER)
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.name)
        .collect::<Vec<_>>();
    assert_eq!(names, vec!["Rent", "Coffee"]);
}

#[tokio::test]
async fn list_serves_local_data_when_backend_is_down() {
    let h = harness();
    h.gateway.set_offline(true);
    h.service
        .create_category(OWNER, new_category("Travel"))
        .await
        .unwrap();
    h.service.flush_background().await;

    let listed = h.service.list_categories(OWNER).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(h.service.list_unsynced(OWNER).unwrap().len(), 1);
    assert!(listed[0].sync.sync_error.is_some());
}

#[tokio::test]
async fn offline_monitor_skips_the_network_entirely() {
    let h = harness();
    let service = CategoryService::new(Arc::new(SyncEngine::new(
        h.store.clone(),
        h.gateway.clone(),
        SyncConfig::default(),
    )))
    .with_connectivity(Arc::new(Offline));

    service.list_categories(OWNER).await.unwrap();
    assert_eq!(h.gateway.lists.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn list_pulls_categories_created_elsewhere() {
    let h = harness();
    h.gateway.seed(CategoryDto {
        id: "srv-77".to_string(),
        name: "Gifts".to_string(),
        color_hex: "#E91E63".to_string(),
        icon_name: "gift".to_string(),
        is_active: true,
        display_order: 4,
    });

    let listed = h.service.list_categories(OWNER).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].sync.server_id.as_deref(), Some("srv-77"));
    assert_eq!(listed[0].sync.sync_status, SyncStatus::Synced);
}

#[tokio::test]
async fn update_marks_pending_then_syncs() {
    let h = harness();
    let created = h
        .service
        .create_category(OWNER, new_category("Food"))
        .await
        .unwrap();
    h.service.flush_background().await;

    h.gateway.set_offline(true);
    let updated = h
        .service
        .update_category(
            &created.sync.local_id,
            CategoryUpdate {
                name: Some("Groceries".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.name, "Groceries");
    assert_eq!(updated.sync.sync_status, SyncStatus::Pending);
    h.service.flush_background().await;

    h.gateway.set_offline(false);
    let report = h.service.push_pending(OWNER).await;
    assert_eq!(report.succeeded, 1);
    assert_eq!(h.gateway.server_records()[0].name, "Groceries");
}

#[tokio::test]
async fn delete_hides_record_until_remote_confirms() {
    let h = harness();
    let created = h
        .service
        .create_category(OWNER, new_category("Food"))
        .await
        .unwrap();
    h.service.flush_background().await;

    h.gateway.set_offline(true);
    h.service
        .delete_category(&created.sync.local_id)
        .await
        .unwrap();
    h.service.flush_background().await;
    assert!(h.service.get_category(&created.sync.local_id).unwrap().is_none());
    let queued = h.store.find_by_local_id(&created.sync.local_id).unwrap().unwrap();
    assert_eq!(queued.sync.sync_status, SyncStatus::PendingDelete);

    h.gateway.set_offline(false);
    h.service.push_pending(OWNER).await;
    assert_eq!(h.store.len(), 0);
    assert!(h.gateway.server_records().is_empty());
}

#[tokio::test]
async fn reorder_updates_only_moved_categories() {
    let h = harness_with(SyncConfig {
        pull_before_list: false,
        ..SyncConfig::default()
    });
    h.gateway.set_offline(true);
    let mut ids = Vec::new();
    for name in ["A", "B", "C"] {
        let c = h.service.create_category(OWNER, new_category(name)).await.unwrap();
        ids.push(c.sync.local_id);
    }
    h.service.flush_background().await;
    let before = h.store.find_by_local_id(&ids[0]).unwrap().unwrap();

    let reordered = h
        .service
        .reorder_categories(OWNER, vec![ids[2].clone(), ids[1].clone(), ids[0].clone()])
        .await
        .unwrap();
    let names = reordered.iter().map(|c| c.name.as_str()).collect::<Vec<_>>();
    assert_eq!(names, vec!["C", "B", "A"]);

    let middle = h.store.find_by_local_id(&ids[1]).unwrap().unwrap();
    assert_eq!(middle.display_order, 1);
    let moved = h.store.find_by_local_id(&ids[0]).unwrap().unwrap();
    assert!(moved.sync.revision > before.sync.revision);
}

#[tokio::test]
async fn reorder_rejects_unknown_ids() {
    let h = harness();
    let err = h
        .service
        .reorder_categories(OWNER, vec!["nope".to_string()])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}
