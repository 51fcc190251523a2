//! In-memory store and scripted gateway for engine and facade tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use super::{
    plan_write, resolve_single, EntityStore, GatewayResult, RecordKey, RecordMutation,
    RemoteGateway, SyncRecord, WritePlan,
};
use crate::categories::{Category, CategoryDto, CategoryPayload};
use crate::errors::{DatabaseError, Error, GatewayError, Result};
use crate::transactions::{Transaction, TransactionDto, TransactionPayload};

pub struct MemoryStore<E> {
    records: Mutex<HashMap<String, E>>,
    failing_writes: AtomicUsize,
}

impl<E: SyncRecord> MemoryStore<E> {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            failing_writes: AtomicUsize::new(0),
        }
    }

    /// Makes the next `count` writes fail as a broken database would.
    pub fn fail_next_writes(&self, count: usize) {
        self.failing_writes.store(count, Ordering::SeqCst);
    }

    fn records(&self) -> std::sync::MutexGuard<'_, HashMap<String, E>> {
        self.records.lock().unwrap()
    }

    /// Inserts without any invariant check, to stage corrupted states.
    pub fn force_insert(&self, record: E) {
        self.records()
            .insert(record.local_id().to_string(), record);
    }

    pub fn all(&self) -> Vec<E> {
        let mut records = self.records().values().cloned().collect::<Vec<_>>();
        records.sort_by(|a, b| a.local_id().cmp(b.local_id()));
        records
    }

    pub fn len(&self) -> usize {
        self.records().len()
    }

    fn check_server_id(records: &HashMap<String, E>, record: &E) -> Result<()> {
        let Some(server_id) = record.meta().server_id.as_deref() else {
            return Ok(());
        };
        let clash = records.values().find(|other| {
            other.local_id() != record.local_id()
                && other.meta().server_id.as_deref() == Some(server_id)
        });
        match clash {
            Some(other) => Err(Error::IdentityConflict {
                server_id: server_id.to_string(),
                local_ids: vec![other.local_id().to_string(), record.local_id().to_string()],
            }),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl<E: SyncRecord> EntityStore<E> for MemoryStore<E> {
    fn fetch_all(&self, owner_id: &str) -> Result<Vec<E>> {
        Ok(self
            .all()
            .into_iter()
            .filter(|r| r.meta().owner_id == owner_id)
            .collect())
    }

    fn find_by_local_id(&self, local_id: &str) -> Result<Option<E>> {
        Ok(self.records().get(local_id).cloned())
    }

    fn find_by_any_id(&self, id: &str) -> Result<Option<E>> {
        resolve_single(id, self.all())
    }

    fn list_unsynced(&self, owner_id: &str) -> Result<Vec<E>> {
        Ok(self
            .fetch_all(owner_id)?
            .into_iter()
            .filter(|r| r.meta().sync_status.needs_push())
            .collect())
    }

    async fn mutate(&self, key: RecordKey, mutation: RecordMutation<E>) -> Result<Option<E>> {
        let fail = self
            .failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if fail {
            return Err(Error::Database(DatabaseError::QueryFailed(
                "disk I/O error".to_string(),
            )));
        }
        let mut records = self.records();
        let current = match &key {
            RecordKey::Local(id) => records.get(id).cloned(),
            RecordKey::AnyId(id) => resolve_single(id, records.values().cloned().collect())?,
        };
        match plan_write(current, mutation)? {
            WritePlan::Unchanged(record) => Ok(record),
            WritePlan::Insert(record) => {
                if records.contains_key(record.local_id()) {
                    return Err(Error::DuplicateKey(record.local_id().to_string()));
                }
                Self::check_server_id(&records, &record)?;
                records.insert(record.local_id().to_string(), record.clone());
                Ok(Some(record))
            }
            WritePlan::Update(record) => {
                Self::check_server_id(&records, &record)?;
                records.insert(record.local_id().to_string(), record.clone());
                Ok(Some(record))
            }
            WritePlan::Delete(local_id) => {
                records.remove(&local_id);
                Ok(None)
            }
        }
    }
}

/// Blocks a gateway create until released, to interleave other work.
#[derive(Default)]
pub struct Hold {
    pub entered: Notify,
    pub release: Notify,
}

type DtoBuilder<E> = fn(&str, &<E as SyncRecord>::Payload) -> <E as SyncRecord>::Dto;

/// Fake backend. Clones made with [`FakeGateway::share`] see the same data,
/// like two devices talking to one server.
pub struct FakeGateway<E: SyncRecord> {
    server: Arc<Mutex<Vec<E::Dto>>>,
    build: DtoBuilder<E>,
    offline: AtomicBool,
    next_id: Arc<AtomicUsize>,
    hold: Mutex<Option<Arc<Hold>>>,
    ack_hold: Mutex<Option<Arc<Hold>>>,
    failure: Mutex<Option<GatewayError>>,
    pub creates: AtomicUsize,
    pub updates: AtomicUsize,
    pub deletes: AtomicUsize,
    pub lists: AtomicUsize,
    pub payloads: Mutex<Vec<E::Payload>>,
}

impl<E: SyncRecord> FakeGateway<E> {
    pub fn new(build: DtoBuilder<E>) -> Self {
        Self {
            server: Arc::new(Mutex::new(Vec::new())),
            build,
            offline: AtomicBool::new(false),
            next_id: Arc::new(AtomicUsize::new(1)),
            hold: Mutex::new(None),
            ack_hold: Mutex::new(None),
            failure: Mutex::new(None),
            creates: AtomicUsize::new(0),
            updates: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
            lists: AtomicUsize::new(0),
            payloads: Mutex::new(Vec::new()),
        }
    }

    /// A second client of the same server.
    pub fn share(&self) -> Self {
        Self {
            server: Arc::clone(&self.server),
            build: self.build,
            offline: AtomicBool::new(false),
            next_id: Arc::clone(&self.next_id),
            hold: Mutex::new(None),
            ack_hold: Mutex::new(None),
            failure: Mutex::new(None),
            creates: AtomicUsize::new(0),
            updates: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
            lists: AtomicUsize::new(0),
            payloads: Mutex::new(Vec::new()),
        }
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn hold_creates(&self) -> Arc<Hold> {
        let hold = Arc::new(Hold::default());
        *self.hold.lock().unwrap() = Some(Arc::clone(&hold));
        hold
    }

    /// Like [`FakeGateway::hold_creates`], but the server commits the record
    /// before the response is held back.
    pub fn hold_create_acks(&self) -> Arc<Hold> {
        let hold = Arc::new(Hold::default());
        *self.ack_hold.lock().unwrap() = Some(Arc::clone(&hold));
        hold
    }

    /// Every call fails with `error` until cleared.
    pub fn fail_with(&self, error: Option<GatewayError>) {
        *self.failure.lock().unwrap() = error;
    }

    /// Places a record on the server directly, as another client would.
    pub fn seed(&self, dto: E::Dto) {
        self.server.lock().unwrap().push(dto);
    }

    pub fn remove(&self, server_id: &str) {
        self.server
            .lock()
            .unwrap()
            .retain(|dto| E::dto_id(dto) != server_id);
    }

    pub fn server_records(&self) -> Vec<E::Dto> {
        self.server.lock().unwrap().clone()
    }

    fn check_online(&self) -> GatewayResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(GatewayError::unreachable("network unreachable"));
        }
        match self.failure.lock().unwrap().clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl<E: SyncRecord> RemoteGateway<E> for FakeGateway<E> {
    async fn create(&self, payload: &E::Payload) -> GatewayResult<E::Dto> {
        self.check_online()?;
        let hold = self.hold.lock().unwrap().take();
        if let Some(hold) = hold {
            hold.entered.notify_one();
            hold.release.notified().await;
        }
        self.creates.fetch_add(1, Ordering::SeqCst);
        self.payloads.lock().unwrap().push(payload.clone());
        let server_id = format!("srv-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        let dto = (self.build)(&server_id, payload);
        self.server.lock().unwrap().push(dto.clone());
        let ack_hold = self.ack_hold.lock().unwrap().take();
        if let Some(hold) = ack_hold {
            hold.entered.notify_one();
            hold.release.notified().await;
        }
        Ok(dto)
    }

    async fn update(&self, server_id: &str, payload: &E::Payload) -> GatewayResult<E::Dto> {
        self.check_online()?;
        self.updates.fetch_add(1, Ordering::SeqCst);
        self.payloads.lock().unwrap().push(payload.clone());
        let dto = (self.build)(server_id, payload);
        let mut server = self.server.lock().unwrap();
        match server.iter_mut().find(|d| E::dto_id(d) == server_id) {
            Some(existing) => {
                *existing = dto.clone();
                Ok(dto)
            }
            None => Err(GatewayError::from_status(404, "not found")),
        }
    }

    async fn delete(&self, server_id: &str) -> GatewayResult<()> {
        self.check_online()?;
        self.deletes.fetch_add(1, Ordering::SeqCst);
        let mut server = self.server.lock().unwrap();
        let before = server.len();
        server.retain(|dto| E::dto_id(dto) != server_id);
        if server.len() == before {
            return Err(GatewayError::from_status(404, "not found"));
        }
        Ok(())
    }

    async fn list_all(&self, _owner_id: &str) -> GatewayResult<Vec<E::Dto>> {
        self.lists.fetch_add(1, Ordering::SeqCst);
        self.check_online()?;
        Ok(self.server.lock().unwrap().clone())
    }
}

pub fn category_dto(server_id: &str, payload: &CategoryPayload) -> CategoryDto {
    CategoryDto {
        id: server_id.to_string(),
        name: payload.name.clone(),
        color_hex: payload.color_hex.clone(),
        icon_name: payload.icon_name.clone(),
        is_active: payload.is_active,
        display_order: payload.display_order,
    }
}

pub fn transaction_dto(server_id: &str, payload: &TransactionPayload) -> TransactionDto {
    TransactionDto {
        id: server_id.to_string(),
        category_id: payload.category_id.clone(),
        category: None,
        transaction_type: payload.transaction_type,
        amount: payload.amount,
        date: payload.date,
        description: payload.description.clone(),
        ai_confidence: None,
        ai_justification: None,
        needs_user_review: payload.needs_user_review,
    }
}

pub fn category_gateway() -> FakeGateway<Category> {
    FakeGateway::new(category_dto)
}

pub fn transaction_gateway() -> FakeGateway<Transaction> {
    FakeGateway::new(transaction_dto)
}
