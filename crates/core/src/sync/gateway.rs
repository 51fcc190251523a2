//! Boundary to the backend and to the host's connectivity signal.

use async_trait::async_trait;

use super::SyncRecord;
use crate::errors::{GatewayError, Result};

pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

/// Remote CRUD for one entity type. Implementations fail rather than hang.
#[async_trait]
pub trait RemoteGateway<E: SyncRecord>: Send + Sync {
    async fn create(&self, payload: &E::Payload) -> GatewayResult<E::Dto>;

    async fn update(&self, server_id: &str, payload: &E::Payload) -> GatewayResult<E::Dto>;

    async fn delete(&self, server_id: &str) -> GatewayResult<()>;

    async fn list_all(&self, owner_id: &str) -> GatewayResult<Vec<E::Dto>>;
}

/// Rewrites an outgoing payload before it is sent (e.g. translating local
/// references into server ids). An error keeps the record pending.
pub trait PayloadResolver<E: SyncRecord>: Send + Sync {
    fn resolve(&self, payload: &mut E::Payload) -> Result<()>;
}

pub trait ConnectivityMonitor: Send + Sync {
    fn is_online(&self) -> bool;
}

/// Default monitor: always tries the network and lets failures speak.
#[derive(Debug, Default, Clone, Copy)]
pub struct AssumeOnline;

impl ConnectivityMonitor for AssumeOnline {
    fn is_online(&self) -> bool {
        true
    }
}
