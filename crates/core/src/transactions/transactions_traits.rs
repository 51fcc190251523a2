use async_trait::async_trait;

use super::{NewTransaction, Transaction, TransactionUpdate};
use crate::categories::Category;
use crate::errors::Result;

/// Transaction operations exposed to presentation code.
#[async_trait]
pub trait TransactionServiceTrait: Send + Sync {
    fn get_transaction(&self, local_id: &str) -> Result<Option<Transaction>>;

    /// Transactions ordered by date, newest first.
    async fn list_transactions(&self, owner_id: &str) -> Result<Vec<Transaction>>;

    fn list_unsynced(&self, owner_id: &str) -> Result<Vec<Transaction>>;

    async fn create_transaction(
        &self,
        owner_id: &str,
        input: NewTransaction,
    ) -> Result<Transaction>;

    async fn update_transaction(
        &self,
        local_id: &str,
        update: TransactionUpdate,
    ) -> Result<Transaction>;

    async fn delete_transaction(&self, local_id: &str) -> Result<()>;

    /// The category a transaction points at, if it is stored locally.
    fn resolve_category(&self, transaction: &Transaction) -> Result<Option<Category>>;
}
