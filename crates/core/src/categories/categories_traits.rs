use async_trait::async_trait;

use super::{Category, CategoryUpdate, NewCategory};
use crate::errors::Result;

/// Category operations exposed to presentation code.
///
/// Mutations are applied locally and return at once; the backend is synced
/// in the background.
#[async_trait]
pub trait CategoryServiceTrait: Send + Sync {
    fn get_category(&self, local_id: &str) -> Result<Option<Category>>;

    /// Categories ordered by `display_order`, then name.
    async fn list_categories(&self, owner_id: &str) -> Result<Vec<Category>>;

    fn list_unsynced(&self, owner_id: &str) -> Result<Vec<Category>>;

    async fn create_category(&self, owner_id: &str, input: NewCategory) -> Result<Category>;

    async fn update_category(&self, local_id: &str, update: CategoryUpdate) -> Result<Category>;

    async fn delete_category(&self, local_id: &str) -> Result<()>;

    /// Assigns `display_order` by position in `ordered_local_ids`.
    async fn reorder_categories(
        &self,
        owner_id: &str,
        ordered_local_ids: Vec<String>,
    ) -> Result<Vec<Category>>;
}
