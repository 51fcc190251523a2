//! Database model for categories.

use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use pocketledger_core::categories::Category;
use pocketledger_core::errors::{Error, Result};

use crate::sync::SyncColumns;

#[derive(
    Queryable,
    Identifiable,
    Insertable,
    AsChangeset,
    Selectable,
    Debug,
    Clone,
    Serialize,
    Deserialize,
)]
#[diesel(primary_key(local_id))]
#[diesel(table_name = crate::schema::categories)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[diesel(treat_none_as_null = true)]
pub struct CategoryDB {
    pub local_id: String,
    pub server_id: Option<String>,
    pub owner_id: String,
    pub sync_status: String,
    pub last_sync_attempt: Option<String>,
    pub sync_error: Option<String>,
    pub missing_remotely: bool,
    pub revision: i64,
    pub created_at: String,
    pub updated_at: String,
    pub name: String,
    pub color_hex: String,
    pub icon_name: String,
    pub is_active: bool,
    pub display_order: i32,
}

impl From<&Category> for CategoryDB {
    fn from(category: &Category) -> Self {
        let sync = SyncColumns::from_meta(&category.sync);
        Self {
            local_id: sync.local_id,
            server_id: sync.server_id,
            owner_id: sync.owner_id,
            sync_status: sync.sync_status,
            last_sync_attempt: sync.last_sync_attempt,
            sync_error: sync.sync_error,
            missing_remotely: sync.missing_remotely,
            revision: sync.revision,
            created_at: sync.created_at,
            updated_at: sync.updated_at,
            name: category.name.clone(),
            color_hex: category.color_hex.clone(),
            icon_name: category.icon_name.clone(),
            is_active: category.is_active,
            display_order: category.display_order,
        }
    }
}

impl TryFrom<CategoryDB> for Category {
    type Error = Error;

    fn try_from(db: CategoryDB) -> Result<Self> {
        let sync = SyncColumns {
            local_id: db.local_id,
            server_id: db.server_id,
            owner_id: db.owner_id,
            sync_status: db.sync_status,
            last_sync_attempt: db.last_sync_attempt,
            sync_error: db.sync_error,
            missing_remotely: db.missing_remotely,
            revision: db.revision,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
        .into_meta()?;
        Ok(Category {
            sync,
            name: db.name,
            color_hex: db.color_hex,
            icon_name: db.icon_name,
            is_active: db.is_active,
            display_order: db.display_order,
        })
    }
}
