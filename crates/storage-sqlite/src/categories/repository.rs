use std::sync::Arc;

use async_trait::async_trait;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use log::debug;

use pocketledger_core::categories::Category;
use pocketledger_core::errors::Result;
use pocketledger_core::sync::{
    plan_write, resolve_single, EntityStore, RecordKey, RecordMutation, SyncStatus, WritePlan,
};

use super::model::CategoryDB;
use crate::db::{get_connection, DbPool, WriteHandle};
use crate::errors::{write_error, StorageError};
use crate::schema::categories;
use crate::schema::categories::dsl::*;

pub struct CategoryRepository {
    pool: Arc<DbPool>,
    writer: WriteHandle,
}

impl CategoryRepository {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle) -> Self {
        CategoryRepository { pool, writer }
    }
}

fn into_domain(rows: Vec<CategoryDB>) -> Result<Vec<Category>> {
    rows.into_iter().map(Category::try_from).collect()
}

fn load_local(conn: &mut SqliteConnection, id: &str) -> Result<Option<Category>> {
    categories
        .find(id)
        .select(CategoryDB::as_select())
        .first::<CategoryDB>(conn)
        .optional()
        .map_err(StorageError::from)?
        .map(Category::try_from)
        .transpose()
}

fn load_any(conn: &mut SqliteConnection, id: &str) -> Result<Option<Category>> {
    let rows = categories
        .filter(local_id.eq(id).or(server_id.eq(id)))
        .select(CategoryDB::as_select())
        .load::<CategoryDB>(conn)
        .map_err(StorageError::from)?;
    resolve_single(id, into_domain(rows)?)
}

#[async_trait]
impl EntityStore<Category> for CategoryRepository {
    fn fetch_all(&self, owner: &str) -> Result<Vec<Category>> {
        let mut conn = get_connection(&self.pool)?;
        let rows = categories
            .filter(owner_id.eq(owner))
            .order((created_at.asc(), local_id.asc()))
            .select(CategoryDB::as_select())
            .load::<CategoryDB>(&mut conn)
            .map_err(StorageError::from)?;
        into_domain(rows)
    }

    fn find_by_local_id(&self, id: &str) -> Result<Option<Category>> {
        let mut conn = get_connection(&self.pool)?;
        load_local(&mut conn, id)
    }

    fn find_by_any_id(&self, id: &str) -> Result<Option<Category>> {
        let mut conn = get_connection(&self.pool)?;
        load_any(&mut conn, id)
    }

    fn list_unsynced(&self, owner: &str) -> Result<Vec<Category>> {
        let mut conn = get_connection(&self.pool)?;
        let rows = categories
            .filter(owner_id.eq(owner))
            .filter(sync_status.ne(SyncStatus::Synced.as_str()))
            .order((created_at.asc(), local_id.asc()))
            .select(CategoryDB::as_select())
            .load::<CategoryDB>(&mut conn)
            .map_err(StorageError::from)?;
        into_domain(rows)
    }

    async fn mutate(
        &self,
        key: RecordKey,
        mutation: RecordMutation<Category>,
    ) -> Result<Option<Category>> {
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<Option<Category>> {
                let current = match &key {
                    RecordKey::Local(id) => load_local(conn, id)?,
                    RecordKey::AnyId(id) => load_any(conn, id)?,
                };
                match plan_write(current, mutation)? {
                    WritePlan::Unchanged(record) => Ok(record),
                    WritePlan::Insert(record) => {
                        let row = CategoryDB::from(&record);
                        diesel::insert_into(categories::table)
                            .values(&row)
                            .execute(conn)
                            .map_err(|e| write_error(e, &row.local_id, row.server_id.as_deref()))?;
                        debug!("[Store] category {} inserted", row.local_id);
                        Ok(Some(record))
                    }
                    WritePlan::Update(record) => {
                        let row = CategoryDB::from(&record);
                        diesel::update(categories.find(&row.local_id))
                            .set(&row)
                            .execute(conn)
                            .map_err(|e| write_error(e, &row.local_id, row.server_id.as_deref()))?;
                        Ok(Some(record))
                    }
                    WritePlan::Delete(id) => {
                        diesel::delete(categories.find(&id))
                            .execute(conn)
                            .map_err(StorageError::from)?;
                        debug!("[Store] category {} deleted", id);
                        Ok(None)
                    }
                }
            })
            .await
    }
}
