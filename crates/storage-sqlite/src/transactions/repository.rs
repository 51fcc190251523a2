use std::sync::Arc;

use async_trait::async_trait;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use log::debug;

use pocketledger_core::transactions::Transaction;
use pocketledger_core::errors::Result;
use pocketledger_core::sync::{
    plan_write, resolve_single, EntityStore, RecordKey, RecordMutation, SyncStatus, WritePlan,
};

use super::model::TransactionDB;
use crate::db::{get_connection, DbPool, WriteHandle};
use crate::errors::{write_error, StorageError};
use crate::schema::transactions;
use crate::schema::transactions::dsl::*;

pub struct TransactionRepository {
    pool: Arc<DbPool>,
    writer: WriteHandle,
}

impl TransactionRepository {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle) -> Self {
        TransactionRepository { pool, writer }
    }
}

fn into_domain(rows: Vec<TransactionDB>) -> Result<Vec<Transaction>> {
    rows.into_iter().map(Transaction::try_from).collect()
}

fn load_local(conn: &mut SqliteConnection, id: &str) -> Result<Option<Transaction>> {
    transactions
        .find(id)
        .select(TransactionDB::as_select())
        .first::<TransactionDB>(conn)
        .optional()
        .map_err(StorageError::from)?
        .map(Transaction::try_from)
        .transpose()
}

fn load_any(conn: &mut SqliteConnection, id: &str) -> Result<Option<Transaction>> {
    let rows = transactions
        .filter(local_id.eq(id).or(server_id.eq(id)))
        .select(TransactionDB::as_select())
        .load::<TransactionDB>(conn)
        .map_err(StorageError::from)?;
    resolve_single(id, into_domain(rows)?)
}

#[async_trait]
impl EntityStore<Transaction> for TransactionRepository {
    fn fetch_all(&self, owner: &str) -> Result<Vec<Transaction>> {
        let mut conn = get_connection(&self.pool)?;
        let rows = transactions
            .filter(owner_id.eq(owner))
            .order((created_at.asc(), local_id.asc()))
            .select(TransactionDB::as_select())
            .load::<TransactionDB>(&mut conn)
            .map_err(StorageError::from)?;
        into_domain(rows)
    }

    fn find_by_local_id(&self, id: &str) -> Result<Option<Transaction>> {
        let mut conn = get_connection(&self.pool)?;
        load_local(&mut conn, id)
    }

    fn find_by_any_id(&self, id: &str) -> Result<Option<Transaction>> {
        let mut conn = get_connection(&self.pool)?;
        load_any(&mut conn, id)
    }

    fn list_unsynced(&self, owner: &str) -> Result<Vec<Transaction>> {
        let mut conn = get_connection(&self.pool)?;
        let rows = transactions
            .filter(owner_id.eq(owner))
            .filter(sync_status.ne(SyncStatus::Synced.as_str()))
            .order((created_at.asc(), local_id.asc()))
            .select(TransactionDB::as_select())
            .load::<TransactionDB>(&mut conn)
            .map_err(StorageError::from)?;
        into_domain(rows)
    }

    async fn mutate(
        &self,
        key: RecordKey,
        mutation: RecordMutation<Transaction>,
    ) -> Result<Option<Transaction>> {
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<Option<Transaction>> {
                let current = match &key {
                    RecordKey::Local(id) => load_local(conn, id)?,
                    RecordKey::AnyId(id) => load_any(conn, id)?,
                };
                match plan_write(current, mutation)? {
                    WritePlan::Unchanged(record) => Ok(record),
                    WritePlan::Insert(record) => {
                        let row = TransactionDB::try_from(&record)?;
                        diesel::insert_into(transactions::table)
                            .values(&row)
                            .execute(conn)
                            .map_err(|e| write_error(e, &row.local_id, row.server_id.as_deref()))?;
                        debug!("[Store] transaction {} inserted", row.local_id);
                        Ok(Some(record))
                    }
                    WritePlan::Update(record) => {
                        let row = TransactionDB::try_from(&record)?;
                        diesel::update(transactions.find(&row.local_id))
                            .set(&row)
                            .execute(conn)
                            .map_err(|e| write_error(e, &row.local_id, row.server_id.as_deref()))?;
                        Ok(Some(record))
                    }
                    WritePlan::Delete(id) => {
                        diesel::delete(transactions.find(&id))
                            .execute(conn)
                            .map_err(StorageError::from)?;
                        debug!("[Store] transaction {} deleted", id);
                        Ok(None)
                    }
                }
            })
            .await
    }
}
