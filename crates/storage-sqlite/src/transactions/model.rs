//! Database model for transactions.

use std::str::FromStr;

use chrono::NaiveDate;
use diesel::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use pocketledger_core::errors::{Error, Result};
use pocketledger_core::sync::RecordRef;
use pocketledger_core::transactions::Transaction;

use crate::errors::StorageError;
use crate::sync::{enum_from_db, enum_to_db, SyncColumns};

const DATE_FORMAT: &str = "%Y-%m-%d";

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
#[diesel(table_name = crate::schema::transactions)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[diesel(treat_none_as_null = true)]
pub struct TransactionDB {
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
    pub category_id: Option<String>,
    pub transaction_type: String,
    /// Decimal text, scale preserved.
    pub amount: String,
    pub date: String,
    pub description: String,
    pub ai_confidence: Option<String>,
    pub ai_justification: Option<String>,
    pub needs_user_review: bool,
}

fn decimal_from_db(value: &str) -> Result<Decimal> {
    Decimal::from_str(value)
        .map_err(|e| StorageError::Corrupt(format!("decimal '{}': {}", value, e)).into())
}

impl TryFrom<&Transaction> for TransactionDB {
    type Error = Error;

    fn try_from(transaction: &Transaction) -> Result<Self> {
        let sync = SyncColumns::from_meta(&transaction.sync);
        Ok(Self {
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
            category_id: transaction
                .category_id
                .as_ref()
                .map(|c| c.as_str().to_string()),
            transaction_type: enum_to_db(&transaction.transaction_type)?,
            amount: transaction.amount.to_string(),
            date: transaction.date.format(DATE_FORMAT).to_string(),
            description: transaction.description.clone(),
            ai_confidence: transaction.ai_confidence.map(|c| c.to_string()),
            ai_justification: transaction.ai_justification.clone(),
            needs_user_review: transaction.needs_user_review,
        })
    }
}

impl TryFrom<TransactionDB> for Transaction {
    type Error = Error;

    fn try_from(db: TransactionDB) -> Result<Self> {
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
        let date = NaiveDate::parse_from_str(&db.date, DATE_FORMAT)
            .map_err(|e| StorageError::Corrupt(format!("date '{}': {}", db.date, e)))?;
        Ok(Transaction {
            sync,
            category_id: db.category_id.map(RecordRef::from),
            transaction_type: enum_from_db(&db.transaction_type)?,
            amount: decimal_from_db(&db.amount)?,
            date,
            description: db.description,
            ai_confidence: db.ai_confidence.as_deref().map(decimal_from_db).transpose()?,
            ai_justification: db.ai_justification,
            needs_user_review: db.needs_user_review,
        })
    }
}
