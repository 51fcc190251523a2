//! Transaction domain models.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::categories::CategoryDto;
use crate::errors::{Error, Result, ValidationError};
use crate::sync::{RecordKind, RecordRef, SyncMetadata, SyncRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Expense,
    Income,
}

impl TransactionType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Expense => "expense",
            Self::Income => "income",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "expense" => Ok(Self::Expense),
            "income" => Ok(Self::Income),
            other => Err(Error::Serialization(format!(
                "Unknown transaction type '{}'",
                other
            ))),
        }
    }
}

/// Domain model representing a transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    #[serde(flatten)]
    pub sync: SyncMetadata,
    /// Weak reference to a category by local or server id.
    pub category_id: Option<RecordRef>,
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    pub amount: Decimal,
    pub date: NaiveDate,
    pub description: String,
    pub ai_confidence: Option<Decimal>,
    pub ai_justification: Option<String>,
    pub needs_user_review: bool,
}

/// Input model for creating a transaction. `amount` is raw user input.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTransaction {
    pub category_id: Option<String>,
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    pub amount: String,
    pub date: NaiveDate,
    pub description: String,
}

/// Partial edit of a transaction; `None` leaves a field untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionUpdate {
    pub category_id: Option<String>,
    /// Drops the category link. Wins over `category_id`.
    #[serde(default)]
    pub clear_category: bool,
    #[serde(rename = "type")]
    pub transaction_type: Option<TransactionType>,
    pub amount: Option<String>,
    pub date: Option<NaiveDate>,
    pub description: Option<String>,
    pub needs_user_review: Option<bool>,
}

/// Server-authoritative transaction fields sent on create/update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionPayload {
    pub client_id: String,
    pub category_id: Option<String>,
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    /// Serialized as a decimal string.
    pub amount: Decimal,
    pub date: NaiveDate,
    pub description: String,
    pub needs_user_review: bool,
}

/// Transaction as returned by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionDto {
    pub id: String,
    #[serde(default)]
    pub category_id: Option<String>,
    /// Nested category, present on some responses.
    #[serde(default)]
    pub category: Option<CategoryDto>,
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    pub amount: Decimal,
    pub date: NaiveDate,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub ai_confidence: Option<Decimal>,
    #[serde(default)]
    pub ai_justification: Option<String>,
    #[serde(default)]
    pub needs_user_review: bool,
}

impl TransactionDto {
    /// The referenced category id, from the flat field or the nested record.
    pub fn category_key(&self) -> Option<&str> {
        self.category_id
            .as_deref()
            .or_else(|| self.category.as_ref().map(|c| c.id.as_str()))
    }
}

/// Parses user input into an exact, strictly positive amount.
pub fn parse_amount(input: &str) -> std::result::Result<Decimal, ValidationError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField("amount"));
    }
    let amount = Decimal::from_str(trimmed)
        .map_err(|_| ValidationError::InvalidAmount(trimmed.to_string()))?;
    if amount <= Decimal::ZERO {
        return Err(ValidationError::NonPositiveAmount);
    }
    Ok(amount)
}

fn validate_description(description: &str) -> std::result::Result<(), ValidationError> {
    if description.trim().is_empty() {
        return Err(ValidationError::EmptyField("description"));
    }
    Ok(())
}

fn non_empty_ref(id: Option<String>) -> Option<RecordRef> {
    id.filter(|v| !v.trim().is_empty()).map(RecordRef::from)
}

impl NewTransaction {
    /// Validates the input and builds a pending transaction.
    pub fn into_transaction(self, owner_id: &str, now: DateTime<Utc>) -> Result<Transaction> {
        let amount = parse_amount(&self.amount)?;
        validate_description(&self.description)?;
        Ok(Transaction {
            sync: SyncMetadata::new_local(owner_id, now),
            category_id: non_empty_ref(self.category_id),
            transaction_type: self.transaction_type,
            amount,
            date: self.date,
            description: self.description.trim().to_string(),
            ai_confidence: None,
            ai_justification: None,
            needs_user_review: false,
        })
    }
}

/// A [`TransactionUpdate`] whose raw inputs have been parsed.
#[derive(Debug, Clone)]
pub struct ValidatedTransactionUpdate {
    category: Option<Option<RecordRef>>,
    transaction_type: Option<TransactionType>,
    amount: Option<Decimal>,
    date: Option<NaiveDate>,
    description: Option<String>,
    needs_user_review: Option<bool>,
}

impl TransactionUpdate {
    pub fn validate(self) -> Result<ValidatedTransactionUpdate> {
        let amount = self.amount.as_deref().map(parse_amount).transpose()?;
        if let Some(description) = &self.description {
            validate_description(description)?;
        }
        let category = if self.clear_category {
            Some(None)
        } else {
            self.category_id.map(|id| non_empty_ref(Some(id)))
        };
        Ok(ValidatedTransactionUpdate {
            category,
            transaction_type: self.transaction_type,
            amount,
            date: self.date,
            description: self.description.map(|d| d.trim().to_string()),
            needs_user_review: self.needs_user_review,
        })
    }
}

impl ValidatedTransactionUpdate {
    pub fn apply(self, transaction: &mut Transaction) {
        if let Some(category) = self.category {
            transaction.category_id = category;
        }
        if let Some(kind) = self.transaction_type {
            transaction.transaction_type = kind;
        }
        if let Some(amount) = self.amount {
            transaction.amount = amount;
        }
        if let Some(date) = self.date {
            transaction.date = date;
        }
        if let Some(description) = self.description {
            transaction.description = description;
        }
        if let Some(review) = self.needs_user_review {
            transaction.needs_user_review = review;
        }
    }
}

impl SyncRecord for Transaction {
    type Dto = TransactionDto;
    type Payload = TransactionPayload;

    const KIND: RecordKind = RecordKind::Transaction;

    fn meta(&self) -> &SyncMetadata {
        &self.sync
    }

    fn meta_mut(&mut self) -> &mut SyncMetadata {
        &mut self.sync
    }

    fn dto_id(dto: &TransactionDto) -> &str {
        &dto.id
    }

    fn to_payload(&self) -> TransactionPayload {
        TransactionPayload {
            client_id: self.sync.local_id.clone(),
            category_id: self.category_id.as_ref().map(|c| c.as_str().to_string()),
            transaction_type: self.transaction_type,
            amount: self.amount,
            date: self.date,
            description: self.description.clone(),
            needs_user_review: self.needs_user_review,
        }
    }

    fn apply_server_fields(&mut self, dto: &TransactionDto) {
        self.category_id = dto.category_key().map(RecordRef::from);
        self.transaction_type = dto.transaction_type;
        self.amount = dto.amount;
        self.date = dto.date;
        self.description = dto.description.clone();
        self.ai_confidence = dto.ai_confidence;
        self.ai_justification = dto.ai_justification.clone();
        self.needs_user_review = dto.needs_user_review;
    }

    fn matches_server(&self, dto: &TransactionDto) -> bool {
        self.category_id.as_ref().map(|c| c.as_str()) == dto.category_key()
            && self.transaction_type == dto.transaction_type
            && self.amount == dto.amount
            && self.date == dto.date
            && self.description == dto.description
            && self.ai_confidence == dto.ai_confidence
            && self.ai_justification == dto.ai_justification
            && self.needs_user_review == dto.needs_user_review
    }

    fn from_server(owner_id: &str, dto: &TransactionDto, now: DateTime<Utc>) -> Self {
        let mut transaction = Self {
            sync: SyncMetadata::from_server(owner_id, dto.id.clone(), now),
            category_id: None,
            transaction_type: dto.transaction_type,
            amount: dto.amount,
            date: dto.date,
            description: String::new(),
            ai_confidence: None,
            ai_justification: None,
            needs_user_review: false,
        };
        transaction.apply_server_fields(dto);
        transaction
    }
}
