//! `RemoteGateway` over the REST client.

use std::marker::PhantomData;

use async_trait::async_trait;
use log::warn;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use pocketledger_core::categories::{Category, CategoryPayload};
use pocketledger_core::errors::GatewayError;
use pocketledger_core::sync::{GatewayResult, RemoteGateway, SyncRecord};
use pocketledger_core::transactions::{Transaction, TransactionPayload};

use crate::client::RestClient;
use crate::error::RemoteError;

/// Payloads that carry the client-side id used as idempotency key.
pub trait ClientKeyed {
    fn client_id(&self) -> &str;
}

impl ClientKeyed for CategoryPayload {
    fn client_id(&self) -> &str {
        &self.client_id
    }
}

impl ClientKeyed for TransactionPayload {
    fn client_id(&self) -> &str {
        &self.client_id
    }
}

/// Listing bodies come either bare or wrapped in `data`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ListResponse<T> {
    Bare(Vec<T>),
    Wrapped { data: Vec<T> },
}

impl<T> ListResponse<T> {
    fn into_items(self) -> Vec<T> {
        match self {
            Self::Bare(items) | Self::Wrapped { data: items } => items,
        }
    }
}

pub struct RestGateway<E> {
    client: RestClient,
    resource: &'static str,
    _record: PhantomData<fn() -> E>,
}

impl<E> RestGateway<E> {
    pub fn new(client: RestClient, resource: &'static str) -> Self {
        Self {
            client,
            resource,
            _record: PhantomData,
        }
    }

    pub fn resource(&self) -> &'static str {
        self.resource
    }
}

pub fn category_gateway(client: RestClient) -> RestGateway<Category> {
    RestGateway::new(client, "categories")
}

pub fn transaction_gateway(client: RestClient) -> RestGateway<Transaction> {
    RestGateway::new(client, "transactions")
}

fn gateway_error(resource: &str, action: &str, err: RemoteError) -> GatewayError {
    warn!("[Remote] {} {} failed: {}", action, resource, err);
    err.into()
}

#[async_trait]
impl<E> RemoteGateway<E> for RestGateway<E>
where
    E: SyncRecord,
    E::Payload: Serialize + ClientKeyed,
    E::Dto: DeserializeOwned,
{
    async fn create(&self, payload: &E::Payload) -> GatewayResult<E::Dto> {
        let url = self.client.collection_url(self.resource);
        self.client
            .post_json(&url, payload, Some(payload.client_id()))
            .await
            .map_err(|e| gateway_error(self.resource, "create", e))
    }

    async fn update(&self, server_id: &str, payload: &E::Payload) -> GatewayResult<E::Dto> {
        let url = self.client.item_url(self.resource, server_id);
        self.client
            .put_json(&url, payload)
            .await
            .map_err(|e| gateway_error(self.resource, "update", e))
    }

    async fn delete(&self, server_id: &str) -> GatewayResult<()> {
        let url = self.client.item_url(self.resource, server_id);
        self.client
            .delete(&url)
            .await
            .map_err(|e| gateway_error(self.resource, "delete", e))
    }

    async fn list_all(&self, owner_id: &str) -> GatewayResult<Vec<E::Dto>> {
        let url = self.client.list_url(self.resource, owner_id);
        self.client
            .get_json::<ListResponse<E::Dto>>(&url)
            .await
            .map(ListResponse::into_items)
            .map_err(|e| gateway_error(self.resource, "list", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pocketledger_core::categories::CategoryDto;
    use pocketledger_core::transactions::{TransactionDto, TransactionType};
    use rust_decimal_macros::dec;

    use crate::config::RemoteConfig;

    #[test]
    fn listing_accepts_bare_and_wrapped_bodies() {
        let bare: ListResponse<CategoryDto> = serde_json::from_str(
            r##"[{"id":"c1","name":"Food","colorHex":"#112233"}]"##,
        )
        .unwrap();
        assert_eq!(bare.into_items().len(), 1);

        let wrapped: ListResponse<CategoryDto> = serde_json::from_str(
            r##"{"data":[{"id":"c1","name":"Food","colorHex":"#112233"},{"id":"c2","name":"Rent","colorHex":"#000000"}]}"##,
        )
        .unwrap();
        assert_eq!(wrapped.into_items().len(), 2);
    }

    #[test]
    fn transaction_listing_decodes_wire_format() {
        let items: ListResponse<TransactionDto> = serde_json::from_str(
            r##"[{
                "id": "t1",
                "categoryId": "c1",
                "type": "income",
                "amount": "1200.00",
                "date": "2024-02-01",
                "description": "Salary",
                "aiConfidence": "0.75",
                "needsUserReview": true
            }]"##,
        )
        .unwrap();
        let dto = items.into_items().remove(0);
        assert_eq!(dto.transaction_type, TransactionType::Income);
        assert_eq!(dto.amount, dec!(1200.00));
        assert_eq!(dto.date, NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
        assert_eq!(dto.ai_confidence, Some(dec!(0.75)));
        assert!(dto.needs_user_review);
    }

    #[test]
    fn gateways_target_their_resources() {
        let client = RestClient::new(&RemoteConfig::new("https://api.example.test")).unwrap();
        assert_eq!(category_gateway(client.clone()).resource(), "categories");
        assert_eq!(transaction_gateway(client).resource(), "transactions");
    }

    #[test]
    fn payload_exposes_client_id() {
        let payload = CategoryPayload {
            client_id: "local-9".to_string(),
            name: "Food".to_string(),
            color_hex: "#112233".to_string(),
            icon_name: String::new(),
            is_active: true,
            display_order: 0,
        };
        assert_eq!(payload.client_id(), "local-9");
    }

    #[tokio::test]
    async fn unreachable_backend_is_a_retryable_gateway_error() {
        let client = RestClient::new(&RemoteConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            access_token: None,
            timeout_secs: 2,
        })
        .unwrap();
        let gateway = category_gateway(client);
        let err = gateway.list_all("owner-1").await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(err.status, None);
    }
}
