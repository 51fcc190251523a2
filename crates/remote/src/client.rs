//! Thin JSON/HTTP client for the backend's REST API.

use log::{debug, error};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::RemoteConfig;
use crate::error::{RemoteError, Result};

const MAX_LOG_BODY_CHARS: usize = 512;
const API_PREFIX: &str = "api/v1";
pub(crate) const IDEMPOTENCY_HEADER: &str = "idempotency-key";

#[derive(Debug, Clone)]
pub struct RestClient {
    client: reqwest::Client,
    base_url: String,
    access_token: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
struct ApiErrorResponse {
    #[serde(default)]
    code: String,
    message: String,
}

impl RestClient {
    pub fn new(config: &RemoteConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            access_token: config.access_token.clone(),
        })
    }

    pub(crate) fn collection_url(&self, resource: &str) -> String {
        format!("{}/{}/{}", self.base_url, API_PREFIX, resource)
    }

    pub(crate) fn item_url(&self, resource: &str, id: &str) -> String {
        format!(
            "{}/{}",
            self.collection_url(resource),
            urlencoding::encode(id)
        )
    }

    pub(crate) fn list_url(&self, resource: &str, owner_id: &str) -> String {
        format!(
            "{}?ownerId={}",
            self.collection_url(resource),
            urlencoding::encode(owner_id)
        )
    }

    pub(crate) fn headers(&self, idempotency_key: Option<&str>) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(token) = &self.access_token {
            let auth_value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| RemoteError::auth("Invalid access token format"))?;
            headers.insert(AUTHORIZATION, auth_value);
        }

        if let Some(key) = idempotency_key {
            let key_value = HeaderValue::from_str(key)
                .map_err(|_| RemoteError::invalid_request("Invalid idempotency key"))?;
            headers.insert(IDEMPOTENCY_HEADER, key_value);
        }

        Ok(headers)
    }

    fn log_response(status: reqwest::StatusCode, body: &str) {
        if status.is_success() {
            debug!("[Remote] response status: {}", status);
            return;
        }
        let mut preview = body.chars().take(MAX_LOG_BODY_CHARS).collect::<String>();
        if body.chars().count() > MAX_LOG_BODY_CHARS {
            preview.push_str("...");
        }
        debug!("[Remote] response error ({}): {}", status, preview);
    }

    pub(crate) fn error_from_body(status: u16, body: &str) -> RemoteError {
        match serde_json::from_str::<ApiErrorResponse>(body) {
            Ok(err) if !err.code.is_empty() => {
                RemoteError::api(status, format!("{}: {}", err.code, err.message))
            }
            Ok(err) => RemoteError::api(status, err.message),
            Err(_) => RemoteError::api(status, format!("Request failed: {}", body)),
        }
    }

    async fn read_body(response: reqwest::Response) -> Result<(reqwest::StatusCode, String)> {
        let status = response.status();
        let body = response.text().await?;
        Self::log_response(status, &body);
        if !status.is_success() {
            return Err(Self::error_from_body(status.as_u16(), &body));
        }
        Ok((status, body))
    }

    async fn parse_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let (status, body) = Self::read_body(response).await?;
        serde_json::from_str(&body).map_err(|e| {
            error!("[Remote] Failed to deserialize response ({}): {}", status, e);
            RemoteError::Json(e)
        })
    }

    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self
            .client
            .get(url)
            .headers(self.headers(None)?)
            .send()
            .await?;
        Self::parse_response(response).await
    }

    pub async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        url: &str,
        body: &B,
        idempotency_key: Option<&str>,
    ) -> Result<T> {
        let response = self
            .client
            .post(url)
            .headers(self.headers(idempotency_key)?)
            .json(body)
            .send()
            .await?;
        Self::parse_response(response).await
    }

    pub async fn put_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<T> {
        let response = self
            .client
            .put(url)
            .headers(self.headers(None)?)
            .json(body)
            .send()
            .await?;
        Self::parse_response(response).await
    }

    pub async fn delete(&self, url: &str) -> Result<()> {
        let response = self
            .client
            .delete(url)
            .headers(self.headers(None)?)
            .send()
            .await?;
        Self::read_body(response).await?;
        Ok(())
    }
}
