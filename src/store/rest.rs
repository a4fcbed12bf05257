//! Workers KV accessed through the Cloudflare REST API, for native runs.

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::time::Duration;
use tracing::error;

use super::retry::{with_retry, IsRetryable, RetryConfig};
use super::{KvBackend, ListKey, ListPage, StoreError};

pub const API_BASE: &str = "https://api.cloudflare.com/client/v4";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug)]
enum KvRequestError {
    Timeout,
    Http { status: u16, message: String },
    Network(String),
    Decode(String),
}

impl std::fmt::Display for KvRequestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KvRequestError::Timeout => write!(f, "request timed out"),
            KvRequestError::Http { status, message } => write!(f, "HTTP {}: {}", status, message),
            KvRequestError::Network(msg) => write!(f, "network error: {}", msg),
            KvRequestError::Decode(msg) => write!(f, "invalid response: {}", msg),
        }
    }
}

impl IsRetryable for KvRequestError {
    fn is_retryable(&self) -> bool {
        match self {
            KvRequestError::Timeout | KvRequestError::Network(_) => true,
            KvRequestError::Http { status, .. } => *status == 429 || (500..=599).contains(status),
            KvRequestError::Decode(_) => false,
        }
    }
}

impl From<KvRequestError> for StoreError {
    fn from(e: KvRequestError) -> Self {
        StoreError::Backend(e.to_string())
    }
}

impl From<reqwest::Error> for KvRequestError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            KvRequestError::Timeout
        } else if e.is_decode() {
            KvRequestError::Decode(e.to_string())
        } else {
            KvRequestError::Network(e.to_string())
        }
    }
}

#[derive(Deserialize)]
struct ApiResponse<T> {
    success: bool,
    result: Option<T>,
    #[serde(default)]
    errors: Vec<ApiError>,
    #[serde(default)]
    result_info: Option<ResultInfo>,
}

#[derive(Deserialize)]
struct ApiError {
    message: String,
}

#[derive(Deserialize)]
struct ResultInfo {
    #[serde(default)]
    cursor: Option<String>,
}

#[derive(Deserialize)]
struct KeyInfo {
    name: String,
    #[serde(default)]
    metadata: Option<JsonValue>,
}

#[derive(Serialize)]
struct BulkWrite<'a> {
    key: &'a str,
    value: &'a str,
    metadata: &'a JsonValue,
}

/// KV namespace client over the REST API.
pub struct RestKv {
    client: Client,
    base_url: String,
    token: String,
    retry: RetryConfig,
}

impl RestKv {
    pub fn new(account_id: &str, namespace_id: &str, token: String) -> Result<Self, StoreError> {
        Self::with_api_base(API_BASE, account_id, namespace_id, token)
    }

    /// Point at a different API root (tests use a loopback mock).
    pub fn with_api_base(
        api_base: &str,
        account_id: &str,
        namespace_id: &str,
        token: String,
    ) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent("skymood")
            .build()
            .map_err(|e| StoreError::Backend(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: format!(
                "{}/accounts/{}/storage/kv/namespaces/{}",
                api_base.trim_end_matches('/'),
                account_id,
                namespace_id
            ),
            token,
            retry: RetryConfig::default(),
        })
    }

    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    fn value_url(&self, key: &str) -> String {
        format!("{}/values/{}", self.base_url, urlencoding::encode(key))
    }

    fn list_url(&self, prefix: &str, cursor: Option<&str>) -> String {
        let mut url = format!("{}/keys?prefix={}", self.base_url, urlencoding::encode(prefix));
        if let Some(cursor) = cursor {
            url.push_str("&cursor=");
            url.push_str(&urlencoding::encode(cursor));
        }
        url
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, KvRequestError> {
    let status = response.status().as_u16();
    if (200..300).contains(&status) {
        return Ok(response);
    }
    let message = response
        .text()
        .await
        .unwrap_or_else(|_| "(failed to read body)".to_string());
    error!(status, response_body = %message, "kv api returned error status");
    Err(KvRequestError::Http { status, message })
}

fn api_failure<T>(response: &ApiResponse<T>) -> KvRequestError {
    let message = response
        .errors
        .first()
        .map(|e| e.message.clone())
        .unwrap_or_else(|| "Unknown error".to_string());
    KvRequestError::Decode(format!("API error: {}", message))
}

#[async_trait::async_trait]
impl KvBackend for RestKv {
    async fn put(&self, key: &str, value: String, metadata: JsonValue) -> Result<(), StoreError> {
        let body = [BulkWrite {
            key,
            value: &value,
            metadata: &metadata,
        }];
        let url = format!("{}/bulk", self.base_url);

        with_retry(&self.retry, || async {
            let response = self
                .client
                .put(&url)
                .bearer_auth(&self.token)
                .json(&body)
                .send()
                .await?;
            let parsed: ApiResponse<JsonValue> = check_status(response).await?.json().await?;
            if !parsed.success {
                return Err(api_failure(&parsed));
            }
            Ok(())
        })
        .await
        .map_err(StoreError::from)
    }

    async fn list(&self, prefix: &str, cursor: Option<String>) -> Result<ListPage, StoreError> {
        let url = self.list_url(prefix, cursor.as_deref());

        let parsed: ApiResponse<Vec<KeyInfo>> = with_retry(&self.retry, || async {
            let response = self.client.get(&url).bearer_auth(&self.token).send().await?;
            let parsed: ApiResponse<Vec<KeyInfo>> = check_status(response).await?.json().await?;
            if !parsed.success {
                return Err(api_failure(&parsed));
            }
            Ok(parsed)
        })
        .await?;

        let cursor = parsed
            .result_info
            .and_then(|info| info.cursor)
            .filter(|c| !c.is_empty());
        let keys = parsed
            .result
            .unwrap_or_default()
            .into_iter()
            .map(|k| ListKey {
                name: k.name,
                metadata: k.metadata,
            })
            .collect();

        Ok(ListPage {
            keys,
            list_complete: cursor.is_none(),
            cursor,
        })
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let url = self.value_url(key);

        let body: Result<Option<String>, KvRequestError> = with_retry(&self.retry, || async {
            let response = self.client.get(&url).bearer_auth(&self.token).send().await?;
            if response.status() == StatusCode::NOT_FOUND {
                return Ok(None);
            }
            let text = check_status(response).await?.text().await?;
            Ok(Some(text))
        })
        .await;

        Ok(body?)
    }
}
