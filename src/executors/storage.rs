//! Key/Value Storage
//!
//! Scoped storage keys and the HTTP client for the remote store.
//!
//! # Scoping
//!
//! Every key a flow uses is prefixed by its [`StoreScope`]:
//!
//! - `Flow` → `flows/{flowVersionId}/{key}`, shared by all runs of a flow
//! - `Run` → `runs/{executionId}/{key}`, private to one run
//!
//! so the same key in different scopes never collides.
//!
//! # Wire Format
//!
//! - `GET  {base}/v1/store-entries?key={scopedKey}` → `{ "key", "value" }`, `404` when absent
//! - `POST {base}/v1/store-entries` with `{ "key", "value" }` → the stored entry
//!
//! Both carry `Authorization: Bearer {workerToken}`.

use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{ExecutorError, StorageExecutor};

/// Path prefix that isolates storage entries.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreScope {
    /// Shared by every run of the same flow version
    #[default]
    #[serde(alias = "FLOW")]
    Flow,
    /// Private to a single run
    #[serde(alias = "RUN")]
    Run,
}

impl StoreScope {
    /// Path prefix of this scope, always ending in `/`.
    pub fn prefix(&self, flow_version_id: &str, execution_id: &str) -> String {
        match self {
            Self::Flow => format!("flows/{}/", flow_version_id),
            Self::Run => format!("runs/{}/", execution_id),
        }
    }

    /// The effective storage key: scope prefix followed by `key`.
    pub fn scoped_key(&self, flow_version_id: &str, execution_id: &str, key: &str) -> String {
        format!("{}{}", self.prefix(flow_version_id, execution_id), key)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StoreEntry {
    key: String,
    #[serde(default)]
    value: Value,
}

/// Storage executor backed by the remote store's HTTP API.
#[derive(Debug, Clone)]
pub struct HttpStorageExecutor {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpStorageExecutor {
    /// Creates a client for `base_url` with a per-request timeout.
    pub fn new(base_url: impl Into<String>, token: Option<String>, timeout: Duration) -> Result<Self, ExecutorError> {
        let client = Client::builder().timeout(timeout).build()?;
        if token.is_none() {
            warn!("Storage client created without a worker token");
        }
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    fn entries_url(&self) -> String {
        format!("{}/v1/store-entries", self.base_url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

/// Turns a non-success response into [`ExecutorError::Status`].
async fn status_error(response: reqwest::Response) -> ExecutorError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    ExecutorError::Status { status, body }
}

#[async_trait]
impl StorageExecutor for HttpStorageExecutor {
    async fn get(&self, key: &str) -> Result<Option<Value>, ExecutorError> {
        debug!("GET store entry '{}'", key);

        let response = self
            .authorize(self.client.get(self.entries_url()).query(&[("key", key)]))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let entry: Option<StoreEntry> = response.json().await?;
        Ok(entry.map(|entry| entry.value))
    }

    async fn put(&self, key: &str, value: Value) -> Result<Value, ExecutorError> {
        debug!("POST store entry '{}'", key);

        let body = StoreEntry {
            key: key.to_string(),
            value,
        };
        let response = self
            .authorize(self.client.post(self.entries_url()).json(&body))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let entry: StoreEntry = response.json().await?;
        Ok(entry.value)
    }
}
