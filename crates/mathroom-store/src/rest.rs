//! HTTP document store.
//!
//! Talks to a JSON document service laid out as
//! `{base_url}/{collection}/{key}`:
//!
//! - `GET` returns the document, or 404 when absent
//! - `PUT` replaces the document
//! - `PATCH` merges top-level fields, creating the document if needed

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::instrument;

use mathroom_core::error::StoreError;
use mathroom_core::traits::DocumentStore;

const DEFAULT_TIMEOUT_SECS: u64 = 15;
pub const DEFAULT_COLLECTION: &str = "rooms";

/// Remote document store over HTTP.
pub struct RestDocumentStore {
    base_url: String,
    collection: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl RestDocumentStore {
    pub fn new(
        base_url: &str,
        collection: &str,
        api_key: Option<String>,
    ) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(|e| StoreError::Network(format!("failed to build HTTP client: {e}")))?;

        let collection = if collection.is_empty() {
            DEFAULT_COLLECTION
        } else {
            collection
        };

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            collection: collection.trim_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
            client,
        })
    }

    fn url(&self, key: &str) -> String {
        format!(
            "{}/{}/{}",
            self.base_url,
            self.collection,
            encode_segment(key)
        )
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, StoreError> {
        self.authorize(request).send().await.map_err(|e| {
            if e.is_timeout() {
                StoreError::Timeout(DEFAULT_TIMEOUT_SECS)
            } else if e.is_connect() {
                StoreError::Network(format!("document store not reachable at {}", self.base_url))
            } else {
                StoreError::Network(e.to_string())
            }
        })
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, StoreError> {
    let status = response.status().as_u16();
    if status >= 400 {
        let message = response.text().await.unwrap_or_default();
        return Err(StoreError::Api { status, message });
    }
    Ok(response)
}

/// Percent-encode everything outside the unreserved URL set.
fn encode_segment(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for b in key.bytes() {
        if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'~') {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{b:02X}"));
        }
    }
    out
}

#[async_trait]
impl DocumentStore for RestDocumentStore {
    fn name(&self) -> &str {
        "rest"
    }

    #[instrument(skip(self))]
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let response = self.send(self.client.get(self.url(key))).await?;
        if response.status().as_u16() == 404 {
            return Ok(None);
        }
        let response = check_status(response).await?;
        let doc = response
            .json::<Value>()
            .await
            .map_err(|e| StoreError::Serialization(format!("failed to parse document: {e}")))?;
        Ok(Some(doc))
    }

    #[instrument(skip(self, document))]
    async fn set(&self, key: &str, document: Value) -> Result<(), StoreError> {
        let response = self
            .send(self.client.put(self.url(key)).json(&document))
            .await?;
        check_status(response).await?;
        Ok(())
    }

    #[instrument(skip(self, patch), fields(fields = patch.len()))]
    async fn merge(&self, key: &str, patch: Map<String, Value>) -> Result<(), StoreError> {
        let response = self
            .send(self.client.patch(self.url(key)).json(&patch))
            .await?;
        check_status(response).await?;
        Ok(())
    }
}
