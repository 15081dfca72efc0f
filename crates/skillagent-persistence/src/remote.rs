//! Remote object store backends

use crate::error::{Result, StorageError};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

const JSON_MIME_TYPE: &str = "application/json";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Object store reachable over the network
#[async_trait]
pub trait RemoteBackend: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &str;

    /// Cheap reachability probe, checked before every write
    async fn is_available(&self) -> bool;

    /// Store `body` under `key`
    async fn put(&self, key: &str, body: Vec<u8>) -> Result<()>;

    /// Fetch the object stored under `key`
    async fn get(&self, key: &str) -> Result<Vec<u8>>;

    /// Delete every object whose key starts with `prefix`
    async fn delete_prefix(&self, prefix: &str) -> Result<()> {
        debug!("{} does not support prefix deletion ({})", self.name(), prefix);
        Ok(())
    }
}

/// Plain HTTP object store: `PUT`/`GET {base_url}/{bucket}/{key}`
#[derive(Clone, Debug)]
pub struct HttpObjectStore {
    client: reqwest::Client,
    base_url: String,
    bucket: String,
    token: Option<String>,
}

impl HttpObjectStore {
    pub fn new(base_url: impl Into<String>, bucket: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            bucket: bucket.into(),
            token: None,
        })
    }

    /// Send `Authorization: Bearer <token>` with every request
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.is_empty());
        self
    }

    fn bucket_url(&self) -> String {
        format!("{}/{}", self.base_url, self.bucket)
    }

    pub fn object_url(&self, key: &str) -> String {
        format!("{}/{}", self.bucket_url(), key)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl RemoteBackend for HttpObjectStore {
    fn name(&self) -> &str {
        "http-object-store"
    }

    async fn is_available(&self) -> bool {
        let request = self.authorize(self.client.head(self.bucket_url()));
        match request.send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                warn!("Remote store probe failed: {}", e);
                false
            }
        }
    }

    async fn put(&self, key: &str, body: Vec<u8>) -> Result<()> {
        let url = self.object_url(key);
        let response = self
            .authorize(self.client.put(&url))
            .header(reqwest::header::CONTENT_TYPE, JSON_MIME_TYPE)
            .body(body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(StorageError::Remote(format!(
                "PUT {} returned {}",
                url,
                response.status()
            )));
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let url = self.object_url(key);
        let response = self.authorize(self.client.get(&url)).send().await?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(StorageError::NotFound(key.to_string()));
        }
        if !status.is_success() {
            return Err(StorageError::Remote(format!("GET {} returned {}", url, status)));
        }

        Ok(response.bytes().await?.to_vec())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<()> {
        let response = self
            .authorize(self.client.delete(self.bucket_url()))
            .query(&[("prefix", prefix)])
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::METHOD_NOT_ALLOWED {
            debug!("Remote store does not support prefix deletion");
            return Ok(());
        }
        if !status.is_success() {
            return Err(StorageError::Remote(format!(
                "DELETE prefix {} returned {}",
                prefix, status
            )));
        }
        Ok(())
    }
}
