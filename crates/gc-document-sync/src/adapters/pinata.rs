//! Pinata content store.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use crate::config::RegistryConfig;
use crate::domain::RegistryError;
use crate::ports::ContentStore;

/// `pinFileToIPFS` response body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PinResponse {
    ipfs_hash: String,
    #[serde(default)]
    pin_size: u64,
}

/// Uploads documents to IPFS through Pinata.
pub struct PinataStore {
    http_client: reqwest::Client,
    endpoint: String,
    jwt: String,
}

impl PinataStore {
    /// Create a store posting to `endpoint` with bearer token `jwt`.
    pub fn new(endpoint: impl Into<String>, jwt: impl Into<String>) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            http_client,
            endpoint: endpoint.into(),
            jwt: jwt.into(),
        }
    }

    /// A store for the configured account, or `None` without a token.
    pub fn from_config(config: &RegistryConfig) -> Option<Self> {
        config
            .pinata_jwt
            .as_ref()
            .map(|jwt| Self::new(config.pinata_endpoint.clone(), jwt.clone()))
    }
}

#[async_trait]
impl ContentStore for PinataStore {
    async fn upload(&self, file_name: &str, bytes: Vec<u8>) -> Result<String, RegistryError> {
        let size = bytes.len();
        let part = reqwest::multipart::Part::bytes(bytes).file_name(file_name.to_string());
        let form = reqwest::multipart::Form::new().part("file", part);

        debug!(file_name, size, "Uploading to Pinata");
        let response = self
            .http_client
            .post(&self.endpoint)
            .bearer_auth(&self.jwt)
            .multipart(form)
            .send()
            .await
            .map_err(|err| RegistryError::Storage(format!("upload failed: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RegistryError::Storage(format!("Pinata returned {status}: {body}")));
        }

        let pinned: PinResponse = response
            .json()
            .await
            .map_err(|err| RegistryError::Storage(format!("bad Pinata response: {err}")))?;
        info!(file_name, cid = %pinned.ipfs_hash, pin_size = pinned.pin_size, "Document pinned");
        Ok(format!("ipfs://{}", pinned.ipfs_hash))
    }
}

/// HTTP link for a content locator. Non-`ipfs://` locators pass through.
pub fn gateway_url(gateway: &str, locator: &str) -> String {
    match locator.strip_prefix("ipfs://") {
        Some(cid) => format!("{}/ipfs/{cid}", gateway.trim_end_matches('/')),
        None => locator.to_string(),
    }
}
