//! Network-backed [`AssetProbe`].
//!
//! A candidate "loads" when a `HEAD` request returns 2xx. Servers that
//! refuse `HEAD` with 405 are retried with `GET`; the body is never read.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;

use admin_resilience_core::assets::AssetProbe;

pub struct HttpAssetProbe {
    client: reqwest::Client,
}

impl HttpAssetProbe {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client for asset probing")?;
        Ok(Self { client })
    }

    async fn status_of(&self, request: reqwest::RequestBuilder, url: &str) -> Option<StatusCode> {
        match request.send().await {
            Ok(response) => Some(response.status()),
            Err(e) => {
                tracing::debug!(url, error = %e, "asset probe request failed");
                None
            }
        }
    }
}

#[async_trait]
impl AssetProbe for HttpAssetProbe {
    async fn loads(&self, url: &str) -> bool {
        if url.starts_with("data:") {
            return true;
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return false;
        }

        let status = match self.status_of(self.client.head(url), url).await {
            Some(StatusCode::METHOD_NOT_ALLOWED) => self.status_of(self.client.get(url), url).await,
            other => other,
        };

        match status {
            Some(status) if status.is_success() => true,
            Some(status) => {
                tracing::debug!(url, %status, "asset candidate did not load");
                false
            }
            None => false,
        }
    }
}
