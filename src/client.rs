//! Backend client: the data-fetch call site.
//!
//! Every read goes through the same three steps:
//!
//! 1. Build a [`QueryKey`] from the endpoint and parameters.
//! 2. Ask the [`RequestCoalescer`] for it; only a miss issues an HTTP `GET`.
//! 3. Hand the raw body to the shape extractor.
//!
//! ```rust,no_run
//! # async fn demo() -> anyhow::Result<()> {
//! use admin_resilience::client::ApiClient;
//! use admin_resilience::config::Config;
//!
//! let mut config = Config::minimal();
//! config.api.base_url = Some("https://api.example.com".to_string());
//! let client = ApiClient::from_config(&config)?;
//! let rentals = client
//!     .fetch_collection("/rentals", &serde_json::json!({"page": 1}))
//!     .await?;
//! println!("{} rentals", rentals.len());
//! # Ok(())
//! # }
//! ```

use anyhow::{bail, Context, Result};
use serde_json::Value;
use std::time::Duration;

use admin_resilience_core::extract::{extract_asset_urls, extract_collection_with, ExtractionPolicy};
use admin_resilience_core::models::{ExtractionResult, QueryKey};

use crate::coalesce::RequestCoalescer;
use crate::config::{ApiConfig, Config};

/// HTTP client with request coalescing and tolerant response extraction.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    bearer_token: Option<String>,
    coalescer: RequestCoalescer<Value>,
    policy: ExtractionPolicy,
}

impl ApiClient {
    /// Build a client from the `[api]`, `[coalescing]`, and `[extraction]`
    /// sections.
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            &config.api,
            config.extraction.policy(),
            config.coalescing.window(),
        )
    }

    pub fn new(api: &ApiConfig, policy: ExtractionPolicy, window: Duration) -> Result<Self> {
        let base_url = match &api.base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => bail!("api.base_url must be set to fetch from the backend"),
        };

        let bearer_token = match &api.bearer_token_env {
            Some(var) => match std::env::var(var) {
                Ok(token) if !token.trim().is_empty() => Some(token),
                _ => {
                    tracing::warn!(var = %var, "bearer token variable is not set; sending unauthenticated requests");
                    None
                }
            },
            None => None,
        };

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(api.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            base_url,
            bearer_token,
            coalescer: RequestCoalescer::new(window),
            policy,
        })
    }

    pub fn coalescer(&self) -> &RequestCoalescer<Value> {
        &self.coalescer
    }

    pub fn policy(&self) -> &ExtractionPolicy {
        &self.policy
    }

    /// Absolute URL for `endpoint`; absolute endpoints pass through.
    pub fn url_for(&self, endpoint: &str) -> String {
        let endpoint = endpoint.trim();
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            endpoint.to_string()
        } else {
            format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'))
        }
    }

    /// Fetch the raw JSON body for `endpoint`, coalesced on endpoint + params.
    pub async fn fetch_raw(&self, endpoint: &str, params: &Value) -> Result<Value> {
        let key = QueryKey::new(endpoint, params);
        let query = query_pairs(params)?;
        let url = self.url_for(endpoint);
        let http = self.http.clone();
        let token = self.bearer_token.clone();

        let perform = move || get_json(http, url, query, token);

        self.coalescer
            .coalesce(key, perform)
            .await
            .with_context(|| format!("GET {} failed", endpoint))
    }

    /// Fetch `endpoint` and extract its record collection.
    pub async fn fetch_collection(&self, endpoint: &str, params: &Value) -> Result<ExtractionResult> {
        let raw = self.fetch_raw(endpoint, params).await?;
        let result = extract_collection_with(&raw, &self.policy);
        if !result.is_found() {
            tracing::warn!(endpoint, "response contained no record collection");
        }
        Ok(result)
    }

    /// Fetch `endpoint` and collect up to `limit` media references.
    pub async fn fetch_assets(&self, endpoint: &str, params: &Value, limit: usize) -> Result<Vec<String>> {
        let raw = self.fetch_raw(endpoint, params).await?;
        Ok(extract_asset_urls(&raw, limit))
    }
}

async fn get_json(
    http: reqwest::Client,
    url: String,
    query: Vec<(String, String)>,
    token: Option<String>,
) -> Result<Value> {
    let mut request = http.get(&url).query(&query);
    if let Some(token) = token {
        request = request.bearer_auth(token);
    }

    let response = request.send().await.with_context(|| format!("request to {} failed", url))?;
    let status = response.status();
    if !status.is_success() {
        let body_text = response.text().await.unwrap_or_default();
        bail!("backend error {}: {}", status, body_text);
    }

    response
        .json::<Value>()
        .await
        .with_context(|| format!("response from {} is not valid JSON", url))
}

/// Flatten a JSON parameter object into query-string pairs.
///
/// Scalars are stringified, `null` is skipped, arrays repeat the key, and
/// nested objects are sent as compact JSON.
pub fn query_pairs(params: &Value) -> Result<Vec<(String, String)>> {
    let map = match params {
        Value::Null => return Ok(Vec::new()),
        Value::Object(map) => map,
        other => bail!("request parameters must be a JSON object, got {}", other),
    };

    let mut pairs = Vec::new();
    for (key, value) in map {
        match value {
            Value::Null => {}
            Value::Array(items) => {
                for item in items {
                    if let Some(s) = scalar_string(item) {
                        pairs.push((key.clone(), s));
                    }
                }
            }
            other => {
                if let Some(s) = scalar_string(other) {
                    pairs.push((key.clone(), s));
                }
            }
        }
    }
    Ok(pairs)
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn client() -> ApiClient {
        let api = ApiConfig {
            base_url: Some("https://api.example.com/v1/".to_string()),
            ..ApiConfig::default()
        };
        ApiClient::new(&api, ExtractionPolicy::default(), Duration::from_millis(500)).unwrap()
    }

    #[test]
    fn url_for_joins_base_and_endpoint() {
        let c = client();
        assert_eq!(c.url_for("/rentals"), "https://api.example.com/v1/rentals");
        assert_eq!(c.url_for("rentals/4"), "https://api.example.com/v1/rentals/4");
        assert_eq!(c.url_for("https://other.test/x"), "https://other.test/x");
    }

    #[test]
    fn client_requires_base_url() {
        let err = ApiClient::new(
            &ApiConfig::default(),
            ExtractionPolicy::default(),
            Duration::from_millis(500),
        )
        .err()
        .unwrap();
        assert!(err.to_string().contains("base_url"));
    }

    #[test]
    fn query_pairs_flatten_params() {
        let pairs = query_pairs(&json!({
            "page": 2,
            "active": true,
            "q": "sea view",
            "skip": null,
            "ids": [1, 2],
            "filter": {"city": "Porto"},
        }))
        .unwrap();
        assert_eq!(
            pairs,
            vec![
                ("page".to_string(), "2".to_string()),
                ("active".to_string(), "true".to_string()),
                ("q".to_string(), "sea view".to_string()),
                ("ids".to_string(), "1".to_string()),
                ("ids".to_string(), "2".to_string()),
                ("filter".to_string(), r#"{"city":"Porto"}"#.to_string()),
            ]
        );
    }

    #[test]
    fn query_pairs_reject_scalars() {
        assert!(query_pairs(&json!("page=1")).is_err());
        assert!(query_pairs(&Value::Null).unwrap().is_empty());
    }
}
