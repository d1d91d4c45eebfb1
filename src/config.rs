//! TOML configuration parsing and validation.
//!
//! ```toml
//! [api]
//! base_url = "https://api.example.com"
//! timeout_secs = 30
//! bearer_token_env = "ADMINRES_TOKEN"
//!
//! [coalescing]
//! window_ms = 500
//!
//! [extraction]
//! max_depth = 4
//! asset_limit = 50
//! # priority_keys = ["data", "rentals", "items"]
//!
//! [assets]
//! base_origin = "https://cdn.example.com"
//! storage_subpaths = ["uploads/rentals", "uploads/properties", "uploads"]
//!
//! [permissions.aliases]
//! campaign = ["campaigns", "marketing_campaigns"]
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use admin_resilience_core::assets::AssetLocations;
use admin_resilience_core::extract::{ExtractionPolicy, DEFAULT_MAX_DEPTH, DEFAULT_PRIORITY_KEYS};
use admin_resilience_core::permissions::PermissionPolicy;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub coalescing: CoalescingConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    pub assets: AssetsConfig,
    #[serde(default)]
    pub permissions: PermissionsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Name of the environment variable holding a bearer token.
    #[serde(default)]
    pub bearer_token_env: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_secs: 30,
            bearer_token_env: None,
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct CoalescingConfig {
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,
}

impl Default for CoalescingConfig {
    fn default() -> Self {
        Self { window_ms: 500 }
    }
}

impl CoalescingConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

fn default_window_ms() -> u64 {
    500
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExtractionConfig {
    #[serde(default = "default_priority_keys")]
    pub priority_keys: Vec<String>,
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    #[serde(default = "default_asset_limit")]
    pub asset_limit: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            priority_keys: default_priority_keys(),
            max_depth: DEFAULT_MAX_DEPTH,
            asset_limit: 50,
        }
    }
}

impl ExtractionConfig {
    pub fn policy(&self) -> ExtractionPolicy {
        ExtractionPolicy {
            priority_keys: self.priority_keys.clone(),
            max_depth: self.max_depth,
        }
    }
}

fn default_priority_keys() -> Vec<String> {
    DEFAULT_PRIORITY_KEYS.iter().map(|k| k.to_string()).collect()
}
fn default_max_depth() -> usize {
    DEFAULT_MAX_DEPTH
}
fn default_asset_limit() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct AssetsConfig {
    pub base_origin: String,
    #[serde(default = "default_storage_subpaths")]
    pub storage_subpaths: Vec<String>,
}

impl AssetsConfig {
    pub fn locations(&self) -> Result<AssetLocations> {
        AssetLocations::new(&self.base_origin, &self.storage_subpaths)
    }
}

fn default_storage_subpaths() -> Vec<String> {
    vec![
        "uploads/rentals".to_string(),
        "uploads/properties".to_string(),
        "uploads/campaigns".to_string(),
        "uploads".to_string(),
    ]
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct PermissionsConfig {
    /// Extra module aliases, merged over the built-in table.
    #[serde(default)]
    pub aliases: BTreeMap<String, Vec<String>>,
}

impl PermissionsConfig {
    pub fn policy(&self) -> PermissionPolicy {
        let mut policy = PermissionPolicy::default();
        for (module, names) in &self.aliases {
            policy.add_aliases(module, names.iter().map(String::as_str));
        }
        policy
    }
}

impl Config {
    /// A configuration for commands that never contact the backend.
    pub fn minimal() -> Self {
        Self {
            api: ApiConfig::default(),
            coalescing: CoalescingConfig::default(),
            extraction: ExtractionConfig::default(),
            assets: AssetsConfig {
                base_origin: "http://localhost".to_string(),
                storage_subpaths: default_storage_subpaths(),
            },
            permissions: PermissionsConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(&config)?;

    Ok(config)
}

/// Check cross-field constraints that serde cannot express.
pub fn validate(config: &Config) -> Result<()> {
    if let Some(base_url) = &config.api.base_url {
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            anyhow::bail!("api.base_url must start with http:// or https://");
        }
    }
    if config.api.timeout_secs == 0 {
        anyhow::bail!("api.timeout_secs must be > 0");
    }

    if config.coalescing.window_ms == 0 {
        anyhow::bail!("coalescing.window_ms must be > 0");
    }

    if config.extraction.max_depth == 0 {
        anyhow::bail!("extraction.max_depth must be >= 1");
    }
    if config.extraction.asset_limit == 0 {
        anyhow::bail!("extraction.asset_limit must be >= 1");
    }
    if config
        .extraction
        .priority_keys
        .iter()
        .any(|k| k.trim().is_empty())
    {
        anyhow::bail!("extraction.priority_keys must not contain empty keys");
    }

    config
        .assets
        .locations()
        .with_context(|| "Invalid [assets] section")?;

    for (module, names) in &config.permissions.aliases {
        if module.trim().is_empty() || names.iter().any(|n| n.trim().is_empty()) {
            anyhow::bail!("permissions.aliases entries must be non-empty module names");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(content: &str) -> Result<Config> {
        let config: Config = toml::from_str(content)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn defaults_fill_missing_sections() {
        let config = parse(
            r#"
[assets]
base_origin = "https://cdn.example.com"
"#,
        )
        .unwrap();
        assert_eq!(config.coalescing.window(), Duration::from_millis(500));
        assert_eq!(config.extraction.max_depth, 4);
        assert_eq!(config.extraction.priority_keys[0], "data");
        assert_eq!(config.api.timeout_secs, 30);
        assert_eq!(config.assets.locations().unwrap().storage_subpaths().len(), 4);
    }

    #[test]
    fn rejects_empty_subpaths() {
        let err = parse(
            r#"
[assets]
base_origin = "https://cdn.example.com"
storage_subpaths = []
"#,
        )
        .unwrap_err();
        assert!(format!("{:#}", err).contains("storage subpath"));
    }

    #[test]
    fn rejects_zero_window() {
        let err = parse(
            r#"
[coalescing]
window_ms = 0

[assets]
base_origin = "https://cdn.example.com"
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("window_ms"));
    }

    #[test]
    fn rejects_non_http_base_url() {
        assert!(parse(
            r#"
[api]
base_url = "ftp://example.com"

[assets]
base_origin = "https://cdn.example.com"
"#,
        )
        .is_err());
    }

    #[test]
    fn configured_aliases_extend_defaults() {
        let config = parse(
            r#"
[assets]
base_origin = "https://cdn.example.com"

[permissions.aliases]
campaign = ["marketing_campaigns"]
"#,
        )
        .unwrap();
        let policy = config.permissions.policy();
        assert_eq!(
            policy.names_for("campaign"),
            vec!["campaign", "campaigns", "marketing_campaigns"]
        );
    }

    #[test]
    fn example_config_parses() {
        let config = parse(include_str!("../config/adminres.example.toml")).unwrap();
        assert_eq!(config.api.bearer_token_env.as_deref(), Some("ADMINRES_TOKEN"));
        assert_eq!(config.extraction.policy(), ExtractionPolicy::default());
    }

    #[test]
    fn minimal_config_is_valid() {
        validate(&Config::minimal()).unwrap();
    }
}
