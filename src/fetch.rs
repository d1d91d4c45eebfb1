//! `adminres fetch`: read a collection from the live backend.

use anyhow::Result;
use serde_json::{Map, Value};

use admin_resilience_core::models::ExtractionResult;

use crate::client::ApiClient;
use crate::config::Config;

/// Build a JSON parameter object from `--param key=value` pairs.
///
/// Repeated keys collect into an array, in the order given.
pub fn params_from_pairs(pairs: &[(String, String)]) -> Value {
    let mut map = Map::new();
    for (key, value) in pairs {
        let value = Value::String(value.clone());
        match map.get_mut(key) {
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                map.insert(key.clone(), value);
            }
        }
    }
    Value::Object(map)
}

pub async fn run_fetch(
    config: &Config,
    endpoint: &str,
    params: Vec<(String, String)>,
    assets: bool,
) -> Result<()> {
    let client = ApiClient::from_config(config)?;
    let params = params_from_pairs(&params);

    if assets {
        let urls = client
            .fetch_assets(endpoint, &params, config.extraction.asset_limit)
            .await?;
        for url in urls {
            println!("{}", url);
        }
        return Ok(());
    }

    match client.fetch_collection(endpoint, &params).await? {
        ExtractionResult::RecordCollection(records) => {
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        ExtractionResult::NotFound => println!("not found"),
    }
    Ok(())
}
