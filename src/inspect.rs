//! Offline inspection of saved backend responses.
//!
//! `adminres extract` and `adminres assets` read a JSON document from a file
//! (or `-` for stdin) and run the shape extractor over it without touching
//! the network. Useful for checking how a new endpoint's payload will be
//! normalized before wiring it into a view.

use anyhow::{Context, Result};
use serde_json::Value;
use std::io::Read;
use std::path::Path;

use admin_resilience_core::extract::{extract_asset_urls, extract_collection_with};
use admin_resilience_core::models::ExtractionResult;

use crate::config::Config;

/// Read a JSON document from `path`, or from stdin when `path` is `-`.
pub fn read_json_input(path: &Path) -> Result<Value> {
    let content = if path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read JSON from stdin")?;
        buf
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read input file: {}", path.display()))?
    };

    serde_json::from_str(&content).with_context(|| format!("Invalid JSON in {}", path.display()))
}

/// Extract the record collection from a saved response.
pub fn extract_file(config: &Config, path: &Path) -> Result<ExtractionResult> {
    let raw = read_json_input(path)?;
    Ok(extract_collection_with(&raw, &config.extraction.policy()))
}

/// Run `adminres extract`: print the collection as JSON, or `not found`.
pub fn run_extract(config: &Config, path: &Path) -> Result<()> {
    match extract_file(config, path)? {
        ExtractionResult::RecordCollection(records) => {
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        ExtractionResult::NotFound => println!("not found"),
    }
    Ok(())
}

/// Run `adminres assets`: print media references, one per line.
pub fn run_assets(config: &Config, path: &Path, limit: Option<usize>) -> Result<()> {
    let raw = read_json_input(path)?;
    let limit = limit.unwrap_or(config.extraction.asset_limit);
    for url in extract_asset_urls(&raw, limit) {
        println!("{}", url);
    }
    Ok(())
}
