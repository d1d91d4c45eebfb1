//! `adminres candidates` and `adminres resolve`.

use anyhow::Result;
use std::time::Duration;

use admin_resilience_core::assets::{resolve_first, CandidateList};

use crate::config::Config;
use crate::probe::HttpAssetProbe;

/// Candidate URLs for `reference` under the configured asset locations.
pub fn candidate_list(config: &Config, reference: &str) -> Result<CandidateList> {
    let locations = config.assets.locations()?;
    Ok(locations.candidates(reference))
}

pub fn run_candidates(config: &Config, reference: &str) -> Result<()> {
    let candidates = candidate_list(config, reference)?;
    if candidates.is_empty() {
        println!("placeholder");
        return Ok(());
    }
    for url in &candidates {
        println!("{}", url);
    }
    Ok(())
}

/// Probe each candidate over HTTP and print the first that loads, or
/// `placeholder` when none do.
pub async fn run_resolve(config: &Config, reference: &str) -> Result<()> {
    let candidates = candidate_list(config, reference)?;
    let tried = candidates.len();
    let probe = HttpAssetProbe::new(Duration::from_secs(config.api.timeout_secs))?;

    match resolve_first(candidates, &probe).await {
        Some(url) => println!("{}", url),
        None => {
            tracing::warn!(reference, tried, "no candidate loaded; showing placeholder");
            println!("placeholder");
        }
    }
    Ok(())
}
