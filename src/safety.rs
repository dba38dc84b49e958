//! Safety checks run before any upstream call is made.
//!
//! A bad configuration would otherwise surface only after the first genre
//! had already spent requests, so everything is validated up front.

use anyhow::{bail, Result};

use crate::config::HarvestConfig;
use crate::feature_source::MAX_FEATURE_BATCH;

/// Most playlists the search endpoint returns per page.
pub const MAX_CANDIDATES: usize = 50;

/// Validates a harvest configuration.
///
/// Checks:
/// - Quota and retry budget are positive
/// - At least one genre, none blank
/// - Sample size fits in one feature batch
/// - Candidate count is within what a single search page returns
/// - Store path is not a directory
pub fn validate_config(config: &HarvestConfig) -> Result<()> {
    if config.quota == 0 {
        bail!("Safety check failed: quota must be at least 1");
    }

    if config.retry_budget == 0 {
        bail!("Safety check failed: retry budget must be at least 1");
    }

    if config.genres.is_empty() {
        bail!("Safety check failed: no genres given");
    }

    if let Some(blank) = config.genres.iter().position(|g| g.trim().is_empty()) {
        bail!("Safety check failed: genre #{} is blank", blank + 1);
    }

    if config.sample_size == 0 || config.sample_size > MAX_FEATURE_BATCH {
        bail!(
            "Safety check failed: sample size {} must be within 1..={} (feature batch limit)",
            config.sample_size,
            MAX_FEATURE_BATCH
        );
    }

    if config.candidates == 0 || config.candidates > MAX_CANDIDATES {
        bail!(
            "Safety check failed: candidate count {} must be within 1..={}",
            config.candidates,
            MAX_CANDIDATES
        );
    }

    if config.store_path.is_dir() {
        bail!(
            "Safety check failed: store path '{}' is a directory",
            config.store_path.display()
        );
    }

    Ok(())
}
