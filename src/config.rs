//! Harvest run configuration.

use std::path::PathBuf;
use std::time::Duration;

use crate::aggregator::{
    AggregatorSettings, DEFAULT_PER_PLAYLIST_CAP, DEFAULT_QUOTA, DEFAULT_RETRY_BUDGET,
};
use crate::playlist_source::{DEFAULT_CANDIDATES, DEFAULT_SAMPLE_SIZE};
use crate::rate_limit::DEFAULT_BACKOFF;

pub const DEFAULT_GENRE: &str = "Afrobeat";

#[derive(Debug, Clone)]
pub struct HarvestConfig {
    pub store_path: PathBuf,
    pub genres: Vec<String>,
    pub quota: usize,
    pub candidates: usize,
    pub sample_size: usize,
    pub per_playlist_cap: usize,
    pub retry_budget: usize,
    pub spotify_backoff: Duration,
    pub recco_backoff: Duration,
    pub shuffle: bool,
    pub seed: Option<u64>,
    pub workers: usize,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            store_path: PathBuf::from("tracks.sqlite3"),
            genres: vec![DEFAULT_GENRE.to_string()],
            quota: DEFAULT_QUOTA,
            candidates: DEFAULT_CANDIDATES,
            sample_size: DEFAULT_SAMPLE_SIZE,
            per_playlist_cap: DEFAULT_PER_PLAYLIST_CAP,
            retry_budget: DEFAULT_RETRY_BUDGET,
            spotify_backoff: DEFAULT_BACKOFF,
            recco_backoff: DEFAULT_BACKOFF,
            shuffle: true,
            seed: None,
            workers: 1,
        }
    }
}

impl HarvestConfig {
    pub fn aggregator_settings(&self) -> AggregatorSettings {
        AggregatorSettings {
            quota: self.quota,
            per_playlist_cap: self.per_playlist_cap,
            retry_budget: self.retry_budget,
        }
    }

    /// Seed for the genre at `index`, so parallel runs stay reproducible.
    pub fn seed_for(&self, index: usize) -> Option<u64> {
        self.seed.map(|s| s.wrapping_add(index as u64))
    }
}

/// Split a comma-separated genre list, trimming entries and dropping empty ones.
pub fn parse_genres(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|g| g.trim())
        .filter(|g| !g.is_empty())
        .map(|g| g.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_genres() {
        assert_eq!(
            parse_genres(" Afrobeat, Highlife ,,Juju "),
            vec!["Afrobeat", "Highlife", "Juju"]
        );
        assert!(parse_genres(" , ").is_empty());
    }

    #[test]
    fn test_seed_per_genre() {
        let config = HarvestConfig {
            seed: Some(7),
            ..Default::default()
        };
        assert_eq!(config.seed_for(0), Some(7));
        assert_eq!(config.seed_for(2), Some(9));
        assert_eq!(HarvestConfig::default().seed_for(3), None);
    }

    #[test]
    fn test_defaults() {
        let config = HarvestConfig::default();
        assert_eq!(config.genres, vec!["Afrobeat"]);
        assert_eq!(config.aggregator_settings(), AggregatorSettings::default());
    }
}
