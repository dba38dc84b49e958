//! Runs the configured genres, sequentially or on a rayon pool.
//!
//! Each worker owns its own store connection; cross-genre uniqueness comes
//! from the store's primary key, not from any shared in-process state.

use anyhow::{anyhow, Context, Result};
use rayon::prelude::*;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::aggregator::TrackAggregator;
use crate::config::HarvestConfig;
use crate::feature_source::AudioFeatureSource;
use crate::models::{GenreReport, HarvestStats};
use crate::playlist_source::PlaylistSource;
use crate::progress::{create_genre_bar, genre_finished, genre_line};
use crate::rate_limit::RateLimitedExecutor;
use crate::store::SqliteTrackStore;
use crate::upstream::{AudioFeatureApi, PlaylistApi};

/// Upstream services shared by every genre run.
#[derive(Clone)]
pub struct Services {
    pub playlists: Arc<dyn PlaylistApi>,
    pub features: Arc<dyn AudioFeatureApi>,
}

/// Run one genre against an open store.
pub fn run_genre(
    config: &HarvestConfig,
    services: &Services,
    index: usize,
    genre: &str,
    store: &mut SqliteTrackStore,
) -> Result<GenreReport> {
    let mut playlists = PlaylistSource::new(
        services.playlists.clone(),
        RateLimitedExecutor::new("spotify", config.spotify_backoff),
        config.candidates,
        config.sample_size,
    )
    .with_shuffle(config.shuffle);
    if let Some(seed) = config.seed_for(index) {
        playlists = playlists.with_seed(seed);
    }
    let features = AudioFeatureSource::new(
        services.features.clone(),
        RateLimitedExecutor::new("reccobeats", config.recco_backoff),
    );

    TrackAggregator::new(playlists, features, store, config.aggregator_settings()).run(genre)
}

/// Run every configured genre. A failed genre is recorded in the stats and
/// does not stop the others.
pub fn run_harvest(config: &HarvestConfig, services: &Services) -> Result<HarvestStats> {
    let start = Instant::now();
    let total = config.genres.len() as u64;
    let pb = create_genre_bar(config.genres.len());

    let finish = |report: &Result<GenreReport>, genre: &str, done: u64| {
        let line = match report {
            Ok(report) => genre_line(report),
            Err(e) => format!("{}: FAILED ({:#})", genre, e),
        };
        genre_finished(&pb, done, total, &line);
    };

    let results: Vec<Result<GenreReport>> = if config.workers > 1 {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.workers)
            .build()
            .context("Failed to build worker pool")?;
        let done = AtomicU64::new(0);

        pool.install(|| {
            config
                .genres
                .par_iter()
                .enumerate()
                .map_init(
                    || SqliteTrackStore::open(&config.store_path),
                    |store, (index, genre)| {
                        let report = match store {
                            Ok(store) => run_genre(config, services, index, genre, store),
                            Err(e) => Err(anyhow!("{:#}", e)),
                        };
                        let n = done.fetch_add(1, Ordering::Relaxed) + 1;
                        finish(&report, genre, n);
                        report
                    },
                )
                .collect()
        })
    } else {
        let mut store = SqliteTrackStore::open(&config.store_path)?;
        config
            .genres
            .iter()
            .enumerate()
            .map(|(index, genre)| {
                let report = run_genre(config, services, index, genre, &mut store);
                finish(&report, genre, index as u64 + 1);
                report
            })
            .collect()
    };
    pb.finish_and_clear();

    let mut stats = HarvestStats::default();
    for (genre, result) in config.genres.iter().zip(results) {
        match result {
            Ok(report) => stats.record(report),
            Err(e) => {
                log::error!("[{}] aborted: {:#}", genre, e);
                stats.record_failure(genre, &e);
            }
        }
    }
    stats.elapsed_seconds = start.elapsed().as_secs_f64();
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RunOutcome;
    use crate::store::PersistenceGateway;
    use crate::test_support::{FakeFeatureApi, FakePlaylistApi};
    use crate::upstream::UpstreamError;
    use std::path::Path;

    fn config(path: &Path, genres: &[&str], workers: usize) -> HarvestConfig {
        HarvestConfig {
            store_path: path.to_path_buf(),
            genres: genres.iter().map(|g| g.to_string()).collect(),
            quota: 5,
            retry_budget: 3,
            seed: Some(3),
            workers,
            ..Default::default()
        }
    }

    #[test]
    fn test_sequential_genres_share_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tracks.sqlite3");
        let services = Services {
            playlists: Arc::new(FakePlaylistApi::default().with_playlist("p1", &["a", "b", "c"])),
            features: Arc::new(FakeFeatureApi::default()),
        };

        let stats = run_harvest(&config(&path, &["Afrobeat", "Highlife"], 1), &services).unwrap();

        assert_eq!(stats.genres.len(), 2);
        assert_eq!(stats.genres[0].newly_persisted, 3);
        assert_eq!(stats.genres[1].newly_persisted, 0);
        assert_eq!(stats.genres[1].skipped.already_stored, 9);
        assert_eq!(stats.total_new_tracks, 3);
        assert!(stats.failures.is_empty());
    }

    #[test]
    fn test_failed_genre_does_not_stop_others() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tracks.sqlite3");
        let playlists = FakePlaylistApi::default().with_playlist("p1", &["a", "b"]);
        playlists
            .search_errors
            .lock()
            .unwrap()
            .push_back(UpstreamError::Status {
                service: "spotify",
                status: 401,
                body: "bad token".to_string(),
            });
        let services = Services {
            playlists: Arc::new(playlists),
            features: Arc::new(FakeFeatureApi::default()),
        };

        let stats = run_harvest(&config(&path, &["Afrobeat", "Highlife"], 1), &services).unwrap();

        assert_eq!(stats.failures.len(), 1);
        assert_eq!(stats.failures[0].genre, "Afrobeat");
        assert!(stats.failures[0].error.contains("HTTP 401"));
        assert_eq!(stats.genres.len(), 1);
        assert_eq!(stats.genres[0].genre, "Highlife");
        assert_eq!(stats.genres[0].newly_persisted, 2);
    }

    #[test]
    fn test_parallel_workers_never_store_an_id_twice() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tracks.sqlite3");
        let services = Services {
            playlists: Arc::new(
                FakePlaylistApi::default()
                    .with_playlist("p1", &["a", "b", "c", "d"])
                    .with_playlist("p2", &["c", "d", "e", "f"]),
            ),
            features: Arc::new(FakeFeatureApi::default()),
        };
        let genres = ["Afrobeat", "Highlife", "Juju", "Fuji"];

        let stats = run_harvest(&config(&path, &genres, 4), &services).unwrap();

        let store = SqliteTrackStore::open(&path).unwrap();
        let per_genre: usize = genres.iter().map(|g| store.count_existing(g).unwrap()).sum();
        assert_eq!(per_genre, store.total_documents().unwrap());
        assert_eq!(stats.total_new_tracks, store.total_documents().unwrap());
        assert!(store.total_documents().unwrap() <= 6);
        assert!(stats
            .genres
            .iter()
            .all(|r| r.outcome != RunOutcome::AlreadySaturated));
    }
}
