//! Quota-bounded aggregation for one genre.
//!
//! A run checks what the store already holds, then visits playlists until the
//! accumulation map has `quota - existing` fresh entries or the retry budget
//! is spent, and finally offers the whole map to the store in one commit.
//! Every playlist visit costs one unit of budget whether or not it yields
//! anything, which bounds upstream calls per genre at `O(retry_budget)`.

use anyhow::{Context, Result};
use rustc_hash::FxHashMap;

use crate::accumulation::{AccumulationMap, Admission};
use crate::feature_source::{pair_by_position, AudioFeatureSource};
use crate::models::{
    AccumulationEntry, FeatureVector, GenreReport, Playlist, RunOutcome, SkipCounts, Track,
};
use crate::playlist_source::PlaylistSource;
use crate::store::PersistenceGateway;

pub const DEFAULT_QUOTA: usize = 50;
pub const DEFAULT_PER_PLAYLIST_CAP: usize = 10;
pub const DEFAULT_RETRY_BUDGET: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregatorSettings {
    pub quota: usize,
    /// New entries accepted from a single playlist visit
    pub per_playlist_cap: usize,
    /// Playlist visits allowed per genre run
    pub retry_budget: usize,
}

impl Default for AggregatorSettings {
    fn default() -> Self {
        Self {
            quota: DEFAULT_QUOTA,
            per_playlist_cap: DEFAULT_PER_PLAYLIST_CAP,
            retry_budget: DEFAULT_RETRY_BUDGET,
        }
    }
}

/// Merge one visit's (track, features) pairs into the map in positional order.
/// Returns the number of entries inserted.
pub fn merge_visit(
    pairs: Vec<(Track, Option<FeatureVector>)>,
    playlist_id: &str,
    per_playlist_cap: usize,
    map: &mut AccumulationMap,
    skipped: &mut SkipCounts,
) -> usize {
    let mut added = 0usize;
    for (track, features) in pairs {
        let Some(features) = features else {
            skipped.missing_features += 1;
            continue;
        };
        if added >= per_playlist_cap {
            skipped.over_playlist_cap += 1;
            continue;
        }
        let entry = AccumulationEntry {
            track,
            features,
            playlist_id: playlist_id.to_string(),
        };
        match map.admit(entry) {
            Admission::Inserted => added += 1,
            Admission::Duplicate => skipped.duplicates += 1,
            Admission::Full => skipped.over_quota += 1,
        }
    }
    added
}

pub struct TrackAggregator<'a, G: PersistenceGateway> {
    playlists: PlaylistSource,
    features: AudioFeatureSource,
    store: &'a mut G,
    settings: AggregatorSettings,
}

impl<'a, G: PersistenceGateway> TrackAggregator<'a, G> {
    pub fn new(
        playlists: PlaylistSource,
        features: AudioFeatureSource,
        store: &'a mut G,
        settings: AggregatorSettings,
    ) -> Self {
        Self {
            playlists,
            features,
            store,
            settings,
        }
    }

    /// Run one genre to completion. Errors are fatal upstream or store
    /// failures; nothing is committed for the genre when one occurs.
    pub fn run(&mut self, genre: &str) -> Result<GenreReport> {
        let quota = self.settings.quota;
        let existing = self
            .store
            .count_existing(genre)
            .with_context(|| format!("Failed to count stored tracks for '{}'", genre))?;

        let mut report = GenreReport {
            genre: genre.to_string(),
            attempts_used: 0,
            attempts_available: self.settings.retry_budget,
            existing_count: existing,
            accumulated: 0,
            newly_persisted: 0,
            quota,
            outcome: RunOutcome::AlreadySaturated,
            skipped: SkipCounts::default(),
        };

        if existing >= quota {
            log::info!("[{}] already has {}/{} tracks, skipping", genre, existing, quota);
            return Ok(report);
        }

        let mut map = AccumulationMap::new(quota - existing);
        map.seed_placeholders(
            self.store
                .load_existing_ids(genre)
                .with_context(|| format!("Failed to load stored ids for '{}'", genre))?,
        );

        let candidates = self
            .playlists
            .list_candidates(genre)
            .with_context(|| format!("Playlist search failed for '{}'", genre))?;
        if candidates.is_empty() {
            log::warn!("[{}] playlist search returned no usable playlists", genre);
            report.outcome = RunOutcome::NoCandidates;
            return Ok(report);
        }
        log::info!(
            "[{}] {} stored ({} seeded), need {} more from {} candidate playlists",
            genre,
            existing,
            map.placeholder_len(),
            map.target(),
            candidates.len()
        );

        let mut last_tried: FxHashMap<String, usize> = FxHashMap::default();
        while report.attempts_used < self.settings.retry_budget && !map.is_full() {
            let Some(playlist) = self.playlists.choose_playlist(&candidates, &last_tried) else {
                break;
            };
            let playlist = playlist.clone();
            last_tried.insert(playlist.id.clone(), report.attempts_used);
            report.attempts_used += 1;

            let added = self
                .visit(genre, &playlist, &mut map, &mut report.skipped)
                .with_context(|| format!("Visit to playlist {} failed for '{}'", playlist.id, genre))?;
            log::debug!(
                "[{}] attempt {}/{}: playlist {} ({}) added {}, {} still needed",
                genre,
                report.attempts_used,
                self.settings.retry_budget,
                playlist.id,
                playlist.name,
                added,
                map.remaining()
            );
        }

        report.accumulated = map.fresh_len();
        if map.fresh_len() > 0 {
            report.newly_persisted = self
                .store
                .commit(genre, &map)
                .with_context(|| format!("Failed to commit tracks for '{}'", genre))?;
        }

        // Decided on what was actually stored, not on what was accumulated
        report.outcome = if report.persisted_after() >= quota {
            RunOutcome::QuotaReached
        } else if map.is_full() {
            RunOutcome::Contended
        } else {
            RunOutcome::BudgetExhausted
        };

        if report.newly_persisted < report.accumulated {
            log::warn!(
                "[{}] {} accumulated tracks were already stored by another run",
                genre,
                report.accumulated - report.newly_persisted
            );
        }

        Ok(report)
    }

    /// Sample one playlist, fetch features for tracks not yet known and merge.
    fn visit(
        &mut self,
        genre: &str,
        playlist: &Playlist,
        map: &mut AccumulationMap,
        skipped: &mut SkipCounts,
    ) -> Result<usize> {
        let sample = self.playlists.sample_tracks(genre, playlist)?;
        skipped.malformed_entries += sample.rejected;

        let mut tracks: Vec<Track> = Vec::with_capacity(sample.tracks.len());
        for track in sample.tracks {
            if map.contains(&track.id) {
                skipped.duplicates += 1;
            } else {
                tracks.push(track);
            }
        }

        // Tracks another genre already stored would never count as new
        let ids: Vec<String> = tracks.iter().map(|t| t.id.clone()).collect();
        let stored = self.store.stored_ids(&ids)?;
        if !stored.is_empty() {
            let before = tracks.len();
            tracks.retain(|t| !stored.contains(&t.id));
            skipped.already_stored += before - tracks.len();
        }
        if tracks.is_empty() {
            return Ok(0);
        }

        let ids: Vec<String> = tracks.iter().map(|t| t.id.clone()).collect();
        let features = self.features.fetch(&ids)?;
        let batch = pair_by_position(tracks, features);
        if batch.misaligned {
            skipped.misaligned_batches += 1;
        }

        Ok(merge_visit(
            batch.pairs,
            &playlist.id,
            self.settings.per_playlist_cap,
            map,
            skipped,
        ))
    }
}
