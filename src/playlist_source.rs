//! Candidate playlists and per-playlist track samples.
//!
//! Every upstream call goes through the rate-limited executor. Raw listing
//! entries pass through [`validate_entry`] before they become [`Track`]s;
//! rejected entries are logged and counted, never fatal.

use rand::rngs::StdRng;
use rand::seq::{index, IndexedRandom, SliceRandom};
use rand::SeedableRng;
use rustc_hash::FxHashMap;
use std::sync::Arc;

use crate::models::{EntryCheck, ImageRef, Playlist, RawPlaylistItem, RejectReason, Track};
use crate::rate_limit::RateLimitedExecutor;
use crate::upstream::{PlaylistApi, UpstreamError};

/// Largest page the playlist listing endpoint returns.
pub const MAX_PAGE_SIZE: usize = 100;

/// Candidates requested per genre search.
pub const DEFAULT_CANDIDATES: usize = 20;

/// Tracks drawn from each visited playlist.
pub const DEFAULT_SAMPLE_SIZE: usize = 40;

/// Tracks sampled from one playlist visit, in listing order.
#[derive(Debug, Default)]
pub struct TrackSample {
    pub tracks: Vec<Track>,
    pub rejected: usize,
}

/// Validate one raw listing entry. The only place raw entries become tracks.
pub fn validate_entry(raw: Option<RawPlaylistItem>, genre: &str, playlist_id: &str) -> EntryCheck {
    let Some(item) = raw else {
        return EntryCheck::Rejected(RejectReason::NullEntry);
    };
    let Some(track) = item.track else {
        return EntryCheck::Rejected(RejectReason::MissingTrack);
    };
    let id = match track.id {
        Some(id) if !id.trim().is_empty() => id,
        _ => return EntryCheck::Rejected(RejectReason::MissingId),
    };

    let (album, images) = match track.album {
        Some(album) => (album.name.unwrap_or_default(), album.images),
        None => (String::new(), Vec::new()),
    };
    // Images without a url are dropped, the track itself is kept
    let images = images
        .into_iter()
        .flatten()
        .filter_map(|img| {
            img.url.map(|url| ImageRef {
                url,
                width: img.width,
                height: img.height,
            })
        })
        .collect();

    EntryCheck::Valid(Track {
        id,
        name: track.name.unwrap_or_default(),
        artists: track
            .artists
            .into_iter()
            .flatten()
            .filter_map(|a| a.name)
            .collect(),
        album,
        images,
        external_url: track.external_urls.and_then(|u| u.spotify),
        genre: genre.to_string(),
        playlist_id: playlist_id.to_string(),
    })
}

pub struct PlaylistSource {
    api: Arc<dyn PlaylistApi>,
    executor: RateLimitedExecutor,
    candidate_limit: usize,
    sample_size: usize,
    shuffle: bool,
    rng: StdRng,
}

impl PlaylistSource {
    pub fn new(
        api: Arc<dyn PlaylistApi>,
        executor: RateLimitedExecutor,
        candidate_limit: usize,
        sample_size: usize,
    ) -> Self {
        Self {
            api,
            executor,
            candidate_limit,
            sample_size,
            shuffle: true,
            rng: StdRng::from_os_rng(),
        }
    }

    /// Fix the random stream (playlist choice, shuffling and sampling).
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn with_shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    /// Search candidate playlists for a genre, dropping null or id-less entries.
    pub fn list_candidates(&mut self, genre: &str) -> Result<Vec<Playlist>, UpstreamError> {
        let query = genre.trim();
        if query.is_empty() {
            return Err(UpstreamError::InvalidRequest(
                "genre must not be empty".to_string(),
            ));
        }

        let limit = self.candidate_limit;
        let raw = self
            .executor
            .execute(|| self.api.search_playlists(query, limit))?;
        let returned = raw.len();

        let mut playlists: Vec<Playlist> = raw
            .into_iter()
            .flatten()
            .filter_map(|p| match p.id {
                Some(id) if !id.is_empty() => Some(Playlist {
                    id,
                    name: p.name.unwrap_or_default(),
                }),
                _ => None,
            })
            .collect();

        if playlists.len() < returned {
            log::debug!(
                "[{}] dropped {} empty playlist entries from search",
                genre,
                returned - playlists.len()
            );
        }

        if self.shuffle {
            playlists.shuffle(&mut self.rng);
        }
        Ok(playlists)
    }

    /// Draw up to `sample_size` valid tracks from the first page of a playlist.
    pub fn sample_tracks(&mut self, genre: &str, playlist: &Playlist) -> Result<TrackSample, UpstreamError> {
        let raw = self
            .executor
            .execute(|| self.api.playlist_items(&playlist.id, MAX_PAGE_SIZE))?;

        let mut cleaned = Vec::with_capacity(raw.len());
        let mut rejected = 0usize;
        for entry in raw {
            match validate_entry(entry, genre, &playlist.id) {
                EntryCheck::Valid(track) => cleaned.push(track),
                EntryCheck::Rejected(reason) => {
                    rejected += 1;
                    log::debug!(
                        "[{}] skipped entry in playlist {}: {}",
                        genre,
                        playlist.id,
                        reason.as_str()
                    );
                }
            }
        }

        if cleaned.len() <= self.sample_size {
            return Ok(TrackSample {
                tracks: cleaned,
                rejected,
            });
        }

        // Keep listing order so merge order within a visit stays positional
        let mut keep = vec![false; cleaned.len()];
        for i in index::sample(&mut self.rng, cleaned.len(), self.sample_size) {
            keep[i] = true;
        }
        let tracks = cleaned
            .into_iter()
            .zip(keep)
            .filter_map(|(t, k)| k.then_some(t))
            .collect();

        Ok(TrackSample { tracks, rejected })
    }

    /// Pick a random untried candidate; once all were tried, the least
    /// recently tried one. `last_tried` maps playlist id to its last attempt.
    pub fn choose_playlist<'c>(
        &mut self,
        candidates: &'c [Playlist],
        last_tried: &FxHashMap<String, usize>,
    ) -> Option<&'c Playlist> {
        let untried: Vec<&Playlist> = candidates
            .iter()
            .filter(|p| !last_tried.contains_key(&p.id))
            .collect();
        if let Some(playlist) = untried.choose(&mut self.rng) {
            return Some(*playlist);
        }
        candidates
            .iter()
            .min_by_key(|p| last_tried.get(&p.id).copied().unwrap_or(0))
    }
}
