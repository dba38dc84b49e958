//! In-memory fakes shared by the unit tests.

use rustc_hash::{FxHashMap, FxHashSet};
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::models::{
    AccumulationEntry, FeatureVector, RawAlbum, RawArtist, RawPlaylist, RawPlaylistItem, RawTrack,
    Track,
};
use crate::rate_limit::Sleeper;
use crate::upstream::{AudioFeatureApi, PlaylistApi, UpstreamError};

#[derive(Default)]
pub struct RecordingSleeper {
    waits: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn waits(&self) -> Vec<Duration> {
        self.waits.lock().unwrap().clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.waits.lock().unwrap().push(duration);
    }
}

pub fn fresh_entry(id: &str, genre: &str) -> AccumulationEntry {
    AccumulationEntry {
        track: Track {
            id: id.to_string(),
            name: format!("song {}", id),
            artists: vec!["Femi Kuti".to_string()],
            album: "Day by Day".to_string(),
            images: vec![],
            external_url: None,
            genre: genre.to_string(),
            playlist_id: "p1".to_string(),
        },
        features: FeatureVector(json!({"energy": 0.8})),
        playlist_id: "p1".to_string(),
    }
}

pub fn raw_playlist(id: &str) -> Option<RawPlaylist> {
    Some(RawPlaylist {
        id: Some(id.to_string()),
        name: Some(format!("{} mix", id)),
    })
}

pub fn raw_item(id: &str) -> Option<RawPlaylistItem> {
    Some(RawPlaylistItem {
        track: Some(RawTrack {
            id: Some(id.to_string()),
            name: Some(format!("song {}", id)),
            artists: vec![Some(RawArtist {
                name: Some("Tony Allen".to_string()),
            })],
            album: Some(RawAlbum {
                name: Some("Afrobeat Live".to_string()),
                images: vec![],
            }),
            external_urls: None,
        }),
    })
}

pub fn raw_items(ids: &[&str]) -> Vec<Option<RawPlaylistItem>> {
    ids.iter().map(|id| raw_item(id)).collect()
}

/// Playlist service serving fixed playlists and track listings.
#[derive(Default)]
pub struct FakePlaylistApi {
    pub playlists: Vec<Option<RawPlaylist>>,
    pub items: FxHashMap<String, Vec<Option<RawPlaylistItem>>>,
    pub search_errors: Mutex<VecDeque<UpstreamError>>,
    pub items_errors: Mutex<VecDeque<UpstreamError>>,
    pub search_calls: AtomicUsize,
    pub items_calls: AtomicUsize,
    pub last_search_limit: AtomicUsize,
}

impl FakePlaylistApi {
    pub fn with_playlist(mut self, id: &str, track_ids: &[&str]) -> Self {
        self.playlists.push(raw_playlist(id));
        self.items.insert(id.to_string(), raw_items(track_ids));
        self
    }

    pub fn total_calls(&self) -> usize {
        self.search_calls.load(Ordering::SeqCst) + self.items_calls.load(Ordering::SeqCst)
    }
}

impl PlaylistApi for FakePlaylistApi {
    fn search_playlists(
        &self,
        _query: &str,
        limit: usize,
    ) -> Result<Vec<Option<RawPlaylist>>, UpstreamError> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        self.last_search_limit.store(limit, Ordering::SeqCst);
        if let Some(err) = self.search_errors.lock().unwrap().pop_front() {
            return Err(err);
        }
        Ok(self.playlists.iter().take(limit).cloned().collect())
    }

    fn playlist_items(
        &self,
        playlist_id: &str,
        limit: usize,
    ) -> Result<Vec<Option<RawPlaylistItem>>, UpstreamError> {
        self.items_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.items_errors.lock().unwrap().pop_front() {
            return Err(err);
        }
        Ok(self
            .items
            .get(playlist_id)
            .map(|items| items.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }
}

/// Feature service echoing each requested id inside its payload so tests can
/// check positional pairing.
#[derive(Default)]
pub struct FakeFeatureApi {
    /// Ids answered with `null`
    pub missing: FxHashSet<String>,
    /// Drop the response tail after this many items
    pub truncate_to: Option<usize>,
    pub requests: Mutex<Vec<String>>,
}

impl FakeFeatureApi {
    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl AudioFeatureApi for FakeFeatureApi {
    fn audio_features(&self, joined_ids: &str) -> Result<Vec<serde_json::Value>, UpstreamError> {
        self.requests.lock().unwrap().push(joined_ids.to_string());
        let mut content: Vec<serde_json::Value> = joined_ids
            .split(',')
            .map(|id| {
                if self.missing.contains(id) {
                    serde_json::Value::Null
                } else {
                    json!({ "probe": id, "tempo": 120.0 })
                }
            })
            .collect();
        if let Some(len) = self.truncate_to {
            content.truncate(len);
        }
        Ok(content)
    }
}
