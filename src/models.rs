//! Core data models for genre harvesting.
//!
//! Wire shapes returned by the playlist and feature services live next to the
//! validated domain types the aggregation engine works with, plus the report
//! and statistics types written at the end of a run.

use serde::{Deserialize, Deserializer, Serialize};

// ============================================================================
// Upstream Wire Models (Spotify Web API)
// ============================================================================

/// Playlist descriptor as returned by playlist search. Any field may be absent.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct RawPlaylist {
    pub id: Option<String>,
    pub name: Option<String>,
}

/// One entry of a playlist track listing. `track` is null for removed or
/// unavailable items.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct RawPlaylistItem {
    pub track: Option<RawTrack>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct RawTrack {
    pub id: Option<String>, // null for local files
    pub name: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub artists: Vec<Option<RawArtist>>,
    pub album: Option<RawAlbum>,
    pub external_urls: Option<ExternalUrls>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct RawArtist {
    pub name: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct RawAlbum {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub images: Vec<Option<RawImage>>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct RawImage {
    pub url: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// Read a list that may be absent or `null` as empty.
fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ExternalUrls {
    pub spotify: Option<String>,
}

// ============================================================================
// Domain Models
// ============================================================================

/// Candidate playlist for a genre (id is always present).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Playlist {
    pub id: String,
    pub name: String,
}

/// Album artwork reference.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub url: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// Validated track. Immutable once fetched.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Track {
    pub id: String,
    pub name: String,
    pub artists: Vec<String>, // credited order
    pub album: String,
    pub images: Vec<ImageRef>,
    pub external_url: Option<String>,
    pub genre: String,
    pub playlist_id: String,
}

/// Opaque audio-feature payload.
///
/// Correlated to its track only by position in the batch response; the
/// payload is never inspected for an identifier.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FeatureVector(pub serde_json::Value);

impl FeatureVector {
    /// Wrap a response item, treating JSON `null` as an absent feature.
    pub fn from_json(value: serde_json::Value) -> Option<Self> {
        if value.is_null() {
            None
        } else {
            Some(Self(value))
        }
    }
}

/// A freshly fetched (track, features, source playlist) triple.
#[derive(Clone, Debug, PartialEq)]
pub struct AccumulationEntry {
    pub track: Track,
    pub features: FeatureVector,
    pub playlist_id: String,
}

// ============================================================================
// Validation
// ============================================================================

/// Why a raw playlist entry was not accepted as a track.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RejectReason {
    /// The listing contained `null` in place of an item
    NullEntry,
    /// Item present but carries no track payload
    MissingTrack,
    /// Track payload without an identifier (local files, unavailable tracks)
    MissingId,
}

impl RejectReason {
    pub fn as_str(self) -> &'static str {
        match self {
            RejectReason::NullEntry => "null_entry",
            RejectReason::MissingTrack => "missing_track",
            RejectReason::MissingId => "missing_id",
        }
    }
}

/// Outcome of validating one raw playlist entry.
#[derive(Clone, Debug, PartialEq)]
pub enum EntryCheck {
    Valid(Track),
    Rejected(RejectReason),
}

// ============================================================================
// Persisted Document
// ============================================================================

/// Metadata block of a stored track document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrackMetadata {
    pub name: String,
    pub artists: Vec<String>,
    pub album: String,
    pub images: Vec<ImageRef>,
    pub external_url: Option<String>,
}

impl From<&Track> for TrackMetadata {
    fn from(track: &Track) -> Self {
        Self {
            name: track.name.clone(),
            artists: track.artists.clone(),
            album: track.album.clone(),
            images: track.images.clone(),
            external_url: track.external_url.clone(),
        }
    }
}

/// Embedding block, left empty here and filled by a downstream trainer.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingSlot {
    pub vector: Option<Vec<f32>>,
    pub model: Option<String>,
}

// ============================================================================
// Reporting
// ============================================================================

/// How a genre run ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Store already held `quota` tracks; no upstream calls were made
    AlreadySaturated,
    /// Accumulated enough fresh tracks to reach the quota
    QuotaReached,
    /// Retry budget spent before reaching the quota
    BudgetExhausted,
    /// Playlist search returned nothing usable for this genre
    NoCandidates,
    /// Enough tracks were accumulated, but concurrent genres stored some of
    /// them first
    Contended,
}

impl RunOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            RunOutcome::AlreadySaturated => "already saturated",
            RunOutcome::QuotaReached => "quota reached",
            RunOutcome::BudgetExhausted => "retry budget exhausted",
            RunOutcome::NoCandidates => "no candidate playlists",
            RunOutcome::Contended => "quota missed, tracks taken by other genres",
        }
    }
}

/// Per-genre counters for entries that did not make it into the map.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SkipCounts {
    pub malformed_entries: usize,
    pub missing_features: usize,
    pub duplicates: usize,
    pub already_stored: usize,
    pub over_playlist_cap: usize,
    pub over_quota: usize,
    pub misaligned_batches: usize,
}

/// Result of one genre run.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GenreReport {
    pub genre: String,
    pub attempts_used: usize,
    pub attempts_available: usize,
    pub existing_count: usize,
    pub accumulated: usize,
    pub newly_persisted: usize,
    pub quota: usize,
    pub outcome: RunOutcome,
    pub skipped: SkipCounts,
}

impl GenreReport {
    /// Documents stored for the genre once this run committed.
    pub fn persisted_after(&self) -> usize {
        self.existing_count + self.newly_persisted
    }
}

/// Genre whose run aborted on a fatal upstream or store error.
#[derive(Clone, Debug, Serialize)]
pub struct GenreFailure {
    pub genre: String,
    pub error: String,
}

/// Whole-run statistics, written with `--stats-json`.
#[derive(Default, Debug, Clone, Serialize)]
pub struct HarvestStats {
    pub genres: Vec<GenreReport>,
    pub failures: Vec<GenreFailure>,
    pub total_attempts: usize,
    pub total_new_tracks: usize,
    pub elapsed_seconds: f64,
}

impl HarvestStats {
    pub fn record(&mut self, report: GenreReport) {
        self.total_attempts += report.attempts_used;
        self.total_new_tracks += report.newly_persisted;
        self.genres.push(report);
    }

    pub fn record_failure(&mut self, genre: &str, error: &anyhow::Error) {
        self.failures.push(GenreFailure {
            genre: genre.to_string(),
            error: format!("{:#}", error),
        });
    }

    /// Genres that ended at or above quota, including already saturated ones.
    pub fn saturated_genres(&self) -> usize {
        self.genres
            .iter()
            .filter(|r| r.persisted_after() >= r.quota)
            .count()
    }

    /// Log stats as pretty JSON at debug level
    pub fn log_summary(&self) {
        if let Ok(json) = serde_json::to_string_pretty(self) {
            log::debug!("[STATS]\n{}", json);
        }
    }

    /// Write stats to a JSON file
    pub fn write_to_file(&self, path: &std::path::Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}
