//! Batch audio-feature lookup and positional pairing.

use std::sync::Arc;

use crate::models::{FeatureVector, Track};
use crate::rate_limit::RateLimitedExecutor;
use crate::upstream::{AudioFeatureApi, UpstreamError};

/// Most ids the feature service accepts in one request.
pub const MAX_FEATURE_BATCH: usize = 40;

pub struct AudioFeatureSource {
    api: Arc<dyn AudioFeatureApi>,
    executor: RateLimitedExecutor,
}

impl AudioFeatureSource {
    pub fn new(api: Arc<dyn AudioFeatureApi>, executor: RateLimitedExecutor) -> Self {
        Self { api, executor }
    }

    /// One batch call for `ids`; the result is in response order, `None`
    /// where the service had no features. No call is made for an empty list.
    pub fn fetch(&self, ids: &[String]) -> Result<Vec<Option<FeatureVector>>, UpstreamError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        if ids.len() > MAX_FEATURE_BATCH {
            return Err(UpstreamError::InvalidRequest(format!(
                "{} ids exceed the feature batch limit of {}",
                ids.len(),
                MAX_FEATURE_BATCH
            )));
        }

        let joined = ids.join(",");
        let content = self.executor.execute(|| self.api.audio_features(&joined))?;
        Ok(content.into_iter().map(FeatureVector::from_json).collect())
    }
}

/// Tracks zipped with their features by position.
#[derive(Debug, Default)]
pub struct PairedBatch {
    pub pairs: Vec<(Track, Option<FeatureVector>)>,
    /// Set when the feature list length disagreed with the track list
    pub misaligned: bool,
}

/// Zip tracks against the features fetched for their ids, in order.
///
/// A length mismatch is truncated to the overlap and logged; items are never
/// shifted to fill a gap.
pub fn pair_by_position(tracks: Vec<Track>, features: Vec<Option<FeatureVector>>) -> PairedBatch {
    let misaligned = tracks.len() != features.len();
    if misaligned {
        log::warn!(
            "Feature response has {} items for {} requested ids, keeping the first {}",
            features.len(),
            tracks.len(),
            tracks.len().min(features.len())
        );
    }

    PairedBatch {
        pairs: tracks.into_iter().zip(features).collect(),
        misaligned,
    }
}
