//! Upstream service seams.
//!
//! The aggregation engine talks to the playlist service and the feature
//! service only through [`PlaylistApi`] and [`AudioFeatureApi`]. Both report
//! failures as [`UpstreamError`] so the rate-limit signal can be told apart
//! from everything else.

use reqwest::blocking::Response;
use reqwest::header::RETRY_AFTER;
use reqwest::StatusCode;
use std::time::Duration;
use thiserror::Error;

use crate::models::{RawPlaylist, RawPlaylistItem};

/// Failure reported by an upstream call.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// HTTP 429. `retry_after` is the server hint, if it sent a usable one.
    #[error("{service} rate limited the request")]
    RateLimited {
        service: &'static str,
        retry_after: Option<Duration>,
    },

    /// Any other non-success status (auth failure, bad query, server error)
    #[error("{service} returned HTTP {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("{service} request failed: {source}")]
    Transport {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{service} returned an unreadable response: {message}")]
    Decode {
        service: &'static str,
        message: String,
    },

    /// The caller asked for something that can never succeed
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl UpstreamError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, UpstreamError::RateLimited { .. })
    }

    pub fn transport(service: &'static str, source: reqwest::Error) -> Self {
        UpstreamError::Transport { service, source }
    }
}

/// Playlist search and playlist track listing.
pub trait PlaylistApi: Send + Sync {
    /// Search playlists for `query`; items may be null.
    fn search_playlists(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<Option<RawPlaylist>>, UpstreamError>;

    /// First page (at most `limit`, capped at 100 by the service) of a playlist's items.
    fn playlist_items(
        &self,
        playlist_id: &str,
        limit: usize,
    ) -> Result<Vec<Option<RawPlaylistItem>>, UpstreamError>;
}

/// Batch audio-feature lookup.
pub trait AudioFeatureApi: Send + Sync {
    /// Look up features for a comma-joined id list. The result is aligned with
    /// the input by position; `null` items stand for ids without features.
    fn audio_features(&self, joined_ids: &str) -> Result<Vec<serde_json::Value>, UpstreamError>;
}

/// Parse a `Retry-After` header value given in whole seconds.
///
/// HTTP-date values are not used by either service and yield `None`, which
/// makes the executor fall back to its default backoff.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

/// Map a response to `Ok` on success, `RateLimited` on 429 and `Status`
/// for every other failure status.
pub fn check_response(service: &'static str, response: Response) -> Result<Response, UpstreamError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);
        return Err(UpstreamError::RateLimited {
            service,
            retry_after,
        });
    }

    let body = response.text().unwrap_or_default();
    Err(UpstreamError::Status {
        service,
        status: status.as_u16(),
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_retry_after_seconds() {
        assert_eq!(parse_retry_after("2"), Some(Duration::from_secs(2)));
        assert_eq!(parse_retry_after(" 30 "), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_parse_retry_after_unusable() {
        assert_eq!(parse_retry_after(""), None);
        assert_eq!(parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"), None);
        assert_eq!(parse_retry_after("-1"), None);
    }

    #[test]
    fn test_is_rate_limited() {
        let limited = UpstreamError::RateLimited {
            service: "spotify",
            retry_after: None,
        };
        let fatal = UpstreamError::Status {
            service: "spotify",
            status: 401,
            body: "invalid token".to_string(),
        };
        assert!(limited.is_rate_limited());
        assert!(!fatal.is_rate_limited());
        assert!(fatal.to_string().contains("HTTP 401"));
    }
}
