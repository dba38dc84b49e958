//! Spotify Web API client (client-credentials flow).
//!
//! Only two endpoints are used: playlist search and the first page of a
//! playlist's tracks. The access token is cached and refreshed shortly
//! before it expires.

use reqwest::blocking::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::models::{RawPlaylist, RawPlaylistItem};
use crate::playlist_source::MAX_PAGE_SIZE;
use crate::upstream::{check_response, PlaylistApi, UpstreamError};

const SERVICE: &str = "spotify";
const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const API_BASE: &str = "https://api.spotify.com/v1";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

#[derive(Deserialize)]
#[cfg_attr(test, derive(Debug))]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

#[derive(Deserialize)]
struct SearchResponse {
    playlists: Option<Page>,
}

/// Paging object. Items are kept raw and decoded one by one so a single
/// malformed entry cannot fail the whole page.
#[derive(Deserialize)]
struct Page {
    #[serde(default)]
    items: Option<Vec<serde_json::Value>>,
}

impl Page {
    fn entries<T: DeserializeOwned>(self) -> Vec<Option<T>> {
        self.items
            .unwrap_or_default()
            .into_iter()
            .map(|item| {
                if item.is_null() {
                    return None;
                }
                match serde_json::from_value(item) {
                    Ok(entry) => Some(entry),
                    Err(e) => {
                        log::debug!("Skipping malformed {} page entry: {}", SERVICE, e);
                        None
                    }
                }
            })
            .collect()
    }
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

pub struct SpotifyClient {
    client: Client,
    client_id: String,
    client_secret: String,
    token: Mutex<Option<CachedToken>>,
}

impl SpotifyClient {
    pub fn new(client_id: &str, client_secret: &str) -> Result<Self, UpstreamError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| UpstreamError::transport(SERVICE, e))?;

        Ok(Self {
            client,
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            token: Mutex::new(None),
        })
    }

    fn access_token(&self) -> Result<String, UpstreamError> {
        let mut cached = self.token.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(token) = cached.as_ref() {
            if Instant::now() + TOKEN_REFRESH_MARGIN < token.expires_at {
                return Ok(token.value.clone());
            }
        }

        log::debug!("Requesting Spotify access token");
        let response = self
            .client
            .post(TOKEN_URL)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .map_err(|e| UpstreamError::transport(SERVICE, e))?;
        let body: TokenResponse = decode(check_response(SERVICE, response)?)?;

        let value = body.access_token.clone();
        *cached = Some(CachedToken {
            value: body.access_token,
            expires_at: Instant::now() + Duration::from_secs(body.expires_in),
        });
        Ok(value)
    }

    fn get<T: DeserializeOwned>(&self, url: &str, query: &[(&str, String)]) -> Result<T, UpstreamError> {
        let token = self.access_token()?;
        let response = self
            .client
            .get(url)
            .bearer_auth(token)
            .query(query)
            .send()
            .map_err(|e| UpstreamError::transport(SERVICE, e))?;

        match check_response(SERVICE, response) {
            Ok(response) => decode(response),
            Err(err) => {
                if matches!(err, UpstreamError::Status { status: 401, .. }) {
                    // Drop the token so the next call re-authenticates
                    *self.token.lock().unwrap_or_else(|e| e.into_inner()) = None;
                }
                Err(err)
            }
        }
    }
}

fn decode<T: DeserializeOwned>(response: reqwest::blocking::Response) -> Result<T, UpstreamError> {
    let text = response
        .text()
        .map_err(|e| UpstreamError::transport(SERVICE, e))?;
    parse_body(&text)
}

fn parse_body<T: DeserializeOwned>(text: &str) -> Result<T, UpstreamError> {
    serde_json::from_str(text).map_err(|e| UpstreamError::Decode {
        service: SERVICE,
        message: e.to_string(),
    })
}

impl PlaylistApi for SpotifyClient {
    fn search_playlists(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<Option<RawPlaylist>>, UpstreamError> {
        let url = format!("{}/search", API_BASE);
        let body: SearchResponse = self.get(
            &url,
            &[
                ("q", query.to_string()),
                ("type", "playlist".to_string()),
                ("limit", limit.to_string()),
                ("offset", "0".to_string()),
            ],
        )?;
        Ok(body.playlists.map(Page::entries::<RawPlaylist>).unwrap_or_default())
    }

    fn playlist_items(
        &self,
        playlist_id: &str,
        limit: usize,
    ) -> Result<Vec<Option<RawPlaylistItem>>, UpstreamError> {
        let url = format!("{}/playlists/{}/tracks", API_BASE, playlist_id);
        let body: Page = self.get(
            &url,
            &[
                ("limit", limit.min(MAX_PAGE_SIZE).to_string()),
                ("additional_types", "track".to_string()),
            ],
        )?;
        Ok(body.entries())
    }
}
