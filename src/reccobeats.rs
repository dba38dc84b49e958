//! ReccoBeats audio-features client.

use reqwest::blocking::Client;
use serde::Deserialize;
use std::time::Duration;

use crate::upstream::{check_response, AudioFeatureApi, UpstreamError};

const SERVICE: &str = "reccobeats";
const FEATURES_URL: &str = "https://api.reccobeats.com/v1/audio-features";

#[derive(Deserialize)]
struct FeaturesResponse {
    #[serde(default)]
    content: Vec<serde_json::Value>,
}

pub struct ReccoBeatsClient {
    client: Client,
}

impl ReccoBeatsClient {
    pub fn new() -> Result<Self, UpstreamError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| UpstreamError::transport(SERVICE, e))?;
        Ok(Self { client })
    }
}

fn parse_content(text: &str) -> Result<Vec<serde_json::Value>, UpstreamError> {
    serde_json::from_str::<FeaturesResponse>(text)
        .map(|body| body.content)
        .map_err(|e| UpstreamError::Decode {
            service: SERVICE,
            message: e.to_string(),
        })
}

impl AudioFeatureApi for ReccoBeatsClient {
    fn audio_features(&self, joined_ids: &str) -> Result<Vec<serde_json::Value>, UpstreamError> {
        let response = self
            .client
            .get(FEATURES_URL)
            .header(reqwest::header::ACCEPT, "application/json")
            .query(&[("ids", joined_ids)])
            .send()
            .map_err(|e| UpstreamError::transport(SERVICE, e))?;

        let text = check_response(SERVICE, response)?
            .text()
            .map_err(|e| UpstreamError::transport(SERVICE, e))?;
        parse_content(&text)
    }
}
