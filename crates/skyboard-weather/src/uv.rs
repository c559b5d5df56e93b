//! UV index lookup for the detail view.
//! Best effort: every failure is logged and reported as `None`.

use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use skyboard_core::UvConfig;

const REQUEST_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Deserialize)]
struct UvResponse {
    result: UvResult,
}

#[derive(Debug, Deserialize)]
struct UvResult {
    uv: f64,
}

#[derive(Debug, Clone)]
pub struct UvIndexClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl UvIndexClient {
    pub fn new(base_url: &str, api_key: Option<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Failed to create UV client, using defaults: {}", e);
                Client::new()
            });

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    pub fn from_config(config: &UvConfig) -> Self {
        Self::new(&config.api_base, config.resolved_api_key())
    }

    /// Current UV index at the given coordinates.
    pub async fn uv_index(&self, lat: f64, lon: f64) -> Option<f64> {
        let Some(key) = &self.api_key else {
            tracing::debug!("UV index requested without an API key");
            return None;
        };

        let url = format!("{}/uv", self.base_url);
        let response = match self
            .client
            .get(&url)
            .header("x-access-token", key)
            .query(&[("lat", lat), ("lng", lon)])
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                tracing::debug!("UV index request failed: {}", e);
                return None;
            }
        };

        if !response.status().is_success() {
            tracing::debug!("UV index returned status {}", response.status());
            return None;
        }

        match response.json::<UvResponse>().await {
            Ok(body) => Some(body.result.uv),
            Err(e) => {
                tracing::debug!("UV index parse error: {}", e);
                None
            }
        }
    }
}
