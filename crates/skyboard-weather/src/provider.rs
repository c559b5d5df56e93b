//! HTTP gateway to the external weather provider.
//!
//! Stateless: one outbound request per call, no retries, no caching.

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

use skyboard_core::WeatherConfig;

use crate::error::WeatherError;
use crate::types::{ConditionsSnapshot, Coord, ForecastSnapshot, LocationSummary, Units};

const DEFAULT_SEARCH_LIMIT: usize = 5;

/// Domain operations offered by a weather provider.
#[async_trait]
pub trait WeatherGateway: Send + Sync {
    /// Current conditions for a city name.
    async fn current_conditions(
        &self,
        city: &str,
        units: Units,
    ) -> Result<ConditionsSnapshot, WeatherError>;

    /// Multi-day forecast for a city name.
    async fn forecast(&self, city: &str, units: Units) -> Result<ForecastSnapshot, WeatherError>;

    /// Up to `search_limit` locations whose name starts like `partial`.
    /// Zero matches is an empty vec, not an error.
    async fn search_by_name(&self, partial: &str) -> Result<Vec<LocationSummary>, WeatherError>;

    /// Current conditions for a coordinate pair.
    async fn current_conditions_by_coords(
        &self,
        lat: f64,
        lon: f64,
        units: Units,
    ) -> Result<ConditionsSnapshot, WeatherError>;
}

#[derive(Debug, Deserialize)]
struct FindResponse {
    #[serde(default)]
    list: Vec<FindItem>,
}

#[derive(Debug, Deserialize)]
struct FindItem {
    name: String,
    #[serde(default)]
    coord: Option<Coord>,
    #[serde(default)]
    sys: Option<FindSys>,
}

#[derive(Debug, Deserialize)]
struct FindSys {
    #[serde(default)]
    country: Option<String>,
}

impl From<FindItem> for LocationSummary {
    fn from(item: FindItem) -> Self {
        Self {
            name: item.name,
            country: item.sys.and_then(|s| s.country),
            coord: item.coord,
        }
    }
}

/// OpenWeatherMap-compatible gateway.
#[derive(Debug, Clone)]
pub struct OpenWeatherGateway {
    client: Arc<Client>,
    base_url: String,
    api_key: Option<String>,
    search_limit: usize,
}

impl OpenWeatherGateway {
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, WeatherError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client: Arc::new(client),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            search_limit: DEFAULT_SEARCH_LIMIT,
        })
    }

    pub fn from_config(config: &WeatherConfig) -> Result<Self, WeatherError> {
        let gateway = Self::new(
            &config.api_base,
            config.resolved_api_key(),
            Duration::from_secs(config.request_timeout_secs),
        )?;
        Ok(gateway.with_search_limit(config.search_limit))
    }

    pub fn with_search_limit(mut self, limit: usize) -> Self {
        self.search_limit = limit;
        self
    }

    /// GET `{base}/{path}` with the API key appended, returning the JSON body.
    ///
    /// Non-2xx responses become `Provider` errors carrying the status and the
    /// provider's `message` field when it sent one.
    async fn get_json(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<serde_json::Value, WeatherError> {
        let url = format!("{}/{}", self.base_url, path);

        let mut request = self.client.get(&url).query(query);
        if let Some(key) = &self.api_key {
            request = request.query(&[("appid", key)]);
        }

        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = provider_message(&text)
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string());
            tracing::debug!("Provider returned {} for /{}: {}", status, path, message);
            return Err(WeatherError::Provider {
                status: Some(status.as_u16()),
                message,
            });
        }

        Ok(response.json().await?)
    }

    /// Fetch a location-scoped resource, mapping "no such place" to `NotFound`.
    async fn get_location<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        subject: &str,
    ) -> Result<T, WeatherError> {
        let body = match self.get_json(path, query).await {
            Ok(body) => body,
            Err(WeatherError::Provider {
                status: Some(404), ..
            }) => return Err(WeatherError::NotFound(subject.to_string())),
            Err(e) => return Err(e),
        };

        if body_reports_not_found(&body) {
            return Err(WeatherError::NotFound(subject.to_string()));
        }

        serde_json::from_value(body).map_err(|e| WeatherError::Parse(e.to_string()))
    }
}

#[async_trait]
impl WeatherGateway for OpenWeatherGateway {
    #[instrument(skip(self), level = "debug")]
    async fn current_conditions(
        &self,
        city: &str,
        units: Units,
    ) -> Result<ConditionsSnapshot, WeatherError> {
        let query = [("q", city.to_string()), ("units", units.as_str().to_string())];
        self.get_location("weather", &query, city).await
    }

    #[instrument(skip(self), level = "debug")]
    async fn forecast(&self, city: &str, units: Units) -> Result<ForecastSnapshot, WeatherError> {
        let query = [("q", city.to_string()), ("units", units.as_str().to_string())];
        self.get_location("forecast", &query, city).await
    }

    #[instrument(skip(self), level = "debug")]
    async fn search_by_name(&self, partial: &str) -> Result<Vec<LocationSummary>, WeatherError> {
        let query = [("q", partial.to_string()), ("type", "like".to_string())];
        let body = self.get_json("find", &query).await?;

        let found: FindResponse =
            serde_json::from_value(body).map_err(|e| WeatherError::Parse(e.to_string()))?;

        Ok(found
            .list
            .into_iter()
            .take(self.search_limit)
            .map(LocationSummary::from)
            .collect())
    }

    #[instrument(skip(self), level = "debug")]
    async fn current_conditions_by_coords(
        &self,
        lat: f64,
        lon: f64,
        units: Units,
    ) -> Result<ConditionsSnapshot, WeatherError> {
        let query = [
            ("lat", lat.to_string()),
            ("lon", lon.to_string()),
            ("units", units.as_str().to_string()),
        ];
        self.get_location("weather", &query, &format!("{}, {}", lat, lon))
            .await
    }
}

/// The provider's human-readable `message` field from an error body.
fn provider_message(body: &str) -> Option<String> {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()?
        .get("message")?
        .as_str()
        .filter(|m| !m.is_empty())
        .map(str::to_string)
}

/// Some responses arrive as 200 with `"cod": "404"` (string or number).
fn body_reports_not_found(body: &serde_json::Value) -> bool {
    match body.get("cod") {
        Some(serde_json::Value::String(code)) => code == "404",
        Some(serde_json::Value::Number(code)) => code.as_u64() == Some(404),
        _ => false,
    }
}
