//! OpenWeather client: current weather and direct geocoding.
//!
//! See: https://openweathermap.org/current and
//! https://openweathermap.org/api/geocoding-api

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::errors::CollectorError;
use crate::helpers::error_body_preview;

const WEATHER_PATH: &str = "/data/2.5/weather";
const GEOCODING_PATH: &str = "/geo/1.0/direct";

/// A place returned by the geocoding endpoint.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[allow(dead_code)] // All fields populated by serde; only the position is used
pub struct GeocodedPlace {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
}

/// Remote weather capabilities the collection pipeline depends on.
#[async_trait]
pub trait WeatherApi: Send + Sync {
    /// Raw current-weather payload for a position.
    async fn current_weather(&self, lat: f64, lon: f64) -> Result<serde_json::Value, CollectorError>;

    /// Places matching `name` (optionally narrowed by country), at most `limit`.
    async fn geocode(
        &self,
        name: &str,
        country_code: Option<&str>,
        limit: u32,
    ) -> Result<Vec<GeocodedPlace>, CollectorError>;
}

/// Client for the OpenWeather API.
#[derive(Debug, Clone)]
pub struct OpenWeatherClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl OpenWeatherClient {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, CollectorError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    async fn get_json(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<serde_json::Value, CollectorError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .query(query)
            .query(&[("appid", self.api_key.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CollectorError::Response {
                url,
                status: status.as_u16(),
                body: error_body_preview(&body),
            });
        }

        let text = response.text().await?;
        serde_json::from_str(&text)
            .map_err(|e| CollectorError::Schema(format!("{} returned invalid JSON: {}", path, e)))
    }
}

#[async_trait]
impl WeatherApi for OpenWeatherClient {
    async fn current_weather(&self, lat: f64, lon: f64) -> Result<serde_json::Value, CollectorError> {
        // Four decimals is ~11 m, well below station spacing.
        let query = [
            ("lat", format!("{:.4}", lat)),
            ("lon", format!("{:.4}", lon)),
            ("units", "metric".to_string()),
        ];
        self.get_json(WEATHER_PATH, &query).await
    }

    async fn geocode(
        &self,
        name: &str,
        country_code: Option<&str>,
        limit: u32,
    ) -> Result<Vec<GeocodedPlace>, CollectorError> {
        let q = match country_code {
            Some(code) if !code.is_empty() => format!("{},{}", name, code),
            _ => name.to_string(),
        };
        let query = [("q", q), ("limit", limit.to_string())];
        let raw = self.get_json(GEOCODING_PATH, &query).await?;

        serde_json::from_value(raw)
            .map_err(|e| CollectorError::Schema(format!("geocoding response: {}", e)))
    }
}
