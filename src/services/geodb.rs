//! GeoDB Cities client used to seed the city list.
//!
//! See: http://geodb-cities-api.wirefreethought.com/

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use unicode_normalization::UnicodeNormalization;

use crate::db::models::NewCity;
use crate::errors::CollectorError;
use crate::helpers::error_body_preview;

const CITIES_PATH: &str = "/v1/geo/cities";

/// Page size cap of the free GeoDB service.
const PAGE_LIMIT: usize = 10;

/// A source of "largest cities first" city lists.
#[async_trait]
pub trait CityDirectory: Send + Sync {
    /// Up to `amount` cities, most populous first.
    async fn fetch_cities(&self, amount: usize) -> Result<Vec<NewCity>, CollectorError>;
}

#[derive(Debug, Deserialize)]
struct CitiesPage {
    data: Vec<NewCity>,
}

#[derive(Debug, Clone)]
pub struct GeoDbClient {
    client: reqwest::Client,
    base_url: String,
}

impl GeoDbClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, CollectorError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn fetch_page(&self, offset: usize) -> Result<Vec<NewCity>, CollectorError> {
        let url = format!("{}{}", self.base_url, CITIES_PATH);
        tracing::info!("Fetching cities: offset={} limit={}", offset, PAGE_LIMIT);

        let response = self
            .client
            .get(&url)
            .query(&[
                ("sort", "-population".to_string()),
                ("types", "CITY".to_string()),
                ("limit", PAGE_LIMIT.to_string()),
                ("offset", offset.to_string()),
            ])
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
        let page: CitiesPage = serde_json::from_str(&text)
            .map_err(|e| CollectorError::Schema(format!("GeoDB cities page: {}", e)))?;
        Ok(page
            .data
            .into_iter()
            .map(|city| NewCity {
                name: ascii_fold(&city.name),
                ..city
            })
            .collect())
    }
}

/// Decompose and drop non-ASCII marks, e.g. "São Paulo" -> "Sao Paulo".
fn ascii_fold(name: &str) -> String {
    name.nfkd().filter(char::is_ascii).collect()
}

#[async_trait]
impl CityDirectory for GeoDbClient {
    async fn fetch_cities(&self, amount: usize) -> Result<Vec<NewCity>, CollectorError> {
        let pages = amount.div_ceil(PAGE_LIMIT);
        let mut cities = Vec::with_capacity(amount);

        for page in 0..pages {
            let batch = self.fetch_page(page * PAGE_LIMIT).await?;
            if batch.is_empty() {
                break;
            }
            cities.extend(batch);
        }

        cities.truncate(amount);
        Ok(cities)
    }
}
