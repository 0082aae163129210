//! One collection pass over every tracked city.

use std::sync::Arc;

use uuid::Uuid;

use crate::db::models::{City, NewMeasurement, PassBatch};
use crate::db::store::Store;
use crate::errors::CollectorError;
use crate::services::coordinates::resolve_coordinates;
use crate::services::openweather::WeatherApi;
use crate::services::parser::parse_weather_payload;

/// What a successful pass did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PassOutcome {
    /// Tracked cities considered.
    pub cities: usize,
    /// Measurements committed.
    pub stored: usize,
    /// Cities left out because their coordinates could not be resolved.
    pub skipped: Vec<String>,
    pub coordinates_resolved: usize,
}

pub struct Collector {
    api: Arc<dyn WeatherApi>,
    store: Arc<dyn Store>,
    geocode_limit: u32,
}

impl Collector {
    pub fn new(api: Arc<dyn WeatherApi>, store: Arc<dyn Store>, geocode_limit: u32) -> Self {
        Self {
            api,
            store,
            geocode_limit,
        }
    }

    /// Fetch and parse the current weather for `city`, resolving its
    /// coordinates first when they are missing. Nothing is persisted.
    pub async fn fetch_city_weather(&self, city: &mut City) -> Result<NewMeasurement, CollectorError> {
        resolve_coordinates(self.api.as_ref(), city, self.geocode_limit).await?;

        let (lat, lon) = city.coordinates().ok_or_else(|| {
            CollectorError::NoData(format!("{} has no coordinates", city))
        })?;

        let raw = self.api.current_weather(lat, lon).await?;
        let parsed = parse_weather_payload(raw)?;

        tracing::debug!(
            "Fetched weather for {}: {}°C observed at {}",
            city,
            parsed.reading.temp,
            parsed.observed_at
        );

        Ok(NewMeasurement {
            id: Uuid::new_v4(),
            city_id: city.id,
            observed_at: parsed.observed_at,
            reading: parsed.reading,
            residual: parsed.residual,
        })
    }

    /// Collect weather for every tracked city and commit the results at once.
    ///
    /// A city whose coordinates cannot be resolved (no geocoding match or a
    /// geocoding HTTP error) is skipped. Any other failure aborts the pass
    /// before anything is written.
    pub async fn run_pass(&self) -> Result<PassOutcome, CollectorError> {
        let mut cities = self.store.tracked_cities().await?;
        if cities.is_empty() {
            return Err(CollectorError::NoData("no cities to collect for".to_string()));
        }

        tracing::info!("Collecting weather for {} cities", cities.len());

        let mut batch = PassBatch::default();
        let mut skipped = Vec::new();

        for city in cities.iter_mut() {
            if city.coordinates().is_none() {
                match resolve_coordinates(self.api.as_ref(), city, self.geocode_limit).await {
                    Ok(()) => batch.resolved_cities.push(city.clone()),
                    Err(e) if e.skips_city() => {
                        tracing::warn!("Skipping {}: {}", city, e);
                        skipped.push(city.to_string());
                        continue;
                    }
                    Err(e) => return Err(e),
                }
            }

            batch.measurements.push(self.fetch_city_weather(city).await?);
        }

        let stored = self.store.save_pass(&batch).await?;

        tracing::info!(
            "Stored {} measurements ({} skipped, {} coordinates resolved)",
            stored,
            skipped.len(),
            batch.resolved_cities.len()
        );

        Ok(PassOutcome {
            cities: cities.len(),
            stored,
            skipped,
            coordinates_resolved: batch.resolved_cities.len(),
        })
    }
}
