//! In-memory `Store` used by the unit tests.
//!
//! Writes are staged on a copy of the data and swapped in only when every
//! step succeeds, so a failed write leaves the store untouched, as a rolled
//! back transaction would.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::models::{City, CityAverage, CityLatest, NewCity, NewMeasurement, PassBatch};
use super::store::Store;
use crate::errors::CollectorError;
use crate::helpers::opt_f64_to_decimal_full;

#[derive(Debug, Clone, Default)]
struct Tables {
    cities: Vec<City>,
    measurements: Vec<NewMeasurement>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cities(cities: Vec<City>) -> Self {
        let store = Self::new();
        store.tables.lock().unwrap().cities = cities;
        store
    }

    /// Make every following write fail as if the database went away.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn cities(&self) -> Vec<City> {
        self.tables.lock().unwrap().cities.clone()
    }

    pub fn measurements(&self) -> Vec<NewMeasurement> {
        self.tables.lock().unwrap().measurements.clone()
    }

    fn check_writable(&self) -> Result<(), CollectorError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(CollectorError::Database(sqlx::Error::PoolClosed));
        }
        Ok(())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> Result<(), CollectorError> {
        Ok(())
    }

    async fn tracked_cities(&self) -> Result<Vec<City>, CollectorError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.cities.iter().filter(|c| c.tracked).cloned().collect())
    }

    async fn save_pass(&self, batch: &PassBatch) -> Result<usize, CollectorError> {
        self.check_writable()?;
        let mut tables = self.tables.lock().unwrap();
        let mut staged = tables.clone();

        for resolved in &batch.resolved_cities {
            let city = staged
                .cities
                .iter_mut()
                .find(|c| c.id == resolved.id)
                .ok_or(CollectorError::Database(sqlx::Error::RowNotFound))?;
            city.latitude = resolved.latitude;
            city.longitude = resolved.longitude;
        }
        for measurement in &batch.measurements {
            if !staged.cities.iter().any(|c| c.id == measurement.city_id) {
                return Err(CollectorError::Database(sqlx::Error::RowNotFound));
            }
            staged.measurements.push(measurement.clone());
        }

        *tables = staged;
        Ok(batch.measurements.len())
    }

    async fn insert_cities(
        &self,
        cities: &[NewCity],
        replace: bool,
    ) -> Result<usize, CollectorError> {
        self.check_writable()?;
        let mut tables = self.tables.lock().unwrap();
        if replace {
            tables.cities.clear();
            tables.measurements.clear();
        }
        for city in cities {
            tables.cities.push(City {
                id: Uuid::new_v4(),
                name: city.name.clone(),
                country: city.country.clone(),
                country_code: city.country_code.clone(),
                latitude: opt_f64_to_decimal_full(city.latitude),
                longitude: opt_f64_to_decimal_full(city.longitude),
                population: city.population,
                tracked: true,
            });
        }
        Ok(cities.len())
    }

    async fn count_cities(&self) -> Result<i64, CollectorError> {
        Ok(self.tables.lock().unwrap().cities.len() as i64)
    }

    async fn count_measurements(&self) -> Result<i64, CollectorError> {
        Ok(self.tables.lock().unwrap().measurements.len() as i64)
    }

    async fn temperature_averages(&self) -> Result<Vec<CityAverage>, CollectorError> {
        let tables = self.tables.lock().unwrap();
        let mut averages = Vec::new();
        for city in &tables.cities {
            let readings: Vec<&NewMeasurement> = tables
                .measurements
                .iter()
                .filter(|m| m.city_id == city.id)
                .collect();
            if readings.is_empty() {
                continue;
            }
            let total: f64 = readings.iter().map(|m| m.reading.temp).sum();
            let observed: Vec<DateTime<Utc>> = readings.iter().map(|m| m.observed_at).collect();
            averages.push(CityAverage {
                city_id: city.id,
                city_name: city.name.clone(),
                average_temp: total / readings.len() as f64,
                measurement_count: readings.len() as i64,
                first_observed_at: observed.iter().min().copied().unwrap_or_default(),
                last_observed_at: observed.iter().max().copied().unwrap_or_default(),
            });
        }
        averages.sort_by(|a, b| a.city_name.cmp(&b.city_name));
        Ok(averages)
    }

    async fn latest_temperatures(&self) -> Result<Vec<CityLatest>, CollectorError> {
        let tables = self.tables.lock().unwrap();
        let mut latest: HashMap<Uuid, &NewMeasurement> = HashMap::new();
        // Insertion order stands in for created_at.
        for measurement in &tables.measurements {
            latest.insert(measurement.city_id, measurement);
        }
        let mut rows: Vec<CityLatest> = tables
            .cities
            .iter()
            .filter_map(|city| {
                latest.get(&city.id).map(|m| CityLatest {
                    city_id: city.id,
                    city_name: city.name.clone(),
                    temp: m.reading.temp,
                    observed_at: m.observed_at,
                })
            })
            .collect();
        rows.sort_by(|a, b| a.city_name.cmp(&b.city_name));
        Ok(rows)
    }
}
