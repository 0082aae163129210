//! Scriptable in-process doubles for the external APIs.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use crate::db::models::{City, NewCity};
use crate::errors::CollectorError;
use crate::helpers::f64_to_decimal_full;
use crate::services::geodb::CityDirectory;
use crate::services::openweather::{GeocodedPlace, WeatherApi};
use crate::services::parser::tests::sample_payload;

pub fn city(name: &str, coordinates: Option<(f64, f64)>) -> City {
    City {
        id: Uuid::new_v4(),
        name: name.to_string(),
        country: None,
        country_code: None,
        latitude: coordinates.map(|(lat, _)| f64_to_decimal_full(lat)),
        longitude: coordinates.map(|(_, lon)| f64_to_decimal_full(lon)),
        population: None,
        tracked: true,
    }
}

pub fn place(name: &str, lat: f64, lon: f64) -> GeocodedPlace {
    GeocodedPlace {
        name: name.to_string(),
        lat,
        lon,
        country: None,
        state: None,
    }
}

pub fn new_city(name: &str) -> NewCity {
    NewCity {
        name: name.to_string(),
        country: None,
        country_code: None,
        latitude: Some(1.0),
        longitude: Some(2.0),
        population: None,
    }
}

/// One scripted answer to a `current_weather` call.
#[derive(Debug, Clone)]
pub enum WeatherReply {
    Payload(serde_json::Value),
    Status(u16),
}

#[derive(Debug, Default)]
pub struct FakeWeatherApi {
    places: HashMap<String, Vec<GeocodedPlace>>,
    geocode_failure: Option<u16>,
    script: Mutex<VecDeque<WeatherReply>>,
    weather_calls: AtomicUsize,
    geocode_calls: AtomicUsize,
}

impl FakeWeatherApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_places(mut self, name: &str, places: Vec<GeocodedPlace>) -> Self {
        self.places.insert(name.to_string(), places);
        self
    }

    pub fn fail_geocode_with_status(mut self, status: u16) -> Self {
        self.geocode_failure = Some(status);
        self
    }

    /// Replies used for the next `current_weather` calls, in order. Once the
    /// script runs out every call succeeds.
    pub fn with_script(self, replies: Vec<WeatherReply>) -> Self {
        *self.script.lock().unwrap() = replies.into();
        self
    }

    pub fn weather_calls(&self) -> usize {
        self.weather_calls.load(Ordering::SeqCst)
    }

    pub fn geocode_calls(&self) -> usize {
        self.geocode_calls.load(Ordering::SeqCst)
    }
}

fn status_error(url: &str, status: u16) -> CollectorError {
    CollectorError::Response {
        url: url.to_string(),
        status,
        body: String::new(),
    }
}

#[async_trait]
impl WeatherApi for FakeWeatherApi {
    async fn current_weather(
        &self,
        _lat: f64,
        _lon: f64,
    ) -> Result<serde_json::Value, CollectorError> {
        let call = self.weather_calls.fetch_add(1, Ordering::SeqCst);
        let reply = self.script.lock().unwrap().pop_front();
        match reply {
            Some(WeatherReply::Payload(payload)) => Ok(payload),
            Some(WeatherReply::Status(status)) => Err(status_error("fake://weather", status)),
            None => Ok(sample_payload(10.0 + call as f64, 1_700_000_000 + call as i64)),
        }
    }

    async fn geocode(
        &self,
        name: &str,
        _country_code: Option<&str>,
        _limit: u32,
    ) -> Result<Vec<GeocodedPlace>, CollectorError> {
        self.geocode_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(status) = self.geocode_failure {
            return Err(status_error("fake://geocode", status));
        }
        Ok(self.places.get(name).cloned().unwrap_or_default())
    }
}

#[derive(Debug, Default)]
pub struct FakeDirectory {
    cities: Vec<NewCity>,
    failure: Option<u16>,
    calls: AtomicUsize,
}

impl FakeDirectory {
    pub fn with_cities(cities: Vec<NewCity>) -> Self {
        Self {
            cities,
            ..Self::default()
        }
    }

    pub fn failing(status: u16) -> Self {
        Self {
            failure: Some(status),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CityDirectory for FakeDirectory {
    async fn fetch_cities(&self, amount: usize) -> Result<Vec<NewCity>, CollectorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(status) = self.failure {
            return Err(status_error("fake://cities", status));
        }
        Ok(self.cities.iter().take(amount).cloned().collect())
    }
}
