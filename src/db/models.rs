use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::helpers::{opt_dec_to_f64, opt_whole_number, whole_number};

/// A city weather is collected for.
#[derive(Debug, Clone, PartialEq, FromRow)]
#[allow(dead_code)] // All fields populated by FromRow; some only read by the store
pub struct City {
    pub id: Uuid,
    pub name: String,
    pub country: Option<String>,
    pub country_code: Option<String>,
    pub latitude: Option<Decimal>,
    pub longitude: Option<Decimal>,
    pub population: Option<i64>,
    /// Cities with `tracked = false` are skipped by collection passes.
    pub tracked: bool,
}

impl City {
    /// `(latitude, longitude)` once both are known.
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        Some((opt_dec_to_f64(self.latitude)?, opt_dec_to_f64(self.longitude)?))
    }
}

impl std::fmt::Display for City {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.country_code {
            Some(code) => write!(f, "{} ({})", self.name, code),
            None => write!(f, "{}", self.name),
        }
    }
}

/// A city as listed in the bootstrap file or returned by the city directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCity {
    pub name: String,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default, rename = "countryCode", alias = "country_code")]
    pub country_code: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub population: Option<i64>,
}

/// The structured subset of an OpenWeather `main` block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CoreReading {
    /// Temperature, °C
    pub temp: f64,
    /// Perceived temperature, °C
    pub feels_like: f64,
    /// Minimum currently observed temperature, °C
    pub temp_min: f64,
    /// Maximum currently observed temperature, °C
    pub temp_max: f64,
    /// Atmospheric pressure, hPa
    #[serde(deserialize_with = "whole_number")]
    pub pressure: i32,
    /// Relative humidity, %
    #[serde(deserialize_with = "whole_number")]
    pub humidity: i32,
    /// Pressure at sea level, hPa
    #[serde(default, deserialize_with = "opt_whole_number")]
    pub sea_level: Option<i32>,
    /// Pressure at ground level, hPa
    #[serde(default, deserialize_with = "opt_whole_number")]
    pub grnd_level: Option<i32>,
}

/// Whatever the provider sent beyond the structured fields.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ResidualPayload(pub serde_json::Map<String, serde_json::Value>);

/// A measurement ready to be written, owning its reading and residual.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMeasurement {
    pub id: Uuid,
    pub city_id: Uuid,
    pub observed_at: DateTime<Utc>,
    pub reading: CoreReading,
    pub residual: ResidualPayload,
}

/// Everything one collection pass writes, committed as a unit.
#[derive(Debug, Clone, Default)]
pub struct PassBatch {
    /// Cities whose coordinates were resolved during the pass.
    pub resolved_cities: Vec<City>,
    pub measurements: Vec<NewMeasurement>,
}

/// Average temperature for one city across all its measurements.
#[derive(Debug, Clone, PartialEq, Serialize, FromRow, ToSchema)]
pub struct CityAverage {
    pub city_id: Uuid,
    pub city_name: String,
    pub average_temp: f64,
    pub measurement_count: i64,
    pub first_observed_at: DateTime<Utc>,
    pub last_observed_at: DateTime<Utc>,
}

/// Most recently stored temperature for one city.
#[derive(Debug, Clone, PartialEq, Serialize, FromRow, ToSchema)]
pub struct CityLatest {
    pub city_id: Uuid,
    pub city_name: String,
    pub temp: f64,
    pub observed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helpers::f64_to_decimal_full;

    fn city(lat: Option<f64>, lon: Option<f64>) -> City {
        City {
            id: Uuid::new_v4(),
            name: "Zurich".to_string(),
            country: Some("Switzerland".to_string()),
            country_code: Some("CH".to_string()),
            latitude: lat.map(f64_to_decimal_full),
            longitude: lon.map(f64_to_decimal_full),
            population: Some(421_878),
            tracked: true,
        }
    }

    #[test]
    fn test_coordinates_present() {
        let (lat, lon) = city(Some(47.3769), Some(8.5417)).coordinates().unwrap();
        assert!((lat - 47.3769).abs() < 1e-9);
        assert!((lon - 8.5417).abs() < 1e-9);
    }

    #[test]
    fn test_coordinates_require_both() {
        assert!(city(Some(47.3769), None).coordinates().is_none());
        assert!(city(None, Some(8.5417)).coordinates().is_none());
    }

    #[test]
    fn test_display_includes_country_code() {
        assert_eq!(city(None, None).to_string(), "Zurich (CH)");
    }

    #[test]
    fn test_new_city_accepts_directory_field_names() {
        let json = serde_json::json!({
            "name": "Tokyo",
            "country": "Japan",
            "countryCode": "JP",
            "latitude": 35.6895,
            "longitude": 139.6917,
            "population": 13515271
        });
        let parsed: NewCity = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.country_code.as_deref(), Some("JP"));
        assert_eq!(parsed.population, Some(13_515_271));
    }

    #[test]
    fn test_new_city_only_name_required() {
        let parsed: NewCity = serde_json::from_value(serde_json::json!({"name": "Entebbe"})).unwrap();
        assert_eq!(parsed.name, "Entebbe");
        assert!(parsed.latitude.is_none());

        let missing = serde_json::from_value::<NewCity>(serde_json::json!({"no_name": "x"}));
        assert!(missing.is_err());
    }
}
