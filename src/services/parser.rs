//! Typed parser for OpenWeather "current weather" payloads.
//!
//! Only `main` and `dt` are structured; every other top-level key is kept
//! verbatim as the residual payload.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::db::models::{CoreReading, ResidualPayload};
use crate::errors::CollectorError;

/// Top-level keys consumed by [`WeatherPayload`].
const CONSUMED_KEYS: [&str; 2] = ["main", "dt"];

#[derive(Debug, Deserialize)]
struct WeatherPayload {
    main: CoreReading,
    /// Observation time, Unix seconds, UTC.
    dt: i64,
}

/// A validated payload split into its structured and residual parts.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedWeather {
    pub observed_at: DateTime<Utc>,
    pub reading: CoreReading,
    pub residual: ResidualPayload,
}

/// Validate `raw` and split it into reading, observation time and residual.
pub fn parse_weather_payload(raw: serde_json::Value) -> Result<ParsedWeather, CollectorError> {
    let serde_json::Value::Object(mut object) = raw else {
        return Err(CollectorError::Schema(
            "weather payload is not a JSON object".to_string(),
        ));
    };

    // Only the consumed keys go through serde; the rest of `object` is the residual.
    let payload = WeatherPayload::deserialize(&serde_json::Value::Object(
        CONSUMED_KEYS
            .iter()
            .filter_map(|key| object.get(*key).map(|v| (key.to_string(), v.clone())))
            .collect(),
    ))
    .map_err(|e| CollectorError::Schema(e.to_string()))?;

    let observed_at = DateTime::<Utc>::from_timestamp(payload.dt, 0).ok_or_else(|| {
        CollectorError::Schema(format!("dt {} is not a valid timestamp", payload.dt))
    })?;

    for key in CONSUMED_KEYS {
        object.remove(key);
    }

    Ok(ParsedWeather {
        observed_at,
        reading: payload.main,
        residual: ResidualPayload(object),
    })
}
