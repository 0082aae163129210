use std::str::FromStr;
use std::time::Duration;

use crate::errors::CollectorError;
use crate::services::scheduler::SchedulerConfig;

const DEFAULT_OPENWEATHER_BASE_URL: &str = "https://api.openweathermap.org";
const DEFAULT_GEODB_BASE_URL: &str = "http://geodb-free-service.wirefreethought.com";

/// Application configuration, parsed from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: Option<String>,
    pub openweather_api_key: Option<String>,
    pub openweather_base_url: String,
    pub geodb_base_url: String,
    /// Seconds between scheduled collection passes.
    pub collect_interval_secs: u64,
    /// Seconds before a failed pass is retried.
    pub retry_delay_secs: u64,
    /// How many cities to request from the city directory.
    pub cities_amount: usize,
    /// JSON file the city bootstrap reads from and writes to.
    pub cities_file: String,
    pub geocode_limit: u32,
    pub http_timeout_secs: u64,
    pub port: u16,
    pub log_json: bool,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, CollectorError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, CollectorError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let config = Self {
            database_url: non_empty("DATABASE_URL"),
            openweather_api_key: non_empty("OPENWEATHER_API_KEY"),
            openweather_base_url: non_empty("OPENWEATHER_BASE_URL")
                .unwrap_or_else(|| DEFAULT_OPENWEATHER_BASE_URL.to_string()),
            geodb_base_url: non_empty("GEODB_BASE_URL")
                .unwrap_or_else(|| DEFAULT_GEODB_BASE_URL.to_string()),
            collect_interval_secs: parse_or(&lookup, "COLLECT_INTERVAL_SECONDS", 60 * 60)?,
            retry_delay_secs: parse_or(&lookup, "RETRY_DELAY_SECONDS", 3)?,
            cities_amount: parse_or(&lookup, "CITIES_AMOUNT", 50)?,
            cities_file: non_empty("CITIES_FILE").unwrap_or_else(|| "cities.json".to_string()),
            geocode_limit: parse_or(&lookup, "GEOCODE_LIMIT", 10)?,
            http_timeout_secs: parse_or(&lookup, "HTTP_TIMEOUT_SECONDS", 30)?,
            port: parse_or(&lookup, "PORT", 8080)?,
            log_json: non_empty("LOG_FORMAT")
                .map(|v| v.eq_ignore_ascii_case("json"))
                .unwrap_or(false),
        };

        if config.collect_interval_secs == 0 {
            return Err(CollectorError::Config(
                "COLLECT_INTERVAL_SECONDS must be greater than zero".to_string(),
            ));
        }
        if config.retry_delay_secs == 0 {
            return Err(CollectorError::Config(
                "RETRY_DELAY_SECONDS must be greater than zero".to_string(),
            ));
        }
        if config.geocode_limit == 0 {
            return Err(CollectorError::Config(
                "GEOCODE_LIMIT must be greater than zero".to_string(),
            ));
        }

        Ok(config)
    }

    pub fn require_database_url(&self) -> Result<&str, CollectorError> {
        self.database_url
            .as_deref()
            .ok_or_else(|| CollectorError::Config("DATABASE_URL must be set".to_string()))
    }

    pub fn require_api_key(&self) -> Result<&str, CollectorError> {
        self.openweather_api_key
            .as_deref()
            .ok_or_else(|| CollectorError::Config("OPENWEATHER_API_KEY must be set".to_string()))
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Scheduler settings for a `collect` / `serve` invocation.
    pub fn scheduler_config(
        &self,
        repeats: Option<u32>,
        initial: bool,
        replace_cities: bool,
    ) -> SchedulerConfig {
        SchedulerConfig {
            interval: Duration::from_secs(self.collect_interval_secs),
            retry_delay: Duration::from_secs(self.retry_delay_secs),
            repeats,
            initial,
            replace_cities,
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, CollectorError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| CollectorError::Config(format!("{} has an invalid value: {:?}", key, raw))),
        _ => Ok(default),
    }
}
