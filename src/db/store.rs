//! Persistence seam used by the collection pipeline and the reports.
//!
//! `PgStore` is the production implementation. Every write operation opens
//! exactly one transaction; an early `?` return drops it, which rolls back.

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use super::models::{City, CityAverage, CityLatest, NewCity, PassBatch};
use super::queries;
use crate::errors::CollectorError;

/// Maximum number of connections in the database pool.
const DB_POOL_MAX_CONNECTIONS: u32 = 5;
/// Minimum number of connections kept alive in the database pool.
const DB_POOL_MIN_CONNECTIONS: u32 = 1;

#[async_trait]
pub trait Store: Send + Sync {
    /// Cheap connectivity check for the health endpoint.
    async fn ping(&self) -> Result<(), CollectorError>;

    async fn tracked_cities(&self) -> Result<Vec<City>, CollectorError>;

    /// Persist a pass atomically; returns the number of measurements written.
    async fn save_pass(&self, batch: &PassBatch) -> Result<usize, CollectorError>;

    /// Insert cities, optionally deleting every existing city first.
    async fn insert_cities(&self, cities: &[NewCity], replace: bool)
        -> Result<usize, CollectorError>;

    async fn count_cities(&self) -> Result<i64, CollectorError>;

    async fn count_measurements(&self) -> Result<i64, CollectorError>;

    async fn temperature_averages(&self) -> Result<Vec<CityAverage>, CollectorError>;

    async fn latest_temperatures(&self) -> Result<Vec<CityLatest>, CollectorError>;
}

/// Postgres-backed store.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect and bring the schema up to date.
    pub async fn connect(database_url: &str) -> Result<Self, CollectorError> {
        let pool = PgPoolOptions::new()
            .max_connections(DB_POOL_MAX_CONNECTIONS)
            .min_connections(DB_POOL_MIN_CONNECTIONS)
            .connect(database_url)
            .await?;

        sqlx::migrate!().run(&pool).await?;
        tracing::info!("Database migrations completed");

        Ok(Self { pool })
    }
}

#[async_trait]
impl Store for PgStore {
    async fn ping(&self) -> Result<(), CollectorError> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(())
    }

    async fn tracked_cities(&self) -> Result<Vec<City>, CollectorError> {
        Ok(queries::list_tracked_cities(&self.pool).await?)
    }

    async fn save_pass(&self, batch: &PassBatch) -> Result<usize, CollectorError> {
        let mut tx = self.pool.begin().await?;

        for city in &batch.resolved_cities {
            queries::update_city_coordinates(&mut tx, city).await?;
        }
        for measurement in &batch.measurements {
            queries::insert_measurement(&mut tx, measurement).await?;
        }

        tx.commit().await?;
        Ok(batch.measurements.len())
    }

    async fn insert_cities(
        &self,
        cities: &[NewCity],
        replace: bool,
    ) -> Result<usize, CollectorError> {
        let mut tx = self.pool.begin().await?;

        if replace {
            let removed = queries::delete_all_cities(&mut tx).await?;
            tracing::info!("Removed {} existing cities before import", removed);
        }
        for city in cities {
            queries::insert_city(&mut tx, city).await?;
        }

        tx.commit().await?;
        Ok(cities.len())
    }

    async fn count_cities(&self) -> Result<i64, CollectorError> {
        Ok(queries::count_cities(&self.pool).await?)
    }

    async fn count_measurements(&self) -> Result<i64, CollectorError> {
        Ok(queries::count_measurements(&self.pool).await?)
    }

    async fn temperature_averages(&self) -> Result<Vec<CityAverage>, CollectorError> {
        Ok(queries::temperature_averages(&self.pool).await?)
    }

    async fn latest_temperatures(&self) -> Result<Vec<CityLatest>, CollectorError> {
        Ok(queries::latest_temperatures(&self.pool).await?)
    }
}
