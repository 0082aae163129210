use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

use crate::db::models::{CityAverage, CityLatest};
use crate::db::store::Store;
use crate::errors::{AppError, ErrorResponse};

/// Response type for GET /api/v1/reports/summary.
#[derive(Debug, Serialize, ToSchema)]
pub struct SummaryResponse {
    /// Number of cities known to the collector
    pub cities: i64,
    /// Number of stored weather measurements
    pub measurements: i64,
}

#[utoipa::path(
    get,
    path = "/api/v1/reports/summary",
    tag = "Reports",
    responses(
        (status = 200, description = "City and measurement counts", body = SummaryResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse),
    )
)]
pub async fn get_summary(
    State(store): State<Arc<dyn Store>>,
) -> Result<Json<SummaryResponse>, AppError> {
    Ok(Json(SummaryResponse {
        cities: store.count_cities().await?,
        measurements: store.count_measurements().await?,
    }))
}

/// Average temperature per city, cities without measurements omitted.
#[utoipa::path(
    get,
    path = "/api/v1/reports/average",
    tag = "Reports",
    responses(
        (status = 200, description = "Average temperature per city", body = Vec<CityAverage>),
        (status = 500, description = "Internal server error", body = ErrorResponse),
    )
)]
pub async fn get_average_temperatures(
    State(store): State<Arc<dyn Store>>,
) -> Result<Json<Vec<CityAverage>>, AppError> {
    Ok(Json(store.temperature_averages().await?))
}

/// Most recently stored temperature per city.
#[utoipa::path(
    get,
    path = "/api/v1/reports/latest",
    tag = "Reports",
    responses(
        (status = 200, description = "Latest temperature per city", body = Vec<CityLatest>),
        (status = 500, description = "Internal server error", body = ErrorResponse),
    )
)]
pub async fn get_latest_temperatures(
    State(store): State<Arc<dyn Store>>,
) -> Result<Json<Vec<CityLatest>>, AppError> {
    Ok(Json(store.latest_temperatures().await?))
}
