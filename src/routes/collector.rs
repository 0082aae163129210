//! Scheduler status HTTP endpoint.
//!
//! GET /api/v1/collector/status returns the background scheduler state as JSON.

use axum::extract::State;
use axum::Json;

use crate::services::scheduler::{SchedulerState, SharedSchedulerState};

/// Get the current scheduler status.
#[utoipa::path(
    get,
    path = "/api/v1/collector/status",
    tag = "Collector",
    responses(
        (status = 200, description = "Current scheduler status", body = SchedulerState),
    )
)]
pub async fn get_collector_status(
    State(state): State<SharedSchedulerState>,
) -> Json<SchedulerState> {
    let s = state.read().await;
    Json(s.clone())
}
