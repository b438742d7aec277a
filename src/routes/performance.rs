use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};

use crate::error::{internal_error, AppError, AppResult};
use crate::services::correlation::PerformanceReport;
use crate::state::AppState;

#[derive(Debug, Clone, Copy, serde::Deserialize)]
pub(crate) struct PerformanceQuery {
    window_hours: Option<i64>,
}

pub(crate) async fn get_performance(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    Query(query): Query<PerformanceQuery>,
) -> AppResult<Json<PerformanceReport>> {
    let window_hours = query
        .window_hours
        .unwrap_or(state.config.performance_window_hours)
        .clamp(1, 24 * 30);

    let report = state
        .correlation
        .performance(&device_id, window_hours)
        .await
        .map_err(|err| internal_error(format!("{err:#}")))?;

    match report {
        Some(report) => Ok(Json(report)),
        None => Err(AppError::not_found(format!(
            "No correlated telemetry for device '{device_id}' in the last {window_hours}h"
        ))),
    }
}

pub fn router() -> Router<AppState> {
    Router::new().route("/devices/{device_id}/performance", get(get_performance))
}
