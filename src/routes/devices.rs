use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};

use crate::error::{internal_error, AppError, AppResult};
use crate::services::cache::CurrentStateEntry;
use crate::services::store::{MeterStateRow, VehicleStateRow};
use crate::state::AppState;

#[derive(Debug, Clone, serde::Serialize)]
pub(crate) struct CurrentStateResponse {
    device_id: String,
    meter: Option<MeterStateRow>,
    vehicle: Option<VehicleStateRow>,
}

pub(crate) async fn get_current_state(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
) -> AppResult<Json<CurrentStateResponse>> {
    if let Some(hit) = state.cache.get_current(&device_id) {
        return Ok(Json(CurrentStateResponse {
            device_id,
            meter: hit.meter,
            vehicle: hit.vehicle,
        }));
    }

    let (meter, vehicle) = tokio::try_join!(
        state.store.current_meter(&device_id),
        state.store.current_vehicle(&device_id),
    )
    .map_err(|err| internal_error(format!("{err:#}")))?;

    if meter.is_none() && vehicle.is_none() {
        return Err(AppError::not_found(format!(
            "No telemetry recorded for device '{device_id}'"
        )));
    }

    // Negative results are never cached, so a device's first reading is
    // visible immediately after its dual write lands.
    state.cache.set_current(
        &device_id,
        CurrentStateEntry {
            meter: meter.clone(),
            vehicle: vehicle.clone(),
        },
    );

    Ok(Json(CurrentStateResponse {
        device_id,
        meter,
        vehicle,
    }))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/devices/{device_id}/current", get(get_current_state))
}
