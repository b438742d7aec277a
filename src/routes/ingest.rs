use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use uuid::Uuid;

use crate::error::{internal_error, AppError, AppResult};
use crate::services::applier::{SubmitError, SubmitOutcome};
use crate::state::AppState;
use crate::telemetry::{MeterReading, TelemetryRecord, VehicleReading};
use crate::time::parse_instant;

#[derive(Debug, Clone, serde::Deserialize)]
pub(crate) struct MeterIngestRequest {
    meter_id: String,
    kwh_consumed_ac: f64,
    voltage: f64,
    timestamp: String,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub(crate) struct VehicleIngestRequest {
    vehicle_id: String,
    soc: f64,
    kwh_delivered_dc: f64,
    battery_temp: f64,
    timestamp: String,
}

#[derive(Debug, Clone, serde::Serialize)]
pub(crate) struct IngestResponse {
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    job_id: Option<Uuid>,
}

async fn submit_record(
    state: &AppState,
    record: TelemetryRecord,
) -> AppResult<(StatusCode, Json<IngestResponse>)> {
    record.validate().map_err(AppError::bad_request)?;

    match state.ingest.submit(record).await {
        Ok(SubmitOutcome::Queued(job_id)) => Ok((
            StatusCode::ACCEPTED,
            Json(IngestResponse {
                status: "queued".to_string(),
                job_id: Some(job_id),
            }),
        )),
        Ok(SubmitOutcome::Applied) => Ok((
            StatusCode::OK,
            Json(IngestResponse {
                status: "applied".to_string(),
                job_id: None,
            }),
        )),
        Err(SubmitError::QueueFull(err)) => Err(AppError::unavailable(err.to_string())),
        Err(SubmitError::Apply(err)) => Err(internal_error(format!("{err:#}"))),
    }
}

pub(crate) async fn ingest_meter(
    State(state): State<AppState>,
    Json(request): Json<MeterIngestRequest>,
) -> AppResult<(StatusCode, Json<IngestResponse>)> {
    let reported_at = parse_instant(&request.timestamp)
        .ok_or_else(|| AppError::bad_request("Invalid timestamp"))?;
    let record = TelemetryRecord::Meter(MeterReading {
        device_id: request.meter_id.trim().to_string(),
        kwh_consumed_ac: request.kwh_consumed_ac,
        voltage: request.voltage,
        reported_at,
    });
    submit_record(&state, record).await
}

pub(crate) async fn ingest_vehicle(
    State(state): State<AppState>,
    Json(request): Json<VehicleIngestRequest>,
) -> AppResult<(StatusCode, Json<IngestResponse>)> {
    let reported_at = parse_instant(&request.timestamp)
        .ok_or_else(|| AppError::bad_request("Invalid timestamp"))?;
    let record = TelemetryRecord::Vehicle(VehicleReading {
        device_id: request.vehicle_id.trim().to_string(),
        soc: request.soc,
        kwh_delivered_dc: request.kwh_delivered_dc,
        battery_temp: request.battery_temp,
        reported_at,
    });
    submit_record(&state, record).await
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/telemetry/meter", post(ingest_meter))
        .route("/telemetry/vehicle", post(ingest_vehicle))
}
