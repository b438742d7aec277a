use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};

use crate::services::queue::{ClassStats, FailedJobInfo};
use crate::state::AppState;
use crate::telemetry::DeviceClass;

#[derive(Debug, Clone, serde::Serialize)]
pub(crate) struct ClassStatsEntry {
    class: &'static str,
    #[serde(flatten)]
    stats: ClassStats,
    recent_failures: Vec<FailedJobInfo>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub(crate) struct QueueStatsResponse {
    classes: Vec<ClassStatsEntry>,
}

pub(crate) async fn get_queue_stats(State(state): State<AppState>) -> Json<QueueStatsResponse> {
    let queue = state.ingest.queue();
    let classes = DeviceClass::ALL
        .iter()
        .map(|class| ClassStatsEntry {
            class: class.as_str(),
            stats: queue.stats(*class),
            recent_failures: queue.recent_failures(*class),
        })
        .collect();
    Json(QueueStatsResponse { classes })
}

pub fn router() -> Router<AppState> {
    Router::new().route("/queue/stats", get(get_queue_stats))
}
