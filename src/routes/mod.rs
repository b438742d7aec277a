pub mod devices;
pub mod health;
pub mod ingest;
pub mod performance;
pub mod queue;

use axum::Router;

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .nest(
            "/api",
            Router::new()
                .merge(ingest::router())
                .merge(devices::router())
                .merge(performance::router())
                .merge(queue::router()),
        )
        .with_state(state)
}
