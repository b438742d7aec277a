use crate::config::CoreConfig;
use crate::services::applier::IngestService;
use crate::services::cache::ReadCache;
use crate::services::correlation::CorrelationEngine;
use crate::services::store::TelemetryStore;
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: CoreConfig,
    pub db: PgPool,
    pub store: Arc<dyn TelemetryStore>,
    pub ingest: Arc<IngestService>,
    pub correlation: Arc<CorrelationEngine>,
    pub cache: Arc<ReadCache>,
}
