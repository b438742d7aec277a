use crate::services::cache::ReadCache;
use crate::services::queue::{EnqueueError, TelemetryQueue};
use crate::services::store::TelemetryStore;
use crate::telemetry::{DeviceClass, TelemetryRecord};
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Accepted into the durable queue; applied asynchronously by a worker.
    Queued(Uuid),
    /// Degraded direct mode: applied synchronously before returning.
    Applied,
}

#[derive(Debug)]
pub enum SubmitError {
    QueueFull(EnqueueError),
    Apply(anyhow::Error),
}

/// Applies one telemetry record as a dual write: current-state upsert plus
/// history append, issued concurrently; both must succeed or the whole apply
/// fails and the job is retried. The history side is a plain append, so a
/// retry after partial failure duplicates history rows (at-least-once,
/// documented in the store contract).
pub struct IngestService {
    queue: Arc<TelemetryQueue>,
    store: Arc<dyn TelemetryStore>,
    cache: Arc<ReadCache>,
    queue_enabled: bool,
    workers_per_class: usize,
    job_timeout: Duration,
}

impl IngestService {
    pub fn new(
        queue: Arc<TelemetryQueue>,
        store: Arc<dyn TelemetryStore>,
        cache: Arc<ReadCache>,
        queue_enabled: bool,
        workers_per_class: usize,
        job_timeout: Duration,
    ) -> Self {
        Self {
            queue,
            store,
            cache,
            queue_enabled,
            workers_per_class: workers_per_class.max(1),
            job_timeout,
        }
    }

    pub fn queue(&self) -> &TelemetryQueue {
        &self.queue
    }

    /// Ingress entry point: enqueue when the queue is enabled, otherwise apply
    /// synchronously. Results are identical either way; only durability and
    /// latency differ.
    pub async fn submit(&self, record: TelemetryRecord) -> Result<SubmitOutcome, SubmitError> {
        if self.queue_enabled {
            let job_id = self
                .queue
                .try_enqueue(record)
                .map_err(SubmitError::QueueFull)?;
            return Ok(SubmitOutcome::Queued(job_id));
        }
        self.apply(&record).await.map_err(SubmitError::Apply)?;
        Ok(SubmitOutcome::Applied)
    }

    /// The dual write. The two storage objects are disjoint, so the writes
    /// carry no ordering dependency and run concurrently.
    pub async fn apply(&self, record: &TelemetryRecord) -> Result<()> {
        tokio::try_join!(
            self.store.upsert_current(record),
            self.store.append_history(record),
        )?;
        self.cache.invalidate_device(record.device_id());
        Ok(())
    }

    /// Spawn the per-class worker pools. Workers are independent; conflicting
    /// writes to the same device key are serialized by the store's atomic
    /// upsert, not by the queue.
    pub fn start(self: Arc<Self>, cancel: CancellationToken) {
        for class in DeviceClass::ALL {
            for worker in 0..self.workers_per_class {
                let service = self.clone();
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    service.run_worker(class, worker, cancel).await;
                });
            }
        }
    }

    async fn run_worker(&self, class: DeviceClass, worker: usize, cancel: CancellationToken) {
        loop {
            let job = tokio::select! {
                _ = cancel.cancelled() => break,
                job = self.queue.dequeue(class) => job,
            };

            let span = tracing::info_span!(
                "telemetry_job",
                job_id = %job.id,
                device_id = %job.record.device_id(),
                class = class.as_str(),
                attempt = job.attempt,
                worker,
            );
            let outcome = tokio::time::timeout(self.job_timeout, self.apply(&job.record))
                .instrument(span)
                .await;

            match outcome {
                Ok(Ok(())) => self.queue.ack(class, job.id),
                Ok(Err(err)) => self.queue.nack(job, format!("{err:#}")),
                Err(_) => {
                    let message = format!(
                        "apply timed out after {}s",
                        self.job_timeout.as_secs_f64()
                    );
                    self.queue.nack(job, message);
                }
            }
        }
    }
}
