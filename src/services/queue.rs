use crate::telemetry::{DeviceClass, TelemetryRecord};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BinaryHeap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use uuid::Uuid;

/// One accepted ingestion job. Owned by the queue until a worker claims it,
/// then by exactly one worker until ack or nack.
#[derive(Debug, Clone)]
pub struct QueueJob {
    pub id: Uuid,
    pub record: TelemetryRecord,
    /// Delivery attempts completed so far (0 until the first failure).
    pub attempt: u32,
    pub enqueued_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedJobInfo {
    pub job_id: Uuid,
    pub device_id: String,
    pub attempts: u32,
    pub error: String,
    pub failed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ClassStats {
    pub waiting: usize,
    pub active: usize,
    pub completed: u64,
    pub failed: u64,
}

#[derive(Debug)]
pub enum EnqueueError {
    Full { capacity: usize },
}

impl std::fmt::Display for EnqueueError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EnqueueError::Full { capacity } => {
                write!(f, "ingestion queue is full (capacity {capacity})")
            }
        }
    }
}

impl std::error::Error for EnqueueError {}

#[derive(Debug, Clone)]
pub struct QueuePolicy {
    pub capacity: usize,
    pub max_attempts: u32,
    pub retry_base_delay: Duration,
    pub failed_retention: chrono::Duration,
    pub completed_retention: chrono::Duration,
    pub completed_cap: usize,
}

impl QueuePolicy {
    pub fn from_config(config: &crate::config::CoreConfig) -> Self {
        Self {
            capacity: config.queue_capacity,
            max_attempts: config.job_max_attempts,
            retry_base_delay: Duration::from_millis(config.retry_base_delay_ms),
            failed_retention: chrono::Duration::hours(config.failed_retention_hours as i64),
            completed_retention: chrono::Duration::seconds(
                config.completed_retention_seconds as i64,
            ),
            completed_cap: config.completed_retention_cap,
        }
    }
}

/// Exponential backoff for retry `n` (1-based): base, 2×base, 4×base, ...
pub fn retry_backoff(base: Duration, retry: u32) -> Duration {
    base.saturating_mul(1u32 << retry.saturating_sub(1).min(16))
}

struct DelayedJob {
    due: Instant,
    job: QueueJob,
}

impl PartialEq for DelayedJob {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due
    }
}

impl Eq for DelayedJob {}

impl PartialOrd for DelayedJob {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DelayedJob {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Reversed so the BinaryHeap pops the earliest due time first.
        other.due.cmp(&self.due)
    }
}

#[derive(Default)]
struct ClassState {
    waiting: VecDeque<QueueJob>,
    delayed: BinaryHeap<DelayedJob>,
    active: usize,
    completed_total: u64,
    failed_total: u64,
    recent_completed: VecDeque<(Uuid, DateTime<Utc>)>,
    recent_failed: VecDeque<FailedJobInfo>,
}

impl ClassState {
    fn depth(&self) -> usize {
        self.waiting.len() + self.delayed.len()
    }

    fn promote_due(&mut self, now: Instant) {
        while let Some(next) = self.delayed.peek() {
            if next.due > now {
                break;
            }
            let delayed = self.delayed.pop().expect("peeked entry");
            self.waiting.push_back(delayed.job);
        }
    }

    fn prune_retention(&mut self, now: DateTime<Utc>, policy: &QueuePolicy) {
        while let Some((_, finished_at)) = self.recent_completed.front() {
            if self.recent_completed.len() > policy.completed_cap
                || now - *finished_at > policy.completed_retention
            {
                self.recent_completed.pop_front();
            } else {
                break;
            }
        }
        while let Some(entry) = self.recent_failed.front() {
            if now - entry.failed_at > policy.failed_retention {
                self.recent_failed.pop_front();
            } else {
                break;
            }
        }
    }
}

struct ClassQueue {
    state: Mutex<ClassState>,
    notify: Notify,
}

impl ClassQueue {
    fn new() -> Self {
        Self {
            state: Mutex::new(ClassState::default()),
            notify: Notify::new(),
        }
    }
}

/// Two independent FIFO-with-retry queues, one per device class. At-least-once
/// delivery: a claimed job stays accounted as active until acked or nacked; a
/// nacked job re-enters the queue with backoff until its attempts run out,
/// then lands in the failed set (retained, never silently dropped early).
/// No cross-class ordering, and no per-device ordering within a class.
pub struct TelemetryQueue {
    meter: ClassQueue,
    vehicle: ClassQueue,
    policy: QueuePolicy,
}

impl TelemetryQueue {
    pub fn new(policy: QueuePolicy) -> Self {
        Self {
            meter: ClassQueue::new(),
            vehicle: ClassQueue::new(),
            policy,
        }
    }

    pub fn policy(&self) -> &QueuePolicy {
        &self.policy
    }

    fn class(&self, class: DeviceClass) -> &ClassQueue {
        match class {
            DeviceClass::Meter => &self.meter,
            DeviceClass::Vehicle => &self.vehicle,
        }
    }

    pub fn try_enqueue(&self, record: TelemetryRecord) -> Result<Uuid, EnqueueError> {
        let queue = self.class(record.class());
        let job = QueueJob {
            id: Uuid::new_v4(),
            record,
            attempt: 0,
            enqueued_at: Utc::now(),
        };
        let id = job.id;
        {
            let mut state = queue.state.lock().expect("queue lock");
            if state.depth() >= self.policy.capacity {
                return Err(EnqueueError::Full {
                    capacity: self.policy.capacity,
                });
            }
            state.waiting.push_back(job);
        }
        queue.notify.notify_one();
        Ok(id)
    }

    /// Claim the next job for a class; blocks while the queue is empty and no
    /// scheduled retry is due yet.
    pub async fn dequeue(&self, class: DeviceClass) -> QueueJob {
        let queue = self.class(class);
        loop {
            let next_due = {
                let mut state = queue.state.lock().expect("queue lock");
                state.promote_due(Instant::now());
                state.prune_retention(Utc::now(), &self.policy);
                if let Some(job) = state.waiting.pop_front() {
                    state.active += 1;
                    return job;
                }
                state.delayed.peek().map(|delayed| delayed.due)
            };
            match next_due {
                Some(due) => {
                    tokio::select! {
                        _ = queue.notify.notified() => {}
                        _ = tokio::time::sleep_until(due) => {}
                    }
                }
                None => queue.notify.notified().await,
            }
        }
    }

    /// Acknowledge terminal success for a claimed job.
    pub fn ack(&self, class: DeviceClass, job_id: Uuid) {
        let queue = self.class(class);
        let mut state = queue.state.lock().expect("queue lock");
        let now = Utc::now();
        state.active = state.active.saturating_sub(1);
        state.completed_total += 1;
        state.recent_completed.push_back((job_id, now));
        state.prune_retention(now, &self.policy);
    }

    /// Report failure for a claimed job: re-schedule with backoff while
    /// attempts remain, otherwise move it to the failed set.
    pub fn nack(&self, mut job: QueueJob, error: String) {
        let class = job.record.class();
        let queue = self.class(class);
        job.attempt += 1;

        let mut state = queue.state.lock().expect("queue lock");
        state.active = state.active.saturating_sub(1);
        if job.attempt >= self.policy.max_attempts {
            tracing::warn!(
                job_id = %job.id,
                device_id = %job.record.device_id(),
                class = class.as_str(),
                attempts = job.attempt,
                error = %error,
                "ingestion job exhausted retries"
            );
            let now = Utc::now();
            state.failed_total += 1;
            state.recent_failed.push_back(FailedJobInfo {
                job_id: job.id,
                device_id: job.record.device_id().to_string(),
                attempts: job.attempt,
                error,
                failed_at: now,
            });
            state.prune_retention(now, &self.policy);
            drop(state);
            return;
        }

        let delay = retry_backoff(self.policy.retry_base_delay, job.attempt);
        tracing::debug!(
            job_id = %job.id,
            device_id = %job.record.device_id(),
            class = class.as_str(),
            attempt = job.attempt,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "ingestion job scheduled for retry"
        );
        state.delayed.push(DelayedJob {
            due: Instant::now() + delay,
            job,
        });
        drop(state);
        // Wake a waiter so it re-evaluates its sleep deadline.
        queue.notify.notify_one();
    }

    /// Depth counters; read-only, does not mutate queue state.
    pub fn stats(&self, class: DeviceClass) -> ClassStats {
        let state = self.class(class).state.lock().expect("queue lock");
        ClassStats {
            waiting: state.depth(),
            active: state.active,
            completed: state.completed_total,
            failed: state.failed_total,
        }
    }

    /// Recent terminally-failed jobs for diagnostics (bounded retention).
    pub fn recent_failures(&self, class: DeviceClass) -> Vec<FailedJobInfo> {
        let state = self.class(class).state.lock().expect("queue lock");
        state.recent_failed.iter().cloned().collect()
    }
}
