use anyhow::{Context, Result};
use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use sqlx::PgPool;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

const HISTORY_TABLES: [&str; 2] = ["meter_history", "vehicle_history"];

/// Materializes daily history partitions ahead of the time boundary they will
/// serve. Appends never depend on this succeeding: the DEFAULT partition
/// created by the migration catches rows for which no daily partition exists
/// yet. Querying code only ever touches the parent tables, so a window
/// spanning a partition boundary merges transparently.
pub struct PartitionMaintainer {
    db: PgPool,
    interval: Duration,
}

impl PartitionMaintainer {
    pub fn new(db: PgPool, interval: Duration) -> Self {
        Self { db, interval }
    }

    pub fn start(self, cancel: CancellationToken) {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(err) = ensure_upcoming_partitions(&self.db).await {
                            warn!("history partition maintenance failed: {err:#}");
                        }
                    }
                }
            }
        });
    }
}

/// Creates the partitions for today and tomorrow (idempotent).
pub async fn ensure_upcoming_partitions(db: &PgPool) -> Result<()> {
    let today = Utc::now().date_naive();
    for offset in 0..2 {
        let day = today + ChronoDuration::days(offset);
        for table in HISTORY_TABLES {
            create_daily_partition(db, table, day).await?;
        }
    }
    Ok(())
}

async fn create_daily_partition(db: &PgPool, table: &str, day: NaiveDate) -> Result<()> {
    let next_day = day + ChronoDuration::days(1);
    let partition = partition_name(table, day);
    // DDL does not take bind parameters; the table name is a fixed constant
    // and the dates are formatted from NaiveDate, so nothing user-controlled
    // reaches this statement.
    let statement = format!(
        "CREATE TABLE IF NOT EXISTS {partition} PARTITION OF {table} \
         FOR VALUES FROM ('{day}T00:00:00Z') TO ('{next_day}T00:00:00Z')",
    );
    sqlx::query(&statement)
        .execute(db)
        .await
        .with_context(|| format!("failed to create history partition {partition}"))?;
    Ok(())
}

fn partition_name(table: &str, day: NaiveDate) -> String {
    format!("{table}_p{}", day.format("%Y%m%d"))
}
