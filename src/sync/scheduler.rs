use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::SyncEngine;

/// Fires the sync engine on wall-clock multiples of `period` (with the
/// default hourly period, at minute 0 of every hour).
pub struct Scheduler {
    engine: Arc<SyncEngine>,
    period: Duration,
}

impl Scheduler {
    pub fn new(engine: Arc<SyncEngine>, period: Duration) -> Self {
        Self { engine, period }
    }

    /// Runs until `shutdown` flips to true or its sender is dropped.
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let first = delay_until_next_tick(Utc::now(), self.period);
            let mut ticker = tokio::time::interval_at(Instant::now() + first, self.period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            tracing::info!(
                period_secs = self.period.as_secs(),
                first_run_in_secs = first.as_secs(),
                "video sync scheduler started"
            );

            loop {
                tokio::select! {
                    _ = ticker.tick() => self.engine.run_scheduled().await,
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }

            tracing::info!("video sync scheduler stopped");
        })
    }
}

/// Time from `now` to the next instant that is a whole multiple of `period`
/// since the Unix epoch. Never zero: a tick exactly at `now` is skipped.
pub fn delay_until_next_tick(now: DateTime<Utc>, period: Duration) -> Duration {
    let period_ms = period.as_millis().max(1) as i64;
    let elapsed = now.timestamp_millis().rem_euclid(period_ms);
    Duration::from_millis((period_ms - elapsed) as u64)
}
