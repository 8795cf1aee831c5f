use chrono::{DateTime, Utc};
use serde::Serialize;

/// Outcome of one ingestion cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    pub total_fetched: usize,
    pub new_count: usize,
    /// Candidates that were new but did not make it into the store.
    pub failed_inserts: usize,
    /// Publish time of the newest fetched candidate.
    pub latest_published_at: Option<DateTime<Utc>>,
    /// Newest publish time already stored before this cycle ran.
    pub latest_known_before: Option<DateTime<Utc>>,
    pub notified_videos: usize,
}

/// Per-broadcast delivery counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FanoutReport {
    pub total_targeted: usize,
    pub successful: usize,
    pub failed: usize,
}
