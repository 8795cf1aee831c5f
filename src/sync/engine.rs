use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::db::{InsertOutcome, Repository};
use crate::error::{AppError, Result};
use crate::models::{SyncSummary, VideoCandidate, VideoRecord};
use crate::notify::Notifier;
use crate::youtube::VideoSource;

/// Pulls the latest uploads, stores the ones not seen before and announces
/// each newly stored video to subscribers.
///
/// At most one cycle runs at a time per engine. Deduplication is keyed only
/// on the external id: the pre-check filters known videos and the store's
/// insert-or-ignore absorbs anything that slips past it, e.g. another
/// process syncing the same database.
pub struct SyncEngine {
    source: Arc<dyn VideoSource>,
    repository: Repository,
    notifier: Notifier,
    max_results: u32,
    cycle_timeout: Duration,
    running: Mutex<()>,
}

impl SyncEngine {
    pub fn new(
        source: Arc<dyn VideoSource>,
        repository: Repository,
        notifier: Notifier,
        max_results: u32,
        cycle_timeout: Duration,
    ) -> Self {
        Self {
            source,
            repository,
            notifier,
            max_results,
            cycle_timeout,
            running: Mutex::new(()),
        }
    }

    /// Runs one cycle now. Fails with `SyncInProgress` if another cycle
    /// holds the guard and with `Timeout` if fetching and storing overrun
    /// the deadline. Once new videos are stored the summary is returned
    /// whatever happens to their announcements.
    pub async fn sync_now(&self) -> Result<SyncSummary> {
        let _guard = self
            .running
            .try_lock()
            .map_err(|_| AppError::SyncInProgress)?;

        let (mut summary, inserted) = tokio::time::timeout(self.cycle_timeout, self.ingest())
            .await
            .map_err(|_| AppError::Timeout(self.cycle_timeout))??;

        summary.notified_videos = self.announce(&inserted).await;
        Ok(summary)
    }

    /// Timer entry point: never fails, only logs.
    pub async fn run_scheduled(&self) {
        tracing::info!("running scheduled video sync");
        match self.sync_now().await {
            Ok(summary) => tracing::info!(
                fetched = summary.total_fetched,
                new = summary.new_count,
                failed_inserts = summary.failed_inserts,
                notified = summary.notified_videos,
                "scheduled sync completed"
            ),
            Err(AppError::SyncInProgress) => {
                tracing::warn!("previous sync still running, skipping this tick")
            }
            Err(e) => tracing::error!(error = %e, "scheduled sync failed"),
        }
    }

    async fn ingest(&self) -> Result<(SyncSummary, Vec<VideoRecord>)> {
        let latest_known_before = self
            .repository
            .find_most_recent_video()
            .await?
            .map(|v| v.published_at);

        let candidates = self.source.fetch_latest(self.max_results).await?;
        let total_fetched = candidates.len();
        let latest_published_at = candidates.iter().map(|c| c.published_at).max();

        let fresh = self.unseen(candidates).await?;
        let attempted = fresh.len();

        let outcome = if fresh.is_empty() {
            InsertOutcome::default()
        } else {
            self.repository.insert_videos(fresh).await?
        };

        if outcome.failed > 0 {
            tracing::warn!(failed = outcome.failed, attempted, "some new videos could not be stored");
        }
        if outcome.duplicates > 0 {
            tracing::info!(
                skipped = outcome.duplicates,
                "skipped videos already present in the store"
            );
        }

        let summary = SyncSummary {
            total_fetched,
            new_count: outcome.inserted.len(),
            failed_inserts: outcome.failed,
            latest_published_at,
            latest_known_before,
            notified_videos: 0,
        };
        Ok((summary, outcome.inserted))
    }

    /// Announces each stored video in turn. Returns how many announcements
    /// completed; failures are logged and never fail the cycle.
    async fn announce(&self, videos: &[VideoRecord]) -> usize {
        let mut notified = 0;
        for video in videos {
            match self.notifier.notify_new_video(video).await {
                Ok(report) => {
                    notified += 1;
                    tracing::info!(
                        external_id = %video.external_id,
                        successful = report.successful,
                        targeted = report.total_targeted,
                        "new video announced"
                    );
                }
                Err(e) => tracing::error!(
                    external_id = %video.external_id,
                    error = %e,
                    "failed to announce new video"
                ),
            }
        }
        notified
    }

    /// Drops candidates whose external id is already stored. Repeats within
    /// one fetch are left for the store to skip.
    async fn unseen(&self, candidates: Vec<VideoCandidate>) -> Result<Vec<VideoCandidate>> {
        let ids = candidates.iter().map(|c| c.external_id.clone()).collect();
        let existing = self.repository.find_existing_ids(ids).await?;

        Ok(candidates
            .into_iter()
            .filter(|c| !existing.contains(&c.external_id))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};

    use crate::models::SubscriberEmail;
    use crate::notify::testing::RecordingMailer;
    use crate::youtube::testing::FakeSource;

    fn candidate(id: &str, minutes: i64) -> VideoCandidate {
        VideoCandidate {
            external_id: id.to_string(),
            title: format!("Short {id}"),
            description: String::new(),
            thumbnail_url: format!("https://i.ytimg.com/vi/{id}/mqdefault.jpg"),
            published_at: Utc.with_ymd_and_hms(2026, 4, 1, 9, 0, 0).unwrap()
                + ChronoDuration::minutes(minutes),
        }
    }

    struct Harness {
        engine: Arc<SyncEngine>,
        source: Arc<FakeSource>,
        mailer: Arc<RecordingMailer>,
        repo: Repository,
    }

    async fn harness(source: FakeSource, subscribers: &[&str]) -> Harness {
        harness_with_timeout(source, subscribers, Duration::from_secs(30)).await
    }

    async fn harness_with_timeout(
        source: FakeSource,
        subscribers: &[&str],
        timeout: Duration,
    ) -> Harness {
        harness_with_mailer(source, subscribers, timeout, RecordingMailer::default()).await
    }

    async fn harness_with_mailer(
        source: FakeSource,
        subscribers: &[&str],
        timeout: Duration,
        mailer: RecordingMailer,
    ) -> Harness {
        let repo = Repository::in_memory().await.unwrap();
        for raw in subscribers {
            let email = SubscriberEmail::parse(raw).unwrap();
            repo.insert_subscriber(&email, Utc::now()).await.unwrap();
        }

        let source = Arc::new(source);
        let mailer = Arc::new(mailer);
        let notifier = Notifier::new(repo.clone(), mailer.clone(), "https://site.example".into(), 4);
        let engine = Arc::new(SyncEngine::new(source.clone(), repo.clone(), notifier, 50, timeout));

        Harness {
            engine,
            source,
            mailer,
            repo,
        }
    }

    #[tokio::test]
    async fn test_first_sync_inserts_everything() {
        let h = harness(
            FakeSource::new(vec![candidate("v3", 3), candidate("v2", 2), candidate("v1", 1)]),
            &[],
        )
        .await;

        let summary = h.engine.sync_now().await.unwrap();
        assert_eq!(summary.total_fetched, 3);
        assert_eq!(summary.new_count, 3);
        assert_eq!(summary.failed_inserts, 0);
        assert_eq!(summary.latest_published_at, Some(candidate("v3", 3).published_at));
        assert_eq!(summary.latest_known_before, None);

        let (_, total) = h.repo.list_videos(false, 1, 50).await.unwrap();
        assert_eq!(total, 3);
    }

    #[tokio::test]
    async fn test_resync_inserts_only_unseen() {
        let h = harness(
            FakeSource::new(vec![candidate("a", 1), candidate("b", 2)]),
            &["fan@x.io"],
        )
        .await;
        h.engine.sync_now().await.unwrap();
        assert_eq!(h.mailer.sent().len(), 2);

        h.source
            .set_videos(vec![candidate("c", 3), candidate("b", 2), candidate("a", 1)]);
        let summary = h.engine.sync_now().await.unwrap();

        assert_eq!(summary.total_fetched, 3);
        assert_eq!(summary.new_count, 1);
        assert_eq!(summary.notified_videos, 1);
        assert_eq!(summary.latest_known_before, Some(candidate("b", 2).published_at));

        let sent = h.mailer.sent();
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[2].subject, "🎬 New Short: Short c");
    }

    #[tokio::test]
    async fn test_known_video_is_not_announced_again() {
        let h = harness(FakeSource::new(vec![candidate("v1", 1)]), &["fan@x.io"]).await;
        h.engine.sync_now().await.unwrap();
        let sent_before = h.mailer.sent().len();

        let summary = h.engine.sync_now().await.unwrap();
        assert_eq!(summary.new_count, 0);
        assert_eq!(summary.notified_videos, 0);
        assert_eq!(h.mailer.sent().len(), sent_before);
    }

    #[tokio::test]
    async fn test_hidden_video_is_not_reingested() {
        let h = harness(FakeSource::new(vec![candidate("v1", 1)]), &["fan@x.io"]).await;
        h.engine.sync_now().await.unwrap();

        let (videos, _) = h.repo.list_videos(false, 1, 10).await.unwrap();
        h.repo.set_video_visibility(videos[0].id, false).await.unwrap();

        let summary = h.engine.sync_now().await.unwrap();
        assert_eq!(summary.new_count, 0);
        assert_eq!(h.mailer.sent().len(), 1);

        let (_, total) = h.repo.list_videos(false, 1, 10).await.unwrap();
        assert_eq!(total, 1);
    }

    #[tokio::test]
    async fn test_deleted_video_is_reingested() {
        let h = harness(FakeSource::new(vec![candidate("v1", 1)]), &[]).await;
        h.engine.sync_now().await.unwrap();

        let (videos, _) = h.repo.list_videos(false, 1, 10).await.unwrap();
        h.repo.delete_video(videos[0].id).await.unwrap();

        let summary = h.engine.sync_now().await.unwrap();
        assert_eq!(summary.new_count, 1);
    }

    #[tokio::test]
    async fn test_duplicate_ids_in_one_fetch_store_once() {
        let h = harness(
            FakeSource::new(vec![candidate("dup", 2), candidate("dup", 1)]),
            &["fan@x.io"],
        )
        .await;

        let summary = h.engine.sync_now().await.unwrap();
        assert_eq!(summary.total_fetched, 2);
        assert_eq!(summary.new_count, 1);
        assert_eq!(h.mailer.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_source_failure_leaves_store_untouched() {
        let source = FakeSource::new(vec![candidate("v1", 1)]);
        source.set_failing(true);
        let h = harness(source, &["fan@x.io"]).await;

        let err = h.engine.sync_now().await.unwrap_err();
        assert!(matches!(err, AppError::SourceUnavailable(_)));

        let (_, total) = h.repo.list_videos(false, 1, 10).await.unwrap();
        assert_eq!(total, 0);
        assert!(h.mailer.sent().is_empty());

        // A failed cycle does not poison the guard.
        h.source.set_failing(false);
        assert_eq!(h.engine.sync_now().await.unwrap().new_count, 1);
    }

    #[tokio::test]
    async fn test_overlapping_sync_is_rejected() {
        let h = harness(FakeSource::stalled(), &[]).await;

        let engine = h.engine.clone();
        let first = tokio::spawn(async move { engine.sync_now().await });
        h.source.entered().await;

        let err = h.engine.sync_now().await.unwrap_err();
        assert!(matches!(err, AppError::SyncInProgress));
        assert_eq!(h.source.calls(), 1);

        first.abort();
    }

    #[tokio::test]
    async fn test_hung_source_hits_deadline() {
        let h = harness_with_timeout(FakeSource::stalled(), &[], Duration::from_millis(50)).await;

        let err = h.engine.sync_now().await.unwrap_err();
        assert!(matches!(err, AppError::Timeout(_)));

        // The guard is released after the deadline.
        let err = h.engine.sync_now().await.unwrap_err();
        assert!(matches!(err, AppError::Timeout(_)));
        assert_eq!(h.source.calls(), 2);
        assert_eq!(err.to_string(), "Sync cycle exceeded its deadline of 50ms");
    }

    #[tokio::test]
    async fn test_slow_delivery_does_not_fail_a_stored_sync() {
        let h = harness_with_mailer(
            FakeSource::new(vec![candidate("v1", 1)]),
            &["fan@x.io"],
            Duration::from_millis(100),
            RecordingMailer::slow(Duration::from_millis(300)),
        )
        .await;

        let summary = h.engine.sync_now().await.unwrap();
        assert_eq!(summary.new_count, 1);
        assert_eq!(summary.notified_videos, 1);
        assert_eq!(h.mailer.sent().len(), 1);

        let fan = SubscriberEmail::parse("fan@x.io").unwrap();
        let record = h.repo.find_subscriber_by_email(&fan).await.unwrap().unwrap();
        assert!(record.last_notified.is_some());
    }

    #[tokio::test]
    async fn test_sync_with_subscribers_runs_on_a_spawned_task() {
        let h = harness(
            FakeSource::new(vec![candidate("v1", 1), candidate("v2", 2)]),
            &["a@x.io", "b@x.io"],
        )
        .await;

        let engine = h.engine.clone();
        let summary = tokio::spawn(async move { engine.sync_now().await })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(summary.new_count, 2);
        assert_eq!(summary.notified_videos, 2);
        assert_eq!(h.mailer.sent().len(), 4);

        let engine = h.engine.clone();
        tokio::spawn(async move { engine.run_scheduled().await })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_run_scheduled_swallows_errors() {
        let source = FakeSource::default();
        source.set_failing(true);
        let h = harness(source, &[]).await;

        h.engine.run_scheduled().await;
        assert_eq!(h.source.calls(), 1);
    }
}
