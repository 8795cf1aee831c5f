use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::db::Repository;
use crate::error::Result;
use crate::models::FanoutReport;
use crate::notify::{build_mailer, Notifier, PostAnnouncement};
use crate::services::{Subscriptions, VideoCatalog};
use crate::sync::{Scheduler, SyncEngine};
use crate::youtube::YouTubeClient;

pub struct App {
    pub catalog: VideoCatalog,
    pub subscriptions: Subscriptions,
    pub engine: Arc<SyncEngine>,
    notifier: Notifier,
    schedule_period: Duration,
}

impl App {
    pub async fn new(config: &Config) -> Result<Self> {
        let repository = Repository::new(&config.db_path).await?;

        if !config.youtube.is_configured() {
            tracing::warn!("YouTube API key or channel id not found, video sync will fail until configured");
        }
        let source = Arc::new(YouTubeClient::new(config.youtube.clone())?);

        let mailer = build_mailer(&config.mail)?;
        let notifier = Notifier::new(
            repository.clone(),
            mailer,
            config.site_url.clone(),
            config.schedule.max_concurrent_sends,
        );

        let engine = Arc::new(SyncEngine::new(
            source,
            repository.clone(),
            notifier.clone(),
            config.youtube.max_results,
            Duration::from_secs(config.schedule.cycle_timeout_secs),
        ));

        Ok(Self {
            catalog: VideoCatalog::new(repository.clone()),
            subscriptions: Subscriptions::new(repository),
            engine,
            notifier,
            schedule_period: Duration::from_secs(u64::from(config.schedule.interval_minutes) * 60),
        })
    }

    pub fn start_scheduler(&self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        Scheduler::new(Arc::clone(&self.engine), self.schedule_period).spawn(shutdown)
    }

    pub async fn announce_post(&self, post: &PostAnnouncement) -> Result<FanoutReport> {
        self.notifier.notify_new_post(post).await
    }
}
