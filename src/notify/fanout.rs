use std::sync::Arc;

use chrono::Utc;
use futures::stream::{self, StreamExt};

use crate::db::Repository;
use crate::error::Result;
use crate::models::{FanoutReport, Topic, VideoRecord};

use super::mailer::{Mailer, OutgoingEmail};
use super::templates::{self, PostAnnouncement};

/// Sends one message per opted-in subscriber and records when each
/// targeted subscriber was last notified.
#[derive(Clone)]
pub struct Notifier {
    repository: Repository,
    mailer: Arc<dyn Mailer>,
    site_url: String,
    max_concurrent: usize,
}

impl Notifier {
    pub fn new(
        repository: Repository,
        mailer: Arc<dyn Mailer>,
        site_url: String,
        max_concurrent: usize,
    ) -> Self {
        Self {
            repository,
            mailer,
            site_url,
            max_concurrent: max_concurrent.max(1),
        }
    }

    pub async fn notify_new_video(&self, video: &VideoRecord) -> Result<FanoutReport> {
        let rendered = templates::video_update(video);
        self.broadcast(Topic::Videos, &rendered.subject, &rendered.html)
            .await
    }

    pub async fn notify_new_post(&self, post: &PostAnnouncement) -> Result<FanoutReport> {
        let rendered = templates::post_update(post);
        self.broadcast(Topic::Posts, &rendered.subject, &rendered.html)
            .await
    }

    /// Individual delivery failures are counted, not returned. Every
    /// targeted subscriber gets `last_notified` stamped once all sends have
    /// settled, whether or not their own delivery succeeded.
    pub async fn broadcast(&self, topic: Topic, subject: &str, html: &str) -> Result<FanoutReport> {
        let targets = self.repository.active_subscribers_for(topic).await?;
        if targets.is_empty() {
            tracing::debug!(%topic, "no subscribers opted in, nothing to send");
            return Ok(FanoutReport::default());
        }

        let sends: Vec<_> = targets
            .iter()
            .map(|subscriber| self.deliver(subscriber.email.as_str(), subject, html))
            .collect();
        let outcomes: Vec<bool> = stream::iter(sends)
            .buffer_unordered(self.max_concurrent)
            .collect()
            .await;

        let successful = outcomes.iter().filter(|delivered| **delivered).count();
        let report = FanoutReport {
            total_targeted: targets.len(),
            successful,
            failed: targets.len() - successful,
        };

        let ids = targets.iter().map(|s| s.id).collect();
        self.repository.touch_last_notified(ids, Utc::now()).await?;

        tracing::info!(
            %topic,
            targeted = report.total_targeted,
            successful = report.successful,
            failed = report.failed,
            "notification batch settled"
        );
        Ok(report)
    }

    async fn deliver(&self, to: &str, subject: &str, html: &str) -> bool {
        let email = OutgoingEmail {
            to: to.to_string(),
            subject: subject.to_string(),
            html: templates::with_unsubscribe_link(html, &self.site_url, to),
        };
        match self.mailer.send(&email).await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(to, error = %e, "notification delivery failed");
                false
            }
        }
    }
}
