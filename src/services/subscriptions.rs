use chrono::Utc;

use crate::db::Repository;
use crate::error::Result;
use crate::models::{
    Preferences, SubscribeOutcome, SubscriberEmail, SubscriberRecord, SubscriberStats,
};

const RECENT_LIMIT: u32 = 10;

/// Subscriber lifecycle: subscribe, unsubscribe (soft), re-subscribe and
/// the admin listing and hard delete.
#[derive(Clone)]
pub struct Subscriptions {
    repository: Repository,
}

impl Subscriptions {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    pub async fn subscribe(&self, raw_email: &str) -> Result<SubscribeOutcome> {
        let email = SubscriberEmail::parse(raw_email)?;
        let now = Utc::now();

        if let Some(existing) = self.repository.find_subscriber_by_email(&email).await? {
            if existing.is_active {
                return Ok(SubscribeOutcome::AlreadySubscribed);
            }
            return match self.repository.reactivate_subscriber(&email, now).await? {
                Some(record) => {
                    tracing::info!(email = %email, "subscription reactivated");
                    Ok(SubscribeOutcome::Reactivated(record))
                }
                // Reactivated by a concurrent request.
                None => Ok(SubscribeOutcome::AlreadySubscribed),
            };
        }

        match self.repository.insert_subscriber(&email, now).await? {
            Some(record) => {
                tracing::info!(email = %email, "new subscriber");
                Ok(SubscribeOutcome::Created(record))
            }
            None => Ok(SubscribeOutcome::AlreadySubscribed),
        }
    }

    /// Returns false when the address is unknown.
    pub async fn unsubscribe(&self, raw_email: &str) -> Result<bool> {
        let email = SubscriberEmail::parse(raw_email)?;
        let found = self.repository.deactivate_subscriber(&email).await?;
        if found {
            tracing::info!(email = %email, "unsubscribed");
        }
        Ok(found)
    }

    pub async fn set_preferences(
        &self,
        raw_email: &str,
        preferences: Preferences,
    ) -> Result<Option<SubscriberRecord>> {
        let email = SubscriberEmail::parse(raw_email)?;
        self.repository
            .set_subscriber_preferences(&email, preferences)
            .await
    }

    pub async fn find(&self, raw_email: &str) -> Result<Option<SubscriberRecord>> {
        let email = SubscriberEmail::parse(raw_email)?;
        self.repository.find_subscriber_by_email(&email).await
    }

    pub async fn list(&self) -> Result<Vec<SubscriberRecord>> {
        self.repository.list_subscribers().await
    }

    pub async fn stats(&self) -> Result<SubscriberStats> {
        let (total, active) = self.repository.subscriber_counts().await?;
        let recent = self
            .repository
            .recent_active_subscribers(RECENT_LIMIT)
            .await?;

        Ok(SubscriberStats {
            total,
            active,
            inactive: total - active,
            recent,
        })
    }

    pub async fn delete(&self, id: i64) -> Result<bool> {
        self.repository.delete_subscriber(id).await
    }
}
