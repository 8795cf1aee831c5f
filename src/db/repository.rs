use std::collections::HashSet;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, OptionalExtension, Row};
use tokio_rusqlite::Connection;

use crate::error::Result;
use crate::models::{
    Preferences, SubscriberEmail, SubscriberRecord, Topic, VideoCandidate, VideoRecord,
};

use super::schema::SCHEMA;

const VIDEO_COLUMNS: &str =
    "id, external_id, title, description, thumbnail_url, published_at, is_visible, created_at";

const SUBSCRIBER_COLUMNS: &str = "id, email, is_active, subscribed_at, last_notified, \
     pref_video_updates, pref_post_updates, pref_gallery_updates";

/// Result of a best-effort batch insert.
#[derive(Debug, Default)]
pub struct InsertOutcome {
    pub inserted: Vec<VideoRecord>,
    /// Rows skipped because the external id was already present.
    pub duplicates: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct Repository {
    conn: Connection,
}

impl Repository {
    pub async fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path).await?;
        Self::init(conn).await
    }

    #[cfg(test)]
    pub async fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().await?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self> {
        conn.call(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;

        Ok(Self { conn })
    }

    // Video operations

    pub async fn find_most_recent_video(&self) -> Result<Option<VideoRecord>> {
        let video = self
            .conn
            .call(|conn| {
                let sql = format!(
                    "SELECT {VIDEO_COLUMNS} FROM videos ORDER BY published_at DESC LIMIT 1"
                );
                let video = conn.query_row(&sql, [], video_from_row).optional()?;
                Ok(video)
            })
            .await?;
        Ok(video)
    }

    /// Returns the subset of `external_ids` already stored.
    pub async fn find_existing_ids(&self, external_ids: Vec<String>) -> Result<HashSet<String>> {
        if external_ids.is_empty() {
            return Ok(HashSet::new());
        }

        let existing = self
            .conn
            .call(move |conn| {
                let placeholders = vec!["?"; external_ids.len()].join(", ");
                let sql = format!(
                    "SELECT external_id FROM videos WHERE external_id IN ({placeholders})"
                );
                let mut stmt = conn.prepare(&sql)?;
                let ids = stmt
                    .query_map(params_from_iter(external_ids.iter()), |row| row.get(0))?
                    .collect::<std::result::Result<HashSet<String>, _>>()?;
                Ok(ids)
            })
            .await?;
        Ok(existing)
    }

    /// Inserts each candidate independently. A duplicate external id is
    /// skipped and any other per-row failure is logged and counted; neither
    /// stops the remaining rows.
    pub async fn insert_videos(&self, candidates: Vec<VideoCandidate>) -> Result<InsertOutcome> {
        let outcome = self
            .conn
            .call(move |conn| {
                let mut outcome = InsertOutcome::default();
                let mut stmt = conn.prepare(
                    r#"INSERT OR IGNORE INTO videos
                           (external_id, title, description, thumbnail_url, published_at, is_visible, created_at)
                       VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6)"#,
                )?;

                for candidate in candidates {
                    let created_at = Utc::now();
                    let result = stmt.execute(params![
                        candidate.external_id,
                        candidate.title,
                        candidate.description,
                        candidate.thumbnail_url,
                        format_datetime(&candidate.published_at),
                        format_datetime(&created_at),
                    ]);

                    match result {
                        Ok(0) => {
                            tracing::debug!(external_id = %candidate.external_id, "video already stored, skipping");
                            outcome.duplicates += 1;
                        }
                        Ok(_) => outcome.inserted.push(VideoRecord {
                            id: conn.last_insert_rowid(),
                            external_id: candidate.external_id,
                            title: candidate.title,
                            description: candidate.description,
                            thumbnail_url: candidate.thumbnail_url,
                            published_at: candidate.published_at,
                            is_visible: true,
                            created_at,
                        }),
                        Err(e) => {
                            tracing::warn!(external_id = %candidate.external_id, error = %e, "failed to insert video");
                            outcome.failed += 1;
                        }
                    }
                }

                Ok(outcome)
            })
            .await?;
        Ok(outcome)
    }

    /// Returns one page of videos ordered newest first plus the total number
    /// of rows matching the filter. `page` is 1-based.
    pub async fn list_videos(
        &self,
        visible_only: bool,
        page: u32,
        page_size: u32,
    ) -> Result<(Vec<VideoRecord>, u64)> {
        let offset = i64::from(page.saturating_sub(1)) * i64::from(page_size);
        let limit = i64::from(page_size);

        let result = self
            .conn
            .call(move |conn| {
                let filter = if visible_only { "WHERE is_visible = 1" } else { "" };

                let total: i64 = conn.query_row(
                    &format!("SELECT COUNT(*) FROM videos {filter}"),
                    [],
                    |row| row.get(0),
                )?;

                let mut stmt = conn.prepare(&format!(
                    "SELECT {VIDEO_COLUMNS} FROM videos {filter}
                     ORDER BY published_at DESC, id DESC
                     LIMIT ?1 OFFSET ?2"
                ))?;
                let videos = stmt
                    .query_map(params![limit, offset], video_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;

                Ok((videos, total.max(0) as u64))
            })
            .await?;
        Ok(result)
    }

    pub async fn set_video_visibility(&self, id: i64, visible: bool) -> Result<Option<VideoRecord>> {
        let video = self
            .conn
            .call(move |conn| {
                let changed = conn.execute(
                    "UPDATE videos SET is_visible = ?1 WHERE id = ?2",
                    params![visible, id],
                )?;
                if changed == 0 {
                    return Ok(None);
                }
                let sql = format!("SELECT {VIDEO_COLUMNS} FROM videos WHERE id = ?1");
                let video = conn.query_row(&sql, params![id], video_from_row).optional()?;
                Ok(video)
            })
            .await?;
        Ok(video)
    }

    pub async fn delete_video(&self, id: i64) -> Result<Option<VideoRecord>> {
        let video = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let sql = format!("SELECT {VIDEO_COLUMNS} FROM videos WHERE id = ?1");
                let video = tx.query_row(&sql, params![id], video_from_row).optional()?;
                if video.is_some() {
                    tx.execute("DELETE FROM videos WHERE id = ?1", params![id])?;
                }
                tx.commit()?;
                Ok(video)
            })
            .await?;
        Ok(video)
    }

    // Subscriber operations

    pub async fn find_subscriber_by_email(
        &self,
        email: &SubscriberEmail,
    ) -> Result<Option<SubscriberRecord>> {
        let email = email.as_str().to_string();
        let subscriber = self
            .conn
            .call(move |conn| {
                let sql = format!("SELECT {SUBSCRIBER_COLUMNS} FROM subscribers WHERE email = ?1");
                let subscriber = conn
                    .query_row(&sql, params![email], subscriber_from_row)
                    .optional()?;
                Ok(subscriber)
            })
            .await?;
        Ok(subscriber)
    }

    /// Inserts a new active subscriber with default preferences. Returns
    /// `None` if the address is already present.
    pub async fn insert_subscriber(
        &self,
        email: &SubscriberEmail,
        subscribed_at: DateTime<Utc>,
    ) -> Result<Option<SubscriberRecord>> {
        let email = email.as_str().to_string();
        let prefs = Preferences::default();
        let subscriber = self
            .conn
            .call(move |conn| {
                let inserted = conn.execute(
                    r#"INSERT INTO subscribers
                           (email, is_active, subscribed_at, pref_video_updates, pref_post_updates, pref_gallery_updates)
                       VALUES (?1, 1, ?2, ?3, ?4, ?5)
                       ON CONFLICT(email) DO NOTHING"#,
                    params![
                        email,
                        format_datetime(&subscribed_at),
                        prefs.video_updates,
                        prefs.post_updates,
                        prefs.gallery_updates,
                    ],
                )?;
                if inserted == 0 {
                    return Ok(None);
                }
                let sql = format!("SELECT {SUBSCRIBER_COLUMNS} FROM subscribers WHERE id = ?1");
                let subscriber = conn
                    .query_row(&sql, params![conn.last_insert_rowid()], subscriber_from_row)
                    .optional()?;
                Ok(subscriber)
            })
            .await?;
        Ok(subscriber)
    }

    /// Flips an inactive subscriber back on and refreshes `subscribed_at`.
    /// Returns `None` if there was no inactive row for the address.
    pub async fn reactivate_subscriber(
        &self,
        email: &SubscriberEmail,
        subscribed_at: DateTime<Utc>,
    ) -> Result<Option<SubscriberRecord>> {
        let email = email.as_str().to_string();
        let subscriber = self
            .conn
            .call(move |conn| {
                let changed = conn.execute(
                    "UPDATE subscribers SET is_active = 1, subscribed_at = ?1 WHERE email = ?2 AND is_active = 0",
                    params![format_datetime(&subscribed_at), email],
                )?;
                if changed == 0 {
                    return Ok(None);
                }
                let sql = format!("SELECT {SUBSCRIBER_COLUMNS} FROM subscribers WHERE email = ?1");
                let subscriber = conn
                    .query_row(&sql, params![email], subscriber_from_row)
                    .optional()?;
                Ok(subscriber)
            })
            .await?;
        Ok(subscriber)
    }

    /// Returns whether a row with that address exists.
    pub async fn deactivate_subscriber(&self, email: &SubscriberEmail) -> Result<bool> {
        let email = email.as_str().to_string();
        let found = self
            .conn
            .call(move |conn| {
                let changed = conn.execute(
                    "UPDATE subscribers SET is_active = 0 WHERE email = ?1",
                    params![email],
                )?;
                Ok(changed > 0)
            })
            .await?;
        Ok(found)
    }

    pub async fn set_subscriber_preferences(
        &self,
        email: &SubscriberEmail,
        prefs: Preferences,
    ) -> Result<Option<SubscriberRecord>> {
        let email = email.as_str().to_string();
        let subscriber = self
            .conn
            .call(move |conn| {
                let changed = conn.execute(
                    r#"UPDATE subscribers
                       SET pref_video_updates = ?1, pref_post_updates = ?2, pref_gallery_updates = ?3
                       WHERE email = ?4"#,
                    params![
                        prefs.video_updates,
                        prefs.post_updates,
                        prefs.gallery_updates,
                        email
                    ],
                )?;
                if changed == 0 {
                    return Ok(None);
                }
                let sql = format!("SELECT {SUBSCRIBER_COLUMNS} FROM subscribers WHERE email = ?1");
                let subscriber = conn
                    .query_row(&sql, params![email], subscriber_from_row)
                    .optional()?;
                Ok(subscriber)
            })
            .await?;
        Ok(subscriber)
    }

    pub async fn list_subscribers(&self) -> Result<Vec<SubscriberRecord>> {
        let subscribers = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {SUBSCRIBER_COLUMNS} FROM subscribers ORDER BY subscribed_at DESC, id DESC"
                ))?;
                let subscribers = stmt
                    .query_map([], subscriber_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(subscribers)
            })
            .await?;
        Ok(subscribers)
    }

    pub async fn recent_active_subscribers(&self, limit: u32) -> Result<Vec<SubscriberRecord>> {
        let subscribers = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {SUBSCRIBER_COLUMNS} FROM subscribers WHERE is_active = 1
                     ORDER BY subscribed_at DESC, id DESC LIMIT ?1"
                ))?;
                let subscribers = stmt
                    .query_map(params![limit], subscriber_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(subscribers)
            })
            .await?;
        Ok(subscribers)
    }

    /// Returns `(total, active)`.
    pub async fn subscriber_counts(&self) -> Result<(u64, u64)> {
        let counts = self
            .conn
            .call(|conn| {
                let (total, active): (i64, i64) = conn.query_row(
                    "SELECT COUNT(*), COALESCE(SUM(is_active), 0) FROM subscribers",
                    [],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )?;
                Ok((total.max(0) as u64, active.max(0) as u64))
            })
            .await?;
        Ok(counts)
    }

    pub async fn delete_subscriber(&self, id: i64) -> Result<bool> {
        let deleted = self
            .conn
            .call(move |conn| {
                let changed = conn.execute("DELETE FROM subscribers WHERE id = ?1", params![id])?;
                Ok(changed > 0)
            })
            .await?;
        Ok(deleted)
    }

    /// Active subscribers who opted in to `topic`.
    pub async fn active_subscribers_for(&self, topic: Topic) -> Result<Vec<SubscriberRecord>> {
        let column = topic.preference_column();
        let subscribers = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {SUBSCRIBER_COLUMNS} FROM subscribers
                     WHERE is_active = 1 AND {column} = 1
                     ORDER BY id"
                ))?;
                let subscribers = stmt
                    .query_map([], subscriber_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(subscribers)
            })
            .await?;
        Ok(subscribers)
    }

    pub async fn touch_last_notified(&self, ids: Vec<i64>, at: DateTime<Utc>) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }

        let updated = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let mut updated = 0;
                {
                    let mut stmt =
                        tx.prepare("UPDATE subscribers SET last_notified = ?1 WHERE id = ?2")?;
                    let at = format_datetime(&at);
                    for id in ids {
                        updated += stmt.execute(params![at, id])?;
                    }
                }
                tx.commit()?;
                Ok(updated)
            })
            .await?;
        Ok(updated)
    }
}

/// Fixed-width UTC form so that text ordering matches time ordering.
fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn conversion_error(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, message.into())
}

fn parse_datetime(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, format!("invalid timestamp {raw:?}: {e}")))
}

fn datetime_column(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_datetime(idx, &raw)
}

fn optional_datetime_column(row: &Row, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    row.get::<_, Option<String>>(idx)?
        .map(|raw| parse_datetime(idx, &raw))
        .transpose()
}

fn video_from_row(row: &Row) -> rusqlite::Result<VideoRecord> {
    Ok(VideoRecord {
        id: row.get(0)?,
        external_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        thumbnail_url: row.get(4)?,
        published_at: datetime_column(row, 5)?,
        is_visible: row.get::<_, i64>(6)? != 0,
        created_at: datetime_column(row, 7)?,
    })
}

fn subscriber_from_row(row: &Row) -> rusqlite::Result<SubscriberRecord> {
    let raw_email: String = row.get(1)?;
    let email = SubscriberEmail::parse(&raw_email)
        .map_err(|e| conversion_error(1, e.to_string()))?;

    Ok(SubscriberRecord {
        id: row.get(0)?,
        email,
        is_active: row.get::<_, i64>(2)? != 0,
        subscribed_at: datetime_column(row, 3)?,
        last_notified: optional_datetime_column(row, 4)?,
        preferences: Preferences {
            video_updates: row.get::<_, i64>(5)? != 0,
            post_updates: row.get::<_, i64>(6)? != 0,
            gallery_updates: row.get::<_, i64>(7)? != 0,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn candidate(id: &str, minutes: i64) -> VideoCandidate {
        VideoCandidate {
            external_id: id.to_string(),
            title: format!("Video {id}"),
            description: String::new(),
            thumbnail_url: format!("https://i.ytimg.com/vi/{id}/mqdefault.jpg"),
            published_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
                + Duration::minutes(minutes),
        }
    }

    #[tokio::test]
    async fn test_insert_skips_duplicates_within_and_across_batches() {
        let repo = Repository::in_memory().await.unwrap();

        let outcome = repo
            .insert_videos(vec![candidate("a", 1), candidate("b", 2), candidate("a", 3)])
            .await
            .unwrap();
        assert_eq!(outcome.inserted.len(), 2);
        assert_eq!(outcome.duplicates, 1);
        assert_eq!(outcome.failed, 0);

        let outcome = repo
            .insert_videos(vec![candidate("b", 2), candidate("c", 4)])
            .await
            .unwrap();
        assert_eq!(outcome.inserted.len(), 1);
        assert_eq!(outcome.inserted[0].external_id, "c");
        assert_eq!(outcome.duplicates, 1);

        let (_, total) = repo.list_videos(false, 1, 50).await.unwrap();
        assert_eq!(total, 3);
    }

    #[tokio::test]
    async fn test_find_existing_ids() {
        let repo = Repository::in_memory().await.unwrap();
        repo.insert_videos(vec![candidate("a", 1), candidate("b", 2)])
            .await
            .unwrap();

        let existing = repo
            .find_existing_ids(vec!["a".into(), "z".into(), "b".into()])
            .await
            .unwrap();
        assert_eq!(existing, HashSet::from(["a".to_string(), "b".to_string()]));

        assert!(repo.find_existing_ids(Vec::new()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_most_recent_and_ordering() {
        let repo = Repository::in_memory().await.unwrap();
        assert!(repo.find_most_recent_video().await.unwrap().is_none());

        repo.insert_videos(vec![candidate("old", 1), candidate("new", 90), candidate("mid", 30)])
            .await
            .unwrap();

        let latest = repo.find_most_recent_video().await.unwrap().unwrap();
        assert_eq!(latest.external_id, "new");

        let (videos, _) = repo.list_videos(true, 1, 10).await.unwrap();
        let ids: Vec<_> = videos.iter().map(|v| v.external_id.as_str()).collect();
        assert_eq!(ids, vec!["new", "mid", "old"]);
    }

    #[tokio::test]
    async fn test_visibility_and_delete() {
        let repo = Repository::in_memory().await.unwrap();
        let outcome = repo
            .insert_videos(vec![candidate("a", 1), candidate("b", 2)])
            .await
            .unwrap();
        let a = outcome.inserted[0].id;

        let hidden = repo.set_video_visibility(a, false).await.unwrap().unwrap();
        assert!(!hidden.is_visible);
        assert!(repo.set_video_visibility(9999, false).await.unwrap().is_none());

        let (visible, total) = repo.list_videos(true, 1, 10).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(visible[0].external_id, "b");

        let removed = repo.delete_video(a).await.unwrap().unwrap();
        assert_eq!(removed.external_id, "a");
        assert!(repo.delete_video(a).await.unwrap().is_none());
        assert!(repo.set_video_visibility(a, true).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_subscriber_lifecycle() {
        let repo = Repository::in_memory().await.unwrap();
        let email = SubscriberEmail::parse("fan@example.com").unwrap();
        let now = Utc::now();

        let created = repo.insert_subscriber(&email, now).await.unwrap().unwrap();
        assert!(created.is_active);
        assert_eq!(created.preferences, Preferences::default());
        assert!(repo.insert_subscriber(&email, now).await.unwrap().is_none());

        // Active rows are not "reactivated".
        assert!(repo.reactivate_subscriber(&email, now).await.unwrap().is_none());

        assert!(repo.deactivate_subscriber(&email).await.unwrap());
        let later = now + Duration::days(3);
        let back = repo.reactivate_subscriber(&email, later).await.unwrap().unwrap();
        assert!(back.is_active);
        assert!(back.subscribed_at > created.subscribed_at);

        assert_eq!(repo.subscriber_counts().await.unwrap(), (1, 1));
        assert!(repo.delete_subscriber(back.id).await.unwrap());
        assert_eq!(repo.subscriber_counts().await.unwrap(), (0, 0));
    }

    #[tokio::test]
    async fn test_active_subscribers_for_topic() {
        let repo = Repository::in_memory().await.unwrap();
        let now = Utc::now();
        for raw in ["a@x.io", "b@x.io", "c@x.io"] {
            let email = SubscriberEmail::parse(raw).unwrap();
            repo.insert_subscriber(&email, now).await.unwrap();
        }

        let b = SubscriberEmail::parse("b@x.io").unwrap();
        repo.deactivate_subscriber(&b).await.unwrap();

        let c = SubscriberEmail::parse("c@x.io").unwrap();
        repo.set_subscriber_preferences(
            &c,
            Preferences {
                video_updates: false,
                post_updates: true,
                gallery_updates: true,
            },
        )
        .await
        .unwrap();

        let video_targets = repo.active_subscribers_for(Topic::Videos).await.unwrap();
        let emails: Vec<_> = video_targets.iter().map(|s| s.email.as_str()).collect();
        assert_eq!(emails, vec!["a@x.io"]);

        let gallery_targets = repo.active_subscribers_for(Topic::Gallery).await.unwrap();
        assert_eq!(gallery_targets.len(), 1);
        assert_eq!(gallery_targets[0].email.as_str(), "c@x.io");
    }

    #[tokio::test]
    async fn test_touch_last_notified() {
        let repo = Repository::in_memory().await.unwrap();
        let email = SubscriberEmail::parse("a@x.io").unwrap();
        let sub = repo
            .insert_subscriber(&email, Utc::now())
            .await
            .unwrap()
            .unwrap();
        assert!(sub.last_notified.is_none());

        let at = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        assert_eq!(repo.touch_last_notified(vec![sub.id, 4242], at).await.unwrap(), 1);

        let reloaded = repo.find_subscriber_by_email(&email).await.unwrap().unwrap();
        assert_eq!(reloaded.last_notified, Some(at));
    }

    #[tokio::test]
    async fn test_malformed_last_notified_is_an_error() {
        let repo = Repository::in_memory().await.unwrap();
        let email = SubscriberEmail::parse("a@x.io").unwrap();
        repo.insert_subscriber(&email, Utc::now()).await.unwrap();

        repo.conn
            .call(|conn| {
                conn.execute(
                    "UPDATE subscribers SET last_notified = '2026-03-01 12:00:00'",
                    [],
                )?;
                Ok(())
            })
            .await
            .unwrap();

        assert!(repo.find_subscriber_by_email(&email).await.is_err());
        assert!(repo.list_subscribers().await.is_err());
    }
}
