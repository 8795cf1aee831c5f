use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const WATCH_URL: &str = "https://www.youtube.com/watch?v=";

/// A video as reported by the upstream source, before it is stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoCandidate {
    pub external_id: String,
    pub title: String,
    pub description: String,
    pub thumbnail_url: String,
    pub published_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoRecord {
    pub id: i64,
    pub external_id: String,
    pub title: String,
    pub description: String,
    pub thumbnail_url: String,
    pub published_at: DateTime<Utc>,
    pub is_visible: bool,
    pub created_at: DateTime<Utc>,
}

impl VideoRecord {
    pub fn watch_url(&self) -> String {
        format!("{}{}", WATCH_URL, self.external_id)
    }
}

/// One page of visible videos, newest first.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoPage {
    pub items: Vec<VideoRecord>,
    pub current_page: u32,
    pub total_pages: u32,
    pub total_count: u64,
    pub has_more: bool,
}
