use std::fmt;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

static EMAIL_RE: OnceLock<Regex> = OnceLock::new();

/// A trimmed, lowercased address that passed the `x@y.z` shape check.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SubscriberEmail(String);

impl SubscriberEmail {
    pub fn parse(raw: &str) -> Result<Self> {
        let normalized = raw.trim().to_lowercase();
        let re = EMAIL_RE.get_or_init(|| {
            Regex::new(r"^\S+@\S+\.\S+$").expect("email pattern is valid")
        });
        if normalized.is_empty() || !re.is_match(&normalized) {
            return Err(AppError::InvalidEmail(raw.to_string()));
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for SubscriberEmail {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<SubscriberEmail> for String {
    fn from(email: SubscriberEmail) -> Self {
        email.0
    }
}

impl AsRef<str> for SubscriberEmail {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubscriberEmail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind of content a broadcast is about; each maps to one preference flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Videos,
    Posts,
    Gallery,
}

impl Topic {
    pub(crate) fn preference_column(self) -> &'static str {
        match self {
            Topic::Videos => "pref_video_updates",
            Topic::Posts => "pref_post_updates",
            Topic::Gallery => "pref_gallery_updates",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Topic::Videos => "videos",
            Topic::Posts => "posts",
            Topic::Gallery => "gallery",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    pub video_updates: bool,
    pub post_updates: bool,
    pub gallery_updates: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            video_updates: true,
            post_updates: true,
            gallery_updates: false,
        }
    }
}

impl Preferences {
    pub fn wants(&self, topic: Topic) -> bool {
        match topic {
            Topic::Videos => self.video_updates,
            Topic::Posts => self.post_updates,
            Topic::Gallery => self.gallery_updates,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriberRecord {
    pub id: i64,
    pub email: SubscriberEmail,
    pub is_active: bool,
    pub subscribed_at: DateTime<Utc>,
    pub last_notified: Option<DateTime<Utc>>,
    pub preferences: Preferences,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscribeOutcome {
    Created(SubscriberRecord),
    AlreadySubscribed,
    Reactivated(SubscriberRecord),
}

#[derive(Debug, Clone, Serialize)]
pub struct SubscriberStats {
    pub total: u64,
    pub active: u64,
    pub inactive: u64,
    pub recent: Vec<SubscriberRecord>,
}
