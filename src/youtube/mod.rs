mod client;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::VideoCandidate;

pub use client::YouTubeClient;

/// Largest page the search endpoint will return.
pub const MAX_PAGE_SIZE: u32 = 50;

/// Upstream listing of a channel's uploads.
#[async_trait]
pub trait VideoSource: Send + Sync {
    /// Returns at most `max_results` candidates, newest first.
    async fn fetch_latest(&self, max_results: u32) -> Result<Vec<VideoCandidate>>;
}
