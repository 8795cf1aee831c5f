use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use url::Url;

use crate::config::YouTubeConfig;
use crate::error::{AppError, Result};
use crate::models::VideoCandidate;

use super::{VideoSource, MAX_PAGE_SIZE};

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: SearchItemId,
    snippet: Snippet,
}

#[derive(Debug, Deserialize)]
struct SearchItemId {
    #[serde(rename = "videoId")]
    video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Snippet {
    #[serde(rename = "publishedAt")]
    published_at: DateTime<Utc>,
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    thumbnails: Thumbnails,
}

#[derive(Debug, Default, Deserialize)]
struct Thumbnails {
    default: Option<Thumbnail>,
    medium: Option<Thumbnail>,
    high: Option<Thumbnail>,
}

#[derive(Debug, Deserialize)]
struct Thumbnail {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// YouTube Data API v3 search client for a single channel.
pub struct YouTubeClient {
    client: Client,
    config: YouTubeConfig,
}

impl YouTubeClient {
    pub fn new(config: YouTubeConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("shorts-herald/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client, config })
    }

    fn search_url(&self, max_results: u32) -> Result<Url> {
        if !self.config.is_configured() {
            return Err(AppError::Config(
                "YouTube API key or channel id not configured".to_string(),
            ));
        }

        let base = self.config.api_base_url.trim_end_matches('/');
        let page_size = page_size(max_results).to_string();
        let url = Url::parse_with_params(
            &format!("{base}/search"),
            &[
                ("part", "snippet"),
                ("channelId", self.config.channel_id.trim()),
                ("maxResults", page_size.as_str()),
                ("order", "date"),
                ("type", "video"),
                ("key", self.config.api_key.trim()),
            ],
        )?;
        Ok(url)
    }
}

#[async_trait]
impl VideoSource for YouTubeClient {
    async fn fetch_latest(&self, max_results: u32) -> Result<Vec<VideoCandidate>> {
        let url = self.search_url(max_results)?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AppError::SourceUnavailable(e.without_url().to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::SourceUnavailable(e.without_url().to_string()))?;

        if !status.is_success() {
            let detail = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or_else(|_| "no error details".to_string());
            return Err(AppError::SourceUnavailable(format!("HTTP {status}: {detail}")));
        }

        let candidates = parse_search_response(&body)?;
        tracing::debug!(count = candidates.len(), "fetched video candidates");
        Ok(candidates)
    }
}

fn page_size(max_results: u32) -> u32 {
    max_results.clamp(1, MAX_PAGE_SIZE)
}

fn parse_search_response(body: &str) -> Result<Vec<VideoCandidate>> {
    let response: SearchResponse = serde_json::from_str(body)
        .map_err(|e| AppError::SourceUnavailable(format!("malformed search response: {e}")))?;

    let candidates = response
        .items
        .into_iter()
        .filter_map(|item| {
            let external_id = item.id.video_id?;
            let thumbnails = item.snippet.thumbnails;
            let thumbnail_url = thumbnails
                .medium
                .or(thumbnails.high)
                .or(thumbnails.default)
                .map(|t| t.url)
                .unwrap_or_default();

            Some(VideoCandidate {
                external_id,
                title: item.snippet.title,
                description: item.snippet.description,
                thumbnail_url,
                published_at: item.snippet.published_at,
            })
        })
        .collect();

    Ok(candidates)
}
