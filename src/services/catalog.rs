use crate::db::Repository;
use crate::error::Result;
use crate::models::{VideoPage, VideoRecord};

pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// Public read access to stored videos plus the admin visibility and
/// delete actions. None of these touch ingestion.
#[derive(Clone)]
pub struct VideoCatalog {
    repository: Repository,
}

impl VideoCatalog {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    /// Visible videos, newest first. `page` and `page_size` start at 1;
    /// zero is read as 1 rather than rejected.
    pub async fn get_page(&self, page: u32, page_size: u32) -> Result<VideoPage> {
        self.page(true, page, page_size).await
    }

    /// Same as [`get_page`](Self::get_page) but including hidden videos.
    pub async fn get_admin_page(&self, page: u32, page_size: u32) -> Result<VideoPage> {
        self.page(false, page, page_size).await
    }

    async fn page(&self, visible_only: bool, page: u32, page_size: u32) -> Result<VideoPage> {
        let page = page.max(1);
        let page_size = page_size.max(1);

        let (items, total_count) = self
            .repository
            .list_videos(visible_only, page, page_size)
            .await?;

        let skipped = u64::from(page - 1) * u64::from(page_size);
        let has_more = skipped + (items.len() as u64) < total_count;
        let total_pages = total_count.div_ceil(u64::from(page_size)) as u32;

        Ok(VideoPage {
            items,
            current_page: page,
            total_pages,
            total_count,
            has_more,
        })
    }

    pub async fn set_visibility(&self, id: i64, visible: bool) -> Result<Option<VideoRecord>> {
        let video = self.repository.set_video_visibility(id, visible).await?;
        match &video {
            Some(v) => tracing::info!(id, external_id = %v.external_id, visible, "video visibility updated"),
            None => tracing::debug!(id, "visibility change for unknown video"),
        }
        Ok(video)
    }

    /// Removes the stored row only. A video still published upstream comes
    /// back on the next sync.
    pub async fn delete(&self, id: i64) -> Result<Option<VideoRecord>> {
        let video = self.repository.delete_video(id).await?;
        if let Some(v) = &video {
            tracing::info!(id, external_id = %v.external_id, "video deleted");
        }
        Ok(video)
    }
}
