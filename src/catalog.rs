//! Interfaces to the remote catalog and to image hosts.
//!
//! The catalog's wire protocol lives outside this crate. Implementors hand
//! back typed records; the acquisition pipeline drives them.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{
    AtHomeServer, ChapterInfo, CoverRef, FeedPage, MangaInfo, PageSource, PathTask,
};

/// Typed access to a manga catalog.
///
/// Implementations apply their own retry policy. Page-location lookups are
/// rate limited by the caller.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Metadata for the manga; [`crate::error::Error::NotFound`] when unknown.
    async fn fetch_skeleton(&self, manga_id: &str) -> Result<MangaInfo>;

    /// One page of the chapter feed starting at `offset`.
    async fn fetch_feed_page(&self, manga_id: &str, offset: usize, limit: usize)
    -> Result<FeedPage>;

    /// Names for the given group ids. Unknown ids may be left out.
    async fn fetch_group_names(&self, group_ids: &[String]) -> Result<HashMap<String, String>>;

    async fn fetch_cover_list(&self, manga_id: &str) -> Result<Vec<CoverRef>>;

    /// The at-home node serving a chapter's page files.
    async fn fetch_at_home_server(&self, chapter_id: &str) -> Result<AtHomeServer>;

    /// Locations of every page of `chapter`, one task per page.
    ///
    /// The default joins the at-home base URL, chapter hash and file names
    /// into full-quality (`/data/`) and data-saver (`/data-saver/`) URLs.
    async fn fetch_page_locations(&self, chapter: &ChapterInfo) -> Result<Vec<PathTask>> {
        let server = self.fetch_at_home_server(&chapter.id).await?;
        Ok(page_locations(&server, chapter))
    }
}

/// Byte-level access to image hosts.
#[async_trait]
pub trait ImageSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// Builds the page tasks for `chapter` from an at-home server answer.
pub fn page_locations(server: &AtHomeServer, chapter: &ChapterInfo) -> Vec<PathTask> {
    let base = server.base_url.trim_end_matches('/');
    server
        .data
        .iter()
        .enumerate()
        .map(|(index, file)| PathTask {
            source: PageSource::Remote {
                url: format!("{}/data/{}/{}", base, server.hash, file),
                data_saver_url: server
                    .data_saver
                    .get(index)
                    .map(|file| format!("{}/data-saver/{}/{}", base, server.hash, file)),
            },
            image_index: index,
            chapter: chapter.identifier.clone(),
            volume: chapter.volume_identifier.clone(),
        })
        .collect()
}
