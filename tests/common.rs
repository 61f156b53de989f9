//! Common test utilities for the tankobon crate.
//!
//! Provides temporary directories, image helpers, and in-memory
//! implementations of the catalog and image source traits.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use rand::{Rng, distributions::Alphanumeric};
use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tankobon::catalog::{Catalog, ImageSource};
use tankobon::error::{Error, Result};
use tankobon::identifier::Identifier;
use tankobon::types::{AtHomeServer, ChapterInfo, ChapterSource, CoverRef, FeedEntry, FeedPage, MangaInfo};
use tokio::fs;

#[allow(dead_code)]
pub const TEST_TMP_DIR: &str = "tests/tmp";
#[allow(dead_code)]
pub const TEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Creates a fresh, uniquely named directory under [`TEST_TMP_DIR`].
#[allow(dead_code)]
pub async fn setup_test_dir(sub_path: &str) -> PathBuf {
    let rand_string: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect();
    let test_dir = PathBuf::from(TEST_TMP_DIR).join(format!("{}-{}", sub_path, rand_string));
    if test_dir.exists() {
        fs::remove_dir_all(&test_dir).await.unwrap();
    }
    fs::create_dir_all(&test_dir).await.unwrap();
    test_dir
}

/// A white image with an optional black rectangle `(x, y, w, h)`.
#[allow(dead_code)]
pub fn page_image(width: u32, height: u32, dark: Option<(u32, u32, u32, u32)>) -> DynamicImage {
    let mut img = RgbImage::from_pixel(width, height, Rgb([255, 255, 255]));
    if let Some((x, y, w, h)) = dark {
        for px in x..x + w {
            for py in y..y + h {
                img.put_pixel(px, py, Rgb([0, 0, 0]));
            }
        }
    }
    DynamicImage::ImageRgb8(img)
}

#[allow(dead_code)]
pub fn png_bytes(image: &DynamicImage) -> Vec<u8> {
    let mut bytes = Cursor::new(Vec::new());
    image.write_to(&mut bytes, ImageFormat::Png).unwrap();
    bytes.into_inner()
}

/// Writes a small PNG page to `path`, creating parent directories.
#[allow(dead_code)]
pub async fn create_page_file(path: &Path, width: u32, height: u32) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    fs::write(path, png_bytes(&page_image(width, height, None))).await?;
    Ok(())
}

#[allow(dead_code)]
pub fn day(n: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, n, 12, 0, 0).unwrap()
}

/// A feed entry with one group.
#[allow(dead_code)]
pub fn feed_entry(id: &str, chapter: &str, volume: &str, group: &str, published: u32) -> FeedEntry {
    FeedEntry {
        id: id.to_string(),
        title: format!("Title {}", id),
        chapter: Some(chapter.to_string()).filter(|c| !c.is_empty()),
        volume: Some(volume.to_string()).filter(|v| !v.is_empty()),
        language: "en".to_string(),
        group_ids: vec![group.to_string()],
        published: day(published),
        views: 0,
    }
}

/// A normalized catalog chapter.
#[allow(dead_code)]
pub fn chapter(id: &str, chapter: Identifier, volume: Identifier, group: &str) -> ChapterInfo {
    ChapterInfo {
        id: id.to_string(),
        title: format!("Title {}", id),
        identifier: chapter,
        volume_identifier: volume,
        language: "en".to_string(),
        group_names: vec![group.to_string()],
        published: day(1),
        views: 0,
        source: ChapterSource::Catalog,
    }
}

/// An in-memory catalog.
///
/// Every chapter is served by `https://node.test` with `pages_per_chapter`
/// pages named `<n>.png` (data-saver `<n>s.png`). Chapter ids listed in
/// `failing_chapters` fail their page-location lookup, ids in
/// `garbage_chapters` get page files the image source answers with bytes
/// that do not decode.
#[allow(dead_code)]
#[derive(Default)]
pub struct MockCatalog {
    pub info: MangaInfo,
    pub feed: Vec<FeedEntry>,
    pub groups: HashMap<String, String>,
    pub covers: Vec<CoverRef>,
    pub pages_per_chapter: usize,
    pub failing_chapters: HashSet<String>,
    pub garbage_chapters: HashSet<String>,
    pub feed_calls: AtomicUsize,
    pub group_batches: Mutex<Vec<usize>>,
    pub location_calls: AtomicUsize,
}

#[allow(dead_code)]
impl MockCatalog {
    pub fn new(title: &str, feed: Vec<FeedEntry>) -> Self {
        let groups = feed
            .iter()
            .flat_map(|e| e.group_ids.iter())
            .map(|id| (id.clone(), id.to_uppercase()))
            .collect();
        Self {
            info: MangaInfo {
                id: "manga".to_string(),
                title: title.to_string(),
                authors: vec!["Author".to_string()],
                artists: vec!["Artist".to_string()],
                description: Some("A story".to_string()),
            },
            feed,
            groups,
            pages_per_chapter: 2,
            ..Default::default()
        }
    }
}

#[async_trait]
impl Catalog for MockCatalog {
    async fn fetch_skeleton(&self, manga_id: &str) -> Result<MangaInfo> {
        if manga_id != self.info.id {
            return Err(Error::NotFound(manga_id.to_string()));
        }
        Ok(self.info.clone())
    }

    async fn fetch_feed_page(&self, _manga_id: &str, offset: usize, limit: usize) -> Result<FeedPage> {
        self.feed_calls.fetch_add(1, Ordering::SeqCst);
        Ok(FeedPage {
            entries: self.feed.iter().skip(offset).take(limit).cloned().collect(),
            total: self.feed.len(),
        })
    }

    async fn fetch_group_names(&self, group_ids: &[String]) -> Result<HashMap<String, String>> {
        self.group_batches.lock().unwrap().push(group_ids.len());
        Ok(group_ids
            .iter()
            .filter_map(|id| self.groups.get(id).map(|name| (id.clone(), name.clone())))
            .collect())
    }

    async fn fetch_cover_list(&self, _manga_id: &str) -> Result<Vec<CoverRef>> {
        Ok(self.covers.clone())
    }

    async fn fetch_at_home_server(&self, chapter_id: &str) -> Result<AtHomeServer> {
        self.location_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_chapters.contains(chapter_id) {
            return Err(Error::Fetch {
                url: format!("at-home/{}", chapter_id),
                reason: "status 500".to_string(),
            });
        }
        let prefix = if self.garbage_chapters.contains(chapter_id) {
            "garbage-"
        } else {
            ""
        };
        Ok(AtHomeServer {
            base_url: "https://node.test/".to_string(),
            hash: chapter_id.to_string(),
            data: (1..=self.pages_per_chapter)
                .map(|n| format!("{}{}.png", prefix, n))
                .collect(),
            data_saver: (1..=self.pages_per_chapter)
                .map(|n| format!("{}s.png", n))
                .collect(),
        })
    }
}

/// Serves a PNG page for every URL. URLs containing `garbage` get bytes
/// that do not decode, URLs containing `fail` get a fetch error.
#[allow(dead_code)]
pub struct MockImageSource {
    pub page: Vec<u8>,
    pub delay: Duration,
    pub fetched: Mutex<Vec<String>>,
}

#[allow(dead_code)]
impl MockImageSource {
    pub fn new() -> Self {
        Self::with_page(&page_image(60, 80, Some((10, 10, 40, 60))))
    }

    pub fn with_page(page: &DynamicImage) -> Self {
        Self {
            page: png_bytes(page),
            delay: Duration::ZERO,
            fetched: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImageSource for MockImageSource {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        self.fetched.lock().unwrap().push(url.to_string());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if url.contains("fail") {
            return Err(Error::Fetch {
                url: url.to_string(),
                reason: "status 404".to_string(),
            });
        }
        if url.contains("garbage") {
            return Ok(b"definitely not an image".to_vec());
        }
        Ok(self.page.clone())
    }
}

/// Names of the entries in a ZIP archive, in archive order.
#[allow(dead_code)]
pub fn zip_entry_names(path: &Path) -> Vec<String> {
    let file = std::fs::File::open(path).unwrap();
    let mut archive = zip::ZipArchive::new(file).unwrap();
    (0..archive.len())
        .map(|i| archive.by_index(i).unwrap().name().to_string())
        .collect()
}

/// Reads one entry of a ZIP archive as text.
#[allow(dead_code)]
pub fn zip_entry_text(path: &Path, name: &str) -> String {
    let file = std::fs::File::open(path).unwrap();
    let mut archive = zip::ZipArchive::new(file).unwrap();
    let mut entry = archive.by_name(name).unwrap();
    let mut content = String::new();
    std::io::Read::read_to_string(&mut entry, &mut content).unwrap();
    content
}
