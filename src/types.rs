//! Core data types, policies, and reports for the tankobon library.
//!
//! This module defines the records exchanged between the catalog, the
//! acquisition pipeline and the document model:
//! - Catalog records (`MangaInfo`, `FeedEntry`, `FeedPage`, `CoverRef`, `AtHomeServer`)
//! - Normalized chapter submissions (`ChapterInfo`, `ChapterSource`)
//! - Pipeline work items (`PathTask`, `ImageTask`, `PageSource`)
//! - Policy enumerations (`RankingPolicy`, `DataSaverPolicy`, `AutocropMode`, `AutosplitPolicy`, `Direction`)
//! - Run reporting (`DownloadReport`, `VolumeOutcome`)

use chrono::{DateTime, Utc};
use image::DynamicImage;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::Error;
use crate::identifier::Identifier;

/// Group name given to chapters loaded from the local filesystem.
pub const LOCAL_GROUP_NAME: &str = "Filesystem";

/// Image file extensions accepted for local pages and covers.
pub const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "gif", "webp"];

/// Metadata describing a whole work.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MangaInfo {
    pub id: String,
    pub title: String,
    pub authors: Vec<String>,
    pub artists: Vec<String>,
    pub description: Option<String>,
}

/// Where the pages of a chapter come from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ChapterSource {
    /// Pages are resolved through the catalog's at-home servers.
    #[default]
    Catalog,
    /// Pages are image files inside this directory.
    Local(PathBuf),
}

/// One contributor's submission of one chapter.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChapterInfo {
    pub id: String,
    pub title: String,
    pub identifier: Identifier,
    pub volume_identifier: Identifier,
    pub language: String,
    pub group_names: Vec<String>,
    pub published: DateTime<Utc>,
    pub views: u64,
    pub source: ChapterSource,
}

impl ChapterInfo {
    /// The contributing groups as one string, the key for per-group rankings
    /// and the subject of the group-name filter.
    pub fn group_key(&self) -> String {
        self.group_names.join(", ")
    }

    pub fn is_local(&self) -> bool {
        matches!(self.source, ChapterSource::Local(_))
    }
}

/// A raw chapter entry from one page of the catalog feed.
///
/// Group references are still ids here; [`crate::pipeline::fetch_chapters`]
/// resolves them to names.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FeedEntry {
    pub id: String,
    pub title: String,
    pub chapter: Option<String>,
    pub volume: Option<String>,
    pub language: String,
    pub group_ids: Vec<String>,
    pub published: DateTime<Utc>,
    pub views: u64,
}

impl FeedEntry {
    /// Normalizes the entry, looking group ids up in `group_names`.
    ///
    /// A missing chapter number falls back to the title, a missing volume
    /// number to unknown. Unresolved group ids are dropped.
    pub fn into_chapter(
        self,
        group_names: &std::collections::HashMap<String, String>,
    ) -> ChapterInfo {
        let identifier =
            Identifier::with_fallback(self.chapter.as_deref().unwrap_or_default(), &self.title);
        let volume_identifier =
            Identifier::with_fallback(self.volume.as_deref().unwrap_or_default(), "");
        let group_names = self
            .group_ids
            .iter()
            .filter_map(|id| group_names.get(id).cloned())
            .collect();

        ChapterInfo {
            id: self.id,
            title: self.title,
            identifier,
            volume_identifier,
            language: self.language,
            group_names,
            published: self.published,
            views: self.views,
            source: ChapterSource::Catalog,
        }
    }
}

/// One page of the chapter feed plus the feed's reported total size.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FeedPage {
    pub entries: Vec<FeedEntry>,
    pub total: usize,
}

/// A downloadable cover for one volume.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CoverRef {
    pub volume: Identifier,
    pub url: String,
}

/// Page file locations for one chapter as served by an at-home node.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AtHomeServer {
    pub base_url: String,
    pub hash: String,
    pub data: Vec<String>,
    pub data_saver: Vec<String>,
}

/// The location of one image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageSource {
    Remote {
        url: String,
        data_saver_url: Option<String>,
    },
    Local(PathBuf),
}

impl fmt::Display for PageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageSource::Remote { url, .. } => f.write_str(url),
            PageSource::Local(path) => write!(f, "{}", path.display()),
        }
    }
}

/// A fetchable image tagged with where it belongs in the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTask {
    pub source: PageSource,
    pub image_index: usize,
    pub chapter: Identifier,
    pub volume: Identifier,
}

impl PathTask {
    /// A cover location; covers carry an unknown chapter and index zero.
    pub fn cover(source: PageSource, volume: Identifier) -> Self {
        Self {
            source,
            image_index: 0,
            chapter: Identifier::Unknown,
            volume,
        }
    }

    pub fn with_image(self, image: DynamicImage) -> ImageTask {
        ImageTask {
            image,
            image_index: self.image_index,
            chapter: self.chapter,
            volume: self.volume,
        }
    }
}

/// A decoded image routed by the same triple as its [`PathTask`].
#[derive(Debug, Clone)]
pub struct ImageTask {
    pub image: DynamicImage,
    pub image_index: usize,
    pub chapter: Identifier,
    pub volume: Identifier,
}

/// Ordering used to pick one submission per chapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RankingPolicy {
    /// Most recently published submission first.
    Newest,
    /// Submissions of the longest-standing group first.
    #[default]
    NewestGroup,
    /// Most viewed submission first.
    Views,
    /// Submissions of the group with the most total views first.
    ViewsGroup,
    /// Submissions of the group with the most chapters first.
    Most,
}

impl FromStr for RankingPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "newest" => Ok(RankingPolicy::Newest),
            "newest-group" => Ok(RankingPolicy::NewestGroup),
            "views" => Ok(RankingPolicy::Views),
            "views-group" => Ok(RankingPolicy::ViewsGroup),
            "most" => Ok(RankingPolicy::Most),
            other => Err(Error::invalid_policy("ranking", other)),
        }
    }
}

impl fmt::Display for RankingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RankingPolicy::Newest => "newest",
            RankingPolicy::NewestGroup => "newest-group",
            RankingPolicy::Views => "views",
            RankingPolicy::ViewsGroup => "views-group",
            RankingPolicy::Most => "most",
        })
    }
}

/// Which of the two at-home URLs an image is fetched from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DataSaverPolicy {
    /// Always the full-quality URL.
    #[default]
    Direct,
    /// Always the data-saver URL.
    Prefer,
    /// Full quality, retrying once with the data-saver URL on a decode failure.
    Fallback,
}

impl FromStr for DataSaverPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "no" => Ok(DataSaverPolicy::Direct),
            "prefer" => Ok(DataSaverPolicy::Prefer),
            "fallback" => Ok(DataSaverPolicy::Fallback),
            other => Err(Error::invalid_policy("data-saver", other)),
        }
    }
}

impl fmt::Display for DataSaverPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DataSaverPolicy::Direct => "no",
            DataSaverPolicy::Prefer => "prefer",
            DataSaverPolicy::Fallback => "fallback",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AutocropMode {
    #[default]
    Off,
    /// Crop to the detected content bounds.
    Full,
    /// Crop to the content bounds, never insetting an edge by more than
    /// a tenth of the average page dimension.
    Limited,
}

impl FromStr for AutocropMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "off" => Ok(AutocropMode::Off),
            "full" => Ok(AutocropMode::Full),
            "limited" => Ok(AutocropMode::Limited),
            other => Err(Error::invalid_policy("autocrop", other)),
        }
    }
}

impl fmt::Display for AutocropMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AutocropMode::Off => "off",
            AutocropMode::Full => "full",
            AutocropMode::Limited => "limited",
        })
    }
}

/// What to emit for a wide (two-page spread) page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AutosplitPolicy {
    #[default]
    Preserve,
    Split,
    PreserveThenSplit,
    SplitThenPreserve,
}

impl FromStr for AutosplitPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "preserve" => Ok(AutosplitPolicy::Preserve),
            "split" => Ok(AutosplitPolicy::Split),
            "preserve-split" => Ok(AutosplitPolicy::PreserveThenSplit),
            "split-preserve" => Ok(AutosplitPolicy::SplitThenPreserve),
            other => Err(Error::invalid_policy("autosplit", other)),
        }
    }
}

impl fmt::Display for AutosplitPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AutosplitPolicy::Preserve => "preserve",
            AutosplitPolicy::Split => "split",
            AutosplitPolicy::PreserveThenSplit => "preserve-split",
            AutosplitPolicy::SplitThenPreserve => "split-preserve",
        })
    }
}

/// Reading direction of the work.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Direction {
    #[default]
    Ltr,
    Rtl,
}

impl FromStr for Direction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "ltr" => Ok(Direction::Ltr),
            "rtl" => Ok(Direction::Rtl),
            other => Err(Error::invalid_policy("direction", other)),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::Ltr => "ltr",
            Direction::Rtl => "rtl",
        })
    }
}

/// What happened to one volume during a download run.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum VolumeOutcome {
    Written(PathBuf),
    /// The output file already existed and overwriting was not forced.
    Skipped(PathBuf),
    /// The volume failed and its partial output was removed.
    Failed(String),
}

/// Summary of a download run, one entry per volume in identifier order.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DownloadReport {
    pub volumes: Vec<(Identifier, VolumeOutcome)>,
    /// Numeric gaps in the downloaded chapter sequence.
    pub discontinuities: Vec<(Identifier, Identifier)>,
}

impl DownloadReport {
    pub fn written(&self) -> usize {
        self.count(|outcome| matches!(outcome, VolumeOutcome::Written(_)))
    }

    pub fn skipped(&self) -> usize {
        self.count(|outcome| matches!(outcome, VolumeOutcome::Skipped(_)))
    }

    pub fn failed(&self) -> usize {
        self.count(|outcome| matches!(outcome, VolumeOutcome::Failed(_)))
    }

    fn count(&self, predicate: impl Fn(&VolumeOutcome) -> bool) -> usize {
        self.volumes.iter().filter(|(_, outcome)| predicate(outcome)).count()
    }
}

/// Whether `path` has one of the [`IMAGE_EXTENSIONS`], ignoring case.
pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}
