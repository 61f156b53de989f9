//! Chapters supplied from the local filesystem.
//!
//! The expected layout is `root/<volume>/<chapter>/<page>.<ext>`, with an
//! optional cover per volume at `root/<volume>.<ext>`. Page files are
//! ordered by the integer in their file stem.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use image::DynamicImage;
use lazy_static::lazy_static;
use log::debug;
use memmap2::MmapOptions;
use rayon::prelude::*;
use regex::Regex;
use tokio::fs::read_dir;
use tokio::task::spawn_blocking;

use crate::error::{Error, Result};
use crate::identifier::Identifier;
use crate::list::ChapterList;
use crate::path_utils::is_hidden_file;
use crate::types::{
    ChapterInfo, ChapterSource, LOCAL_GROUP_NAME, MangaInfo, PageSource, PathTask, is_image_file,
};

lazy_static! {
    /// Page file stems are plain integers ("1", "007").
    static ref PAGE_STEM_REGEX: Regex = Regex::new(r"^\d+$").unwrap();
}

/// A directory of volumes and chapters on disk.
#[derive(Debug, Clone)]
pub struct LocalLibrary {
    root: PathBuf,
    language: String,
}

impl LocalLibrary {
    /// `language` is assigned to every chapter found, so local chapters pass
    /// the same language filter as catalog ones.
    pub fn new(root: impl Into<PathBuf>, language: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            language: language.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Metadata for a work read from disk: the directory name is the title.
    pub fn skeleton(&self) -> MangaInfo {
        let title = self
            .root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        MangaInfo {
            id: self.root.display().to_string(),
            title,
            ..Default::default()
        }
    }

    /// One chapter record per `<volume>/<chapter>` directory.
    pub async fn load_chapters(&self) -> Result<ChapterList> {
        if !self.root.is_dir() {
            return Err(Error::NotFound(format!(
                "Local directory {} does not exist",
                self.root.display()
            )));
        }

        let mut chapters = Vec::new();
        for volume_dir in list_entries(&self.root, true).await? {
            let volume = Identifier::parse(&file_name(&volume_dir));
            for chapter_dir in list_entries(&volume_dir, true).await? {
                let name = file_name(&chapter_dir);
                let published = tokio::fs::metadata(&chapter_dir)
                    .await
                    .and_then(|m| m.modified())
                    .map(DateTime::<Utc>::from)
                    .unwrap_or_default();

                chapters.push(ChapterInfo {
                    id: chapter_dir.display().to_string(),
                    title: name.clone(),
                    identifier: Identifier::parse(&name),
                    volume_identifier: volume.clone(),
                    language: self.language.clone(),
                    group_names: vec![LOCAL_GROUP_NAME.to_string()],
                    published,
                    views: 0,
                    source: ChapterSource::Local(chapter_dir),
                });
            }
        }

        debug!(
            "Found {} local chapters in {}",
            chapters.len(),
            self.root.display()
        );
        Ok(ChapterList::new(chapters))
    }

    /// Cover images stored next to the volume directories.
    pub async fn load_covers(&self) -> Result<Vec<PathTask>> {
        let covers = list_entries(&self.root, false)
            .await?
            .into_iter()
            .filter(|path| is_image_file(path))
            .filter_map(|path| {
                let stem = path.file_stem()?.to_string_lossy().into_owned();
                Some(PathTask::cover(
                    PageSource::Local(path),
                    Identifier::parse(&stem),
                ))
            })
            .collect();
        Ok(covers)
    }
}

/// Page tasks for a chapter directory. Files whose stem is not an integer
/// are ignored.
pub async fn page_tasks(chapter: &ChapterInfo, directory: &Path) -> Result<Vec<PathTask>> {
    let mut tasks: Vec<PathTask> = list_entries(directory, false)
        .await?
        .into_iter()
        .filter(|path| is_image_file(path))
        .filter_map(|path| {
            let stem = path.file_stem()?.to_string_lossy().into_owned();
            if !PAGE_STEM_REGEX.is_match(&stem) {
                return None;
            }
            let image_index = stem.parse().ok()?;
            Some(PathTask {
                source: PageSource::Local(path),
                image_index,
                chapter: chapter.identifier.clone(),
                volume: chapter.volume_identifier.clone(),
            })
        })
        .collect();
    tasks.par_sort_by_key(|task| task.image_index);
    Ok(tasks)
}

/// Decodes an image file through a memory map.
pub async fn read_image(path: PathBuf) -> Result<DynamicImage> {
    let file = tokio::fs::File::open(&path).await?;
    let file_std = file.into_std().await;

    spawn_blocking(move || -> Result<DynamicImage> {
        // The file is only read, and the map is dropped before returning.
        let mmap = unsafe { MmapOptions::new().map(&file_std) }?;
        image::load_from_memory(&mmap).map_err(|e| Error::Decode {
            origin: path.display().to_string(),
            reason: e.to_string(),
        })
    })
    .await?
}

/// Non-hidden entries of `directory`, directories only or files only,
/// sorted by name.
async fn list_entries(directory: &Path, only_dirs: bool) -> Result<Vec<PathBuf>> {
    let mut entries = Vec::new();
    let mut dir = read_dir(directory).await?;

    while let Some(entry) = dir.next_entry().await? {
        let path = entry.path();
        if is_hidden_file(&path) {
            continue;
        }
        if entry.file_type().await?.is_dir() == only_dirs {
            entries.push(path);
        }
    }

    entries.par_sort();
    Ok(entries)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
