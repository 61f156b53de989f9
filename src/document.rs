//! The in-memory document tree: manga, volumes, chapters and pages.
//!
//! Trees are rebuilt rather than patched. Each `with_*` operation consumes a
//! tree and returns the next one, so a volume's cover survives re-deriving
//! the chapter structure and out-of-order page completions are routed by
//! identifier instead of by arrival.

use std::collections::BTreeMap;

use image::DynamicImage;
use log::debug;

use crate::identifier::Identifier;
use crate::list::ChapterList;
use crate::types::{ChapterInfo, ImageTask, MangaInfo};

#[derive(Debug, Clone, Default)]
pub struct Manga {
    pub info: MangaInfo,
    pub volumes: BTreeMap<Identifier, Volume>,
}

#[derive(Debug, Clone)]
pub struct Volume {
    pub identifier: Identifier,
    pub cover: Option<DynamicImage>,
    pub chapters: BTreeMap<Identifier, Chapter>,
}

#[derive(Debug, Clone)]
pub struct Chapter {
    pub info: ChapterInfo,
    /// Pages by index; indices need not be contiguous.
    pub pages: BTreeMap<usize, DynamicImage>,
}

impl Manga {
    /// A document with metadata and no volumes.
    pub fn skeleton(info: MangaInfo) -> Self {
        Self {
            info,
            volumes: BTreeMap::new(),
        }
    }

    /// Rebuilds the volume and chapter maps from `chapters`.
    ///
    /// Covers of volumes that still exist are carried over. When several
    /// submissions share a (volume, chapter) pair the first one wins.
    pub fn with_chapters(mut self, chapters: &ChapterList) -> Self {
        let mut volumes: BTreeMap<Identifier, Volume> = BTreeMap::new();
        for info in chapters {
            let volume = volumes
                .entry(info.volume_identifier.clone())
                .or_insert_with(|| Volume {
                    identifier: info.volume_identifier.clone(),
                    cover: self
                        .volumes
                        .get_mut(&info.volume_identifier)
                        .and_then(|previous| previous.cover.take()),
                    chapters: BTreeMap::new(),
                });
            volume
                .chapters
                .entry(info.identifier.clone())
                .or_insert_with(|| Chapter::new(info.clone()));
        }

        Self {
            info: self.info,
            volumes,
        }
    }

    /// Stores every image whose (volume, chapter) pair exists in the tree at
    /// its page index, replacing any pages from an earlier call. Images for
    /// chapters that are not in the tree are dropped.
    pub fn with_pages(mut self, pages: Vec<ImageTask>) -> Self {
        for chapter in self.volumes.values_mut().flat_map(|v| v.chapters.values_mut()) {
            chapter.pages.clear();
        }

        let mut dropped = 0;
        for task in pages {
            match self
                .volumes
                .get_mut(&task.volume)
                .and_then(|v| v.chapters.get_mut(&task.chapter))
            {
                Some(chapter) => {
                    chapter.pages.insert(task.image_index, task.image);
                }
                None => dropped += 1,
            }
        }
        if dropped > 0 {
            debug!("Dropped {} pages of chapters outside the document", dropped);
        }
        self
    }

    /// Clears every cover, then assigns each image to its volume. Volumes
    /// without a matching image end up without a cover.
    pub fn with_covers(mut self, covers: Vec<ImageTask>) -> Self {
        for volume in self.volumes.values_mut() {
            volume.cover = None;
        }
        for task in covers {
            if let Some(volume) = self.volumes.get_mut(&task.volume) {
                volume.cover = Some(task.image);
            }
        }
        self
    }

    /// Every chapter submission in the tree, in volume then chapter order.
    pub fn chapters(&self) -> ChapterList {
        self.volumes
            .values()
            .flat_map(|v| v.chapters.values())
            .map(|c| c.info.clone())
            .collect()
    }

    /// Volume identifiers in order.
    pub fn keys(&self) -> Vec<Identifier> {
        self.volumes.keys().cloned().collect()
    }

    /// A copy of the document holding only the volume `id`.
    pub fn volume_subset(&self, id: &Identifier) -> Option<Manga> {
        let volume = self.volumes.get(id)?;
        Some(Manga {
            info: self.info.clone(),
            volumes: BTreeMap::from([(id.clone(), volume.clone())]),
        })
    }

    pub fn page_count(&self) -> usize {
        self.volumes.values().map(Volume::page_count).sum()
    }
}

impl Volume {
    pub fn page_count(&self) -> usize {
        self.chapters.values().map(|c| c.pages.len()).sum()
    }
}

impl Chapter {
    pub fn new(info: ChapterInfo) -> Self {
        Self {
            info,
            pages: BTreeMap::new(),
        }
    }

    /// Pages in index order.
    pub fn sorted_pages(&self) -> impl Iterator<Item = &DynamicImage> {
        self.pages.values()
    }

    /// Replaces the pages with `pages`, renumbered from zero.
    pub fn set_pages(&mut self, pages: Vec<DynamicImage>) {
        self.pages = pages.into_iter().enumerate().collect();
    }
}
