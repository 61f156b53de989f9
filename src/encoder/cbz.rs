use std::collections::BTreeSet;
use std::io::{Cursor, Write};

use async_trait::async_trait;
use image::DynamicImage;
use lazy_static::lazy_static;
use rayon::prelude::*;
use regex::{Captures, Regex};
use tokio::task::spawn_blocking;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::document::Manga;
use crate::encoder::{Encoder, encode_jpeg};
use crate::error::Result;
use crate::identifier::Identifier;
use crate::path_utils::sanitize_filename;
use crate::types::Direction;

const COMIC_INFO_TEMPLATE: &str = include_str!("../../templates/ComicInfo.xml");

lazy_static! {
    static ref PLACEHOLDER_REGEX: Regex = Regex::new(r"%([a-z]+)%").unwrap();
}

/// Packs a document into a CBZ (Comic Book ZIP) archive.
///
/// The archive holds `000_cover.jpg` when the volume has a cover, the pages
/// as `page_NNNN.jpg` in volume, chapter and page order, and a
/// `ComicInfo.xml` describing the volume.
#[derive(Debug, Clone)]
pub struct CbzEncoder {
    direction: Direction,
    quality: u8,
}

impl CbzEncoder {
    pub fn new(direction: Direction) -> Self {
        Self {
            direction,
            quality: 90,
        }
    }

    /// JPEG quality for re-encoded pages, clamped to 1..=100.
    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality.clamp(1, 100);
        self
    }

    fn comic_info(&self, manga: &Manga, page_count: usize) -> String {
        let escape_xml = |text: &str| -> String {
            text.replace('&', "&amp;")
                .replace('<', "&lt;")
                .replace('>', "&gt;")
                .replace('"', "&quot;")
                .replace('\'', "&apos;")
        };

        let chapters = manga.chapters();
        let volume = manga.keys().into_iter().next().unwrap_or(Identifier::Unknown);
        let groups: BTreeSet<&str> = chapters
            .iter()
            .flat_map(|c| c.group_names.iter().map(String::as_str))
            .collect();
        let language = chapters
            .first()
            .map(|c| c.language.clone())
            .unwrap_or_default();
        let notes = chapters
            .iter()
            .map(|c| format!("{}: {}", c.identifier, c.title))
            .collect::<Vec<_>>()
            .join("\n");
        let number = match &volume {
            Identifier::Numeric { major, .. } => major.to_string(),
            _ => String::new(),
        };

        let title = format!("{} {}", manga.info.title, volume);
        let groups = groups.into_iter().collect::<Vec<_>>().join(", ");
        let page_count = page_count.to_string();
        let direction = match self.direction {
            Direction::Rtl => "YesAndRightToLeft",
            Direction::Ltr => "Yes",
        };

        // One pass over the template, so placeholder-like text inside the
        // substituted values is left alone.
        PLACEHOLDER_REGEX
            .replace_all(COMIC_INFO_TEMPLATE, |caps: &Captures| match &caps[1] {
                "title" => escape_xml(&title),
                "series" => escape_xml(&manga.info.title),
                "number" | "volume" => number.clone(),
                "summary" => escape_xml(manga.info.description.as_deref().unwrap_or("")),
                "notes" => escape_xml(&notes),
                "writer" => escape_xml(&manga.info.authors.join(", ")),
                "penciller" => escape_xml(&manga.info.artists.join(", ")),
                "translator" => escape_xml(&groups),
                "pagecount" => page_count.clone(),
                "language" => escape_xml(&language),
                "manga" => direction.to_string(),
                _ => caps[0].to_string(),
            })
            .into_owned()
    }
}

impl Default for CbzEncoder {
    fn default() -> Self {
        Self::new(Direction::default())
    }
}

#[async_trait]
impl Encoder for CbzEncoder {
    fn extension(&self) -> &'static str {
        "cbz"
    }

    async fn encode(&self, manga: Manga) -> Result<Vec<u8>> {
        let encoder = self.clone();
        spawn_blocking(move || -> Result<Vec<u8>> {
            let options = SimpleFileOptions::default()
                .compression_method(CompressionMethod::Deflated)
                .unix_permissions(0o644);

            let pages: Vec<&DynamicImage> = manga
                .volumes
                .values()
                .flat_map(|v| v.chapters.values())
                .flat_map(|c| c.sorted_pages())
                .collect();
            let encoded: Vec<Vec<u8>> = pages
                .par_iter()
                .map(|page| encode_jpeg(page, encoder.quality))
                .collect::<Result<_>>()?;

            let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
            if let Some(cover) = manga.volumes.values().find_map(|v| v.cover.as_ref()) {
                zip.start_file("000_cover.jpg", options)?;
                zip.write_all(&encode_jpeg(cover, encoder.quality)?)?;
            }
            for (index, bytes) in encoded.iter().enumerate() {
                zip.start_file(format!("page_{:04}.jpg", index + 1), options)?;
                zip.write_all(bytes)?;
            }

            zip.start_file("ComicInfo.xml", options)?;
            zip.write_all(encoder.comic_info(&manga, encoded.len()).as_bytes())?;

            Ok(zip.finish()?.into_inner())
        })
        .await?
    }

    fn thumbnail_filename(&self, manga: &Manga) -> String {
        let volume = manga.keys().into_iter().next().unwrap_or(Identifier::Unknown);
        sanitize_filename(&format!(
            "{} - {}.jpg",
            manga.info.title,
            volume.string_filled(4, 2, false)
        ))
    }
}
