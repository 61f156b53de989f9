use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::task::spawn_blocking;

use crate::catalog::{Catalog, ImageSource};
use crate::document::Manga;
use crate::encoder::{Encoder, encode_jpeg};
use crate::error::{Error, Result};
use crate::filter::{ChapterFilter, normalize_language_tag, select};
use crate::geometry::{self, GeometryOptions};
use crate::identifier::Identifier;
use crate::list::ChapterList;
use crate::local::LocalLibrary;
use crate::path_utils::{ensure_directory, remove_partial, volume_file_path};
use crate::pipeline::{self, Pipeline, PipelineConfig, RateLimiter};
use crate::types::{
    AutocropMode, AutosplitPolicy, DataSaverPolicy, Direction, DownloadReport, PageSource,
    PathTask, RankingPolicy, VolumeOutcome,
};

/// Everything a download run needs to know, built with the builder pattern.
///
/// A configuration selects which chapters are kept ([`resolve`]), how their
/// pages are fetched and transformed, and where the encoded volumes go
/// ([`download`]).
///
/// ```rust,no_run
/// # use tankobon::prelude::*;
/// # fn main() -> tankobon::error::Result<()> {
/// let config = TankobonConfig::builder()
///     .language("en")
///     .chapter_ranges("1..20")
///     .ranking(RankingPolicy::Views)
///     .output_directory("./out")
///     .autocrop(AutocropMode::Limited)
///     .build()?;
/// # Ok(())
/// # }
/// ```
///
/// [`resolve`]: TankobonConfig::resolve
/// [`download`]: TankobonConfig::download
#[derive(Debug, Clone, derive_builder::Builder)]
#[builder(setter(into, strip_option), build_fn(validate = "Self::validate"))]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct TankobonConfig {
    // --- Chapter selection ---
    /// Keep only chapters in this language tag, e.g. `"en"` or `"pt-br"`.
    #[builder(default)]
    pub language: Option<String>,

    /// Regular expression over the joined group names; a leading `!` negates it.
    #[builder(default)]
    pub group_pattern: Option<String>,

    /// Volume ranges to keep, e.g. `"1..3,5"` or `"!4"`.
    #[builder(default)]
    pub volume_ranges: Option<String>,

    /// Chapter ranges to keep, e.g. `"1..20"`.
    #[builder(default)]
    pub chapter_ranges: Option<String>,

    /// Which submission wins when several groups released the same chapter.
    #[builder(default)]
    pub ranking: RankingPolicy,

    /// Extra chapters read from disk, preferred over catalog submissions.
    #[builder(default)]
    pub local_directory: Option<PathBuf>,

    // --- Output ---
    #[builder(default = "PathBuf::from(\".\")")]
    pub output_directory: PathBuf,

    /// Where to write a cover thumbnail for each volume, if anywhere.
    #[builder(default)]
    pub thumbnail_directory: Option<PathBuf>,

    /// Overwrite volumes whose output file already exists.
    #[builder(default)]
    pub force: bool,

    /// Zero-padding of the volume number in output file names.
    #[builder(default = "4")]
    pub volume_number_width: usize,

    /// Zero-padding of the minor volume number in output file names.
    #[builder(default = "2")]
    pub volume_minor_width: usize,

    // --- Pages ---
    #[builder(default)]
    pub data_saver: DataSaverPolicy,

    #[builder(default)]
    pub autocrop: AutocropMode,

    #[builder(default)]
    pub autosplit: AutosplitPolicy,

    /// Store the preserved copy of a wide page rotated by 90 degrees.
    #[builder(default)]
    pub rotate_wide_pages: bool,

    #[builder(default)]
    pub direction: Direction,

    // --- Concurrency ---
    /// Chapters resolved to page locations at once.
    #[builder(default = "8")]
    pub chapter_jobs: usize,

    /// Images fetched at once.
    #[builder(default = "16")]
    pub image_jobs: usize,

    /// Page-location lookups allowed per `page_location_period`.
    #[builder(default = "40")]
    pub page_location_rate: u32,

    #[builder(default = "Duration::from_secs(60)")]
    pub page_location_period: Duration,
}

impl TankobonConfig {
    pub fn builder() -> TankobonConfigBuilder {
        TankobonConfigBuilder::default()
    }

    /// The chapter filters this configuration enables.
    pub fn filters(&self) -> Result<Vec<ChapterFilter>> {
        let mut filters = Vec::new();
        if let Some(language) = &self.language {
            filters.push(ChapterFilter::language(language.as_str()));
        }
        if let Some(pattern) = &self.group_pattern {
            filters.push(ChapterFilter::group_name(pattern)?);
        }
        if let Some(ranges) = &self.volume_ranges {
            filters.push(ChapterFilter::volumes(ranges));
        }
        if let Some(ranges) = &self.chapter_ranges {
            filters.push(ChapterFilter::chapters(ranges));
        }
        Ok(filters)
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            chapter_jobs: self.chapter_jobs,
            image_jobs: self.image_jobs,
            data_saver: self.data_saver,
            limiter: Arc::new(RateLimiter::new(
                self.page_location_rate,
                self.page_location_period,
            )),
        }
    }

    pub fn geometry_options(&self) -> GeometryOptions {
        GeometryOptions {
            autocrop: self.autocrop,
            autosplit: self.autosplit,
            rotate_wide_pages: self.rotate_wide_pages,
            direction: self.direction,
        }
    }

    /// A pipeline over `catalog` and `images` tuned by this configuration.
    pub fn pipeline(&self, catalog: Arc<dyn Catalog>, images: Arc<dyn ImageSource>) -> Pipeline {
        Pipeline::new(catalog, images, self.pipeline_config())
    }

    fn local_library(&self) -> Option<LocalLibrary> {
        self.local_directory.as_ref().map(|root| {
            let language = self.language.as_deref().map(normalize_language_tag);
            LocalLibrary::new(root.clone(), language.unwrap_or_default())
        })
    }

    /// Fetches the manga's metadata and chapter feed, merges local chapters,
    /// and selects one submission per chapter.
    ///
    /// The returned document has volumes and chapters but no images. Fails
    /// with [`Error::EmptyResult`] when no chapter survives the filters.
    pub async fn resolve(&self, catalog: &dyn Catalog, manga_id: &str) -> Result<Manga> {
        let filters = self.filters()?;
        let info = catalog.fetch_skeleton(manga_id).await?;
        let mut chapters = pipeline::fetch_chapters(catalog, manga_id).await?;
        debug!("Catalog lists {} chapters for '{}'", chapters.len(), info.title);

        if let Some(library) = self.local_library() {
            let local = library.load_chapters().await?;
            chapters = chapters.into_iter().chain(local).collect::<ChapterList>();
        }

        let selected = select(chapters, &filters, self.ranking)?;
        Ok(Manga::skeleton(info).with_chapters(&selected))
    }

    /// Downloads, processes and encodes every selected volume.
    ///
    /// Volumes are handled one at a time in identifier order. A volume whose
    /// output already exists is skipped unless `force` is set. A failing
    /// volume has its partial output removed and the run moves on; errors
    /// for which [`Error::aborts_run`] holds stop the whole run.
    pub async fn download(
        &self,
        catalog: Arc<dyn Catalog>,
        images: Arc<dyn ImageSource>,
        encoder: &dyn Encoder,
        manga_id: &str,
    ) -> Result<DownloadReport> {
        let pipeline = self.pipeline(Arc::clone(&catalog), images);
        self.download_with(&pipeline, catalog.as_ref(), encoder, manga_id)
            .await
    }

    /// Like [`download`](TankobonConfig::download), with a caller-built
    /// pipeline (for example one reporting progress).
    pub async fn download_with(
        &self,
        pipeline: &Pipeline,
        catalog: &dyn Catalog,
        encoder: &dyn Encoder,
        manga_id: &str,
    ) -> Result<DownloadReport> {
        let manga = self.resolve(catalog, manga_id).await?;
        let mut report = DownloadReport {
            discontinuities: manga.chapters().sort_by_identifier().discontinuities(),
            ..Default::default()
        };
        for (last, next) in &report.discontinuities {
            warn!("Chapters jump from {} to {}", last, next);
        }

        ensure_directory(&self.output_directory).await?;
        if let Some(directory) = &self.thumbnail_directory {
            ensure_directory(directory).await?;
        }

        let covers = self.cover_tasks(catalog, manga_id, &manga).await?;
        let covers = pipeline.fetch_covers(covers).await?;
        let manga = manga.with_covers(covers);

        for volume in manga.keys() {
            let path = volume_file_path(
                &self.output_directory,
                &volume,
                self.volume_number_width,
                self.volume_minor_width,
                encoder.extension(),
            );
            if path.exists() && !self.force {
                info!("Skipping volume {}: {} exists", volume, path.display());
                report.volumes.push((volume, VolumeOutcome::Skipped(path)));
                continue;
            }

            match self
                .download_volume(pipeline, encoder, &manga, &volume, &path)
                .await
            {
                Ok(()) => {
                    info!("Wrote volume {} to {}", volume, path.display());
                    report.volumes.push((volume, VolumeOutcome::Written(path)));
                }
                Err(e) => {
                    remove_partial(&path).await?;
                    if e.aborts_run() {
                        return Err(e);
                    }
                    warn!("Volume {} failed: {}", volume, e);
                    report
                        .volumes
                        .push((volume, VolumeOutcome::Failed(e.to_string())));
                }
            }
        }

        info!(
            "Finished '{}': {} written, {} skipped, {} failed",
            manga.info.title,
            report.written(),
            report.skipped(),
            report.failed()
        );
        Ok(report)
    }

    /// Cover locations for the volumes in `manga`, catalog covers first so
    /// local ones override them.
    async fn cover_tasks(
        &self,
        catalog: &dyn Catalog,
        manga_id: &str,
        manga: &Manga,
    ) -> Result<Vec<PathTask>> {
        let mut covers: Vec<PathTask> = catalog
            .fetch_cover_list(manga_id)
            .await?
            .into_iter()
            .map(|cover| {
                PathTask::cover(
                    PageSource::Remote {
                        url: cover.url,
                        data_saver_url: None,
                    },
                    cover.volume,
                )
            })
            .collect();
        if let Some(library) = self.local_library() {
            covers.extend(library.load_covers().await?);
        }
        covers.retain(|cover| manga.volumes.contains_key(&cover.volume));
        Ok(covers)
    }

    async fn download_volume(
        &self,
        pipeline: &Pipeline,
        encoder: &dyn Encoder,
        manga: &Manga,
        volume: &Identifier,
        path: &Path,
    ) -> Result<()> {
        let document = manga
            .volume_subset(volume)
            .ok_or_else(|| Error::NotFound(format!("volume {}", volume)))?;

        let pages = pipeline.fetch_pages(document.chapters()).await?;
        let document = document.with_pages(pages);
        debug!("Volume {}: {} pages fetched", volume, document.page_count());

        let options = self.geometry_options();
        let document = spawn_blocking(move || geometry::process_manga(document, &options)).await??;

        let thumbnail = match &self.thumbnail_directory {
            Some(directory) => match document.volumes.values().find_map(|v| v.cover.as_ref()) {
                Some(cover) => Some((
                    directory.join(encoder.thumbnail_filename(&document)),
                    encode_jpeg(cover, 85)?,
                )),
                None => None,
            },
            None => None,
        };

        let bytes = encoder.encode(document).await?;
        tokio::fs::write(path, bytes).await?;

        // The thumbnail only goes out once the volume itself is on disk.
        if let Some((thumbnail, bytes)) = thumbnail {
            if let Err(e) = tokio::fs::write(&thumbnail, bytes).await {
                remove_partial(&thumbnail).await?;
                return Err(e.into());
            }
        }
        Ok(())
    }
}

impl TankobonConfigBuilder {
    fn validate(&self) -> std::result::Result<(), String> {
        if let Some(Some(pattern)) = &self.group_pattern {
            if let Err(e) = ChapterFilter::group_name(pattern) {
                return Err(format!("Invalid group_pattern '{}': {}", pattern, e));
            }
        }
        if self.chapter_jobs == Some(0) || self.image_jobs == Some(0) {
            return Err("Concurrency limits must be at least 1".to_string());
        }
        if self.page_location_rate == Some(0) {
            return Err("page_location_rate must be at least 1".to_string());
        }
        if self.volume_number_width.is_some_and(|w| w > 16)
            || self.volume_minor_width.is_some_and(|w| w > 16)
        {
            return Err("Volume number widths must not exceed 16".to_string());
        }
        Ok(())
    }
}
