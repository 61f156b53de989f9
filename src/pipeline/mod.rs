//! The concurrent acquisition pipeline.
//!
//! Chapters flow through three stages:
//!
//! 1. [`fetch_chapters`] pages through the catalog feed and resolves group
//!    names (sequential).
//! 2. A pool of chapter workers turns each chapter into page locations,
//!    sharing one [`RateLimiter`] for catalog lookups.
//! 3. A pool of image workers fetches and decodes every page.
//!
//! Stages are connected by unbounded queues, so a stage never waits on a
//! slower one downstream; the worker pools cap the work in flight. The first
//! failing unit of work cancels a shared [`CancelSignal`]. Queue reads and
//! network calls race against it and queue writes check it, so the run winds
//! down promptly and reports that one failure. A stage's output queue closes
//! only once all of its workers have finished, so completion propagates
//! downstream.

mod cancel;
mod limiter;
mod progress;

pub use cancel::CancelSignal;
pub use limiter::RateLimiter;
pub use progress::{CountingProgress, NoProgress, Progress};

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::try_join_all;
use image::DynamicImage;
use log::{debug, warn};
use tokio::sync::{Semaphore, mpsc};
use tokio::task::{JoinSet, spawn_blocking};

use crate::catalog::{Catalog, ImageSource};
use crate::error::{Error, Result};
use crate::list::ChapterList;
use crate::local;
use crate::types::{ChapterInfo, ChapterSource, DataSaverPolicy, ImageTask, PageSource, PathTask};

/// Feed entries requested per catalog call.
pub const FEED_PAGE_LIMIT: usize = 500;
/// Group ids resolved per catalog call.
pub const GROUP_BATCH_LIMIT: usize = 100;

/// Resolves the complete, normalized chapter feed of a manga.
///
/// Pages through the feed until `offset + limit` reaches the reported total,
/// then resolves the distinct group ids in concurrent batches.
pub async fn fetch_chapters(catalog: &dyn Catalog, manga_id: &str) -> Result<ChapterList> {
    let mut entries = Vec::new();
    let mut offset = 0;
    loop {
        let page = catalog
            .fetch_feed_page(manga_id, offset, FEED_PAGE_LIMIT)
            .await?;
        debug!(
            "Feed page at offset {}: {} of {} entries",
            offset,
            page.entries.len(),
            page.total
        );
        entries.extend(page.entries);
        if offset + FEED_PAGE_LIMIT >= page.total {
            break;
        }
        offset += FEED_PAGE_LIMIT;
    }

    let mut seen = HashSet::new();
    let group_ids: Vec<String> = entries
        .iter()
        .flat_map(|entry| entry.group_ids.iter())
        .filter(|id| seen.insert(id.as_str()))
        .cloned()
        .collect();

    let group_names: HashMap<String, String> = try_join_all(
        group_ids
            .chunks(GROUP_BATCH_LIMIT)
            .map(|batch| catalog.fetch_group_names(batch)),
    )
    .await?
    .into_iter()
    .flatten()
    .collect();

    Ok(entries
        .into_iter()
        .map(|entry| entry.into_chapter(&group_names))
        .collect())
}

/// Tuning for one [`Pipeline`].
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub chapter_jobs: usize,
    pub image_jobs: usize,
    pub data_saver: DataSaverPolicy,
    pub limiter: Arc<RateLimiter>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chapter_jobs: 8,
            image_jobs: 16,
            data_saver: DataSaverPolicy::default(),
            limiter: Arc::new(RateLimiter::new(40, Duration::from_secs(60))),
        }
    }
}

/// Fetches the pages and covers of chapters, see the module docs.
#[derive(Clone)]
pub struct Pipeline {
    catalog: Arc<dyn Catalog>,
    images: Arc<dyn ImageSource>,
    config: PipelineConfig,
    progress: Arc<dyn Progress>,
}

impl Pipeline {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        images: Arc<dyn ImageSource>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            catalog,
            images,
            config,
            progress: Arc::new(NoProgress),
        }
    }

    /// Reports discovered and finished work to `progress`.
    pub fn with_progress(mut self, progress: Arc<dyn Progress>) -> Self {
        self.progress = progress;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Fetches every page of `chapters`. Results arrive in no particular
    /// order; each carries its (volume, chapter, page) triple.
    pub async fn fetch_pages(&self, chapters: ChapterList) -> Result<Vec<ImageTask>> {
        let cancel = CancelSignal::new();
        let (path_tx, path_rx) = mpsc::unbounded_channel();
        let (image_tx, image_rx) = mpsc::unbounded_channel();

        self.progress.increase(chapters.len() as u64);
        let paths = tokio::spawn(self.clone().resolve_stage(
            chapters.into_inner(),
            path_tx,
            cancel.clone(),
        ));
        let images = tokio::spawn(self.clone().image_stage(path_rx, image_tx, cancel.clone()));

        let results = collect(image_rx).await;
        let outcome = first_error([paths.await?, images.await?]);
        outcome.map(|_| results)
    }

    /// Fetches cover images; covers skip the page-location stage.
    pub async fn fetch_covers(&self, covers: Vec<PathTask>) -> Result<Vec<ImageTask>> {
        let cancel = CancelSignal::new();
        let (path_tx, path_rx) = mpsc::unbounded_channel();
        let (image_tx, image_rx) = mpsc::unbounded_channel();

        self.progress.increase(covers.len() as u64);
        for cover in covers {
            path_tx.send(cover).map_err(|_| Error::Cancelled)?;
        }
        drop(path_tx);

        let images = tokio::spawn(self.clone().image_stage(path_rx, image_tx, cancel));
        let results = collect(image_rx).await;
        images.await?.map(|_| results)
    }

    async fn resolve_stage(
        self,
        chapters: Vec<ChapterInfo>,
        out: mpsc::UnboundedSender<PathTask>,
        cancel: CancelSignal,
    ) -> Result<()> {
        let semaphore = Arc::new(Semaphore::new(self.config.chapter_jobs.max(1)));
        let mut workers = JoinSet::new();

        for chapter in chapters {
            let permit = tokio::select! {
                _ = cancel.cancelled() => break,
                permit = Arc::clone(&semaphore).acquire_owned() => permit?,
            };
            let pipeline = self.clone();
            let out = out.clone();
            let cancel = cancel.clone();
            workers.spawn(async move {
                let _permit = permit;
                pipeline
                    .resolve_chapter(&chapter, &out, &cancel)
                    .await
                    .inspect_err(|e| {
                        if !e.is_cancelled() {
                            cancel.cancel();
                        }
                    })
                    .map_err(|e| e.in_chapter(&chapter.identifier))
            });
        }
        drop(out);

        join_workers(workers, &cancel).await
    }

    async fn resolve_chapter(
        &self,
        chapter: &ChapterInfo,
        out: &mpsc::UnboundedSender<PathTask>,
        cancel: &CancelSignal,
    ) -> Result<()> {
        let paths = match &chapter.source {
            ChapterSource::Catalog => {
                until_cancelled(cancel, self.config.limiter.acquire()).await?;
                until_cancelled(cancel, self.catalog.fetch_page_locations(chapter)).await??
            }
            ChapterSource::Local(directory) => local::page_tasks(chapter, directory).await?,
        };
        debug!(
            "Chapter {} resolved to {} pages",
            chapter.identifier,
            paths.len()
        );
        self.progress.advance(1);

        for path in paths {
            send_unless_cancelled(cancel, out, path)?;
            self.progress.increase(1);
        }
        Ok(())
    }

    async fn image_stage(
        self,
        mut paths: mpsc::UnboundedReceiver<PathTask>,
        out: mpsc::UnboundedSender<ImageTask>,
        cancel: CancelSignal,
    ) -> Result<()> {
        let semaphore = Arc::new(Semaphore::new(self.config.image_jobs.max(1)));
        let mut workers = JoinSet::new();

        loop {
            let path = tokio::select! {
                _ = cancel.cancelled() => break,
                path = paths.recv() => match path {
                    Some(path) => path,
                    None => break,
                },
            };
            let permit = tokio::select! {
                _ = cancel.cancelled() => break,
                permit = Arc::clone(&semaphore).acquire_owned() => permit?,
            };
            let pipeline = self.clone();
            let out = out.clone();
            let cancel = cancel.clone();
            workers.spawn(async move {
                let _permit = permit;
                let (chapter, page) = (path.chapter.clone(), path.image_index);
                pipeline
                    .fetch_page(path, &out, &cancel)
                    .await
                    .inspect_err(|e| {
                        if !e.is_cancelled() {
                            cancel.cancel();
                        }
                    })
                    .map_err(|e| e.in_page(&chapter, page))
            });
        }
        drop(out);

        join_workers(workers, &cancel).await
    }

    async fn fetch_page(
        &self,
        path: PathTask,
        out: &mpsc::UnboundedSender<ImageTask>,
        cancel: &CancelSignal,
    ) -> Result<()> {
        let image = until_cancelled(cancel, self.fetch_image(&path.source)).await??;
        send_unless_cancelled(cancel, out, path.with_image(image))
    }

    /// Fetches and decodes one image under the configured data-saver policy.
    async fn fetch_image(&self, source: &PageSource) -> Result<DynamicImage> {
        let (url, data_saver_url) = match source {
            PageSource::Local(path) => return local::read_image(path.clone()).await,
            PageSource::Remote {
                url,
                data_saver_url,
            } => (url, data_saver_url.as_ref()),
        };

        let result = match (self.config.data_saver, data_saver_url) {
            (DataSaverPolicy::Prefer, Some(low)) => self.fetch_decoded(low).await,
            _ => self.fetch_decoded(url).await,
        };
        let result = match (result, self.config.data_saver, data_saver_url) {
            (Err(Error::Decode { reason, .. }), DataSaverPolicy::Fallback, Some(low)) => {
                warn!("Could not decode {} ({}), trying {}", url, reason, low);
                self.fetch_decoded(low).await
            }
            (result, ..) => result,
        };
        self.progress.advance(1);
        result
    }

    async fn fetch_decoded(&self, url: &str) -> Result<DynamicImage> {
        let bytes = self.images.fetch(url).await?;
        let origin = url.to_string();
        spawn_blocking(move || {
            image::load_from_memory(&bytes).map_err(|e| Error::Decode {
                origin,
                reason: e.to_string(),
            })
        })
        .await?
    }
}

/// Runs `future` unless `cancel` fires first.
async fn until_cancelled<F: Future>(cancel: &CancelSignal, future: F) -> Result<F::Output> {
    tokio::select! {
        _ = cancel.cancelled() => Err(Error::Cancelled),
        output = future => Ok(output),
    }
}

/// Queues `item` downstream; a closed queue means the run is winding down.
fn send_unless_cancelled<T>(
    cancel: &CancelSignal,
    out: &mpsc::UnboundedSender<T>,
    item: T,
) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }
    out.send(item).map_err(|_| Error::Cancelled)
}

async fn collect<T>(mut rx: mpsc::UnboundedReceiver<T>) -> Vec<T> {
    let mut results = Vec::new();
    while let Some(item) = rx.recv().await {
        results.push(item);
    }
    results
}

/// Waits for every worker and picks the run's representative error: the
/// first real failure, or [`Error::Cancelled`] when the stage only stopped
/// because of a failure elsewhere.
async fn join_workers(mut workers: JoinSet<Result<()>>, cancel: &CancelSignal) -> Result<()> {
    let mut results = Vec::new();
    while let Some(joined) = workers.join_next().await {
        results.push(joined.map_err(Error::from).and_then(|r| r));
    }
    if cancel.is_cancelled() {
        results.push(Err(Error::Cancelled));
    }
    first_error(results)
}

fn first_error(results: impl IntoIterator<Item = Result<()>>) -> Result<()> {
    let mut cancelled = None;
    for result in results {
        match result {
            Err(e) if e.is_cancelled() => cancelled = Some(e),
            Err(e) => return Err(e),
            Ok(()) => {}
        }
    }
    cancelled.map_or(Ok(()), Err)
}
