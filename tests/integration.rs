//! Integration tests for the tankobon crate.
//!
//! These tests run whole downloads against the in-memory catalog, from
//! chapter selection to the archives on disk.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tankobon::error::{Error, Result};
use tankobon::prelude::*;
use tankobon::types::CoverRef;
use tokio::time::timeout;

mod common;
use common::{
    MockCatalog, MockImageSource, TEST_TIMEOUT, create_page_file, feed_entry, page_image,
    setup_test_dir, zip_entry_names, zip_entry_text,
};

/// Volume 1 holds chapters 1 and 2 by group g1. Volume 2 holds chapter 5,
/// submitted by g1 on day 3 and by g2 on day 4.
fn series_catalog() -> MockCatalog {
    let mut catalog = MockCatalog::new(
        "Series",
        vec![
            feed_entry("e1", "1", "1", "g1", 1),
            feed_entry("e2", "2", "1", "g1", 2),
            feed_entry("e5a", "5", "2", "g1", 3),
            feed_entry("e5b", "5", "2", "g2", 4),
        ],
    );
    catalog.covers = vec![CoverRef {
        volume: Identifier::numeric(1, 0),
        url: "https://covers.test/1.png".to_string(),
    }];
    catalog
}

fn config_builder(out: &std::path::Path) -> TankobonConfigBuilder {
    let mut builder = TankobonConfig::builder();
    builder
        .output_directory(out.join("volumes"))
        .ranking(RankingPolicy::Newest)
        .page_location_rate(1000u32)
        .page_location_period(Duration::from_secs(1));
    builder
}

#[tokio::test]
async fn test_download_writes_one_archive_per_volume() -> Result<()> {
    let test_dir = setup_test_dir("download_full").await;
    let config = config_builder(&test_dir)
        .thumbnail_directory(test_dir.join("thumbs"))
        .build()?;
    let catalog = Arc::new(series_catalog());
    let images = Arc::new(MockImageSource::new());

    let report = timeout(
        TEST_TIMEOUT,
        config.download(catalog, images, &CbzEncoder::default(), "manga"),
    )
    .await
    .expect("Test timed out")?;

    assert_eq!(report.written(), 2);
    assert_eq!(
        report.discontinuities,
        vec![(Identifier::numeric(2, 0), Identifier::numeric(5, 0))]
    );

    let first = test_dir.join("volumes/0001.cbz");
    assert_eq!(
        zip_entry_names(&first),
        vec![
            "000_cover.jpg",
            "page_0001.jpg",
            "page_0002.jpg",
            "page_0003.jpg",
            "page_0004.jpg",
            "ComicInfo.xml",
        ]
    );

    let second = test_dir.join("volumes/0002.cbz");
    assert_eq!(
        zip_entry_names(&second),
        vec!["page_0001.jpg", "page_0002.jpg", "ComicInfo.xml"]
    );
    let comic_info = zip_entry_text(&second, "ComicInfo.xml");
    assert!(comic_info.contains("<Series>Series</Series>"));
    assert!(comic_info.contains("<Translator>G2</Translator>"));
    assert!(comic_info.contains("<PageCount>2</PageCount>"));
    assert!(comic_info.contains("<Volume>2</Volume>"));

    assert!(test_dir.join("thumbs/Series - 0001.jpg").exists());
    assert!(!test_dir.join("thumbs/Series - 0002.jpg").exists());
    Ok(())
}

#[tokio::test]
async fn test_existing_volumes_are_skipped_unless_forced() -> Result<()> {
    let test_dir = setup_test_dir("download_skip").await;
    let catalog = Arc::new(series_catalog());
    let images = Arc::new(MockImageSource::new());
    let encoder = CbzEncoder::default();

    let config = config_builder(&test_dir).build()?;
    let first = config
        .download(catalog.clone(), images.clone(), &encoder, "manga")
        .await?;
    assert_eq!(first.written(), 2);
    let fetched = images.fetched().len();

    let second = config
        .download(catalog.clone(), images.clone(), &encoder, "manga")
        .await?;
    assert_eq!(second.skipped(), 2);
    assert!(matches!(&second.volumes[0].1, VolumeOutcome::Skipped(_)));
    // Only the cover is fetched again.
    assert_eq!(images.fetched().len(), fetched + 1);

    let forced = config_builder(&test_dir).force(true).build()?;
    let third = forced.download(catalog, images, &encoder, "manga").await?;
    assert_eq!(third.written(), 2);
    Ok(())
}

#[tokio::test]
async fn test_failing_volume_is_removed_and_run_continues() -> Result<()> {
    let test_dir = setup_test_dir("download_failure").await;
    let mut catalog = series_catalog();
    catalog.garbage_chapters.insert("e2".to_string());
    let config = config_builder(&test_dir).build()?;

    let report = config
        .download(
            Arc::new(catalog),
            Arc::new(MockImageSource::new()),
            &CbzEncoder::default(),
            "manga",
        )
        .await?;

    assert_eq!(report.failed(), 1);
    assert_eq!(report.written(), 1);
    match &report.volumes[0] {
        (volume, VolumeOutcome::Failed(reason)) => {
            assert_eq!(*volume, Identifier::numeric(1, 0));
            assert!(reason.starts_with("chapter 2: image "));
        }
        other => panic!("expected a failed first volume, got {:?}", other),
    }
    assert!(!test_dir.join("volumes/0001.cbz").exists());
    assert!(test_dir.join("volumes/0002.cbz").exists());
    Ok(())
}

#[tokio::test]
async fn test_fatal_errors_abort_the_run() -> Result<()> {
    let test_dir = setup_test_dir("download_fatal").await;
    let catalog = Arc::new(series_catalog());
    let images = Arc::new(MockImageSource::new());
    let encoder = CbzEncoder::default();

    let config = config_builder(&test_dir).build()?;
    let missing = config
        .download(catalog.clone(), images.clone(), &encoder, "unknown-id")
        .await;
    assert!(matches!(missing, Err(Error::NotFound(_))));

    let french = config_builder(&test_dir).language("fr").build()?;
    let empty = french.download(catalog, images, &encoder, "manga").await;
    assert!(matches!(empty, Err(Error::EmptyResult)));
    assert!(!test_dir.join("volumes/0001.cbz").exists());
    Ok(())
}

#[tokio::test]
async fn test_resolve_applies_filters_and_ranking() -> Result<()> {
    let test_dir = setup_test_dir("resolve").await;
    let catalog = series_catalog();

    let config = config_builder(&test_dir).volume_ranges("2").build()?;
    let manga = config.resolve(&catalog, "manga").await?;
    assert_eq!(manga.keys(), vec![Identifier::numeric(2, 0)]);
    let chapter = &manga.volumes[&Identifier::numeric(2, 0)].chapters[&Identifier::numeric(5, 0)];
    assert_eq!(chapter.info.id, "e5b");

    let older_group = config_builder(&test_dir)
        .group_pattern("!G2")
        .build()?
        .resolve(&catalog, "manga")
        .await?;
    let chapter =
        &older_group.volumes[&Identifier::numeric(2, 0)].chapters[&Identifier::numeric(5, 0)];
    assert_eq!(chapter.info.id, "e5a");
    Ok(())
}

#[tokio::test]
async fn test_local_chapters_override_catalog() -> Result<()> {
    let test_dir = setup_test_dir("resolve_local").await;
    let library: PathBuf = test_dir.join("library");
    create_page_file(&library.join("1/1/1.png"), 20, 30).await?;
    create_page_file(&library.join("1/1/2.png"), 20, 30).await?;
    create_page_file(&library.join("1/1/3.png"), 20, 30).await?;

    let config = config_builder(&test_dir)
        .language("en")
        .local_directory(library)
        .build()?;
    let catalog = Arc::new(series_catalog());
    let manga = config.resolve(catalog.as_ref(), "manga").await?;
    let chapter = &manga.volumes[&Identifier::numeric(1, 0)].chapters[&Identifier::numeric(1, 0)];
    assert!(chapter.info.is_local());

    let report = config
        .download(
            catalog,
            Arc::new(MockImageSource::new()),
            &CbzEncoder::default(),
            "manga",
        )
        .await?;
    assert_eq!(report.written(), 2);
    // Three local pages plus two catalog pages of chapter 2.
    let names = zip_entry_names(&test_dir.join("volumes/0001.cbz"));
    assert_eq!(names.iter().filter(|n| n.starts_with("page_")).count(), 5);
    Ok(())
}

#[tokio::test]
async fn test_wide_pages_are_split() -> Result<()> {
    let test_dir = setup_test_dir("download_split").await;
    let config = config_builder(&test_dir)
        .volume_ranges("2")
        .autosplit(AutosplitPolicy::Split)
        .direction(Direction::Rtl)
        .build()?;
    let images = Arc::new(MockImageSource::with_page(&page_image(200, 100, None)));

    let report = config
        .download(
            Arc::new(series_catalog()),
            images,
            &CbzEncoder::new(Direction::Rtl),
            "manga",
        )
        .await?;
    assert_eq!(report.written(), 1);

    let archive = test_dir.join("volumes/0002.cbz");
    let comic_info = zip_entry_text(&archive, "ComicInfo.xml");
    assert!(comic_info.contains("<PageCount>4</PageCount>"));
    assert!(comic_info.contains("<Manga>YesAndRightToLeft</Manga>"));
    Ok(())
}

/// Accepts every volume and then fails to produce its bytes.
struct FailingEncoder;

#[async_trait]
impl Encoder for FailingEncoder {
    fn extension(&self) -> &'static str {
        "cbz"
    }

    async fn encode(&self, _manga: Manga) -> Result<Vec<u8>> {
        Err(Error::Other("archive writer gave up".to_string()))
    }

    fn thumbnail_filename(&self, manga: &Manga) -> String {
        CbzEncoder::default().thumbnail_filename(manga)
    }
}

#[tokio::test]
async fn test_failed_volume_leaves_no_thumbnail() -> Result<()> {
    let test_dir = setup_test_dir("download_failed_encode").await;
    let config = config_builder(&test_dir)
        .volume_ranges("1")
        .thumbnail_directory(test_dir.join("thumbs"))
        .build()?;

    let report = timeout(
        TEST_TIMEOUT,
        config.download(
            Arc::new(series_catalog()),
            Arc::new(MockImageSource::new()),
            &FailingEncoder,
            "manga",
        ),
    )
    .await
    .expect("Test timed out")?;

    assert_eq!(report.failed(), 1);
    match &report.volumes[0].1 {
        VolumeOutcome::Failed(reason) => assert!(reason.contains("archive writer gave up")),
        other => panic!("expected a failed volume, got {:?}", other),
    }
    assert!(!test_dir.join("volumes/0001.cbz").exists());
    assert!(!test_dir.join("thumbs/Series - 0001.jpg").exists());
    Ok(())
}

#[tokio::test]
async fn test_chapters_without_volume_do_not_break_continuity() -> Result<()> {
    let test_dir = setup_test_dir("download_unknown_volume").await;
    let catalog = MockCatalog::new(
        "Series",
        vec![
            feed_entry("e1", "1", "1", "g1", 1),
            feed_entry("e2", "2", "1", "g1", 2),
            feed_entry("e3", "3", "", "g1", 3),
            feed_entry("e4", "4", "2", "g1", 4),
        ],
    );
    let config = config_builder(&test_dir).build()?;

    let report = config
        .download(
            Arc::new(catalog),
            Arc::new(MockImageSource::new()),
            &CbzEncoder::default(),
            "manga",
        )
        .await?;

    assert_eq!(report.volumes.len(), 3);
    assert!(
        report.discontinuities.is_empty(),
        "unexpected gaps: {:?}",
        report.discontinuities
    );
    Ok(())
}

#[tokio::test]
async fn test_comic_info_keeps_placeholder_text_in_metadata() -> Result<()> {
    let test_dir = setup_test_dir("download_placeholder_text").await;
    let mut catalog = series_catalog();
    catalog.info.title = "100% %series%".to_string();
    catalog.info.description = Some("Exactly %pagecount% pages & more".to_string());
    let config = config_builder(&test_dir).volume_ranges("2").build()?;

    let report = config
        .download(
            Arc::new(catalog),
            Arc::new(MockImageSource::new()),
            &CbzEncoder::default(),
            "manga",
        )
        .await?;
    assert_eq!(report.written(), 1);

    let comic_info = zip_entry_text(&test_dir.join("volumes/0002.cbz"), "ComicInfo.xml");
    assert!(comic_info.contains("<Title>100% %series% 2</Title>"));
    assert!(comic_info.contains("<Series>100% %series%</Series>"));
    assert!(comic_info.contains("<Summary>Exactly %pagecount% pages &amp; more</Summary>"));
    assert!(comic_info.contains("<PageCount>2</PageCount>"));
    Ok(())
}

#[tokio::test]
async fn test_builder_validation() {
    let bad_pattern = TankobonConfig::builder().group_pattern("(").build();
    assert!(
        bad_pattern
            .unwrap_err()
            .to_string()
            .contains("Invalid group_pattern")
    );

    assert!(TankobonConfig::builder().image_jobs(0usize).build().is_err());
    assert!(
        TankobonConfig::builder()
            .page_location_rate(0u32)
            .build()
            .is_err()
    );

    let defaults = TankobonConfig::builder().build().unwrap();
    assert_eq!(defaults.chapter_jobs, 8);
    assert_eq!(defaults.image_jobs, 16);
    assert_eq!(defaults.ranking, RankingPolicy::NewestGroup);
    assert_eq!(defaults.output_directory, PathBuf::from("."));
}
