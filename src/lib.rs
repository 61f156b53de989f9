//! Tankobon - Manga Volume Assembly Library
//!
//! This crate fetches a manga's chapter feed from an online catalog, picks one
//! submission per chapter, downloads the pages concurrently, cleans up page
//! geometry and writes one comic archive per volume.
//!
//! # Getting Started
//!
//! Implement [`Catalog`] for the service you talk to (the wire protocol is
//! not part of this crate), configure a run with [`TankobonConfig`] and call
//! [`TankobonConfig::download`].
//!
//! ```rust,no_run
//! use tankobon::prelude::*;
//!
//! # async fn run(catalog: Arc<dyn Catalog>) -> tankobon::error::Result<()> {
//! let config = TankobonConfig::builder()
//!     .language("en")
//!     .volume_ranges("1..3")
//!     .ranking(RankingPolicy::NewestGroup)
//!     .autosplit(AutosplitPolicy::Split)
//!     .direction(Direction::Rtl)
//!     .output_directory("./volumes")
//!     .build()?;
//!
//! let images = Arc::new(HttpImageSource::new()?);
//! let encoder = CbzEncoder::new(config.direction);
//! let report = config
//!     .download(catalog, images, &encoder, "manga-id")
//!     .await?;
//! println!("{} volumes written", report.written());
//! # Ok(())
//! # }
//! ```
//!
//! The building blocks are usable on their own: [`filter::select`] for
//! chapter selection, [`Pipeline`] for acquisition, [`geometry`] for page
//! processing and [`encoder`] for output.

pub mod catalog;
pub mod document;
pub mod encoder;
pub mod error;
pub mod filter;
pub mod geometry;
pub mod http;
pub mod identifier;
pub mod list;
pub mod local;
pub mod path_utils;
pub mod pipeline;
pub mod range;
pub mod tankobon;
pub mod types;

pub use tankobon::TankobonConfig;
pub use tankobon::TankobonConfigBuilder;

pub use catalog::{Catalog, ImageSource};
pub use document::{Chapter, Manga, Volume};
pub use encoder::Encoder;
pub use encoder::cbz::CbzEncoder;
pub use http::HttpImageSource;
pub use identifier::Identifier;
pub use list::ChapterList;
pub use pipeline::Pipeline;
pub use types::{
    AutocropMode, AutosplitPolicy, ChapterInfo, DataSaverPolicy, Direction, DownloadReport,
    MangaInfo, RankingPolicy, VolumeOutcome,
};

/// Prelude module for convenient imports.
///
/// Re-exports the types needed to configure and run a download with a single
/// `use tankobon::prelude::*;` statement.
pub mod prelude {
    pub use super::{
        AutocropMode, AutosplitPolicy, Catalog, CbzEncoder, ChapterInfo, ChapterList,
        DataSaverPolicy, Direction, DownloadReport, Encoder, HttpImageSource, Identifier,
        ImageSource, Manga, MangaInfo, Pipeline, RankingPolicy, TankobonConfig,
        TankobonConfigBuilder, VolumeOutcome, error, types,
    };
    pub use crate::filter::ChapterFilter;
    pub use std::path::{Path, PathBuf};
    pub use std::sync::Arc;
}
