//! Output encoders for assembled documents.
//!
//! An encoder turns a fully fetched and processed [`Manga`] (normally holding
//! a single volume) into the bytes of one output file.

use async_trait::async_trait;
use image::DynamicImage;
use image::codecs::jpeg::JpegEncoder;

use crate::document::Manga;
use crate::error::Result;

pub mod cbz;

/// Common interface for all output formats.
#[async_trait]
pub trait Encoder: Send + Sync {
    /// File extension of the output, without the dot.
    fn extension(&self) -> &'static str;

    /// Encodes the document into the output file's bytes.
    async fn encode(&self, manga: Manga) -> Result<Vec<u8>>;

    /// File name for the volume's thumbnail image.
    fn thumbnail_filename(&self, manga: &Manga) -> String;
}

/// Encodes an image as baseline JPEG, dropping any alpha channel.
pub fn encode_jpeg(image: &DynamicImage, quality: u8) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, quality).encode_image(&image.to_rgb8())?;
    Ok(bytes)
}
