//! Page geometry: whitespace autocrop and wide-page split/rotate.
//!
//! Everything here is synchronous and CPU bound. Callers on an async runtime
//! should run it on a blocking thread.

use image::{DynamicImage, GenericImageView, Rgba};

use crate::document::{Manga, Volume};
use crate::error::{Error, Result};
use crate::types::{AutocropMode, AutosplitPolicy, Direction};

/// Luminance at or below this counts as content.
pub const DARKNESS_THRESHOLD: u8 = 128;
/// Pages wider than this ratio (width / height) are two-page spreads.
pub const WIDE_ASPECT_RATIO: f64 = 1.2;
/// How far a limited autocrop may inset an edge, as a fraction of the
/// average page dimension.
pub const LIMITED_MARGIN_FRACTION: f64 = 0.1;

/// An axis-aligned rectangle; `min` is inclusive, `max` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub min_x: u32,
    pub min_y: u32,
    pub max_x: u32,
    pub max_y: u32,
}

impl Rect {
    pub const fn new(min_x: u32, min_y: u32, max_x: u32, max_y: u32) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// The full extent of `image`.
    pub fn of(image: &DynamicImage) -> Self {
        let (width, height) = image.dimensions();
        Self::new(0, 0, width, height)
    }

    pub fn width(&self) -> u32 {
        self.max_x.saturating_sub(self.min_x)
    }

    pub fn height(&self) -> u32 {
        self.max_y.saturating_sub(self.min_y)
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// The smallest rectangle containing both.
    pub fn union(&self, other: &Rect) -> Rect {
        Rect::new(
            self.min_x.min(other.min_x),
            self.min_y.min(other.min_y),
            self.max_x.max(other.max_x),
            self.max_y.max(other.max_y),
        )
    }
}

/// Options applied to every page of a volume.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GeometryOptions {
    pub autocrop: AutocropMode,
    pub autosplit: AutosplitPolicy,
    /// Store the preserved copy of a wide page rotated by 90 degrees.
    pub rotate_wide_pages: bool,
    pub direction: Direction,
}

impl GeometryOptions {
    /// True when no option would change any page.
    pub fn is_noop(&self) -> bool {
        self.autocrop == AutocropMode::Off
            && self.autosplit == AutosplitPolicy::Preserve
            && !self.rotate_wide_pages
    }
}

/// 8-bit luminance of an alpha-premultiplied pixel.
fn luminance(pixel: Rgba<u8>) -> u8 {
    let [r, g, b, a] = pixel.0.map(u32::from);
    let premultiply = |c: u32| c * a / 255;
    ((19595 * premultiply(r) + 38470 * premultiply(g) + 7471 * premultiply(b) + (1 << 15)) >> 16)
        as u8
}

/// The bounds of the page's dark content.
///
/// Each edge moves inward to the first row or column holding a pixel at or
/// below [`DARKNESS_THRESHOLD`]. A page without any such pixel keeps its
/// full bounds.
pub fn content_bounds(image: &DynamicImage) -> Rect {
    let (width, height) = image.dimensions();
    let mut bounds: Option<Rect> = None;

    for (x, y, pixel) in image.pixels() {
        if luminance(pixel) > DARKNESS_THRESHOLD {
            continue;
        }
        let point = Rect::new(x, y, x + 1, y + 1);
        bounds = Some(bounds.map_or(point, |b| b.union(&point)));
    }

    bounds.unwrap_or(Rect::new(0, 0, width, height))
}

/// Like [`content_bounds`], but no edge moves inward by more than
/// [`LIMITED_MARGIN_FRACTION`] of the average page dimension.
pub fn limited_content_bounds(image: &DynamicImage) -> Rect {
    let (width, height) = image.dimensions();
    let margin = (LIMITED_MARGIN_FRACTION * (width as f64 + height as f64) / 2.0) as u32;
    let limit = Rect::new(
        margin.min(width),
        margin.min(height),
        width.saturating_sub(margin),
        height.saturating_sub(margin),
    );
    content_bounds(image).union(&limit)
}

/// Extracts `rect` from `image`.
///
/// Fails with [`Error::UnsupportedGeometry`] for an empty rectangle or one
/// reaching outside the image.
pub fn crop(image: &DynamicImage, rect: Rect) -> Result<DynamicImage> {
    let (width, height) = image.dimensions();
    if rect.is_empty() || rect.max_x > width || rect.max_y > height {
        return Err(Error::UnsupportedGeometry(format!(
            "cannot extract {:?} from a {}x{} image",
            rect, width, height
        )));
    }
    Ok(image.crop_imm(rect.min_x, rect.min_y, rect.width(), rect.height()))
}

pub fn autocrop(image: DynamicImage, mode: AutocropMode) -> Result<DynamicImage> {
    let rect = match mode {
        AutocropMode::Off => return Ok(image),
        AutocropMode::Full => content_bounds(&image),
        AutocropMode::Limited => limited_content_bounds(&image),
    };
    if rect == Rect::of(&image) {
        return Ok(image);
    }
    crop(&image, rect)
}

pub fn is_wide(image: &DynamicImage) -> bool {
    let (width, height) = image.dimensions();
    height > 0 && width as f64 / height as f64 > WIDE_ASPECT_RATIO
}

/// Splits a page into left and right halves at the horizontal midpoint.
/// The right half takes the odd column.
pub fn split(image: &DynamicImage) -> Result<(DynamicImage, DynamicImage)> {
    let (width, height) = image.dimensions();
    let middle = width / 2;
    let left = crop(image, Rect::new(0, 0, middle, height))?;
    let right = crop(image, Rect::new(middle, 0, width, height))?;
    Ok((left, right))
}

/// Rotates a page by 90 degrees: pixel `(x, y)` of a `W`x`H` page lands on
/// `(H - 1 - y, x)` of the `H`x`W` result.
pub fn rotate(image: &DynamicImage) -> DynamicImage {
    image.rotate90()
}

/// Applies autocrop and the wide-page policy to one page, returning the
/// pages to emit in reading order.
pub fn process_page(image: DynamicImage, options: &GeometryOptions) -> Result<Vec<DynamicImage>> {
    let page = autocrop(image, options.autocrop)?;
    if !is_wide(&page) {
        return Ok(vec![page]);
    }

    let halves = |page: &DynamicImage| -> Result<[DynamicImage; 2]> {
        let (left, right) = split(page)?;
        Ok(match options.direction {
            Direction::Ltr => [left, right],
            Direction::Rtl => [right, left],
        })
    };
    let preserve = |page: DynamicImage| {
        if options.rotate_wide_pages {
            rotate(&page)
        } else {
            page
        }
    };

    Ok(match options.autosplit {
        AutosplitPolicy::Preserve => vec![preserve(page)],
        AutosplitPolicy::Split => halves(&page)?.into(),
        AutosplitPolicy::PreserveThenSplit => {
            let [first, second] = halves(&page)?;
            vec![preserve(page), first, second]
        }
        AutosplitPolicy::SplitThenPreserve => {
            let [first, second] = halves(&page)?;
            vec![first, second, preserve(page)]
        }
    })
}

/// Processes every page of a volume, renumbering each chapter's pages.
pub fn process_volume(volume: &mut Volume, options: &GeometryOptions) -> Result<()> {
    for chapter in volume.chapters.values_mut() {
        let pages = std::mem::take(&mut chapter.pages);
        let mut processed = Vec::with_capacity(pages.len());
        for (index, page) in pages {
            let emitted = process_page(page, options)
                .map_err(|e| e.in_page(&chapter.info.identifier, index))?;
            processed.extend(emitted);
        }
        chapter.set_pages(processed);
    }
    Ok(())
}

/// Processes every volume of `manga`.
pub fn process_manga(mut manga: Manga, options: &GeometryOptions) -> Result<Manga> {
    if options.is_noop() {
        return Ok(manga);
    }
    for volume in manga.volumes.values_mut() {
        process_volume(volume, options)?;
    }
    Ok(manga)
}
