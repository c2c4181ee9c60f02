//! # Indexed bitmaps
//!
//! Decoded frames are kept as palette indices rather than colours so the same frame can be
//! re-coloured by swapping palettes. Rows are stored bottom-to-top, matching the order the
//! codecs emit them in, so `(x, y)` with `y = 0` at the top lives in the *last* buffer row.

use std::{
    hash::{Hash, Hasher},
    sync::Arc,
};

use image::{Rgba, RgbaImage};
use twox_hash::XxHash64;

use crate::{
    error::{AssetError, AssetResult},
    graphics::palette::Palette,
};

/// Palette index the codecs emit for transparent pixels
pub const TRANSPARENT_INDEX: u8 = 0xFF;

#[derive(Clone, Debug)]
pub struct IndexedBitmap {
    width: usize,
    height: usize,
    palette: Arc<Palette>,
    pixels: Vec<u8>,
}

impl IndexedBitmap {
    /// Zero-filled bitmap of a known size
    pub fn new(palette: Arc<Palette>, width: usize, height: usize) -> Self {
        IndexedBitmap {
            width,
            height,
            palette,
            pixels: vec![0; width * height],
        }
    }

    /// Wraps a decoded buffer whose width is not known yet; see [`IndexedBitmap::set_width`]
    pub fn from_raw(palette: Arc<Palette>, pixels: Vec<u8>) -> Self {
        IndexedBitmap {
            width: 0,
            height: 0,
            palette,
            pixels,
        }
    }

    /// Wraps a buffer of a known size, padding or truncating it to `width * height`
    pub fn from_parts(
        palette: Arc<Palette>,
        width: usize,
        height: usize,
        mut pixels: Vec<u8>,
    ) -> Self {
        pixels.resize(width * height, TRANSPARENT_INDEX);
        IndexedBitmap {
            width,
            height,
            palette,
            pixels,
        }
    }

    /// Fixes the width of a raw buffer. The height becomes `len / width` and a trailing
    /// partial row is dropped.
    pub fn set_width(&mut self, width: usize) -> AssetResult<()> {
        if width == 0 {
            return Err(AssetError::Decode("bitmap width cannot be zero".to_string()));
        }
        self.width = width;
        self.height = self.pixels.len() / width;
        self.pixels.truncate(width * self.height);
        Ok(())
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn palette(&self) -> &Arc<Palette> {
        &self.palette
    }

    /// Palette indices in storage order (bottom row first)
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    fn offset(&self, x: usize, y: usize) -> AssetResult<usize> {
        if x >= self.width || y >= self.height {
            return Err(AssetError::Index(format!(
                "pixel ({}, {}) outside {}x{} bitmap",
                x, y, self.width, self.height
            )));
        }
        Ok(self.width * (self.height - 1) - self.width * y + x)
    }

    pub fn pixel(&self, x: usize, y: usize) -> AssetResult<u8> {
        let offset = self.offset(x, y)?;
        Ok(self.pixels[offset])
    }

    pub fn set_pixel(&mut self, x: usize, y: usize, value: u8) -> AssetResult<()> {
        let offset = self.offset(x, y)?;
        self.pixels[offset] = value;
        Ok(())
    }

    pub fn is_transparent_at(&self, x: usize, y: usize) -> AssetResult<bool> {
        Ok(self.pixel(x, y)? == TRANSPARENT_INDEX)
    }

    /// New bitmap holding the `w x h` region at `(x, y)`
    pub fn copy(&self, x: usize, y: usize, w: usize, h: usize) -> AssetResult<IndexedBitmap> {
        let mut out = IndexedBitmap::new(self.palette.clone(), w, h);
        for dy in 0..h {
            for dx in 0..w {
                out.set_pixel(dx, dy, self.pixel(x + dx, y + dy)?)?;
            }
        }
        Ok(out)
    }

    /// Overwrites pixels starting at `(at_x, at_y)` with `source`.
    ///
    /// The horizontal extent is bounded by `source.height()` as well as the vertical one. Sources
    /// wider than they are tall are clipped, and narrower ones fail with an index error.
    pub fn paste(&mut self, source: &IndexedBitmap, at_x: usize, at_y: usize) -> AssetResult<()> {
        for y in 0..source.height {
            for x in 0..source.height {
                self.set_pixel(at_x + x, at_y + y, source.pixel(x, y)?)?;
            }
        }
        Ok(())
    }

    pub fn fill(&mut self, x: usize, y: usize, w: usize, h: usize, value: u8) -> AssetResult<()> {
        for dy in 0..h {
            for dx in 0..w {
                self.set_pixel(x + dx, y + dy, value)?;
            }
        }
        Ok(())
    }

    /// Outline for selection highlights: transparent pixels touching an opaque one
    /// (4-neighbourhood) take `colour`, everything else is transparent
    pub fn create_highlight_mask(&self, colour: u8) -> IndexedBitmap {
        let mut mask = IndexedBitmap::from_parts(
            self.palette.clone(),
            self.width,
            self.height,
            vec![TRANSPARENT_INDEX; self.width * self.height],
        );

        let opaque =
            |x: usize, y: usize| matches!(self.pixel(x, y), Ok(v) if v != TRANSPARENT_INDEX);

        for y in 0..self.height {
            for x in 0..self.width {
                if opaque(x, y) {
                    continue;
                }
                let touches = (x > 0 && opaque(x - 1, y))
                    || opaque(x + 1, y)
                    || (y > 0 && opaque(x, y - 1))
                    || opaque(x, y + 1);
                if touches {
                    let offset = self.width * (self.height - 1) - self.width * y + x;
                    mask.pixels[offset] = colour;
                }
            }
        }

        mask
    }

    /// Resolves indices through the palette, top row first.
    ///
    /// Entries the palette marks transparent come out fully clear. Index 255 is clear as well
    /// unless the palette puts its sentinel somewhere else.
    pub fn to_rgba_image(&self) -> AssetResult<RgbaImage> {
        if self.width == 0 && !self.pixels.is_empty() {
            return Err(AssetError::Index(format!(
                "{} byte bitmap has no width yet",
                self.pixels.len()
            )));
        }

        let sentinel_moved = self
            .palette
            .transparent_indices()
            .iter()
            .any(|&i| i != TRANSPARENT_INDEX);
        let clear = |index: u8| {
            self.palette.is_transparent(index) || (index == TRANSPARENT_INDEX && !sentinel_moved)
        };

        let mut img = RgbaImage::new(self.width as u32, self.height as u32);
        for y in 0..self.height {
            for x in 0..self.width {
                let index = self.pixel(x, y)?;
                let colour = if clear(index) {
                    Rgba([0, 0, 0, 0])
                } else {
                    self.palette.color(index)
                };
                img.put_pixel(x as u32, y as u32, colour);
            }
        }
        Ok(img)
    }

    /// 64-bit hash over dimensions and indices, for spotting duplicate frames
    pub fn content_hash(&self) -> u64 {
        let mut hasher = XxHash64::default();
        self.width.hash(&mut hasher);
        self.height.hash(&mut hasher);
        self.pixels.hash(&mut hasher);
        hasher.finish()
    }

    /// Pixel-for-pixel comparison, used to confirm a hash match
    pub fn same_pixels(&self, other: &IndexedBitmap) -> bool {
        self.width == other.width && self.height == other.height && self.pixels == other.pixels
    }
}
