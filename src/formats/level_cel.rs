//! # Level CEL containers
//!
//! Dungeon tile art. The container layout is the plain CEL one, but every frame is a fixed
//! 32x32 square and the encoding is chosen per frame. Nothing in the CEL itself says which
//! encoding a frame uses: the shape lives in the square definitions (MIN) that reference the
//! frame, so the level loader has to tag frames before they can be decoded.
//!
//! The four wedge shapes are the halves of the isometric diamond. They store only the visible
//! part of each line, bottom line first, with zero bytes as padding.

use std::sync::Arc;

use log::{debug, warn};

use crate::{
    error::{AssetError, AssetResult},
    formats::{
        cel::{decode_cel_rle, parse_cel_container},
        FrameCache,
    },
    graphics::{
        bitmap::{IndexedBitmap, TRANSPARENT_INDEX},
        palette::Palette,
    },
};

pub const LEVEL_FRAME_DIM: usize = 32;
pub const LEVEL_FRAME_PIXELS: usize = LEVEL_FRAME_DIM * LEVEL_FRAME_DIM;
/// Encoded size of a triangular (low) wedge
pub const LOW_WEDGE_SIZE: usize = 544;
/// Encoded size of a trapezoid (high) wedge
pub const HIGH_WEDGE_SIZE: usize = 800;

/// How a level frame is encoded
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FrameShape {
    Raw,
    Compressed,
    LeftLow,
    RightLow,
    LeftHigh,
    RightHigh,
}

impl FrameShape {
    /// Maps the shape nibble stored in square definitions
    pub fn from_raw(value: u16) -> FrameShape {
        match value {
            0 => FrameShape::Raw,
            1 => FrameShape::Compressed,
            2 => FrameShape::LeftLow,
            3 => FrameShape::RightLow,
            4 => FrameShape::LeftHigh,
            5 => FrameShape::RightHigh,
            other => {
                warn!("Unknown level frame shape {}, treating as compressed", other);
                FrameShape::Compressed
            }
        }
    }

    pub fn is_left(self) -> bool {
        matches!(self, FrameShape::LeftLow | FrameShape::LeftHigh)
    }
}

/// Level tile frames with their shape tags
pub struct LevelCelFile {
    frames: Vec<Vec<u8>>,
    shapes: Vec<FrameShape>,
    palette: Arc<Palette>,
    cache: FrameCache,
}

impl LevelCelFile {
    pub fn from_bytes(data: &[u8], palette: Arc<Palette>) -> AssetResult<Self> {
        let frames = parse_cel_container(data)?;
        debug!("Level CEL: {} frames", frames.len());
        let shapes = vec![FrameShape::Compressed; frames.len()];
        let cache = FrameCache::new(frames.len());
        Ok(LevelCelFile {
            frames,
            shapes,
            palette,
            cache,
        })
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn shape(&self, index: usize) -> Option<FrameShape> {
        self.shapes.get(index).copied()
    }

    /// Tags a frame. A previously decoded copy of the frame is discarded.
    pub fn set_shape(&mut self, index: usize, shape: FrameShape) -> AssetResult<()> {
        let slot = self.shapes.get_mut(index).ok_or_else(|| {
            AssetError::Index(format!(
                "level frame {} out of range ({} frames)",
                index,
                self.frames.len()
            ))
        })?;
        if *slot != shape {
            *slot = shape;
            self.cache.invalidate(index);
        }
        Ok(())
    }

    pub fn frame(&self, index: usize) -> AssetResult<Arc<IndexedBitmap>> {
        let encoded = self.frames.get(index).ok_or_else(|| {
            AssetError::Index(format!(
                "level frame {} out of range ({} frames)",
                index,
                self.frames.len()
            ))
        })?;
        let shape = self.shapes[index];
        self.cache.get_or_decode(index, || {
            decode_level_frame(encoded, shape, self.palette.clone())
        })
    }

    pub fn all_frames(&self) -> AssetResult<Vec<Arc<IndexedBitmap>>> {
        (0..self.frames.len()).map(|i| self.frame(i)).collect()
    }

    pub fn palette(&self) -> &Arc<Palette> {
        &self.palette
    }
}

/// Decodes a 32x32 level frame according to its shape
pub fn decode_level_frame(
    data: &[u8],
    shape: FrameShape,
    palette: Arc<Palette>,
) -> AssetResult<IndexedBitmap> {
    let pixels = match shape {
        FrameShape::Raw => {
            let raw = data.get(..LEVEL_FRAME_PIXELS).ok_or_else(|| short_frame(shape, data.len()))?;
            raw.to_vec()
        }
        FrameShape::Compressed => {
            let decoded = decode_cel_rle(data, false)?.pixels;
            if decoded.len() != LEVEL_FRAME_PIXELS {
                debug!(
                    "Compressed level frame decoded to {} bytes, expected {}",
                    decoded.len(),
                    LEVEL_FRAME_PIXELS
                );
            }
            decoded
        }
        FrameShape::LeftLow | FrameShape::RightLow => {
            let input = data.get(..LOW_WEDGE_SIZE).ok_or_else(|| short_frame(shape, data.len()))?;
            build_wedge(input, &low_wedge_schedule(), shape.is_left())
        }
        FrameShape::LeftHigh | FrameShape::RightHigh => {
            let input = data.get(..HIGH_WEDGE_SIZE).ok_or_else(|| short_frame(shape, data.len()))?;
            build_wedge(input, &high_wedge_schedule(), shape.is_left())
        }
    };

    Ok(IndexedBitmap::from_parts(
        palette,
        LEVEL_FRAME_DIM,
        LEVEL_FRAME_DIM,
        pixels,
    ))
}

fn short_frame(shape: FrameShape, len: usize) -> AssetError {
    AssetError::Format(format!("{:?} level frame truncated to {} bytes", shape, len))
}

/// Bytes consumed per line (bottom line first) for the lower half of every wedge:
/// 4, 4, 8, 8, ... 32, 32
fn lower_half_schedule() -> impl Iterator<Item = usize> {
    (0..LEVEL_FRAME_DIM / 2).map(|line| 4 * (line / 2 + 1))
}

/// Triangle: widens to 32 then narrows back to 4, leaving the top line empty
pub fn low_wedge_schedule() -> Vec<usize> {
    let upper = (1..LEVEL_FRAME_DIM / 2).map(|k| LEVEL_FRAME_DIM - 4 * (k / 2));
    lower_half_schedule()
        .chain(upper)
        .chain(std::iter::once(0))
        .collect()
}

/// Trapezoid: widens to 32 and stays there
pub fn high_wedge_schedule() -> Vec<usize> {
    lower_half_schedule()
        .chain(std::iter::repeat(LEVEL_FRAME_DIM).take(LEVEL_FRAME_DIM / 2))
        .collect()
}

/// Lays out one run per line. Left wedges hug the right edge of the frame, right wedges the
/// left edge. Zero bytes are padding and become transparent.
fn build_wedge(input: &[u8], schedule: &[usize], left: bool) -> Vec<u8> {
    let mut pixels = Vec::with_capacity(LEVEL_FRAME_PIXELS);
    let mut pos = 0;

    for &run in schedule {
        let padding = LEVEL_FRAME_DIM - run;
        let data = input[pos..pos + run].iter().map(|&b| {
            if b == 0 {
                TRANSPARENT_INDEX
            } else {
                b
            }
        });
        pos += run;

        if left {
            pixels.extend(std::iter::repeat(TRANSPARENT_INDEX).take(padding));
            pixels.extend(data);
        } else {
            pixels.extend(data);
            pixels.extend(std::iter::repeat(TRANSPARENT_INDEX).take(padding));
        }
    }

    pixels
}
