//! # CEL image containers
//!
//! Flat containers of independently compressed frames, used for UI art, items and objects:
//!
//! ```text
//! [u32 frame count][u32 absolute frame offsets x count+1][frame data...]
//! ```
//!
//! Frames may carry the same 10 byte block header as CL2 frames. As with CL2, widths are not
//! stored, so they are reconstructed from the shape of the RLE stream.

use std::{io::Cursor, iter, sync::Arc};

use log::debug;

use crate::{
    binary_utils::{read_u32_le, u16_at},
    error::{AssetError, AssetResult},
    formats::{read_frame, FrameCache},
    graphics::{
        bitmap::{IndexedBitmap, TRANSPARENT_INDEX},
        palette::Palette,
    },
};

pub const CEL_FRAME_HEADER_SIZE: usize = 10;
pub const CEL_BLOCK_ROWS: usize = 32;

const MAX_LITERAL_RUN: usize = 127;
const MAX_TRANSPARENT_RUN: usize = 128;
const MAX_LINE_BREAKS: usize = 10;
const MAX_INFERRED_WIDTH: usize = 1023;

/// Splits a flat container into its encoded frames
pub fn parse_cel_container(data: &[u8]) -> AssetResult<Vec<Vec<u8>>> {
    let mut cursor = Cursor::new(data);
    let count = read_u32_le(&mut cursor)? as usize;

    let table_size = (count + 2) * 4;
    if table_size > data.len() {
        return Err(AssetError::Format(format!(
            "offset table for {} frames does not fit in {} bytes",
            count,
            data.len()
        )));
    }

    let mut offsets = Vec::with_capacity(count + 1);
    for _ in 0..=count {
        offsets.push(read_u32_le(&mut cursor)? as usize);
    }

    if offsets[0] != table_size {
        return Err(AssetError::Format(
            "ungrouped container not supported".to_string(),
        ));
    }

    offsets
        .windows(2)
        .enumerate()
        .map(|(i, pair)| read_frame(&mut cursor, pair[0], pair[1], i))
        .collect()
}

pub struct CelFile {
    frames: Vec<Vec<u8>>,
    width: Option<usize>,
    palette: Arc<Palette>,
    cache: FrameCache,
}

impl CelFile {
    pub fn from_bytes(data: &[u8], palette: Arc<Palette>) -> AssetResult<Self> {
        Self::with_width(data, palette, None)
    }

    /// Parses the container. With a known `width` the width heuristics never run.
    pub fn with_width(
        data: &[u8],
        palette: Arc<Palette>,
        width: Option<usize>,
    ) -> AssetResult<Self> {
        let frames = parse_cel_container(data)?;
        debug!("CEL: {} frames", frames.len());
        let cache = FrameCache::new(frames.len());
        Ok(CelFile {
            frames,
            width,
            palette,
            cache,
        })
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn encoded_frame(&self, index: usize) -> Option<&[u8]> {
        self.frames.get(index).map(Vec::as_slice)
    }

    pub fn frame(&self, index: usize) -> AssetResult<Arc<IndexedBitmap>> {
        let encoded = self.frames.get(index).ok_or_else(|| {
            AssetError::Index(format!(
                "frame {} out of range ({} frames)",
                index,
                self.frames.len()
            ))
        })?;
        self.cache.get_or_decode(index, || {
            decode_cel_frame(encoded, self.palette.clone(), self.width)
        })
    }

    pub fn all_frames(&self) -> AssetResult<Vec<Arc<IndexedBitmap>>> {
        (0..self.frames.len()).map(|i| self.frame(i)).collect()
    }

    pub fn is_decoded(&self, index: usize) -> bool {
        self.cache.is_decoded(index)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RunKind {
    Literal,
    Transparent,
}

/// Output of one scheme B pass, with the width evidence gathered along the way
#[derive(Debug, Default)]
pub struct CelDecode {
    pub pixels: Vec<u8>,
    pub saw_transparency: bool,
    /// Output length right after the first literal run shorter than 127
    pub first_short_literal: Option<usize>,
    /// Output offsets where two unmaxed runs of the same kind meet
    pub line_breaks: Vec<usize>,
    pub longest_run: usize,
}

/// RLE scheme B.
///
/// - `0x00..=0x7F`: that many literal bytes follow
/// - `0x80`: 128 transparent pixels
/// - `0x81..=0xFF`: `256 - code` transparent pixels
///
/// When `track_width` is false only `pixels` is filled in.
pub fn decode_cel_rle(data: &[u8], track_width: bool) -> AssetResult<CelDecode> {
    let mut result = CelDecode {
        pixels: Vec::with_capacity(data.len() * 2),
        ..CelDecode::default()
    };
    let mut previous: Option<(RunKind, bool)> = None;
    let mut pos = 0;

    while pos < data.len() {
        let code = data[pos];
        let (kind, len) = if code < 0x80 {
            (RunKind::Literal, code as usize)
        } else {
            (RunKind::Transparent, 0x100 - code as usize)
        };

        if track_width {
            if let Some((prev_kind, prev_maxed)) = previous {
                if prev_kind == kind
                    && !prev_maxed
                    && result.line_breaks.len() < MAX_LINE_BREAKS
                {
                    result.line_breaks.push(result.pixels.len());
                }
            }
            result.longest_run = result.longest_run.max(len);
        }

        match kind {
            RunKind::Literal => {
                let run = data.get(pos + 1..pos + 1 + len).ok_or_else(|| {
                    AssetError::Format(format!(
                        "literal run at byte {} runs past end of frame",
                        pos
                    ))
                })?;
                result.pixels.extend_from_slice(run);
                pos += len + 1;

                if track_width
                    && result.first_short_literal.is_none()
                    && len < MAX_LITERAL_RUN
                    && !result.pixels.is_empty()
                {
                    result.first_short_literal = Some(result.pixels.len());
                }
                previous = Some((kind, len == MAX_LITERAL_RUN));
            }
            RunKind::Transparent => {
                result
                    .pixels
                    .extend(iter::repeat(TRANSPARENT_INDEX).take(len));
                result.saw_transparency = true;
                pos += 1;
                previous = Some((kind, len == MAX_TRANSPARENT_RUN));
            }
        }
    }

    Ok(result)
}

/// Smallest width in `min_width..=1023` that divides every candidate line break
pub fn infer_line_width(candidates: &[usize], min_width: usize) -> Option<usize> {
    (min_width.max(1)..=MAX_INFERRED_WIDTH)
        .find(|&width| candidates.iter().all(|&offset| offset % width == 0))
}

/// Where the RLE stream starts: frames whose first u16 is 10 carry a block header
pub fn rle_start(frame: &[u8]) -> usize {
    if frame.len() >= CEL_FRAME_HEADER_SIZE
        && u16_at(frame, 0) == Some(CEL_FRAME_HEADER_SIZE as u16)
    {
        CEL_FRAME_HEADER_SIZE
    } else {
        0
    }
}

/// Width from the first 32-row block, for frames that have a header
fn header_block_width(frame: &[u8]) -> AssetResult<Option<usize>> {
    if rle_start(frame) != CEL_FRAME_HEADER_SIZE {
        return Ok(None);
    }
    let block_end = match u16_at(frame, 2).map(usize::from) {
        Some(end) if end >= CEL_FRAME_HEADER_SIZE && end <= frame.len() => end,
        _ => return Ok(None),
    };
    let block = decode_cel_rle(&frame[CEL_FRAME_HEADER_SIZE..block_end], false)?;
    let width = block.pixels.len() / CEL_BLOCK_ROWS;
    Ok((width > 0).then_some(width))
}

fn resolve_width(frame: &[u8], decoded: &CelDecode) -> AssetResult<usize> {
    if !decoded.saw_transparency {
        if let Some(width) = decoded.first_short_literal {
            return Ok(width);
        }
    }

    if decoded.line_breaks.len() >= 2 {
        if let Some(width) = infer_line_width(&decoded.line_breaks, decoded.longest_run) {
            return Ok(width);
        }
    }

    header_block_width(frame)?.ok_or_else(|| AssetError::Decode("no width found".to_string()))
}

pub fn decode_cel_frame(
    frame: &[u8],
    palette: Arc<Palette>,
    width: Option<usize>,
) -> AssetResult<IndexedBitmap> {
    let decoded = decode_cel_rle(&frame[rle_start(frame)..], width.is_none())?;
    let width = match width {
        Some(width) => width,
        None => resolve_width(frame, &decoded)?,
    };

    let mut bitmap = IndexedBitmap::from_raw(palette, decoded.pixels);
    bitmap.set_width(width)?;
    Ok(bitmap)
}
