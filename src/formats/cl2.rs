//! # CL2 sprite containers
//!
//! Player and monster animations. A file holds either one group of frames or a table of
//! groups (one per facing direction), each group being its own little container:
//!
//! ```text
//! [u32 group offsets x8]            (grouped files only)
//! group: [u32 frame count][u32 frame end offsets x count+1][frame data...]
//! ```
//!
//! Frame offsets are relative to the start of their group. Each frame starts with a 10 byte
//! header of u16 offsets to 32-row blocks; the RLE stream follows it. Widths are not stored
//! anywhere, so they are recovered from the size of the first block.

use std::{io::Cursor, iter, ops::Range, sync::Arc};

use log::debug;

use crate::{
    binary_utils::{read_u32_le, seek_to, u16_at, u32_at},
    error::{AssetError, AssetResult},
    formats::{read_frame, FrameCache},
    graphics::{
        bitmap::{IndexedBitmap, TRANSPARENT_INDEX},
        palette::Palette,
    },
};

pub const CL2_FRAME_HEADER_SIZE: usize = 10;
/// Rows covered by the first block addressed in the frame header
pub const CL2_BLOCK_ROWS: usize = 32;
const GROUP_TABLE_ENTRIES: usize = 8;

pub struct Cl2File {
    frames: Vec<Vec<u8>>,
    groups: Vec<Range<usize>>,
    width: Option<usize>,
    palette: Arc<Palette>,
    cache: FrameCache,
}

impl Cl2File {
    pub fn from_bytes(data: &[u8], palette: Arc<Palette>) -> AssetResult<Self> {
        Self::with_width(data, palette, None)
    }

    /// Parses the container. A known `width` skips width inference for every frame.
    pub fn with_width(
        data: &[u8],
        palette: Arc<Palette>,
        width: Option<usize>,
    ) -> AssetResult<Self> {
        let group_offsets = read_group_offsets(data)?;

        let mut cursor = Cursor::new(data);
        let mut frames = Vec::new();
        let mut groups = Vec::with_capacity(group_offsets.len());

        for (group_idx, &group_start) in group_offsets.iter().enumerate() {
            let group_start = group_start as usize;
            seek_to(&mut cursor, group_start as u64)?;
            let count = read_u32_le(&mut cursor)? as usize;

            let table_end = (count + 1)
                .checked_mul(4)
                .and_then(|len| len.checked_add(group_start + 4));
            if table_end.map_or(true, |end| end > data.len()) {
                return Err(AssetError::Format(format!(
                    "group {} claims {} frames, more than the file can hold",
                    group_idx, count
                )));
            }

            let mut ends = Vec::with_capacity(count + 1);
            for _ in 0..=count {
                ends.push(group_start + read_u32_le(&mut cursor)? as usize);
            }

            let first = frames.len();
            for pair in ends.windows(2) {
                let frame = read_frame(&mut cursor, pair[0], pair[1], frames.len())?;
                frames.push(frame);
            }
            groups.push(first..frames.len());
        }

        debug!(
            "CL2: {} groups, {} frames",
            groups.len(),
            frames.len()
        );

        let cache = FrameCache::new(frames.len());
        Ok(Cl2File {
            frames,
            groups,
            width,
            palette,
            cache,
        })
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn group_len(&self, group: usize) -> AssetResult<usize> {
        self.groups
            .get(group)
            .map(|range| range.len())
            .ok_or_else(|| group_error(group, self.groups.len()))
    }

    /// Raw (still compressed) bytes of a frame
    pub fn encoded_frame(&self, index: usize) -> Option<&[u8]> {
        self.frames.get(index).map(Vec::as_slice)
    }

    /// Decodes a frame by flat index, caching the result
    pub fn frame(&self, index: usize) -> AssetResult<Arc<IndexedBitmap>> {
        let encoded = self.frames.get(index).ok_or_else(|| {
            AssetError::Index(format!(
                "frame {} out of range ({} frames)",
                index,
                self.frames.len()
            ))
        })?;
        self.cache.get_or_decode(index, || {
            decode_cl2_frame(encoded, self.palette.clone(), self.width)
        })
    }

    /// Decodes frame `sub` of `group`
    pub fn group_frame(&self, group: usize, sub: usize) -> AssetResult<Arc<IndexedBitmap>> {
        let range = self
            .groups
            .get(group)
            .ok_or_else(|| group_error(group, self.groups.len()))?;
        if sub >= range.len() {
            return Err(AssetError::Index(format!(
                "frame {} out of range for group {} ({} frames)",
                sub,
                group,
                range.len()
            )));
        }
        self.frame(range.start + sub)
    }

    pub fn all_frames(&self) -> AssetResult<Vec<Arc<IndexedBitmap>>> {
        (0..self.frames.len()).map(|i| self.frame(i)).collect()
    }
}

fn group_error(group: usize, count: usize) -> AssetError {
    AssetError::Index(format!("group {} out of range ({} groups)", group, count))
}

/// Start offsets of every group. Grouped files begin with evenly spaced group offsets; anything
/// else is a single group at offset 0.
fn read_group_offsets(data: &[u8]) -> AssetResult<Vec<u32>> {
    if data.len() < GROUP_TABLE_ENTRIES * 4 {
        return Ok(vec![0]);
    }

    let mut table = [0i64; GROUP_TABLE_ENTRIES];
    for (i, entry) in table.iter_mut().enumerate() {
        *entry = u32_at(data, i * 4).unwrap_or(0) as i64;
    }

    if table[1] - table[0] != table[2] - table[1] {
        return Ok(vec![0]);
    }

    let group_count = table[0] as usize / 4;
    if group_count == 0 {
        return Err(AssetError::Format("empty CL2 group table".to_string()));
    }

    (0..group_count)
        .map(|i| {
            u32_at(data, i * 4).ok_or_else(|| {
                AssetError::Format(format!("group table entry {} past end of file", i))
            })
        })
        .collect()
}

/// RLE scheme A.
///
/// - `0x00..=0x7F`: that many transparent pixels
/// - `0x81..=0xBE`: `0xBF - code` copies of the next byte
/// - `0xBF..=0xFF`: `0x100 - code` literal bytes
///
/// `0x80` is consumed without producing output.
pub fn decode_cl2_rle(data: &[u8]) -> AssetResult<Vec<u8>> {
    let mut out = Vec::with_capacity(data.len() * 2);
    let mut pos = 0;

    while pos < data.len() {
        let code = data[pos];
        pos += 1;

        match code {
            0x00..=0x7F => out.extend(iter::repeat(TRANSPARENT_INDEX).take(code as usize)),
            0x80 => {}
            0x81..=0xBE => {
                let value = *data.get(pos).ok_or_else(|| truncated_run(pos))?;
                pos += 1;
                out.extend(iter::repeat(value).take((0xBF - code) as usize));
            }
            0xBF..=0xFF => {
                let len = 0x100 - code as usize;
                let run = data.get(pos..pos + len).ok_or_else(|| truncated_run(pos))?;
                out.extend_from_slice(run);
                pos += len;
            }
        }
    }

    Ok(out)
}

fn truncated_run(pos: usize) -> AssetError {
    AssetError::Format(format!("RLE run at byte {} runs past end of frame", pos))
}

/// Decodes one frame (header included)
pub fn decode_cl2_frame(
    frame: &[u8],
    palette: Arc<Palette>,
    width: Option<usize>,
) -> AssetResult<IndexedBitmap> {
    if frame.len() < CL2_FRAME_HEADER_SIZE {
        return Err(AssetError::Format(format!(
            "CL2 frame of {} bytes is shorter than its header",
            frame.len()
        )));
    }

    let width = match width {
        Some(width) => width,
        None => infer_cl2_width(frame)?,
    };

    let pixels = decode_cl2_rle(&frame[CL2_FRAME_HEADER_SIZE..])?;
    let mut bitmap = IndexedBitmap::from_raw(palette, pixels);
    bitmap.set_width(width)?;
    Ok(bitmap)
}

/// Width from the decoded size of the first 32-row block
pub fn infer_cl2_width(frame: &[u8]) -> AssetResult<usize> {
    let block_end = u16_at(frame, 2).map(usize::from);
    let block = match block_end {
        Some(end) if end >= CL2_FRAME_HEADER_SIZE && end <= frame.len() => {
            &frame[CL2_FRAME_HEADER_SIZE..end]
        }
        _ => return Err(AssetError::Decode("no width found".to_string())),
    };

    let width = decode_cl2_rle(block)?.len() / CL2_BLOCK_ROWS;
    if width == 0 {
        return Err(AssetError::Decode("no width found".to_string()));
    }
    Ok(width)
}
