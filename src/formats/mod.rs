//! Compressed frame containers
//!
//! - `cl2`: grouped, directional sprite containers (RLE scheme A)
//! - `cel`: flat single-image containers (RLE scheme B)
//! - `level_cel`: level tile containers whose frames carry a shape tag

pub mod cel;
pub mod cl2;
pub mod level_cel;

use std::{
    io::Cursor,
    sync::{Arc, OnceLock},
};

use crate::{
    binary_utils::{read_bytes, seek_to},
    error::{AssetError, AssetResult},
    graphics::bitmap::IndexedBitmap,
};

/// One lazily filled slot per frame. Each frame is decoded at most once and every caller gets
/// the same `Arc`.
pub struct FrameCache {
    slots: Vec<OnceLock<Arc<IndexedBitmap>>>,
}

impl FrameCache {
    pub fn new(len: usize) -> Self {
        FrameCache {
            slots: (0..len).map(|_| OnceLock::new()).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn get_or_decode<F>(&self, index: usize, decode: F) -> AssetResult<Arc<IndexedBitmap>>
    where
        F: FnOnce() -> AssetResult<IndexedBitmap>,
    {
        let slot = self.slots.get(index).ok_or_else(|| {
            AssetError::Index(format!(
                "frame {} out of range ({} frames)",
                index,
                self.slots.len()
            ))
        })?;

        if let Some(bitmap) = slot.get() {
            return Ok(bitmap.clone());
        }

        let decoded = Arc::new(decode()?);
        // A concurrent decode may have won the race; hand out whichever value was stored
        Ok(slot.get_or_init(|| decoded).clone())
    }

    /// Forgets a decoded frame so the next access decodes it again
    pub fn invalidate(&mut self, index: usize) {
        if let Some(slot) = self.slots.get_mut(index) {
            slot.take();
        }
    }

    pub fn is_decoded(&self, index: usize) -> bool {
        self.slots.get(index).is_some_and(|slot| slot.get().is_some())
    }
}

/// Copies the bytes `[start, end)` out of the container, or fails with a format error naming
/// the frame
pub(crate) fn read_frame(
    cursor: &mut Cursor<&[u8]>,
    start: usize,
    end: usize,
    frame: usize,
) -> AssetResult<Vec<u8>> {
    let len = cursor.get_ref().len();
    if start > end || end > len {
        return Err(AssetError::Format(format!(
            "frame {} spans {}..{} outside {} byte container",
            frame, start, end, len
        )));
    }
    seek_to(cursor, start as u64)?;
    Ok(read_bytes(cursor, end - start)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphics::palette::Palette;

    #[test]
    fn decodes_each_slot_once() {
        let cache = FrameCache::new(2);
        let mut calls = 0;
        let first = cache
            .get_or_decode(1, || {
                calls += 1;
                Ok(IndexedBitmap::new(Palette::default_palette(), 1, 1))
            })
            .unwrap();
        let second = cache
            .get_or_decode(1, || -> AssetResult<IndexedBitmap> {
                panic!("frame decoded twice")
            })
            .unwrap();

        assert_eq!(calls, 1);
        assert!(Arc::ptr_eq(&first, &second));
        assert!(cache.is_decoded(1));
        assert!(!cache.is_decoded(0));
    }

    #[test]
    fn failed_decodes_are_not_cached() {
        let cache = FrameCache::new(1);
        let err = cache.get_or_decode(0, || Err(AssetError::Decode("no width found".into())));
        assert!(err.is_err());
        assert!(!cache.is_decoded(0));
    }

    #[test]
    fn invalidate_clears_a_slot() {
        let mut cache = FrameCache::new(1);
        cache
            .get_or_decode(0, || Ok(IndexedBitmap::new(Palette::default_palette(), 1, 1)))
            .unwrap();
        cache.invalidate(0);
        assert!(!cache.is_decoded(0));
    }

    #[test]
    fn out_of_range_slot_is_an_index_error() {
        let cache = FrameCache::new(0);
        assert!(matches!(
            cache.get_or_decode(0, || Ok(IndexedBitmap::new(Palette::default_palette(), 1, 1))),
            Err(AssetError::Index(_))
        ));
    }

    #[test]
    fn read_frame_rejects_reversed_ranges() {
        let data: &[u8] = &[0, 1, 2, 3, 4, 5, 6, 7];
        let mut cursor = Cursor::new(data);
        assert_eq!(read_frame(&mut cursor, 2, 4, 0).unwrap(), vec![2, 3]);
        assert!(matches!(
            read_frame(&mut cursor, 4, 2, 0),
            Err(AssetError::Format(_))
        ));
        assert!(matches!(
            read_frame(&mut cursor, 4, 9, 0),
            Err(AssetError::Format(_))
        ));
    }
}
