//! # Square definitions (MIN)
//!
//! Each square is a column of level CEL frames. Every slot is one u16: the low 12 bits are a
//! 1-based frame id (0 = empty slot) and the high 4 bits the shape used to decode that frame.
//! The slot count is not stored; it follows from the file size and the number of squares.

use crate::{
    binary_utils::u16_words,
    error::{AssetError, AssetResult},
    formats::level_cel::FrameShape,
};

pub const MAX_FRAMES_PER_SQUARE: usize = 16;
const FRAME_ID_MODULUS: u16 = 4096;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameRef {
    /// 1-based index into the level CEL, 0 when the slot is empty
    pub frame_id: u16,
    pub shape: u16,
}

impl FrameRef {
    pub fn from_word(word: u16) -> Self {
        FrameRef {
            frame_id: word % FRAME_ID_MODULUS,
            shape: word / FRAME_ID_MODULUS,
        }
    }

    /// 0-based CEL frame index, if the slot is used
    pub fn frame_index(&self) -> Option<usize> {
        (self.frame_id != 0).then(|| self.frame_id as usize - 1)
    }

    pub fn frame_shape(&self) -> FrameShape {
        FrameShape::from_raw(self.shape)
    }
}

pub struct SquareDefinitions {
    frames_per_square: usize,
    squares: Vec<Vec<FrameRef>>,
}

impl SquareDefinitions {
    pub fn from_bytes(data: &[u8], square_count: usize) -> AssetResult<Self> {
        if square_count == 0 {
            return Err(AssetError::Format(
                "square definitions need at least one square".to_string(),
            ));
        }

        let frames_per_square = data.len() / square_count / 2;
        if frames_per_square == 0 || frames_per_square > MAX_FRAMES_PER_SQUARE {
            return Err(AssetError::Format(format!(
                "{} bytes for {} squares gives {} frames per square",
                data.len(),
                square_count,
                frames_per_square
            )));
        }

        let squares = u16_words(data)
            .chunks_exact(frames_per_square)
            .take(square_count)
            .map(|words| words.iter().map(|&w| FrameRef::from_word(w)).collect())
            .collect();

        Ok(SquareDefinitions {
            frames_per_square,
            squares,
        })
    }

    pub fn frames_per_square(&self) -> usize {
        self.frames_per_square
    }

    pub fn len(&self) -> usize {
        self.squares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.squares.is_empty()
    }

    pub fn get(&self, square: usize) -> Option<&[FrameRef]> {
        self.squares.get(square).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = &[FrameRef]> {
        self.squares.iter().map(Vec::as_slice)
    }
}
