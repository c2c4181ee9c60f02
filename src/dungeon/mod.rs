//! # Level composition
//!
//! Ties the four level tables to a level CEL:
//!
//! - `sol`: passability flags per square
//! - `min`: which CEL frames (and shapes) stack up into each square
//! - `til`: which four squares make up each map tile
//! - `dun`: rectangles of tile ids, pasted together into a level map
//!
//! [`Level::new`] pushes the shape recorded in the square table onto every CEL frame it
//! references, so frames decode correctly the first time they are requested.

pub mod dun;
pub mod min;
pub mod sol;
pub mod til;

use std::sync::Arc;

use log::debug;
use serde::Serialize;

use crate::{
    error::{AssetError, AssetResult},
    formats::level_cel::{LevelCelFile, LEVEL_FRAME_DIM},
    graphics::bitmap::{IndexedBitmap, TRANSPARENT_INDEX},
};

use self::{
    dun::{CompositeMap, MapRegion},
    min::{SquareDefinitions, MAX_FRAMES_PER_SQUARE},
    sol::{SquareAttributes, BLOCKS_MISSILE_BIT, BLOCKS_SIGHT_BIT, PASSABLE_BIT},
    til::{TileDefinition, TileDefinitions, SQUARES_PER_TILE},
};

/// Frames per row of a rendered square
pub const SQUARE_COLUMNS: usize = 2;
pub const SQUARE_BITMAP_WIDTH: usize = SQUARE_COLUMNS * LEVEL_FRAME_DIM;
pub const SQUARE_BITMAP_HEIGHT: usize = MAX_FRAMES_PER_SQUARE / SQUARE_COLUMNS * LEVEL_FRAME_DIM;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Square {
    /// Frame ids, right-aligned so the last slot of every square lands in slot 15
    pub frames: [u16; MAX_FRAMES_PER_SQUARE],
    pub passable_player: bool,
    pub passable_sight: bool,
    pub passable_missile: bool,
}

pub struct Level {
    attributes: SquareAttributes,
    squares: SquareDefinitions,
    tiles: TileDefinitions,
    cel: LevelCelFile,
}

impl Level {
    pub fn new(sol: &[u8], min: &[u8], til: &[u8], mut cel: LevelCelFile) -> AssetResult<Self> {
        let attributes = SquareAttributes::from_bytes(sol);
        let squares = SquareDefinitions::from_bytes(min, attributes.len())?;
        let tiles = TileDefinitions::from_bytes(til)?;

        let mut tagged = 0usize;
        for slots in squares.iter() {
            for slot in slots {
                if let Some(frame) = slot.frame_index() {
                    cel.set_shape(frame, slot.frame_shape())?;
                    tagged += 1;
                }
            }
        }

        debug!(
            "Level: {} squares x {} slots, {} tiles, {} frame references",
            squares.len(),
            squares.frames_per_square(),
            tiles.len() - 1,
            tagged
        );

        Ok(Level {
            attributes,
            squares,
            tiles,
            cel,
        })
    }

    pub fn square_count(&self) -> usize {
        self.squares.len()
    }

    pub fn frames_per_square(&self) -> usize {
        self.squares.frames_per_square()
    }

    /// Number of tile definitions, not counting the reserved empty tile
    pub fn tile_count(&self) -> usize {
        self.tiles.len() - 1
    }

    pub fn frames(&self) -> &LevelCelFile {
        &self.cel
    }

    pub fn square(&self, index: usize) -> AssetResult<Square> {
        let (slots, attr) = self
            .squares
            .get(index)
            .zip(self.attributes.raw(index))
            .ok_or_else(|| {
                AssetError::Index(format!(
                    "square {} out of range ({} squares)",
                    index,
                    self.squares.len()
                ))
            })?;

        let mut frames = [0u16; MAX_FRAMES_PER_SQUARE];
        let start = MAX_FRAMES_PER_SQUARE - slots.len();
        for (dst, slot) in frames[start..].iter_mut().zip(slots) {
            *dst = slot.frame_id;
        }

        Ok(Square {
            frames,
            passable_player: attr & PASSABLE_BIT == 0,
            passable_sight: attr & BLOCKS_SIGHT_BIT == 0,
            passable_missile: attr & BLOCKS_MISSILE_BIT == 0,
        })
    }

    pub fn tile(&self, tile_id: u16) -> AssetResult<TileDefinition> {
        self.tiles.get(tile_id)
    }

    /// 0-based square indices of a tile, checked against the square table
    pub fn tile_square_ids(&self, tile_id: u16) -> AssetResult<[Option<usize>; SQUARES_PER_TILE]> {
        let ids = self.tile(tile_id)?.square_indices();
        for square in ids.iter().flatten() {
            if *square >= self.squares.len() {
                return Err(AssetError::Index(format!(
                    "tile {} references square {} ({} squares)",
                    tile_id,
                    square + 1,
                    self.squares.len()
                )));
            }
        }
        Ok(ids)
    }

    /// Pastes regions at their tile offsets onto a square map sized for their combined area
    pub fn compose(&self, placements: &[(MapRegion, usize, usize)]) -> CompositeMap {
        let regions: Vec<&MapRegion> = placements.iter().map(|(r, _, _)| r).collect();
        let mut map = CompositeMap::square_for(&regions);
        for (region, x, y) in placements {
            map.paste(region, *x, *y);
        }
        map
    }

    /// Stacks a square's frames two per row, slot 0 at the top left. Empty slots stay
    /// transparent.
    pub fn square_bitmap(&self, index: usize) -> AssetResult<IndexedBitmap> {
        let square = self.square(index)?;
        let mut bitmap = IndexedBitmap::from_parts(
            Arc::clone(self.cel.palette()),
            SQUARE_BITMAP_WIDTH,
            SQUARE_BITMAP_HEIGHT,
            vec![TRANSPARENT_INDEX; SQUARE_BITMAP_WIDTH * SQUARE_BITMAP_HEIGHT],
        );

        for (slot, &frame_id) in square.frames.iter().enumerate() {
            if frame_id == 0 {
                continue;
            }
            let frame = self.cel.frame(frame_id as usize - 1)?;
            bitmap.paste(
                &frame,
                (slot % SQUARE_COLUMNS) * LEVEL_FRAME_DIM,
                (slot / SQUARE_COLUMNS) * LEVEL_FRAME_DIM,
            )?;
        }

        Ok(bitmap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        formats::level_cel::{FrameShape, LEVEL_FRAME_PIXELS, LOW_WEDGE_SIZE},
        graphics::palette::Palette,
    };

    fn words(values: &[u16]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    fn container(frames: &[Vec<u8>]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&(frames.len() as u32).to_le_bytes());
        let mut offset = (frames.len() + 2) * 4;
        out.extend_from_slice(&(offset as u32).to_le_bytes());
        for f in frames {
            offset += f.len();
            out.extend_from_slice(&(offset as u32).to_le_bytes());
        }
        for f in frames {
            out.extend_from_slice(f);
        }
        out
    }

    /// Two frames: a raw 32x32 block of 5s and a left-low wedge of 9s
    fn level_cel() -> LevelCelFile {
        let data = container(&[vec![5u8; LEVEL_FRAME_PIXELS], vec![9u8; LOW_WEDGE_SIZE]]);
        LevelCelFile::from_bytes(&data, Palette::default_palette()).unwrap()
    }

    /// Two squares of two slots: square 0 = raw frame 1 over left-low frame 2, square 1 empty
    fn level(sol: &[u8]) -> Level {
        let min = words(&[1, 2 * 4096 + 2, 0, 0]);
        let til = words(&[1, 2, 0, 1]);
        Level::new(sol, &min, &til, level_cel()).unwrap()
    }

    #[test]
    fn cross_reference_tags_frame_shapes() {
        let level = level(&[0, 0]);
        assert_eq!(level.frames().shape(0), Some(FrameShape::Raw));
        assert_eq!(level.frames().shape(1), Some(FrameShape::LeftLow));
        assert_eq!(level.frames_per_square(), 2);
        assert_eq!(level.tile_count(), 1);
    }

    #[test]
    fn frames_are_right_aligned() {
        let square = level(&[0, 0]).square(0).unwrap();
        let mut expected = [0u16; MAX_FRAMES_PER_SQUARE];
        expected[14] = 1;
        expected[15] = 2;
        assert_eq!(square.frames, expected);
    }

    #[test]
    fn passability_bits_are_inverted() {
        let level = level(&[0b001, 0b110]);

        let blocked = level.square(0).unwrap();
        assert!(!blocked.passable_player);
        assert!(blocked.passable_sight);
        assert!(blocked.passable_missile);

        let open = level.square(1).unwrap();
        assert!(open.passable_player);
        assert!(!open.passable_sight);
        assert!(!open.passable_missile);

        assert!(matches!(level.square(2), Err(AssetError::Index(_))));
    }

    #[test]
    fn frame_ids_past_the_cel_are_rejected() {
        let min = words(&[3, 0]);
        assert!(matches!(
            Level::new(&[0], &min, &[], level_cel()),
            Err(AssetError::Index(_))
        ));
    }

    #[test]
    fn tile_squares_are_one_based() {
        let level = level(&[0, 0]);
        assert_eq!(level.tile(1).unwrap().squares(), [1, 2, 0, 1]);
        assert_eq!(
            level.tile_square_ids(1).unwrap(),
            [Some(0), Some(1), None, Some(0)]
        );
        assert!(level.tile(0).unwrap().is_empty());
        assert!(level.tile(2).is_err());
    }

    #[test]
    fn square_bitmap_stacks_frames_in_two_columns() {
        let bitmap = level(&[0, 0]).square_bitmap(0).unwrap();
        assert_eq!(
            (bitmap.width(), bitmap.height()),
            (SQUARE_BITMAP_WIDTH, SQUARE_BITMAP_HEIGHT)
        );

        // Slot 14 (frame 1) sits at column 0 of the bottom row, slot 15 (frame 2) next to it
        assert_eq!(bitmap.pixel(0, 224).unwrap(), 5);
        assert_eq!(bitmap.pixel(31, 255).unwrap(), 5);
        assert_eq!(bitmap.pixel(63, 255).unwrap(), 9);
        assert_eq!(bitmap.pixel(32, 255).unwrap(), TRANSPARENT_INDEX);
        assert_eq!(bitmap.pixel(0, 0).unwrap(), TRANSPARENT_INDEX);
    }

    #[test]
    fn compose_builds_a_square_map() {
        let region = |tiles: &[u16]| MapRegion {
            width: 2,
            height: 2,
            tiles: tiles.to_vec(),
        };
        let level = level(&[0, 0]);
        let map = level.compose(&[
            (region(&[1, 1, 1, 1]), 0, 0),
            (region(&[2, 2, 2, 2]), 2, 0),
            (region(&[3, 3, 3, 3]), 0, 2),
            (region(&[4, 4, 4, 4]), 2, 2),
        ]);
        assert_eq!((map.width(), map.height()), (4, 4));
        assert_eq!(map.cell(3, 3), Some(4));
        assert_eq!(map.cell(1, 2), Some(3));
    }
}
