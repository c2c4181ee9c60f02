//! # Tile definitions (TIL)
//!
//! A map tile is a diamond of four squares, stored as four u16 square references in the order
//! top, right, left, bottom. Map files address tiles starting at 1; id 0 is the empty tile, so
//! the table keeps a blank entry in slot 0.

use serde::Serialize;

use crate::error::{AssetError, AssetResult};
use crate::binary_utils::u16_words;

pub const SQUARES_PER_TILE: usize = 4;
const TILE_RECORD_SIZE: usize = SQUARES_PER_TILE * 2;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TileDefinition {
    pub top: u16,
    pub right: u16,
    pub left: u16,
    pub bottom: u16,
}

impl TileDefinition {
    pub fn squares(&self) -> [u16; SQUARES_PER_TILE] {
        [self.top, self.right, self.left, self.bottom]
    }

    /// 0-based square indices; `None` where the reference is 0
    pub fn square_indices(&self) -> [Option<usize>; SQUARES_PER_TILE] {
        self.squares()
            .map(|square| (square != 0).then(|| square as usize - 1))
    }

    pub fn is_empty(&self) -> bool {
        self.squares().iter().all(|&s| s == 0)
    }
}

pub struct TileDefinitions {
    tiles: Vec<TileDefinition>,
}

impl TileDefinitions {
    pub fn from_bytes(data: &[u8]) -> AssetResult<Self> {
        if data.len() % TILE_RECORD_SIZE != 0 {
            return Err(AssetError::Format(format!(
                "TIL data length {} not divisible by {}",
                data.len(),
                TILE_RECORD_SIZE
            )));
        }

        let mut tiles = vec![TileDefinition::default()];
        tiles.extend(
            u16_words(data)
                .chunks_exact(SQUARES_PER_TILE)
                .map(|quad| TileDefinition {
                    top: quad[0],
                    right: quad[1],
                    left: quad[2],
                    bottom: quad[3],
                }),
        );

        Ok(TileDefinitions { tiles })
    }

    /// Number of entries including the reserved empty tile
    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.len() <= 1
    }

    pub fn get(&self, tile_id: u16) -> AssetResult<TileDefinition> {
        self.tiles.get(tile_id as usize).copied().ok_or_else(|| {
            AssetError::Index(format!(
                "tile {} out of range ({} tiles)",
                tile_id,
                self.tiles.len() - 1
            ))
        })
    }
}
