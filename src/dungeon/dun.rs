//! # Map regions (DUN)
//!
//! A region is a rectangle of tile ids: u16 width, u16 height, then `width * height` u16 ids in
//! row-major order. Some regions carry further layers after the tile grid; those are ignored.
//! Regions are pasted onto a [`CompositeMap`] to build a whole level.

use std::io::Cursor;

use log::debug;
use serde::Serialize;

use crate::{
    binary_utils::read_u16_le,
    error::{AssetError, AssetResult},
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MapRegion {
    pub width: usize,
    pub height: usize,
    pub tiles: Vec<u16>,
}

impl MapRegion {
    pub fn from_bytes(data: &[u8]) -> AssetResult<Self> {
        let mut cursor = Cursor::new(data);
        let width = read_u16_le(&mut cursor)? as usize;
        let height = read_u16_le(&mut cursor)? as usize;

        let expected = 4 + width * height * 2;
        if data.len() < expected {
            return Err(AssetError::Format(format!(
                "{}x{} region needs {} bytes, found {}",
                width,
                height,
                expected,
                data.len()
            )));
        }

        let tiles = (0..width * height)
            .map(|_| read_u16_le(&mut cursor))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(MapRegion {
            width,
            height,
            tiles,
        })
    }

    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }

    pub fn cell(&self, x: usize, y: usize) -> Option<u16> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.tiles.get(y * self.width + x).copied()
    }
}

/// Tile-id grid for a whole level. Cells start out as tile 0 (empty).
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CompositeMap {
    width: usize,
    height: usize,
    cells: Vec<u16>,
}

impl CompositeMap {
    pub fn new(width: usize, height: usize) -> Self {
        CompositeMap {
            width,
            height,
            cells: vec![0; width * height],
        }
    }

    /// Square grid just large enough side-wise to hold the regions' combined tile count
    pub fn square_for(regions: &[&MapRegion]) -> Self {
        let total: usize = regions.iter().map(|r| r.tile_count()).sum();
        let side = integer_sqrt(total);
        CompositeMap::new(side, side)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn cells(&self) -> &[u16] {
        &self.cells
    }

    pub fn cell(&self, x: usize, y: usize) -> Option<u16> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.cells.get(y * self.width + x).copied()
    }

    /// Copies `region` with its top-left corner at `(tile_x, tile_y)`. Later pastes overwrite
    /// earlier ones; cells falling outside the grid are dropped.
    pub fn paste(&mut self, region: &MapRegion, tile_x: usize, tile_y: usize) {
        let mut skipped = 0usize;
        for y in 0..region.height {
            for x in 0..region.width {
                let target = tile_x
                    .checked_add(x)
                    .zip(tile_y.checked_add(y))
                    .filter(|&(dx, dy)| dx < self.width && dy < self.height);
                match (target, region.cell(x, y)) {
                    (Some((dx, dy)), Some(tile)) => self.cells[dy * self.width + dx] = tile,
                    _ => skipped += 1,
                }
            }
        }

        if skipped > 0 {
            debug!(
                "{} cells of {}x{} region at ({}, {}) fall outside the {}x{} map",
                skipped, region.width, region.height, tile_x, tile_y, self.width, self.height
            );
        }
    }
}

fn integer_sqrt(n: usize) -> usize {
    let mut root = (n as f64).sqrt() as usize;
    while root * root > n {
        root -= 1;
    }
    while (root + 1) * (root + 1) <= n {
        root += 1;
    }
    root
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region_bytes(width: u16, height: u16, tiles: &[u16]) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&width.to_le_bytes());
        data.extend_from_slice(&height.to_le_bytes());
        for t in tiles {
            data.extend_from_slice(&t.to_le_bytes());
        }
        data
    }

    #[test]
    fn parses_row_major_tiles() {
        let mut data = region_bytes(2, 2, &[1, 2, 3, 4]);
        data.extend_from_slice(&[9, 9, 9, 9]);
        let region = MapRegion::from_bytes(&data).unwrap();
        assert_eq!(region.cell(1, 0), Some(2));
        assert_eq!(region.cell(0, 1), Some(3));
        assert_eq!(region.cell(2, 0), None);
    }

    #[test]
    fn short_regions_are_format_errors() {
        assert!(matches!(
            MapRegion::from_bytes(&region_bytes(3, 3, &[1, 2])),
            Err(AssetError::Format(_))
        ));
        assert!(matches!(
            MapRegion::from_bytes(&[1, 0]),
            Err(AssetError::Format(_))
        ));
    }

    #[test]
    fn side_by_side_regions() {
        let left = MapRegion::from_bytes(&region_bytes(2, 2, &[1, 2, 3, 4])).unwrap();
        let right = MapRegion::from_bytes(&region_bytes(2, 2, &[5, 6, 7, 8])).unwrap();

        let mut map = CompositeMap::new(4, 2);
        map.paste(&left, 0, 0);
        map.paste(&right, 2, 0);

        assert_eq!(map.cell(3, 1), right.cell(1, 1));
        assert_eq!(map.cells(), &[1, 2, 5, 6, 3, 4, 7, 8]);
    }

    #[test]
    fn last_paste_wins_and_overflow_is_dropped() {
        let a = MapRegion::from_bytes(&region_bytes(2, 1, &[1, 1])).unwrap();
        let b = MapRegion::from_bytes(&region_bytes(2, 1, &[2, 2])).unwrap();

        let mut map = CompositeMap::new(2, 1);
        map.paste(&a, 0, 0);
        map.paste(&b, 1, 0);
        assert_eq!(map.cells(), &[1, 2]);
    }

    #[test]
    fn huge_offsets_are_skipped() {
        let region = MapRegion::from_bytes(&region_bytes(2, 2, &[1, 2, 3, 4])).unwrap();
        let mut map = CompositeMap::new(2, 2);
        map.paste(&region, usize::MAX, 0);
        map.paste(&region, 0, usize::MAX - 1);
        assert_eq!(map.cells(), &[0, 0, 0, 0]);

        map.paste(&region, 1, 1);
        assert_eq!(map.cells(), &[0, 0, 0, 1]);
    }

    #[test]
    fn square_map_side_from_tile_count() {
        let a = MapRegion::from_bytes(&region_bytes(2, 2, &[0; 4])).unwrap();
        let b = MapRegion::from_bytes(&region_bytes(3, 2, &[0; 6])).unwrap();
        let map = CompositeMap::square_for(&[&a, &b]);
        assert_eq!((map.width(), map.height()), (3, 3));
        assert_eq!(integer_sqrt(16), 4);
        assert_eq!(integer_sqrt(0), 0);
    }
}
