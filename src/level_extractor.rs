use std::{fs, path::Path, str::FromStr, sync::Arc};

use log::{info, warn};
use serde::Serialize;

use crate::{
    dungeon::{
        dun::{CompositeMap, MapRegion},
        til::TileDefinition,
        Level, Square,
    },
    error::AssetResult,
    filesystem::ByteProvider,
    formats::level_cel::LevelCelFile,
    graphics::{
        palette::Palette,
        sheet::{build_sheet, save_png, write_metadata, SheetMetadata},
    },
    sprite_extractor::keep_decoded,
};

pub const LEVEL_METADATA_FILE: &str = "level.json";
const SQUARES_IMAGE: &str = "squares.png";
const FRAMES_IMAGE: &str = "frames.png";

/// A map region and the tile offset it is pasted at, written `PATH@X,Y`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionPlacement {
    pub path: String,
    pub x: usize,
    pub y: usize,
}

impl FromStr for RegionPlacement {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (path, offset) = match s.rsplit_once('@') {
            Some(parts) => parts,
            None => {
                return Ok(RegionPlacement {
                    path: s.to_string(),
                    x: 0,
                    y: 0,
                })
            }
        };
        let (x, y) = offset
            .split_once(',')
            .ok_or_else(|| format!("expected PATH@X,Y, got '{}'", s))?;
        let parse = |v: &str| {
            v.trim()
                .parse::<usize>()
                .map_err(|e| format!("bad offset '{}' in '{}': {}", v, s, e))
        };
        if path.is_empty() {
            return Err(format!("missing region path in '{}'", s));
        }
        Ok(RegionPlacement {
            path: path.to_string(),
            x: parse(x)?,
            y: parse(y)?,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct LevelExportOptions {
    /// Archive path shared by the level files, e.g. `levels/l1data/l1` for `l1.cel`, `l1.min`,
    /// `l1.til` and `l1.sol`
    pub prefix: String,
    pub palette: Option<String>,
    pub regions: Vec<RegionPlacement>,
    /// Explicit map size in tiles; a square map sized to the regions otherwise
    pub map_size: Option<(usize, usize)>,
    pub columns: Option<usize>,
    pub optimise: bool,
}

#[derive(Debug, Serialize)]
pub struct LevelMetadata {
    pub prefix: String,
    pub frame_count: usize,
    pub frames_per_square: usize,
    pub squares: Vec<Square>,
    pub tiles: Vec<TileDefinition>,
    pub map: Option<CompositeMap>,
    pub frames_sheet: SheetMetadata,
    pub squares_sheet: SheetMetadata,
    pub skipped_frames: Vec<usize>,
    pub skipped_squares: Vec<usize>,
}

/// Handles extracting one level's tile graphics and tables from the archive
pub struct LevelExtractor<'a> {
    archive: &'a dyn ByteProvider,
}

impl<'a> LevelExtractor<'a> {
    pub fn new(archive: &'a dyn ByteProvider) -> Self {
        LevelExtractor { archive }
    }

    pub fn load_level(&self, options: &LevelExportOptions) -> AssetResult<Level> {
        let palette = Palette::load(self.archive, options.palette.as_deref())?;
        let read = |ext: &str| self.archive.read_file(&format!("{}.{}", options.prefix, ext));

        let cel = LevelCelFile::from_bytes(&read("cel")?, palette)?;
        Level::new(&read("sol")?, &read("min")?, &read("til")?, cel)
    }

    pub fn load_map(
        &self,
        level: &Level,
        options: &LevelExportOptions,
    ) -> AssetResult<Option<CompositeMap>> {
        if options.regions.is_empty() {
            return Ok(None);
        }

        let placements = options
            .regions
            .iter()
            .map(|p| -> AssetResult<(MapRegion, usize, usize)> {
                let region = MapRegion::from_bytes(&self.archive.read_file(&p.path)?)?;
                info!(
                    "Region {}: {}x{} at ({}, {})",
                    p.path, region.width, region.height, p.x, p.y
                );
                Ok((region, p.x, p.y))
            })
            .collect::<AssetResult<Vec<_>>>()?;

        let map = match options.map_size {
            Some((width, height)) => {
                let mut map = CompositeMap::new(width, height);
                for (region, x, y) in &placements {
                    map.paste(region, *x, *y);
                }
                map
            }
            None => level.compose(&placements),
        };
        Ok(Some(map))
    }

    pub fn extract_level(
        &self,
        options: &LevelExportOptions,
        output_dir: &Path,
    ) -> AssetResult<LevelMetadata> {
        info!("Loading level {}...", options.prefix);
        let level = self.load_level(options)?;
        info!(
            "{} frames, {} squares, {} tiles",
            level.frames().frame_count(),
            level.square_count(),
            level.tile_count()
        );

        fs::create_dir_all(output_dir)?;

        let frames = (0..level.frames().frame_count())
            .map(|i| (i, level.frames().frame(i)))
            .collect();
        let (frames, skipped_frames) = keep_decoded(&options.prefix, frames);
        let frames_sheet = build_sheet(&frames, options.columns, FRAMES_IMAGE)?;
        save_png(&frames_sheet.image, &output_dir.join(FRAMES_IMAGE), options.optimise)?;

        let squares_bitmaps = (0..level.square_count())
            .map(|i| (i, level.square_bitmap(i).map(Arc::new)))
            .collect();
        let (squares_bitmaps, skipped_squares) = keep_decoded(&options.prefix, squares_bitmaps);
        let squares_sheet = build_sheet(&squares_bitmaps, options.columns, SQUARES_IMAGE)?;
        save_png(&squares_sheet.image, &output_dir.join(SQUARES_IMAGE), options.optimise)?;

        let squares = (0..level.square_count())
            .map(|i| level.square(i))
            .collect::<AssetResult<Vec<_>>>()?;
        let tiles = (1..=level.tile_count())
            .map(|t| level.tile(t as u16))
            .collect::<AssetResult<Vec<_>>>()?;

        let map = self.load_map(&level, options)?;
        if let Some(map) = &map {
            let unknown = map
                .cells()
                .iter()
                .filter(|&&t| t as usize > level.tile_count())
                .count();
            if unknown > 0 {
                warn!("{} map cells reference tiles past the tile table", unknown);
            }
        }

        let metadata = LevelMetadata {
            prefix: options.prefix.clone(),
            frame_count: level.frames().frame_count(),
            frames_per_square: level.frames_per_square(),
            squares,
            tiles,
            map,
            frames_sheet: frames_sheet.metadata,
            squares_sheet: squares_sheet.metadata,
            skipped_frames,
            skipped_squares,
        };
        write_metadata(&metadata, &output_dir.join(LEVEL_METADATA_FILE))?;

        info!("  -> {}", output_dir.display());
        Ok(metadata)
    }
}
