//! # Sheet export
//!
//! Lays decoded frames out on a grid of equally sized cells and writes the result as a PNG plus
//! a JSON description of where every source frame ended up. Identical frames share one cell.

use std::{
    collections::{hash_map::Entry, HashMap},
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use image::{imageops, RgbaImage};
use log::{debug, warn};
use serde::Serialize;

use crate::{
    error::{AssetError, AssetResult},
    graphics::bitmap::IndexedBitmap,
};

pub const SHEET_METADATA_FILE: &str = "sheet.json";

#[derive(Debug, Clone)]
pub struct SheetLayout {
    pub columns: usize,
    pub rows: usize,
    pub cell_width: usize,
    pub cell_height: usize,
}

impl SheetLayout {
    /// Near-square grid unless `columns` is given
    pub fn for_cells(
        cells: usize,
        cell_width: usize,
        cell_height: usize,
        columns: Option<usize>,
    ) -> Self {
        let columns = columns
            .filter(|&c| c > 0)
            .unwrap_or_else(|| (cells as f64).sqrt().ceil() as usize)
            .max(1);
        let rows = cells.div_ceil(columns).max(1);
        SheetLayout {
            columns,
            rows,
            cell_width,
            cell_height,
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (
            (self.columns * self.cell_width) as u32,
            (self.rows * self.cell_height) as u32,
        )
    }

    pub fn cell_origin(&self, cell: usize) -> (u32, u32) {
        (
            ((cell % self.columns) * self.cell_width) as u32,
            ((cell / self.columns) * self.cell_height) as u32,
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SheetFrame {
    /// Index of the frame in its source container
    pub source: usize,
    pub cell: usize,
    pub x: u32,
    pub y: u32,
    pub width: usize,
    pub height: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SheetMetadata {
    pub image: String,
    pub cell_width: usize,
    pub cell_height: usize,
    pub columns: usize,
    pub rows: usize,
    pub unique_frames: usize,
    pub frames: Vec<SheetFrame>,
}

pub struct SpriteSheet {
    pub image: RgbaImage,
    pub metadata: SheetMetadata,
}

/// Collapses identical frames. Returns the unique frames and, for every input frame, the index
/// of its unique copy.
pub fn deduplicate_frames(frames: &[Arc<IndexedBitmap>]) -> (Vec<Arc<IndexedBitmap>>, Vec<usize>) {
    let mut seen: HashMap<u64, Vec<usize>> = HashMap::new();
    let mut unique: Vec<Arc<IndexedBitmap>> = Vec::new();
    let mut mapping = Vec::with_capacity(frames.len());

    for frame in frames {
        let hash = frame.content_hash();
        let index = match seen.entry(hash) {
            Entry::Occupied(mut entry) => {
                let found = entry
                    .get()
                    .iter()
                    .copied()
                    .find(|&i| unique[i].same_pixels(frame));
                match found {
                    Some(i) => i,
                    None => {
                        // Hash collision
                        let i = unique.len();
                        unique.push(Arc::clone(frame));
                        entry.get_mut().push(i);
                        i
                    }
                }
            }
            Entry::Vacant(entry) => {
                let i = unique.len();
                unique.push(Arc::clone(frame));
                entry.insert(vec![i]);
                i
            }
        };
        mapping.push(index);
    }

    (unique, mapping)
}

/// Renders `(source index, frame)` pairs onto one sheet. Cells are as large as the largest
/// frame; smaller frames sit in the top-left corner of their cell.
pub fn build_sheet(
    frames: &[(usize, Arc<IndexedBitmap>)],
    columns: Option<usize>,
    image_name: &str,
) -> AssetResult<SpriteSheet> {
    if frames.is_empty() {
        return Err(AssetError::Export("no frames to export".to_string()));
    }

    let bitmaps: Vec<Arc<IndexedBitmap>> = frames.iter().map(|(_, f)| Arc::clone(f)).collect();
    let (unique, mapping) = deduplicate_frames(&bitmaps);
    debug!(
        "Sheet '{}': {} frames, {} unique",
        image_name,
        frames.len(),
        unique.len()
    );

    let cell_width = unique.iter().map(|f| f.width()).max().unwrap_or(0).max(1);
    let cell_height = unique.iter().map(|f| f.height()).max().unwrap_or(0).max(1);
    let layout = SheetLayout::for_cells(unique.len(), cell_width, cell_height, columns);

    let (width, height) = layout.dimensions();
    let mut image = RgbaImage::new(width, height);
    for (cell, frame) in unique.iter().enumerate() {
        if frame.width() == 0 || frame.height() == 0 {
            continue;
        }
        let (x, y) = layout.cell_origin(cell);
        imageops::replace(&mut image, &frame.to_rgba_image()?, x as i64, y as i64);
    }

    let placed = frames
        .iter()
        .zip(&mapping)
        .map(|((source, frame), &cell)| {
            let (x, y) = layout.cell_origin(cell);
            SheetFrame {
                source: *source,
                cell,
                x,
                y,
                width: frame.width(),
                height: frame.height(),
            }
        })
        .collect();

    Ok(SpriteSheet {
        image,
        metadata: SheetMetadata {
            image: image_name.to_string(),
            cell_width,
            cell_height,
            columns: layout.columns,
            rows: layout.rows,
            unique_frames: unique.len(),
            frames: placed,
        },
    })
}

/// Writes a PNG, optionally squeezing it through oxipng
pub fn save_png(image: &RgbaImage, path: &Path, optimise: bool) -> AssetResult<()> {
    if !optimise {
        image.save(path)?;
        return Ok(());
    }

    let temp_path = path.with_extension("temp.png");
    image.save(&temp_path)?;

    let mut options = oxipng::Options::from_preset(2);
    options.bit_depth_reduction = true;

    oxipng::optimize(
        &oxipng::InFile::Path(temp_path.clone()),
        &oxipng::OutFile::Path(Some(path.to_path_buf())),
        &options,
    )
    .map_err(|e| AssetError::Export(format!("PNG optimisation failed: {}", e)))?;

    if let Err(e) = fs::remove_file(&temp_path) {
        warn!("Failed to remove temporary file {}: {}", temp_path.display(), e);
    }

    Ok(())
}

pub fn write_metadata<T: Serialize + ?Sized>(metadata: &T, path: &Path) -> AssetResult<()> {
    let json = serde_json::to_string_pretty(metadata)?;
    fs::write(path, json)?;
    Ok(())
}

/// Writes `<name>.png` and `sheet.json` into `output_dir`, returning the image path
pub fn write_sheet(
    sheet: &SpriteSheet,
    output_dir: &Path,
    optimise: bool,
) -> AssetResult<PathBuf> {
    fs::create_dir_all(output_dir)?;
    let image_path = output_dir.join(&sheet.metadata.image);
    save_png(&sheet.image, &image_path, optimise)?;
    write_metadata(&sheet.metadata, &output_dir.join(SHEET_METADATA_FILE))?;
    Ok(image_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphics::{bitmap::TRANSPARENT_INDEX, palette::Palette};

    fn solid(width: usize, height: usize, index: u8) -> Arc<IndexedBitmap> {
        Arc::new(IndexedBitmap::from_parts(
            Palette::default_palette(),
            width,
            height,
            vec![index; width * height],
        ))
    }

    #[test]
    fn duplicates_share_a_cell() {
        let a = solid(2, 2, 1);
        let b = solid(2, 2, 2);
        let (unique, mapping) = deduplicate_frames(&[a.clone(), b, solid(2, 2, 1), a]);
        assert_eq!(unique.len(), 2);
        assert_eq!(mapping, vec![0, 1, 0, 0]);
    }

    #[test]
    fn layout_is_near_square() {
        let layout = SheetLayout::for_cells(5, 4, 3, None);
        assert_eq!((layout.columns, layout.rows), (3, 2));
        assert_eq!(layout.dimensions(), (12, 6));
        assert_eq!(layout.cell_origin(4), (4, 3));

        let fixed = SheetLayout::for_cells(5, 4, 3, Some(5));
        assert_eq!((fixed.columns, fixed.rows), (5, 1));
    }

    #[test]
    fn sheet_places_frames_and_keeps_transparency() {
        let mut holes = IndexedBitmap::from_parts(
            Palette::default_palette(),
            2,
            2,
            vec![10; 4],
        );
        holes.set_pixel(1, 1, TRANSPARENT_INDEX).unwrap();

        let frames = vec![
            (0, solid(2, 2, 10)),
            (3, Arc::new(holes)),
            (4, solid(2, 2, 10)),
        ];
        let sheet = build_sheet(&frames, None, "test.png").unwrap();

        assert_eq!(sheet.metadata.unique_frames, 2);
        assert_eq!(sheet.image.dimensions(), (4, 2));
        assert_eq!(sheet.metadata.frames[2].cell, 0);
        assert_eq!(sheet.metadata.frames[1].source, 3);
        assert_eq!(sheet.metadata.frames[1].x, 2);

        let palette = Palette::default_palette();
        assert_eq!(*sheet.image.get_pixel(0, 0), palette.color(10));
        assert_eq!(sheet.image.get_pixel(3, 1).0[3], 0);
    }

    #[test]
    fn empty_sheets_are_rejected() {
        assert!(matches!(
            build_sheet(&[], None, "empty.png"),
            Err(AssetError::Export(_))
        ));
    }

    #[test]
    fn writes_png_and_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let sheet = build_sheet(&[(0, solid(3, 2, 7))], None, "frames.png").unwrap();
        let path = write_sheet(&sheet, dir.path(), false).unwrap();

        assert!(path.exists());
        let json = fs::read_to_string(dir.path().join(SHEET_METADATA_FILE)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["image"], "frames.png");
        assert_eq!(value["frames"][0]["width"], 3);

        let decoded = image::open(&path).unwrap().to_rgba8();
        assert_eq!(decoded.dimensions(), (3, 2));
    }
}
