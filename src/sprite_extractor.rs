use std::{fs, path::Path, sync::Arc};

use log::{info, warn};
use serde::Serialize;

use crate::{
    error::AssetResult,
    filesystem::ByteProvider,
    formats::{cel::CelFile, cl2::Cl2File},
    graphics::{
        bitmap::IndexedBitmap,
        palette::Palette,
        sheet::{build_sheet, save_png, write_metadata, SheetMetadata, SHEET_METADATA_FILE},
    },
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SpriteFormat {
    /// Grouped, directional sprites
    Cl2,
    /// Flat single-image containers
    Cel,
}

#[derive(Debug, Clone, Default)]
pub struct SpriteExportOptions {
    /// Archive path of a 768 byte palette; the grey default is used otherwise
    pub palette: Option<String>,
    /// Frame width, skipping inference
    pub width: Option<usize>,
    /// Sheet columns; near-square otherwise
    pub columns: Option<usize>,
    pub optimise: bool,
}

#[derive(Debug, Serialize)]
pub struct SpriteMetadata {
    pub source: String,
    pub format: SpriteFormat,
    /// Frames per group, in order. CEL files are a single group.
    pub groups: Vec<usize>,
    pub skipped_frames: Vec<usize>,
    #[serde(flatten)]
    pub sheet: SheetMetadata,
}

/// Handles turning one sprite container from the archive into a PNG sheet
pub struct SpriteExtractor<'a> {
    archive: &'a dyn ByteProvider,
}

impl<'a> SpriteExtractor<'a> {
    pub fn new(archive: &'a dyn ByteProvider) -> Self {
        SpriteExtractor { archive }
    }

    pub fn extract_sprite(
        &self,
        path: &str,
        format: SpriteFormat,
        options: &SpriteExportOptions,
        output_dir: &Path,
    ) -> AssetResult<SpriteMetadata> {
        let palette = Palette::load(self.archive, options.palette.as_deref())?;
        let data = self.archive.read_file(path)?;
        info!("Decoding {} ({} bytes) as {:?}", path, data.len(), format);

        let (groups, decoded) = match format {
            SpriteFormat::Cl2 => {
                let file = Cl2File::with_width(&data, palette, options.width)?;
                let groups = (0..file.group_count())
                    .map(|g| file.group_len(g))
                    .collect::<AssetResult<Vec<_>>>()?;
                let frames: Vec<_> = (0..file.frame_count()).map(|i| (i, file.frame(i))).collect();
                (groups, frames)
            }
            SpriteFormat::Cel => {
                let file = CelFile::with_width(&data, palette, options.width)?;
                let frames: Vec<_> = (0..file.frame_count()).map(|i| (i, file.frame(i))).collect();
                (vec![frames.len()], frames)
            }
        };

        let (frames, skipped) = keep_decoded(path, decoded);
        info!(
            "{}: {} frames in {} groups, {} skipped",
            path,
            frames.len() + skipped.len(),
            groups.len(),
            skipped.len()
        );

        let stem = sprite_stem(path);
        let sheet = build_sheet(&frames, options.columns, &format!("{}.png", stem))?;

        let sprite_dir = output_dir.join(&stem);
        fs::create_dir_all(&sprite_dir)?;
        save_png(&sheet.image, &sprite_dir.join(&sheet.metadata.image), options.optimise)?;

        let metadata = SpriteMetadata {
            source: path.to_string(),
            format,
            groups,
            skipped_frames: skipped,
            sheet: sheet.metadata,
        };
        write_metadata(&metadata, &sprite_dir.join(SHEET_METADATA_FILE))?;

        info!("  -> {}", sprite_dir.display());
        Ok(metadata)
    }
}

/// Splits decode results into usable frames and the indices of those that failed
pub(crate) fn keep_decoded(
    source: &str,
    decoded: Vec<(usize, AssetResult<Arc<IndexedBitmap>>)>,
) -> (Vec<(usize, Arc<IndexedBitmap>)>, Vec<usize>) {
    let mut frames = Vec::with_capacity(decoded.len());
    let mut skipped = Vec::new();
    for (index, result) in decoded {
        match result {
            Ok(frame) => frames.push((index, frame)),
            Err(e) => {
                warn!("{}: skipping frame {}: {}", source, index, e);
                skipped.push(index);
            }
        }
    }
    (frames, skipped)
}

/// File name without directories or extension, e.g. `monsters\zombie\zombiew.cl2` -> `zombiew`
fn sprite_stem(path: &str) -> String {
    let name = path.rsplit(&['/', '\\'][..]).next().unwrap_or(path);
    let stem = name.rsplit_once('.').map_or(name, |(stem, _)| stem);
    if stem.is_empty() {
        "sprite".to_string()
    } else {
        stem.to_ascii_lowercase()
    }
}
