//! # Palette
//!
//! Every bitmap in the game is 8bpp and references one 256 entry RGB table. The files carry
//! no alpha channel: the single entry whose channels sum to 765 (pure white) is treated as
//! the transparent colour instead.

use std::sync::{Arc, OnceLock};

use image::Rgba;

use crate::{
    error::{AssetError, AssetResult},
    filesystem::ByteProvider,
};

pub const PALETTE_COLOURS: usize = 256;
pub const PALETTE_FILE_SIZE: usize = PALETTE_COLOURS * 3;

/// Channel sum that marks the transparency sentinel
const SENTINEL_SUM: u16 = 765;

/// Grey ramp used when no palette file is supplied; index 255 is white
pub static DEFAULT_PALETTE: [u8; PALETTE_FILE_SIZE] = build_default_palette();

const fn build_default_palette() -> [u8; PALETTE_FILE_SIZE] {
    let mut table = [0u8; PALETTE_FILE_SIZE];
    let mut i = 0;
    while i < PALETTE_COLOURS {
        table[i * 3] = i as u8;
        table[i * 3 + 1] = i as u8;
        table[i * 3 + 2] = i as u8;
        i += 1;
    }
    table
}

static DEFAULT: OnceLock<Arc<Palette>> = OnceLock::new();

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Palette {
    colours: [Rgba<u8>; PALETTE_COLOURS],
}

impl Palette {
    pub fn from_bytes(data: &[u8]) -> AssetResult<Self> {
        if data.len() != PALETTE_FILE_SIZE {
            return Err(AssetError::Format(format!(
                "palette must be {} bytes, got {}",
                PALETTE_FILE_SIZE,
                data.len()
            )));
        }

        Ok(Self::from_rgb_table(data))
    }

    /// Reads a palette file from the archive, or falls back to the shared default
    pub fn load(archive: &dyn ByteProvider, path: Option<&str>) -> AssetResult<Arc<Palette>> {
        match path {
            Some(path) => Ok(Arc::new(Self::from_bytes(&archive.read_file(path)?)?)),
            None => Ok(Self::default_palette()),
        }
    }

    /// Shared palette built from [`DEFAULT_PALETTE`] on first use
    pub fn default_palette() -> Arc<Palette> {
        DEFAULT
            .get_or_init(|| Arc::new(Self::from_rgb_table(&DEFAULT_PALETTE)))
            .clone()
    }

    fn from_rgb_table(data: &[u8]) -> Self {
        let mut colours = [Rgba([0, 0, 0, 255]); PALETTE_COLOURS];
        for (colour, rgb) in colours.iter_mut().zip(data.chunks_exact(3)) {
            *colour = Rgba([rgb[0], rgb[1], rgb[2], 255]);
        }

        // Only the first white entry becomes the sentinel
        if let Some(sentinel) = colours.iter_mut().find(|c| channel_sum(c) == SENTINEL_SUM) {
            sentinel.0[3] = 0;
        }

        Palette { colours }
    }

    pub fn color(&self, index: u8) -> Rgba<u8> {
        self.colours[index as usize]
    }

    /// Replaces one entry. The sentinel rule is re-applied to this entry alone.
    pub fn set_color(&mut self, index: u8, rgb: [u8; 3]) {
        let mut colour = Rgba([rgb[0], rgb[1], rgb[2], 255]);
        if channel_sum(&colour) == SENTINEL_SUM {
            colour.0[3] = 0;
        }
        self.colours[index as usize] = colour;
    }

    pub fn is_transparent(&self, index: u8) -> bool {
        self.colours[index as usize].0[3] == 0
    }

    pub fn transparent_indices(&self) -> Vec<u8> {
        (0..=255u8).filter(|&i| self.is_transparent(i)).collect()
    }
}

fn channel_sum(colour: &Rgba<u8>) -> u16 {
    colour.0[0] as u16 + colour.0[1] as u16 + colour.0[2] as u16
}
