//! Palettes, indexed bitmaps and sheet export

pub mod bitmap;
pub mod palette;
pub mod sheet;

pub use bitmap::{IndexedBitmap, TRANSPARENT_INDEX};
pub use palette::Palette;
