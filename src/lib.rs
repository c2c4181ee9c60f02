//! Decoders for the indexed-colour sprite and level tile formats of an isometric action RPG,
//! plus extractors that export them as PNG sheets with JSON metadata.

pub mod binary_utils;
pub mod dungeon;
pub mod error;
pub mod filesystem;
pub mod formats;
pub mod graphics;
pub mod level_extractor;
pub mod sprite_extractor;

pub use error::{AssetError, AssetResult};
pub use filesystem::{ByteProvider, DirectoryArchive, MemoryArchive};
