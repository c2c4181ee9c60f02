//! Error type shared by every decoder in the crate.

use std::io;

use thiserror::Error;

/// Failure raised while loading, decoding or exporting an asset.
#[derive(Debug, Error)]
pub enum AssetError {
    /// Structurally invalid container (bad offset table, truncated data)
    #[error("format error: {0}")]
    Format(String),
    /// Frame decoded but its dimensions could not be determined
    #[error("decode error: {0}")]
    Decode(String),
    /// Frame, pixel, square or tile index out of bounds
    #[error("index error: {0}")]
    Index(String),
    /// Byte provider has no file at the requested path
    #[error("file not found: {0}")]
    NotFound(String),
    #[error("I/O error: {0}")]
    Io(io::Error),
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
    /// PNG optimisation or metadata serialisation failed
    #[error("export error: {0}")]
    Export(String),
}

impl From<io::Error> for AssetError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::UnexpectedEof
            | io::ErrorKind::InvalidData
            | io::ErrorKind::InvalidInput => AssetError::Format(err.to_string()),
            io::ErrorKind::NotFound => AssetError::NotFound(err.to_string()),
            _ => AssetError::Io(err),
        }
    }
}

impl From<serde_json::Error> for AssetError {
    fn from(err: serde_json::Error) -> Self {
        AssetError::Export(format!("failed to serialise metadata: {}", err))
    }
}

pub type AssetResult<T> = Result<T, AssetError>;
