//! # Byte providers
//!
//! The game keeps every asset in one archive addressed by DOS-style paths such as
//! `levels\towndata\town.cel`. Decoders only ever see the bytes of a single file, so the
//! archive is reduced to a lookup by path.

use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use log::debug;

use crate::error::{AssetError, AssetResult};

/// Source of raw asset bytes keyed by archive path
pub trait ByteProvider {
    fn read_file(&self, path: &str) -> AssetResult<Vec<u8>>;
}

/// Archive paths use `\` separators and are case-insensitive
pub fn normalise_path(path: &str) -> String {
    path.replace('\\', "/")
        .trim_start_matches('/')
        .to_ascii_lowercase()
}

/// An archive that has already been extracted to a directory on disk
pub struct DirectoryArchive {
    root: PathBuf,
}

impl DirectoryArchive {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        DirectoryArchive { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn candidates(&self, path: &str) -> [PathBuf; 2] {
        let as_given = path.replace('\\', "/");
        [
            self.root.join(as_given.trim_start_matches('/')),
            self.root.join(normalise_path(path)),
        ]
    }
}

impl ByteProvider for DirectoryArchive {
    fn read_file(&self, path: &str) -> AssetResult<Vec<u8>> {
        for candidate in self.candidates(path) {
            if candidate.is_file() {
                debug!("Reading {}", candidate.display());
                return Ok(fs::read(&candidate)?);
            }
        }
        Err(AssetError::NotFound(format!(
            "{} (under {})",
            path,
            self.root.display()
        )))
    }
}

/// In-memory archive, mostly useful for tests and for callers that unpack the archive
/// themselves
#[derive(Default)]
pub struct MemoryArchive {
    files: HashMap<String, Vec<u8>>,
}

impl MemoryArchive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: &str, data: Vec<u8>) {
        self.files.insert(normalise_path(path), data);
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl ByteProvider for MemoryArchive {
    fn read_file(&self, path: &str) -> AssetResult<Vec<u8>> {
        self.files
            .get(&normalise_path(path))
            .cloned()
            .ok_or_else(|| AssetError::NotFound(path.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalises_separators_and_case() {
        assert_eq!(
            normalise_path("\\Levels\\TownData\\Town.CEL"),
            "levels/towndata/town.cel"
        );
    }

    #[test]
    fn memory_archive_lookup_ignores_path_style() {
        let mut archive = MemoryArchive::new();
        archive.insert("levels/l1data/l1.sol", vec![1, 2, 3]);
        assert_eq!(
            archive.read_file("LEVELS\\L1DATA\\L1.SOL").unwrap(),
            vec![1, 2, 3]
        );
        assert!(matches!(
            archive.read_file("levels/l1data/l1.min"),
            Err(AssetError::NotFound(_))
        ));
    }

    #[test]
    fn directory_archive_reads_nested_files() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("plrgfx").join("warrior");
        fs::create_dir_all(&nested).unwrap();
        fs::write(nested.join("wlnat.cl2"), [9u8, 8, 7]).unwrap();

        let archive = DirectoryArchive::new(dir.path());
        assert_eq!(
            archive.read_file("plrgfx\\warrior\\WLNAT.CL2").unwrap(),
            vec![9, 8, 7]
        );
        assert!(matches!(
            archive.read_file("plrgfx/rogue/rlnat.cl2"),
            Err(AssetError::NotFound(_))
        ));
    }
}
