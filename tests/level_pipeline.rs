use std::fs;

use cel_scraper::{
    dungeon::dun::{CompositeMap, MapRegion},
    filesystem::MemoryArchive,
    formats::level_cel::{FrameShape, LEVEL_FRAME_PIXELS, LOW_WEDGE_SIZE},
    level_extractor::{LevelExportOptions, LevelExtractor, RegionPlacement, LEVEL_METADATA_FILE},
};

fn words(values: &[u16]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn cel_container(frames: &[Vec<u8>]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&(frames.len() as u32).to_le_bytes());
    let mut offset = (frames.len() + 2) * 4;
    out.extend_from_slice(&(offset as u32).to_le_bytes());
    for f in frames {
        offset += f.len();
        out.extend_from_slice(&(offset as u32).to_le_bytes());
    }
    for f in frames {
        out.extend_from_slice(f);
    }
    out
}

fn region(width: u16, height: u16, tiles: &[u16]) -> Vec<u8> {
    let mut data = words(&[width, height]);
    data.extend(words(tiles));
    data
}

/// Three frames (raw, right-low wedge, raw), three squares of two slots, two tiles
fn test_archive() -> MemoryArchive {
    let mut archive = MemoryArchive::new();
    archive.insert(
        "levels\\l9data\\l9.cel",
        cel_container(&[
            vec![3u8; LEVEL_FRAME_PIXELS],
            vec![4u8; LOW_WEDGE_SIZE],
            vec![6u8; LEVEL_FRAME_PIXELS],
        ]),
    );
    archive.insert(
        "levels\\l9data\\l9.min",
        words(&[1, 3 * 4096 + 2, 0, 3, 0, 0]),
    );
    archive.insert("levels\\l9data\\l9.til", words(&[1, 2, 3, 1, 2, 2, 2, 2]));
    archive.insert("levels\\l9data\\l9.sol", vec![0b001, 0b000, 0b111]);
    archive.insert("levels\\l9data\\west.dun", region(2, 2, &[1, 2, 2, 1]));
    archive.insert("levels\\l9data\\east.dun", region(2, 2, &[2, 2, 1, 1]));
    archive
}

fn options() -> LevelExportOptions {
    LevelExportOptions {
        prefix: "levels\\l9data\\l9".to_string(),
        ..Default::default()
    }
}

#[test]
fn loading_a_level_tags_frame_shapes() {
    let archive = test_archive();
    let level = LevelExtractor::new(&archive).load_level(&options()).unwrap();

    assert_eq!(level.square_count(), 3);
    assert_eq!(level.frames_per_square(), 2);
    assert_eq!(level.tile_count(), 2);
    assert_eq!(level.frames().shape(1), Some(FrameShape::RightLow));
    assert_eq!(level.frames().shape(2), Some(FrameShape::Raw));

    let first = level.square(0).unwrap();
    assert_eq!(&first.frames[14..], &[1, 2]);
    assert!(!first.passable_player);
    assert!(first.passable_sight);

    // Right-low wedge: bottom line starts at the left edge
    let wedge = level.frames().frame(1).unwrap();
    assert_eq!(wedge.pixel(0, 31).unwrap(), 4);
}

#[test]
fn regions_compose_into_an_explicit_map() {
    let archive = test_archive();
    let extractor = LevelExtractor::new(&archive);
    let level = extractor.load_level(&options()).unwrap();

    let options = LevelExportOptions {
        regions: vec![
            "levels\\l9data\\west.dun@0,0".parse::<RegionPlacement>().unwrap(),
            "levels\\l9data\\east.dun@2,0".parse::<RegionPlacement>().unwrap(),
        ],
        map_size: Some((4, 2)),
        ..options()
    };
    let map = extractor.load_map(&level, &options).unwrap().unwrap();

    let east = MapRegion::from_bytes(&region(2, 2, &[2, 2, 1, 1])).unwrap();
    assert_eq!((map.width(), map.height()), (4, 2));
    assert_eq!(map.cell(3, 1), east.cell(1, 1));
    assert_eq!(map.cells(), &[1, 2, 2, 2, 2, 1, 1, 1]);
}

#[test]
fn default_map_is_square() {
    let west = MapRegion::from_bytes(&region(2, 2, &[1, 2, 2, 1])).unwrap();
    let east = MapRegion::from_bytes(&region(2, 2, &[2, 2, 1, 1])).unwrap();
    let map = CompositeMap::square_for(&[&west, &east]);
    assert_eq!((map.width(), map.height()), (2, 2));
}

#[test]
fn exports_sheets_and_metadata() {
    let archive = test_archive();
    let out = tempfile::tempdir().unwrap();

    let options = LevelExportOptions {
        regions: vec![RegionPlacement {
            path: "levels\\l9data\\west.dun".to_string(),
            x: 0,
            y: 0,
        }],
        ..options()
    };
    let metadata = LevelExtractor::new(&archive)
        .extract_level(&options, out.path())
        .unwrap();

    assert_eq!(metadata.squares.len(), 3);
    assert_eq!(metadata.tiles.len(), 2);
    assert!(metadata.skipped_frames.is_empty());
    assert!(metadata.skipped_squares.is_empty());
    assert_eq!(metadata.frames_sheet.unique_frames, 3);
    // Square 2 has no frames at all, so it renders fully transparent
    assert_eq!(metadata.squares_sheet.unique_frames, 3);

    assert!(out.path().join("frames.png").exists());
    assert!(out.path().join("squares.png").exists());

    let json = fs::read_to_string(out.path().join(LEVEL_METADATA_FILE)).unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["frames_per_square"], 2);
    assert_eq!(value["squares"][2]["passable_missile"], false);
    assert_eq!(value["tiles"][0]["left"], 3);
    assert_eq!(value["map"]["width"], 2);
}

#[test]
fn missing_level_files_are_not_found() {
    let archive = MemoryArchive::new();
    let result = LevelExtractor::new(&archive).load_level(&options());
    assert!(matches!(result, Err(cel_scraper::AssetError::NotFound(_))));
}
