use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{info, LevelFilter};

use cel_scraper::{
    filesystem::DirectoryArchive,
    level_extractor::{LevelExportOptions, LevelExtractor, RegionPlacement},
    sprite_extractor::{SpriteExportOptions, SpriteExtractor, SpriteFormat},
};

/// Export CL2/CEL sprites and level tiles from an extracted game archive
#[derive(Parser)]
#[command(name = "cel_scraper")]
#[command(version)]
struct Cli {
    /// Directory holding the extracted archive
    #[arg(short, long, default_value = ".")]
    archive: PathBuf,

    /// Output directory
    #[arg(short, long, default_value = "./output")]
    output: PathBuf,

    /// Archive path of a 768 byte palette (grey ramp if omitted)
    #[arg(short, long)]
    palette: Option<String>,

    /// Sheet columns (near-square if omitted)
    #[arg(long)]
    columns: Option<usize>,

    /// Skip oxipng optimisation of the written PNGs
    #[arg(long)]
    no_optimise: bool,

    /// Log debug output (RUST_LOG overrides)
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Export a grouped CL2 sprite
    Sprite {
        /// Archive path of the .cl2 file
        path: String,

        /// Frame width, skipping inference
        #[arg(short, long)]
        width: Option<usize>,
    },
    /// Export a flat CEL image container
    Cel {
        /// Archive path of the .cel file
        path: String,

        /// Frame width, skipping inference
        #[arg(short, long)]
        width: Option<usize>,
    },
    /// Export a level's tile frames, squares and tables
    Level {
        /// Shared path of the .cel/.min/.til/.sol files, e.g. levels/l1data/l1
        prefix: String,

        /// Map region to paste, as PATH@X,Y (repeatable)
        #[arg(short, long = "region")]
        regions: Vec<RegionPlacement>,

        /// Map size in tiles as WIDTHxHEIGHT (square map if omitted)
        #[arg(long, value_parser = parse_map_size)]
        map_size: Option<(usize, usize)>,
    },
}

fn parse_map_size(s: &str) -> Result<(usize, usize), String> {
    let (w, h) = s
        .split_once(&['x', 'X'][..])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{}'", s))?;
    let parse = |v: &str| v.parse::<usize>().map_err(|e| format!("'{}': {}", v, e));
    Ok((parse(w)?, parse(h)?))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(default_level)
        .parse_default_env()
        .init();

    let archive = DirectoryArchive::new(cli.archive.clone());
    info!("Archive: {}", cli.archive.display());

    match &cli.command {
        Command::Sprite { path, width } => {
            export_sprite(&cli, &archive, path, SpriteFormat::Cl2, *width)?
        }
        Command::Cel { path, width } => {
            export_sprite(&cli, &archive, path, SpriteFormat::Cel, *width)?
        }
        Command::Level {
            prefix,
            regions,
            map_size,
        } => export_level(&cli, &archive, prefix, regions, *map_size)?,
    }

    info!("Processing complete!");
    Ok(())
}

fn export_sprite(
    cli: &Cli,
    archive: &DirectoryArchive,
    path: &str,
    format: SpriteFormat,
    width: Option<usize>,
) -> Result<()> {
    let options = SpriteExportOptions {
        palette: cli.palette.clone(),
        width,
        columns: cli.columns,
        optimise: !cli.no_optimise,
    };
    let metadata = SpriteExtractor::new(archive)
        .extract_sprite(path, format, &options, &cli.output)
        .with_context(|| format!("Failed to export {}", path))?;
    info!(
        "Exported {} unique frames from {}",
        metadata.sheet.unique_frames, path
    );
    Ok(())
}

fn export_level(
    cli: &Cli,
    archive: &DirectoryArchive,
    prefix: &str,
    regions: &[RegionPlacement],
    map_size: Option<(usize, usize)>,
) -> Result<()> {
    let options = LevelExportOptions {
        prefix: prefix.to_string(),
        palette: cli.palette.clone(),
        regions: regions.to_vec(),
        map_size,
        columns: cli.columns,
        optimise: !cli.no_optimise,
    };
    let output_dir = cli.output.join(level_dir_name(prefix));
    let metadata = LevelExtractor::new(archive)
        .extract_level(&options, &output_dir)
        .with_context(|| format!("Failed to export level {}", prefix))?;
    info!(
        "Exported {} squares and {} tiles from {}",
        metadata.squares.len(),
        metadata.tiles.len(),
        prefix
    );
    Ok(())
}

/// Last path component of the level prefix, e.g. `levels/l1data/l1` -> `l1`
fn level_dir_name(prefix: &str) -> String {
    prefix
        .rsplit(&['/', '\\'][..])
        .find(|part| !part.is_empty())
        .unwrap_or("level")
        .to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_sizes_parse() {
        assert_eq!(parse_map_size("40x40"), Ok((40, 40)));
        assert_eq!(parse_map_size("96X48"), Ok((96, 48)));
        assert!(parse_map_size("40").is_err());
    }

    #[test]
    fn level_directories_come_from_the_prefix() {
        assert_eq!(level_dir_name("levels\\L1Data\\L1"), "l1");
        assert_eq!(level_dir_name("levels/towndata/town/"), "town");
    }

    #[test]
    fn cli_accepts_repeated_regions() {
        let cli = Cli::try_parse_from([
            "cel_scraper",
            "--no-optimise",
            "level",
            "levels/l1data/l1",
            "-r",
            "a.dun@0,0",
            "--region",
            "b.dun@4,0",
            "--map-size",
            "8x4",
        ])
        .unwrap();
        assert!(cli.no_optimise);
        match cli.command {
            Command::Level {
                regions, map_size, ..
            } => {
                assert_eq!(regions.len(), 2);
                assert_eq!(regions[1].x, 4);
                assert_eq!(map_size, Some((8, 4)));
            }
            _ => panic!("expected level command"),
        }
    }
}
