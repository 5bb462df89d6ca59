use anyhow::{Context, Result};
use elevgrid::{Coverage, StoreConfig};

pub fn run(config: StoreConfig) -> Result<()> {
    let gpkg = super::open_existing(&config)?;
    let names = Coverage::list(&gpkg).context("Failed to list coverages")?;

    if names.is_empty() {
        println!(
            "No gridded coverages found in: {}",
            config.gpkg_path().display()
        );
        return Ok(());
    }

    println!(
        "{:<24} {:>8} {:>10} {:>8} {:>8}",
        "COVERAGE", "SRS", "DATATYPE", "ZOOMS", "TILES"
    );
    println!("{}", "-".repeat(62));

    let mut total_tiles = 0;
    for name in &names {
        let coverage = super::open_coverage(&gpkg, name)?;
        let tiles = coverage.tile_table();
        let zooms = match (tiles.min_zoom(), tiles.max_zoom()) {
            (Some(min), Some(max)) => format!("{}-{}", min, max),
            _ => "-".to_string(),
        };
        let count: u64 = coverage.tile_counts()?.iter().map(|(_, n)| n).sum();
        total_tiles += count;

        println!(
            "{:<24} {:>8} {:>10} {:>8} {:>8}",
            name,
            tiles.srs_id(),
            coverage.descriptor().datatype.as_str(),
            zooms,
            count
        );
    }

    println!();
    println!("Summary:");
    println!("  Coverages: {}", names.len());
    println!("  Total tiles: {}", total_tiles);
    println!("  GeoPackage: {}", config.gpkg_path().display());
    Ok(())
}
