use anyhow::{Context, Result};
use elevgrid::hgt::{HgtMosaic, HgtTile};
use elevgrid::sampler::{render_tile, tiles_covering};
use elevgrid::StoreConfig;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;

pub fn run(config: StoreConfig, table: &str, zoom: i32, files: &[PathBuf]) -> Result<()> {
    let gpkg = super::open_existing(&config)?;
    let coverage = super::open_coverage(&gpkg, table)?;
    coverage
        .tile_table()
        .require_zoom_level(zoom)
        .with_context(|| format!("Zoom {} is not part of '{}'", zoom, table))?;

    let mut mosaic = HgtMosaic::default();
    for path in files {
        let tile = HgtTile::from_file(path)
            .with_context(|| format!("Failed to load {}", path.display()))?;
        mosaic.push(tile);
    }
    let (south, west, north, east) = mosaic.extent().context("No .hgt files given")?;

    let tiles = tiles_covering(&coverage, zoom, south, west, north, east)?;
    tracing::info!(
        table,
        zoom,
        sources = mosaic.len(),
        tiles = tiles.len(),
        "importing hgt tiles"
    );

    let pb = ProgressBar::new(tiles.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
            )?
            .progress_chars("#>-"),
    );

    let (mut written, mut skipped) = (0u64, 0u64);
    for (column, row) in tiles {
        let mut heights = render_tile(&coverage, zoom, column, row, &mosaic)?;
        if heights.iter().all(|h| h.is_nan()) {
            skipped += 1;
            pb.inc(1);
            continue;
        }

        // keep what earlier imports wrote where these sources have no data
        if let Some(existing) = coverage.get_tile(zoom, column, row)? {
            for (h, old) in heights.iter_mut().zip(existing) {
                if h.is_nan() {
                    *h = old;
                }
            }
        }

        coverage
            .insert_heightmap(zoom, column, row, &heights)
            .with_context(|| format!("Failed to write tile {}/{}/{}", zoom, column, row))?;
        written += 1;
        pb.inc(1);
    }
    pb.finish_with_message("done");

    println!(
        "Imported {} .hgt file(s) into '{}': {} tile(s) written, {} without data",
        files.len(),
        table,
        written,
        skipped
    );
    Ok(())
}
