use anyhow::Result;
use elevgrid::gpkg::{self, CrsWkt};
use elevgrid::StoreConfig;

pub fn run(config: StoreConfig, table: &str) -> Result<()> {
    let gpkg = super::open_existing(&config)?;
    let coverage = super::open_coverage(&gpkg, table)?;
    let descriptor = coverage.descriptor();
    let tiles = coverage.tile_table();

    let (contents, wkt) = {
        let conn = gpkg.connection()?;
        (
            gpkg::contents(&conn, table)?,
            CrsWkt::definition(&conn, tiles.srs_id())?,
        )
    };

    println!("Coverage: {}", table);
    println!("GeoPackage: {}", config.gpkg_path().display());
    println!();
    println!("Datatype: {}", descriptor.datatype);
    println!(
        "Scale / offset: {} / {}",
        descriptor.scale, descriptor.offset
    );
    println!("Precision: {}", descriptor.precision);
    println!("No-data value: {}", descriptor.null_value());
    println!("Grid cell encoding: {}", descriptor.grid_cell_encoding.as_str());
    println!(
        "Unit of measure: {} ({} m per unit)",
        descriptor.uom.as_deref().unwrap_or("m"),
        coverage.units_to_meters()
    );
    println!(
        "SRS: EPSG:{}{}",
        tiles.srs_id(),
        if wkt.is_some() { " (WKT 2 definition)" } else { "" }
    );
    if let Some(bounds) = contents.and_then(|c| c.bounds) {
        println!(
            "Bounds: [{:.6}, {:.6}, {:.6}, {:.6}]",
            bounds.min_x, bounds.min_y, bounds.max_x, bounds.max_y
        );
    }
    println!();

    let counts = coverage.tile_counts()?;
    println!(
        "{:>5} {:>12} {:>10} {:>16} {:>8}",
        "ZOOM", "MATRIX", "TILE", "PIXEL SIZE", "STORED"
    );
    println!("{}", "-".repeat(55));
    for z in tiles.zoom_levels() {
        let stored = counts
            .iter()
            .find(|(zoom, _)| *zoom == z.zoom_level)
            .map(|(_, n)| *n)
            .unwrap_or(0);
        println!(
            "{:>5} {:>12} {:>10} {:>16.9} {:>8}",
            z.zoom_level,
            format!("{}x{}", z.matrix_width, z.matrix_height),
            format!("{}x{}", z.tile_width, z.tile_height),
            z.pixel_x_size,
            stored
        );
    }

    let total: u64 = counts.iter().map(|(_, n)| n).sum();
    println!();
    println!("Total tiles: {}", total);
    Ok(())
}
