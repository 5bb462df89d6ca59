//! Basic example demonstrating elevgrid library usage.
//!
//! Run with: cargo run --example basic -- /tmp/example.gpkg

use std::env;
use std::sync::Arc;

use elevgrid::geodesy::{bearing, distance};
use elevgrid::{
    insert_gridded_coverage, Coverage, CoverageError, CoverageSampler, GeoPackage, GeoPoint,
    GriddedCoverage,
};

fn main() -> Result<(), CoverageError> {
    let path = env::args().nth(1).unwrap_or_else(|| {
        eprintln!("Usage: cargo run --example basic -- /path/to/new.gpkg");
        std::process::exit(1);
    });

    let gpkg = GeoPackage::create(&path)?;
    if Coverage::open(&gpkg, "dem")?.is_none() {
        let descriptor = GriddedCoverage::default().with_precision(0.1);
        insert_gridded_coverage(&gpkg, "dem", &descriptor, 4326, 0, 4, None)?;
    }
    let Some(coverage) = Coverage::open(&gpkg, "dem")? else {
        eprintln!("coverage 'dem' is only partially registered in {path}");
        std::process::exit(1);
    };

    // A synthetic cone centred on the eastern zoom-0 tile
    let heights: Vec<f64> = (0..256 * 256)
        .map(|i| {
            let (row, col) = ((i / 256) as f64 - 128.0, (i % 256) as f64 - 128.0);
            (4000.0 - 30.0 * (row * row + col * col).sqrt()).max(0.0)
        })
        .collect();
    coverage.insert_heightmap(0, 1, 0, &heights)?;

    let sampler = CoverageSampler::new(Arc::new(coverage), 0, 10)?;

    let locations = [
        ("Summit", 0.0, 90.0),
        ("Mount Fuji, Japan", 35.3606, 138.7274),
        ("Mount Everest, Nepal", 27.9881, 86.9250),
        ("Denali, Alaska", 63.0695, -151.0074),
    ];

    println!("Elevation queries (nearest sample):");
    println!("{:-<50}", "");
    for (name, lat, lon) in &locations {
        let h = sampler.elevation(*lat, *lon);
        if h.is_nan() {
            println!("{}: no data", name);
        } else {
            println!("{}: {:.1}m", name, h);
        }
    }

    let fuji = GeoPoint::new(35.3606, 138.7274);
    let everest = GeoPoint::new(27.9881, 86.9250);
    println!(
        "\nFuji to Everest: {:.1} km, initial bearing {:.2}°",
        distance(&fuji, &everest) / 1000.0,
        bearing(&fuji, &everest)
    );

    let stats = sampler.cache_stats();
    println!("\nCache statistics:");
    println!("  Hits: {}", stats.hit_count);
    println!("  Misses: {}", stats.miss_count);
    println!("  Hit rate: {:.1}%", stats.hit_rate() * 100.0);

    Ok(())
}
