use anyhow::{bail, Context, Result};
use elevgrid::{Coverage, GeoPackage, StoreConfig, StoreConfigBuilder};
use std::path::PathBuf;

pub mod batch;
pub mod create;
pub mod geo;
pub mod import;
pub mod info;
pub mod list;
pub mod query;

/// Resolve the store configuration from flags, falling back to the environment.
pub fn store_config(gpkg: Option<PathBuf>, pool_size: u32, cache_size: u64) -> Result<StoreConfig> {
    let builder = match gpkg {
        Some(path) => StoreConfigBuilder::new(path),
        None => StoreConfigBuilder::from_env().context(
            "ELEVGRID_GPKG environment variable not set. Use --gpkg or set ELEVGRID_GPKG",
        )?,
    };
    Ok(builder.pool_size(pool_size).cache_size(cache_size).build())
}

/// Open a GeoPackage that must already exist.
pub fn open_existing(config: &StoreConfig) -> Result<GeoPackage> {
    if !config.gpkg_path().exists() {
        bail!("GeoPackage not found: {}", config.gpkg_path().display());
    }
    GeoPackage::open_with(config)
        .with_context(|| format!("Failed to open {}", config.gpkg_path().display()))
}

/// Open a completely registered coverage.
pub fn open_coverage(gpkg: &GeoPackage, table: &str) -> Result<Coverage> {
    Coverage::open(gpkg, table)
        .context("Failed to read coverage metadata")?
        .with_context(|| format!("No complete gridded coverage named '{}'", table))
}

/// The requested zoom level, or the deepest one the coverage defines.
pub fn resolve_zoom(coverage: &Coverage, zoom: Option<i32>) -> Result<i32> {
    match zoom {
        Some(z) => Ok(z),
        None => coverage
            .tile_table()
            .max_zoom()
            .context("Coverage has no zoom levels"),
    }
}
