//! # elevgrid - GeoPackage Elevation Coverages
//!
//! Reads and writes gridded elevation data stored in GeoPackage files using
//! the OGC 2D gridded coverage extension, plus the geodetic calculations that
//! usually sit next to an elevation store.
//!
//! ## Features
//!
//! - **Coverage store**: atomic registration, tile upserts with per-tile
//!   statistics, and decoding back to meters with no-data as `NaN`
//! - **Interoperable schema**: bit-exact ancillary tables, extension rows and
//!   the WGS 84 3D CRS through the CRS WKT extension
//! - **Point queries**: cached nearest-sample lookups on 4326, 4979, 3857
//!   and 3395 grids
//! - **Geodesy**: Vincenty distance and bearing, destination points,
//!   line-of-bearing intersection, grid convergence, HAE/MSL conversion
//! - **Imports**: SRTM `.hgt` tiles, raw or compressed
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use elevgrid::{insert_gridded_coverage, Coverage, CoverageSampler, GeoPackage, GriddedCoverage};
//!
//! let gpkg = GeoPackage::create("/data/terrain.gpkg")?;
//! insert_gridded_coverage(&gpkg, "dem", &GriddedCoverage::default(), 4326, 0, 10, None)?;
//!
//! let coverage = Arc::new(Coverage::open(&gpkg, "dem")?.expect("registered"));
//! coverage.insert_heightmap(0, 1, 0, &vec![42.0; 256 * 256])?;
//!
//! let sampler = CoverageSampler::new(coverage, 0, 64)?;
//! assert_eq!(sampler.elevation(10.0, 10.0), 42.0);
//! # Ok::<(), elevgrid::CoverageError>(())
//! ```
//!
//! ## Tile Encoding
//!
//! Integer coverages store unsigned 16-bit samples, float coverages 32-bit
//! floats, in a DEFLATE-compressed raster (see [`coverage::codec`]). A
//! stored sample maps to meters through the tile's scale and offset, then
//! the coverage's, then the unit of measure.

pub mod config;
pub mod coverage;
pub mod error;
pub mod geodesy;
pub mod gpkg;
pub mod hgt;
pub mod sampler;
pub mod units;

// Re-export main types at crate root for convenience
pub use config::{StoreConfig, StoreConfigBuilder};
pub use coverage::{
    insert_gridded_coverage, insert_gridded_coverage_with_matrix, registration_state, Coverage,
    CoverageRegistrationState, Datatype, GridCellEncoding, GriddedCoverage, TileData,
    TileStatistics,
};
pub use error::{CoverageError, Result};
pub use geodesy::{GeoCalculator, GeoPoint, HeightSource, MagneticModel};
pub use gpkg::{Bounds, GeoPackage};
pub use hgt::{HgtMosaic, HgtTile};
pub use sampler::{CacheStats, CoverageSampler};
pub use units::{LengthUnit, UnitsOfMeasure};
