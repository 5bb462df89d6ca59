//! Error types for the elevgrid library.

use std::path::PathBuf;
use thiserror::Error;

use r2d2_sqlite::rusqlite;

/// Errors that can occur when working with gridded coverages.
///
/// Geodetic calculations never produce these; they report unknown results as
/// `NaN`. Absent tiles and unregistered coverages are `Ok(None)`, not errors.
#[derive(Error, Debug)]
pub enum CoverageError {
    /// IO error when reading files.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Error reported by SQLite.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A pooled connection could not be obtained.
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// Datatype other than `integer` or `float`.
    #[error("unsupported coverage datatype: {0:?} (expected \"integer\" or \"float\")")]
    InvalidDatatype(String),

    /// Scale or offset is NaN or infinite.
    #[error("{name} must be finite, got {value}")]
    NonFinite { name: &'static str, value: f64 },

    /// A zero scale cannot be inverted when encoding.
    #[error("{name} must be non-zero")]
    ZeroScale { name: &'static str },

    /// SRID has no default quadtree grid.
    #[error("unsupported SRID {0} (supported: 4326, 4979, 3857, 3395)")]
    UnsupportedSrid(i32),

    /// Zoom range is empty or negative.
    #[error("invalid zoom range {min}..={max}")]
    InvalidZoomRange { min: i32, max: i32 },

    /// The tile matrix has no row for this zoom level.
    #[error("zoom level {zoom} is not defined for '{table}'")]
    UnknownZoomLevel { table: String, zoom: i32 },

    /// Heightmap length does not match the zoom level's tile size.
    #[error("heightmap has {actual} samples, tile is {width}x{height}")]
    SampleCountMismatch {
        actual: usize,
        width: usize,
        height: usize,
    },

    /// Decoded raster dimensions differ from the zoom level's tile size.
    #[error("decoded tile is {actual_width}x{actual_height}, expected {width}x{height}")]
    TileSizeMismatch {
        width: usize,
        height: usize,
        actual_width: usize,
        actual_height: usize,
    },

    /// Integer coverages store u16 samples, so the null must be one of them.
    #[error("integer data_null must be a whole number in 0..=65535, got {0}")]
    InvalidDataNull(f64),

    /// Encoded tile buffer could not be parsed.
    #[error("corrupt tile data: {0}")]
    CorruptTile(String),

    /// Table names are interpolated into SQL and must be plain identifiers.
    #[error("invalid table name: {0:?}")]
    InvalidTableName(String),

    /// A coverage descriptor already exists for this tile matrix set.
    #[error("gridded coverage '{0}' is already registered")]
    CoverageExists(String),

    /// A tile pyramid would be created over a table that already exists.
    #[error("table '{0}' already exists")]
    TableExists(String),

    /// The CRS WKT extension could not be installed.
    #[error("CRS WKT extension is not available in this GeoPackage")]
    CrsWktUnavailable,

    /// File size doesn't match SRTM1 or SRTM3 format.
    #[error("Invalid HGT file size: {size} bytes (expected 25934402 for SRTM1 or 2884802 for SRTM3)")]
    InvalidHgtSize { size: usize },

    /// The HGT archive did not contain a `.hgt` entry.
    #[error("no .hgt entry in archive: {path}")]
    HgtNotInArchive { path: PathBuf },

    /// Zip archive could not be read.
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

/// Result type alias using [`CoverageError`].
pub type Result<T> = std::result::Result<T, CoverageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoverageError::InvalidDatatype("double".into());
        assert!(err.to_string().contains("double"));

        let err = CoverageError::UnsupportedSrid(32633);
        assert!(err.to_string().contains("32633"));

        let err = CoverageError::SampleCountMismatch {
            actual: 10,
            width: 3,
            height: 3,
        };
        assert!(err.to_string().contains("3x3"));

        let err = CoverageError::NonFinite {
            name: "scale",
            value: f64::NAN,
        };
        assert!(err.to_string().contains("scale"));
    }
}
