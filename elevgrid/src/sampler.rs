//! Point elevation queries against one zoom level of a coverage.
//!
//! Decoded tiles are kept in a `moka` cache, so repeated queries in the same
//! area touch SQLite once per tile.

use std::f64::consts::{FRAC_PI_2, FRAC_PI_4};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use moka::sync::Cache;

use crate::coverage::{Coverage, GridCellEncoding};
use crate::error::{CoverageError, Result};
use crate::geodesy::ellipsoid::{WGS84_A, WGS84_E2};
use crate::geodesy::HeightSource;
use crate::gpkg::TileIndex;

/// Statistics about cache usage.
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    /// Number of tiles currently in the cache.
    pub entry_count: u64,
    /// Number of cache hits (requests served from cache).
    pub hit_count: u64,
    /// Number of cache misses (tiles read from the GeoPackage).
    pub miss_count: u64,
}

impl CacheStats {
    /// Calculate the cache hit rate (0.0 to 1.0).
    ///
    /// Returns 0.0 if no requests have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hit_count + self.miss_count;
        if total == 0 {
            0.0
        } else {
            self.hit_count as f64 / total as f64
        }
    }
}

/// Decoded tile, `None` when the tile is absent from the table.
type CachedTile = Option<Arc<Vec<f64>>>;

/// Nearest-sample elevation lookups on a coverage.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use elevgrid::{Coverage, CoverageSampler, GeoPackage};
///
/// let gpkg = GeoPackage::open("/data/terrain.gpkg")?;
/// let coverage = Arc::new(Coverage::open(&gpkg, "dem")?.expect("registered"));
/// let sampler = CoverageSampler::new(coverage, 10, 64)?;
/// println!("{}m", sampler.elevation(35.3606, 138.7274));
/// # Ok::<(), elevgrid::CoverageError>(())
/// ```
pub struct CoverageSampler {
    coverage: Arc<Coverage>,
    zoom: i32,
    srs_id: i32,
    tile_cache: Cache<(i32, i32), CachedTile>,
    hit_count: AtomicU64,
    miss_count: AtomicU64,
}

impl CoverageSampler {
    /// Sample `zoom` of `coverage`, caching up to `cache_size` decoded tiles.
    ///
    /// Fails if the zoom level is not part of the coverage's tile matrix.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let coverage = Arc::new(Coverage::open(&gpkg, "dem")?.expect("registered"));
    /// // the deepest zoom, keeping up to 256 decoded tiles
    /// let zoom = coverage.tile_table().max_zoom().unwrap_or(0);
    /// let sampler = CoverageSampler::new(coverage, zoom, 256)?;
    /// ```
    pub fn new(coverage: Arc<Coverage>, zoom: i32, cache_size: u64) -> Result<Self> {
        coverage.tile_table().require_zoom_level(zoom)?;
        let srs_id = coverage.tile_table().srs_id();
        Ok(Self {
            coverage,
            zoom,
            srs_id,
            tile_cache: Cache::builder().max_capacity(cache_size).build(),
            hit_count: AtomicU64::new(0),
            miss_count: AtomicU64::new(0),
        })
    }

    pub fn coverage(&self) -> &Coverage {
        &self.coverage
    }

    pub fn zoom(&self) -> i32 {
        self.zoom
    }

    /// Elevation in meters, `NaN` outside the coverage, on missing tiles and
    /// on no-data samples.
    ///
    /// Read errors are logged and also reported as `NaN`; use
    /// [`try_elevation`](Self::try_elevation) to see them.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let h = sampler.elevation(19.4326, -99.1332); // Mexico City
    /// if !h.is_nan() {
    ///     println!("Elevation: {:.1}m", h);
    /// }
    /// ```
    pub fn elevation(&self, lat: f64, lon: f64) -> f64 {
        match self.try_elevation(lat, lon) {
            Ok(h) => h,
            Err(e) => {
                tracing::warn!(lat, lon, error = %e, "coverage lookup failed");
                f64::NAN
            }
        }
    }

    /// Like [`elevation`](Self::elevation) but surfacing read and decode errors.
    ///
    /// # Example
    ///
    /// ```ignore
    /// match sampler.try_elevation(35.3606, 138.7274) {
    ///     Ok(h) if h.is_nan() => println!("no data"),
    ///     Ok(h) => println!("{:.1}m", h),
    ///     Err(e) => eprintln!("read failed: {}", e),
    /// }
    /// ```
    pub fn try_elevation(&self, lat: f64, lon: f64) -> Result<f64> {
        let Some((x, y)) = project(self.srs_id, lat, lon) else {
            return Ok(f64::NAN);
        };
        let Some(index) = self.coverage.tile_table().locate(self.zoom, x, y) else {
            return Ok(f64::NAN);
        };
        let Some(samples) = self.load_tile(index.column, index.row)? else {
            return Ok(f64::NAN);
        };
        let i = self.sample_index(&index);
        Ok(samples.get(i).copied().unwrap_or(f64::NAN))
    }

    /// Elevations for many points, `NaN` where unknown.
    ///
    /// Points falling in the same tile share one decode.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let track = [(35.36, 138.72), (35.37, 138.73), (35.38, 138.74)];
    /// let profile = sampler.elevations(&track);
    /// assert_eq!(profile.len(), track.len());
    /// ```
    pub fn elevations(&self, coords: &[(f64, f64)]) -> Vec<f64> {
        coords
            .iter()
            .map(|&(lat, lon)| self.elevation(lat, lon))
            .collect()
    }

    fn sample_index(&self, index: &TileIndex) -> usize {
        // locate only succeeds for zoom levels that exist
        let (width, height) = self
            .coverage
            .tile_table()
            .zoom_level(self.zoom)
            .map(|z| (z.tile_width as usize, z.tile_height as usize))
            .unwrap_or((1, 1));
        let pick = |p: f64, n: usize| {
            let i = match self.coverage.descriptor().grid_cell_encoding {
                GridCellEncoding::GridValueIsCorner => p.round(),
                GridCellEncoding::GridValueIsCenter | GridCellEncoding::GridValueIsArea => {
                    p.floor()
                }
            };
            (i.max(0.0) as usize).min(n.saturating_sub(1))
        };
        pick(index.pixel_y, height) * width + pick(index.pixel_x, width)
    }

    fn load_tile(&self, column: i32, row: i32) -> Result<CachedTile> {
        let key = (column, row);
        if let Some(tile) = self.tile_cache.get(&key) {
            self.hit_count.fetch_add(1, Ordering::Relaxed);
            return Ok(tile);
        }
        self.miss_count.fetch_add(1, Ordering::Relaxed);

        let tile = self
            .coverage
            .get_tile(self.zoom, column, row)?
            .map(Arc::new);
        self.tile_cache.insert(key, tile.clone());
        Ok(tile)
    }

    pub fn cache_stats(&self) -> CacheStats {
        CacheStats {
            entry_count: self.tile_cache.entry_count(),
            hit_count: self.hit_count.load(Ordering::Relaxed),
            miss_count: self.miss_count.load(Ordering::Relaxed),
        }
    }

    /// Drop one cached tile so the next query rereads it.
    pub fn invalidate_tile(&self, column: i32, row: i32) {
        self.tile_cache.invalidate(&(column, row));
    }

    pub fn clear_cache(&self) {
        self.tile_cache.invalidate_all();
    }
}

impl HeightSource for CoverageSampler {
    fn height(&self, latitude: f64, longitude: f64) -> f64 {
        self.elevation(latitude, longitude)
    }
}

/// Latitude limit of the Mercator grids.
const MERCATOR_MAX_LAT: f64 = 85.084_059_050_110_56;

/// Project WGS-84 degrees into the CRS of a supported SRID.
///
/// Geographic SRIDs (4326, 4979) use `(lon, lat)`; 3857 is spherical and
/// 3395 ellipsoidal Mercator in meters. `None` for other SRIDs or
/// latitudes a Mercator grid cannot hold.
pub fn project(srid: i32, lat: f64, lon: f64) -> Option<(f64, f64)> {
    if !lat.is_finite() || !lon.is_finite() {
        return None;
    }
    match srid {
        4326 | 4979 => Some((lon, lat)),
        3857 | 3395 if lat.abs() > MERCATOR_MAX_LAT => None,
        3857 => {
            let phi = lat.to_radians();
            Some((
                WGS84_A * lon.to_radians(),
                WGS84_A * (FRAC_PI_4 + phi / 2.0).tan().ln(),
            ))
        }
        3395 => {
            let phi = lat.to_radians();
            let e = WGS84_E2.sqrt();
            let es = e * phi.sin();
            let y = WGS84_A
                * ((FRAC_PI_4 + phi / 2.0).tan() * ((1.0 - es) / (1.0 + es)).powf(e / 2.0)).ln();
            Some((WGS84_A * lon.to_radians(), y))
        }
        _ => None,
    }
}

/// Inverse of [`project`], returning `(lat, lon)` in degrees.
pub fn unproject(srid: i32, x: f64, y: f64) -> Option<(f64, f64)> {
    if !x.is_finite() || !y.is_finite() {
        return None;
    }
    let lon = (x / WGS84_A).to_degrees();
    match srid {
        4326 | 4979 => Some((y, x)),
        3857 => Some(((2.0 * (y / WGS84_A).exp().atan() - FRAC_PI_2).to_degrees(), lon)),
        3395 => {
            let e = WGS84_E2.sqrt();
            let t = (-y / WGS84_A).exp();
            let mut phi = FRAC_PI_2 - 2.0 * t.atan();
            for _ in 0..15 {
                let es = e * phi.sin();
                let next = FRAC_PI_2 - 2.0 * (t * ((1.0 - es) / (1.0 + es)).powf(e / 2.0)).atan();
                let done = (next - phi).abs() < 1e-12;
                phi = next;
                if done {
                    break;
                }
            }
            Some((phi.to_degrees(), lon))
        }
        _ => None,
    }
}

/// Heightmap for one tile of `coverage`, sampling `source` at pixel
/// centers, or at pixel corners for corner-encoded coverages.
pub fn render_tile(
    coverage: &Coverage,
    zoom: i32,
    column: i32,
    row: i32,
    source: &dyn HeightSource,
) -> Result<Vec<f64>> {
    let table = coverage.tile_table();
    let level = table.require_zoom_level(zoom)?;
    let bounds = table
        .tile_bounds(zoom, column, row)
        .ok_or_else(|| CoverageError::UnknownZoomLevel {
            table: table.name().to_string(),
            zoom,
        })?;
    let shift = match coverage.descriptor().grid_cell_encoding {
        GridCellEncoding::GridValueIsCorner => 0.0,
        _ => 0.5,
    };
    let srid = table.srs_id();
    let (width, height) = (level.tile_width as usize, level.tile_height as usize);

    let mut heights = Vec::with_capacity(width * height);
    for r in 0..height {
        let y = bounds.max_y - (r as f64 + shift) * level.pixel_y_size;
        for c in 0..width {
            let x = bounds.min_x + (c as f64 + shift) * level.pixel_x_size;
            heights.push(match unproject(srid, x, y) {
                Some((lat, lon)) => source.height(lat, lon),
                None => f64::NAN,
            });
        }
    }
    Ok(heights)
}

/// `(column, row)` of every tile at `zoom` touching a latitude/longitude box.
///
/// # Example
///
/// ```ignore
/// // every tile of zoom 8 over the 1° cell N35E138
/// for (column, row) in tiles_covering(&coverage, 8, 35.0, 138.0, 36.0, 139.0)? {
///     let heights = render_tile(&coverage, 8, column, row, &mosaic)?;
///     coverage.insert_heightmap(8, column, row, &heights)?;
/// }
/// ```
pub fn tiles_covering(
    coverage: &Coverage,
    zoom: i32,
    min_lat: f64,
    min_lon: f64,
    max_lat: f64,
    max_lon: f64,
) -> Result<Vec<(i32, i32)>> {
    let table = coverage.tile_table();
    let level = table.require_zoom_level(zoom)?;
    let srid = table.srs_id();
    let origin = table.matrix_set().bounds;

    let clamp_lat = |lat: f64| match srid {
        3857 | 3395 => lat.clamp(-MERCATOR_MAX_LAT, MERCATOR_MAX_LAT),
        _ => lat,
    };
    let (west, north) = project(srid, clamp_lat(max_lat), min_lon)
        .ok_or(CoverageError::UnsupportedSrid(srid))?;
    let (east, south) = project(srid, clamp_lat(min_lat), max_lon)
        .ok_or(CoverageError::UnsupportedSrid(srid))?;

    let column = |x: f64| {
        ((x - origin.min_x) / level.tile_span_x())
            .floor()
            .clamp(0.0, (level.matrix_width - 1) as f64) as i32
    };
    let row = |y: f64| {
        ((origin.max_y - y) / level.tile_span_y())
            .floor()
            .clamp(0.0, (level.matrix_height - 1) as f64) as i32
    };

    let mut tiles = Vec::new();
    for r in row(north)..=row(south) {
        for c in column(west)..=column(east) {
            tiles.push((c, r));
        }
    }
    Ok(tiles)
}
