//! Tile matrix sets and their zoom levels.

use r2d2_sqlite::rusqlite::{params, Connection, OptionalExtension};

use super::{validate_table_name, Bounds};
use crate::error::{CoverageError, Result};

/// Relative tolerance before a stored pixel size is considered inconsistent
/// with the matrix bounds.
const PIXEL_SIZE_TOLERANCE: f64 = 1e-9;

/// One row of `gpkg_tile_matrix`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoomLevelRow {
    pub zoom_level: i32,
    /// Number of tile columns.
    pub matrix_width: i32,
    /// Number of tile rows.
    pub matrix_height: i32,
    /// Tile width in pixels.
    pub tile_width: i32,
    /// Tile height in pixels.
    pub tile_height: i32,
    /// Pixel width in CRS units.
    pub pixel_x_size: f64,
    /// Pixel height in CRS units.
    pub pixel_y_size: f64,
}

impl ZoomLevelRow {
    /// The zoom-0 level of the default quadtree for a supported SRID.
    pub fn zoom0(srid: i32) -> Option<ZoomLevelRow> {
        let (matrix_width, pixel) = match srid {
            4326 | 4979 => (2, 180.0 / 256.0),
            3857 => (1, 156543.03392804097),
            3395 => (1, 156543.034),
            _ => return None,
        };
        Some(ZoomLevelRow {
            zoom_level: 0,
            matrix_width,
            matrix_height: 1,
            tile_width: 256,
            tile_height: 256,
            pixel_x_size: pixel,
            pixel_y_size: pixel,
        })
    }

    /// The next level down the quadtree: twice the tiles, half the pixel size.
    pub fn next(&self) -> ZoomLevelRow {
        ZoomLevelRow {
            zoom_level: self.zoom_level + 1,
            matrix_width: self.matrix_width * 2,
            matrix_height: self.matrix_height * 2,
            tile_width: self.tile_width,
            tile_height: self.tile_height,
            pixel_x_size: self.pixel_x_size / 2.0,
            pixel_y_size: self.pixel_y_size / 2.0,
        }
    }

    /// Samples per tile.
    pub fn tile_pixels(&self) -> usize {
        self.tile_width.max(0) as usize * self.tile_height.max(0) as usize
    }

    /// Width of one tile in CRS units.
    pub fn tile_span_x(&self) -> f64 {
        self.tile_width as f64 * self.pixel_x_size
    }

    /// Height of one tile in CRS units.
    pub fn tile_span_y(&self) -> f64 {
        self.tile_height as f64 * self.pixel_y_size
    }
}

/// `count` quadtree levels starting at `zoom0`.
pub fn create_quadtree(zoom0: ZoomLevelRow, count: usize) -> Vec<ZoomLevelRow> {
    std::iter::successors(Some(zoom0), |z| Some(z.next()))
        .take(count)
        .collect()
}

/// Top-left corner of the default grid for a supported SRID.
pub fn grid_origin(srid: i32) -> Option<(f64, f64)> {
    match srid {
        4326 | 4979 => Some((-180.0, 90.0)),
        3857 | 3395 => Some((-20037508.342789244, 20037508.342789244)),
        _ => None,
    }
}

/// One row of `gpkg_tile_matrix_set`.
#[derive(Debug, Clone, PartialEq)]
pub struct TileMatrixSet {
    pub table_name: String,
    pub srs_id: i32,
    pub bounds: Bounds,
}

impl TileMatrixSet {
    /// The default matrix set for a supported SRID, sized so that `zoom0`
    /// covers it exactly.
    pub fn for_srid(table_name: &str, srid: i32, zoom0: &ZoomLevelRow) -> Result<TileMatrixSet> {
        let (min_x, max_y) = grid_origin(srid).ok_or(CoverageError::UnsupportedSrid(srid))?;
        let max_x = min_x + zoom0.matrix_width as f64 * zoom0.tile_span_x();
        let min_y = max_y - zoom0.matrix_height as f64 * zoom0.tile_span_y();
        Ok(TileMatrixSet {
            table_name: table_name.to_string(),
            srs_id: srid,
            bounds: Bounds::new(min_x, min_y, max_x, max_y),
        })
    }
}

/// Position of a point within a tile matrix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileIndex {
    pub zoom_level: i32,
    pub column: i32,
    pub row: i32,
    /// Offset from the tile's left edge, in pixels.
    pub pixel_x: f64,
    /// Offset from the tile's top edge, in pixels.
    pub pixel_y: f64,
}

/// A tile pyramid: its matrix set and zoom levels.
#[derive(Debug, Clone)]
pub struct TileTable {
    matrix_set: TileMatrixSet,
    zoom_levels: Vec<ZoomLevelRow>,
}

impl TileTable {
    pub fn new(matrix_set: TileMatrixSet, mut zoom_levels: Vec<ZoomLevelRow>) -> Self {
        zoom_levels.sort_by_key(|z| z.zoom_level);
        Self {
            matrix_set,
            zoom_levels,
        }
    }

    /// Load a tile table's matrix set and zoom levels.
    ///
    /// Pixel sizes that disagree with the matrix bounds are recomputed from
    /// the bounds. Returns `None` if the table has no matrix set.
    pub fn load(conn: &Connection, table_name: &str) -> Result<Option<TileTable>> {
        validate_table_name(table_name)?;

        let matrix_set = conn
            .query_row(
                "SELECT srs_id, min_x, min_y, max_x, max_y FROM gpkg_tile_matrix_set WHERE table_name = ?1",
                params![table_name],
                |r| {
                    Ok(TileMatrixSet {
                        table_name: table_name.to_string(),
                        srs_id: r.get(0)?,
                        bounds: Bounds::new(r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?),
                    })
                },
            )
            .optional()?;
        let Some(matrix_set) = matrix_set else {
            return Ok(None);
        };

        let mut stmt = conn.prepare(
            "SELECT zoom_level, matrix_width, matrix_height, tile_width, tile_height, pixel_x_size, pixel_y_size
             FROM gpkg_tile_matrix WHERE table_name = ?1 ORDER BY zoom_level",
        )?;
        let rows = stmt.query_map(params![table_name], |r| {
            Ok(ZoomLevelRow {
                zoom_level: r.get(0)?,
                matrix_width: r.get(1)?,
                matrix_height: r.get(2)?,
                tile_width: r.get(3)?,
                tile_height: r.get(4)?,
                pixel_x_size: r.get(5)?,
                pixel_y_size: r.get(6)?,
            })
        })?;

        let mut zoom_levels = Vec::new();
        for row in rows {
            zoom_levels.push(repair_pixel_size(table_name, &matrix_set.bounds, row?));
        }
        Ok(Some(TileTable::new(matrix_set, zoom_levels)))
    }

    pub fn name(&self) -> &str {
        &self.matrix_set.table_name
    }

    pub fn srs_id(&self) -> i32 {
        self.matrix_set.srs_id
    }

    pub fn matrix_set(&self) -> &TileMatrixSet {
        &self.matrix_set
    }

    /// Zoom levels in ascending order.
    pub fn zoom_levels(&self) -> &[ZoomLevelRow] {
        &self.zoom_levels
    }

    pub fn zoom_level(&self, zoom: i32) -> Option<&ZoomLevelRow> {
        self.zoom_levels.iter().find(|z| z.zoom_level == zoom)
    }

    /// Like [`zoom_level`](Self::zoom_level), as an error when missing.
    pub fn require_zoom_level(&self, zoom: i32) -> Result<&ZoomLevelRow> {
        self.zoom_level(zoom)
            .ok_or_else(|| CoverageError::UnknownZoomLevel {
                table: self.name().to_string(),
                zoom,
            })
    }

    pub fn min_zoom(&self) -> Option<i32> {
        self.zoom_levels.first().map(|z| z.zoom_level)
    }

    pub fn max_zoom(&self) -> Option<i32> {
        self.zoom_levels.last().map(|z| z.zoom_level)
    }

    /// Extent of one tile in CRS units.
    pub fn tile_bounds(&self, zoom: i32, column: i32, row: i32) -> Option<Bounds> {
        let z = self.zoom_level(zoom)?;
        let origin = &self.matrix_set.bounds;
        let min_x = origin.min_x + column as f64 * z.tile_span_x();
        let max_y = origin.max_y - row as f64 * z.tile_span_y();
        Some(Bounds::new(
            min_x,
            max_y - z.tile_span_y(),
            min_x + z.tile_span_x(),
            max_y,
        ))
    }

    /// The tile containing `(x, y)` at `zoom`, or `None` outside the matrix.
    pub fn locate(&self, zoom: i32, x: f64, y: f64) -> Option<TileIndex> {
        let z = self.zoom_level(zoom)?;
        let origin = &self.matrix_set.bounds;
        let fx = (x - origin.min_x) / z.tile_span_x();
        let fy = (origin.max_y - y) / z.tile_span_y();
        if !fx.is_finite() || !fy.is_finite() || fx < 0.0 || fy < 0.0 {
            return None;
        }
        let column = fx.floor() as i64;
        let row = fy.floor() as i64;
        if column >= z.matrix_width as i64 || row >= z.matrix_height as i64 {
            return None;
        }
        Some(TileIndex {
            zoom_level: zoom,
            column: column as i32,
            row: row as i32,
            pixel_x: (fx - column as f64) * z.tile_width as f64,
            pixel_y: (fy - row as f64) * z.tile_height as f64,
        })
    }
}

fn repair_pixel_size(table_name: &str, bounds: &Bounds, mut z: ZoomLevelRow) -> ZoomLevelRow {
    let expected_x = bounds.width() / (z.matrix_width as f64 * z.tile_width as f64);
    let expected_y = bounds.height() / (z.matrix_height as f64 * z.tile_height as f64);

    let off = |actual: f64, expected: f64| {
        expected.is_finite() && ((actual - expected) / expected).abs() > PIXEL_SIZE_TOLERANCE
    };
    if off(z.pixel_x_size, expected_x) || off(z.pixel_y_size, expected_y) {
        tracing::warn!(
            table = table_name,
            zoom = z.zoom_level,
            pixel_x_size = z.pixel_x_size,
            pixel_y_size = z.pixel_y_size,
            expected_x,
            expected_y,
            "pixel size inconsistent with tile matrix bounds, using bounds"
        );
        z.pixel_x_size = expected_x;
        z.pixel_y_size = expected_y;
    }
    z
}
