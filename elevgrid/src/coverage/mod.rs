//! The GeoPackage 2D gridded coverage extension (OGC 17-066r1).
//!
//! A coverage is a tile pyramid whose tiles hold elevation samples instead
//! of imagery. Each sample passes through two affine transforms on its way
//! to meters: the per-tile one stored in `gpkg_2d_gridded_tile_ancillary`
//! and the coverage-wide one stored in `gpkg_2d_gridded_coverage_ancillary`,
//! followed by the unit-of-measure factor:
//!
//! ```text
//! meters = ((raw * tile_scale + tile_offset) * scale + offset) * units_to_meters
//! ```
//!
//! Samples equal to the no-data value decode to `NaN`.
//!
//! # Example
//!
//! ```no_run
//! use elevgrid::coverage::{insert_gridded_coverage, Coverage, GriddedCoverage};
//! use elevgrid::gpkg::GeoPackage;
//!
//! let gpkg = GeoPackage::create("/tmp/terrain.gpkg")?;
//! insert_gridded_coverage(&gpkg, "dem", &GriddedCoverage::default(), 4326, 0, 8, None)?;
//!
//! let coverage = Coverage::open(&gpkg, "dem")?.expect("just registered");
//! let heights = vec![120.0; 256 * 256];
//! coverage.insert_heightmap(3, 4, 2, &heights)?;
//! assert_eq!(coverage.get_tile(3, 4, 2)?.unwrap()[0], 120.0);
//! # Ok::<(), elevgrid::CoverageError>(())
//! ```

pub mod codec;
pub mod stats;

use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;

use r2d2_sqlite::rusqlite::{params, Connection, OptionalExtension};

use crate::error::{CoverageError, Result};
use crate::gpkg::{
    self, create_quadtree, has_extension, has_table, insert_extension, insert_tile_table,
    quote_identifier, validate_table_name, Bounds, Contents, Crs, CrsWkt, Extension, GeoPackage,
    TileMatrixSet, TileTable, ZoomLevelRow,
};
use crate::units::UnitsOfMeasure;

use codec::{decode_raster, encode_raster, read_header, Raster, RasterData};
pub use stats::{RunningStats, TileStatistics};

pub const EXTENSION_NAME: &str = "gpkg_2d_gridded_coverage";
pub const EXTENSION_DEFINITION: &str = "http://docs.opengeospatial.org/is/17-066r1/17-066r1.html";
pub const COVERAGE_ANCILLARY_TABLE: &str = "gpkg_2d_gridded_coverage_ancillary";
pub const TILE_ANCILLARY_TABLE: &str = "gpkg_2d_gridded_tile_ancillary";
/// `gpkg_contents.data_type` of coverage tables.
pub const DATA_TYPE: &str = "2d-gridded-coverage";
const TILE_DATA_COLUMN: &str = "tile_data";

/// No-data value of integer coverages that do not declare one.
pub const DEFAULT_INTEGER_NULL: f64 = 65535.0;
/// Deepest zoom level the default quadtree can describe with i32 matrix sizes.
pub const MAX_ZOOM: i32 = 24;

const COVERAGE_ANCILLARY_DDL: &str = "CREATE TABLE IF NOT EXISTS gpkg_2d_gridded_coverage_ancillary (
 id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
 tile_matrix_set_name TEXT NOT NULL UNIQUE,
 datatype TEXT NOT NULL DEFAULT 'integer',
 scale REAL NOT NULL DEFAULT 1.0,
 offset REAL NOT NULL DEFAULT 0.0,
 precision REAL DEFAULT 1.0,
 data_null REAL,
 grid_cell_encoding TEXT DEFAULT 'grid-value-is-center',
 uom TEXT,
 field_name TEXT DEFAULT 'Height',
 quantity_definition TEXT DEFAULT 'Height',
 CONSTRAINT fk_g2dgtct_name FOREIGN KEY('tile_matrix_set_name') REFERENCES gpkg_tile_matrix_set ( table_name )
 CHECK (datatype in ('integer','float')));";

const TILE_ANCILLARY_DDL: &str = "CREATE TABLE IF NOT EXISTS gpkg_2d_gridded_tile_ancillary (
 id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
 tpudt_name TEXT NOT NULL,
 tpudt_id INTEGER NOT NULL,
 scale REAL NOT NULL DEFAULT 1.0,
 offset REAL NOT NULL DEFAULT 0.0,
 min REAL DEFAULT NULL,
 max REAL DEFAULT NULL,
 mean REAL DEFAULT NULL,
 std_dev REAL DEFAULT NULL,
 CONSTRAINT fk_g2dgtat_name FOREIGN KEY (tpudt_name) REFERENCES gpkg_contents(table_name),
 UNIQUE (tpudt_name, tpudt_id));";

const UPSERT_TILE_ANCILLARY: &str = "INSERT INTO gpkg_2d_gridded_tile_ancillary
   (tpudt_name, tpudt_id, scale, \"offset\", min, max, mean, std_dev)
 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
 ON CONFLICT(tpudt_name, tpudt_id) DO UPDATE SET
   scale = excluded.scale,
   \"offset\" = excluded.\"offset\",
   min = excluded.min,
   max = excluded.max,
   mean = excluded.mean,
   std_dev = excluded.std_dev";

/// Physical sample type of a coverage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Datatype {
    /// 16-bit unsigned samples.
    #[default]
    Integer,
    /// 32-bit IEEE float samples.
    Float,
}

impl Datatype {
    pub fn as_str(&self) -> &'static str {
        match self {
            Datatype::Integer => "integer",
            Datatype::Float => "float",
        }
    }
}

impl FromStr for Datatype {
    type Err = CoverageError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "integer" => Ok(Datatype::Integer),
            "float" => Ok(Datatype::Float),
            other => Err(CoverageError::InvalidDatatype(other.to_string())),
        }
    }
}

impl fmt::Display for Datatype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which part of a grid cell a sample describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GridCellEncoding {
    #[default]
    GridValueIsCenter,
    GridValueIsArea,
    GridValueIsCorner,
}

impl GridCellEncoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            GridCellEncoding::GridValueIsCenter => "grid-value-is-center",
            GridCellEncoding::GridValueIsArea => "grid-value-is-area",
            GridCellEncoding::GridValueIsCorner => "grid-value-is-corner",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "grid-value-is-center" => Some(GridCellEncoding::GridValueIsCenter),
            "grid-value-is-area" => Some(GridCellEncoding::GridValueIsArea),
            "grid-value-is-corner" => Some(GridCellEncoding::GridValueIsCorner),
            _ => None,
        }
    }
}

/// A coverage descriptor, one row of `gpkg_2d_gridded_coverage_ancillary`.
#[derive(Debug, Clone, PartialEq)]
pub struct GriddedCoverage {
    pub datatype: Datatype,
    pub scale: f64,
    pub offset: f64,
    /// Smallest meaningful difference between values, in coverage units.
    pub precision: f64,
    /// No-data value; see [`null_value`](Self::null_value) for the default.
    pub data_null: Option<f64>,
    pub grid_cell_encoding: GridCellEncoding,
    /// Unit of measure code, meters when `None` or unknown.
    pub uom: Option<String>,
    pub field_name: String,
    pub quantity_definition: String,
}

impl Default for GriddedCoverage {
    fn default() -> Self {
        Self {
            datatype: Datatype::Integer,
            scale: 1.0,
            offset: 0.0,
            precision: 1.0,
            data_null: None,
            grid_cell_encoding: GridCellEncoding::GridValueIsCenter,
            uom: None,
            field_name: "Height".to_string(),
            quantity_definition: "Height".to_string(),
        }
    }
}

impl GriddedCoverage {
    pub fn new(datatype: Datatype) -> Self {
        Self {
            datatype,
            ..Self::default()
        }
    }

    pub fn with_scale_offset(mut self, scale: f64, offset: f64) -> Self {
        self.scale = scale;
        self.offset = offset;
        self
    }

    pub fn with_precision(mut self, precision: f64) -> Self {
        self.precision = precision;
        self
    }

    pub fn with_data_null(mut self, data_null: f64) -> Self {
        self.data_null = Some(data_null);
        self
    }

    pub fn with_uom(mut self, uom: impl Into<String>) -> Self {
        self.uom = Some(uom.into());
        self
    }

    pub fn with_grid_cell_encoding(mut self, encoding: GridCellEncoding) -> Self {
        self.grid_cell_encoding = encoding;
        self
    }

    /// The no-data sentinel in stored sample space.
    ///
    /// Integer coverages without a finite `data_null` use 65535. Float
    /// coverages may use `NaN`.
    pub fn null_value(&self) -> f64 {
        match (self.datatype, self.data_null) {
            (Datatype::Integer, Some(v)) if v.is_finite() => v.round().clamp(0.0, 65535.0),
            (Datatype::Integer, _) => DEFAULT_INTEGER_NULL,
            (Datatype::Float, Some(v)) => v,
            (Datatype::Float, None) => f64::NAN,
        }
    }

    /// Reject descriptors that cannot be encoded against.
    pub fn validate(&self) -> Result<()> {
        check_scale("scale", self.scale)?;
        check_finite("offset", self.offset)?;
        check_finite("precision", self.precision)?;
        if let (Datatype::Integer, Some(v)) = (self.datatype, self.data_null) {
            if !(v.fract() == 0.0 && (0.0..=65535.0).contains(&v)) {
                return Err(CoverageError::InvalidDataNull(v));
            }
        }
        Ok(())
    }

    /// Read the descriptor registered for a tile matrix set.
    pub fn load(conn: &Connection, table_name: &str) -> Result<Option<GriddedCoverage>> {
        if !has_table(conn, COVERAGE_ANCILLARY_TABLE)? {
            return Ok(None);
        }
        let row = conn
            .query_row(
                "SELECT datatype, scale, \"offset\", precision, data_null, grid_cell_encoding,
                        uom, field_name, quantity_definition
                 FROM gpkg_2d_gridded_coverage_ancillary WHERE tile_matrix_set_name = ?1",
                params![table_name],
                |r| {
                    Ok((
                        r.get::<_, String>(0)?,
                        r.get::<_, f64>(1)?,
                        r.get::<_, f64>(2)?,
                        r.get::<_, Option<f64>>(3)?,
                        r.get::<_, Option<f64>>(4)?,
                        r.get::<_, Option<String>>(5)?,
                        r.get::<_, Option<String>>(6)?,
                        r.get::<_, Option<String>>(7)?,
                        r.get::<_, Option<String>>(8)?,
                    ))
                },
            )
            .optional()?;

        let Some((datatype, scale, offset, precision, data_null, encoding, uom, field, quantity)) =
            row
        else {
            return Ok(None);
        };

        let grid_cell_encoding = match encoding.as_deref() {
            None => GridCellEncoding::default(),
            Some(value) => GridCellEncoding::parse(value).unwrap_or_else(|| {
                tracing::warn!(table = table_name, value, "unknown grid cell encoding, assuming center");
                GridCellEncoding::default()
            }),
        };
        Ok(Some(GriddedCoverage {
            datatype: datatype.parse()?,
            scale,
            offset,
            precision: precision.unwrap_or(1.0),
            data_null,
            grid_cell_encoding,
            uom,
            field_name: field.unwrap_or_else(|| "Height".to_string()),
            quantity_definition: quantity.unwrap_or_else(|| "Height".to_string()),
        }))
    }
}

fn check_finite(name: &'static str, value: f64) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(CoverageError::NonFinite { name, value })
    }
}

fn check_scale(name: &'static str, value: f64) -> Result<()> {
    check_finite(name, value)?;
    if value == 0.0 {
        return Err(CoverageError::ZeroScale { name });
    }
    Ok(())
}

/// How far a coverage's registration got.
///
/// A coverage is usable only when the descriptor row, the tile ancillary
/// table's extension row and the `tile_data` column's extension row all exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoverageRegistrationState {
    /// Nothing has been written for this table.
    Unregistered,
    /// Some but not all of the registration rows exist.
    Partial,
    Complete,
}

/// Work out the registration state of `table_name`.
pub fn registration_state(conn: &Connection, table_name: &str) -> Result<CoverageRegistrationState> {
    validate_table_name(table_name)?;

    let descriptor = has_table(conn, COVERAGE_ANCILLARY_TABLE)? && {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM gpkg_2d_gridded_coverage_ancillary WHERE tile_matrix_set_name = ?1",
            params![table_name],
            |r| r.get(0),
        )?;
        count > 0
    };
    let tile_ancillary = has_extension(conn, Some(TILE_ANCILLARY_TABLE), None, EXTENSION_NAME)?;
    let tile_data = has_extension(conn, Some(table_name), Some(TILE_DATA_COLUMN), EXTENSION_NAME)?;

    if descriptor && tile_ancillary && tile_data {
        return Ok(CoverageRegistrationState::Complete);
    }
    // the tile ancillary marker is shared by every coverage, so alone it says nothing
    if descriptor || tile_data || gpkg::contents(conn, table_name)?.is_some() {
        Ok(CoverageRegistrationState::Partial)
    } else {
        Ok(CoverageRegistrationState::Unregistered)
    }
}

fn extension_rows(table_name: &str) -> [Extension; 3] {
    [
        Extension::new(
            Some(COVERAGE_ANCILLARY_TABLE),
            None,
            EXTENSION_NAME,
            EXTENSION_DEFINITION,
        ),
        Extension::new(
            Some(TILE_ANCILLARY_TABLE),
            None,
            EXTENSION_NAME,
            EXTENSION_DEFINITION,
        ),
        Extension::new(
            Some(table_name),
            Some(TILE_DATA_COLUMN),
            EXTENSION_NAME,
            EXTENSION_DEFINITION,
        ),
    ]
}

fn register_srs(conn: &Connection, srid: i32) -> Result<()> {
    CrsWkt::insert_srs(conn, &Crs::wgs84_3d())?;
    if srid == 4979 || gpkg::has_srs(conn, srid)? {
        return Ok(());
    }
    gpkg::insert_srs(conn, srid)
}

/// Register a coverage on the default quadtree of a supported SRID
/// (4326, 4979, 3857 or 3395), with zoom levels `min_zoom..=max_zoom`.
///
/// `bounds` is the extent of the data, defaulting to the whole grid.
pub fn insert_gridded_coverage(
    gpkg: &GeoPackage,
    table_name: &str,
    coverage: &GriddedCoverage,
    srid: i32,
    min_zoom: i32,
    max_zoom: i32,
    bounds: Option<Bounds>,
) -> Result<()> {
    if min_zoom < 0 || max_zoom < min_zoom || max_zoom > MAX_ZOOM {
        return Err(CoverageError::InvalidZoomRange {
            min: min_zoom,
            max: max_zoom,
        });
    }
    let zoom0 = ZoomLevelRow::zoom0(srid).ok_or(CoverageError::UnsupportedSrid(srid))?;
    let zoom_levels: Vec<ZoomLevelRow> = create_quadtree(zoom0, max_zoom as usize + 1)
        .into_iter()
        .filter(|z| z.zoom_level >= min_zoom)
        .collect();
    let matrix_set = TileMatrixSet::for_srid(table_name, srid, &zoom0)?;
    insert_gridded_coverage_with_matrix(gpkg, coverage, &matrix_set, &zoom_levels, bounds)
}

/// Register a coverage over an explicit tile matrix set and zoom levels.
///
/// Registers the WGS 84 3D CRS, the matrix set's CRS, the contents and tile
/// matrix rows, both ancillary tables, the three extension rows and the
/// descriptor, all in one transaction. Nothing is written if any step fails.
pub fn insert_gridded_coverage_with_matrix(
    gpkg: &GeoPackage,
    coverage: &GriddedCoverage,
    matrix_set: &TileMatrixSet,
    zoom_levels: &[ZoomLevelRow],
    bounds: Option<Bounds>,
) -> Result<()> {
    coverage.validate()?;
    let table_name = matrix_set.table_name.as_str();
    validate_table_name(table_name)?;
    if zoom_levels.is_empty() {
        return Err(CoverageError::InvalidZoomRange { min: 0, max: -1 });
    }

    let mut conn = gpkg.connection()?;
    if registration_state(&conn, table_name)? != CoverageRegistrationState::Unregistered {
        return Err(CoverageError::CoverageExists(table_name.to_string()));
    }

    let tx = conn.transaction()?;
    register_srs(&tx, matrix_set.srs_id)?;

    let contents = Contents {
        table_name: table_name.to_string(),
        data_type: DATA_TYPE.to_string(),
        identifier: None,
        description: None,
        bounds: Some(bounds.unwrap_or(matrix_set.bounds)),
        srs_id: matrix_set.srs_id,
    };
    insert_tile_table(&tx, &contents, matrix_set, zoom_levels)?;

    tx.execute_batch(COVERAGE_ANCILLARY_DDL)?;
    tx.execute_batch(TILE_ANCILLARY_DDL)?;
    for ext in extension_rows(table_name) {
        insert_extension(&tx, &ext)?;
    }

    let data_null = match coverage.datatype {
        Datatype::Integer => Some(coverage.null_value()),
        Datatype::Float => coverage.data_null.filter(|v| !v.is_nan()),
    };
    tx.execute(
        "INSERT INTO gpkg_2d_gridded_coverage_ancillary
           (tile_matrix_set_name, datatype, scale, \"offset\", precision, data_null,
            grid_cell_encoding, uom, field_name, quantity_definition)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            table_name,
            coverage.datatype.as_str(),
            coverage.scale,
            coverage.offset,
            coverage.precision,
            data_null,
            coverage.grid_cell_encoding.as_str(),
            coverage.uom,
            coverage.field_name,
            coverage.quantity_definition,
        ],
    )?;
    tx.commit()?;

    tracing::info!(
        table = table_name,
        srs_id = matrix_set.srs_id,
        datatype = %coverage.datatype,
        zoom_levels = zoom_levels.len(),
        "registered gridded coverage"
    );
    Ok(())
}

/// An encoded tile buffer with its per-tile ancillary transform.
#[derive(Debug, Clone, PartialEq)]
pub struct TileData {
    /// Row id in the tile table.
    pub id: i64,
    pub data: Vec<u8>,
    pub scale: f64,
    pub offset: f64,
}

/// Output of [`Coverage::encode_tile`].
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedTile {
    pub data: Vec<u8>,
    pub statistics: TileStatistics,
}

/// A registered coverage, ready for tile reads and writes.
///
/// `insert_*` calls on one handle are serialized; reads are not and rely on
/// SQLite to see either the old or the new tile.
pub struct Coverage {
    gpkg: GeoPackage,
    descriptor: GriddedCoverage,
    tiles: TileTable,
    units_to_meters: f64,
    write_lock: Mutex<()>,
}

impl fmt::Debug for Coverage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Coverage")
            .field("name", &self.name())
            .field("descriptor", &self.descriptor)
            .field("units_to_meters", &self.units_to_meters)
            .finish()
    }
}

impl Coverage {
    /// Open a coverage using the standard unit table.
    ///
    /// Returns `None` unless the coverage is completely registered; a
    /// partially registered table is logged and treated as absent.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let gpkg = GeoPackage::open("/data/terrain.gpkg")?;
    /// match Coverage::open(&gpkg, "dem")? {
    ///     Some(coverage) => println!("{} is {}", coverage.name(), coverage.descriptor().datatype),
    ///     None => println!("no coverage named dem"),
    /// }
    /// ```
    pub fn open(gpkg: &GeoPackage, table_name: &str) -> Result<Option<Coverage>> {
        Self::open_with_units(gpkg, table_name, &UnitsOfMeasure::default())
    }

    /// Open a coverage, resolving its `uom` through `units`.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let mut units = UnitsOfMeasure::default();
    /// units.register("fathom", 1.8288);
    /// let coverage = Coverage::open_with_units(&gpkg, "soundings", &units)?;
    /// ```
    pub fn open_with_units(
        gpkg: &GeoPackage,
        table_name: &str,
        units: &UnitsOfMeasure,
    ) -> Result<Option<Coverage>> {
        let conn = gpkg.connection()?;
        match registration_state(&conn, table_name)? {
            CoverageRegistrationState::Complete => {}
            CoverageRegistrationState::Partial => {
                tracing::warn!(table = table_name, "coverage is only partially registered");
                return Ok(None);
            }
            CoverageRegistrationState::Unregistered => return Ok(None),
        }
        let Some(descriptor) = GriddedCoverage::load(&conn, table_name)? else {
            return Ok(None);
        };
        let Some(tiles) = TileTable::load(&conn, table_name)? else {
            return Ok(None);
        };
        drop(conn);

        let units_to_meters = units.to_meters_or_default(descriptor.uom.as_deref());
        Ok(Some(Coverage {
            gpkg: gpkg.clone(),
            descriptor,
            tiles,
            units_to_meters,
            write_lock: Mutex::new(()),
        }))
    }

    /// Names of all completely registered coverages, sorted.
    ///
    /// # Example
    ///
    /// ```ignore
    /// for name in Coverage::list(&gpkg)? {
    ///     println!("{}", name);
    /// }
    /// ```
    pub fn list(gpkg: &GeoPackage) -> Result<Vec<String>> {
        let conn = gpkg.connection()?;
        if !has_table(&conn, COVERAGE_ANCILLARY_TABLE)? {
            return Ok(Vec::new());
        }
        let mut stmt = conn.prepare(
            "SELECT tile_matrix_set_name FROM gpkg_2d_gridded_coverage_ancillary ORDER BY tile_matrix_set_name",
        )?;
        let names = stmt
            .query_map([], |r| r.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut complete = Vec::with_capacity(names.len());
        for name in names {
            if validate_table_name(&name).is_ok()
                && registration_state(&conn, &name)? == CoverageRegistrationState::Complete
            {
                complete.push(name);
            }
        }
        Ok(complete)
    }

    pub fn name(&self) -> &str {
        self.tiles.name()
    }

    pub fn descriptor(&self) -> &GriddedCoverage {
        &self.descriptor
    }

    pub fn tile_table(&self) -> &TileTable {
        &self.tiles
    }

    /// Factor from coverage units to meters.
    pub fn units_to_meters(&self) -> f64 {
        self.units_to_meters
    }

    fn encode_height(&self, height: f64, tile_offset: f64, tile_scale: f64) -> f64 {
        let d = &self.descriptor;
        (((height / self.units_to_meters) - d.offset) / d.scale - tile_offset) / tile_scale
    }

    fn decode_height(&self, raw: f64, tile_offset: f64, tile_scale: f64) -> f64 {
        let d = &self.descriptor;
        ((raw * tile_scale + tile_offset) * d.scale + d.offset) * self.units_to_meters
    }

    /// Encode a heightmap in meters (row-major, `NaN` for no data) without
    /// writing it.
    pub fn encode_tile(
        &self,
        zoom: i32,
        heightmap: &[f64],
        offset: f64,
        scale: f64,
    ) -> Result<EncodedTile> {
        check_finite("offset", offset)?;
        check_scale("scale", scale)?;
        let level = self.tiles.require_zoom_level(zoom)?;
        let (width, height) = (level.tile_width as usize, level.tile_height as usize);
        if heightmap.len() != width * height {
            return Err(CoverageError::SampleCountMismatch {
                actual: heightmap.len(),
                width,
                height,
            });
        }

        let null = self.descriptor.null_value();
        let mut stats = RunningStats::new();
        let mut clamped = 0usize;
        let mut nudged = 0usize;

        let data = match self.descriptor.datatype {
            Datatype::Integer => {
                let null_raw = null as u16;
                let mut samples = Vec::with_capacity(heightmap.len());
                for &h in heightmap {
                    let encoded = if h.is_nan() {
                        f64::NAN
                    } else {
                        self.encode_height(h, offset, scale)
                    };
                    if encoded.is_nan() {
                        samples.push(null_raw);
                        continue;
                    }
                    let rounded = encoded.round();
                    let mut raw = if rounded < 0.0 {
                        clamped += 1;
                        0
                    } else if rounded > 65535.0 {
                        clamped += 1;
                        u16::MAX
                    } else {
                        rounded as u16
                    };
                    if raw == null_raw {
                        // step towards the interior so the sample is not read as no data
                        raw = if null_raw > 0x7fff { raw - 1 } else { raw + 1 };
                        nudged += 1;
                    }
                    stats.observe(raw as f64);
                    samples.push(raw);
                }
                RasterData::U16(samples)
            }
            Datatype::Float => {
                let null_raw = null as f32;
                let mut samples = Vec::with_capacity(heightmap.len());
                for &h in heightmap {
                    if h.is_nan() {
                        samples.push(null_raw);
                        continue;
                    }
                    let mut raw = self.encode_height(h, offset, scale) as f32;
                    if raw == null_raw {
                        // flip the lowest mantissa bit
                        raw = f32::from_bits(raw.to_bits() ^ 1);
                        nudged += 1;
                    }
                    stats.observe(raw as f64);
                    samples.push(raw);
                }
                RasterData::F32(samples)
            }
        };

        if clamped > 0 {
            tracing::warn!(
                table = self.name(),
                zoom,
                clamped,
                "samples outside the 16-bit range were clamped"
            );
        }
        if nudged > 0 {
            tracing::warn!(
                table = self.name(),
                zoom,
                nudged,
                "samples equal to the no-data value were adjusted"
            );
        }

        let raster = Raster {
            width,
            height,
            nodata: (!null.is_nan()).then_some(null),
            data,
        };
        Ok(EncodedTile {
            data: encode_raster(&raster)?,
            statistics: TileStatistics::from_running(scale, offset, &stats),
        })
    }

    /// Encode and store a heightmap in meters with the given per-tile
    /// transform, replacing any tile at `(zoom, x, y)`.
    ///
    /// The tile row and its ancillary row are written in one transaction.
    ///
    /// # Arguments
    ///
    /// * `zoom`, `x`, `y` - Tile address in the coverage's tile matrix
    /// * `heightmap` - `tile_width * tile_height` heights in meters, row-major
    /// * `offset`, `scale` - Per-tile transform stored in the tile ancillary table
    ///
    /// # Example
    ///
    /// ```ignore
    /// // 256x256 tile, stored values step by 0.5 coverage units from 100
    /// coverage.insert_tile(3, 4, 2, &heights, 100.0, 0.5)?;
    /// ```
    pub fn insert_tile(
        &self,
        zoom: i32,
        x: i32,
        y: i32,
        heightmap: &[f64],
        offset: f64,
        scale: f64,
    ) -> Result<()> {
        let encoded = self.encode_tile(zoom, heightmap, offset, scale)?;
        self.write_tile(zoom, x, y, &encoded)
    }

    /// [`insert_tile`](Self::insert_tile) for single precision heights.
    pub fn insert_tile_f32(
        &self,
        zoom: i32,
        x: i32,
        y: i32,
        heightmap: &[f32],
        offset: f64,
        scale: f64,
    ) -> Result<()> {
        let widened: Vec<f64> = heightmap.iter().map(|&h| h as f64).collect();
        self.insert_tile(zoom, x, y, &widened, offset, scale)
    }

    /// Store a heightmap, choosing the per-tile transform from its range.
    ///
    /// Integer coverages get the offset at the tile minimum and the coarsest
    /// of the coverage precision and the step that fits the range in 16 bits.
    /// Float coverages store values unchanged.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let heights = render_tile(&coverage, 8, column, row, &mosaic)?;
    /// coverage.insert_heightmap(8, column, row, &heights)?;
    /// ```
    pub fn insert_heightmap(&self, zoom: i32, x: i32, y: i32, heightmap: &[f64]) -> Result<()> {
        let (offset, scale) = self.fit_ancillary(heightmap);
        self.insert_tile(zoom, x, y, heightmap, offset, scale)
    }

    /// Per-tile `(offset, scale)` that [`insert_heightmap`](Self::insert_heightmap) uses.
    pub fn fit_ancillary(&self, heightmap: &[f64]) -> (f64, f64) {
        if self.descriptor.datatype == Datatype::Float {
            return (0.0, 1.0);
        }
        let d = &self.descriptor;
        let mut stats = RunningStats::new();
        for &h in heightmap {
            stats.observe(((h / self.units_to_meters) - d.offset) / d.scale);
        }
        let (Some(min), Some(max)) = (stats.min(), stats.max()) else {
            return (0.0, 1.0);
        };
        if !(min.is_finite() && max.is_finite()) {
            return (0.0, 1.0);
        }
        let step = (d.precision / d.scale).abs();
        let scale = step.max((max - min) / 65534.0);
        let scale = if scale.is_finite() && scale > 0.0 { scale } else { 1.0 };
        (min, scale)
    }

    fn write_tile(&self, zoom: i32, x: i32, y: i32, encoded: &EncodedTile) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let table = quote_identifier(self.name());

        let mut conn = self.gpkg.connection()?;
        let tx = conn.transaction()?;
        let existing: Option<i64> = tx
            .query_row(
                &format!(
                    "SELECT id FROM {table} WHERE zoom_level = ?1 AND tile_column = ?2 AND tile_row = ?3"
                ),
                params![zoom, x, y],
                |r| r.get(0),
            )
            .optional()?;
        let id = match existing {
            Some(id) => {
                tx.execute(
                    &format!("UPDATE {table} SET tile_data = ?1 WHERE id = ?2"),
                    params![encoded.data, id],
                )?;
                id
            }
            None => {
                tx.execute(
                    &format!(
                        "INSERT INTO {table} (zoom_level, tile_column, tile_row, tile_data) VALUES (?1, ?2, ?3, ?4)"
                    ),
                    params![zoom, x, y, encoded.data],
                )?;
                tx.last_insert_rowid()
            }
        };

        let s = &encoded.statistics;
        tx.execute(
            UPSERT_TILE_ANCILLARY,
            params![self.name(), id, s.scale, s.offset, s.min, s.max, s.mean, s.std_dev],
        )?;
        tx.commit()?;

        tracing::debug!(
            table = self.name(),
            zoom,
            x,
            y,
            id,
            bytes = encoded.data.len(),
            "wrote coverage tile"
        );
        Ok(())
    }

    /// Fetch the encoded buffer and per-tile transform of a tile.
    ///
    /// Returns `None` when the tile does not exist or its buffer is empty.
    /// A tile without an ancillary row decodes with scale 1 and offset 0.
    pub fn get_tile_data(&self, zoom: i32, x: i32, y: i32) -> Result<Option<TileData>> {
        let table = quote_identifier(self.name());
        let conn = self.gpkg.connection()?;
        let row = conn
            .query_row(
                &format!(
                    "SELECT t.id, t.tile_data, COALESCE(a.scale, 1.0), COALESCE(a.\"offset\", 0.0)
                     FROM {table} AS t
                     LEFT JOIN gpkg_2d_gridded_tile_ancillary AS a
                       ON a.tpudt_id = t.id AND a.tpudt_name = ?4
                     WHERE t.zoom_level = ?1 AND t.tile_column = ?2 AND t.tile_row = ?3
                     LIMIT 1"
                ),
                params![zoom, x, y, self.name()],
                |r| {
                    Ok((
                        r.get::<_, i64>(0)?,
                        r.get::<_, Option<Vec<u8>>>(1)?,
                        r.get::<_, f64>(2)?,
                        r.get::<_, f64>(3)?,
                    ))
                },
            )
            .optional()?;

        Ok(row.and_then(|(id, data, scale, offset)| {
            data.filter(|d| !d.is_empty()).map(|data| TileData {
                id,
                data,
                scale,
                offset,
            })
        }))
    }

    /// Decode a tile buffer to meters, `NaN` where there is no data.
    ///
    /// Fails if the raster's dimensions differ from the zoom level's tile size.
    pub fn decode_tile(&self, zoom: i32, tile: &TileData) -> Result<Vec<f64>> {
        let level = self.tiles.require_zoom_level(zoom)?;
        let (width, height) = (level.tile_width as usize, level.tile_height as usize);
        let header = read_header(&tile.data)?;
        if header.width != width || header.height != height {
            return Err(CoverageError::TileSizeMismatch {
                width,
                height,
                actual_width: header.width,
                actual_height: header.height,
            });
        }
        let raster = decode_raster(&tile.data)?;

        let null = match raster.nodata {
            Some(v) if !v.is_nan() => v,
            _ => self.descriptor.null_value(),
        };
        let decode = |raw: f64| {
            if raw.is_nan() || raw == null {
                f64::NAN
            } else {
                self.decode_height(raw, tile.offset, tile.scale)
            }
        };
        Ok(match raster.data {
            RasterData::U16(samples) => samples.into_iter().map(|s| decode(s as f64)).collect(),
            RasterData::F32(samples) => samples.into_iter().map(|s| decode(s as f64)).collect(),
        })
    }

    /// Fetch and decode a tile. `None` when the tile does not exist.
    ///
    /// # Returns
    ///
    /// * `Ok(Some(heights))` - Row-major heights in meters, `NaN` for no data
    /// * `Ok(None)` - No tile stored at this address
    /// * `Err(_)` - Storage failure or a tile that does not decode
    ///
    /// # Example
    ///
    /// ```ignore
    /// if let Some(heights) = coverage.get_tile(3, 4, 2)? {
    ///     let valid = heights.iter().filter(|h| !h.is_nan()).count();
    ///     println!("{} of {} samples have data", valid, heights.len());
    /// }
    /// ```
    pub fn get_tile(&self, zoom: i32, x: i32, y: i32) -> Result<Option<Vec<f64>>> {
        match self.get_tile_data(zoom, x, y)? {
            Some(tile) => self.decode_tile(zoom, &tile).map(Some),
            None => Ok(None),
        }
    }

    /// The ancillary row stored with a tile.
    ///
    /// Statistics are in stored sample units; `None` for missing tiles or
    /// tiles written without an ancillary row.
    ///
    /// # Example
    ///
    /// ```ignore
    /// if let Some(stats) = coverage.tile_statistics(3, 4, 2)? {
    ///     println!("min {:?} max {:?}", stats.min, stats.max);
    /// }
    /// ```
    pub fn tile_statistics(&self, zoom: i32, x: i32, y: i32) -> Result<Option<TileStatistics>> {
        let table = quote_identifier(self.name());
        let conn = self.gpkg.connection()?;
        let row = conn
            .query_row(
                &format!(
                    "SELECT a.scale, a.\"offset\", a.min, a.max, a.mean, a.std_dev
                     FROM {table} AS t
                     JOIN gpkg_2d_gridded_tile_ancillary AS a
                       ON a.tpudt_id = t.id AND a.tpudt_name = ?4
                     WHERE t.zoom_level = ?1 AND t.tile_column = ?2 AND t.tile_row = ?3"
                ),
                params![zoom, x, y, self.name()],
                |r| {
                    Ok(TileStatistics {
                        scale: r.get(0)?,
                        offset: r.get(1)?,
                        min: r.get(2)?,
                        max: r.get(3)?,
                        mean: r.get(4)?,
                        std_dev: r.get(5)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    /// Number of stored tiles per zoom level, ascending.
    pub fn tile_counts(&self) -> Result<Vec<(i32, u64)>> {
        let table = quote_identifier(self.name());
        let conn = self.gpkg.connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT zoom_level, COUNT(*) FROM {table} GROUP BY zoom_level ORDER BY zoom_level"
        ))?;
        let counts = stmt
            .query_map([], |r| Ok((r.get::<_, i32>(0)?, r.get::<_, i64>(1)?.max(0) as u64)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn small_grid(name: &str, tile: i32) -> (TileMatrixSet, Vec<ZoomLevelRow>) {
        let pixel = 180.0 / tile as f64;
        let zoom0 = ZoomLevelRow {
            zoom_level: 0,
            matrix_width: 2,
            matrix_height: 1,
            tile_width: tile,
            tile_height: tile,
            pixel_x_size: pixel,
            pixel_y_size: pixel,
        };
        let set = TileMatrixSet {
            table_name: name.to_string(),
            srs_id: 4326,
            bounds: Bounds::new(-180.0, -90.0, 180.0, 90.0),
        };
        (set, create_quadtree(zoom0, 3))
    }

    fn register(gpkg: &GeoPackage, name: &str, tile: i32, coverage: &GriddedCoverage) -> Coverage {
        let (set, levels) = small_grid(name, tile);
        insert_gridded_coverage_with_matrix(gpkg, coverage, &set, &levels, None).unwrap();
        Coverage::open(gpkg, name).unwrap().unwrap()
    }

    fn row_counts(gpkg: &GeoPackage, name: &str) -> (i64, i64) {
        let conn = gpkg.connection().unwrap();
        let tiles: i64 = conn
            .query_row(&format!("SELECT COUNT(*) FROM \"{name}\""), [], |r| r.get(0))
            .unwrap();
        let ancillary: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM gpkg_2d_gridded_tile_ancillary WHERE tpudt_name = ?1",
                params![name],
                |r| r.get(0),
            )
            .unwrap();
        (tiles, ancillary)
    }

    #[test]
    fn test_three_by_three_integer_round_trip() {
        let gpkg = GeoPackage::open_in_memory().unwrap();
        let coverage = register(&gpkg, "dem", 3, &GriddedCoverage::default());

        let heights = [10.0, 20.0, f64::NAN, 40.0, 50.0, 60.0, 70.0, 80.0, 90.0];
        coverage.insert_tile(0, 0, 0, &heights, 0.0, 1.0).unwrap();

        let decoded = coverage.get_tile(0, 0, 0).unwrap().unwrap();
        assert_eq!(decoded.len(), 9);
        for (i, (&expected, &actual)) in heights.iter().zip(decoded.iter()).enumerate() {
            if i == 2 {
                assert!(actual.is_nan());
            } else {
                assert_eq!(actual, expected, "sample {i}");
            }
        }
    }

    #[test]
    fn test_upsert_is_idempotent() {
        let gpkg = GeoPackage::open_in_memory().unwrap();
        let coverage = register(&gpkg, "dem", 3, &GriddedCoverage::default());
        let heights = [1.0; 9];

        coverage.insert_tile(1, 2, 1, &heights, 0.0, 1.0).unwrap();
        coverage.insert_tile(1, 2, 1, &heights, 0.0, 1.0).unwrap();
        assert_eq!(row_counts(&gpkg, "dem"), (1, 1));

        // replacing keeps the same rows but updates their contents
        coverage.insert_tile(1, 2, 1, &[5.0; 9], 0.0, 1.0).unwrap();
        assert_eq!(row_counts(&gpkg, "dem"), (1, 1));
        assert_eq!(coverage.get_tile(1, 2, 1).unwrap().unwrap(), vec![5.0; 9]);
    }

    #[test]
    fn test_nan_survives_any_transform() {
        let gpkg = GeoPackage::open_in_memory().unwrap();
        let descriptor = GriddedCoverage::default().with_scale_offset(0.1, -500.0);
        let coverage = register(&gpkg, "dem", 2, &descriptor);

        let heights = [f64::NAN, 12.3, -400.0, f64::NAN];
        coverage.insert_tile(0, 1, 0, &heights, 7.0, 2.0).unwrap();
        let decoded = coverage.get_tile(0, 1, 0).unwrap().unwrap();
        assert!(decoded[0].is_nan());
        assert!(decoded[3].is_nan());
        // quantization step in meters is tile scale * coverage scale
        assert!((decoded[1] - 12.3).abs() <= 0.1 + 1e-9);
        assert!((decoded[2] + 400.0).abs() <= 0.1 + 1e-9);
    }

    #[test]
    fn test_float_coverage_round_trip() {
        let gpkg = GeoPackage::open_in_memory().unwrap();
        let coverage = register(&gpkg, "dsm", 2, &GriddedCoverage::new(Datatype::Float));
        assert!(coverage.descriptor().null_value().is_nan());

        let heights = [-10.25, 8848.86, f64::NAN, 0.001];
        coverage.insert_heightmap(2, 3, 1, &heights).unwrap();
        let decoded = coverage.get_tile(2, 3, 1).unwrap().unwrap();
        for (&h, &d) in heights.iter().zip(decoded.iter()) {
            if h.is_nan() {
                assert!(d.is_nan());
            } else {
                assert_eq!(d, h as f32 as f64);
            }
        }
    }

    #[test]
    fn test_insert_heightmap_fits_wide_range() {
        let gpkg = GeoPackage::open_in_memory().unwrap();
        let coverage = register(&gpkg, "dem", 4, &GriddedCoverage::default());

        let heights: Vec<f64> = (0..16).map(|i| -430.5 + i as f64 * 659.3).collect();
        let (offset, scale) = coverage.fit_ancillary(&heights);
        assert_eq!(offset, -430.5);
        assert_eq!(scale, 1.0);

        let fine = GriddedCoverage::default().with_precision(0.01);
        let fine = register(&gpkg, "fine", 4, &fine);
        let (_, scale) = fine.fit_ancillary(&heights);
        assert!(scale > 0.01 && scale < 0.2, "scale {scale}");

        fine.insert_heightmap(0, 0, 0, &heights).unwrap();
        let decoded = fine.get_tile(0, 0, 0).unwrap().unwrap();
        for (h, d) in heights.iter().zip(decoded.iter()) {
            assert!((h - d).abs() <= scale / 2.0 + 1e-9, "{h} vs {d}");
        }

        let stats = fine.tile_statistics(0, 0, 0).unwrap().unwrap();
        assert_eq!(stats.offset, -430.5);
        assert_eq!(stats.min, Some(0.0));
        assert!(stats.max.unwrap() <= 65534.0);
    }

    #[test]
    fn test_statistics_skip_nodata() {
        let gpkg = GeoPackage::open_in_memory().unwrap();
        let coverage = register(&gpkg, "dem", 2, &GriddedCoverage::default());
        coverage
            .insert_tile(0, 0, 0, &[100.0, f64::NAN, 300.0, f64::NAN], 0.0, 1.0)
            .unwrap();
        let stats = coverage.tile_statistics(0, 0, 0).unwrap().unwrap();
        assert_eq!(stats.min, Some(100.0));
        assert_eq!(stats.max, Some(300.0));
        assert_eq!(stats.mean, Some(200.0));
        assert_eq!(stats.std_dev, Some(100.0));

        coverage.insert_tile(0, 1, 0, &[f64::NAN; 4], 0.0, 1.0).unwrap();
        let empty = coverage.tile_statistics(0, 1, 0).unwrap().unwrap();
        assert_eq!(empty.mean, None);
        assert!(coverage.tile_statistics(0, 1, 1).unwrap().is_none());
    }

    #[test]
    fn test_sample_equal_to_null_is_nudged() {
        let gpkg = GeoPackage::open_in_memory().unwrap();
        let coverage = register(&gpkg, "dem", 2, &GriddedCoverage::default());
        coverage
            .insert_tile(0, 0, 0, &[65535.0, 70000.0, -5.0, 1.0], 0.0, 1.0)
            .unwrap();
        let decoded = coverage.get_tile(0, 0, 0).unwrap().unwrap();
        assert_eq!(decoded, vec![65534.0, 65534.0, 0.0, 1.0]);
    }

    #[test]
    fn test_units_of_measure() {
        let gpkg = GeoPackage::open_in_memory().unwrap();
        let descriptor = GriddedCoverage::default().with_uom("[ft_i]");
        let coverage = register(&gpkg, "feet", 2, &descriptor);
        assert_eq!(coverage.units_to_meters(), 0.3048);

        // 100 ft exactly
        coverage.insert_tile(0, 0, 0, &[30.48, 0.0, 3.048, 304.8], 0.0, 1.0).unwrap();
        let data = coverage.get_tile_data(0, 0, 0).unwrap().unwrap();
        let raster = decode_raster(&data.data).unwrap();
        assert_eq!(raster.data, RasterData::U16(vec![100, 0, 10, 1000]));

        let decoded = coverage.decode_tile(0, &data).unwrap();
        assert!((decoded[0] - 30.48).abs() < 1e-9);
    }

    #[test]
    fn test_missing_tile_is_none() {
        let gpkg = GeoPackage::open_in_memory().unwrap();
        let coverage = register(&gpkg, "dem", 2, &GriddedCoverage::default());
        assert!(coverage.get_tile_data(0, 0, 0).unwrap().is_none());
        assert!(coverage.get_tile(0, 0, 0).unwrap().is_none());
    }

    #[test]
    fn test_configuration_errors_write_nothing() {
        let gpkg = GeoPackage::open_in_memory().unwrap();
        let coverage = register(&gpkg, "dem", 3, &GriddedCoverage::default());

        assert!(matches!(
            coverage.insert_tile(0, 0, 0, &[1.0; 9], f64::NAN, 1.0),
            Err(CoverageError::NonFinite { name: "offset", .. })
        ));
        assert!(matches!(
            coverage.insert_tile(0, 0, 0, &[1.0; 9], 0.0, f64::INFINITY),
            Err(CoverageError::NonFinite { name: "scale", .. })
        ));
        assert!(matches!(
            coverage.insert_tile(0, 0, 0, &[1.0; 9], 0.0, 0.0),
            Err(CoverageError::ZeroScale { .. })
        ));
        assert!(matches!(
            coverage.insert_tile(0, 0, 0, &[1.0; 8], 0.0, 1.0),
            Err(CoverageError::SampleCountMismatch { actual: 8, width: 3, height: 3 })
        ));
        assert!(matches!(
            coverage.insert_tile(7, 0, 0, &[1.0; 9], 0.0, 1.0),
            Err(CoverageError::UnknownZoomLevel { zoom: 7, .. })
        ));
        assert_eq!(row_counts(&gpkg, "dem"), (0, 0));
    }

    #[test]
    fn test_decode_size_mismatch() {
        let gpkg = GeoPackage::open_in_memory().unwrap();
        let coverage = register(&gpkg, "dem", 3, &GriddedCoverage::default());

        let wrong = encode_raster(&Raster {
            width: 2,
            height: 2,
            nodata: None,
            data: RasterData::U16(vec![1, 2, 3, 4]),
        })
        .unwrap();
        {
            let conn = gpkg.connection().unwrap();
            conn.execute(
                "INSERT INTO dem (zoom_level, tile_column, tile_row, tile_data) VALUES (0, 0, 0, ?1)",
                params![wrong],
            )
            .unwrap();
        }
        let tile = coverage.get_tile_data(0, 0, 0).unwrap().unwrap();
        assert_eq!((tile.scale, tile.offset), (1.0, 0.0));
        assert!(matches!(
            coverage.get_tile(0, 0, 0),
            Err(CoverageError::TileSizeMismatch { width: 3, actual_width: 2, .. })
        ));
    }

    #[test]
    fn test_registration_rows() {
        let gpkg = GeoPackage::open_in_memory().unwrap();
        insert_gridded_coverage(&gpkg, "dem", &GriddedCoverage::default(), 4326, 2, 4, None).unwrap();

        let conn = gpkg.connection().unwrap();
        let coverage_exts: Vec<_> = gpkg::extensions(&conn)
            .unwrap()
            .into_iter()
            .filter(|e| e.extension_name == EXTENSION_NAME)
            .collect();
        assert_eq!(coverage_exts.len(), 3);
        assert!(coverage_exts.iter().all(|e| e.definition == EXTENSION_DEFINITION));
        assert!(coverage_exts
            .iter()
            .any(|e| e.table_name.as_deref() == Some("dem") && e.column_name.as_deref() == Some("tile_data")));

        assert!(gpkg::has_srs(&conn, 4979).unwrap());
        assert!(gpkg::has_srs(&conn, 4326).unwrap());
        assert!(CrsWkt::is_registered(&conn).unwrap());

        let contents = gpkg::contents(&conn, "dem").unwrap().unwrap();
        assert_eq!(contents.data_type, DATA_TYPE);

        let data_null: Option<f64> = conn
            .query_row(
                "SELECT data_null FROM gpkg_2d_gridded_coverage_ancillary WHERE tile_matrix_set_name = 'dem'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(data_null, Some(65535.0));

        let table = TileTable::load(&conn, "dem").unwrap().unwrap();
        let zooms: Vec<i32> = table.zoom_levels().iter().map(|z| z.zoom_level).collect();
        assert_eq!(zooms, vec![2, 3, 4]);
        assert_eq!(table.zoom_level(2).unwrap().matrix_width, 8);
        assert_eq!(table.matrix_set().bounds, Bounds::new(-180.0, -90.0, 180.0, 90.0));
        assert_eq!(
            registration_state(&conn, "dem").unwrap(),
            CoverageRegistrationState::Complete
        );
    }

    #[test]
    fn test_registration_errors() {
        let gpkg = GeoPackage::open_in_memory().unwrap();
        let descriptor = GriddedCoverage::default();

        assert!(matches!(
            insert_gridded_coverage(&gpkg, "dem", &descriptor, 32633, 0, 2, None),
            Err(CoverageError::UnsupportedSrid(32633))
        ));
        assert!(matches!(
            insert_gridded_coverage(&gpkg, "dem", &descriptor, 4326, 3, 2, None),
            Err(CoverageError::InvalidZoomRange { min: 3, max: 2 })
        ));
        assert!(matches!(
            insert_gridded_coverage(&gpkg, "dem", &descriptor.clone().with_scale_offset(f64::NAN, 0.0), 4326, 0, 2, None),
            Err(CoverageError::NonFinite { name: "scale", .. })
        ));
        assert!(matches!(
            insert_gridded_coverage(&gpkg, "bad name", &descriptor, 4326, 0, 2, None),
            Err(CoverageError::InvalidTableName(_))
        ));
        {
            let conn = gpkg.connection().unwrap();
            assert_eq!(
                registration_state(&conn, "dem").unwrap(),
                CoverageRegistrationState::Unregistered
            );
            assert!(!has_table(&conn, COVERAGE_ANCILLARY_TABLE).unwrap());
        }

        insert_gridded_coverage(&gpkg, "dem", &descriptor, 3857, 0, 2, None).unwrap();
        assert!(matches!(
            insert_gridded_coverage(&gpkg, "dem", &descriptor, 3857, 0, 2, None),
            Err(CoverageError::CoverageExists(_))
        ));
    }

    #[test]
    fn test_integer_data_null_must_be_a_sample() {
        let gpkg = GeoPackage::open_in_memory().unwrap();
        for bad in [-9999.0, 65536.0, 12.5, f64::NAN] {
            let descriptor = GriddedCoverage::default().with_data_null(bad);
            assert!(matches!(
                descriptor.validate(),
                Err(CoverageError::InvalidDataNull(_))
            ));
            assert!(matches!(
                insert_gridded_coverage(&gpkg, "dem", &descriptor, 4326, 0, 1, None),
                Err(CoverageError::InvalidDataNull(_))
            ));
        }
        assert!(GriddedCoverage::default().with_data_null(0.0).validate().is_ok());
        assert!(GriddedCoverage::new(Datatype::Float)
            .with_data_null(-9999.0)
            .validate()
            .is_ok());

        let conn = gpkg.connection().unwrap();
        assert_eq!(
            registration_state(&conn, "dem").unwrap(),
            CoverageRegistrationState::Unregistered
        );
    }

    #[test]
    fn test_failed_registration_leaves_nothing() {
        let gpkg = GeoPackage::open_in_memory().unwrap();
        {
            let conn = gpkg.connection().unwrap();
            conn.execute_batch(
                "CREATE TRIGGER block_tile_data BEFORE INSERT ON gpkg_extensions
                 WHEN NEW.column_name = 'tile_data'
                 BEGIN SELECT RAISE(ABORT, 'blocked'); END;",
            )
            .unwrap();
        }
        assert!(matches!(
            insert_gridded_coverage(&gpkg, "dem", &GriddedCoverage::default(), 4326, 0, 2, None),
            Err(CoverageError::Sqlite(_))
        ));

        let conn = gpkg.connection().unwrap();
        assert_eq!(
            registration_state(&conn, "dem").unwrap(),
            CoverageRegistrationState::Unregistered
        );
        assert!(!has_table(&conn, "dem").unwrap());
        assert!(!has_table(&conn, COVERAGE_ANCILLARY_TABLE).unwrap());
        assert!(!has_table(&conn, TILE_ANCILLARY_TABLE).unwrap());
        assert!(gpkg::contents(&conn, "dem").unwrap().is_none());
        assert!(!gpkg::has_srs(&conn, 4979).unwrap());
        assert!(!CrsWkt::is_registered(&conn).unwrap());
        assert!(gpkg::extensions(&conn).unwrap().is_empty());
        let matrix_rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM gpkg_tile_matrix", [], |r| r.get(0))
            .unwrap();
        assert_eq!(matrix_rows, 0);
    }

    #[test]
    fn test_registration_refuses_foreign_table() {
        let gpkg = GeoPackage::open_in_memory().unwrap();
        {
            let conn = gpkg.connection().unwrap();
            conn.execute_batch("CREATE TABLE dem (name TEXT)").unwrap();
        }
        assert!(matches!(
            insert_gridded_coverage(&gpkg, "dem", &GriddedCoverage::default(), 4326, 0, 2, None),
            Err(CoverageError::TableExists(_))
        ));

        let conn = gpkg.connection().unwrap();
        assert_eq!(
            registration_state(&conn, "dem").unwrap(),
            CoverageRegistrationState::Unregistered
        );
        assert!(gpkg::contents(&conn, "dem").unwrap().is_none());
        assert!(!gpkg::has_srs(&conn, 4979).unwrap());
    }

    #[test]
    fn test_failed_tile_write_keeps_previous_tile() {
        let gpkg = GeoPackage::open_in_memory().unwrap();
        let coverage = register(&gpkg, "dem", 3, &GriddedCoverage::default());
        coverage.insert_tile(0, 0, 0, &[5.0; 9], 0.0, 1.0).unwrap();
        {
            let conn = gpkg.connection().unwrap();
            conn.execute_batch(
                "CREATE TRIGGER block_insert BEFORE INSERT ON gpkg_2d_gridded_tile_ancillary
                 BEGIN SELECT RAISE(ABORT, 'blocked'); END;
                 CREATE TRIGGER block_update BEFORE UPDATE ON gpkg_2d_gridded_tile_ancillary
                 BEGIN SELECT RAISE(ABORT, 'blocked'); END;",
            )
            .unwrap();
        }

        // a new tile: the tile row must not outlive its ancillary row
        assert!(coverage.insert_tile(0, 1, 0, &[7.0; 9], 0.0, 1.0).is_err());
        assert!(coverage.get_tile_data(0, 1, 0).unwrap().is_none());

        // an existing tile: both rows keep their old contents
        assert!(coverage.insert_tile(0, 0, 0, &[9.0; 9], 2.0, 1.0).is_err());
        assert_eq!(coverage.get_tile(0, 0, 0).unwrap().unwrap(), vec![5.0; 9]);
        assert_eq!(row_counts(&gpkg, "dem"), (1, 1));
    }

    #[test]
    fn test_partial_registration_is_not_opened() {
        let gpkg = GeoPackage::open_in_memory().unwrap();
        insert_gridded_coverage(&gpkg, "a", &GriddedCoverage::default(), 4326, 0, 1, None).unwrap();
        insert_gridded_coverage(&gpkg, "b", &GriddedCoverage::default(), 4979, 0, 1, None).unwrap();
        assert_eq!(Coverage::list(&gpkg).unwrap(), vec!["a", "b"]);

        {
            let conn = gpkg.connection().unwrap();
            conn.execute(
                "DELETE FROM gpkg_extensions WHERE table_name = 'b' AND column_name = 'tile_data'",
                [],
            )
            .unwrap();
            assert_eq!(
                registration_state(&conn, "b").unwrap(),
                CoverageRegistrationState::Partial
            );
        }
        assert!(Coverage::open(&gpkg, "b").unwrap().is_none());
        assert!(Coverage::open(&gpkg, "missing").unwrap().is_none());
        assert_eq!(Coverage::list(&gpkg).unwrap(), vec!["a"]);
    }

    #[test]
    fn test_descriptor_round_trip() {
        let gpkg = GeoPackage::open_in_memory().unwrap();
        let descriptor = GriddedCoverage::new(Datatype::Float)
            .with_scale_offset(0.5, 10.0)
            .with_precision(0.25)
            .with_data_null(-9999.0)
            .with_uom("m")
            .with_grid_cell_encoding(GridCellEncoding::GridValueIsCorner);
        let coverage = register(&gpkg, "dsm", 2, &descriptor);
        assert_eq!(coverage.descriptor(), &descriptor);
        assert_eq!(coverage.name(), "dsm");
    }

    #[test]
    fn test_datatype_parse() {
        assert_eq!("integer".parse::<Datatype>().unwrap(), Datatype::Integer);
        assert_eq!("float".parse::<Datatype>().unwrap(), Datatype::Float);
        assert!(matches!(
            "double".parse::<Datatype>(),
            Err(CoverageError::InvalidDatatype(_))
        ));
        assert_eq!(GridCellEncoding::parse("grid-value-is-area"), Some(GridCellEncoding::GridValueIsArea));
    }

    #[test]
    fn test_concurrent_writers_on_file() {
        let dir = TempDir::new().unwrap();
        let gpkg = GeoPackage::create(dir.path().join("dem.gpkg")).unwrap();
        let coverage = Arc::new(register(&gpkg, "dem", 4, &GriddedCoverage::default()));

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let coverage = Arc::clone(&coverage);
                std::thread::spawn(move || {
                    for x in 0..4 {
                        let heights = vec![(t * 10 + x) as f64; 16];
                        coverage.insert_tile(2, x, t, &heights, 0.0, 1.0).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(row_counts(&gpkg, "dem"), (16, 16));
        assert_eq!(coverage.tile_counts().unwrap(), vec![(2, 16)]);
        assert_eq!(coverage.get_tile(2, 3, 2).unwrap().unwrap(), vec![23.0; 16]);
    }
}
