//! GeoPackage container: core tables, spatial reference systems, tile matrix
//! sets and the extensions registry.
//!
//! Connections come from an `r2d2` pool. Functions that write several rows
//! take a `&Connection` so they can run inside a caller's transaction
//! (a `rusqlite::Transaction` derefs to a `Connection`).

pub mod crs_wkt;
pub mod tile_table;

use std::path::{Path, PathBuf};
use std::time::Duration;

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::rusqlite::{params, Connection, OptionalExtension};
use r2d2_sqlite::SqliteConnectionManager;

use crate::config::StoreConfig;
use crate::error::{CoverageError, Result};

pub use crs_wkt::{Crs, CrsWkt};
pub use tile_table::{create_quadtree, TileIndex, TileMatrixSet, TileTable, ZoomLevelRow};

/// `PRAGMA application_id` of a GeoPackage ("GPKG").
pub const APPLICATION_ID: i32 = 0x4750_4B47;
/// `PRAGMA user_version` for GeoPackage 1.2.
pub const USER_VERSION: i32 = 10200;

const CORE_TABLES: &str = "
CREATE TABLE IF NOT EXISTS gpkg_spatial_ref_sys (
  srs_name TEXT NOT NULL,
  srs_id INTEGER PRIMARY KEY,
  organization TEXT NOT NULL,
  organization_coordsys_id INTEGER NOT NULL,
  definition TEXT NOT NULL,
  description TEXT
);
CREATE TABLE IF NOT EXISTS gpkg_contents (
  table_name TEXT NOT NULL PRIMARY KEY,
  data_type TEXT NOT NULL,
  identifier TEXT UNIQUE,
  description TEXT DEFAULT '',
  last_change DATETIME NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now')),
  min_x DOUBLE,
  min_y DOUBLE,
  max_x DOUBLE,
  max_y DOUBLE,
  srs_id INTEGER,
  CONSTRAINT fk_gc_r_srs_id FOREIGN KEY (srs_id) REFERENCES gpkg_spatial_ref_sys(srs_id)
);
CREATE TABLE IF NOT EXISTS gpkg_tile_matrix_set (
  table_name TEXT NOT NULL PRIMARY KEY,
  srs_id INTEGER NOT NULL,
  min_x DOUBLE NOT NULL,
  min_y DOUBLE NOT NULL,
  max_x DOUBLE NOT NULL,
  max_y DOUBLE NOT NULL,
  CONSTRAINT fk_gtms_table_name FOREIGN KEY (table_name) REFERENCES gpkg_contents(table_name),
  CONSTRAINT fk_gtms_srs FOREIGN KEY (srs_id) REFERENCES gpkg_spatial_ref_sys (srs_id)
);
CREATE TABLE IF NOT EXISTS gpkg_tile_matrix (
  table_name TEXT NOT NULL,
  zoom_level INTEGER NOT NULL,
  matrix_width INTEGER NOT NULL,
  matrix_height INTEGER NOT NULL,
  tile_width INTEGER NOT NULL,
  tile_height INTEGER NOT NULL,
  pixel_x_size DOUBLE NOT NULL,
  pixel_y_size DOUBLE NOT NULL,
  CONSTRAINT pk_ttm PRIMARY KEY (table_name, zoom_level),
  CONSTRAINT fk_tmm_table_name FOREIGN KEY (table_name) REFERENCES gpkg_contents(table_name)
);
CREATE TABLE IF NOT EXISTS gpkg_extensions (
  table_name TEXT,
  column_name TEXT,
  extension_name TEXT NOT NULL,
  definition TEXT NOT NULL,
  scope TEXT NOT NULL,
  CONSTRAINT ge_tce UNIQUE (table_name, column_name, extension_name)
);
INSERT OR IGNORE INTO gpkg_spatial_ref_sys
  (srs_name, srs_id, organization, organization_coordsys_id, definition, description)
VALUES
  ('Undefined cartesian SRS', -1, 'NONE', -1, 'undefined', 'undefined cartesian coordinate reference system'),
  ('Undefined geographic SRS', 0, 'NONE', 0, 'undefined', 'undefined geographic coordinate reference system');
";

const WGS84_WKT: &str = "GEOGCS[\"WGS 84\",DATUM[\"WGS_1984\",SPHEROID[\"WGS 84\",6378137,298.257223563,AUTHORITY[\"EPSG\",\"7030\"]],AUTHORITY[\"EPSG\",\"6326\"]],PRIMEM[\"Greenwich\",0,AUTHORITY[\"EPSG\",\"8901\"]],UNIT[\"degree\",0.0174532925199433,AUTHORITY[\"EPSG\",\"9122\"]],AUTHORITY[\"EPSG\",\"4326\"]]";

const WEB_MERCATOR_WKT: &str = "PROJCS[\"WGS 84 / Pseudo-Mercator\",GEOGCS[\"WGS 84\",DATUM[\"WGS_1984\",SPHEROID[\"WGS 84\",6378137,298.257223563,AUTHORITY[\"EPSG\",\"7030\"]],AUTHORITY[\"EPSG\",\"6326\"]],PRIMEM[\"Greenwich\",0,AUTHORITY[\"EPSG\",\"8901\"]],UNIT[\"degree\",0.0174532925199433,AUTHORITY[\"EPSG\",\"9122\"]],AUTHORITY[\"EPSG\",\"4326\"]],PROJECTION[\"Mercator_1SP\"],PARAMETER[\"central_meridian\",0],PARAMETER[\"scale_factor\",1],PARAMETER[\"false_easting\",0],PARAMETER[\"false_northing\",0],UNIT[\"metre\",1,AUTHORITY[\"EPSG\",\"9001\"]],AXIS[\"X\",EAST],AXIS[\"Y\",NORTH],EXTENSION[\"PROJ4\",\"+proj=merc +a=6378137 +b=6378137 +lat_ts=0.0 +lon_0=0.0 +x_0=0.0 +y_0=0 +k=1.0 +units=m +nadgrids=@null +wktext +no_defs\"],AUTHORITY[\"EPSG\",\"3857\"]]";

const WORLD_MERCATOR_WKT: &str = "PROJCS[\"WGS 84 / World Mercator\",GEOGCS[\"WGS 84\",DATUM[\"WGS_1984\",SPHEROID[\"WGS 84\",6378137,298.257223563,AUTHORITY[\"EPSG\",\"7030\"]],AUTHORITY[\"EPSG\",\"6326\"]],PRIMEM[\"Greenwich\",0,AUTHORITY[\"EPSG\",\"8901\"]],UNIT[\"degree\",0.0174532925199433,AUTHORITY[\"EPSG\",\"9122\"]],AUTHORITY[\"EPSG\",\"4326\"]],PROJECTION[\"Mercator_1SP\"],PARAMETER[\"central_meridian\",0],PARAMETER[\"scale_factor\",1],PARAMETER[\"false_easting\",0],PARAMETER[\"false_northing\",0],UNIT[\"metre\",1,AUTHORITY[\"EPSG\",\"9001\"]],AXIS[\"Easting\",EAST],AXIS[\"Northing\",NORTH],AUTHORITY[\"EPSG\",\"3395\"]]";

/// A pooled connection to a GeoPackage.
pub type PooledGpkgConnection = PooledConnection<SqliteConnectionManager>;

/// Axis-aligned rectangle in a CRS's units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Bounds {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// True if `(x, y)` lies inside, min edges inclusive and max edges exclusive.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x < self.max_x && y > self.min_y && y <= self.max_y
    }
}

/// A row of `gpkg_contents`.
#[derive(Debug, Clone, PartialEq)]
pub struct Contents {
    pub table_name: String,
    pub data_type: String,
    pub identifier: Option<String>,
    pub description: Option<String>,
    pub bounds: Option<Bounds>,
    pub srs_id: i32,
}

/// Scope of a registered extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtensionScope {
    ReadWrite,
    WriteOnly,
}

impl ExtensionScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtensionScope::ReadWrite => "read-write",
            ExtensionScope::WriteOnly => "write-only",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "read-write" => Some(ExtensionScope::ReadWrite),
            "write-only" => Some(ExtensionScope::WriteOnly),
            _ => None,
        }
    }
}

/// A row of `gpkg_extensions`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extension {
    pub table_name: Option<String>,
    pub column_name: Option<String>,
    pub extension_name: String,
    pub definition: String,
    pub scope: ExtensionScope,
}

impl Extension {
    pub fn new(
        table_name: Option<&str>,
        column_name: Option<&str>,
        extension_name: &str,
        definition: &str,
    ) -> Self {
        Self {
            table_name: table_name.map(str::to_string),
            column_name: column_name.map(str::to_string),
            extension_name: extension_name.to_string(),
            definition: definition.to_string(),
            scope: ExtensionScope::ReadWrite,
        }
    }
}

/// A GeoPackage file (or in-memory database) behind a connection pool.
///
/// # Example
///
/// ```no_run
/// use elevgrid::gpkg::GeoPackage;
///
/// let gpkg = GeoPackage::create("/tmp/terrain.gpkg")?;
/// let conn = gpkg.connection()?;
/// assert!(elevgrid::gpkg::has_table(&conn, "gpkg_contents")?);
/// # Ok::<(), elevgrid::CoverageError>(())
/// ```
#[derive(Clone)]
pub struct GeoPackage {
    pool: Pool<SqliteConnectionManager>,
    path: Option<PathBuf>,
}

impl GeoPackage {
    /// Open a GeoPackage, creating the file and core tables if needed.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_file(path.as_ref(), StoreConfig::DEFAULT_POOL_SIZE)
    }

    /// Open an existing GeoPackage file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(CoverageError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("GeoPackage not found: {}", path.display()),
            )));
        }
        Self::open_file(path, StoreConfig::DEFAULT_POOL_SIZE)
    }

    /// Open (or create) the GeoPackage named by a [`StoreConfig`].
    pub fn open_with(config: &StoreConfig) -> Result<Self> {
        Self::open_file(config.gpkg_path(), config.pool_size())
    }

    /// A private in-memory database.
    ///
    /// The pool holds a single connection that never expires, so callers must
    /// not hold two connections at once.
    pub fn open_in_memory() -> Result<Self> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connection_timeout(Duration::from_secs(5))
            .build(manager)?;
        let gpkg = Self { pool, path: None };
        gpkg.initialize()?;
        Ok(gpkg)
    }

    fn open_file(path: &Path, pool_size: u32) -> Result<Self> {
        let manager = SqliteConnectionManager::file(path).with_init(|conn| {
            conn.busy_timeout(Duration::from_secs(5))?;
            // journal_mode answers with a row, so it cannot go through execute_batch
            conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))?;
            conn.execute_batch("PRAGMA foreign_keys = ON;")
        });
        let pool = Pool::builder().max_size(pool_size.max(1)).build(manager)?;
        let gpkg = Self {
            pool,
            path: Some(path.to_path_buf()),
        };
        gpkg.initialize()?;
        tracing::debug!(path = %path.display(), pool_size, "opened GeoPackage");
        Ok(gpkg)
    }

    fn initialize(&self) -> Result<()> {
        let conn = self.connection()?;
        let app_id: i32 = conn.query_row("PRAGMA application_id", [], |r| r.get(0))?;
        if app_id == 0 {
            conn.execute_batch(&format!(
                "PRAGMA application_id = {APPLICATION_ID}; PRAGMA user_version = {USER_VERSION};"
            ))?;
        }
        conn.execute_batch(CORE_TABLES)?;
        Ok(())
    }

    /// Borrow a connection from the pool.
    pub fn connection(&self) -> Result<PooledGpkgConnection> {
        Ok(self.pool.get()?)
    }

    /// Path of the backing file, `None` for in-memory databases.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

impl std::fmt::Debug for GeoPackage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeoPackage")
            .field("path", &self.path)
            .field("pool", &self.pool.state())
            .finish()
    }
}

/// Reject names that are not plain SQL identifiers.
pub fn validate_table_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(CoverageError::InvalidTableName(name.to_string()))
    }
}

/// Double-quote an already validated identifier.
pub(crate) fn quote_identifier(name: &str) -> String {
    format!("\"{name}\"")
}

/// True if a table (or view) of that name exists.
pub fn has_table(conn: &Connection, name: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type IN ('table', 'view') AND name = ?1",
        params![name],
        |r| r.get(0),
    )?;
    Ok(count > 0)
}

/// True if `table` has a column named `column`.
pub fn has_column(conn: &Connection, table: &str, column: &str) -> Result<bool> {
    validate_table_name(table)?;
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote_identifier(table)))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name.eq_ignore_ascii_case(column) {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Insert one of the built-in spatial reference systems if it is missing.
///
/// Supports 4326, 3857, 3395 and the undefined systems -1 and 0. The 3D
/// geographic system 4979 needs a WKT 2 definition and goes through
/// [`CrsWkt::insert_srs`].
pub fn insert_srs(conn: &Connection, srid: i32) -> Result<()> {
    let (name, definition, description) = match srid {
        -1 | 0 => return Ok(()),
        4326 => ("WGS 84 geodetic", WGS84_WKT, "longitude/latitude coordinates in decimal degrees on the WGS 84 spheroid"),
        3857 => ("WGS 84 / Pseudo-Mercator", WEB_MERCATOR_WKT, "spherical Mercator projection on the WGS 84 spheroid"),
        3395 => ("WGS 84 / World Mercator", WORLD_MERCATOR_WKT, "ellipsoidal Mercator projection on the WGS 84 spheroid"),
        other => return Err(CoverageError::UnsupportedSrid(other)),
    };
    conn.execute(
        "INSERT OR IGNORE INTO gpkg_spatial_ref_sys
           (srs_name, srs_id, organization, organization_coordsys_id, definition, description)
         VALUES (?1, ?2, 'EPSG', ?2, ?3, ?4)",
        params![name, srid, definition, description],
    )?;
    Ok(())
}

/// True if a row for `srid` exists in `gpkg_spatial_ref_sys`.
pub fn has_srs(conn: &Connection, srid: i32) -> Result<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM gpkg_spatial_ref_sys WHERE srs_id = ?1",
            params![srid],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Create a tile pyramid user table with its contents, tile matrix set and
/// tile matrix rows.
///
/// Fails with [`CoverageError::TableExists`] rather than adopting a table
/// that is already there.
pub fn insert_tile_table(
    conn: &Connection,
    contents: &Contents,
    matrix_set: &TileMatrixSet,
    zoom_levels: &[ZoomLevelRow],
) -> Result<()> {
    validate_table_name(&contents.table_name)?;
    if has_table(conn, &contents.table_name)? {
        return Err(CoverageError::TableExists(contents.table_name.clone()));
    }
    let table = quote_identifier(&contents.table_name);

    let (min_x, min_y, max_x, max_y) = match contents.bounds {
        Some(b) => (Some(b.min_x), Some(b.min_y), Some(b.max_x), Some(b.max_y)),
        None => (None, None, None, None),
    };
    conn.execute(
        "INSERT INTO gpkg_contents
           (table_name, data_type, identifier, description, min_x, min_y, max_x, max_y, srs_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            contents.table_name,
            contents.data_type,
            contents.identifier.as_deref().unwrap_or(contents.table_name.as_str()),
            contents.description.as_deref().unwrap_or(""),
            min_x,
            min_y,
            max_x,
            max_y,
            contents.srs_id,
        ],
    )?;

    conn.execute_batch(&format!(
        "CREATE TABLE {table} (
           id INTEGER PRIMARY KEY AUTOINCREMENT,
           zoom_level INTEGER NOT NULL,
           tile_column INTEGER NOT NULL,
           tile_row INTEGER NOT NULL,
           tile_data BLOB NOT NULL,
           UNIQUE (zoom_level, tile_column, tile_row)
         );"
    ))?;

    let b = &matrix_set.bounds;
    conn.execute(
        "INSERT INTO gpkg_tile_matrix_set (table_name, srs_id, min_x, min_y, max_x, max_y)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![contents.table_name, matrix_set.srs_id, b.min_x, b.min_y, b.max_x, b.max_y],
    )?;

    let mut stmt = conn.prepare(
        "INSERT INTO gpkg_tile_matrix
           (table_name, zoom_level, matrix_width, matrix_height, tile_width, tile_height, pixel_x_size, pixel_y_size)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
    )?;
    for z in zoom_levels {
        stmt.execute(params![
            contents.table_name,
            z.zoom_level,
            z.matrix_width,
            z.matrix_height,
            z.tile_width,
            z.tile_height,
            z.pixel_x_size,
            z.pixel_y_size,
        ])?;
    }
    Ok(())
}

/// Read the `gpkg_contents` row of a table.
pub fn contents(conn: &Connection, table_name: &str) -> Result<Option<Contents>> {
    let row = conn
        .query_row(
            "SELECT table_name, data_type, identifier, description, min_x, min_y, max_x, max_y, srs_id
             FROM gpkg_contents WHERE table_name = ?1",
            params![table_name],
            |r| {
                let bounds = match (
                    r.get::<_, Option<f64>>(4)?,
                    r.get::<_, Option<f64>>(5)?,
                    r.get::<_, Option<f64>>(6)?,
                    r.get::<_, Option<f64>>(7)?,
                ) {
                    (Some(min_x), Some(min_y), Some(max_x), Some(max_y)) => {
                        Some(Bounds::new(min_x, min_y, max_x, max_y))
                    }
                    _ => None,
                };
                Ok(Contents {
                    table_name: r.get(0)?,
                    data_type: r.get(1)?,
                    identifier: r.get(2)?,
                    description: r.get(3)?,
                    bounds,
                    srs_id: r.get::<_, Option<i32>>(8)?.unwrap_or(0),
                })
            },
        )
        .optional()?;
    Ok(row)
}

/// True if an extension row with exactly this table/column/name exists.
pub fn has_extension(
    conn: &Connection,
    table_name: Option<&str>,
    column_name: Option<&str>,
    extension_name: &str,
) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM gpkg_extensions
         WHERE table_name IS ?1 AND column_name IS ?2 AND extension_name = ?3",
        params![table_name, column_name, extension_name],
        |r| r.get(0),
    )?;
    Ok(count > 0)
}

/// Register an extension. Returns `false` if it was already present.
pub fn insert_extension(conn: &Connection, extension: &Extension) -> Result<bool> {
    // NULLs are distinct under UNIQUE, so INSERT OR IGNORE alone would duplicate
    if has_extension(
        conn,
        extension.table_name.as_deref(),
        extension.column_name.as_deref(),
        &extension.extension_name,
    )? {
        return Ok(false);
    }
    conn.execute(
        "INSERT INTO gpkg_extensions (table_name, column_name, extension_name, definition, scope)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            extension.table_name,
            extension.column_name,
            extension.extension_name,
            extension.definition,
            extension.scope.as_str(),
        ],
    )?;
    Ok(true)
}

/// All registered extensions.
pub fn extensions(conn: &Connection) -> Result<Vec<Extension>> {
    let mut stmt = conn.prepare(
        "SELECT table_name, column_name, extension_name, definition, scope FROM gpkg_extensions",
    )?;
    let rows = stmt.query_map([], |r| {
        let scope: String = r.get(4)?;
        Ok(Extension {
            table_name: r.get(0)?,
            column_name: r.get(1)?,
            extension_name: r.get(2)?,
            definition: r.get(3)?,
            scope: ExtensionScope::parse(&scope).unwrap_or(ExtensionScope::ReadWrite),
        })
    })?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_create_sets_pragmas_and_core_tables() {
        let dir = TempDir::new().unwrap();
        let gpkg = GeoPackage::create(dir.path().join("test.gpkg")).unwrap();
        let conn = gpkg.connection().unwrap();

        let app_id: i32 = conn
            .query_row("PRAGMA application_id", [], |r| r.get(0))
            .unwrap();
        assert_eq!(app_id, APPLICATION_ID);

        for table in [
            "gpkg_spatial_ref_sys",
            "gpkg_contents",
            "gpkg_tile_matrix_set",
            "gpkg_tile_matrix",
            "gpkg_extensions",
        ] {
            assert!(has_table(&conn, table).unwrap(), "{table}");
        }
        assert!(has_srs(&conn, -1).unwrap());
        assert!(has_srs(&conn, 0).unwrap());
    }

    #[test]
    fn test_open_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = GeoPackage::open(dir.path().join("missing.gpkg")).unwrap_err();
        assert!(matches!(err, CoverageError::Io(_)));
    }

    #[test]
    fn test_reopen_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.gpkg");
        {
            let gpkg = GeoPackage::create(&path).unwrap();
            insert_srs(&gpkg.connection().unwrap(), 4326).unwrap();
        }
        let gpkg = GeoPackage::open(&path).unwrap();
        assert_eq!(gpkg.path(), Some(path.as_path()));
        assert!(has_srs(&gpkg.connection().unwrap(), 4326).unwrap());
    }

    #[test]
    fn test_insert_srs() {
        let gpkg = GeoPackage::open_in_memory().unwrap();
        let conn = gpkg.connection().unwrap();
        insert_srs(&conn, 3857).unwrap();
        insert_srs(&conn, 3857).unwrap();
        assert!(has_srs(&conn, 3857).unwrap());
        assert!(matches!(
            insert_srs(&conn, 32633),
            Err(CoverageError::UnsupportedSrid(32633))
        ));
    }

    #[test]
    fn test_validate_table_name() {
        assert!(validate_table_name("dted_level_1").is_ok());
        assert!(validate_table_name("_t2").is_ok());
        assert!(validate_table_name("").is_err());
        assert!(validate_table_name("1abc").is_err());
        assert!(validate_table_name("a\"; DROP TABLE x; --").is_err());
        assert!(validate_table_name("with space").is_err());
    }

    #[test]
    fn test_extensions_idempotent_with_null_column() {
        let gpkg = GeoPackage::open_in_memory().unwrap();
        let conn = gpkg.connection().unwrap();
        let ext = Extension::new(Some("t"), None, "x_ext", "http://example.com/x");

        assert!(insert_extension(&conn, &ext).unwrap());
        assert!(!insert_extension(&conn, &ext).unwrap());

        let all = extensions(&conn).unwrap();
        assert_eq!(all, vec![ext]);
        assert!(has_extension(&conn, Some("t"), None, "x_ext").unwrap());
        assert!(!has_extension(&conn, Some("t"), Some("c"), "x_ext").unwrap());
    }

    #[test]
    fn test_insert_tile_table() {
        let gpkg = GeoPackage::open_in_memory().unwrap();
        let conn = gpkg.connection().unwrap();
        insert_srs(&conn, 4326).unwrap();

        let zoom0 = ZoomLevelRow::zoom0(4326).unwrap();
        let matrix_set = TileMatrixSet::for_srid("tiles", 4326, &zoom0).unwrap();
        let contents = Contents {
            table_name: "tiles".into(),
            data_type: "tiles".into(),
            identifier: None,
            description: None,
            bounds: Some(Bounds::new(-10.0, -10.0, 10.0, 10.0)),
            srs_id: 4326,
        };
        insert_tile_table(&conn, &contents, &matrix_set, &create_quadtree(zoom0, 3)).unwrap();

        assert!(has_table(&conn, "tiles").unwrap());
        assert!(has_column(&conn, "tiles", "tile_data").unwrap());
        let read = super::contents(&conn, "tiles").unwrap().unwrap();
        assert_eq!(read.identifier.as_deref(), Some("tiles"));
        assert_eq!(read.bounds, contents.bounds);
        assert!(super::contents(&conn, "nope").unwrap().is_none());

        let table = TileTable::load(&conn, "tiles").unwrap().unwrap();
        assert_eq!(table.zoom_levels().len(), 3);
    }

    #[test]
    fn test_insert_tile_table_refuses_existing_table() {
        let gpkg = GeoPackage::open_in_memory().unwrap();
        let conn = gpkg.connection().unwrap();
        insert_srs(&conn, 4326).unwrap();
        conn.execute_batch("CREATE TABLE tiles (name TEXT)").unwrap();

        let zoom0 = ZoomLevelRow::zoom0(4326).unwrap();
        let matrix_set = TileMatrixSet::for_srid("tiles", 4326, &zoom0).unwrap();
        let contents = Contents {
            table_name: "tiles".into(),
            data_type: "tiles".into(),
            identifier: None,
            description: None,
            bounds: None,
            srs_id: 4326,
        };
        assert!(matches!(
            insert_tile_table(&conn, &contents, &matrix_set, &create_quadtree(zoom0, 1)),
            Err(CoverageError::TableExists(name)) if name == "tiles"
        ));
        assert!(super::contents(&conn, "tiles").unwrap().is_none());
        assert!(!has_column(&conn, "tiles", "tile_data").unwrap());
    }

    #[test]
    fn test_bounds_contains() {
        let b = Bounds::new(0.0, 0.0, 10.0, 5.0);
        assert!(b.contains(0.0, 5.0));
        assert!(!b.contains(10.0, 2.0));
        assert!(!b.contains(5.0, 0.0));
        assert_eq!(b.width(), 10.0);
        assert_eq!(b.height(), 5.0);
    }
}
