//! The `gpkg_crs_wkt` extension: WKT 2 (OGC 12-063) CRS definitions stored in
//! a `definition_12_063` column of `gpkg_spatial_ref_sys`.

use r2d2_sqlite::rusqlite::{params, Connection};

use super::{has_column, has_extension, has_srs, insert_extension, Extension};
use crate::error::{CoverageError, Result};

pub const EXTENSION_NAME: &str = "gpkg_crs_wkt";
pub const DEFINITION: &str = "http://www.geopackage.org/spec/#extension_crs_wkt";

const TABLE: &str = "gpkg_spatial_ref_sys";
const COLUMN: &str = "definition_12_063";

const WGS84_3D_WKT: &str = "GEODCRS[\"WGS 84\",DATUM[\"World Geodetic System 1984\",  ELLIPSOID[\"WGS 84\",6378137,298.257223563,LENGTHUNIT[\"metre\",1.0]]],CS[ellipsoidal,3],  AXIS[\"latitude\",north,ORDER[1],ANGLEUNIT[\"degree\",0.01745329252]],  AXIS[\"longitude\",east,ORDER[2],ANGLEUNIT[\"degree\",0.01745329252]],  AXIS[\"ellipsoidal height\",up,ORDER[3],LENGTHUNIT[\"metre\",1.0]],ID[\"EPSG\",4979]]";

/// A spatial reference system row with its WKT 2 text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Crs {
    pub srs_id: i32,
    pub srs_name: String,
    pub organization: String,
    pub organization_coordsys_id: i32,
    /// WKT 1 definition, `undefined` when only WKT 2 exists.
    pub definition: String,
    pub definition_12_063: String,
    pub description: Option<String>,
}

impl Crs {
    /// EPSG:4979, WGS 84 with ellipsoidal height.
    pub fn wgs84_3d() -> Crs {
        Crs {
            srs_id: 4979,
            srs_name: "WGS 84 3D".to_string(),
            organization: "EPSG".to_string(),
            organization_coordsys_id: 4979,
            definition: "undefined".to_string(),
            definition_12_063: WGS84_3D_WKT.to_string(),
            description: Some("WGS 84 geographic 3D".to_string()),
        }
    }
}

/// Operations on the CRS WKT extension of one GeoPackage.
pub struct CrsWkt;

impl CrsWkt {
    /// True if the column exists and the extension is registered.
    pub fn is_registered(conn: &Connection) -> Result<bool> {
        Ok(has_column(conn, TABLE, COLUMN)?
            && has_extension(conn, Some(TABLE), Some(COLUMN), EXTENSION_NAME)?)
    }

    /// Add the `definition_12_063` column and the extension row if missing.
    pub fn insert_extension(conn: &Connection) -> Result<()> {
        if !has_column(conn, TABLE, COLUMN)? {
            conn.execute_batch(&format!(
                "ALTER TABLE {TABLE} ADD COLUMN {COLUMN} TEXT NOT NULL DEFAULT 'undefined';"
            ))?;
        }
        insert_extension(
            conn,
            &Extension::new(Some(TABLE), Some(COLUMN), EXTENSION_NAME, DEFINITION),
        )?;
        if !Self::is_registered(conn)? {
            return Err(CoverageError::CrsWktUnavailable);
        }
        Ok(())
    }

    /// Insert a CRS unless one with the same id exists, installing the
    /// extension first. Returns `true` if a row was written.
    pub fn insert_srs(conn: &Connection, crs: &Crs) -> Result<bool> {
        Self::insert_extension(conn)?;
        if has_srs(conn, crs.srs_id)? {
            return Ok(false);
        }
        conn.execute(
            "INSERT INTO gpkg_spatial_ref_sys
               (srs_name, srs_id, organization, organization_coordsys_id, definition, definition_12_063, description)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                crs.srs_name,
                crs.srs_id,
                crs.organization,
                crs.organization_coordsys_id,
                crs.definition,
                crs.definition_12_063,
                crs.description,
            ],
        )?;
        tracing::debug!(srs_id = crs.srs_id, name = %crs.srs_name, "registered CRS");
        Ok(true)
    }

    /// The WKT 2 text stored for `srid`, if any.
    pub fn definition(conn: &Connection, srid: i32) -> Result<Option<String>> {
        if !has_column(conn, TABLE, COLUMN)? {
            return Ok(None);
        }
        let mut stmt = conn.prepare(&format!("SELECT {COLUMN} FROM {TABLE} WHERE srs_id = ?1"))?;
        let mut rows = stmt.query(params![srid])?;
        match rows.next()? {
            Some(row) => {
                let wkt: String = row.get(0)?;
                Ok((wkt != "undefined").then_some(wkt))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpkg::{extensions, insert_srs, GeoPackage};

    #[test]
    fn test_extension_lifecycle() {
        let gpkg = GeoPackage::open_in_memory().unwrap();
        let conn = gpkg.connection().unwrap();
        assert!(!CrsWkt::is_registered(&conn).unwrap());

        CrsWkt::insert_extension(&conn).unwrap();
        CrsWkt::insert_extension(&conn).unwrap();
        assert!(CrsWkt::is_registered(&conn).unwrap());

        let crs_rows: Vec<_> = extensions(&conn)
            .unwrap()
            .into_iter()
            .filter(|e| e.extension_name == EXTENSION_NAME)
            .collect();
        assert_eq!(crs_rows.len(), 1);
    }

    #[test]
    fn test_insert_srs_idempotent() {
        let gpkg = GeoPackage::open_in_memory().unwrap();
        let conn = gpkg.connection().unwrap();
        let crs = Crs::wgs84_3d();

        assert!(CrsWkt::insert_srs(&conn, &crs).unwrap());
        assert!(!CrsWkt::insert_srs(&conn, &crs).unwrap());

        let wkt = CrsWkt::definition(&conn, 4979).unwrap().unwrap();
        assert!(wkt.starts_with("GEODCRS[\"WGS 84\""));
        assert!(wkt.ends_with("ID[\"EPSG\",4979]]"));
    }

    #[test]
    fn test_existing_rows_default_to_undefined() {
        let gpkg = GeoPackage::open_in_memory().unwrap();
        let conn = gpkg.connection().unwrap();
        insert_srs(&conn, 4326).unwrap();
        assert_eq!(CrsWkt::definition(&conn, 4326).unwrap(), None);

        CrsWkt::insert_extension(&conn).unwrap();
        assert_eq!(CrsWkt::definition(&conn, 4326).unwrap(), None);
        assert_eq!(CrsWkt::definition(&conn, 9999).unwrap(), None);
    }
}
