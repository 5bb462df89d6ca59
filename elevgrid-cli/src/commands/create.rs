use anyhow::{Context, Result};
use elevgrid::{insert_gridded_coverage, Datatype, GeoPackage, GriddedCoverage, StoreConfig};

pub struct CoverageArgs {
    pub table: String,
    pub srid: i32,
    pub min_zoom: i32,
    pub max_zoom: i32,
    pub datatype: String,
    pub scale: f64,
    pub offset: f64,
    pub precision: f64,
    pub data_null: Option<f64>,
    pub uom: Option<String>,
}

pub fn run(config: StoreConfig, args: CoverageArgs) -> Result<()> {
    let datatype: Datatype = args.datatype.parse()?;

    let mut descriptor = GriddedCoverage::new(datatype)
        .with_scale_offset(args.scale, args.offset)
        .with_precision(args.precision);
    if let Some(null) = args.data_null {
        descriptor = descriptor.with_data_null(null);
    }
    if let Some(uom) = args.uom {
        descriptor = descriptor.with_uom(uom);
    }

    let gpkg = GeoPackage::open_with(&config)
        .with_context(|| format!("Failed to open {}", config.gpkg_path().display()))?;
    insert_gridded_coverage(
        &gpkg,
        &args.table,
        &descriptor,
        args.srid,
        args.min_zoom,
        args.max_zoom,
        None,
    )
    .with_context(|| format!("Failed to register coverage '{}'", args.table))?;

    println!(
        "Created {} coverage '{}' (EPSG:{}, zoom {}..={}) in {}",
        datatype,
        args.table,
        args.srid,
        args.min_zoom,
        args.max_zoom,
        config.gpkg_path().display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use elevgrid::Coverage;
    use tempfile::TempDir;

    fn args(table: &str, datatype: &str) -> CoverageArgs {
        CoverageArgs {
            table: table.to_string(),
            srid: 4326,
            min_zoom: 0,
            max_zoom: 2,
            datatype: datatype.to_string(),
            scale: 1.0,
            offset: 0.0,
            precision: 1.0,
            data_null: None,
            uom: None,
        }
    }

    #[test]
    fn test_create_then_list() {
        let dir = TempDir::new().unwrap();
        let config = StoreConfig::new(dir.path().join("cli.gpkg"));

        run(config.clone(), args("dem", "integer")).unwrap();
        assert!(run(config.clone(), args("dem", "integer")).is_err());
        assert!(run(config.clone(), args("dsm", "double")).is_err());

        let gpkg = crate::commands::open_existing(&config).unwrap();
        assert_eq!(Coverage::list(&gpkg).unwrap(), vec!["dem"]);
        let coverage = crate::commands::open_coverage(&gpkg, "dem").unwrap();
        assert_eq!(crate::commands::resolve_zoom(&coverage, None).unwrap(), 2);
        drop(gpkg);

        crate::commands::list::run(config.clone()).unwrap();
        crate::commands::info::run(config, "dem").unwrap();
    }
}
