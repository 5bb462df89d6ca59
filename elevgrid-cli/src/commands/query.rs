use anyhow::Result;
use elevgrid::{CoverageSampler, StoreConfig};
use serde::Serialize;
use std::sync::Arc;

#[derive(Serialize)]
struct ElevationResponse {
    lat: f64,
    lon: f64,
    zoom: i32,
    elevation: Option<f64>,
}

pub fn run(
    config: StoreConfig,
    table: &str,
    lat: f64,
    lon: f64,
    zoom: Option<i32>,
    json: bool,
) -> Result<()> {
    let gpkg = super::open_existing(&config)?;
    let coverage = super::open_coverage(&gpkg, table)?;
    let zoom = super::resolve_zoom(&coverage, zoom)?;
    let sampler = CoverageSampler::new(Arc::new(coverage), zoom, config.cache_size())?;

    let h = sampler.try_elevation(lat, lon)?;
    let elevation = (!h.is_nan()).then_some(h);

    if json {
        let response = ElevationResponse {
            lat,
            lon,
            zoom,
            elevation,
        };
        println!("{}", serde_json::to_string(&response)?);
    } else {
        match elevation {
            Some(h) => println!("{:.2}", h),
            None => println!("void"),
        }
    }

    Ok(())
}
