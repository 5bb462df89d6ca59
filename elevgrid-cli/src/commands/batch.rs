use anyhow::{Context, Result};
use elevgrid::{CoverageSampler, StoreConfig};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub fn run(
    config: StoreConfig,
    table: &str,
    input: &Path,
    output: Option<PathBuf>,
    lat_col: &str,
    lon_col: &str,
    zoom: Option<i32>,
) -> Result<()> {
    let gpkg = super::open_existing(&config)?;
    let coverage = super::open_coverage(&gpkg, table)?;
    let zoom = super::resolve_zoom(&coverage, zoom)?;
    let sampler = CoverageSampler::new(Arc::new(coverage), zoom, config.cache_size())?;

    let file = File::open(input).context("Failed to open input file")?;
    let mut reader = csv::Reader::from_reader(BufReader::new(file));

    // Find column indices
    let headers = reader.headers()?.clone();
    let lat_idx = headers
        .iter()
        .position(|h| h == lat_col)
        .with_context(|| format!("Column '{}' not found in CSV", lat_col))?;
    let lon_idx = headers
        .iter()
        .position(|h| h == lon_col)
        .with_context(|| format!("Column '{}' not found in CSV", lon_col))?;

    let records: Vec<_> = reader.records().collect::<Result<_, _>>()?;

    let pb = ProgressBar::new(records.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
            )?
            .progress_chars("#>-"),
    );

    let output_path = output.unwrap_or_else(|| default_output(input));
    let output_file = File::create(&output_path).context("Failed to create output file")?;
    let mut writer = csv::Writer::from_writer(BufWriter::new(output_file));

    let mut new_headers: Vec<&str> = headers.iter().collect();
    new_headers.push("elevation");
    writer.write_record(&new_headers)?;

    for record in records {
        let lat: f64 = record
            .get(lat_idx)
            .context("Missing latitude")?
            .trim()
            .parse()
            .context("Invalid latitude")?;
        let lon: f64 = record
            .get(lon_idx)
            .context("Missing longitude")?
            .trim()
            .parse()
            .context("Invalid longitude")?;

        let h = sampler.elevation(lat, lon);
        let elevation = if h.is_nan() {
            "void".to_string()
        } else {
            format!("{:.2}", h)
        };

        let mut new_record: Vec<&str> = record.iter().collect();
        new_record.push(&elevation);
        writer.write_record(&new_record)?;

        pb.inc(1);
    }

    pb.finish_with_message("done");
    writer.flush()?;

    let stats = sampler.cache_stats();
    tracing::debug!(
        hits = stats.hit_count,
        misses = stats.miss_count,
        "batch cache usage"
    );
    println!("Output written to: {}", output_path.display());
    Ok(())
}

fn default_output(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    input.with_file_name(format!("{}_elevation.csv", stem))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_output() {
        assert_eq!(
            default_output(Path::new("/data/points.csv")),
            PathBuf::from("/data/points_elevation.csv")
        );
    }
}
