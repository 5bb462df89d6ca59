//! SRTM `.hgt` tiles, the usual source for coverage imports.
//!
//! An `.hgt` file is a square grid of 16-bit big-endian signed heights in
//! meters covering one degree of latitude and longitude, stored north to
//! south. Files named `{N|S}{lat}{E|W}{lon}.hgt` are anchored at their
//! **southwest corner**. Raw files are memory-mapped; `.hgt.gz` and
//! `.hgt.zip` files are inflated into memory.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use flate2::read::GzDecoder;
use memmap2::Mmap;

use crate::error::{CoverageError, Result};
use crate::geodesy::HeightSource;

/// File size for SRTM1 (1 arc-second): 3601 × 3601 × 2 bytes
const SRTM1_SIZE: usize = 3601 * 3601 * 2;

/// File size for SRTM3 (3 arc-second): 1201 × 1201 × 2 bytes
const SRTM3_SIZE: usize = 1201 * 1201 * 2;

const SRTM1_SAMPLES: usize = 3601;
const SRTM3_SAMPLES: usize = 1201;

/// Value marking a void sample.
pub const VOID_VALUE: i16 = -32768;

/// Sample spacing of an `.hgt` tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HgtResolution {
    /// 1 arc-second (~30m)
    Srtm1,
    /// 3 arc-second (~90m)
    Srtm3,
}

impl HgtResolution {
    /// Samples per row and column.
    pub fn samples(&self) -> usize {
        match self {
            HgtResolution::Srtm1 => SRTM1_SAMPLES,
            HgtResolution::Srtm3 => SRTM3_SAMPLES,
        }
    }

    /// Approximate ground spacing in meters.
    pub fn meters(&self) -> f64 {
        match self {
            HgtResolution::Srtm1 => 30.0,
            HgtResolution::Srtm3 => 90.0,
        }
    }

    fn from_len(len: usize) -> Result<Self> {
        match len {
            SRTM1_SIZE => Ok(HgtResolution::Srtm1),
            SRTM3_SIZE => Ok(HgtResolution::Srtm3),
            size => Err(CoverageError::InvalidHgtSize { size }),
        }
    }
}

enum HgtBytes {
    Mapped(Mmap),
    Inflated(Vec<u8>),
}

impl HgtBytes {
    fn as_slice(&self) -> &[u8] {
        match self {
            HgtBytes::Mapped(m) => m,
            HgtBytes::Inflated(v) => v,
        }
    }
}

/// One `.hgt` tile.
///
/// # Example
///
/// ```no_run
/// use elevgrid::hgt::HgtTile;
///
/// let tile = HgtTile::from_file("/data/srtm/N35E138.hgt")?;
/// if let Some(h) = tile.elevation(35.3606, 138.7274) {
///     println!("Fuji: {h}m");
/// }
/// # Ok::<(), elevgrid::CoverageError>(())
/// ```
pub struct HgtTile {
    data: HgtBytes,
    resolution: HgtResolution,
    base_lat: i32,
    base_lon: i32,
}

impl std::fmt::Debug for HgtTile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HgtTile")
            .field("resolution", &self.resolution)
            .field("base_lat", &self.base_lat)
            .field("base_lon", &self.base_lon)
            .finish()
    }
}

impl HgtTile {
    /// Load a tile, taking its southwest corner from the file name.
    ///
    /// `.gz` and `.zip` files are decompressed; anything else is mapped.
    /// A name that does not parse anchors the tile at 0°, 0°.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let (base_lat, base_lon) = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(filename_to_lat_lon)
            .unwrap_or((0, 0));
        Self::from_file_with_coords(path, base_lat, base_lon)
    }

    /// Load a tile with an explicit southwest corner.
    pub fn from_file_with_coords<P: AsRef<Path>>(
        path: P,
        base_lat: i32,
        base_lon: i32,
    ) -> Result<Self> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();

        let data = if name.ends_with(".gz") {
            let decoder = GzDecoder::new(File::open(path)?);
            HgtBytes::Inflated(read_capped(decoder, SRTM3_SIZE as u64)?)
        } else if name.ends_with(".zip") {
            HgtBytes::Inflated(read_hgt_from_zip(path)?)
        } else {
            let file = File::open(path)?;
            // SAFETY: the file is opened read-only and the mapping is never
            // handed out mutably.
            HgtBytes::Mapped(unsafe { Mmap::map(&file)? })
        };

        let resolution = HgtResolution::from_len(data.as_slice().len())?;
        tracing::debug!(
            path = %path.display(),
            ?resolution,
            base_lat,
            base_lon,
            "loaded hgt tile"
        );
        Ok(Self {
            data,
            resolution,
            base_lat,
            base_lon,
        })
    }

    /// Build a tile from raw big-endian bytes already in memory.
    pub fn from_bytes(bytes: Vec<u8>, base_lat: i32, base_lon: i32) -> Result<Self> {
        let resolution = HgtResolution::from_len(bytes.len())?;
        Ok(Self {
            data: HgtBytes::Inflated(bytes),
            resolution,
            base_lat,
            base_lon,
        })
    }

    /// Nearest-sample height in meters.
    ///
    /// `None` outside the tile's one-degree square or on a void sample.
    pub fn elevation(&self, lat: f64, lon: f64) -> Option<f64> {
        let lat_frac = lat - self.base_lat as f64;
        let lon_frac = lon - self.base_lon as f64;
        if !(0.0..=1.0).contains(&lat_frac) || !(0.0..=1.0).contains(&lon_frac) {
            return None;
        }

        // row 0 is the north edge
        let last = (self.samples() - 1) as f64;
        let row = ((1.0 - lat_frac) * last).round() as usize;
        let col = (lon_frac * last).round() as usize;
        self.sample(row, col).map(f64::from)
    }

    /// Raw sample at `(row, col)`, `None` if void or out of range.
    pub fn sample(&self, row: usize, col: usize) -> Option<i16> {
        let n = self.samples();
        if row >= n || col >= n {
            return None;
        }
        let offset = (row * n + col) * 2;
        let bytes = self.data.as_slice();
        let value = i16::from_be_bytes([bytes[offset], bytes[offset + 1]]);
        (value != VOID_VALUE).then_some(value)
    }

    pub fn resolution(&self) -> HgtResolution {
        self.resolution
    }

    pub fn samples(&self) -> usize {
        self.resolution.samples()
    }

    /// Latitude of the southwest corner.
    pub fn base_lat(&self) -> i32 {
        self.base_lat
    }

    /// Longitude of the southwest corner.
    pub fn base_lon(&self) -> i32 {
        self.base_lon
    }

    /// True when `(lat, lon)` falls inside this tile.
    pub fn covers(&self, lat: f64, lon: f64) -> bool {
        let lat_frac = lat - self.base_lat as f64;
        let lon_frac = lon - self.base_lon as f64;
        (0.0..=1.0).contains(&lat_frac) && (0.0..=1.0).contains(&lon_frac)
    }
}

impl HeightSource for HgtTile {
    fn height(&self, latitude: f64, longitude: f64) -> f64 {
        self.elevation(latitude, longitude).unwrap_or(f64::NAN)
    }
}

/// Several `.hgt` tiles queried as one height source.
#[derive(Debug, Default)]
pub struct HgtMosaic {
    tiles: Vec<HgtTile>,
}

impl HgtMosaic {
    pub fn new(tiles: Vec<HgtTile>) -> Self {
        Self { tiles }
    }

    pub fn push(&mut self, tile: HgtTile) {
        self.tiles.push(tile);
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    /// Bounding box `(min_lat, min_lon, max_lat, max_lon)` of all tiles.
    pub fn extent(&self) -> Option<(f64, f64, f64, f64)> {
        let mut it = self.tiles.iter();
        let first = it.next()?;
        let init = (
            first.base_lat as f64,
            first.base_lon as f64,
            first.base_lat as f64 + 1.0,
            first.base_lon as f64 + 1.0,
        );
        Some(it.fold(init, |(s, w, n, e), t| {
            (
                s.min(t.base_lat as f64),
                w.min(t.base_lon as f64),
                n.max(t.base_lat as f64 + 1.0),
                e.max(t.base_lon as f64 + 1.0),
            )
        }))
    }
}

impl HeightSource for HgtMosaic {
    fn height(&self, latitude: f64, longitude: f64) -> f64 {
        self.tiles
            .iter()
            .filter(|t| t.covers(latitude, longitude))
            .find_map(|t| t.elevation(latitude, longitude))
            .unwrap_or(f64::NAN)
    }
}

/// Read a decompressed `.hgt` stream, never buffering more than one byte past
/// the largest valid tile. Oversized input then fails the size check.
fn read_capped<R: Read>(reader: R, size_hint: u64) -> Result<Vec<u8>> {
    let limit = SRTM1_SIZE as u64 + 1;
    let mut buf = Vec::with_capacity(size_hint.min(limit) as usize);
    reader.take(limit).read_to_end(&mut buf)?;
    Ok(buf)
}

fn read_hgt_from_zip(zip_path: &Path) -> Result<Vec<u8>> {
    let file = File::open(zip_path)?;
    let mut archive = zip::ZipArchive::new(file)?;

    for i in 0..archive.len() {
        let entry = archive.by_index(i)?;
        if entry.name().to_ascii_lowercase().ends_with(".hgt") {
            let declared = entry.size();
            return read_capped(entry, declared);
        }
    }
    Err(CoverageError::HgtNotInArchive {
        path: zip_path.to_path_buf(),
    })
}

/// The `.hgt` file name of the tile containing a location.
///
/// ```
/// use elevgrid::hgt::lat_lon_to_filename;
///
/// assert_eq!(lat_lon_to_filename(35.5, 138.7), "N35E138.hgt");
/// assert_eq!(lat_lon_to_filename(-12.3, -77.1), "S13W078.hgt");
/// ```
pub fn lat_lon_to_filename(lat: f64, lon: f64) -> String {
    coords_to_filename(lat.floor() as i32, lon.floor() as i32)
}

/// The `.hgt` file name for a southwest corner.
pub fn coords_to_filename(lat: i32, lon: i32) -> String {
    let lat_prefix = if lat >= 0 { 'N' } else { 'S' };
    let lon_prefix = if lon >= 0 { 'E' } else { 'W' };
    format!(
        "{}{:02}{}{:03}.hgt",
        lat_prefix,
        lat.abs(),
        lon_prefix,
        lon.abs()
    )
}

/// Southwest corner encoded in a file name, with or without directories
/// and `.hgt`, `.hgt.gz` or `.hgt.zip` extensions.
///
/// ```
/// use elevgrid::hgt::filename_to_lat_lon;
///
/// assert_eq!(filename_to_lat_lon("N35E138.hgt"), Some((35, 138)));
/// assert_eq!(filename_to_lat_lon("/srtm/S12W077.hgt.zip"), Some((-12, -77)));
/// assert_eq!(filename_to_lat_lon("invalid"), None);
/// ```
pub fn filename_to_lat_lon(filename: &str) -> Option<(i32, i32)> {
    let name = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    let name = name
        .strip_suffix(".gz")
        .or_else(|| name.strip_suffix(".zip"))
        .unwrap_or(name);
    let name = name.strip_suffix(".hgt").unwrap_or(name);

    if name.len() != 7 || !name.is_ascii() {
        return None;
    }
    let bytes = name.as_bytes();

    let lat_sign = match bytes[0] {
        b'N' | b'n' => 1,
        b'S' | b's' => -1,
        _ => return None,
    };
    let lon_sign = match bytes[3] {
        b'E' | b'e' => 1,
        b'W' | b'w' => -1,
        _ => return None,
    };
    let lat: i32 = name[1..3].parse().ok()?;
    let lon: i32 = name[4..7].parse().ok()?;
    Some((lat * lat_sign, lon * lon_sign))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn srtm3_bytes() -> Vec<u8> {
        let mut data = vec![0u8; SRTM3_SIZE];
        let mut put = |row: usize, col: usize, value: i16| {
            let offset = (row * SRTM3_SAMPLES + col) * 2;
            data[offset..offset + 2].copy_from_slice(&value.to_be_bytes());
        };
        put(0, 0, 1000);
        put(600, 600, 500);
        put(1200, 1200, 100);
        put(10, 10, VOID_VALUE);
        data
    }

    #[test]
    fn test_load_raw_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("N35E138.hgt");
        std::fs::write(&path, srtm3_bytes()).unwrap();

        let tile = HgtTile::from_file(&path).unwrap();
        assert_eq!(tile.resolution(), HgtResolution::Srtm3);
        assert_eq!((tile.base_lat(), tile.base_lon()), (35, 138));
        assert_eq!(tile.elevation(35.5, 138.5), Some(500.0));
        assert_eq!(tile.elevation(36.0, 138.0), Some(1000.0));
        assert_eq!(tile.elevation(35.0, 139.0), Some(100.0));
        assert_eq!(tile.elevation(34.5, 138.5), None);
    }

    #[test]
    fn test_void_sample() {
        let tile = HgtTile::from_bytes(srtm3_bytes(), 0, 0).unwrap();
        assert_eq!(tile.sample(10, 10), None);
        assert_eq!(tile.sample(5000, 0), None);
        let lat = 1.0 - 10.0 / 1200.0;
        let lon = 10.0 / 1200.0;
        assert_eq!(tile.elevation(lat, lon), None);
        assert!(tile.height(lat, lon).is_nan());
    }

    #[test]
    fn test_load_gzip_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("S01W078.hgt.gz");
        let mut encoder =
            flate2::write::GzEncoder::new(File::create(&path).unwrap(), flate2::Compression::fast());
        encoder.write_all(&srtm3_bytes()).unwrap();
        encoder.finish().unwrap();

        let tile = HgtTile::from_file(&path).unwrap();
        assert_eq!((tile.base_lat(), tile.base_lon()), (-1, -78));
        assert_eq!(tile.elevation(-0.5, -77.5), Some(500.0));
    }

    #[test]
    fn test_load_zip_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("N40E010.hgt.zip");
        let mut writer = zip::ZipWriter::new(File::create(&path).unwrap());
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);
        writer.start_file("N40E010.hgt", options).unwrap();
        writer.write_all(&srtm3_bytes()).unwrap();
        writer.finish().unwrap();

        let tile = HgtTile::from_file(&path).unwrap();
        assert_eq!(tile.elevation(40.5, 10.5), Some(500.0));
    }

    #[test]
    fn test_zip_without_hgt() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("N40E010.hgt.zip");
        let mut writer = zip::ZipWriter::new(File::create(&path).unwrap());
        writer
            .start_file("readme.txt", zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(b"nothing here").unwrap();
        writer.finish().unwrap();

        assert!(matches!(
            HgtTile::from_file(&path),
            Err(CoverageError::HgtNotInArchive { .. })
        ));
    }

    #[test]
    fn test_oversized_stream_is_capped() {
        let buf = read_capped(std::io::repeat(7), u64::MAX).unwrap();
        assert_eq!(buf.len(), SRTM1_SIZE + 1);
        assert!(matches!(
            HgtTile::from_bytes(buf, 0, 0),
            Err(CoverageError::InvalidHgtSize { .. })
        ));

        let small = read_capped(&[1u8, 2, 3][..], 1 << 40).unwrap();
        assert_eq!(small, vec![1, 2, 3]);
    }

    #[test]
    fn test_invalid_size() {
        assert!(matches!(
            HgtTile::from_bytes(vec![0u8; 1000], 0, 0),
            Err(CoverageError::InvalidHgtSize { size: 1000 })
        ));
    }

    #[test]
    fn test_mosaic() {
        let mut mosaic = HgtMosaic::default();
        assert!(mosaic.extent().is_none());
        mosaic.push(HgtTile::from_bytes(srtm3_bytes(), 35, 138).unwrap());
        mosaic.push(HgtTile::from_bytes(vec![0u8; SRTM3_SIZE], 35, 139).unwrap());

        assert_eq!(mosaic.len(), 2);
        assert_eq!(mosaic.extent(), Some((35.0, 138.0, 36.0, 140.0)));
        assert_eq!(mosaic.height(35.5, 138.5), 500.0);
        assert_eq!(mosaic.height(35.5, 139.5), 0.0);
        assert!(mosaic.height(10.0, 10.0).is_nan());
    }

    #[test]
    fn test_filenames() {
        assert_eq!(lat_lon_to_filename(0.5, -0.5), "N00W001.hgt");
        assert_eq!(lat_lon_to_filename(-59.9, -179.9), "S60W180.hgt");
        assert_eq!(coords_to_filename(-1, 10), "S01E010.hgt");
        assert_eq!(filename_to_lat_lon("n35e138"), Some((35, 138)));
        assert_eq!(filename_to_lat_lon("C:\\srtm\\N00E000.hgt.gz"), Some((0, 0)));
        assert_eq!(filename_to_lat_lon("X35E138.hgt"), None);
        assert_eq!(filename_to_lat_lon("N35E13.hgt"), None);
    }

    #[test]
    fn test_resolution_info() {
        assert_eq!(HgtResolution::Srtm1.samples(), 3601);
        assert_eq!(HgtResolution::Srtm3.meters(), 90.0);
    }
}
