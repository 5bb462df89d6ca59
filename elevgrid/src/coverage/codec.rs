//! Lossless single-band raster codec for coverage tiles.
//!
//! Layout (little-endian):
//!
//! | offset | size | field |
//! |--------|------|-------|
//! | 0      | 4    | magic `GCRT` |
//! | 4      | 1    | sample format: 1 = u16, 2 = f32 |
//! | 5      | 1    | flags: bit 0 set when a no-data value is present |
//! | 6      | 2    | reserved, zero |
//! | 8      | 4    | width |
//! | 12     | 4    | height |
//! | 16     | 8    | no-data value (f64) |
//! | 24     | ..   | zlib stream of the samples |
//!
//! Before compression u16 rows are delta coded and f32 samples are split
//! into byte planes, which lets DEFLATE find the redundancy in smooth terrain.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::error::{CoverageError, Result};

pub const MAGIC: [u8; 4] = *b"GCRT";
const HEADER_LEN: usize = 24;
const FLAG_NODATA: u8 = 0x01;
/// Upper bound of DEFLATE's expansion ratio.
const MAX_DEFLATE_RATIO: usize = 1032;

/// Physical sample type of a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    U16 = 1,
    F32 = 2,
}

impl SampleFormat {
    fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(SampleFormat::U16),
            2 => Some(SampleFormat::F32),
            _ => None,
        }
    }

    /// Bytes per sample.
    pub fn size(&self) -> usize {
        match self {
            SampleFormat::U16 => 2,
            SampleFormat::F32 => 4,
        }
    }
}

/// Raster samples in row-major order.
#[derive(Debug, Clone, PartialEq)]
pub enum RasterData {
    U16(Vec<u16>),
    F32(Vec<f32>),
}

impl RasterData {
    pub fn len(&self) -> usize {
        match self {
            RasterData::U16(v) => v.len(),
            RasterData::F32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn format(&self) -> SampleFormat {
        match self {
            RasterData::U16(_) => SampleFormat::U16,
            RasterData::F32(_) => SampleFormat::F32,
        }
    }
}

/// A decoded single-band raster.
#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    pub width: usize,
    pub height: usize,
    /// No-data value recorded in the tile, if any.
    pub nodata: Option<f64>,
    pub data: RasterData,
}

/// Encode a raster. The sample count must equal `width * height`.
pub fn encode_raster(raster: &Raster) -> Result<Vec<u8>> {
    let expected = raster
        .width
        .checked_mul(raster.height)
        .ok_or_else(|| CoverageError::CorruptTile("raster dimensions overflow".into()))?;
    if raster.data.len() != expected {
        return Err(CoverageError::SampleCountMismatch {
            actual: raster.data.len(),
            width: raster.width,
            height: raster.height,
        });
    }
    let width = u32::try_from(raster.width)
        .map_err(|_| CoverageError::CorruptTile("raster too wide".into()))?;
    let height = u32::try_from(raster.height)
        .map_err(|_| CoverageError::CorruptTile("raster too tall".into()))?;

    let payload = match &raster.data {
        RasterData::U16(samples) => delta_encode(samples, raster.width),
        RasterData::F32(samples) => shuffle(samples),
    };

    let mut out = Vec::with_capacity(HEADER_LEN + payload.len() / 2);
    out.extend_from_slice(&MAGIC);
    out.push(raster.data.format() as u8);
    out.push(if raster.nodata.is_some() { FLAG_NODATA } else { 0 });
    out.extend_from_slice(&[0, 0]);
    out.extend_from_slice(&width.to_le_bytes());
    out.extend_from_slice(&height.to_le_bytes());
    out.extend_from_slice(&raster.nodata.unwrap_or(0.0).to_le_bytes());

    let mut encoder = ZlibEncoder::new(out, Compression::default());
    encoder.write_all(&payload)?;
    Ok(encoder.finish()?)
}

/// The fixed-size header of an encoded raster.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterHeader {
    pub format: SampleFormat,
    pub width: usize,
    pub height: usize,
    pub nodata: Option<f64>,
}

/// Parse the header of an encoded raster without inflating the samples.
pub fn read_header(buf: &[u8]) -> Result<RasterHeader> {
    if buf.len() < HEADER_LEN {
        return Err(CoverageError::CorruptTile(format!(
            "{} bytes is shorter than the header",
            buf.len()
        )));
    }
    if buf[0..4] != MAGIC {
        return Err(CoverageError::CorruptTile("bad magic".into()));
    }
    let format = SampleFormat::from_byte(buf[4])
        .ok_or_else(|| CoverageError::CorruptTile(format!("unknown sample format {}", buf[4])))?;
    let flags = buf[5];
    Ok(RasterHeader {
        format,
        width: read_u32(&buf[8..12]) as usize,
        height: read_u32(&buf[12..16]) as usize,
        nodata: (flags & FLAG_NODATA != 0).then(|| read_f64(&buf[16..24])),
    })
}

/// Decode a buffer produced by [`encode_raster`].
///
/// The header is untrusted: sizes that overflow, or that the compressed
/// stream could not possibly hold, are reported as [`CoverageError::CorruptTile`].
pub fn decode_raster(buf: &[u8]) -> Result<Raster> {
    let RasterHeader {
        format,
        width,
        height,
        nodata,
    } = read_header(buf)?;

    let expected_bytes = width
        .checked_mul(height)
        .and_then(|count| count.checked_mul(format.size()))
        .ok_or_else(|| CoverageError::CorruptTile("raster dimensions overflow".into()))?;
    let stream = &buf[HEADER_LEN..];
    let inflate_bound = stream.len().saturating_mul(MAX_DEFLATE_RATIO);
    if expected_bytes > inflate_bound {
        return Err(CoverageError::CorruptTile(format!(
            "{width}x{height} samples cannot come from a {} byte stream",
            stream.len()
        )));
    }

    let mut payload = Vec::with_capacity(expected_bytes);
    ZlibDecoder::new(stream)
        .take(expected_bytes as u64 + 1)
        .read_to_end(&mut payload)
        .map_err(|e| CoverageError::CorruptTile(format!("inflate failed: {e}")))?;
    if payload.len() != expected_bytes {
        return Err(CoverageError::CorruptTile(format!(
            "payload is {} bytes, expected {expected_bytes} for {width}x{height}",
            payload.len()
        )));
    }

    let data = match format {
        SampleFormat::U16 => RasterData::U16(delta_decode(&payload, width)),
        SampleFormat::F32 => RasterData::F32(unshuffle(&payload)),
    };
    Ok(Raster {
        width,
        height,
        nodata,
        data,
    })
}

fn read_u32(b: &[u8]) -> u32 {
    let mut a = [0u8; 4];
    a.copy_from_slice(b);
    u32::from_le_bytes(a)
}

fn read_f64(b: &[u8]) -> f64 {
    let mut a = [0u8; 8];
    a.copy_from_slice(b);
    f64::from_le_bytes(a)
}

fn delta_encode(samples: &[u16], width: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for row in samples.chunks(width.max(1)) {
        let mut prev = 0u16;
        for &s in row {
            out.extend_from_slice(&s.wrapping_sub(prev).to_le_bytes());
            prev = s;
        }
    }
    out
}

fn delta_decode(payload: &[u8], width: usize) -> Vec<u16> {
    let mut out = Vec::with_capacity(payload.len() / 2);
    for row in payload.chunks(width.max(1) * 2) {
        let mut prev = 0u16;
        for pair in row.chunks_exact(2) {
            prev = prev.wrapping_add(u16::from_le_bytes([pair[0], pair[1]]));
            out.push(prev);
        }
    }
    out
}

fn shuffle(samples: &[f32]) -> Vec<u8> {
    let n = samples.len();
    let mut out = vec![0u8; n * 4];
    for (i, s) in samples.iter().enumerate() {
        for (plane, byte) in s.to_le_bytes().into_iter().enumerate() {
            out[plane * n + i] = byte;
        }
    }
    out
}

fn unshuffle(payload: &[u8]) -> Vec<f32> {
    let n = payload.len() / 4;
    (0..n)
        .map(|i| {
            f32::from_le_bytes([
                payload[i],
                payload[n + i],
                payload[2 * n + i],
                payload[3 * n + i],
            ])
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_u16_round_trip() {
        let samples: Vec<u16> = (0..64 * 32).map(|i| (i * 37 % 65535) as u16).collect();
        let raster = Raster {
            width: 64,
            height: 32,
            nodata: Some(65535.0),
            data: RasterData::U16(samples),
        };
        let buf = encode_raster(&raster).unwrap();
        assert_eq!(&buf[0..4], b"GCRT");
        assert_eq!(decode_raster(&buf).unwrap(), raster);
    }

    #[test]
    fn test_f32_round_trip_keeps_nan_bits() {
        let samples = vec![1.5f32, f32::NAN, -0.0, f32::MAX, 1e-30, 8848.86];
        let raster = Raster {
            width: 3,
            height: 2,
            nodata: None,
            data: RasterData::F32(samples.clone()),
        };
        let decoded = decode_raster(&encode_raster(&raster).unwrap()).unwrap();
        assert_eq!(decoded.nodata, None);
        let RasterData::F32(out) = decoded.data else {
            panic!("expected f32 samples");
        };
        let bits = |v: &[f32]| v.iter().map(|f| f.to_bits()).collect::<Vec<_>>();
        assert_eq!(bits(&out), bits(&samples));
    }

    #[test]
    fn test_smooth_terrain_compresses() {
        let samples: Vec<u16> = (0..256 * 256).map(|i| 1000 + (i % 256) as u16).collect();
        let raster = Raster {
            width: 256,
            height: 256,
            nodata: None,
            data: RasterData::U16(samples),
        };
        let buf = encode_raster(&raster).unwrap();
        assert!(buf.len() < 256 * 256 * 2 / 20, "{} bytes", buf.len());
    }

    #[test]
    fn test_sample_count_mismatch() {
        let raster = Raster {
            width: 3,
            height: 3,
            nodata: None,
            data: RasterData::U16(vec![0; 8]),
        };
        assert!(matches!(
            encode_raster(&raster),
            Err(CoverageError::SampleCountMismatch { actual: 8, .. })
        ));
    }

    #[test]
    fn test_corrupt_input() {
        assert!(matches!(
            decode_raster(b"GCRT"),
            Err(CoverageError::CorruptTile(_))
        ));

        let raster = Raster {
            width: 2,
            height: 2,
            nodata: None,
            data: RasterData::U16(vec![1, 2, 3, 4]),
        };
        let mut buf = encode_raster(&raster).unwrap();
        buf[0] = b'X';
        assert!(decode_raster(&buf).is_err());

        // header claims more samples than the stream holds
        let mut buf = encode_raster(&raster).unwrap();
        buf[8..12].copy_from_slice(&3u32.to_le_bytes());
        assert!(matches!(
            decode_raster(&buf),
            Err(CoverageError::CorruptTile(_))
        ));

        let mut buf = encode_raster(&raster).unwrap();
        buf[4] = 9;
        assert!(decode_raster(&buf).is_err());
    }

    #[test]
    fn test_forged_dimensions_rejected_before_inflate() {
        let raster = Raster {
            width: 2,
            height: 2,
            nodata: None,
            data: RasterData::F32(vec![1.0, 2.0, 3.0, 4.0]),
        };
        let mut buf = encode_raster(&raster).unwrap();
        let huge = u32::MAX / 2;
        buf[8..12].copy_from_slice(&huge.to_le_bytes());
        buf[12..16].copy_from_slice(&huge.to_le_bytes());

        let header = read_header(&buf).unwrap();
        assert_eq!(header.width, huge as usize);
        assert!(matches!(
            decode_raster(&buf),
            Err(CoverageError::CorruptTile(_))
        ));

        buf[8..12].copy_from_slice(&65535u32.to_le_bytes());
        buf[12..16].copy_from_slice(&65535u32.to_le_bytes());
        assert!(matches!(
            decode_raster(&buf),
            Err(CoverageError::CorruptTile(_))
        ));
    }
}
