//! Geodetic points.

/// Reference frame of a point's altitude.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AltitudeReference {
    /// Height above the WGS-84 ellipsoid.
    #[default]
    Hae,
    /// Height above ground level; resolved to HAE through a terrain source.
    Agl,
}

/// Altitude value meaning "not known".
pub const UNKNOWN_ALTITUDE: f64 = f64::NAN;

/// A latitude/longitude in decimal degrees with an optional altitude in meters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
    /// Altitude in meters, [`UNKNOWN_ALTITUDE`] when absent.
    pub altitude: f64,
    pub altitude_reference: AltitudeReference,
}

impl GeoPoint {
    /// The point at 0°N 0°E with no altitude.
    pub const ZERO: GeoPoint = GeoPoint::new(0.0, 0.0);

    /// A surface point with unknown altitude.
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            altitude: UNKNOWN_ALTITUDE,
            altitude_reference: AltitudeReference::Hae,
        }
    }

    /// A point with an altitude above the ellipsoid.
    pub const fn with_hae(latitude: f64, longitude: f64, altitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            altitude,
            altitude_reference: AltitudeReference::Hae,
        }
    }

    /// A point with an altitude above ground level.
    pub const fn with_agl(latitude: f64, longitude: f64, altitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            altitude,
            altitude_reference: AltitudeReference::Agl,
        }
    }

    pub fn has_altitude(&self) -> bool {
        !self.altitude.is_nan()
    }

    /// True when both coordinates are finite and within the valid ranges.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}
