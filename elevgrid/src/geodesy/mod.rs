//! Geodetic calculations on the WGS-84 ellipsoid.
//!
//! The free functions in [`calc`] are pure. Operations that need terrain,
//! geoid or magnetic-field data live on [`GeoCalculator`], which holds those
//! collaborators explicitly instead of reaching for process-wide singletons.
//!
//! Nothing in this module returns an error or panics on bad input: unknown or
//! undefined results are `NaN` (or `None` where a point cannot be formed), so
//! results can be chained inside per-frame loops.

pub mod calc;
pub(crate) mod ellipsoid;
pub mod point;
pub(crate) mod utm;

pub use calc::{
    approximate_meters_per_degree_latitude, approximate_meters_per_degree_longitude, bearing,
    compute_average, compute_grid_convergence, compute_grid_convergence_along, distance,
    haversine, interpolate, line_of_bearing_intersect, midpoint, midpoint_opt, point_at_distance,
    point_at_distance_inclined, GeoCalculator,
};
pub use point::{AltitudeReference, GeoPoint, UNKNOWN_ALTITUDE};

/// A height lookup by location: terrain elevation or geoid separation.
///
/// Implementations return meters, or `NaN` when the location is not covered.
pub trait HeightSource: Send + Sync {
    fn height(&self, latitude: f64, longitude: f64) -> f64;
}

impl<F> HeightSource for F
where
    F: Fn(f64, f64) -> f64 + Send + Sync,
{
    fn height(&self, latitude: f64, longitude: f64) -> f64 {
        self(latitude, longitude)
    }
}

/// A model of the Earth's magnetic field.
pub trait MagneticModel: Send + Sync {
    /// Declination in degrees (east positive) at the location and time
    /// (milliseconds since the Unix epoch, UTC). `NaN` when unavailable.
    fn declination(&self, latitude: f64, longitude: f64, altitude: f64, epoch_millis: i64) -> f64;
}

/// A constant declination, e.g. one surveyed for a site.
#[derive(Debug, Clone, Copy)]
pub struct FixedDeclination(pub f64);

impl MagneticModel for FixedDeclination {
    fn declination(&self, _: f64, _: f64, _: f64, _: i64) -> f64 {
        self.0
    }
}
