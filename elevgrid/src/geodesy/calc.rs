//! Distance, bearing and position calculations.

use std::f64::consts::PI;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use super::ellipsoid::{self, normalize_longitude, WGS84_A};
use super::point::{AltitudeReference, GeoPoint, UNKNOWN_ALTITUDE};
use super::utm;
use super::{HeightSource, MagneticModel};

const EPSILON: f64 = 1e-12;

/// Wrap an angle into [0, 360).
fn normalize_bearing(angle: f64) -> f64 {
    let wrapped = angle.rem_euclid(360.0);
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// Ellipsoidal surface distance in meters between two points.
///
/// Uses Vincenty's inverse solution on WGS-84. Returns `NaN` for invalid
/// coordinates and for nearly antipodal pairs where the solution does not
/// converge.
///
/// # Examples
///
/// ```
/// use elevgrid::geodesy::{distance, GeoPoint};
///
/// let d = distance(&GeoPoint::new(0.0, 0.0), &GeoPoint::new(0.0, 1.0));
/// assert!((d - 111319.5).abs() < 1.0);
/// ```
pub fn distance(a: &GeoPoint, b: &GeoPoint) -> f64 {
    if !(a.is_valid() && b.is_valid()) {
        return f64::NAN;
    }
    ellipsoid::inverse(a.latitude, a.longitude, b.latitude, b.longitude)
        .map(|inv| inv.distance)
        .unwrap_or(f64::NAN)
}

/// Haversine distance in meters on a sphere with the WGS-84 equatorial radius.
///
/// Faster than [`distance`] but off by up to ~0.5% since it ignores flattening.
pub fn haversine(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let phi1 = a.latitude.to_radians();
    let phi2 = b.latitude.to_radians();
    let d_phi = phi2 - phi1;
    let d_lambda = (b.longitude - a.longitude).to_radians();
    let h = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    2.0 * WGS84_A * h.sqrt().min(1.0).asin()
}

fn spherical_bearing(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let phi1 = a.latitude.to_radians();
    let phi2 = b.latitude.to_radians();
    let d_lambda = (b.longitude - a.longitude).to_radians();
    let y = d_lambda.sin() * phi2.cos();
    let x = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * d_lambda.cos();
    y.atan2(x).to_degrees()
}

/// Initial bearing in degrees [0, 360) from `a` towards `b`.
///
/// Coincident points have a bearing of 0.
pub fn bearing(a: &GeoPoint, b: &GeoPoint) -> f64 {
    if !(a.is_valid() && b.is_valid()) {
        return f64::NAN;
    }
    let raw = match ellipsoid::inverse(a.latitude, a.longitude, b.latitude, b.longitude) {
        Some(inv) if inv.initial_bearing.is_finite() => inv.initial_bearing,
        // near-antipodal: the spherical azimuth is the best available estimate
        _ => spherical_bearing(a, b),
    };
    normalize_bearing(raw)
}

/// The surface point `distance` meters from `src` along `azimuth` (degrees true).
///
/// The result carries no altitude.
pub fn point_at_distance(src: &GeoPoint, azimuth: f64, distance: f64) -> GeoPoint {
    if !src.is_valid() || !azimuth.is_finite() || !distance.is_finite() {
        return GeoPoint::new(f64::NAN, f64::NAN);
    }
    let (lat, lon) = ellipsoid::direct(src.latitude, src.longitude, azimuth, distance);
    GeoPoint::new(lat, lon)
}

/// Like [`point_at_distance`], with an altitude derived from an inclination.
///
/// `distance` is always the surface distance, never the slant range; the
/// inclination (degrees above the horizontal) only determines the altitude of
/// the result, `src.altitude + distance * tan(inclination)`. A `NaN`
/// inclination gives a surface-only result.
pub fn point_at_distance_inclined(
    src: &GeoPoint,
    azimuth: f64,
    distance: f64,
    inclination: f64,
) -> GeoPoint {
    let mut result = point_at_distance(src, azimuth, distance);
    if !inclination.is_nan() {
        let base = if src.has_altitude() { src.altitude } else { 0.0 };
        result.altitude = base + distance * inclination.to_radians().tan();
        result.altitude_reference = src.altitude_reference;
    }
    result
}

/// The point `weight` (0..1) of the way from `src` to `dst` along the line of
/// bearing. Altitude is interpolated linearly when either endpoint has one,
/// treating a missing altitude as 0.
pub fn interpolate(src: &GeoPoint, dst: &GeoPoint, weight: f64) -> GeoPoint {
    let mut surface = point_at_distance(src, bearing(src, dst), distance(src, dst) * weight);
    if !src.has_altitude() && !dst.has_altitude() {
        return surface;
    }
    let src_alt = if src.has_altitude() { src.altitude } else { 0.0 };
    let dst_alt = if dst.has_altitude() { dst.altitude } else { 0.0 };
    surface.altitude = src_alt + (dst_alt - src_alt) * weight;
    surface.altitude_reference = src.altitude_reference;
    surface
}

/// The point halfway along the line of bearing from `a` to `b`.
pub fn midpoint(a: &GeoPoint, b: &GeoPoint) -> GeoPoint {
    interpolate(a, b, 0.5)
}

/// [`midpoint`] over optional endpoints: when only one is present it is
/// returned unchanged, and `None` when neither is.
pub fn midpoint_opt(a: Option<&GeoPoint>, b: Option<&GeoPoint>) -> Option<GeoPoint> {
    match (a, b) {
        (Some(a), Some(b)) => Some(midpoint(a, b)),
        (Some(p), None) | (None, Some(p)) => Some(*p),
        (None, None) => None,
    }
}

/// Intersection of two lines of bearing, solved on the sphere.
///
/// Returns `None` when the rays do not meet ahead of both start points:
/// collinear rays (infinite solutions), rays that diverge or only meet on the
/// far side of the globe, or identical rays from one point. Rays from the same start point with different bearings
/// meet at that point.
pub fn line_of_bearing_intersect(
    a_start: &GeoPoint,
    a_bearing: f64,
    b_start: &GeoPoint,
    b_bearing: f64,
) -> Option<GeoPoint> {
    if !(a_start.is_valid() && b_start.is_valid() && a_bearing.is_finite() && b_bearing.is_finite())
    {
        return None;
    }

    let phi1 = a_start.latitude.to_radians();
    let lambda1 = a_start.longitude.to_radians();
    let phi2 = b_start.latitude.to_radians();
    let lambda2 = b_start.longitude.to_radians();
    let theta13 = a_bearing.to_radians();
    let theta23 = b_bearing.to_radians();
    let d_phi = phi2 - phi1;
    let d_lambda = lambda2 - lambda1;

    // angular distance between the start points
    let delta12 = 2.0
        * ((d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2))
            .sqrt()
            .min(1.0)
            .asin();
    if delta12.abs() < EPSILON {
        let same_ray = (normalize_bearing(a_bearing) - normalize_bearing(b_bearing)).abs() < 1e-9;
        return if same_ray {
            None
        } else {
            Some(GeoPoint::new(a_start.latitude, a_start.longitude))
        };
    }

    let cos_theta_a =
        (phi2.sin() - phi1.sin() * delta12.cos()) / (delta12.sin() * phi1.cos());
    let cos_theta_b =
        (phi1.sin() - phi2.sin() * delta12.cos()) / (delta12.sin() * phi2.cos());
    let theta_a = cos_theta_a.clamp(-1.0, 1.0).acos();
    let theta_b = cos_theta_b.clamp(-1.0, 1.0).acos();

    let (theta12, theta21) = if d_lambda.sin() > 0.0 {
        (theta_a, 2.0 * PI - theta_b)
    } else {
        (2.0 * PI - theta_a, theta_b)
    };

    let wrap_pi = |x: f64| (x + PI).rem_euclid(2.0 * PI) - PI;
    let alpha1 = wrap_pi(theta13 - theta12);
    let alpha2 = wrap_pi(theta21 - theta23);

    if alpha1.sin().abs() < EPSILON && alpha2.sin().abs() < EPSILON {
        return None;
    }
    if alpha1.sin() * alpha2.sin() < 0.0 {
        return None;
    }

    let cos_alpha3 =
        -alpha1.cos() * alpha2.cos() + alpha1.sin() * alpha2.sin() * delta12.cos();
    let delta13 = (delta12.sin() * alpha1.sin() * alpha2.sin())
        .atan2(alpha2.cos() + alpha1.cos() * cos_alpha3);
    // rays that only meet on the far side of the globe
    if delta13 > PI / 2.0 {
        return None;
    }
    let phi3 = (phi1.sin() * delta13.cos() + phi1.cos() * delta13.sin() * theta13.cos())
        .clamp(-1.0, 1.0)
        .asin();
    let d_lambda13 = (theta13.sin() * delta13.sin() * phi1.cos())
        .atan2(delta13.cos() - phi1.sin() * phi3.sin());
    let lambda3 = lambda1 + d_lambda13;

    Some(GeoPoint::new(
        phi3.to_degrees(),
        normalize_longitude(lambda3.to_degrees()),
    ))
}

/// Bearing of grid north relative to true north along a line of bearing.
///
/// The start point's UTM grid column is walked north by the length of the
/// line and the bearing to the resulting point is taken. The result is in
/// degrees, (-180, 180]. `NaN` for a zero-length line or outside the UTM
/// latitude band.
pub fn compute_grid_convergence(start: &GeoPoint, end: &GeoPoint) -> f64 {
    let d = distance(start, end);
    if !d.is_finite() || d <= 0.0 {
        return f64::NAN;
    }
    if !(utm::MIN_LATITUDE..=utm::MAX_LATITUDE).contains(&start.latitude) {
        return f64::NAN;
    }
    let zone = utm::zone(start.latitude, start.longitude);
    let (x, y) = utm::forward(start.latitude, start.longitude, zone);
    let (lat, lon) = utm::inverse(x, y + d, zone);
    let b = bearing(start, &GeoPoint::new(lat, normalize_longitude(lon)));
    if b > 180.0 {
        b - 360.0
    } else {
        b
    }
}

/// [`compute_grid_convergence`] for a line given by start, angle and length.
pub fn compute_grid_convergence_along(start: &GeoPoint, angle: f64, distance: f64) -> f64 {
    let end = point_at_distance(start, angle, distance);
    compute_grid_convergence(start, &end)
}

/// Approximate meters per degree of longitude at `latitude`.
pub fn approximate_meters_per_degree_longitude(latitude: f64) -> f64 {
    let rlat = latitude.to_radians();
    111412.84 * rlat.cos() - 93.5 * (3.0 * rlat).cos()
}

/// Approximate meters per degree of latitude at `latitude`.
pub fn approximate_meters_per_degree_latitude(latitude: f64) -> f64 {
    let rlat = latitude.to_radians();
    111132.92 - 559.82 * (2.0 * rlat).cos() + 1.175 * (4.0 * rlat).cos()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Hemisphere {
    East,
    West,
}

fn hemisphere(longitude: f64) -> Hemisphere {
    if longitude < 0.0 {
        Hemisphere::West
    } else {
        Hemisphere::East
    }
}

fn wrap_to_hemisphere(longitude: f64, to: Hemisphere) -> f64 {
    match (hemisphere(longitude), to) {
        (Hemisphere::West, Hemisphere::East) => longitude + 360.0,
        (Hemisphere::East, Hemisphere::West) => longitude - 360.0,
        _ => longitude,
    }
}

/// True if the longitudes span the antimeridian. Sets spanning more than 180°
/// are assumed to wrap rather than cover most of the globe.
fn crosses_antimeridian(points: &[GeoPoint]) -> bool {
    if points.is_empty() {
        return false;
    }
    let (min, max) = points.iter().fold((f64::MAX, -f64::MAX), |(lo, hi), p| {
        (lo.min(p.longitude), hi.max(p.longitude))
    });
    if min < -180.0 || max > 180.0 {
        return true;
    }
    max - min > 180.0
}

/// Arithmetic mean of a set of points.
///
/// With `wrap180`, a set crossing the antimeridian is first renumbered into the
/// first point's hemisphere, and the mean longitude is wrapped back into
/// [-180, 180). An empty set averages to 0°N 0°E.
pub fn compute_average(points: &[GeoPoint], wrap180: bool) -> GeoPoint {
    if points.is_empty() {
        return GeoPoint::ZERO;
    }
    let wrap = wrap180 && crosses_antimeridian(points);
    let scale = 1.0 / points.len() as f64;
    let target = hemisphere(points[0].longitude);

    let (lat, lon) = points.iter().fold((0.0, 0.0), |(lat, lon), p| {
        let lng = if wrap {
            wrap_to_hemisphere(p.longitude, target)
        } else {
            p.longitude
        };
        (lat + p.latitude * scale, lon + lng * scale)
    });

    let lon = if wrap { normalize_longitude(lon) } else { lon };
    GeoPoint::new(lat, lon)
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Geodetic operations that depend on external data sources.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use elevgrid::geodesy::{FixedDeclination, GeoCalculator, GeoPoint};
///
/// let calc = GeoCalculator::new()
///     .with_geoid(Arc::new(|_lat: f64, _lon: f64| 32.5))
///     .with_magnetic_model(Arc::new(FixedDeclination(-7.0)));
///
/// assert_eq!(calc.hae_to_msl(35.0, 139.0, 100.0), 67.5);
/// let p = GeoPoint::new(35.0, 139.0);
/// assert_eq!(calc.convert_from_magnetic_to_true_at(&p, 3.0, 0), 356.0);
/// ```
#[derive(Clone, Default)]
pub struct GeoCalculator {
    terrain: Option<Arc<dyn HeightSource>>,
    geoid: Option<Arc<dyn HeightSource>>,
    magnetic: Option<Arc<dyn MagneticModel>>,
}

impl GeoCalculator {
    /// A calculator without collaborators; dependent results are `NaN`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Terrain elevation (HAE meters) used to resolve AGL altitudes.
    pub fn with_terrain(mut self, terrain: Arc<dyn HeightSource>) -> Self {
        self.terrain = Some(terrain);
        self
    }

    /// Geoid separation (meters of geoid above the ellipsoid).
    pub fn with_geoid(mut self, geoid: Arc<dyn HeightSource>) -> Self {
        self.geoid = Some(geoid);
        self
    }

    pub fn with_magnetic_model(mut self, model: Arc<dyn MagneticModel>) -> Self {
        self.magnetic = Some(model);
        self
    }

    /// Altitude of `p` above the ellipsoid. Missing altitude counts as 0 and
    /// AGL altitudes add the terrain height when it is known.
    pub fn to_hae(&self, p: &GeoPoint) -> f64 {
        let alt = if p.has_altitude() { p.altitude } else { 0.0 };
        match (p.altitude_reference, &self.terrain) {
            (AltitudeReference::Agl, Some(terrain)) => {
                let ground = terrain.height(p.latitude, p.longitude);
                if ground.is_nan() {
                    alt
                } else {
                    alt + ground
                }
            }
            _ => alt,
        }
    }

    /// Straight-line (chord) distance in meters between the HAE positions.
    pub fn slant_distance(&self, a: &GeoPoint, b: &GeoPoint) -> f64 {
        if !(a.is_valid() && b.is_valid()) {
            return f64::NAN;
        }
        let pa = ellipsoid::to_ecef(a.latitude, a.longitude, self.to_hae(a));
        let pb = ellipsoid::to_ecef(b.latitude, b.longitude, self.to_hae(b));
        pa.iter()
            .zip(pb.iter())
            .map(|(x, y)| (x - y) * (x - y))
            .sum::<f64>()
            .sqrt()
    }

    /// Inclination in degrees from `a` up (positive) or down to `b`.
    pub fn slant_angle(&self, a: &GeoPoint, b: &GeoPoint) -> f64 {
        let d = distance(a, b);
        if d.is_nan() {
            return f64::NAN;
        }
        (self.to_hae(b) - self.to_hae(a)).atan2(d).to_degrees()
    }

    /// Geoid height above the ellipsoid, `NaN` when unknown.
    pub fn geoid_height(&self, latitude: f64, longitude: f64) -> f64 {
        self.geoid
            .as_ref()
            .map(|g| g.height(latitude, longitude))
            .unwrap_or(f64::NAN)
    }

    /// Convert an HAE altitude to MSL. Unknown geoid gives `NaN`.
    pub fn hae_to_msl(&self, latitude: f64, longitude: f64, hae: f64) -> f64 {
        let offset = self.geoid_height(latitude, longitude);
        if offset.is_nan() {
            tracing::error!(latitude, longitude, hae, "geoid height unavailable");
            return UNKNOWN_ALTITUDE;
        }
        hae - offset
    }

    /// Convert an MSL altitude to HAE. Unknown geoid gives `NaN`.
    pub fn msl_to_hae(&self, latitude: f64, longitude: f64, msl: f64) -> f64 {
        let offset = self.geoid_height(latitude, longitude);
        if offset.is_nan() {
            tracing::error!(latitude, longitude, msl, "geoid height unavailable");
            return UNKNOWN_ALTITUDE;
        }
        msl + offset
    }

    /// Magnetic declination at `point` now.
    pub fn magnetic_declination(&self, point: &GeoPoint) -> f64 {
        self.magnetic_declination_at(point, now_millis())
    }

    /// Magnetic declination at `point` at a time in epoch milliseconds.
    /// True bearing = magnetic bearing + declination.
    pub fn magnetic_declination_at(&self, point: &GeoPoint, epoch_millis: i64) -> f64 {
        match &self.magnetic {
            Some(model) => model.declination(point.latitude, point.longitude, 0.0, epoch_millis),
            None => f64::NAN,
        }
    }

    pub fn convert_from_magnetic_to_true(&self, point: &GeoPoint, angle: f64) -> f64 {
        self.convert_from_magnetic_to_true_at(point, angle, now_millis())
    }

    /// Magnetic bearing to true bearing, in [0, 360).
    pub fn convert_from_magnetic_to_true_at(
        &self,
        point: &GeoPoint,
        angle: f64,
        epoch_millis: i64,
    ) -> f64 {
        normalize_bearing(angle + self.magnetic_declination_at(point, epoch_millis))
    }

    pub fn convert_from_true_to_magnetic(&self, point: &GeoPoint, angle: f64) -> f64 {
        self.convert_from_true_to_magnetic_at(point, angle, now_millis())
    }

    /// True bearing to magnetic bearing, in [0, 360).
    pub fn convert_from_true_to_magnetic_at(
        &self,
        point: &GeoPoint,
        angle: f64,
        epoch_millis: i64,
    ) -> f64 {
        normalize_bearing(angle - self.magnetic_declination_at(point, epoch_millis))
    }
}
