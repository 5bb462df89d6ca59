//! WGS-84 ellipsoid solutions (Vincenty inverse and direct) and ECEF conversion.

/// WGS-84 semi-major axis in meters.
pub const WGS84_A: f64 = 6378137.0;
/// WGS-84 flattening.
pub const WGS84_F: f64 = 1.0 / 298.257223563;
/// WGS-84 semi-minor axis in meters.
pub const WGS84_B: f64 = WGS84_A * (1.0 - WGS84_F);
/// First eccentricity squared.
pub const WGS84_E2: f64 = WGS84_F * (2.0 - WGS84_F);

const MAX_ITERATIONS: usize = 200;
const CONVERGENCE: f64 = 1e-12;

/// Solution of the inverse geodetic problem.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Inverse {
    /// Surface distance in meters.
    pub distance: f64,
    /// Initial azimuth in degrees, not normalized.
    pub initial_bearing: f64,
}

/// Vincenty's inverse formula. Returns `None` when the iteration does not
/// converge, which happens for nearly antipodal points.
pub(crate) fn inverse(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> Option<Inverse> {
    let l = (lon2 - lon1).to_radians();
    let u1 = ((1.0 - WGS84_F) * lat1.to_radians().tan()).atan();
    let u2 = ((1.0 - WGS84_F) * lat2.to_radians().tan()).atan();
    let (sin_u1, cos_u1) = u1.sin_cos();
    let (sin_u2, cos_u2) = u2.sin_cos();

    let mut lambda = l;
    for _ in 0..MAX_ITERATIONS {
        let (sin_lambda, cos_lambda) = lambda.sin_cos();
        let sin_sigma = ((cos_u2 * sin_lambda).powi(2)
            + (cos_u1 * sin_u2 - sin_u1 * cos_u2 * cos_lambda).powi(2))
        .sqrt();
        if sin_sigma == 0.0 {
            // coincident points
            return Some(Inverse {
                distance: 0.0,
                initial_bearing: 0.0,
            });
        }
        let cos_sigma = sin_u1 * sin_u2 + cos_u1 * cos_u2 * cos_lambda;
        let sigma = sin_sigma.atan2(cos_sigma);
        let sin_alpha = cos_u1 * cos_u2 * sin_lambda / sin_sigma;
        let cos_sq_alpha = 1.0 - sin_alpha * sin_alpha;
        // equatorial line: cos_sq_alpha = 0
        let cos_2sigma_m = if cos_sq_alpha != 0.0 {
            cos_sigma - 2.0 * sin_u1 * sin_u2 / cos_sq_alpha
        } else {
            0.0
        };
        let c = WGS84_F / 16.0 * cos_sq_alpha * (4.0 + WGS84_F * (4.0 - 3.0 * cos_sq_alpha));
        let lambda_prev = lambda;
        lambda = l
            + (1.0 - c)
                * WGS84_F
                * sin_alpha
                * (sigma
                    + c * sin_sigma
                        * (cos_2sigma_m + c * cos_sigma * (-1.0 + 2.0 * cos_2sigma_m * cos_2sigma_m)));

        if (lambda - lambda_prev).abs() < CONVERGENCE {
            let u_sq = cos_sq_alpha * (WGS84_A * WGS84_A - WGS84_B * WGS84_B) / (WGS84_B * WGS84_B);
            let (a, b) = series_coefficients(u_sq);
            let delta_sigma = delta_sigma(b, sin_sigma, cos_sigma, cos_2sigma_m);
            let distance = WGS84_B * a * (sigma - delta_sigma);

            let (sin_lambda, cos_lambda) = lambda.sin_cos();
            let alpha1 = (cos_u2 * sin_lambda)
                .atan2(cos_u1 * sin_u2 - sin_u1 * cos_u2 * cos_lambda);
            return Some(Inverse {
                distance,
                initial_bearing: alpha1.to_degrees(),
            });
        }
    }
    None
}

/// Vincenty's direct formula. Returns `(latitude, longitude)` in degrees with
/// the longitude normalized to [-180, 180).
pub(crate) fn direct(lat1: f64, lon1: f64, azimuth: f64, distance: f64) -> (f64, f64) {
    let alpha1 = azimuth.to_radians();
    let (sin_alpha1, cos_alpha1) = alpha1.sin_cos();

    let tan_u1 = (1.0 - WGS84_F) * lat1.to_radians().tan();
    let cos_u1 = 1.0 / (1.0 + tan_u1 * tan_u1).sqrt();
    let sin_u1 = tan_u1 * cos_u1;
    let sigma1 = tan_u1.atan2(cos_alpha1);
    let sin_alpha = cos_u1 * sin_alpha1;
    let cos_sq_alpha = 1.0 - sin_alpha * sin_alpha;
    let u_sq = cos_sq_alpha * (WGS84_A * WGS84_A - WGS84_B * WGS84_B) / (WGS84_B * WGS84_B);
    let (a, b) = series_coefficients(u_sq);

    let sigma0 = distance / (WGS84_B * a);
    let mut sigma = sigma0;
    for _ in 0..MAX_ITERATIONS {
        let cos_2sigma_m = (2.0 * sigma1 + sigma).cos();
        let (sin_sigma, cos_sigma) = sigma.sin_cos();
        let sigma_prev = sigma;
        sigma = sigma0 + delta_sigma(b, sin_sigma, cos_sigma, cos_2sigma_m);
        if (sigma - sigma_prev).abs() < CONVERGENCE {
            break;
        }
    }
    let cos_2sigma_m = (2.0 * sigma1 + sigma).cos();
    let (sin_sigma, cos_sigma) = sigma.sin_cos();

    let tmp = sin_u1 * sin_sigma - cos_u1 * cos_sigma * cos_alpha1;
    let lat2 = (sin_u1 * cos_sigma + cos_u1 * sin_sigma * cos_alpha1)
        .atan2((1.0 - WGS84_F) * (sin_alpha * sin_alpha + tmp * tmp).sqrt());
    let lambda = (sin_sigma * sin_alpha1).atan2(cos_u1 * cos_sigma - sin_u1 * sin_sigma * cos_alpha1);
    let c = WGS84_F / 16.0 * cos_sq_alpha * (4.0 + WGS84_F * (4.0 - 3.0 * cos_sq_alpha));
    let l = lambda
        - (1.0 - c)
            * WGS84_F
            * sin_alpha
            * (sigma
                + c * sin_sigma
                    * (cos_2sigma_m + c * cos_sigma * (-1.0 + 2.0 * cos_2sigma_m * cos_2sigma_m)));

    let lon2 = normalize_longitude(lon1 + l.to_degrees());
    (lat2.to_degrees(), lon2)
}

fn series_coefficients(u_sq: f64) -> (f64, f64) {
    let a = 1.0 + u_sq / 16384.0 * (4096.0 + u_sq * (-768.0 + u_sq * (320.0 - 175.0 * u_sq)));
    let b = u_sq / 1024.0 * (256.0 + u_sq * (-128.0 + u_sq * (74.0 - 47.0 * u_sq)));
    (a, b)
}

fn delta_sigma(b: f64, sin_sigma: f64, cos_sigma: f64, cos_2sigma_m: f64) -> f64 {
    b * sin_sigma
        * (cos_2sigma_m
            + b / 4.0
                * (cos_sigma * (-1.0 + 2.0 * cos_2sigma_m * cos_2sigma_m)
                    - b / 6.0
                        * cos_2sigma_m
                        * (-3.0 + 4.0 * sin_sigma * sin_sigma)
                        * (-3.0 + 4.0 * cos_2sigma_m * cos_2sigma_m)))
}

/// Wrap a longitude into [-180, 180).
pub(crate) fn normalize_longitude(lon: f64) -> f64 {
    let wrapped = (lon + 180.0).rem_euclid(360.0) - 180.0;
    if wrapped >= 180.0 {
        wrapped - 360.0
    } else {
        wrapped
    }
}

/// Earth-centered, earth-fixed coordinates for a point at `hae` meters.
pub(crate) fn to_ecef(lat: f64, lon: f64, hae: f64) -> [f64; 3] {
    let (sin_lat, cos_lat) = lat.to_radians().sin_cos();
    let (sin_lon, cos_lon) = lon.to_radians().sin_cos();
    let n = WGS84_A / (1.0 - WGS84_E2 * sin_lat * sin_lat).sqrt();
    [
        (n + hae) * cos_lat * cos_lon,
        (n + hae) * cos_lat * sin_lon,
        (n * (1.0 - WGS84_E2) + hae) * sin_lat,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_inverse_equator_degree() {
        let inv = inverse(0.0, 0.0, 0.0, 1.0).unwrap();
        assert_relative_eq!(inv.distance, 111319.49, epsilon = 0.1);
        assert_relative_eq!(inv.initial_bearing, 90.0, epsilon = 1e-9);
    }

    #[test]
    fn test_inverse_known_line() {
        // Flinders Peak to Buninyong, the classic Vincenty test line
        let inv = inverse(-37.95103342, 144.42486789, -37.65282114, 143.92649554).unwrap();
        assert_relative_eq!(inv.distance, 54972.271, epsilon = 0.01);
        assert_relative_eq!(inv.initial_bearing + 360.0, 306.86816, epsilon = 1e-4);
    }

    #[test]
    fn test_direct_inverts_inverse() {
        let (lat, lon) = direct(-37.95103342, 144.42486789, 306.86816, 54972.271);
        assert_relative_eq!(lat, -37.65282114, epsilon = 1e-6);
        assert_relative_eq!(lon, 143.92649554, epsilon = 1e-6);
    }

    #[test]
    fn test_antipodal_does_not_converge() {
        assert!(inverse(0.0, 0.0, 0.5, 179.7).is_none());
    }

    #[test]
    fn test_normalize_longitude() {
        assert_eq!(normalize_longitude(180.0), -180.0);
        assert_eq!(normalize_longitude(190.0), -170.0);
        assert_eq!(normalize_longitude(-190.0), 170.0);
        assert_eq!(normalize_longitude(45.0), 45.0);
    }

    #[test]
    fn test_ecef_equator() {
        let [x, y, z] = to_ecef(0.0, 0.0, 0.0);
        assert_relative_eq!(x, WGS84_A);
        assert_relative_eq!(y, 0.0);
        assert_relative_eq!(z, 0.0);
    }
}
