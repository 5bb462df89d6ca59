use anyhow::Result;
use clap::Subcommand;
use elevgrid::geodesy::{
    bearing, compute_grid_convergence, distance, line_of_bearing_intersect, midpoint,
    point_at_distance,
};
use elevgrid::GeoPoint;
use serde::Serialize;

#[derive(Subcommand)]
pub enum GeoCommand {
    /// Ellipsoidal distance and bearings between two points
    Distance {
        #[arg(allow_negative_numbers = true)]
        lat1: f64,
        #[arg(allow_negative_numbers = true)]
        lon1: f64,
        #[arg(allow_negative_numbers = true)]
        lat2: f64,
        #[arg(allow_negative_numbers = true)]
        lon2: f64,
    },

    /// Point reached from a start point along a bearing
    Destination {
        #[arg(allow_negative_numbers = true)]
        lat: f64,
        #[arg(allow_negative_numbers = true)]
        lon: f64,
        /// Bearing in degrees from true north
        bearing: f64,
        /// Distance in meters
        distance: f64,
    },

    /// Intersection of two lines of bearing
    Intersect {
        #[arg(allow_negative_numbers = true)]
        lat1: f64,
        #[arg(allow_negative_numbers = true)]
        lon1: f64,
        bearing1: f64,
        #[arg(allow_negative_numbers = true)]
        lat2: f64,
        #[arg(allow_negative_numbers = true)]
        lon2: f64,
        bearing2: f64,
    },
}

#[derive(Serialize)]
struct DistanceResponse {
    distance_m: f64,
    initial_bearing: f64,
    final_bearing: f64,
    midpoint: [f64; 2],
    grid_convergence: Option<f64>,
}

#[derive(Serialize)]
struct PointResponse {
    lat: Option<f64>,
    lon: Option<f64>,
}

fn finite(v: f64) -> Option<f64> {
    v.is_finite().then_some(v)
}

pub fn run(op: &GeoCommand, json: bool) -> Result<()> {
    match *op {
        GeoCommand::Distance {
            lat1,
            lon1,
            lat2,
            lon2,
        } => {
            let a = GeoPoint::new(lat1, lon1);
            let b = GeoPoint::new(lat2, lon2);
            let mid = midpoint(&a, &b);
            // final bearing is the reverse of the bearing back from b
            let back = bearing(&b, &a);
            let response = DistanceResponse {
                distance_m: distance(&a, &b),
                initial_bearing: bearing(&a, &b),
                final_bearing: (back + 180.0) % 360.0,
                midpoint: [mid.latitude, mid.longitude],
                grid_convergence: finite(compute_grid_convergence(&a, &b)),
            };
            if json {
                println!("{}", serde_json::to_string(&response)?);
            } else {
                println!("Distance: {:.3} m", response.distance_m);
                println!("Initial bearing: {:.6}°", response.initial_bearing);
                println!("Final bearing: {:.6}°", response.final_bearing);
                println!(
                    "Midpoint: {:.8}, {:.8}",
                    response.midpoint[0], response.midpoint[1]
                );
                if let Some(gc) = response.grid_convergence {
                    println!("Grid convergence: {:.6}°", gc);
                }
            }
        }
        GeoCommand::Destination {
            lat,
            lon,
            bearing,
            distance,
        } => {
            let p = point_at_distance(&GeoPoint::new(lat, lon), bearing, distance);
            print_point(Some(p), json)?;
        }
        GeoCommand::Intersect {
            lat1,
            lon1,
            bearing1,
            lat2,
            lon2,
            bearing2,
        } => {
            let p = line_of_bearing_intersect(
                &GeoPoint::new(lat1, lon1),
                bearing1,
                &GeoPoint::new(lat2, lon2),
                bearing2,
            );
            print_point(p, json)?;
        }
    }
    Ok(())
}

fn print_point(p: Option<GeoPoint>, json: bool) -> Result<()> {
    let p = p.filter(|p| p.latitude.is_finite() && p.longitude.is_finite());
    if json {
        let response = PointResponse {
            lat: p.map(|p| p.latitude),
            lon: p.map(|p| p.longitude),
        };
        println!("{}", serde_json::to_string(&response)?);
    } else {
        match p {
            Some(p) => println!("{:.8}, {:.8}", p.latitude, p.longitude),
            None => println!("none"),
        }
    }
    Ok(())
}
