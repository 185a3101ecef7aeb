#![allow(dead_code)]

use chrono::{Duration, TimeZone, Utc};
use ndarray::Array2;
use radgrid::{GridGeometry, ProjectionKind, RadarSite, Ray, Volume, MISSING_VALUE};
use std::sync::Arc;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn site() -> RadarSite {
    RadarSite::new(40.0, -105.0, 0.0)
}

/// Ray with one row of values per field
pub fn ray(azimuth: f64, elevation: f64, start_km: f64, spacing_km: f64, fields: Vec<Vec<f32>>) -> Ray {
    let n_fields = fields.len();
    let n_gates = fields.first().map(|f| f.len()).unwrap_or(0);
    let flat: Vec<f32> = fields.into_iter().flatten().collect();
    let data = Array2::from_shape_vec((n_fields, n_gates), flat).expect("Failed to shape ray data");
    let time = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap() + Duration::milliseconds((azimuth * 10.0) as i64);
    Ray::new(azimuth, elevation, start_km, spacing_km, time, data)
}

pub fn volume(rays: Vec<Ray>, fields: &[&str]) -> Arc<Volume> {
    let names = fields.iter().map(|s| s.to_string()).collect();
    Arc::new(Volume::new(site(), names, rays).expect("Failed to build volume"))
}

/// Flat grid centred on the radar
pub fn flat_grid(n: usize, spacing_km: f64, z_levels: Vec<f64>) -> GridGeometry {
    let nz = z_levels.len();
    let s = site();
    GridGeometry::centered(ProjectionKind::Flat, (n, n, nz), (spacing_km, spacing_km), z_levels)
        .with_origin(s.latitude, s.longitude)
}

/// Multi-sweep volume with a smooth continuous field, a folded velocity
/// field, a discrete class field and a few missing gates
pub fn synthetic_volume(elevations: &[f64], n_azimuths: usize, n_gates: usize) -> Arc<Volume> {
    let spacing = 0.25;
    let mut rays = Vec::new();
    for &el in elevations {
        for i in 0..n_azimuths {
            let az = i as f64 * 360.0 / n_azimuths as f64;
            let dbz: Vec<f32> = (0..n_gates)
                .map(|g| {
                    if (g + i) % 17 == 0 {
                        MISSING_VALUE
                    } else {
                        (20.0 + 10.0 * (az.to_radians() * 3.0).sin() + 0.1 * g as f64 + el) as f32
                    }
                })
                .collect();
            let vel: Vec<f32> = (0..n_gates)
                .map(|g| (((az / 10.0 + g as f64 * 0.3) % 30.0) - 15.0) as f32)
                .collect();
            let pid: Vec<f32> = (0..n_gates).map(|g| ((g / 10 + i / 30) % 4) as f32).collect();
            rays.push(ray(az, el, spacing, spacing, vec![dbz, vel, pid]));
        }
    }
    volume(rays, &["DBZ", "VEL", "PID"])
}

/// Cell centres of a flat grid as (x, y) km
pub fn cell_xy(geometry: &GridGeometry, ix: usize, iy: usize) -> (f64, f64) {
    (geometry.x(ix), geometry.y(iy))
}
