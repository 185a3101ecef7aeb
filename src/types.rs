use chrono::{DateTime, Utc};
use ndarray::{Array2, Array3, ArrayView1};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Missing/bad data sentinel written to output cells with no valid contribution
pub const MISSING_VALUE: f32 = -9999.0;

/// Radar (or sensor) location
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RadarSite {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude_km: f64,
}

impl RadarSite {
    pub fn new(latitude: f64, longitude: f64, altitude_km: f64) -> Self {
        Self { latitude, longitude, altitude_km }
    }
}

/// A single radar beam: fixed pointing angles and per-field gate samples
#[derive(Debug, Clone)]
pub struct Ray {
    pub azimuth_deg: f64,
    pub elevation_deg: f64,
    pub start_range_km: f64,
    pub gate_spacing_km: f64,
    pub time: DateTime<Utc>,
    /// Gate values, shape (n_fields, n_gates)
    data: Array2<f32>,
}

impl Ray {
    pub fn new(
        azimuth_deg: f64,
        elevation_deg: f64,
        start_range_km: f64,
        gate_spacing_km: f64,
        time: DateTime<Utc>,
        data: Array2<f32>,
    ) -> Self {
        Self {
            azimuth_deg: azimuth_deg.rem_euclid(360.0),
            elevation_deg,
            start_range_km,
            gate_spacing_km,
            time,
            data,
        }
    }

    pub fn n_gates(&self) -> usize {
        self.data.ncols()
    }

    pub fn n_fields(&self) -> usize {
        self.data.nrows()
    }

    pub fn data(&self) -> &Array2<f32> {
        &self.data
    }

    pub fn field(&self, field: usize) -> ArrayView1<'_, f32> {
        self.data.row(field)
    }

    pub fn gate_value(&self, field: usize, gate: usize) -> f32 {
        self.data[[field, gate]]
    }

    /// Slant range to the centre of a gate
    pub fn gate_range_km(&self, gate: usize) -> f64 {
        self.start_range_km + gate as f64 * self.gate_spacing_km
    }

    /// Slant range to the centre of the last gate
    pub fn max_range_km(&self) -> f64 {
        match self.n_gates() {
            0 => self.start_range_km,
            n => self.gate_range_km(n - 1),
        }
    }
}

/// One radar scan: ordered rays sharing a field list
#[derive(Debug, Clone)]
pub struct Volume {
    pub site: RadarSite,
    pub beam_width_deg_h: f64,
    pub beam_width_deg_v: f64,
    pub missing_value: f32,
    field_names: Vec<String>,
    rays: Vec<Ray>,
}

impl Volume {
    /// Create a volume, checking every ray against the field list
    pub fn new(site: RadarSite, field_names: Vec<String>, rays: Vec<Ray>) -> GridResult<Self> {
        if rays.is_empty() {
            return Err(GridError::InvalidVolume("volume contains no rays".to_string()));
        }
        if field_names.is_empty() {
            return Err(GridError::InvalidVolume("volume contains no fields".to_string()));
        }

        for (i, ray) in rays.iter().enumerate() {
            if ray.n_fields() != field_names.len() {
                return Err(GridError::InvalidVolume(format!(
                    "ray {} has {} fields, expected {}",
                    i,
                    ray.n_fields(),
                    field_names.len()
                )));
            }
            if !(ray.gate_spacing_km.is_finite() && ray.gate_spacing_km > 0.0) {
                return Err(GridError::InvalidVolume(format!(
                    "ray {} has invalid gate spacing {}",
                    i, ray.gate_spacing_km
                )));
            }
            if !(ray.azimuth_deg.is_finite() && ray.elevation_deg.is_finite()) {
                return Err(GridError::InvalidVolume(format!(
                    "ray {} has non-finite pointing angles",
                    i
                )));
            }
        }

        Ok(Self {
            site,
            beam_width_deg_h: 1.0,
            beam_width_deg_v: 1.0,
            missing_value: MISSING_VALUE,
            field_names,
            rays,
        })
    }

    pub fn with_beam_width(mut self, h_deg: f64, v_deg: f64) -> Self {
        self.beam_width_deg_h = h_deg;
        self.beam_width_deg_v = v_deg;
        self
    }

    pub fn with_missing_value(mut self, missing_value: f32) -> Self {
        self.missing_value = missing_value;
        self
    }

    pub fn rays(&self) -> &[Ray] {
        &self.rays
    }

    pub fn n_rays(&self) -> usize {
        self.rays.len()
    }

    pub fn field_names(&self) -> &[String] {
        &self.field_names
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.field_names.iter().position(|n| n == name)
    }

    /// True if a gate value carries data
    pub fn is_valid(&self, value: f32) -> bool {
        value.is_finite() && value != self.missing_value
    }

    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.rays.iter().map(|r| r.time).min()
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.rays.iter().map(|r| r.time).max()
    }

    /// Fingerprint of everything the grid mapping depends on: site, ray
    /// pointing angles and range geometry. Field values are excluded.
    pub fn geometry_key(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.site.latitude.to_bits().hash(&mut hasher);
        self.site.longitude.to_bits().hash(&mut hasher);
        self.site.altitude_km.to_bits().hash(&mut hasher);
        self.beam_width_deg_h.to_bits().hash(&mut hasher);
        self.beam_width_deg_v.to_bits().hash(&mut hasher);
        self.rays.len().hash(&mut hasher);
        for ray in &self.rays {
            ray.azimuth_deg.to_bits().hash(&mut hasher);
            ray.elevation_deg.to_bits().hash(&mut hasher);
            ray.start_range_km.to_bits().hash(&mut hasher);
            ray.gate_spacing_km.to_bits().hash(&mut hasher);
            ray.n_gates().hash(&mut hasher);
        }
        hasher.finish()
    }
}

/// Output grid projection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProjectionKind {
    /// x/y in km from the grid origin, z in km MSL
    Flat,
    /// x = longitude, y = latitude (deg), z in km MSL
    LatLon,
    /// x/y in km relative to the radar, z index selects the sweep
    PpiNative,
    /// x = range (km), y = azimuth (deg), z index selects the sweep
    PolarNative,
    /// x = longitude, y = latitude (deg), z in km MSL, true-radius earth about the sensor
    Satellite,
}

impl std::fmt::Display for ProjectionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProjectionKind::Flat => write!(f, "FLAT"),
            ProjectionKind::LatLon => write!(f, "LATLON"),
            ProjectionKind::PpiNative => write!(f, "PPI"),
            ProjectionKind::PolarNative => write!(f, "POLAR"),
            ProjectionKind::Satellite => write!(f, "SATELLITE"),
        }
    }
}

/// Output grid definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridGeometry {
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,
    pub min_x: f64,
    pub min_y: f64,
    pub dx: f64,
    pub dy: f64,
    pub min_z: f64,
    pub dz: f64,
    /// Explicit z levels, overriding min_z/dz when present
    pub z_levels: Option<Vec<f64>>,
    pub projection: ProjectionKind,
    pub origin_lat: f64,
    pub origin_lon: f64,
}

impl GridGeometry {
    pub fn new(
        projection: ProjectionKind,
        (nx, ny, nz): (usize, usize, usize),
        (min_x, min_y, min_z): (f64, f64, f64),
        (dx, dy, dz): (f64, f64, f64),
    ) -> Self {
        Self {
            nx,
            ny,
            nz,
            min_x,
            min_y,
            dx,
            dy,
            min_z,
            dz,
            z_levels: None,
            projection,
            origin_lat: 0.0,
            origin_lon: 0.0,
        }
    }

    /// Grid of nx by ny cells centred on the origin
    pub fn centered(
        projection: ProjectionKind,
        (nx, ny, nz): (usize, usize, usize),
        (dx, dy): (f64, f64),
        z_levels: Vec<f64>,
    ) -> Self {
        let min_x = -((nx.saturating_sub(1)) as f64) * dx / 2.0;
        let min_y = -((ny.saturating_sub(1)) as f64) * dy / 2.0;
        let mut geometry = Self::new(projection, (nx, ny, nz), (min_x, min_y, 0.0), (dx, dy, 1.0));
        geometry.z_levels = Some(z_levels);
        geometry
    }

    pub fn with_origin(mut self, lat: f64, lon: f64) -> Self {
        self.origin_lat = lat;
        self.origin_lon = lon;
        self
    }

    pub fn with_z_levels(mut self, z_levels: Vec<f64>) -> Self {
        self.z_levels = Some(z_levels);
        self
    }

    pub fn n_points_plane(&self) -> usize {
        self.nx * self.ny
    }

    pub fn n_points(&self) -> usize {
        self.nx * self.ny * self.nz
    }

    pub fn x(&self, ix: usize) -> f64 {
        self.min_x + ix as f64 * self.dx
    }

    pub fn y(&self, iy: usize) -> f64 {
        self.min_y + iy as f64 * self.dy
    }

    pub fn z(&self, iz: usize) -> f64 {
        match &self.z_levels {
            Some(levels) => levels[iz],
            None => self.min_z + iz as f64 * self.dz,
        }
    }

    /// Flat index in (z, y, x) order
    pub fn flat_index(&self, ix: usize, iy: usize, iz: usize) -> usize {
        (iz * self.ny + iy) * self.nx + ix
    }

    /// Check dimensions and projection parameters
    pub fn validate(&self) -> GridResult<()> {
        if self.nx == 0 || self.ny == 0 || self.nz == 0 {
            return Err(GridError::InvalidGeometry(format!(
                "grid dimensions must be positive, got {}x{}x{}",
                self.nx, self.ny, self.nz
            )));
        }

        for (name, value) in [("dx", self.dx), ("dy", self.dy)] {
            if !(value.is_finite() && value > 0.0) {
                return Err(GridError::InvalidGeometry(format!(
                    "{} must be positive and finite, got {}",
                    name, value
                )));
            }
        }

        if !(self.min_x.is_finite() && self.min_y.is_finite() && self.min_z.is_finite()) {
            return Err(GridError::InvalidGeometry("grid minima must be finite".to_string()));
        }

        match &self.z_levels {
            Some(levels) => {
                if levels.len() != self.nz {
                    return Err(GridError::InvalidGeometry(format!(
                        "{} z levels given for nz = {}",
                        levels.len(),
                        self.nz
                    )));
                }
                if levels.iter().any(|z| !z.is_finite()) {
                    return Err(GridError::InvalidGeometry("z levels must be finite".to_string()));
                }
                if levels.windows(2).any(|w| w[1] <= w[0]) {
                    return Err(GridError::InvalidGeometry(
                        "z levels must be strictly increasing".to_string(),
                    ));
                }
            }
            None => {
                if self.nz > 1 && !(self.dz.is_finite() && self.dz > 0.0) {
                    return Err(GridError::InvalidGeometry(format!(
                        "dz must be positive for nz > 1, got {}",
                        self.dz
                    )));
                }
            }
        }

        if !(-90.0..=90.0).contains(&self.origin_lat) || !(-180.0..=360.0).contains(&self.origin_lon) {
            return Err(GridError::InvalidGeometry(format!(
                "origin ({}, {}) is not a valid lat/lon",
                self.origin_lat, self.origin_lon
            )));
        }

        match self.projection {
            ProjectionKind::LatLon | ProjectionKind::Satellite => {
                let max_lat = self.y(self.ny - 1);
                if self.min_y < -90.0 || max_lat > 90.0 {
                    return Err(GridError::InvalidGeometry(format!(
                        "latitude span [{}, {}] exceeds [-90, 90]",
                        self.min_y, max_lat
                    )));
                }
            }
            ProjectionKind::PolarNative => {
                if self.min_x < 0.0 {
                    return Err(GridError::InvalidGeometry(format!(
                        "polar grid start range must be >= 0, got {}",
                        self.min_x
                    )));
                }
            }
            ProjectionKind::Flat | ProjectionKind::PpiNative => {}
        }

        Ok(())
    }
}

/// One interpolated field on the output grid
#[derive(Debug, Clone)]
pub struct OutputGrid {
    pub name: String,
    /// Values shaped (nz, ny, nx)
    pub data: Array3<f32>,
    pub missing_value: f32,
}

impl OutputGrid {
    /// Wrap a flat (z, y, x) ordered vector
    pub fn from_flat(
        name: &str,
        geometry: &GridGeometry,
        values: Vec<f32>,
        missing_value: f32,
    ) -> GridResult<Self> {
        let data = Array3::from_shape_vec((geometry.nz, geometry.ny, geometry.nx), values)
            .map_err(|e| GridError::Internal(format!("Failed to reshape field {}: {}", name, e)))?;
        Ok(Self { name: name.to_string(), data, missing_value })
    }

    /// Cell value, or None for missing cells
    pub fn value(&self, ix: usize, iy: usize, iz: usize) -> Option<f32> {
        let v = self.data[[iz, iy, ix]];
        if v == self.missing_value {
            None
        } else {
            Some(v)
        }
    }

    pub fn valid_count(&self) -> usize {
        self.data.iter().filter(|&&v| v != self.missing_value).count()
    }

    pub fn coverage_percent(&self) -> f64 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.valid_count() as f64 / self.data.len() as f64 * 100.0
    }
}

/// All interpolated fields for one volume, handed to a writer
#[derive(Debug, Clone)]
pub struct GriddedVolume {
    pub geometry: GridGeometry,
    pub fields: Vec<OutputGrid>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl GriddedVolume {
    pub fn field(&self, name: &str) -> Option<&OutputGrid> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Error types for gridding
#[derive(Debug, thiserror::Error)]
pub enum GridError {
    #[error("Invalid grid geometry: {0}")]
    InvalidGeometry(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Strategy {strategy} does not support projection {projection}")]
    UnsupportedStrategy {
        strategy: String,
        projection: ProjectionKind,
    },

    #[error("Invalid volume: {0}")]
    InvalidVolume(String),

    #[error("Field not found in volume: {0}")]
    FieldNotFound(String),

    #[error("Thread lifecycle error: {0}")]
    ThreadLifecycle(String),

    #[error("Worker task failed: {0}")]
    WorkerFailed(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for gridding operations
pub type GridResult<T> = Result<T, GridError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn test_ray(n_fields: usize, n_gates: usize) -> Ray {
        Ray::new(-10.0, 0.5, 1.0, 0.25, Utc::now(), Array2::zeros((n_fields, n_gates)))
    }

    #[test]
    fn test_ray_ranges() {
        let ray = test_ray(1, 10);
        assert_eq!(ray.azimuth_deg, 350.0);
        assert_eq!(ray.gate_range_km(4), 2.0);
        assert_eq!(ray.max_range_km(), 3.25);
    }

    #[test]
    fn test_volume_rejects_field_mismatch() {
        let site = RadarSite::new(40.0, -105.0, 1.6);
        let result = Volume::new(site, vec!["DBZ".into(), "VEL".into()], vec![test_ray(1, 10)]);
        assert!(matches!(result, Err(GridError::InvalidVolume(_))));

        let empty = Volume::new(site, vec!["DBZ".into()], vec![]);
        assert!(matches!(empty, Err(GridError::InvalidVolume(_))));
    }

    #[test]
    fn test_geometry_key_ignores_values() {
        let site = RadarSite::new(40.0, -105.0, 1.6);
        let a = Volume::new(site, vec!["DBZ".into()], vec![test_ray(1, 10)]).unwrap();
        let mut ray = test_ray(1, 10);
        ray.data.fill(12.0);
        let b = Volume::new(site, vec!["DBZ".into()], vec![ray]).unwrap();
        assert_eq!(a.geometry_key(), b.geometry_key());

        let c = Volume::new(site, vec!["DBZ".into()], vec![test_ray(1, 11)]).unwrap();
        assert_ne!(a.geometry_key(), c.geometry_key());
    }

    #[test]
    fn test_geometry_validation() {
        let ok = GridGeometry::centered(ProjectionKind::Flat, (3, 3, 1), (1.0, 1.0), vec![0.0]);
        assert!(ok.validate().is_ok());
        assert_eq!(ok.x(0), -1.0);
        assert_eq!(ok.flat_index(2, 1, 0), 5);

        let mut zero = ok.clone();
        zero.ny = 0;
        assert!(matches!(zero.validate(), Err(GridError::InvalidGeometry(_))));

        let levels = ok.clone().with_z_levels(vec![1.0, 0.5]);
        assert!(levels.validate().is_err());

        let polar = GridGeometry::new(ProjectionKind::PolarNative, (10, 360, 1), (-1.0, 0.0, 0.0), (1.0, 1.0, 1.0));
        assert!(polar.validate().is_err());
    }
}
