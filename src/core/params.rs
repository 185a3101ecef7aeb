use crate::core::grid_loc::MAX_CONTRIBUTORS;
use crate::types::{GridError, GridResult, ProjectionKind, MISSING_VALUE};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Interpolation strategy (selects the geometry mapper)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Strategy {
    /// 3-D Cartesian grid, sweep/ray/gate bracketing
    Cartesian,
    /// One 2-D plane per sweep
    Ppi,
    /// Native polar resampling
    Polar,
    /// Nearest-N radar points per cell
    Reorder,
    /// Closest radar point per octant
    PrevReorder,
    /// Lat/lon grid about a sensor with a true-radius earth
    Satellite,
}

impl Strategy {
    /// Whether this strategy can fill a grid with the given projection
    pub fn supports(&self, projection: ProjectionKind) -> bool {
        match self {
            Strategy::Cartesian | Strategy::Reorder | Strategy::PrevReorder => {
                matches!(projection, ProjectionKind::Flat | ProjectionKind::LatLon)
            }
            Strategy::Ppi => projection == ProjectionKind::PpiNative,
            Strategy::Polar => projection == ProjectionKind::PolarNative,
            Strategy::Satellite => projection == ProjectionKind::Satellite,
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Strategy::Cartesian => "CART",
            Strategy::Ppi => "PPI",
            Strategy::Polar => "POLAR",
            Strategy::Reorder => "REORDER",
            Strategy::PrevReorder => "PREV_REORDER",
            Strategy::Satellite => "SAT",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for Strategy {
    type Err = GridError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "CART" | "CARTESIAN" => Ok(Strategy::Cartesian),
            "PPI" => Ok(Strategy::Ppi),
            "POLAR" => Ok(Strategy::Polar),
            "REORDER" => Ok(Strategy::Reorder),
            "PREV_REORDER" | "PREVREORDER" => Ok(Strategy::PrevReorder),
            "SAT" | "SATELLITE" => Ok(Strategy::Satellite),
            _ => Err(GridError::Config(format!("Unknown interpolation strategy: {}", s))),
        }
    }
}

/// Weighting kernel applied to the candidates of a cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InterpKernel {
    /// Closest contributor with valid data
    Nearest,
    /// Inverse squared distance weighting
    InverseDistance,
    /// Trilinear weights in elevation, azimuth and range
    Linear,
}

impl Default for InterpKernel {
    fn default() -> Self {
        InterpKernel::Linear
    }
}

impl FromStr for InterpKernel {
    type Err = GridError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "nearest" => Ok(InterpKernel::Nearest),
            "inverse_distance" | "idw" => Ok(InterpKernel::InverseDistance),
            "linear" | "trilinear" | "bilinear" => Ok(InterpKernel::Linear),
            _ => Err(GridError::Config(format!("Unknown interpolation kernel: {}", s))),
        }
    }
}

/// How planes are grouped into per-thread slabs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlabScheme {
    /// Plane i goes to slab i mod n
    Striped,
    /// Consecutive blocks of planes
    Contiguous,
}

impl Default for SlabScheme {
    fn default() -> Self {
        SlabScheme::Striped
    }
}

/// Nyquist-style fold limits for circular fields
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FoldLimits {
    pub lower: f64,
    pub upper: f64,
}

/// Per-field interpolation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    /// Discrete fields (e.g. particle id) always take the nearest value
    pub discrete: bool,
    /// Folded fields are averaged on the circle
    pub fold: Option<FoldLimits>,
}

impl FieldSpec {
    pub fn continuous(name: &str) -> Self {
        Self { name: name.to_string(), discrete: false, fold: None }
    }

    pub fn discrete(name: &str) -> Self {
        Self { name: name.to_string(), discrete: true, fold: None }
    }

    pub fn folded(name: &str, lower: f64, upper: f64) -> Self {
        Self {
            name: name.to_string(),
            discrete: false,
            fold: Some(FoldLimits { lower, upper }),
        }
    }
}

/// Run configuration for the interpolation engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Worker pool size
    pub n_threads: usize,
    pub strategy: Strategy,
    pub kernel: InterpKernel,
    /// Maximum distance (km) from a cell to a contributing gate
    pub search_radius_km: f64,
    /// When set, the search radius grows linearly beyond this range
    pub nominal_range_for_search_radius_km: Option<f64>,
    /// Cells farther than this slant range are missing
    pub max_range_km: Option<f64>,
    /// Minimum contributors with valid data for a non-missing cell
    pub min_valid_for_interp: usize,
    /// Beam width overrides (deg), else taken from the volume
    pub beam_width_deg_h: Option<f64>,
    pub beam_width_deg_v: Option<f64>,
    /// Fraction of the beam width accepted beyond the outermost sweeps
    pub data_limit_extension: f64,
    pub pseudo_earth_radius_ratio: f64,
    /// Ray selection by elevation (min, max) in deg
    pub elevation_limits: Option<(f64, f64)>,
    /// Ray selection by azimuth sector (start, end) in deg, may cross north
    pub azimuth_limits: Option<(f64, f64)>,
    /// Elevation change that starts a new sweep
    pub sweep_split_tolerance_deg: f64,
    /// Fields to interpolate; empty means every field in the volume
    pub fields: Vec<FieldSpec>,
    pub reorder_npoints: usize,
    pub reorder_bound_vertically: bool,
    pub slab_scheme: SlabScheme,
    /// Sentinel written to missing output cells
    pub missing_value: f32,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            n_threads: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            strategy: Strategy::Cartesian,
            kernel: InterpKernel::default(),
            search_radius_km: 2.0,
            nominal_range_for_search_radius_km: None,
            max_range_km: None,
            min_valid_for_interp: 1,
            beam_width_deg_h: None,
            beam_width_deg_v: None,
            data_limit_extension: 0.5,             // half a beam width
            pseudo_earth_radius_ratio: 4.0 / 3.0,  // standard refraction
            elevation_limits: None,
            azimuth_limits: None,
            sweep_split_tolerance_deg: 0.5,
            fields: Vec::new(),
            reorder_npoints: 8,
            reorder_bound_vertically: false,
            slab_scheme: SlabScheme::default(),
            missing_value: MISSING_VALUE,
        }
    }
}

impl RunConfig {
    /// Check parameter ranges
    pub fn validate(&self) -> GridResult<()> {
        if self.n_threads == 0 {
            return Err(GridError::Config("n_threads must be at least 1".to_string()));
        }

        if !(self.search_radius_km.is_finite() && self.search_radius_km > 0.0) {
            return Err(GridError::Config(format!(
                "search_radius_km must be positive, got {}",
                self.search_radius_km
            )));
        }

        if let Some(nominal) = self.nominal_range_for_search_radius_km {
            if !(nominal.is_finite() && nominal > 0.0) {
                return Err(GridError::Config(format!(
                    "nominal_range_for_search_radius_km must be positive, got {}",
                    nominal
                )));
            }
        }

        if let Some(max_range) = self.max_range_km {
            if !(max_range > 0.0) {
                return Err(GridError::Config(format!(
                    "max_range_km must be positive, got {}",
                    max_range
                )));
            }
        }

        for (name, value) in [("beam_width_deg_h", self.beam_width_deg_h), ("beam_width_deg_v", self.beam_width_deg_v)] {
            if let Some(w) = value {
                if !(w.is_finite() && w > 0.0) {
                    return Err(GridError::Config(format!("{} must be positive, got {}", name, w)));
                }
            }
        }

        if !(self.data_limit_extension.is_finite() && self.data_limit_extension >= 0.0) {
            return Err(GridError::Config(format!(
                "data_limit_extension must be >= 0, got {}",
                self.data_limit_extension
            )));
        }

        if !(self.pseudo_earth_radius_ratio.is_finite() && self.pseudo_earth_radius_ratio > 0.0) {
            return Err(GridError::Config(format!(
                "pseudo_earth_radius_ratio must be positive, got {}",
                self.pseudo_earth_radius_ratio
            )));
        }

        if let Some((min_el, max_el)) = self.elevation_limits {
            if min_el > max_el {
                return Err(GridError::Config(format!(
                    "elevation limits reversed: {} > {}",
                    min_el, max_el
                )));
            }
        }

        if !(self.sweep_split_tolerance_deg.is_finite() && self.sweep_split_tolerance_deg > 0.0) {
            return Err(GridError::Config(format!(
                "sweep_split_tolerance_deg must be positive, got {}",
                self.sweep_split_tolerance_deg
            )));
        }

        if self.reorder_npoints == 0 || self.reorder_npoints > MAX_CONTRIBUTORS {
            return Err(GridError::Config(format!(
                "reorder_npoints must be in 1..={}, got {}",
                MAX_CONTRIBUTORS, self.reorder_npoints
            )));
        }

        for field in &self.fields {
            if let Some(fold) = field.fold {
                if !(fold.upper > fold.lower) {
                    return Err(GridError::Config(format!(
                        "fold limits for {} must satisfy lower < upper",
                        field.name
                    )));
                }
                if field.discrete {
                    return Err(GridError::Config(format!(
                        "field {} cannot be both discrete and folded",
                        field.name
                    )));
                }
            }
        }

        Ok(())
    }

    /// Reject strategy/projection pairs that cannot work together
    pub fn check_projection(&self, projection: ProjectionKind) -> GridResult<()> {
        if self.strategy.supports(projection) {
            Ok(())
        } else {
            Err(GridError::UnsupportedStrategy {
                strategy: self.strategy.to_string(),
                projection,
            })
        }
    }

    /// Search radius at a given slant range, never below the base radius
    pub fn search_radius_at(&self, range_km: f64) -> f64 {
        match self.nominal_range_for_search_radius_km {
            Some(nominal) => (self.search_radius_km * range_km / nominal).max(self.search_radius_km),
            None => self.search_radius_km,
        }
    }

    /// Whether an azimuth lies inside the configured sector
    pub fn azimuth_selected(&self, azimuth_deg: f64) -> bool {
        match self.azimuth_limits {
            None => true,
            Some((start, end)) => {
                let az = azimuth_deg.rem_euclid(360.0);
                let start = start.rem_euclid(360.0);
                let end = end.rem_euclid(360.0);
                if start <= end {
                    az >= start && az <= end
                } else {
                    // sector crosses north
                    az >= start || az <= end
                }
            }
        }
    }

    pub fn elevation_selected(&self, elevation_deg: f64) -> bool {
        match self.elevation_limits {
            None => true,
            Some((min_el, max_el)) => elevation_deg >= min_el && elevation_deg <= max_el,
        }
    }
}
