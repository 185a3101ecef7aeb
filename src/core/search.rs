use crate::core::geometry::normalize_azimuth;
use crate::core::params::RunConfig;
use crate::types::{GridError, GridResult, Ray, Volume};

/// Rays of one sweep, ordered by azimuth
#[derive(Debug, Clone)]
pub struct Sweep {
    pub elevation_deg: f64,
    /// (azimuth, ray index into the volume), sorted by azimuth then ray
    rays: Vec<(f64, usize)>,
}

/// Rays either side of an azimuth. `left == right` for single-ray sweeps.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AzimuthBracket {
    pub left: usize,
    pub right: usize,
    /// Degrees from the left ray clockwise to the target
    pub left_offset: f64,
    /// Degrees from the target clockwise to the right ray
    pub right_offset: f64,
    left_pos: usize,
    right_pos: usize,
}

impl AzimuthBracket {
    /// Linear weights (left, right) in azimuth
    pub fn weights(&self) -> (f64, f64) {
        let span = self.left_offset + self.right_offset;
        if self.left == self.right || span <= 0.0 {
            (1.0, 0.0)
        } else {
            (self.right_offset / span, self.left_offset / span)
        }
    }
}

impl Sweep {
    fn new(elevation_deg: f64, mut rays: Vec<(f64, usize)>) -> Self {
        rays.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        Self { elevation_deg, rays }
    }

    pub fn n_rays(&self) -> usize {
        self.rays.len()
    }

    pub fn rays(&self) -> &[(f64, usize)] {
        &self.rays
    }

    /// Bracketing rays for an azimuth, wrapping through north
    pub fn bracket_azimuth(&self, azimuth_deg: f64) -> Option<AzimuthBracket> {
        let n = self.rays.len();
        if n == 0 {
            return None;
        }
        let az = normalize_azimuth(azimuth_deg);
        let k = self.rays.partition_point(|(a, _)| *a <= az);
        let left_pos = if k == 0 { n - 1 } else { k - 1 };
        let right_pos = if k == n { 0 } else { k };
        let (left_az, left) = self.rays[left_pos];
        let (right_az, right) = self.rays[right_pos];

        Some(AzimuthBracket {
            left,
            right,
            left_offset: (az - left_az).rem_euclid(360.0),
            right_offset: (right_az - az).rem_euclid(360.0),
            left_pos,
            right_pos,
        })
    }

    /// Up to `per_side` rays on each side of an azimuth, nearest first,
    /// without duplicates
    pub fn neighbours(&self, azimuth_deg: f64, per_side: usize) -> Vec<usize> {
        let n = self.rays.len();
        let mut out = Vec::with_capacity(2 * per_side);
        let bracket = match self.bracket_azimuth(azimuth_deg) {
            Some(b) => b,
            None => return out,
        };
        for step in 0..per_side.min(n) {
            let left = self.rays[(bracket.left_pos + n - step) % n].1;
            let right = self.rays[(bracket.right_pos + step) % n].1;
            for ray in [left, right] {
                if !out.contains(&ray) {
                    out.push(ray);
                }
            }
        }
        out
    }
}

/// Sweeps either side of an elevation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElevationBracket {
    /// Highest sweep with elevation <= target
    pub lower: Option<usize>,
    /// Lowest sweep with elevation > target
    pub upper: Option<usize>,
}

/// Read-only search structure over a volume, built once per ray geometry
#[derive(Debug, Clone)]
pub struct SweepIndex {
    sweeps: Vec<Sweep>,
    n_selected: usize,
    /// Range of the furthest last gate over the selected rays
    max_range_km: f64,
}

impl SweepIndex {
    /// Group the selected rays into sweeps and order them for searching
    pub fn build(volume: &Volume, config: &RunConfig) -> GridResult<Self> {
        let mut sweeps = Vec::new();
        let mut current: Vec<(f64, usize)> = Vec::new();
        let mut current_el_sum = 0.0;
        let mut first_el = 0.0;
        let mut n_selected = 0;
        let mut max_range_km = 0.0_f64;

        for (i, ray) in volume.rays().iter().enumerate() {
            if !ray_selected(ray, config) {
                continue;
            }
            n_selected += 1;
            max_range_km = max_range_km.max(ray.max_range_km());
            if !current.is_empty() && (ray.elevation_deg - first_el).abs() > config.sweep_split_tolerance_deg {
                let n = current.len() as f64;
                sweeps.push(Sweep::new(current_el_sum / n, std::mem::take(&mut current)));
                current_el_sum = 0.0;
            }
            if current.is_empty() {
                first_el = ray.elevation_deg;
            }
            current.push((ray.azimuth_deg, i));
            current_el_sum += ray.elevation_deg;
        }
        if !current.is_empty() {
            let n = current.len() as f64;
            sweeps.push(Sweep::new(current_el_sum / n, current));
        }

        if sweeps.is_empty() {
            return Err(GridError::InvalidVolume(
                "no rays remain after applying elevation/azimuth limits".to_string(),
            ));
        }

        // stable: repeated elevations keep scan order
        sweeps.sort_by(|a, b| a.elevation_deg.total_cmp(&b.elevation_deg));

        log::debug!(
            "Indexed {} of {} rays into {} sweeps ({:.2} to {:.2} deg)",
            n_selected,
            volume.n_rays(),
            sweeps.len(),
            sweeps[0].elevation_deg,
            sweeps[sweeps.len() - 1].elevation_deg
        );

        Ok(Self { sweeps, n_selected, max_range_km })
    }

    pub fn sweeps(&self) -> &[Sweep] {
        &self.sweeps
    }

    pub fn n_sweeps(&self) -> usize {
        self.sweeps.len()
    }

    pub fn sweep(&self, index: usize) -> Option<&Sweep> {
        self.sweeps.get(index)
    }

    pub fn n_selected_rays(&self) -> usize {
        self.n_selected
    }

    pub fn max_range_km(&self) -> f64 {
        self.max_range_km
    }

    pub fn bracket_elevation(&self, elevation_deg: f64) -> ElevationBracket {
        let k = self.sweeps.partition_point(|s| s.elevation_deg <= elevation_deg);
        ElevationBracket {
            lower: if k == 0 { None } else { Some(k - 1) },
            upper: if k == self.sweeps.len() { None } else { Some(k) },
        }
    }
}

fn ray_selected(ray: &Ray, config: &RunConfig) -> bool {
    ray.n_gates() > 0 && config.elevation_selected(ray.elevation_deg) && config.azimuth_selected(ray.azimuth_deg)
}

/// Gates either side of a slant range along one ray
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GateBracket {
    pub inner: usize,
    pub outer: Option<usize>,
    /// Linear weight of the outer gate
    pub outer_weight: f64,
}

impl GateBracket {
    /// Brackets a slant range. None once the range is past the last gate.
    pub fn locate(ray: &Ray, slant_km: f64) -> Option<Self> {
        let n = ray.n_gates();
        if n == 0 || !slant_km.is_finite() || slant_km > ray.max_range_km() + 1e-9 {
            return None;
        }
        let d = (slant_km - ray.start_range_km) / ray.gate_spacing_km;
        if d <= 0.0 {
            return Some(Self { inner: 0, outer: None, outer_weight: 0.0 });
        }
        let inner = d.floor() as usize;
        if inner >= n - 1 {
            return Some(Self { inner: n - 1, outer: None, outer_weight: 0.0 });
        }
        Some(Self { inner, outer: Some(inner + 1), outer_weight: d - inner as f64 })
    }

    /// (gate, weight) pairs, inner first
    pub fn gates(&self) -> impl Iterator<Item = (usize, f64)> {
        let inner = (self.inner, 1.0 - self.outer_weight);
        let outer = self.outer.map(|g| (g, self.outer_weight));
        std::iter::once(inner).chain(outer)
    }

    pub fn nearest(&self) -> usize {
        match self.outer {
            Some(outer) if self.outer_weight > 0.5 => outer,
            _ => self.inner,
        }
    }
}
