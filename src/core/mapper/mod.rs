//! Geometry mappers: per-strategy mapping from an output cell to the radar
//! gates that contribute to it
//!
//! Every mapper is a pure function of the cell index and a read-only
//! [`MapContext`], so cells can be located on any thread in any order.

pub mod cartesian;
pub mod polar;
pub mod ppi;
pub mod reorder;
pub mod satellite;

pub use cartesian::CartesianMapper;
pub use polar::PolarMapper;
pub use ppi::PpiMapper;
pub use reorder::ReorderMapper;
pub use satellite::SatelliteMapper;

use crate::core::geometry::{
    azimuth_of, distance_sq, latlon_to_range_bearing, local_position, range_bearing_to_latlon, BeamModel,
};
use crate::core::grid_loc::{CellIndex, GridLoc, Plane, PlaneKind};
use crate::core::params::{InterpKernel, RunConfig, Strategy};
use crate::core::search::{GateBracket, Sweep, SweepIndex};
use crate::types::{GridGeometry, ProjectionKind, Volume};
use std::sync::Arc;

/// Squared distance floor (km^2) for inverse-distance weights
const MIN_DIST_SQ: f64 = 1.0e-6;

/// Read-only inputs shared by every cell lookup in a pass
#[derive(Debug, Clone)]
pub struct MapContext {
    pub volume: Arc<Volume>,
    pub sweeps: Arc<SweepIndex>,
    pub geometry: Arc<GridGeometry>,
    pub config: Arc<RunConfig>,
    pub beam: BeamModel,
    pub beam_width_h: f64,
    pub beam_width_v: f64,
}

impl MapContext {
    pub fn new(
        volume: Arc<Volume>,
        sweeps: Arc<SweepIndex>,
        geometry: Arc<GridGeometry>,
        config: Arc<RunConfig>,
    ) -> Self {
        let beam = BeamModel::new(volume.site.altitude_km, config.pseudo_earth_radius_ratio);
        let beam_width_h = config.beam_width_deg_h.unwrap_or(volume.beam_width_deg_h);
        let beam_width_v = config.beam_width_deg_v.unwrap_or(volume.beam_width_deg_v);
        Self { volume, sweeps, geometry, config, beam, beam_width_h, beam_width_v }
    }

    /// Squared search radius at a slant range
    pub fn radius_sq_at(&self, slant_km: f64) -> f64 {
        let r = self.config.search_radius_at(slant_km);
        r * r
    }

    pub fn beyond_max_range(&self, slant_km: f64) -> bool {
        matches!(self.config.max_range_km, Some(max) if slant_km > max)
    }

    /// Elevation distance accepted outside the outermost sweeps
    pub fn elevation_tolerance(&self) -> f64 {
        self.beam_width_v * self.config.data_limit_extension
    }
}

/// Maps output cells to contributing gates
pub trait GeometryMapper: Send + Sync {
    fn strategy(&self) -> Strategy;

    fn plane_kind(&self) -> PlaneKind {
        PlaneKind::Row
    }

    fn locate(&self, cell: CellIndex, ctx: &MapContext) -> GridLoc;

    /// GridLocs for every cell of a plane, in flat index order
    fn locate_plane(&self, plane: Plane, ctx: &MapContext) -> Vec<GridLoc> {
        plane.cells(&ctx.geometry).map(|cell| self.locate(cell, ctx)).collect()
    }
}

/// Mapper implementing a strategy
pub fn mapper_for(strategy: Strategy) -> Arc<dyn GeometryMapper> {
    match strategy {
        Strategy::Cartesian => Arc::new(CartesianMapper),
        Strategy::Ppi => Arc::new(PpiMapper),
        Strategy::Polar => Arc::new(PolarMapper),
        Strategy::Reorder => Arc::new(ReorderMapper::nearest_n()),
        Strategy::PrevReorder => Arc::new(ReorderMapper::per_octant()),
        Strategy::Satellite => Arc::new(SatelliteMapper),
    }
}

/// Output cell expressed relative to the radar
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct CellPoint {
    pub ground_km: f64,
    pub azimuth_deg: f64,
    /// Height above the radar
    pub dz_km: f64,
    pub position: [f64; 3],
}

impl CellPoint {
    pub fn new(ground_km: f64, azimuth_deg: f64, dz_km: f64) -> Self {
        Self {
            ground_km,
            azimuth_deg,
            dz_km,
            position: local_position(ground_km, azimuth_deg, dz_km),
        }
    }
}

/// Radar-relative position of a cell on a Flat, LatLon or Satellite grid
pub(crate) fn cell_point(cell: CellIndex, ctx: &MapContext) -> CellPoint {
    let geometry = &ctx.geometry;
    let site = ctx.volume.site;
    let x = geometry.x(cell.ix);
    let y = geometry.y(cell.iy);
    let dz = geometry.z(cell.iz) - site.altitude_km;

    let (ground, azimuth) = match geometry.projection {
        ProjectionKind::LatLon | ProjectionKind::Satellite => {
            latlon_to_range_bearing(site.latitude, site.longitude, y, x)
        }
        ProjectionKind::Flat
            if (geometry.origin_lat - site.latitude).abs() > 1e-9
                || (geometry.origin_lon - site.longitude).abs() > 1e-9 =>
        {
            let (lat, lon) =
                range_bearing_to_latlon(geometry.origin_lat, geometry.origin_lon, x.hypot(y), azimuth_of(x, y));
            latlon_to_range_bearing(site.latitude, site.longitude, lat, lon)
        }
        _ => (x.hypot(y), azimuth_of(x, y)),
    };

    CellPoint::new(ground, azimuth, dz)
}

/// One (ray, gate) considered for a cell
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Candidate {
    pub ray: u32,
    pub gate: u32,
    /// Product of the elevation, azimuth and range linear weights
    pub linear_weight: f64,
    pub dist_sq: f64,
}

/// Candidate list that merges repeated (ray, gate) pairs
#[derive(Debug, Default)]
pub(crate) struct Candidates {
    items: Vec<Candidate>,
}

impl Candidates {
    pub fn new() -> Self {
        Self { items: Vec::with_capacity(8) }
    }

    pub fn push(&mut self, candidate: Candidate) {
        match self
            .items
            .iter_mut()
            .find(|c| c.ray == candidate.ray && c.gate == candidate.gate)
        {
            Some(existing) => existing.linear_weight += candidate.linear_weight,
            None => self.items.push(candidate),
        }
    }

    #[cfg(test)]
    pub fn items(&self) -> &[Candidate] {
        &self.items
    }

    /// Apply the search radius and kernel, producing the cell's GridLoc
    pub fn finalize(&self, kernel: InterpKernel, radius_sq: f64) -> GridLoc {
        let within: Vec<&Candidate> = self.items.iter().filter(|c| c.dist_sq <= radius_sq).collect();
        if within.is_empty() {
            return GridLoc::missing();
        }

        if kernel == InterpKernel::Linear {
            let linear: Vec<(u32, u32, f64)> = within
                .iter()
                .filter(|c| c.linear_weight > 0.0)
                .map(|c| (c.ray, c.gate, c.linear_weight))
                .collect();
            if !linear.is_empty() {
                return GridLoc::from_weights(linear);
            }
        }

        GridLoc::from_weights(
            within
                .iter()
                .map(|c| (c.ray, c.gate, 1.0 / c.dist_sq.max(MIN_DIST_SQ)))
                .collect(),
        )
    }
}

/// Add the azimuth/range bracketing gates of one sweep
pub(crate) fn add_sweep_candidates(
    ctx: &MapContext,
    beam: &BeamModel,
    sweep: &Sweep,
    point: &CellPoint,
    slant_km: f64,
    elevation_weight: f64,
    out: &mut Candidates,
) {
    let bracket = match sweep.bracket_azimuth(point.azimuth_deg) {
        Some(b) => b,
        None => return,
    };
    let (w_left, w_right) = bracket.weights();
    let rays = if bracket.left == bracket.right {
        vec![(bracket.left, w_left)]
    } else {
        vec![(bracket.left, w_left), (bracket.right, w_right)]
    };

    for (ray_index, w_az) in rays {
        let ray = &ctx.volume.rays()[ray_index];
        let gates = match GateBracket::locate(ray, slant_km) {
            Some(g) => g,
            None => continue,
        };
        for (gate, w_range) in gates.gates() {
            let position = beam.beam_position(ray.azimuth_deg, ray.elevation_deg, ray.gate_range_km(gate));
            out.push(Candidate {
                ray: ray_index as u32,
                gate: gate as u32,
                linear_weight: elevation_weight * w_az * w_range,
                dist_sq: distance_sq(&position, &point.position),
            });
        }
    }
}

/// Cartesian-style bracketing search for a cell with a known position,
/// shared by the Cartesian and Satellite mappers
pub(crate) fn bracketing_locate(point: &CellPoint, ctx: &MapContext, beam: &BeamModel) -> GridLoc {
    let (elevation, slant) = beam.elevation_and_slant(point.ground_km, point.dz_km + beam.instrument_ht_km());
    if ctx.beyond_max_range(slant) {
        return GridLoc::missing();
    }

    let bracket = ctx.sweeps.bracket_elevation(elevation);
    let tolerance = ctx.elevation_tolerance();
    let used: Vec<(usize, f64)> = match (bracket.lower, bracket.upper) {
        (Some(lower), Some(upper)) => {
            let e_lower = ctx.sweeps.sweeps()[lower].elevation_deg;
            let e_upper = ctx.sweeps.sweeps()[upper].elevation_deg;
            let span = e_upper - e_lower;
            let w_upper = if span > 0.0 { (elevation - e_lower) / span } else { 0.5 };
            vec![(lower, 1.0 - w_upper), (upper, w_upper)]
        }
        (Some(lower), None) if elevation - ctx.sweeps.sweeps()[lower].elevation_deg <= tolerance => {
            vec![(lower, 1.0)]
        }
        (None, Some(upper)) if ctx.sweeps.sweeps()[upper].elevation_deg - elevation <= tolerance => {
            vec![(upper, 1.0)]
        }
        _ => return GridLoc::missing(),
    };

    let mut candidates = Candidates::new();
    for (sweep_index, w_el) in used {
        let sweep = &ctx.sweeps.sweeps()[sweep_index];
        add_sweep_candidates(ctx, beam, sweep, point, slant, w_el, &mut candidates);
    }
    candidates.finalize(ctx.config.kernel, ctx.radius_sq_at(slant))
}
