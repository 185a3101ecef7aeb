use super::{cell_point, GeometryMapper, MapContext};
use crate::core::geometry::distance_sq;
use crate::core::grid_loc::{CellIndex, GridLoc, PlaneKind};
use crate::core::params::Strategy;

/// Rays examined on each side of the cell azimuth, per sweep
const NEIGHBOURS_PER_SIDE: usize = 2;

const MIN_DIST_SQ: f64 = 1.0e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Selection {
    /// The `reorder_npoints` nearest radar points
    NearestN,
    /// The nearest radar point in each octant around the cell
    PerOctant,
}

/// Point-cloud style mapping: the radar gates near a cell are treated as
/// scattered points and weighted by inverse squared distance. Works on
/// whole z levels.
#[derive(Debug, Clone, Copy)]
pub struct ReorderMapper {
    selection: Selection,
}

impl ReorderMapper {
    pub fn nearest_n() -> Self {
        Self { selection: Selection::NearestN }
    }

    pub fn per_octant() -> Self {
        Self { selection: Selection::PerOctant }
    }
}

#[derive(Debug, Clone, Copy)]
struct RadarPoint {
    ray: u32,
    gate: u32,
    dist_sq: f64,
    octant: u8,
}

impl GeometryMapper for ReorderMapper {
    fn strategy(&self) -> Strategy {
        match self.selection {
            Selection::NearestN => Strategy::Reorder,
            Selection::PerOctant => Strategy::PrevReorder,
        }
    }

    fn plane_kind(&self) -> PlaneKind {
        PlaneKind::Level
    }

    fn locate(&self, cell: CellIndex, ctx: &MapContext) -> GridLoc {
        let point = cell_point(cell, ctx);
        let beam = &ctx.beam;
        let (elevation, slant) = beam.elevation_and_slant(point.ground_km, point.dz_km + beam.instrument_ht_km());
        if ctx.beyond_max_range(slant) || slant > ctx.sweeps.max_range_km() {
            return GridLoc::missing();
        }

        let radius_sq = ctx.radius_sq_at(slant);
        let bracket = ctx.sweeps.bracket_elevation(elevation);
        let (sin_el, cos_el) = elevation.to_radians().sin_cos();

        let mut points: Vec<RadarPoint> = Vec::with_capacity(16);
        for sweep_index in [bracket.lower, bracket.upper].into_iter().flatten() {
            let sweep = &ctx.sweeps.sweeps()[sweep_index];
            for ray_index in sweep.neighbours(point.azimuth_deg, NEIGHBOURS_PER_SIDE) {
                let ray = &ctx.volume.rays()[ray_index];
                let n_gates = ray.n_gates();

                // range of the cell projected onto the ray
                let (sin_r, cos_r) = ray.elevation_deg.to_radians().sin_cos();
                let cos_daz = (point.azimuth_deg - ray.azimuth_deg).to_radians().cos();
                let along = slant * (sin_el * sin_r + cos_el * cos_r * cos_daz);
                if along > ray.max_range_km() {
                    continue;
                }

                let d = ((along - ray.start_range_km) / ray.gate_spacing_km).max(0.0);
                let g0 = (d.floor() as usize).min(n_gates - 1);
                let g1 = (g0 + 1).min(n_gates - 1);
                let gates = if g0 == g1 { vec![g0] } else { vec![g0, g1] };
                for gate in gates {
                    let position = beam.beam_position(ray.azimuth_deg, ray.elevation_deg, ray.gate_range_km(gate));
                    let dist_sq = distance_sq(&position, &point.position);
                    if dist_sq > radius_sq {
                        continue;
                    }
                    let octant = ((position[2] > point.position[2]) as u8) << 2
                        | ((position[1] > point.position[1]) as u8) << 1
                        | (position[0] > point.position[0]) as u8;
                    points.push(RadarPoint { ray: ray_index as u32, gate: gate as u32, dist_sq, octant });
                }
            }
        }

        points.sort_by(|a, b| a.dist_sq.total_cmp(&b.dist_sq).then(a.ray.cmp(&b.ray)).then(a.gate.cmp(&b.gate)));
        points.dedup_by(|a, b| a.ray == b.ray && a.gate == b.gate);

        match self.selection {
            Selection::NearestN => points.truncate(ctx.config.reorder_npoints),
            Selection::PerOctant => {
                let mut seen = [false; 8];
                points.retain(|p| !std::mem::replace(&mut seen[p.octant as usize], true));
            }
        }

        if ctx.config.reorder_bound_vertically {
            let above = points.iter().any(|p| p.octant & 4 != 0);
            let below = points.iter().any(|p| p.octant & 4 == 0);
            if !(above && below) {
                return GridLoc::missing();
            }
        }

        GridLoc::from_weights(
            points
                .iter()
                .map(|p| (p.ray, p.gate, 1.0 / p.dist_sq.max(MIN_DIST_SQ)))
                .collect(),
        )
    }
}
