use super::{GeometryMapper, MapContext};
use crate::core::geometry::normalize_azimuth;
use crate::core::grid_loc::{CellIndex, GridLoc};
use crate::core::params::{InterpKernel, Strategy};
use crate::core::search::GateBracket;

/// Index-space floor for inverse-distance weights
const MIN_INDEX_DIST_SQ: f64 = 1.0e-6;

/// Resampling onto a native polar grid: x is slant range (km), y is
/// azimuth (deg) and the z index selects the sweep
#[derive(Debug, Clone, Copy, Default)]
pub struct PolarMapper;

impl GeometryMapper for PolarMapper {
    fn strategy(&self) -> Strategy {
        Strategy::Polar
    }

    fn locate(&self, cell: CellIndex, ctx: &MapContext) -> GridLoc {
        let sweep = match ctx.sweeps.sweep(cell.iz) {
            Some(s) => s,
            None => return GridLoc::missing(),
        };
        let range = ctx.geometry.x(cell.ix);
        let azimuth = normalize_azimuth(ctx.geometry.y(cell.iy));
        if ctx.beyond_max_range(range) {
            return GridLoc::missing();
        }

        let bracket = match sweep.bracket_azimuth(azimuth) {
            Some(b) => b,
            None => return GridLoc::missing(),
        };
        let tolerance = ctx.geometry.dy.abs().max(ctx.beam_width_h);

        // (ray, azimuth offset), nearest first
        let mut rays: Vec<(usize, f64)> = Vec::with_capacity(2);
        if bracket.left == bracket.right {
            let offset = bracket.left_offset.min(bracket.right_offset);
            if offset <= tolerance {
                rays.push((bracket.left, offset));
            }
        } else {
            if bracket.left_offset <= tolerance {
                rays.push((bracket.left, bracket.left_offset));
            }
            if bracket.right_offset <= tolerance {
                rays.push((bracket.right, bracket.right_offset));
            }
            rays.sort_by(|a, b| a.1.total_cmp(&b.1));
        }

        let volume = &ctx.volume;
        let mut items: Vec<(u32, u32, f64)> = Vec::with_capacity(4);
        match ctx.config.kernel {
            InterpKernel::Nearest => {
                for &(ray_index, _) in &rays {
                    if let Some(gates) = GateBracket::locate(&volume.rays()[ray_index], range) {
                        items.push((ray_index as u32, gates.nearest() as u32, 1.0));
                        break;
                    }
                }
            }
            InterpKernel::Linear => {
                let total: f64 = rays.iter().map(|&(_, off)| off).sum();
                for &(ray_index, offset) in &rays {
                    let w_az = if rays.len() == 1 || total <= 0.0 { 1.0 } else { 1.0 - offset / total };
                    if let Some(gates) = GateBracket::locate(&volume.rays()[ray_index], range) {
                        for (gate, w_range) in gates.gates() {
                            items.push((ray_index as u32, gate as u32, w_az * w_range));
                        }
                    }
                }
            }
            InterpKernel::InverseDistance => {
                for &(ray_index, offset) in &rays {
                    let ray = &volume.rays()[ray_index];
                    if let Some(gates) = GateBracket::locate(ray, range) {
                        let fractional = ((range - ray.start_range_km) / ray.gate_spacing_km).max(0.0);
                        let d_az = offset / tolerance;
                        for (gate, _) in gates.gates() {
                            let d_gate = fractional - gate as f64;
                            let d_sq = d_az * d_az + d_gate * d_gate;
                            items.push((ray_index as u32, gate as u32, 1.0 / d_sq.max(MIN_INDEX_DIST_SQ)));
                        }
                    }
                }
            }
        }

        GridLoc::from_weights(items)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::core::params::RunConfig;
    use crate::types::{GridGeometry, ProjectionKind};

    fn polar_context(kernel: InterpKernel) -> MapContext {
        let rays: Vec<(f64, f64, f32)> = (0..360).map(|az| (az as f64, 0.5, az as f32)).collect();
        let volume = constant_volume(&rays, 0.0, 1.0, 100);
        let geometry = GridGeometry::new(ProjectionKind::PolarNative, (50, 720, 1), (0.0, 0.0, 0.0), (1.0, 0.5, 1.0));
        let config = RunConfig { strategy: Strategy::Polar, kernel, ..Default::default() };
        context(volume, geometry, config)
    }

    #[test]
    fn test_nearest_picks_one_gate() {
        let ctx = polar_context(InterpKernel::Nearest);
        // azimuth 10.5 deg, range 3 km: tie between rays 10 and 11 goes to the left ray
        let loc = PolarMapper.locate(CellIndex { ix: 3, iy: 21, iz: 0 }, &ctx);
        assert_eq!(loc.len(), 1);
        assert_eq!((loc.contributions()[0].ray, loc.contributions()[0].gate), (10, 3));
    }

    #[test]
    fn test_linear_blends_neighbouring_rays() {
        let ctx = polar_context(InterpKernel::Linear);
        let loc = PolarMapper.locate(CellIndex { ix: 3, iy: 21, iz: 0 }, &ctx);
        assert_eq!(loc.len(), 2);
        for c in loc.contributions() {
            assert!((c.weight - 0.5).abs() < 1e-6);
        }
    }

    #[test]
    fn test_inverse_distance_prefers_closer_ray() {
        let ctx = polar_context(InterpKernel::InverseDistance);
        // azimuth 20 deg lands on ray 20
        let loc = PolarMapper.locate(CellIndex { ix: 3, iy: 40, iz: 0 }, &ctx);
        assert_eq!(loc.contributions()[0].ray, 20);
        assert!(loc.contributions()[0].weight > 0.99);
    }

    #[test]
    fn test_outside_azimuth_tolerance() {
        let volume = constant_volume(&[(0.0, 0.5, 1.0), (180.0, 0.5, 2.0)], 0.0, 1.0, 100);
        let geometry = GridGeometry::new(ProjectionKind::PolarNative, (10, 360, 1), (0.0, 0.0, 0.0), (1.0, 1.0, 1.0));
        let config = RunConfig { strategy: Strategy::Polar, ..Default::default() };
        let ctx = context(volume, geometry, config);
        assert!(!PolarMapper.locate(CellIndex { ix: 2, iy: 1, iz: 0 }, &ctx).is_missing());
        assert!(PolarMapper.locate(CellIndex { ix: 2, iy: 90, iz: 0 }, &ctx).is_missing());
    }
}
