use super::{add_sweep_candidates, Candidates, CellPoint, GeometryMapper, MapContext};
use crate::core::geometry::azimuth_of;
use crate::core::grid_loc::{CellIndex, GridLoc};
use crate::core::params::Strategy;

/// One 2-D plane per sweep: the z index selects the sweep and the cell's
/// ground range is followed along that sweep's elevation
#[derive(Debug, Clone, Copy, Default)]
pub struct PpiMapper;

impl GeometryMapper for PpiMapper {
    fn strategy(&self) -> Strategy {
        Strategy::Ppi
    }

    fn locate(&self, cell: CellIndex, ctx: &MapContext) -> GridLoc {
        let sweep = match ctx.sweeps.sweep(cell.iz) {
            Some(s) => s,
            None => return GridLoc::missing(),
        };

        let x = ctx.geometry.x(cell.ix);
        let y = ctx.geometry.y(cell.iy);
        let ground = x.hypot(y);
        let slant = ctx.beam.slant_range_on_elevation(sweep.elevation_deg, ground);
        if !slant.is_finite() || ctx.beyond_max_range(slant) {
            return GridLoc::missing();
        }

        let dz = ctx.beam.height_km(sweep.elevation_deg, slant) - ctx.beam.instrument_ht_km();
        let point = CellPoint::new(ground, azimuth_of(x, y), dz);

        let mut candidates = Candidates::new();
        add_sweep_candidates(ctx, &ctx.beam, sweep, &point, slant, 1.0, &mut candidates);
        candidates.finalize(ctx.config.kernel, ctx.radius_sq_at(slant))
    }
}
