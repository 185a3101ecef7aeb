use super::{bracketing_locate, cell_point, GeometryMapper, MapContext};
use crate::core::grid_loc::{CellIndex, GridLoc};
use crate::core::params::Strategy;

/// 3-D Cartesian grid over a refracted beam model.
///
/// Each cell is bracketed in elevation by the sweeps below and above it, in
/// azimuth by the rays either side and in range by the gates either side,
/// giving up to eight candidate gates.
#[derive(Debug, Clone, Copy, Default)]
pub struct CartesianMapper;

impl GeometryMapper for CartesianMapper {
    fn strategy(&self) -> Strategy {
        Strategy::Cartesian
    }

    fn locate(&self, cell: CellIndex, ctx: &MapContext) -> GridLoc {
        let point = cell_point(cell, ctx);
        bracketing_locate(&point, ctx, &ctx.beam)
    }
}
