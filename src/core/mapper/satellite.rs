use super::{bracketing_locate, cell_point, GeometryMapper, MapContext};
use crate::core::geometry::BeamModel;
use crate::core::grid_loc::{CellIndex, GridLoc};
use crate::core::params::Strategy;

/// Lat/lon grid about a sensor, using the true earth radius (no refraction)
#[derive(Debug, Clone, Copy, Default)]
pub struct SatelliteMapper;

impl GeometryMapper for SatelliteMapper {
    fn strategy(&self) -> Strategy {
        Strategy::Satellite
    }

    fn locate(&self, cell: CellIndex, ctx: &MapContext) -> GridLoc {
        let beam = BeamModel::new(ctx.volume.site.altitude_km, 1.0);
        let point = cell_point(cell, ctx);
        bracketing_locate(&point, ctx, &beam)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::core::geometry::range_bearing_to_latlon;
    use crate::core::params::{InterpKernel, RunConfig};
    use crate::types::{GridGeometry, ProjectionKind};

    #[test]
    fn test_latlon_cell_maps_to_nearest_ray() {
        let volume = constant_volume(&[(0.0, 0.0, 1.0), (90.0, 0.0, 2.0), (180.0, 0.0, 3.0), (270.0, 0.0, 4.0)], 0.5, 0.5, 80);
        let site = volume.site;
        let (lat, lon) = range_bearing_to_latlon(site.latitude, site.longitude, 20.0, 90.0);
        let geometry = GridGeometry::new(ProjectionKind::Satellite, (1, 1, 1), (lon, lat, 0.0), (0.01, 0.01, 1.0));
        let config = RunConfig {
            strategy: Strategy::Satellite,
            kernel: InterpKernel::Nearest,
            search_radius_km: 5.0,
            ..Default::default()
        };
        let ctx = context(volume, geometry, config);
        let loc = SatelliteMapper.locate(CellIndex { ix: 0, iy: 0, iz: 0 }, &ctx);
        assert!(!loc.is_missing());
        assert_eq!(loc.contributions()[0].ray, 1);
    }
}
