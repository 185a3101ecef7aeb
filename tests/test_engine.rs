mod common;

use common::*;
use radgrid::core::geometry::latlon_to_range_bearing;
use radgrid::core::{CellIndex, GeometryMapper, GridLoc, MapContext};
use radgrid::{
    FieldSpec, GridError, GridGeometry, InterpEngine, InterpKernel, ProjectionKind, RunConfig, Strategy, MISSING_VALUE,
};
use std::sync::Arc;

fn ring_volume(n_gates: usize, value: f32) -> Arc<radgrid::Volume> {
    let rays = (0..360)
        .map(|az| ray(az as f64, 0.0, 0.25, 0.25, vec![vec![value; n_gates]]))
        .collect();
    volume(rays, &["DBZ"])
}

#[test]
fn test_interp_field_is_idempotent() {
    init_logging();
    let vol = synthetic_volume(&[0.5, 1.5, 2.5], 180, 80);
    let config = RunConfig { n_threads: 4, search_radius_km: 3.0, ..Default::default() };
    let mut engine = InterpEngine::new(flat_grid(21, 1.0, vec![0.5, 1.0]), config).expect("Failed to create engine");

    let first = engine.interp_field(&vol, "DBZ").expect("First pass failed");
    let second = engine.interp_field(&vol, "DBZ").expect("Second pass failed");
    assert!(first.data.iter().zip(second.data.iter()).all(|(a, b)| a.to_bits() == b.to_bits()));
    assert!(first.valid_count() > 0);
}

#[test]
fn test_grid_loc_table_reused_for_same_geometry() {
    init_logging();
    let config = RunConfig { n_threads: 3, ..Default::default() };
    let mut engine = InterpEngine::new(flat_grid(15, 1.0, vec![0.0]), config).expect("Failed to create engine");
    assert!(engine.grid_locs().is_none());

    let first = engine.compute_grid_locs(&ring_volume(40, 1.0)).expect("GRID_LOC failed");
    // new values, same ray geometry
    let second = engine.compute_grid_locs(&ring_volume(40, 2.0)).expect("GRID_LOC failed");
    assert!(Arc::ptr_eq(&first, &second));

    // more gates: geometry changed
    let third = engine.compute_grid_locs(&ring_volume(50, 2.0)).expect("GRID_LOC failed");
    assert!(!Arc::ptr_eq(&first, &third));
    assert_eq!(engine.grid_locs().map(|t| t.len()), Some(15 * 15));
}

#[test]
fn test_pool_reused_across_volumes() {
    init_logging();
    let config = RunConfig { n_threads: 3, kernel: InterpKernel::Nearest, ..Default::default() };
    let mut engine = InterpEngine::new(flat_grid(11, 1.0, vec![0.0]), config).expect("Failed to create engine");

    for (i, value) in [1.0_f32, 7.0, 3.5].iter().enumerate() {
        let gridded = engine.interp_volume(&ring_volume(40, *value)).expect("Failed to grid volume");
        let dbz = gridded.field("DBZ").expect("DBZ missing from output");
        assert!(dbz.data.iter().all(|&v| v == *value), "volume {} not uniformly {}", i, value);
        assert_eq!(engine.n_threads(), 3);
    }
    engine.shutdown().expect("Failed to stop engine");
}

#[test]
fn test_cells_beyond_last_gate_are_missing() {
    init_logging();
    // last gate at 10 km
    let vol = ring_volume(40, 4.0);
    let geometry = flat_grid(31, 1.0, vec![0.0]);
    let config = RunConfig { n_threads: 2, ..Default::default() };
    let mut engine = InterpEngine::new(geometry.clone(), config).expect("Failed to create engine");
    let dbz = engine.interp_field(&vol, "DBZ").expect("Failed to grid field");

    for iy in 0..geometry.ny {
        for ix in 0..geometry.nx {
            let (x, y) = cell_xy(&geometry, ix, iy);
            let ground = x.hypot(y);
            let value = dbz.value(ix, iy, 0);
            if ground > 10.01 {
                assert_eq!(value, None, "cell at {:.2} km should be missing", ground);
            } else if ground < 9.5 {
                assert_eq!(value, Some(4.0), "cell at {:.2} km should be valid", ground);
            }
        }
    }
}

/// Grid roughly 30 km across around the radar
fn ranged_grid(strategy: Strategy) -> GridGeometry {
    let s = site();
    match strategy {
        Strategy::Cartesian | Strategy::Reorder | Strategy::PrevReorder => flat_grid(31, 1.0, vec![0.0]),
        Strategy::Ppi => GridGeometry::centered(ProjectionKind::PpiNative, (31, 31, 1), (1.0, 1.0), vec![0.0]),
        Strategy::Polar => {
            GridGeometry::new(ProjectionKind::PolarNative, (60, 90, 1), (0.25, 0.0, 0.0), (0.25, 4.0, 1.0))
        }
        Strategy::Satellite => {
            let dlat = 1.0 / 111.2;
            let dlon = dlat / s.latitude.to_radians().cos();
            GridGeometry::new(
                ProjectionKind::Satellite,
                (31, 31, 1),
                (s.longitude - 15.0 * dlon, s.latitude - 15.0 * dlat, 0.0),
                (dlon, dlat, 1.0),
            )
        }
    }
}

/// Range of a cell from the radar, km
fn cell_range(strategy: Strategy, geometry: &GridGeometry, ix: usize, iy: usize) -> f64 {
    let s = site();
    match strategy {
        Strategy::Polar => geometry.x(ix),
        Strategy::Satellite => latlon_to_range_bearing(s.latitude, s.longitude, geometry.y(iy), geometry.x(ix)).0,
        _ => geometry.x(ix).hypot(geometry.y(iy)),
    }
}

#[test]
fn test_every_strategy_leaves_cells_past_last_gate_missing() {
    init_logging();
    // last gate at 10 km
    let vol = ring_volume(40, 4.0);

    for strategy in [
        Strategy::Cartesian,
        Strategy::Ppi,
        Strategy::Polar,
        Strategy::Reorder,
        Strategy::PrevReorder,
        Strategy::Satellite,
    ] {
        let geometry = ranged_grid(strategy);
        let config = RunConfig { n_threads: 2, strategy, ..Default::default() };
        let mut engine = InterpEngine::new(geometry.clone(), config).expect("Failed to create engine");
        let dbz = engine.interp_field(&vol, "DBZ").expect("Failed to grid field");

        let mut beyond = 0;
        for iy in 0..geometry.ny {
            for ix in 0..geometry.nx {
                let range = cell_range(strategy, &geometry, ix, iy);
                let value = dbz.value(ix, iy, 0);
                if range > 10.05 {
                    assert_eq!(value, None, "{}: cell at {:.2} km should be missing", strategy, range);
                    beyond += 1;
                } else if range > 1.0 && range < 9.5 {
                    let v = value.unwrap_or_else(|| panic!("{}: cell at {:.2} km should be valid", strategy, range));
                    assert!((v - 4.0).abs() < 1e-4, "{}: {} at {:.2} km", strategy, v, range);
                }
            }
        }
        println!("{}: {} cells beyond the last gate", strategy, beyond);
        assert!(beyond > 0);
        engine.shutdown().expect("Failed to stop engine");
    }
}

#[test]
fn test_max_range_limit() {
    init_logging();
    let vol = ring_volume(80, 4.0);
    let geometry = flat_grid(21, 1.0, vec![0.0]);
    let config = RunConfig { n_threads: 2, max_range_km: Some(5.0), ..Default::default() };
    let mut engine = InterpEngine::new(geometry.clone(), config).expect("Failed to create engine");
    let dbz = engine.interp_field(&vol, "DBZ").expect("Failed to grid field");

    for iy in 0..geometry.ny {
        for ix in 0..geometry.nx {
            let (x, y) = cell_xy(&geometry, ix, iy);
            if x.hypot(y) > 5.01 {
                assert_eq!(dbz.value(ix, iy, 0), None);
            }
        }
    }
    assert!(dbz.valid_count() > 0);
}

#[test]
fn test_configuration_errors() {
    init_logging();

    let ppi_on_flat = RunConfig { strategy: Strategy::Ppi, ..Default::default() };
    let result = InterpEngine::new(flat_grid(5, 1.0, vec![0.0]), ppi_on_flat);
    assert!(matches!(result, Err(GridError::UnsupportedStrategy { .. })));

    let bad_grid = GridGeometry::new(ProjectionKind::Flat, (0, 5, 1), (0.0, 0.0, 0.0), (1.0, 1.0, 1.0));
    assert!(matches!(InterpEngine::new(bad_grid, RunConfig::default()), Err(GridError::InvalidGeometry(_))));

    let no_threads = RunConfig { n_threads: 0, ..Default::default() };
    assert!(matches!(InterpEngine::new(flat_grid(5, 1.0, vec![0.0]), no_threads), Err(GridError::Config(_))));

    let missing_field = RunConfig { fields: vec![FieldSpec::continuous("ZDR")], ..Default::default() };
    let mut engine = InterpEngine::new(flat_grid(5, 1.0, vec![0.0]), missing_field).expect("Failed to create engine");
    let result = engine.interp_volume(&ring_volume(20, 1.0));
    assert!(matches!(result, Err(GridError::FieldNotFound(ref name)) if name == "ZDR"));
    assert!(matches!(engine.interp_field(&ring_volume(20, 1.0), "KDP"), Err(GridError::FieldNotFound(_))));
}

struct FailingMapper;

impl GeometryMapper for FailingMapper {
    fn strategy(&self) -> Strategy {
        Strategy::Cartesian
    }

    fn locate(&self, cell: CellIndex, _ctx: &MapContext) -> GridLoc {
        if cell.ix == 3 && cell.iy == 3 {
            panic!("bad cell {:?}", cell);
        }
        GridLoc::missing()
    }
}

#[test]
fn test_worker_panic_fails_the_run() {
    init_logging();
    let config = RunConfig { n_threads: 2, ..Default::default() };
    let mut engine = InterpEngine::with_mapper(flat_grid(7, 1.0, vec![0.0]), config, Arc::new(FailingMapper))
        .expect("Failed to create engine");

    let result = engine.interp_volume(&ring_volume(20, 1.0));
    assert!(matches!(result, Err(GridError::WorkerFailed(_))));
    assert!(engine.grid_locs().is_none(), "no partial GridLoc table after a failure");
}

#[test]
fn test_min_valid_threshold() {
    init_logging();
    let vol = ring_volume(40, 2.0);
    let config = RunConfig { n_threads: 2, min_valid_for_interp: 9, ..Default::default() };
    let mut engine = InterpEngine::new(flat_grid(9, 1.0, vec![0.0]), config).expect("Failed to create engine");
    let dbz = engine.interp_field(&vol, "DBZ").expect("Failed to grid field");
    // at most 8 contributors per cell
    assert!(dbz.data.iter().all(|&v| v == MISSING_VALUE));
}

#[test]
fn test_folded_and_discrete_fields() {
    init_logging();
    // VEL alternates across the fold between neighbouring rays, PID alternates 1/3
    let rays = (0..360)
        .map(|az| {
            let vel = if az % 2 == 0 { 9.5_f32 } else { -9.5 };
            let pid = if az % 2 == 0 { 1.0_f32 } else { 3.0 };
            ray(az as f64, 0.0, 0.25, 0.25, vec![vec![vel; 60], vec![pid; 60]])
        })
        .collect();
    let vol = volume(rays, &["VEL", "PID"]);

    let config = RunConfig {
        n_threads: 2,
        kernel: InterpKernel::Linear,
        fields: vec![FieldSpec::folded("VEL", -10.0, 10.0), FieldSpec::discrete("PID")],
        ..Default::default()
    };
    let mut engine = InterpEngine::new(flat_grid(11, 1.0, vec![0.0]), config).expect("Failed to create engine");
    let gridded = engine.interp_volume(&vol).expect("Failed to grid volume");

    let vel = gridded.field("VEL").expect("VEL missing from output");
    for &v in vel.data.iter().filter(|&&v| v != MISSING_VALUE) {
        assert!(v.abs() >= 9.0, "folded mean {} collapsed towards zero", v);
    }

    let pid = gridded.field("PID").expect("PID missing from output");
    assert!(pid.data.iter().all(|&v| v == 1.0 || v == 3.0 || v == MISSING_VALUE));
    assert!(pid.valid_count() > 0);

    assert!(gridded.start_time.is_some());
    assert!(gridded.start_time <= gridded.end_time);
}
