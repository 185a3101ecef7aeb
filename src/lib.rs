//! radgrid: multi-threaded interpolation of polar radar volumes
//!
//! Remaps a volume of radar rays (azimuth, elevation, range gates) onto a
//! structured grid: 3-D Cartesian (flat or lat/lon), per-sweep PPI, native
//! polar, point-cloud style "reorder" grids, or a lat/lon grid about a
//! satellite-style sensor.
//!
//! Work is split into two passes run on a fixed pool of worker threads.
//! GRID_LOC finds, for every output cell, the radar gates that contribute
//! to it and their weights. INTERP then fills each field from that table.
//! The output grid is divided into disjoint planes so no two threads ever
//! write the same cell.

pub mod core;
pub mod types;

// Re-export main types and functions for easier access
pub use types::{
    GridError, GridGeometry, GridResult, GriddedVolume, OutputGrid, ProjectionKind, RadarSite, Ray, Volume,
    MISSING_VALUE,
};

pub use crate::core::{FieldSpec, FoldLimits, InterpEngine, InterpKernel, RunConfig, SlabScheme, Strategy};
