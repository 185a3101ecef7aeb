//! Core gridding modules

pub mod accumulate;
pub mod dispatcher;
pub mod geometry;
pub mod grid_loc;
pub mod interp;
pub mod mapper;
pub mod params;
pub mod search;
pub mod sync_thread;

// Re-export main types
pub use accumulate::{FieldJob, FieldMode};
pub use dispatcher::{PassContext, SlabData, SlabOutput, Task, TaskDispatcher, TaskKind};
pub use geometry::BeamModel;
pub use grid_loc::{CellIndex, Contribution, GridLoc, GridLocTable, Plane, PlaneKind};
pub use interp::InterpEngine;
pub use mapper::{mapper_for, GeometryMapper, MapContext};
pub use params::{FieldSpec, FoldLimits, InterpKernel, RunConfig, SlabScheme, Strategy};
pub use search::SweepIndex;
pub use sync_thread::{SyncThread, ThreadState};
