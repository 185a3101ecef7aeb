use crate::core::accumulate::{accumulate_cell, AccumulateParams, FieldJob};
use crate::core::grid_loc::{GridLoc, GridLocTable, Plane};
use crate::core::mapper::{GeometryMapper, MapContext};
use crate::core::params::SlabScheme;
use crate::core::sync_thread::SyncThread;
use crate::types::{GridError, GridResult};
use std::sync::Arc;
use std::time::Instant;

/// Phase a task belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    /// Locate contributors for every cell of the slab
    GridLoc,
    /// Fill one field using the GridLoc table; `field` indexes `PassContext::fields`
    Interp { field: usize },
}

/// Read-only inputs for one pass, shared by all of its tasks
pub struct PassContext {
    pub map: MapContext,
    pub mapper: Arc<dyn GeometryMapper>,
    /// Present for INTERP passes
    pub grid_locs: Option<Arc<GridLocTable>>,
    pub fields: Vec<FieldJob>,
    pub accumulate: AccumulateParams,
}

/// Planes owned by one task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slab {
    pub id: usize,
    pub planes: Vec<Plane>,
}

/// Per-plane results, concatenated in slab order
#[derive(Debug, Clone)]
pub enum SlabData {
    GridLocs(Vec<GridLoc>),
    Values(Vec<f32>),
}

/// Finished slab handed back to the engine
#[derive(Debug, Clone)]
pub struct SlabOutput {
    pub slab: usize,
    pub planes: Vec<Plane>,
    pub data: SlabData,
}

/// One unit of work for a worker
pub struct Task {
    pub kind: TaskKind,
    pub slab: Slab,
    pub ctx: Arc<PassContext>,
}

impl Task {
    pub fn execute(self) -> GridResult<SlabOutput> {
        let ctx = &self.ctx;
        let geometry = &ctx.map.geometry;
        let n_cells: usize = self.slab.planes.iter().map(|p| p.n_cells(geometry)).sum();

        let data = match self.kind {
            TaskKind::GridLoc => {
                let mut locs = Vec::with_capacity(n_cells);
                for plane in &self.slab.planes {
                    locs.extend(ctx.mapper.locate_plane(*plane, &ctx.map));
                }
                SlabData::GridLocs(locs)
            }
            TaskKind::Interp { field } => {
                let table = ctx
                    .grid_locs
                    .as_ref()
                    .ok_or_else(|| GridError::Internal("INTERP task without a GridLoc table".to_string()))?;
                let job = ctx
                    .fields
                    .get(field)
                    .ok_or_else(|| GridError::Internal(format!("INTERP task for unknown field {}", field)))?;
                let volume = &ctx.map.volume;

                let mut values = Vec::with_capacity(n_cells);
                for plane in &self.slab.planes {
                    let range = plane.cell_range(geometry);
                    let locs = table.locs().get(range.clone()).ok_or_else(|| {
                        GridError::Internal(format!("GridLoc table too short for cells {:?}", range))
                    })?;
                    values.extend(locs.iter().map(|loc| accumulate_cell(loc, volume, job, &ctx.accumulate)));
                }
                SlabData::Values(values)
            }
        };

        Ok(SlabOutput { slab: self.slab.id, planes: self.slab.planes, data })
    }
}

type Worker = SyncThread<Task, GridResult<SlabOutput>>;

/// Fixed pool of workers driving the GRID_LOC and INTERP passes
pub struct TaskDispatcher {
    workers: Vec<Worker>,
    scheme: SlabScheme,
}

impl TaskDispatcher {
    /// Start `n_threads` workers
    pub fn new(n_threads: usize, scheme: SlabScheme) -> GridResult<Self> {
        if n_threads == 0 {
            return Err(GridError::Config("n_threads must be at least 1".to_string()));
        }

        let mut workers = Vec::with_capacity(n_threads);
        for id in 0..n_threads {
            // workers already started are joined by Drop if a spawn fails
            workers.push(Worker::spawn(&format!("radgrid-worker-{}", id), |task: Task| task.execute())?);
        }

        log::info!("Started {} worker threads ({:?} slabs)", n_threads, scheme);
        Ok(Self { workers, scheme })
    }

    pub fn n_threads(&self) -> usize {
        self.workers.len()
    }

    /// Split plane indices 0..n_planes into n_slabs disjoint groups covering
    /// every plane exactly once. Groups may be empty.
    pub fn partition(n_planes: usize, n_slabs: usize, scheme: SlabScheme) -> Vec<Vec<usize>> {
        let n_slabs = n_slabs.max(1);
        match scheme {
            SlabScheme::Striped => (0..n_slabs)
                .map(|slab| (slab..n_planes).step_by(n_slabs).collect())
                .collect(),
            SlabScheme::Contiguous => {
                let base = n_planes / n_slabs;
                let extra = n_planes % n_slabs;
                let mut start = 0;
                (0..n_slabs)
                    .map(|slab| {
                        let len = base + usize::from(slab < extra);
                        let group = (start..start + len).collect();
                        start += len;
                        group
                    })
                    .collect()
            }
        }
    }

    /// Run one pass over the given planes and wait for every slab. All
    /// dispatched workers are drained before the first failure is returned.
    pub fn run_pass(&self, kind: TaskKind, planes: &[Plane], ctx: &Arc<PassContext>) -> GridResult<Vec<SlabOutput>> {
        let start_time = Instant::now();
        let slabs = Self::partition(planes.len(), self.workers.len(), self.scheme);

        let mut dispatched = Vec::with_capacity(self.workers.len());
        for (id, (worker, plane_ids)) in self.workers.iter().zip(slabs).enumerate() {
            if plane_ids.is_empty() {
                continue;
            }
            let slab = Slab { id, planes: plane_ids.iter().map(|&i| planes[i]).collect() };
            worker.wait_to_be_available();
            worker.signal_work_to_start(Task { kind, slab, ctx: Arc::clone(ctx) });
            dispatched.push(worker);
        }

        let mut outputs = Vec::with_capacity(dispatched.len());
        let mut first_error = None;
        for worker in dispatched {
            match worker.wait_for_work_to_complete() {
                Ok(Ok(output)) => outputs.push(output),
                Ok(Err(e)) => {
                    log::error!("{} failed: {}", worker.name(), e);
                    first_error.get_or_insert(e);
                }
                Err(message) => {
                    log::error!("{} panicked: {}", worker.name(), message);
                    first_error.get_or_insert(GridError::WorkerFailed(format!("{}: {}", worker.name(), message)));
                }
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }

        log::debug!(
            "{:?} pass over {} planes finished in {:.3}s",
            kind,
            planes.len(),
            start_time.elapsed().as_secs_f64()
        );
        Ok(outputs)
    }

    /// Stop and join every worker
    pub fn shutdown(mut self) -> GridResult<()> {
        self.stop_workers()
    }

    fn stop_workers(&mut self) -> GridResult<()> {
        let mut result = Ok(());
        for worker in &mut self.workers {
            if let Err(e) = worker.shutdown() {
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }
        if !self.workers.is_empty() {
            log::debug!("Stopped {} worker threads", self.workers.len());
        }
        self.workers.clear();
        result
    }
}

impl Drop for TaskDispatcher {
    fn drop(&mut self) {
        if let Err(e) = self.stop_workers() {
            log::warn!("Worker shutdown failed: {}", e);
        }
    }
}
