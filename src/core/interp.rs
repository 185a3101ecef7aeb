use crate::core::accumulate::{AccumulateParams, FieldJob};
use crate::core::dispatcher::{PassContext, SlabData, SlabOutput, TaskDispatcher, TaskKind};
use crate::core::grid_loc::{GridLoc, GridLocTable, Plane};
use crate::core::mapper::{mapper_for, GeometryMapper, MapContext};
use crate::core::params::RunConfig;
use crate::core::search::SweepIndex;
use crate::types::{GridError, GridGeometry, GridResult, GriddedVolume, OutputGrid, Volume};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

/// GridLoc table plus the search index it was built from
struct GridLocCache {
    sweeps: Arc<SweepIndex>,
    table: Arc<GridLocTable>,
}

/// Interpolates radar volumes onto one output grid.
///
/// The worker pool is created once and reused for every volume. The GridLoc
/// table is recomputed only when a volume's ray geometry differs from the
/// previous one.
pub struct InterpEngine {
    geometry: Arc<GridGeometry>,
    config: Arc<RunConfig>,
    mapper: Arc<dyn GeometryMapper>,
    dispatcher: TaskDispatcher,
    cache: Option<GridLocCache>,
}

impl InterpEngine {
    /// Validate the grid and configuration, then start the worker pool
    pub fn new(geometry: GridGeometry, config: RunConfig) -> GridResult<Self> {
        let mapper = mapper_for(config.strategy);
        Self::with_mapper(geometry, config, mapper)
    }

    /// As [`InterpEngine::new`], with a caller-supplied mapper
    pub fn with_mapper(
        geometry: GridGeometry,
        config: RunConfig,
        mapper: Arc<dyn GeometryMapper>,
    ) -> GridResult<Self> {
        geometry.validate()?;
        config.validate()?;
        config.check_projection(geometry.projection)?;

        log::info!(
            "Creating {} engine: {}x{}x{} {} grid, {} threads, {:?} kernel, {:.2} km radius",
            config.strategy,
            geometry.nx,
            geometry.ny,
            geometry.nz,
            geometry.projection,
            config.n_threads,
            config.kernel,
            config.search_radius_km
        );

        let dispatcher = TaskDispatcher::new(config.n_threads, config.slab_scheme)?;
        Ok(Self {
            geometry: Arc::new(geometry),
            config: Arc::new(config),
            mapper,
            dispatcher,
            cache: None,
        })
    }

    pub fn geometry(&self) -> &GridGeometry {
        &self.geometry
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn n_threads(&self) -> usize {
        self.dispatcher.n_threads()
    }

    /// Cached GridLoc table from the last GRID_LOC pass
    pub fn grid_locs(&self) -> Option<&GridLocTable> {
        self.cache.as_ref().map(|c| c.table.as_ref())
    }

    /// Run GRID_LOC (if needed) and one INTERP pass per requested field
    pub fn interp_volume(&mut self, volume: &Arc<Volume>) -> GridResult<GriddedVolume> {
        let start_time = Instant::now();
        let jobs = self.resolve_fields(volume)?;
        self.compute_grid_locs(volume)?;

        let mut fields = Vec::with_capacity(jobs.len());
        for (i, job) in jobs.iter().enumerate() {
            fields.push(self.run_interp(volume, &jobs, i)?);
            log::debug!("Interpolated field {}", job.name);
        }

        log::info!(
            "Gridded {} fields from {} rays in {:.3}s",
            fields.len(),
            volume.n_rays(),
            start_time.elapsed().as_secs_f64()
        );

        Ok(GriddedVolume {
            geometry: (*self.geometry).clone(),
            fields,
            start_time: volume.start_time(),
            end_time: volume.end_time(),
        })
    }

    /// GRID_LOC phase: locate contributors for every cell. Reuses the cached
    /// table when the ray geometry is unchanged.
    pub fn compute_grid_locs(&mut self, volume: &Arc<Volume>) -> GridResult<Arc<GridLocTable>> {
        let key = volume.geometry_key();
        if let Some(cache) = &self.cache {
            if cache.table.matches(key, volume) {
                log::debug!("Ray geometry unchanged, reusing GridLoc table");
                return Ok(Arc::clone(&cache.table));
            }
        }

        let start_time = Instant::now();
        let sweeps = Arc::new(SweepIndex::build(volume, &self.config)?);
        let ctx = Arc::new(PassContext {
            map: self.map_context(volume, &sweeps),
            mapper: Arc::clone(&self.mapper),
            grid_locs: None,
            fields: Vec::new(),
            accumulate: self.accumulate_params(),
        });

        let planes = self.mapper.plane_kind().planes(&self.geometry);
        let outputs = self.dispatcher.run_pass(TaskKind::GridLoc, &planes, &ctx)?;
        let locs = stitch(&self.geometry, planes.len(), outputs, GridLoc::missing(), |data| match data {
            SlabData::GridLocs(locs) => Ok(locs),
            SlabData::Values(_) => Err(GridError::Internal("GRID_LOC slab returned values".to_string())),
        })?;

        let table = Arc::new(GridLocTable::new(volume, self.config.strategy, locs));
        log::info!(
            "GRID_LOC located {} of {} cells in {:.3}s",
            table.n_located(),
            table.len(),
            start_time.elapsed().as_secs_f64()
        );

        self.cache = Some(GridLocCache { sweeps, table: Arc::clone(&table) });
        Ok(table)
    }

    /// INTERP phase for a single field, computing GridLocs first if needed
    pub fn interp_field(&mut self, volume: &Arc<Volume>, field: &str) -> GridResult<OutputGrid> {
        let index = volume
            .field_index(field)
            .ok_or_else(|| GridError::FieldNotFound(field.to_string()))?;
        let spec = self.config.fields.iter().find(|f| f.name == field);
        let jobs = vec![FieldJob::new(field, index, spec)];
        self.compute_grid_locs(volume)?;
        self.run_interp(volume, &jobs, 0)
    }

    /// Stop the worker pool
    pub fn shutdown(self) -> GridResult<()> {
        self.dispatcher.shutdown()
    }

    fn resolve_fields(&self, volume: &Volume) -> GridResult<Vec<FieldJob>> {
        if self.config.fields.is_empty() {
            return Ok(volume
                .field_names()
                .iter()
                .enumerate()
                .map(|(i, name)| FieldJob::new(name, i, None))
                .collect());
        }

        self.config
            .fields
            .iter()
            .map(|spec| {
                volume
                    .field_index(&spec.name)
                    .map(|i| FieldJob::new(&spec.name, i, Some(spec)))
                    .ok_or_else(|| GridError::FieldNotFound(spec.name.clone()))
            })
            .collect()
    }

    fn run_interp(&self, volume: &Arc<Volume>, jobs: &[FieldJob], field: usize) -> GridResult<OutputGrid> {
        let cache = self
            .cache
            .as_ref()
            .ok_or_else(|| GridError::Internal("INTERP requested before GRID_LOC".to_string()))?;

        let ctx = Arc::new(PassContext {
            map: self.map_context(volume, &cache.sweeps),
            mapper: Arc::clone(&self.mapper),
            grid_locs: Some(Arc::clone(&cache.table)),
            fields: jobs.to_vec(),
            accumulate: self.accumulate_params(),
        });

        let planes = self.mapper.plane_kind().planes(&self.geometry);
        let outputs = self.dispatcher.run_pass(TaskKind::Interp { field }, &planes, &ctx)?;
        let values = stitch(&self.geometry, planes.len(), outputs, self.config.missing_value, |data| match data {
            SlabData::Values(values) => Ok(values),
            SlabData::GridLocs(_) => Err(GridError::Internal("INTERP slab returned GridLocs".to_string())),
        })?;

        let name = &jobs[field].name;
        let grid = OutputGrid::from_flat(name, &self.geometry, values, self.config.missing_value)?;
        log::info!("Field {}: {:.1}% of cells valid", name, grid.coverage_percent());
        Ok(grid)
    }

    fn map_context(&self, volume: &Arc<Volume>, sweeps: &Arc<SweepIndex>) -> MapContext {
        MapContext::new(
            Arc::clone(volume),
            Arc::clone(sweeps),
            Arc::clone(&self.geometry),
            Arc::clone(&self.config),
        )
    }

    fn accumulate_params(&self) -> AccumulateParams {
        AccumulateParams {
            kernel: self.config.kernel,
            min_valid: self.config.min_valid_for_interp,
            missing_value: self.config.missing_value,
        }
    }
}

/// Assemble slab results into one flat array, checking that every plane was
/// written exactly once
fn stitch<T, F>(
    geometry: &GridGeometry,
    n_planes: usize,
    outputs: Vec<SlabOutput>,
    fill: T,
    extract: F,
) -> GridResult<Vec<T>>
where
    T: Clone,
    F: Fn(SlabData) -> GridResult<Vec<T>>,
{
    let mut out = vec![fill; geometry.n_points()];
    let mut written: HashSet<Plane> = HashSet::with_capacity(n_planes);

    for output in outputs {
        let data = extract(output.data)?;
        let mut offset = 0;
        for plane in output.planes {
            let range = plane.cell_range(geometry);
            let len = range.len();
            if offset + len > data.len() || range.end > out.len() {
                return Err(GridError::Internal(format!(
                    "slab {} is short for plane {:?}",
                    output.slab, plane
                )));
            }
            if !written.insert(plane) {
                return Err(GridError::Internal(format!("plane {:?} written twice", plane)));
            }
            out[range].clone_from_slice(&data[offset..offset + len]);
            offset += len;
        }
        if offset != data.len() {
            return Err(GridError::Internal(format!(
                "slab {} returned {} cells, expected {}",
                output.slab,
                data.len(),
                offset
            )));
        }
    }

    if written.len() != n_planes {
        return Err(GridError::Internal(format!(
            "{} of {} planes written",
            written.len(),
            n_planes
        )));
    }
    Ok(out)
}
