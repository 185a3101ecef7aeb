use crate::core::params::Strategy;
use crate::types::{GridGeometry, Volume};
use std::ops::Range;

/// Maximum contributors kept per output cell
pub const MAX_CONTRIBUTORS: usize = 8;

/// One radar gate contributing to an output cell
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Contribution {
    pub ray: u32,
    pub gate: u32,
    pub weight: f32,
}

/// Contributors for one output cell, weights summing to 1 and sorted by
/// descending weight (ties by ray, then gate). Empty means missing.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GridLoc {
    entries: [Contribution; MAX_CONTRIBUTORS],
    len: u8,
}

impl GridLoc {
    pub fn missing() -> Self {
        Self::default()
    }

    /// Build from raw (ray, gate, weight) triples. Non-positive and
    /// non-finite weights are dropped, the rest are sorted, truncated to
    /// capacity and normalized.
    pub fn from_weights(mut items: Vec<(u32, u32, f64)>) -> Self {
        items.retain(|&(_, _, w)| w.is_finite() && w > 0.0);
        items.sort_by(|a, b| b.2.total_cmp(&a.2).then(a.0.cmp(&b.0)).then(a.1.cmp(&b.1)));
        items.truncate(MAX_CONTRIBUTORS);

        let total: f64 = items.iter().map(|&(_, _, w)| w).sum();
        let mut loc = Self::default();
        if total <= 0.0 {
            return loc;
        }
        for (slot, &(ray, gate, w)) in loc.entries.iter_mut().zip(items.iter()) {
            *slot = Contribution { ray, gate, weight: (w / total) as f32 };
        }
        loc.len = items.len() as u8;
        loc
    }

    pub fn is_missing(&self) -> bool {
        self.len == 0
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn contributions(&self) -> &[Contribution] {
        &self.entries[..self.len as usize]
    }
}

/// Index of one output cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellIndex {
    pub ix: usize,
    pub iy: usize,
    pub iz: usize,
}

/// Unit of work handed to a thread
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Plane {
    /// One (y, z) row of nx cells
    Row { iz: usize, iy: usize },
    /// One whole z level of nx * ny cells
    Level { iz: usize },
}

impl Plane {
    /// Flat (z, y, x) index range covered by this plane
    pub fn cell_range(&self, geometry: &GridGeometry) -> Range<usize> {
        match *self {
            Plane::Row { iz, iy } => {
                let start = geometry.flat_index(0, iy, iz);
                start..start + geometry.nx
            }
            Plane::Level { iz } => {
                let start = geometry.flat_index(0, 0, iz);
                start..start + geometry.n_points_plane()
            }
        }
    }

    pub fn n_cells(&self, geometry: &GridGeometry) -> usize {
        self.cell_range(geometry).len()
    }

    /// Cells of the plane in flat index order
    pub fn cells<'a>(&self, geometry: &'a GridGeometry) -> impl Iterator<Item = CellIndex> + 'a {
        let (iz, rows) = match *self {
            Plane::Row { iz, iy } => (iz, iy..iy + 1),
            Plane::Level { iz } => (iz, 0..geometry.ny),
        };
        let nx = geometry.nx;
        rows.flat_map(move |iy| (0..nx).map(move |ix| CellIndex { ix, iy, iz }))
    }
}

/// Granularity of the planes a mapper works on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaneKind {
    Row,
    Level,
}

impl PlaneKind {
    /// All planes of the grid, in flat index order
    pub fn planes(&self, geometry: &GridGeometry) -> Vec<Plane> {
        match self {
            PlaneKind::Row => (0..geometry.nz)
                .flat_map(|iz| (0..geometry.ny).map(move |iy| Plane::Row { iz, iy }))
                .collect(),
            PlaneKind::Level => (0..geometry.nz).map(|iz| Plane::Level { iz }).collect(),
        }
    }
}

/// GridLocs for every cell of a grid, tied to the ray geometry they were
/// computed from
#[derive(Debug, Clone)]
pub struct GridLocTable {
    geometry_key: u64,
    /// Gate count of every ray, checked alongside the key on reuse
    ray_gates: Vec<usize>,
    strategy: Strategy,
    locs: Vec<GridLoc>,
}

impl GridLocTable {
    pub fn new(volume: &Volume, strategy: Strategy, locs: Vec<GridLoc>) -> Self {
        Self {
            geometry_key: volume.geometry_key(),
            ray_gates: volume.rays().iter().map(|r| r.n_gates()).collect(),
            strategy,
            locs,
        }
    }

    pub fn geometry_key(&self) -> u64 {
        self.geometry_key
    }

    /// Whether this table can be reused for a volume with the given
    /// geometry key. The ray layout is compared too, so a key collision
    /// cannot hand back a table for different rays.
    pub fn matches(&self, geometry_key: u64, volume: &Volume) -> bool {
        self.geometry_key == geometry_key
            && self.ray_gates.len() == volume.n_rays()
            && self.ray_gates.iter().zip(volume.rays()).all(|(&n, ray)| n == ray.n_gates())
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub fn locs(&self) -> &[GridLoc] {
        &self.locs
    }

    pub fn get(&self, index: usize) -> Option<&GridLoc> {
        self.locs.get(index)
    }

    pub fn len(&self) -> usize {
        self.locs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locs.is_empty()
    }

    /// Number of cells with at least one contributor
    pub fn n_located(&self) -> usize {
        self.locs.iter().filter(|l| !l.is_missing()).count()
    }
}
