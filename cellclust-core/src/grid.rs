//! Energy maps and the pre-sized cell grid a clustering pass works on.
#![allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap, clippy::cast_sign_loss)]

use crate::cell::{CellCoord, Lattice};
use crate::error::ClusteringError;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Per-cell energies of one detector module.
///
/// Stored flat with the second axis contiguous: cell `(i, j)` lives at
/// `i * height + j`.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EnergyMap {
    width: usize,
    height: usize,
    energies: Vec<f64>,
}

impl EnergyMap {
    /// Creates an all-zero map.
    #[must_use]
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            energies: vec![0.0; width * height],
        }
    }

    /// Wraps a flat energy buffer.
    ///
    /// # Errors
    /// Returns [`ClusteringError::DimensionMismatch`] if the buffer length
    /// is not `width * height`.
    pub fn from_vec(
        width: usize,
        height: usize,
        energies: Vec<f64>,
    ) -> Result<Self, ClusteringError> {
        if energies.len() != width * height {
            return Err(ClusteringError::DimensionMismatch {
                width,
                height,
                len: energies.len(),
            });
        }
        Ok(Self {
            width,
            height,
            energies,
        })
    }

    /// Builds a map from rows indexed by `i`, each holding the cells along `j`.
    ///
    /// # Errors
    /// Returns [`ClusteringError::RaggedRows`] if the rows differ in length.
    pub fn from_rows<R: AsRef<[f64]>>(rows: &[R]) -> Result<Self, ClusteringError> {
        let height = rows.first().map_or(0, |row| row.as_ref().len());
        let mut energies = Vec::with_capacity(rows.len() * height);
        for (row, values) in rows.iter().enumerate() {
            let values = values.as_ref();
            if values.len() != height {
                return Err(ClusteringError::RaggedRows {
                    row,
                    len: values.len(),
                    expected: height,
                });
            }
            energies.extend_from_slice(values);
        }
        Ok(Self {
            width: rows.len(),
            height,
            energies,
        })
    }

    /// Extent along the first axis.
    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Extent along the second axis.
    #[must_use]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Energy of cell `(i, j)`, or `None` outside the map.
    #[must_use]
    pub fn get(&self, i: usize, j: usize) -> Option<f64> {
        if i < self.width && j < self.height {
            Some(self.energies[i * self.height + j])
        } else {
            None
        }
    }

    /// Sets the energy of cell `(i, j)`. Writes outside the map are ignored.
    pub fn set(&mut self, i: usize, j: usize, energy: f64) {
        if i < self.width && j < self.height {
            self.energies[i * self.height + j] = energy;
        }
    }

    /// Raw flat buffer.
    #[must_use]
    pub fn as_slice(&self) -> &[f64] {
        &self.energies
    }
}

/// Outcome of copying an [`EnergyMap`] into a [`CellGrid`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Cells with positive energy lying outside the grid capacity.
    pub dropped_cells: usize,
    /// Cells whose energy was negative or not finite (loaded as zero).
    pub invalid_cells: usize,
}

/// Fixed-capacity working grid for one clustering pass.
///
/// Buffers are sized once for the capacity and reused; cell positions are
/// computed at construction and never change. Cell `(i, j)` is addressed by
/// the index `i * capacity_height + j`.
#[derive(Debug, Clone)]
pub struct CellGrid {
    lattice: Lattice,
    capacity_width: usize,
    capacity_height: usize,
    width: usize,
    height: usize,
    energy: Vec<f64>,
    x: Vec<f64>,
    y: Vec<f64>,
    supercluster: Vec<i32>,
    cluster: Vec<i32>,
    seed: Vec<bool>,
}

impl CellGrid {
    /// Allocates a grid of `capacity_width * capacity_height` cells.
    #[must_use]
    pub fn new(lattice: Lattice, pitch: f64, capacity_width: usize, capacity_height: usize) -> Self {
        let n = capacity_width * capacity_height;
        let mut x = Vec::with_capacity(n);
        let mut y = Vec::with_capacity(n);
        for i in 0..capacity_width {
            for j in 0..capacity_height {
                let (px, py) = lattice.position(i as u16, j as u16, pitch);
                x.push(px);
                y.push(py);
            }
        }
        Self {
            lattice,
            capacity_width,
            capacity_height,
            width: 0,
            height: 0,
            energy: vec![0.0; n],
            x,
            y,
            supercluster: vec![-1; n],
            cluster: vec![-1; n],
            seed: vec![false; n],
        }
    }

    /// Copies a module's energies in, clipping to the capacity.
    ///
    /// Any previous contents are cleared first.
    pub fn load(&mut self, map: &EnergyMap) -> LoadReport {
        self.load_cells(map.width(), map.height(), map.as_slice())
    }

    /// Copies a flat `width x height` buffer indexed `i * height + j`,
    /// clipping to the capacity.
    ///
    /// Any previous contents are cleared first. Values past the end of a
    /// short buffer read as empty cells.
    pub fn load_cells(&mut self, width: usize, height: usize, energies: &[f64]) -> LoadReport {
        self.clear();
        let mut report = LoadReport::default();
        self.width = width.min(self.capacity_width);
        self.height = height.min(self.capacity_height);

        for i in 0..width {
            for j in 0..height {
                let raw = energies.get(i * height + j).copied().unwrap_or(0.0);
                let energy = if raw.is_finite() && raw >= 0.0 {
                    raw
                } else {
                    report.invalid_cells += 1;
                    0.0
                };
                if i < self.width && j < self.height {
                    let idx = self.index(i, j);
                    self.energy[idx] = energy;
                } else if energy > 0.0 {
                    report.dropped_cells += 1;
                }
            }
        }
        report
    }

    /// Resets every cell of the active region and empties it.
    pub fn clear(&mut self) {
        for i in 0..self.width {
            let start = i * self.capacity_height;
            let end = start + self.height;
            self.energy[start..end].fill(0.0);
            self.supercluster[start..end].fill(-1);
            self.cluster[start..end].fill(-1);
            self.seed[start..end].fill(false);
        }
        self.width = 0;
        self.height = 0;
    }

    /// Lattice the grid was built for.
    #[must_use]
    pub fn lattice(&self) -> Lattice {
        self.lattice
    }

    /// Number of cells the grid can hold.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.energy.len()
    }

    /// Active extent `(width, height)` of the loaded module.
    #[must_use]
    pub fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    /// Flat index of cell `(i, j)`.
    #[inline]
    #[must_use]
    pub fn index(&self, i: usize, j: usize) -> usize {
        i * self.capacity_height + j
    }

    /// Coordinate of the cell at a flat index.
    #[inline]
    #[must_use]
    pub fn coord(&self, idx: usize) -> CellCoord {
        CellCoord::new(
            (idx / self.capacity_height) as u16,
            (idx % self.capacity_height) as u16,
        )
    }

    /// Flat indices of the active region, in index order.
    pub fn active_indices(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.width).flat_map(move |i| {
            let start = i * self.capacity_height;
            start..start + self.height
        })
    }

    /// Energy of a cell.
    #[inline]
    #[must_use]
    pub fn energy(&self, idx: usize) -> f64 {
        self.energy[idx]
    }

    /// All cell energies, addressed by flat index.
    #[must_use]
    pub fn energies(&self) -> &[f64] {
        &self.energy
    }

    /// Physical centre of a cell.
    #[inline]
    #[must_use]
    pub fn position(&self, idx: usize) -> (f64, f64) {
        (self.x[idx], self.y[idx])
    }

    /// Supercluster id of a cell, -1 if none.
    #[inline]
    #[must_use]
    pub fn supercluster_of(&self, idx: usize) -> i32 {
        self.supercluster[idx]
    }

    /// Assigns a cell to a supercluster.
    #[inline]
    pub fn set_supercluster(&mut self, idx: usize, id: i32) {
        self.supercluster[idx] = id;
    }

    /// Final cluster id of a cell, -1 if none.
    #[inline]
    #[must_use]
    pub fn cluster_of(&self, idx: usize) -> i32 {
        self.cluster[idx]
    }

    /// Assigns a cell to a final cluster.
    #[inline]
    pub fn set_cluster(&mut self, idx: usize, id: i32) {
        self.cluster[idx] = id;
    }

    /// Whether the cell anchors its cluster.
    #[inline]
    #[must_use]
    pub fn is_seed(&self, idx: usize) -> bool {
        self.seed[idx]
    }

    /// Marks or unmarks a cell as a cluster seed.
    #[inline]
    pub fn set_seed(&mut self, idx: usize, seed: bool) {
        self.seed[idx] = seed;
    }

    /// Neighbours of a cell inside the active region.
    ///
    /// The iterator does not borrow the grid, so cells can be relabelled
    /// while walking it.
    #[must_use]
    pub fn neighbours(&self, idx: usize) -> Neighbours {
        Neighbours {
            i: (idx / self.capacity_height) as i32,
            j: (idx % self.capacity_height) as i32,
            width: self.width as i32,
            height: self.height as i32,
            stride: self.capacity_height,
            offsets: self.lattice.offsets().iter(),
        }
    }
}

/// Iterator over the in-bounds neighbours of one cell.
#[derive(Debug, Clone)]
pub struct Neighbours {
    i: i32,
    j: i32,
    width: i32,
    height: i32,
    stride: usize,
    offsets: std::slice::Iter<'static, (i32, i32)>,
}

impl Iterator for Neighbours {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        for &(di, dj) in self.offsets.by_ref() {
            let ni = self.i + di;
            let nj = self.j + dj;
            if ni >= 0 && nj >= 0 && ni < self.width && nj < self.height {
                return Some(ni as usize * self.stride + nj as usize);
            }
        }
        None
    }
}
