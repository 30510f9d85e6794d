//! Structure of Arrays (`SoA`) output container.
//!
//! `ClusterBatch` stores cluster records in parallel vectors rather than an
//! array of structs, for consumers that scan one quantity over many clusters.
//! Every record field has a column; the variable-length member cell lists
//! share one flat buffer addressed through `cell_ends`.

use crate::cell::CellCoord;
use crate::record::{ClusterRecord, ClusterSink, DetectorId};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A batch of clusters stored in Structure of Arrays (`SoA`) format.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ClusterBatch {
    /// Detector plane labels.
    pub detector: Vec<u32>,
    /// Module labels.
    pub module: Vec<u32>,
    /// Cluster ids.
    pub cluster_id: Vec<u32>,
    /// Centroid first coordinates.
    pub x: Vec<f64>,
    /// Centroid second coordinates.
    pub y: Vec<f64>,
    /// Plane positions.
    pub z: Vec<f64>,
    /// Summed energies.
    pub energy: Vec<f64>,
    /// Member cell counts.
    pub ncell: Vec<u32>,
    /// Radial widths.
    pub rc: Vec<f64>,
    /// Major principal widths.
    pub sigma_major: Vec<f64>,
    /// Minor principal widths.
    pub sigma_minor: Vec<f64>,
    /// Centroid lattice index along the first axis.
    pub lattice_i: Vec<f64>,
    /// Centroid lattice index along the second axis.
    pub lattice_j: Vec<f64>,
    /// Non-converged split flags.
    pub approximate: Vec<bool>,
    /// Recorded member cells of all rows, back to back.
    pub cells: Vec<CellCoord>,
    /// End offset into `cells` for each row.
    pub cell_ends: Vec<usize>,
}

impl ClusterBatch {
    /// Creates a new empty batch with specified capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            detector: Vec::with_capacity(capacity),
            module: Vec::with_capacity(capacity),
            cluster_id: Vec::with_capacity(capacity),
            x: Vec::with_capacity(capacity),
            y: Vec::with_capacity(capacity),
            z: Vec::with_capacity(capacity),
            energy: Vec::with_capacity(capacity),
            ncell: Vec::with_capacity(capacity),
            rc: Vec::with_capacity(capacity),
            sigma_major: Vec::with_capacity(capacity),
            sigma_minor: Vec::with_capacity(capacity),
            lattice_i: Vec::with_capacity(capacity),
            lattice_j: Vec::with_capacity(capacity),
            approximate: Vec::with_capacity(capacity),
            cells: Vec::new(),
            cell_ends: Vec::with_capacity(capacity),
        }
    }

    /// Returns the number of clusters in the batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.x.len()
    }

    /// Returns true if the batch is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Clears all vectors in the batch.
    pub fn clear(&mut self) {
        self.detector.clear();
        self.module.clear();
        self.cluster_id.clear();
        self.x.clear();
        self.y.clear();
        self.z.clear();
        self.energy.clear();
        self.ncell.clear();
        self.rc.clear();
        self.sigma_major.clear();
        self.sigma_minor.clear();
        self.lattice_i.clear();
        self.lattice_j.clear();
        self.approximate.clear();
        self.cells.clear();
        self.cell_ends.clear();
    }

    /// Appends all clusters from another batch to this one.
    pub fn append(&mut self, other: &ClusterBatch) {
        self.detector.extend_from_slice(&other.detector);
        self.module.extend_from_slice(&other.module);
        self.cluster_id.extend_from_slice(&other.cluster_id);
        self.x.extend_from_slice(&other.x);
        self.y.extend_from_slice(&other.y);
        self.z.extend_from_slice(&other.z);
        self.energy.extend_from_slice(&other.energy);
        self.ncell.extend_from_slice(&other.ncell);
        self.rc.extend_from_slice(&other.rc);
        self.sigma_major.extend_from_slice(&other.sigma_major);
        self.sigma_minor.extend_from_slice(&other.sigma_minor);
        self.lattice_i.extend_from_slice(&other.lattice_i);
        self.lattice_j.extend_from_slice(&other.lattice_j);
        self.approximate.extend_from_slice(&other.approximate);
        let offset = self.cells.len();
        self.cells.extend_from_slice(&other.cells);
        self.cell_ends.extend(other.cell_ends.iter().map(|&end| end + offset));
    }

    /// Recorded member cells of one row.
    ///
    /// # Panics
    /// Panics if `row` is out of bounds.
    #[must_use]
    pub fn cells_of(&self, row: usize) -> &[CellCoord] {
        let start = if row == 0 { 0 } else { self.cell_ends[row - 1] };
        &self.cells[start..self.cell_ends[row]]
    }

    /// Rebuilds the full record of one row, or `None` if out of bounds.
    #[must_use]
    pub fn record(&self, row: usize) -> Option<ClusterRecord> {
        if row >= self.len() {
            return None;
        }
        Some(ClusterRecord {
            detector: DetectorId::new(self.detector[row], self.module[row]),
            cluster_id: self.cluster_id[row],
            x: self.x[row],
            y: self.y[row],
            z: self.z[row],
            energy: self.energy[row],
            ncell: self.ncell[row],
            rc: self.rc[row],
            sigma_major: self.sigma_major[row],
            sigma_minor: self.sigma_minor[row],
            lattice_position: (self.lattice_i[row], self.lattice_j[row]),
            approximate: self.approximate[row],
            cells: self.cells_of(row).to_vec(),
        })
    }

    /// Total energy over all clusters in the batch.
    #[must_use]
    pub fn total_energy(&self) -> f64 {
        self.energy.iter().sum()
    }
}

impl ClusterSink for ClusterBatch {
    fn push_cluster(&mut self, record: ClusterRecord) {
        self.detector.push(record.detector.detector);
        self.module.push(record.detector.module);
        self.cluster_id.push(record.cluster_id);
        self.x.push(record.x);
        self.y.push(record.y);
        self.z.push(record.z);
        self.energy.push(record.energy);
        self.ncell.push(record.ncell);
        self.rc.push(record.rc);
        self.sigma_major.push(record.sigma_major);
        self.sigma_minor.push(record.sigma_minor);
        self.lattice_i.push(record.lattice_position.0);
        self.lattice_j.push(record.lattice_position.1);
        self.approximate.push(record.approximate);
        self.cells.extend_from_slice(&record.cells);
        self.cell_ends.push(self.cells.len());
    }
}
