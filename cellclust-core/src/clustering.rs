//! Clustering configuration, statistics and state traits.

use crate::cell::Lattice;
use crate::error::ConfigError;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Default per-cell energy cutoff.
pub const DEFAULT_EDEP_CUT: f64 = 0.0;
/// Default grid capacity along the first axis.
pub const DEFAULT_MAX_WIDTH: usize = 119;
/// Default grid capacity along the second axis.
pub const DEFAULT_MAX_HEIGHT: usize = 96;
/// Default cluster table capacity per pass.
pub const DEFAULT_MAX_CLUSTERS: usize = 5000;
/// Default cap on refinement sweeps per supercluster.
pub const DEFAULT_MAX_REFINE_ITERATIONS: usize = 32;

/// Configuration for a clustering pass.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ClusteringConfig {
    /// Minimum cell energy to take part in clustering (strictly greater).
    pub edep_cut: f64,
    /// Raises the cutoff to `mean positive energy * fraction` when that is
    /// larger than `edep_cut`. Zero disables it.
    pub adaptive_cut_fraction: f64,
    /// Cell layout and adjacency.
    pub lattice: Lattice,
    /// Centre-to-centre distance of neighbouring cells.
    pub cell_pitch: f64,
    /// Position of the module plane along the beam axis.
    pub plane_z: f64,
    /// Grid capacity along the first axis.
    pub max_width: usize,
    /// Grid capacity along the second axis.
    pub max_height: usize,
    /// Maximum number of cells grown into one supercluster.
    pub max_supercluster_cells: usize,
    /// Maximum number of clusters kept per pass.
    pub max_clusters: usize,
    /// Maximum reassignment sweeps when splitting a supercluster.
    pub max_refine_iterations: usize,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            edep_cut: DEFAULT_EDEP_CUT,
            adaptive_cut_fraction: 0.0,
            lattice: Lattice::Hexagonal,
            cell_pitch: 1.0,
            plane_z: 0.0,
            max_width: DEFAULT_MAX_WIDTH,
            max_height: DEFAULT_MAX_HEIGHT,
            max_supercluster_cells: DEFAULT_MAX_WIDTH * DEFAULT_MAX_HEIGHT,
            max_clusters: DEFAULT_MAX_CLUSTERS,
            max_refine_iterations: DEFAULT_MAX_REFINE_ITERATIONS,
        }
    }
}

impl ClusteringConfig {
    /// Creates a new clustering configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the per-cell energy cutoff.
    #[must_use]
    pub fn with_edep_cut(mut self, cut: f64) -> Self {
        self.edep_cut = cut;
        self
    }

    /// Sets the adaptive cutoff fraction.
    #[must_use]
    pub fn with_adaptive_cut_fraction(mut self, fraction: f64) -> Self {
        self.adaptive_cut_fraction = fraction;
        self
    }

    /// Sets the lattice.
    #[must_use]
    pub fn with_lattice(mut self, lattice: Lattice) -> Self {
        self.lattice = lattice;
        self
    }

    /// Sets the cell pitch.
    #[must_use]
    pub fn with_cell_pitch(mut self, pitch: f64) -> Self {
        self.cell_pitch = pitch;
        self
    }

    /// Sets the module plane position.
    #[must_use]
    pub fn with_plane_z(mut self, z: f64) -> Self {
        self.plane_z = z;
        self
    }

    /// Sets the grid capacity.
    #[must_use]
    pub fn with_grid_capacity(mut self, width: usize, height: usize) -> Self {
        self.max_width = width;
        self.max_height = height;
        self
    }

    /// Sets the supercluster cell cap.
    #[must_use]
    pub fn with_max_supercluster_cells(mut self, cells: usize) -> Self {
        self.max_supercluster_cells = cells;
        self
    }

    /// Sets the cluster table capacity.
    #[must_use]
    pub fn with_max_clusters(mut self, clusters: usize) -> Self {
        self.max_clusters = clusters;
        self
    }

    /// Sets the refinement sweep cap.
    #[must_use]
    pub fn with_max_refine_iterations(mut self, iterations: usize) -> Self {
        self.max_refine_iterations = iterations;
        self
    }

    /// Checks that the configuration can drive a pass.
    ///
    /// # Errors
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_edep_cut(self.edep_cut)?;
        for (name, value) in [
            ("adaptive_cut_fraction", self.adaptive_cut_fraction),
            ("cell_pitch", self.cell_pitch),
            ("plane_z", self.plane_z),
        ] {
            if !value.is_finite() {
                return Err(ConfigError::NonFinite { name, value });
            }
        }
        if self.adaptive_cut_fraction < 0.0 {
            return Err(ConfigError::NotPositive {
                name: "adaptive_cut_fraction",
                value: self.adaptive_cut_fraction,
            });
        }
        if self.cell_pitch <= 0.0 {
            return Err(ConfigError::NotPositive {
                name: "cell_pitch",
                value: self.cell_pitch,
            });
        }
        if self.max_width == 0 || self.max_height == 0 {
            return Err(ConfigError::EmptyGrid {
                width: self.max_width,
                height: self.max_height,
            });
        }
        let coord_limit = usize::from(u16::MAX) + 1;
        if self.max_width > coord_limit || self.max_height > coord_limit {
            return Err(ConfigError::GridTooLarge {
                width: self.max_width,
                height: self.max_height,
            });
        }
        if self.max_supercluster_cells == 0 {
            return Err(ConfigError::ZeroCapacity("max_supercluster_cells"));
        }
        if self.max_clusters == 0 {
            return Err(ConfigError::ZeroCapacity("max_clusters"));
        }
        if self.max_refine_iterations == 0 {
            return Err(ConfigError::ZeroCapacity("max_refine_iterations"));
        }
        Ok(())
    }
}

/// Checks a per-cell energy cutoff.
///
/// # Errors
/// Returns [`ConfigError::NonFinite`] or [`ConfigError::NegativeCutoff`].
pub fn validate_edep_cut(cut: f64) -> Result<(), ConfigError> {
    if !cut.is_finite() {
        return Err(ConfigError::NonFinite {
            name: "edep_cut",
            value: cut,
        });
    }
    if cut < 0.0 {
        return Err(ConfigError::NegativeCutoff(cut));
    }
    Ok(())
}

/// Diagnostics gathered during one clustering pass.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ClusteringStatistics {
    /// Cells with positive energy inside the grid.
    pub cells_loaded: usize,
    /// Cells above the effective cutoff.
    pub cells_above_cutoff: usize,
    /// Cutoff actually applied (after the adaptive adjustment).
    pub effective_cutoff: f64,
    /// Superclusters built.
    pub superclusters_found: usize,
    /// Superclusters whose growth hit the cell cap.
    pub truncated_superclusters: usize,
    /// Superclusters split without reaching a fixed point.
    pub unconverged_superclusters: usize,
    /// Cluster records emitted.
    pub clusters_found: usize,
    /// Clusters discarded because the cluster table was full.
    pub dropped_clusters: usize,
    /// Positive cells excluded by capacity limits.
    pub dropped_cells: usize,
    /// Cells with negative or non-finite energy, treated as empty.
    pub invalid_cells: usize,
    /// Clusters whose profile fit failed.
    pub failed_fits: usize,
}

impl ClusteringStatistics {
    /// Whether any capacity limit truncated the pass.
    #[must_use]
    pub fn is_truncated(&self) -> bool {
        self.truncated_superclusters > 0 || self.dropped_clusters > 0 || self.dropped_cells > 0
    }

    /// Adds the counts of another pass. The cutoff keeps the larger value.
    pub fn accumulate(&mut self, other: &Self) {
        self.cells_loaded += other.cells_loaded;
        self.cells_above_cutoff += other.cells_above_cutoff;
        self.effective_cutoff = self.effective_cutoff.max(other.effective_cutoff);
        self.superclusters_found += other.superclusters_found;
        self.truncated_superclusters += other.truncated_superclusters;
        self.unconverged_superclusters += other.unconverged_superclusters;
        self.clusters_found += other.clusters_found;
        self.dropped_clusters += other.dropped_clusters;
        self.dropped_cells += other.dropped_cells;
        self.invalid_cells += other.invalid_cells;
        self.failed_fits += other.failed_fits;
    }
}

/// Reusable per-pass working state of a clustering algorithm.
pub trait ClusteringState {
    /// Clears the state for the next pass, keeping allocations.
    fn reset(&mut self);
}
