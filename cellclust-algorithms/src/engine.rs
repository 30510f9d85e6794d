//! Per-module clustering pass.
//!
//! One call to [`CellClustering::cluster_module`] ranks the cells of a
//! module, groups them into superclusters, splits those around their local
//! maxima, fits every resulting cluster and emits one record per cluster in
//! ascending id order.
//!
//! All working buffers live in a [`CellClusteringState`] that is allocated
//! once for the configured capacities and reused by every pass. A pass never
//! grows them; input beyond the capacities is dropped and counted instead.
#![allow(clippy::cast_precision_loss)]

use cellclust_core::clustering::{
    validate_edep_cut, ClusteringConfig, ClusteringState, ClusteringStatistics,
};
use cellclust_core::error::{ClusteringError, ConfigError, Result as CoreResult};
use cellclust_core::grid::{CellGrid, EnergyMap, LoadReport};
use cellclust_core::profile::{gauss_fit, CellSample};
use cellclust_core::record::{ClusterRecord, ClusterSink, DetectorId, MAX_RECORDED_CELLS};

use crate::ranking::order_cells;
use crate::refine::{ClusterTable, Refiner};
use crate::supercluster::{build_superclusters, effective_cutoff, SuperclusterTable};

/// Working state for clustering one module at a time.
pub struct CellClusteringState {
    grid: CellGrid,
    order: Vec<usize>,
    superclusters: SuperclusterTable,
    refiner: Refiner,
    clusters: ClusterTable,
    samples: Vec<CellSample>,
    stats: ClusteringStatistics,
}

impl CellClusteringState {
    /// Allocates buffers for the capacities in `config`.
    #[must_use]
    pub fn new(config: &ClusteringConfig) -> Self {
        let grid = CellGrid::new(
            config.lattice,
            config.cell_pitch,
            config.max_width,
            config.max_height,
        );
        let cells = grid.capacity();
        Self {
            grid,
            order: Vec::with_capacity(cells),
            superclusters: SuperclusterTable::with_capacity(cells),
            refiner: Refiner::with_capacity(config.max_supercluster_cells.min(cells)),
            clusters: ClusterTable::with_capacity(config.max_clusters, cells),
            samples: Vec::with_capacity(cells),
            stats: ClusteringStatistics::default(),
        }
    }

    /// Diagnostics of the most recent pass.
    #[must_use]
    pub fn statistics(&self) -> &ClusteringStatistics {
        &self.stats
    }

    fn release_working(&mut self) {
        self.grid.clear();
        self.order.clear();
        self.superclusters.clear();
        self.clusters.clear();
        self.samples.clear();
    }
}

impl ClusteringState for CellClusteringState {
    fn reset(&mut self) {
        self.release_working();
        self.stats = ClusteringStatistics::default();
    }
}

/// Supercluster building and peak splitting over a cell grid.
#[derive(Clone, Debug, Default)]
pub struct CellClustering {
    config: ClusteringConfig,
}

impl CellClustering {
    /// Create with custom configuration.
    ///
    /// # Errors
    /// Returns a [`ConfigError`] if the configuration is invalid.
    pub fn new(config: ClusteringConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Algorithm name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        "SuperclusterSplit"
    }

    /// Current configuration.
    #[must_use]
    pub fn config(&self) -> &ClusteringConfig {
        &self.config
    }

    /// Per-cell energy cutoff in use.
    #[must_use]
    pub fn edep_cut(&self) -> f64 {
        self.config.edep_cut
    }

    /// Replaces the per-cell energy cutoff for subsequent passes.
    ///
    /// # Errors
    /// Rejects negative or non-finite cutoffs, leaving the old one in place.
    pub fn set_edep_cut(&mut self, cut: f64) -> Result<(), ConfigError> {
        validate_edep_cut(cut)?;
        self.config.edep_cut = cut;
        Ok(())
    }

    /// Allocates a working state matching this configuration.
    #[must_use]
    pub fn create_state(&self) -> CellClusteringState {
        CellClusteringState::new(&self.config)
    }

    /// Diagnostics of the last pass run with `state`.
    #[must_use]
    pub fn statistics(&self, state: &CellClusteringState) -> ClusteringStatistics {
        state.stats.clone()
    }

    /// Clusters one module and appends the records to `sink`.
    ///
    /// Records are emitted in ascending cluster id order. Clusters whose fit
    /// fails are skipped and counted; they never affect other clusters.
    /// Returns the number of records emitted. The working buffers of `state`
    /// are cleared before returning; its statistics describe this pass.
    pub fn cluster_module<S>(
        &self,
        map: &EnergyMap,
        detector: DetectorId,
        state: &mut CellClusteringState,
        sink: &mut S,
    ) -> usize
    where
        S: ClusterSink + ?Sized,
    {
        self.run(map.width(), map.height(), map.as_slice(), detector, state, sink)
    }

    /// Clusters a flat `width x height` energy buffer, indexed `i * height + j`.
    ///
    /// # Errors
    /// Returns [`ClusteringError::DimensionMismatch`] if the
    /// buffer length does not match; `state` is reset and `sink` untouched.
    pub fn cluster_flat<S>(
        &self,
        width: usize,
        height: usize,
        energies: &[f64],
        detector: DetectorId,
        state: &mut CellClusteringState,
        sink: &mut S,
    ) -> CoreResult<usize>
    where
        S: ClusterSink + ?Sized,
    {
        if energies.len() != width * height {
            state.reset();
            let err = ClusteringError::DimensionMismatch {
                width,
                height,
                len: energies.len(),
            };
            log::warn!("{detector:?}: rejected input: {err}");
            return Err(err.into());
        }
        Ok(self.run(width, height, energies, detector, state, sink))
    }

    fn run<S>(
        &self,
        width: usize,
        height: usize,
        energies: &[f64],
        detector: DetectorId,
        state: &mut CellClusteringState,
        sink: &mut S,
    ) -> usize
    where
        S: ClusterSink + ?Sized,
    {
        state.reset();
        let load = state.grid.load_cells(width, height, energies);
        self.run_pass(load, detector, state, sink);
        state.release_working();
        state.stats.clusters_found
    }

    fn run_pass<S>(
        &self,
        load: LoadReport,
        detector: DetectorId,
        state: &mut CellClusteringState,
        sink: &mut S,
    ) where
        S: ClusterSink + ?Sized,
    {
        let CellClusteringState {
            grid,
            order,
            superclusters,
            refiner,
            clusters,
            samples,
            stats,
        } = state;
        let config = &self.config;

        stats.dropped_cells = load.dropped_cells;
        stats.invalid_cells = load.invalid_cells;
        if load.dropped_cells > 0 {
            let (width, height) = (config.max_width, config.max_height);
            log::warn!(
                "{detector:?}: {} cells outside the {width}x{height} grid dropped",
                load.dropped_cells
            );
        }
        if load.invalid_cells > 0 {
            log::warn!(
                "{detector:?}: {} cells with negative or non-finite energy ignored",
                load.invalid_cells
            );
        }

        order_cells(grid, order);
        stats.cells_loaded = order.len();
        let ave = if order.is_empty() {
            0.0
        } else {
            order.iter().map(|&idx| grid.energy(idx)).sum::<f64>() / order.len() as f64
        };
        let cutoff = effective_cutoff(config.edep_cut, ave, config.adaptive_cut_fraction);
        stats.effective_cutoff = cutoff;

        let built = build_superclusters(
            grid,
            order,
            cutoff,
            config.max_supercluster_cells,
            superclusters,
        );
        stats.superclusters_found = built.superclusters;
        stats.cells_above_cutoff = built.cells;
        stats.truncated_superclusters = built.truncated;
        if built.truncated > 0 {
            log::warn!(
                "{detector:?}: {} superclusters reached the {}-cell cap",
                built.truncated,
                config.max_supercluster_cells
            );
        }

        for sc in superclusters.iter() {
            let outcome = refiner.refine(
                grid,
                sc,
                superclusters.members(sc),
                config.max_refine_iterations,
                clusters,
            );
            if !outcome.converged {
                stats.unconverged_superclusters += 1;
                log::warn!(
                    "{detector:?}: supercluster {} did not converge after {} sweeps ({} seeds)",
                    sc.id,
                    outcome.iterations,
                    outcome.seeds
                );
            }
            stats.dropped_clusters += outcome.dropped_clusters;
            stats.dropped_cells += outcome.dropped_cells;
        }
        if stats.dropped_clusters > 0 {
            log::warn!(
                "{detector:?}: cluster table full at {}, {} clusters dropped",
                config.max_clusters,
                stats.dropped_clusters
            );
        }

        for cluster in clusters.iter() {
            let members = clusters.members(cluster);
            samples.clear();
            samples.extend(members.iter().map(|&idx| {
                let (x, y) = grid.position(idx);
                CellSample::new(x, y, grid.energy(idx))
            }));

            let fit = match gauss_fit(samples, config.plane_z) {
                Ok(fit) => fit,
                Err(err) => {
                    stats.failed_fits += 1;
                    log::warn!("{detector:?}: cluster {} skipped: {err}", cluster.id);
                    continue;
                }
            };

            let lattice_position = config.lattice.to_lattice(fit.xc, fit.yc, config.cell_pitch);
            let mut record = ClusterRecord::from_fit(detector, cluster.id, &fit, lattice_position);
            record.approximate = cluster.approximate;
            record.cells.extend(
                members
                    .iter()
                    .take(MAX_RECORDED_CELLS)
                    .map(|&idx| grid.coord(idx)),
            );
            sink.push_cluster(record);
            stats.clusters_found += 1;
        }

        log::debug!(
            "{detector:?}: {} cells above cutoff {cutoff:.3}, {} superclusters, {} clusters",
            stats.cells_above_cutoff,
            stats.superclusters_found,
            stats.clusters_found
        );
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::float_cmp)]
    use super::*;
    use approx::assert_relative_eq;
    use cellclust_core::cell::Lattice;

    fn square(width: usize, height: usize) -> CellClustering {
        CellClustering::new(
            ClusteringConfig::new()
                .with_lattice(Lattice::Square)
                .with_grid_capacity(width, height)
                .with_edep_cut(1.0),
        )
        .unwrap()
    }

    #[test]
    fn test_single_central_cell() {
        let algo = square(3, 3);
        let mut state = algo.create_state();
        let mut map = EnergyMap::new(3, 3);
        map.set(1, 1, 100.0);

        let mut out: Vec<ClusterRecord> = Vec::new();
        let n = algo.cluster_module(&map, DetectorId::new(0, 2), &mut state, &mut out);

        assert_eq!(n, 1);
        let c = &out[0];
        assert_eq!(c.detector, DetectorId::new(0, 2));
        assert_eq!(c.cluster_id, 0);
        assert_eq!((c.x, c.y), (1.0, 1.0));
        assert_eq!(c.energy, 100.0);
        assert_eq!(c.ncell, 1);
        assert_eq!(c.rc, 0.0);
        assert_eq!(c.cells.len(), 1);
        assert_relative_eq!(c.lattice_position.0, 1.0);
    }

    #[test]
    fn test_flat_buffer_length_is_checked() {
        let algo = square(2, 3);
        let mut state = algo.create_state();
        let mut out: Vec<ClusterRecord> = Vec::new();

        let err = algo
            .cluster_flat(2, 3, &[1.0; 5], DetectorId::default(), &mut state, &mut out)
            .unwrap_err();
        assert!(matches!(
            err,
            cellclust_core::Error::Clustering(ClusteringError::DimensionMismatch { len: 5, .. })
        ));
        assert!(out.is_empty());
        assert_eq!(*state.statistics(), ClusteringStatistics::default());

        let n = algo
            .cluster_flat(
                2,
                3,
                &[0.0, 6.0, 0.0, 0.0, 0.0, 0.0],
                DetectorId::default(),
                &mut state,
                &mut out,
            )
            .unwrap();
        assert_eq!(n, 1);
        assert_eq!((out[0].x, out[0].y), (0.0, 1.0));
    }

    #[test]
    fn test_flat_buffer_matches_energy_map() {
        let algo = square(3, 4);
        let energies = [0.0, 9.0, 2.0, 0.0, 0.0, 3.0, 0.0, 0.0, 4.0, 0.0, 0.0, 7.0];
        let map = EnergyMap::from_vec(3, 4, energies.to_vec()).unwrap();
        let detector = DetectorId::new(1, 5);
        let mut state = algo.create_state();

        let mut from_map: Vec<ClusterRecord> = Vec::new();
        algo.cluster_module(&map, detector, &mut state, &mut from_map);
        let from_map_stats = state.statistics().clone();
        let mut from_slice: Vec<ClusterRecord> = Vec::new();
        algo.cluster_flat(3, 4, &energies, detector, &mut state, &mut from_slice).unwrap();

        assert!(!from_map.is_empty());
        assert_eq!(from_slice, from_map);
        assert_eq!(*state.statistics(), from_map_stats);
    }

    #[test]
    fn test_set_edep_cut_validates() {
        let mut algo = CellClustering::default();
        assert_eq!(algo.edep_cut(), 0.0);
        assert!(algo.set_edep_cut(12.5).is_ok());
        assert_eq!(algo.edep_cut(), 12.5);
        assert_eq!(algo.set_edep_cut(-3.0), Err(ConfigError::NegativeCutoff(-3.0)));
        assert_eq!(algo.edep_cut(), 12.5);
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = ClusteringConfig::new().with_grid_capacity(0, 0);
        assert!(CellClustering::new(config).is_err());
    }

    #[test]
    fn test_adaptive_cut_raises_threshold() {
        let config = ClusteringConfig::new()
            .with_lattice(Lattice::Square)
            .with_grid_capacity(1, 4)
            .with_adaptive_cut_fraction(0.5);
        let algo = CellClustering::new(config).unwrap();
        let mut state = algo.create_state();
        // Mean positive energy 10, so the cutoff becomes 5.
        let map = EnergyMap::from_vec(1, 4, vec![20.0, 4.0, 12.0, 4.0]).unwrap();

        let mut out: Vec<ClusterRecord> = Vec::new();
        algo.cluster_module(&map, DetectorId::default(), &mut state, &mut out);

        assert_eq!(state.statistics().effective_cutoff, 5.0);
        assert_eq!(out.len(), 2);
        assert_eq!(state.statistics().cells_above_cutoff, 2);
    }

    #[test]
    fn test_oversized_input_is_clipped_and_counted() {
        let algo = square(2, 2);
        let mut state = algo.create_state();
        let mut map = EnergyMap::new(3, 3);
        map.set(0, 0, 10.0);
        map.set(2, 2, 10.0);
        map.set(2, 0, 4.0);

        let mut out: Vec<ClusterRecord> = Vec::new();
        algo.cluster_module(&map, DetectorId::default(), &mut state, &mut out);

        assert_eq!(out.len(), 1);
        let stats = algo.statistics(&state);
        assert_eq!(stats.dropped_cells, 2);
        assert!(stats.is_truncated());
    }

    #[test]
    fn test_state_is_reusable_between_passes() {
        let algo = square(4, 4);
        let mut state = algo.create_state();

        let mut busy = EnergyMap::new(4, 4);
        busy.set(0, 0, 9.0);
        busy.set(3, 3, 7.0);
        let mut first: Vec<ClusterRecord> = Vec::new();
        assert_eq!(
            algo.cluster_module(&busy, DetectorId::default(), &mut state, &mut first),
            2
        );

        let mut quiet = EnergyMap::new(4, 4);
        quiet.set(2, 1, 5.0);
        let mut second: Vec<ClusterRecord> = Vec::new();
        assert_eq!(
            algo.cluster_module(&quiet, DetectorId::default(), &mut state, &mut second),
            1
        );
        assert_eq!(second[0].cluster_id, 0);
        assert_eq!(second[0].energy, 5.0);
        assert_eq!(state.statistics().superclusters_found, 1);
    }

    #[test]
    fn test_recorded_cells_are_capped() {
        let algo = square(1, 40);
        let mut state = algo.create_state();
        let energies: Vec<f64> = (0..40).map(|j| 100.0 - f64::from(j)).collect();
        let map = EnergyMap::from_vec(1, 40, energies).unwrap();

        let mut out: Vec<ClusterRecord> = Vec::new();
        algo.cluster_module(&map, DetectorId::default(), &mut state, &mut out);

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].ncell, 40);
        assert_eq!(out[0].cells.len(), MAX_RECORDED_CELLS);
        assert_eq!((out[0].cells[0].i, out[0].cells[0].j), (0, 0));
    }
}
