//! Parallel drivers that cluster many modules at once.
//!
//! Modules are independent, so each rayon worker owns one
//! [`CellClusteringState`] and reuses it for every module it picks up.
//! Results always come back in input order.

use rayon::prelude::*;

use cellclust_core::clustering::ClusteringStatistics;
use cellclust_core::grid::EnergyMap;
use cellclust_core::record::{ClusterRecord, DetectorId};
use cellclust_core::soa::ClusterBatch;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::engine::CellClustering;

/// One module's energies and label.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ModuleInput {
    /// Label copied onto every record.
    pub detector: DetectorId,
    /// Cell energies of the module.
    pub energies: EnergyMap,
}

impl ModuleInput {
    /// Pairs a label with its energies.
    #[must_use]
    pub fn new(detector: DetectorId, energies: EnergyMap) -> Self {
        Self { detector, energies }
    }
}

/// Records and diagnostics of one module.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ModuleResult {
    /// Label of the module.
    pub detector: DetectorId,
    /// Records in ascending cluster id order.
    pub clusters: Vec<ClusterRecord>,
    /// Diagnostics of the pass.
    pub statistics: ClusteringStatistics,
}

/// Clusters every module in parallel.
#[must_use]
pub fn cluster_modules(algo: &CellClustering, modules: &[ModuleInput]) -> Vec<ModuleResult> {
    modules
        .par_iter()
        .map_init(
            || algo.create_state(),
            |state, module| {
                let mut clusters = Vec::new();
                algo.cluster_module(&module.energies, module.detector, state, &mut clusters);
                ModuleResult {
                    detector: module.detector,
                    clusters,
                    statistics: state.statistics().clone(),
                }
            },
        )
        .collect()
}

/// Clusters every module in parallel into one columnar batch.
///
/// Rows are grouped by module in input order. The returned statistics sum
/// those of all modules.
#[must_use]
pub fn cluster_modules_batch(
    algo: &CellClustering,
    modules: &[ModuleInput],
) -> (ClusterBatch, ClusteringStatistics) {
    let mut parts: Vec<(ClusterBatch, ClusteringStatistics)> = modules
        .par_iter()
        .map_init(
            || algo.create_state(),
            |state, module| {
                let mut batch = ClusterBatch::default();
                algo.cluster_module(&module.energies, module.detector, state, &mut batch);
                (batch, state.statistics().clone())
            },
        )
        .collect();

    let rows = parts.iter().map(|(batch, _)| batch.len()).sum();
    let mut all = ClusterBatch::with_capacity(rows);
    let mut totals = ClusteringStatistics::default();
    for (batch, stats) in parts.drain(..) {
        all.append(&batch);
        totals.accumulate(&stats);
    }
    (all, totals)
}
