//! cellclust-algorithms: Clustering of cell energy grids.
//!
//! A clustering pass over one module runs these stages:
//! - **Ranking** - positive cells ordered by decreasing energy
//! - **Superclusters** - connected components of cells above the cutoff
//! - **Refinement** - each supercluster split around its local maxima
//! - **Fitting** - energy-weighted profile of every cluster, emitted as a record
//!
//! [`CellClustering`] drives the pass; [`cluster_modules`] runs it over many
//! modules in parallel.
#![warn(missing_docs)]

mod engine;
mod processing;
pub mod ranking;
pub mod refine;
pub mod supercluster;

pub use engine::{CellClustering, CellClusteringState};
pub use processing::{cluster_modules, cluster_modules_batch, ModuleInput, ModuleResult};
pub use refine::{ClusterEntry, ClusterTable, RefineOutcome, Refiner};
pub use supercluster::{BuildOutcome, Supercluster, SuperclusterTable};

// Re-export core clustering types
pub use cellclust_core::clustering::{ClusteringConfig, ClusteringState, ClusteringStatistics};
