//! cellclust-core: Core types for cell-grid clustering.
//!
//! This crate provides the cell grid and lattice geometry, the clustering
//! configuration and diagnostics, the Gaussian profile fit applied to each
//! finished cluster, and the record types clusters are emitted as.
//!

pub mod cell;
pub mod clustering;
pub mod error;
pub mod grid;
pub mod profile;
pub mod record;
pub mod soa;

pub use cell::{distance, CellCoord, Lattice};
pub use clustering::{ClusteringConfig, ClusteringState, ClusteringStatistics};
pub use error::{ClusteringError, ConfigError, Error, FitError, Result};
pub use grid::{CellGrid, EnergyMap, LoadReport, Neighbours};
pub use profile::{gauss_fit, CellSample, ProfileFit};
pub use record::{ClusterRecord, ClusterSink, DetectorId, MAX_RECORDED_CELLS};
pub use soa::ClusterBatch;
