//! Output records and the sink interface clusters are emitted through.

use crate::cell::CellCoord;
use crate::profile::ProfileFit;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Maximum number of member cells listed on a record.
pub const MAX_RECORDED_CELLS: usize = 19;

/// Pass-through label of the module a grid came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DetectorId {
    /// Detector plane (e.g. preshower or charged-particle veto).
    pub detector: u32,
    /// Module within the plane.
    pub module: u32,
}

impl DetectorId {
    /// Creates a detector label.
    #[must_use]
    pub fn new(detector: u32, module: u32) -> Self {
        Self { detector, module }
    }
}

/// One reconstructed cluster.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ClusterRecord {
    /// Module the cluster was found in.
    pub detector: DetectorId,
    /// Cluster id, unique within the pass.
    pub cluster_id: u32,
    /// Centroid, first coordinate.
    pub x: f64,
    /// Centroid, second coordinate.
    pub y: f64,
    /// Module plane position.
    pub z: f64,
    /// Summed energy.
    pub energy: f64,
    /// Number of member cells.
    pub ncell: u32,
    /// Radial RMS width.
    pub rc: f64,
    /// Width along the major principal axis.
    pub sigma_major: f64,
    /// Width along the minor principal axis.
    pub sigma_minor: f64,
    /// Centroid in fractional lattice indices `(i, j)`.
    pub lattice_position: (f64, f64),
    /// Set when the split that produced this cluster did not converge.
    pub approximate: bool,
    /// Highest-energy member cells, at most [`MAX_RECORDED_CELLS`].
    pub cells: Vec<CellCoord>,
}

impl ClusterRecord {
    /// Builds a record from a profile fit.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn from_fit(
        detector: DetectorId,
        cluster_id: u32,
        fit: &ProfileFit,
        lattice_position: (f64, f64),
    ) -> Self {
        Self {
            detector,
            cluster_id,
            x: fit.xc,
            y: fit.yc,
            z: fit.zc,
            energy: fit.energy,
            ncell: fit.ncell as u32,
            rc: fit.rc,
            sigma_major: fit.sigma_major,
            sigma_minor: fit.sigma_minor,
            lattice_position,
            approximate: false,
            cells: Vec::new(),
        }
    }
}

/// Append-only destination for cluster records.
pub trait ClusterSink {
    /// Appends one record.
    fn push_cluster(&mut self, record: ClusterRecord);
}

impl ClusterSink for Vec<ClusterRecord> {
    fn push_cluster(&mut self, record: ClusterRecord) {
        self.push(record);
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::float_cmp)]
    use super::*;

    #[test]
    fn test_record_from_fit() {
        let fit = ProfileFit {
            xc: 10.5,
            yc: 20.25,
            zc: 361.5,
            energy: 150.0,
            rc: 0.8,
            sigma_major: 0.7,
            sigma_minor: 0.3873,
            ncell: 5,
        };
        let record = ClusterRecord::from_fit(DetectorId::new(0, 7), 3, &fit, (1.0, 2.0));

        assert_eq!(record.detector, DetectorId::new(0, 7));
        assert_eq!(record.cluster_id, 3);
        assert_eq!(record.x, 10.5);
        assert_eq!(record.z, 361.5);
        assert_eq!(record.ncell, 5);
        assert!(!record.approximate);
        assert!(record.cells.is_empty());
    }

    #[test]
    fn test_vec_sink_appends() {
        let fit = ProfileFit {
            xc: 0.0,
            yc: 0.0,
            zc: 0.0,
            energy: 1.0,
            rc: 0.0,
            sigma_major: 0.0,
            sigma_minor: 0.0,
            ncell: 1,
        };
        let mut sink: Vec<ClusterRecord> = Vec::new();
        sink.push_cluster(ClusterRecord::from_fit(DetectorId::default(), 0, &fit, (0.0, 0.0)));
        sink.push_cluster(ClusterRecord::from_fit(DetectorId::default(), 1, &fit, (0.0, 0.0)));
        assert_eq!(sink.len(), 2);
        assert_eq!(sink[1].cluster_id, 1);
    }
}
