//! Error types for cellclust-core.

use thiserror::Error;

/// Result type alias for cellclust operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for cellclust operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Clustering input error.
    #[error("clustering error: {0}")]
    Clustering(#[from] ClusteringError),

    /// Profile fit error.
    #[error("fit error: {0}")]
    Fit(#[from] FitError),
}

/// Rejected clustering configuration.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// The per-cell energy cutoff is negative.
    #[error("energy cutoff must be non-negative, got {0}")]
    NegativeCutoff(f64),

    /// A floating-point parameter is NaN or infinite.
    #[error("parameter `{name}` must be finite, got {value}")]
    NonFinite {
        /// Parameter name.
        name: &'static str,
        /// Offending value.
        value: f64,
    },

    /// A parameter that must be strictly positive is not.
    #[error("parameter `{name}` must be positive, got {value}")]
    NotPositive {
        /// Parameter name.
        name: &'static str,
        /// Offending value.
        value: f64,
    },

    /// The grid capacity has a zero dimension.
    #[error("grid capacity must be non-empty, got {width}x{height}")]
    EmptyGrid {
        /// Configured width.
        width: usize,
        /// Configured height.
        height: usize,
    },

    /// The grid capacity does not fit the 16-bit cell coordinates.
    #[error("grid capacity {width}x{height} exceeds the coordinate range")]
    GridTooLarge {
        /// Configured width.
        width: usize,
        /// Configured height.
        height: usize,
    },

    /// A table or iteration capacity is zero.
    #[error("capacity `{0}` must be at least 1")]
    ZeroCapacity(&'static str),
}

/// Errors raised while preparing clustering input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClusteringError {
    /// Energy buffer length does not match the declared dimensions.
    #[error("energy buffer holds {len} values, expected {width}x{height}")]
    DimensionMismatch {
        /// Declared width.
        width: usize,
        /// Declared height.
        height: usize,
        /// Actual buffer length.
        len: usize,
    },

    /// Rows passed to a map builder have different lengths.
    #[error("row {row} has {len} cells, expected {expected}")]
    RaggedRows {
        /// Row index.
        row: usize,
        /// Length of that row.
        len: usize,
        /// Length of the first row.
        expected: usize,
    },
}

/// Failure to fit a single cluster.
#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum FitError {
    /// The cluster has no member cells.
    #[error("cannot fit an empty cluster")]
    EmptyCluster,

    /// Total member energy is zero or negative.
    #[error("cluster energy {0} is not positive")]
    ZeroEnergy(f64),

    /// An input or intermediate value is NaN or infinite.
    #[error("non-finite value in cluster fit")]
    NonFinite,
}
