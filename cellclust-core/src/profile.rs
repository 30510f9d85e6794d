//! Lateral profile fitting for finished clusters.
//!
//! The fit treats each cluster's energy deposit as a two-dimensional
//! Gaussian and estimates it from energy-weighted moments of the member
//! cells. This is a modelling approximation: real showers have tails and
//! need not be symmetric, so the widths describe the spread of the deposit
//! rather than the parameters of a verified Gaussian.

use crate::error::FitError;

/// One member cell handed to the fitter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellSample {
    /// Cell centre, first coordinate.
    pub x: f64,
    /// Cell centre, second coordinate.
    pub y: f64,
    /// Deposited energy.
    pub energy: f64,
}

impl CellSample {
    /// Creates a sample.
    #[must_use]
    pub fn new(x: f64, y: f64, energy: f64) -> Self {
        Self { x, y, energy }
    }
}

/// Result of fitting one cluster.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProfileFit {
    /// Energy-weighted centroid, first coordinate.
    pub xc: f64,
    /// Energy-weighted centroid, second coordinate.
    pub yc: f64,
    /// Module plane position.
    pub zc: f64,
    /// Total energy of the members.
    pub energy: f64,
    /// Radial RMS width, `sqrt(sum e |p - c|^2 / sum e)`.
    pub rc: f64,
    /// Width along the major principal axis.
    pub sigma_major: f64,
    /// Width along the minor principal axis.
    pub sigma_minor: f64,
    /// Number of member cells.
    pub ncell: usize,
}

/// Fits the Gaussian profile of one cluster.
///
/// A single cell gives zero widths.
///
/// # Errors
/// [`FitError::EmptyCluster`] for no samples, [`FitError::ZeroEnergy`]
/// when the energies do not sum to a positive value, and
/// [`FitError::NonFinite`] if a coordinate or the result is NaN/infinite.
#[allow(clippy::cast_precision_loss)]
pub fn gauss_fit(samples: &[CellSample], zc: f64) -> Result<ProfileFit, FitError> {
    if samples.is_empty() {
        return Err(FitError::EmptyCluster);
    }

    let mut sum_e = 0.0;
    let mut sum_x = 0.0;
    let mut sum_y = 0.0;
    for s in samples {
        sum_e += s.energy;
        sum_x += s.energy * s.x;
        sum_y += s.energy * s.y;
    }
    if !(sum_e.is_finite() && sum_x.is_finite() && sum_y.is_finite()) {
        return Err(FitError::NonFinite);
    }
    if sum_e <= 0.0 {
        return Err(FitError::ZeroEnergy(sum_e));
    }

    let xc = sum_x / sum_e;
    let yc = sum_y / sum_e;

    let mut sxx = 0.0;
    let mut syy = 0.0;
    let mut sxy = 0.0;
    for s in samples {
        let dx = s.x - xc;
        let dy = s.y - yc;
        sxx += s.energy * dx * dx;
        syy += s.energy * dy * dy;
        sxy += s.energy * dx * dy;
    }
    sxx /= sum_e;
    syy /= sum_e;
    sxy /= sum_e;

    // Eigenvalues of the 2x2 covariance; clamp rounding below zero.
    let half_trace = 0.5 * (sxx + syy);
    let spread = (0.25 * (sxx - syy) * (sxx - syy) + sxy * sxy).sqrt();
    let major = (half_trace + spread).max(0.0);
    let minor = (half_trace - spread).max(0.0);

    let fit = ProfileFit {
        xc,
        yc,
        zc,
        energy: sum_e,
        rc: (sxx + syy).max(0.0).sqrt(),
        sigma_major: major.sqrt(),
        sigma_minor: minor.sqrt(),
        ncell: samples.len(),
    };
    if fit.rc.is_finite() && fit.sigma_major.is_finite() {
        Ok(fit)
    } else {
        Err(FitError::NonFinite)
    }
}
