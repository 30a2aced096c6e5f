//! Least-squares gravity estimation from preintegrated segments.
//!
//! Each segment from keyframe k to k+1 (duration Δt) contributes
//!
//! ```text
//! | 0.5 · R · Δt² |         | alpha |
//! |     R · Δt    | · x  =  | beta  |
//! ```
//!
//! where `R` takes world-frame vectors into keyframe k's body frame. Stacking
//! all blocks gives `H x = z`, solved through the normal equations. With the
//! platform near rest, `x` is the gravity reaction `-g` in the world frame.

use nalgebra::{DVector, Matrix3, MatrixXx3, Vector3};
use tracing::debug;

use crate::error::{InitError, InitResult};
use crate::imu::PreintegratedSegment;

/// Default reciprocal condition number below which `HᵗH` counts as singular.
pub const DEFAULT_MIN_RCOND: f64 = 1e-12;

/// Growing linear system `(H, z)` with three unknowns.
#[derive(Debug, Clone)]
pub struct GravityLeastSquares {
    h: MatrixXx3<f64>,
    z: DVector<f64>,
    min_rcond: f64,
}

impl Default for GravityLeastSquares {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_RCOND)
    }
}

impl GravityLeastSquares {
    pub fn new(min_rcond: f64) -> Self {
        Self {
            h: MatrixXx3::zeros(0),
            z: DVector::zeros(0),
            min_rcond,
        }
    }

    pub fn num_segments(&self) -> usize {
        self.h.nrows() / 6
    }

    pub fn h(&self) -> &MatrixXx3<f64> {
        &self.h
    }

    pub fn z(&self) -> &DVector<f64> {
        &self.z
    }

    /// Append the 6-row block of one segment.
    ///
    /// `r_keyframe_world` takes world vectors into the segment's first keyframe frame.
    pub fn add_segment(&mut self, segment: &PreintegratedSegment, r_keyframe_world: &Matrix3<f64>) {
        let dt = segment.duration_s();
        let row = self.h.nrows();

        self.h.resize_vertically_mut(row + 6, 0.0);
        self.h
            .fixed_view_mut::<3, 3>(row, 0)
            .copy_from(&(r_keyframe_world * (0.5 * dt * dt)));
        self.h
            .fixed_view_mut::<3, 3>(row + 3, 0)
            .copy_from(&(r_keyframe_world * dt));

        self.z.resize_vertically_mut(row + 6, 0.0);
        self.z.fixed_rows_mut::<3>(row).copy_from(&segment.alpha);
        self.z.fixed_rows_mut::<3>(row + 3).copy_from(&segment.beta);
    }

    /// Ordinary least squares `x = (HᵗH)⁻¹ Hᵗz` over all segments.
    pub fn solve(&self) -> InitResult<Vector3<f64>> {
        if self.num_segments() == 0 {
            return Err(InitError::InsufficientExcitation(
                "no preintegrated segments to estimate gravity from".to_string(),
            ));
        }

        let hth: Matrix3<f64> = self.h.transpose() * &self.h;
        let htz: Vector3<f64> = self.h.transpose() * &self.z;

        let singular_values = hth.singular_values();
        let max_sv = singular_values.max();
        let min_sv = singular_values.min();
        let rcond = if max_sv > 0.0 { min_sv / max_sv } else { 0.0 };
        if !rcond.is_finite() || rcond < self.min_rcond {
            return Err(InitError::InsufficientExcitation(format!(
                "gravity normal equations are singular (rcond {rcond:.3e})"
            )));
        }

        let hth_inv = hth.try_inverse().ok_or_else(|| {
            InitError::InsufficientExcitation("gravity normal equations not invertible".to_string())
        })?;
        let estimate = hth_inv * htz;

        debug!(
            "Gravity least squares over {} segments: {:?} (rcond {:.3e})",
            self.num_segments(),
            estimate.as_slice(),
            rcond
        );
        Ok(estimate)
    }
}

/// Rescale `g` to exactly `magnitude`, keeping its direction.
pub fn renormalize(g: &Vector3<f64>, magnitude: f64) -> InitResult<Vector3<f64>> {
    let norm = g.norm();
    if !norm.is_finite() || norm < f64::EPSILON {
        return Err(InitError::InsufficientExcitation(
            "gravity estimate has no usable direction".to_string(),
        ));
    }
    Ok(g * (magnitude / norm))
}
