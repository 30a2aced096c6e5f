//! Initial velocity from a backward finite difference over position knots.

use nalgebra::Vector3;
use tracing::warn;

use crate::error::{InitError, InitResult};
use crate::imu::{Timestamp, seconds_between};

/// Accuracy order of the backward-difference stencil.
pub const FINITE_DIFFERENCE_ORDER: usize = 6;

/// Number of knots the stencil consumes.
pub const REQUIRED_KNOTS: usize = FINITE_DIFFERENCE_ORDER + 1;

/// 6th-order backward-difference coefficients, newest knot first.
pub const BACKWARD_DIFFERENCE_COEFFS: [f64; REQUIRED_KNOTS] = [
    -49.0 / 20.0,
    6.0,
    -15.0 / 2.0,
    20.0 / 3.0,
    -15.0 / 4.0,
    6.0 / 5.0,
    -1.0 / 6.0,
];

/// Relative spacing error beyond which a warning is logged.
const SPACING_TOLERANCE: f64 = 0.1;

/// Interpolated ground-truth position at a keyframe boundary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Knot {
    pub timestamp_ns: Timestamp,
    pub position: Vector3<f64>,
}

/// Velocity at the newest knot: `v = -(Σ cᵢ · knot[N-1-i]) / dt`.
///
/// Uses the last [`REQUIRED_KNOTS`] knots, which should be spaced `dt`
/// seconds apart. Uneven spacing only degrades accuracy and is reported as
/// a warning.
pub fn backward_difference_velocity(knots: &[Knot], dt: f64) -> InitResult<Vector3<f64>> {
    if knots.len() < REQUIRED_KNOTS {
        return Err(InitError::InsufficientExcitation(format!(
            "velocity needs {} knots, only {} collected",
            REQUIRED_KNOTS,
            knots.len()
        )));
    }
    if !(dt > 0.0) {
        return Err(InitError::InsufficientExcitation(format!(
            "knot spacing must be positive, got {dt}"
        )));
    }

    let recent = &knots[knots.len() - REQUIRED_KNOTS..];
    for pair in recent.windows(2) {
        let spacing = seconds_between(pair[0].timestamp_ns, pair[1].timestamp_ns);
        if (spacing - dt).abs() > SPACING_TOLERANCE * dt {
            warn!(
                "Knot spacing {:.4}s at {} deviates from nominal {:.4}s",
                spacing, pair[1].timestamp_ns, dt
            );
        }
    }

    let weighted = BACKWARD_DIFFERENCE_COEFFS
        .iter()
        .zip(recent.iter().rev())
        .fold(Vector3::zeros(), |acc, (c, knot)| acc + knot.position * *c);

    Ok(-weighted / dt)
}
