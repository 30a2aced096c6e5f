//! SO(3) Lie group utilities used by the SE(3) log/exp maps.
//!
//! Provides skew-symmetric matrix construction, the left Jacobian Jl(φ) and
//! its inverse, and the shortest rotation between two directions.

use nalgebra::{Matrix3, Unit, UnitQuaternion, Vector3};

/// Small angle threshold for numerical stability.
const SMALL_ANGLE_THRESHOLD: f64 = 1e-6;

/// Constructs the skew-symmetric matrix [v]× such that [v]× u = v × u.
///
/// ```text
/// [v]× = |  0   -v_z   v_y |
///        |  v_z   0   -v_x |
///        | -v_y  v_x    0  |
/// ```
#[inline]
#[rustfmt::skip]
pub fn skew(v: &Vector3<f64>) -> Matrix3<f64> {
    Matrix3::new(
        0.0, -v.z, v.y,
        v.z, 0.0, -v.x,
        -v.y, v.x, 0.0,
    )
}

/// Computes the left Jacobian Jl(φ) of SO(3).
///
/// This is the `V` matrix of the SE(3) exponential: `t = Jl(φ) ρ`.
///
/// ```text
/// Jl(φ) = I + (1 - cos|φ|)/|φ|² [φ]× + (|φ| - sin|φ|)/|φ|³ [φ]×²
/// ```
///
/// For small angles (|φ| < ε):
/// ```text
/// Jl(φ) ≈ I + 0.5 [φ]×
/// ```
pub fn left_jacobian_so3(phi: &Vector3<f64>) -> Matrix3<f64> {
    let theta = phi.norm();
    let skew_phi = skew(phi);

    if theta < SMALL_ANGLE_THRESHOLD {
        return Matrix3::identity() + 0.5 * skew_phi;
    }

    let theta_sq = theta * theta;
    let theta_cu = theta_sq * theta;

    Matrix3::identity()
        + ((1.0 - theta.cos()) / theta_sq) * skew_phi
        + ((theta - theta.sin()) / theta_cu) * (skew_phi * skew_phi)
}

/// Computes the inverse of the left Jacobian Jl⁻¹(φ).
///
/// ```text
/// Jl⁻¹(φ) = I - 0.5 [φ]× + (1 - (|φ|/2) cot(|φ|/2)) / |φ|² [φ]×²
/// ```
///
/// The half-angle cotangent form stays finite at |φ| = π, where the
/// textbook `(1 + cos|φ|) / (2|φ| sin|φ|)` form degenerates to 0/0.
pub fn left_jacobian_so3_inv(phi: &Vector3<f64>) -> Matrix3<f64> {
    let theta = phi.norm();
    let skew_phi = skew(phi);
    let skew_phi_sq = skew_phi * skew_phi;

    if theta < SMALL_ANGLE_THRESHOLD {
        return Matrix3::identity() - 0.5 * skew_phi + (1.0 / 12.0) * skew_phi_sq;
    }

    let half = 0.5 * theta;
    let coeff = (1.0 - half * half.cos() / half.sin()) / (theta * theta);

    Matrix3::identity() - 0.5 * skew_phi + coeff * skew_phi_sq
}

/// Shortest rotation taking direction `from` onto direction `to`.
///
/// Anti-parallel inputs rotate by π about an axis perpendicular to `from`.
pub fn rotation_between_vectors(from: &Vector3<f64>, to: &Vector3<f64>) -> UnitQuaternion<f64> {
    let from_normalized = from.normalize();
    let to_normalized = to.normalize();

    let cross = from_normalized.cross(&to_normalized);
    let dot = from_normalized.dot(&to_normalized);

    if cross.norm() < 1e-10 {
        if dot > 0.0 {
            return UnitQuaternion::identity();
        }
        let perp = if from_normalized.x.abs() < 0.9 {
            Vector3::x()
        } else {
            Vector3::y()
        };
        let axis = Unit::new_normalize(from_normalized.cross(&perp));
        return UnitQuaternion::from_axis_angle(&axis, std::f64::consts::PI);
    }

    let angle = cross.norm().atan2(dot);
    UnitQuaternion::from_axis_angle(&Unit::new_normalize(cross), angle)
}
