//! SE3: 6-DOF rigid-body transformation (rotation + translation).
//!
//! The tangent space uses the `[ρ; φ]` ordering: translational part first,
//! rotation vector second.

use nalgebra::{Matrix3, Matrix4, Rotation3, UnitQuaternion, Vector3, Vector6};

use super::so3::{left_jacobian_so3, left_jacobian_so3_inv};

/// Rigid-body transformation. Transforms points as: p' = R * p + t
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SE3 {
    pub rotation: UnitQuaternion<f64>,
    pub translation: Vector3<f64>,
}

impl SE3 {
    pub fn identity() -> Self {
        Self {
            rotation: UnitQuaternion::identity(),
            translation: Vector3::zeros(),
        }
    }

    /// Construct from rotation matrix and translation.
    pub fn from_rt(rotation: Matrix3<f64>, translation: Vector3<f64>) -> Self {
        let rot3 = Rotation3::from_matrix_unchecked(rotation);
        Self {
            rotation: UnitQuaternion::from_rotation_matrix(&rot3),
            translation,
        }
    }

    /// Construct from quaternion (w, x, y, z) and translation.
    pub fn from_quaternion(qw: f64, qx: f64, qy: f64, qz: f64, translation: Vector3<f64>) -> Self {
        let rotation =
            UnitQuaternion::from_quaternion(nalgebra::Quaternion::new(qw, qx, qy, qz));
        Self {
            rotation,
            translation,
        }
    }

    /// Construct from homogeneous 4x4 matrix [R | t; 0 | 1].
    pub fn from_matrix(mat: Matrix4<f64>) -> Self {
        let rotation = mat.fixed_view::<3, 3>(0, 0).into_owned();
        let translation = Vector3::new(mat[(0, 3)], mat[(1, 3)], mat[(2, 3)]);
        Self::from_rt(rotation, translation)
    }

    pub fn rotation_matrix(&self) -> Matrix3<f64> {
        self.rotation.to_rotation_matrix().into_inner()
    }

    /// Inverse transformation: [Rᵀ | -Rᵀt].
    pub fn inverse(&self) -> Self {
        let rot_inv = self.rotation.inverse();
        Self {
            rotation: rot_inv,
            translation: -(rot_inv * self.translation),
        }
    }

    /// Compose two transforms: self ∘ other.
    pub fn compose(&self, other: &SE3) -> Self {
        Self {
            rotation: self.rotation * other.rotation,
            translation: self.rotation * other.translation + self.translation,
        }
    }

    /// Log map to the tangent vector `[ρ; φ]`.
    ///
    /// `φ` is the rotation vector (angle in [0, π]); `ρ = Jl(φ)⁻¹ t`.
    pub fn log(&self) -> Vector6<f64> {
        let phi = self.rotation.scaled_axis();
        let rho = left_jacobian_so3_inv(&phi) * self.translation;
        Vector6::new(rho.x, rho.y, rho.z, phi.x, phi.y, phi.z)
    }

    /// Exponential map from the tangent vector `[ρ; φ]`.
    pub fn exp(tangent: &Vector6<f64>) -> Self {
        let rho = tangent.fixed_rows::<3>(0).into_owned();
        let phi = tangent.fixed_rows::<3>(3).into_owned();
        Self {
            rotation: UnitQuaternion::from_scaled_axis(phi),
            translation: left_jacobian_so3(&phi) * rho,
        }
    }
}

impl Default for SE3 {
    fn default() -> Self {
        Self::identity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sample_pose() -> SE3 {
        SE3 {
            rotation: UnitQuaternion::from_euler_angles(0.3, -0.2, 1.1),
            translation: Vector3::new(1.0, -2.0, 0.5),
        }
    }

    #[test]
    fn test_inverse_composes_to_identity() {
        let pose = sample_pose();
        let ident = pose.compose(&pose.inverse());

        assert_relative_eq!(ident.translation, Vector3::zeros(), epsilon = 1e-12);
        assert!(ident.rotation.angle() < 1e-12);
    }

    #[test]
    fn test_log_exp_recovers_pose() {
        let pose = sample_pose();
        let recovered = SE3::exp(&pose.log());

        assert_relative_eq!(recovered.translation, pose.translation, epsilon = 1e-10);
        assert!(recovered.rotation.angle_to(&pose.rotation) < 1e-10);
    }

    #[test]
    fn test_pure_translation_log_is_translation() {
        let pose = SE3 {
            rotation: UnitQuaternion::identity(),
            translation: Vector3::new(0.4, 0.0, -3.0),
        };
        let xi = pose.log();

        assert_relative_eq!(
            xi,
            Vector6::new(0.4, 0.0, -3.0, 0.0, 0.0, 0.0),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_matrix_roundtrip() {
        let pose = sample_pose();
        let mut mat = Matrix4::identity();
        mat.fixed_view_mut::<3, 3>(0, 0)
            .copy_from(&pose.rotation_matrix());
        mat.fixed_view_mut::<3, 1>(0, 3).copy_from(&pose.translation);

        let back = SE3::from_matrix(mat);
        assert_relative_eq!(back.translation, pose.translation, epsilon = 1e-12);
        assert!(back.rotation.angle_to(&pose.rotation) < 1e-10);
    }
}
