//! Geodesic interpolation between timestamped SE(3) poses.
//!
//! Used to assign a ground-truth pose to every inertial sample that falls
//! between two sparse ground-truth observations.

use super::SE3;
use crate::imu::Timestamp;

/// Interpolate a pose at `tq` between `pose0` (at `t0`) and `pose1` (at `t1`).
///
/// ```text
/// T_rel = T1 · T0⁻¹
/// T(tq) = exp(s · log(T_rel)) · T0,   s = (tq - t0) / (t1 - t0)
/// ```
///
/// Returns `None` unless `t0 <= tq <= t1` and `t0 < t1`.
pub fn interpolate(pose0: &SE3, pose1: &SE3, t0: Timestamp, t1: Timestamp, tq: Timestamp) -> Option<SE3> {
    if t0 >= t1 || tq < t0 || tq > t1 {
        return None;
    }
    if tq == t0 {
        return Some(*pose0);
    }

    let fraction = (tq - t0) as f64 / (t1 - t0) as f64;
    let relative = pose1.compose(&pose0.inverse());
    let step = SE3::exp(&(relative.log() * fraction));

    Some(step.compose(pose0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{UnitQuaternion, Vector3};

    fn endpoints() -> (SE3, SE3) {
        let pose0 = SE3 {
            rotation: UnitQuaternion::from_euler_angles(0.1, 0.2, -0.3),
            translation: Vector3::new(1.0, 2.0, 3.0),
        };
        let pose1 = SE3 {
            rotation: UnitQuaternion::from_euler_angles(-0.4, 0.5, 1.2),
            translation: Vector3::new(-1.0, 0.5, 4.0),
        };
        (pose0, pose1)
    }

    #[test]
    fn test_interpolation_hits_endpoints() {
        let (pose0, pose1) = endpoints();

        let at_start = interpolate(&pose0, &pose1, 100, 200, 100).unwrap();
        assert_relative_eq!(at_start.translation, pose0.translation, epsilon = 1e-5);
        assert!(at_start.rotation.angle_to(&pose0.rotation) < 1e-5);

        let at_end = interpolate(&pose0, &pose1, 100, 200, 200).unwrap();
        assert_relative_eq!(at_end.translation, pose1.translation, epsilon = 1e-5);
        assert!(at_end.rotation.angle_to(&pose1.rotation) < 1e-5);
    }

    #[test]
    fn test_rotation_distance_grows_monotonically() {
        let (pose0, pose1) = endpoints();

        let mut last = 0.0;
        for tq in (1_000..2_000).step_by(50) {
            let pose = interpolate(&pose0, &pose1, 1_000, 2_000, tq).unwrap();
            let dist = pose.rotation.angle_to(&pose0.rotation);
            assert!(dist >= last);
            last = dist;
        }
        assert!(last > 0.0);
    }

    #[test]
    fn test_midpoint_of_pure_translation() {
        let pose0 = SE3::identity();
        let pose1 = SE3 {
            rotation: UnitQuaternion::identity(),
            translation: Vector3::new(2.0, 0.0, -4.0),
        };

        let mid = interpolate(&pose0, &pose1, 0, 10, 5).unwrap();
        assert_relative_eq!(mid.translation, Vector3::new(1.0, 0.0, -2.0), epsilon = 1e-12);
    }

    #[test]
    fn test_rejects_unbracketed_query() {
        let (pose0, pose1) = endpoints();

        assert!(interpolate(&pose0, &pose1, 100, 200, 99).is_none());
        assert!(interpolate(&pose0, &pose1, 100, 200, 201).is_none());
        assert!(interpolate(&pose0, &pose1, 200, 200, 200).is_none());
    }
}
