//! Parameters handed to the downstream filter together with the initial state.

use nalgebra::{SMatrix, SVector, UnitQuaternion, Vector3};

use crate::config::{FilterConfig, NoiseConfig};
use crate::init::InitialState;
use crate::io::CameraCalibration;

/// Pinhole intrinsics and camera-from-IMU extrinsics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraIntrinsics {
    pub f_u: f64,
    pub f_v: f64,
    pub c_u: f64,
    pub c_v: f64,
    /// Rotation taking IMU-frame vectors into the camera frame (`T_BS`
    /// rotation inverted).
    pub q_ci: UnitQuaternion<f64>,
    /// Camera position in the IMU frame.
    pub p_c_i: Vector3<f64>,
}

impl CameraIntrinsics {
    pub fn from_calibration(calibration: &CameraCalibration) -> Self {
        Self {
            f_u: calibration.f_u,
            f_v: calibration.f_v,
            c_u: calibration.c_u,
            c_v: calibration.c_v,
            q_ci: calibration.q_bs().inverse(),
            p_c_i: calibration.p_bs(),
        }
    }
}

/// Noise model in normalized image coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct NoiseParams {
    pub u_var_prime: f64,
    pub v_var_prime: f64,
    /// Gyro, gyro bias, accel, accel bias noise (3 entries each).
    pub q_imu: SMatrix<f64, 12, 12>,
    /// Orientation, gyro bias, velocity, accel bias, position (3 entries each).
    pub initial_imu_covar: SMatrix<f64, 15, 15>,
}

impl NoiseParams {
    pub fn new(noise: &NoiseConfig, camera: &CameraIntrinsics) -> Self {
        let v = &noise.imu_vars;
        let q_imu = SVector::<f64, 12>::from_iterator(
            [v.w_var, v.dbg_var, v.a_var, v.dba_var]
                .into_iter()
                .flat_map(|var| [var; 3]),
        );

        let c = &noise.imu_covars;
        let initial = SVector::<f64, 15>::from_iterator(
            [c.q_var_init, c.bg_var_init, c.v_var_init, c.ba_var_init, c.p_var_init]
                .into_iter()
                .flat_map(|var| [var; 3]),
        );

        Self {
            u_var_prime: (noise.feature_covariance / camera.f_u).powi(2),
            v_var_prime: (noise.feature_covariance / camera.f_v).powi(2),
            q_imu: SMatrix::from_diagonal(&q_imu),
            initial_imu_covar: SMatrix::from_diagonal(&initial),
        }
    }
}

/// Filter algorithm parameters with pixel thresholds normalized by focal length.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterParams {
    pub max_gn_cost_norm: f64,
    pub translation_threshold: f64,
    pub min_rcond: f64,
    pub redundancy_distance_thresh: f64,
    pub redundancy_angle_thresh: f64,
    pub max_track_length: usize,
    pub min_track_length: usize,
    pub max_cam_states: usize,
}

impl FilterParams {
    pub fn new(filter: &FilterConfig, camera: &CameraIntrinsics) -> Self {
        Self {
            max_gn_cost_norm: (filter.max_gn_cost_norm / camera.f_u).powi(2),
            translation_threshold: filter.translation_threshold,
            min_rcond: filter.min_rcond,
            redundancy_distance_thresh: filter.keyframe_transl_dist,
            redundancy_angle_thresh: filter.keyframe_rot_dist,
            max_track_length: filter.max_track_length,
            min_track_length: filter.min_track_length,
            max_cam_states: filter.max_cam_states,
        }
    }
}

/// Everything the filter needs to start.
#[derive(Debug, Clone)]
pub struct FilterSetup {
    pub camera: CameraIntrinsics,
    pub noise: NoiseParams,
    pub params: FilterParams,
    pub initial_state: InitialState,
}

impl FilterSetup {
    pub fn new(
        calibration: &CameraCalibration,
        noise: &NoiseConfig,
        filter: &FilterConfig,
        initial_state: InitialState,
    ) -> Self {
        let camera = CameraIntrinsics::from_calibration(calibration);
        Self {
            noise: NoiseParams::new(noise, &camera),
            params: FilterParams::new(filter, &camera),
            camera,
            initial_state,
        }
    }
}
