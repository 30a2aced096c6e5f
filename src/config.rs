//! Run configuration loaded from YAML.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::error::{InitError, InitResult};
use crate::imu::{GRAVITY_MAGNITUDE, Timestamp};
use crate::init::gravity::DEFAULT_MIN_RCOND;
use crate::init::{CalibrationWindow, InitMode, InitializerConfig};

/// Default ground-truth CSV location relative to the dataset root.
pub const DEFAULT_GT_REL_PATH: &str = "state_groundtruth_estimate0/data.csv";

/// Top-level configuration of one run.
#[derive(Debug, Clone, Deserialize)]
pub struct InitConfig {
    /// Root of the ASL dataset (the `mav0` directory).
    pub data_set_path: PathBuf,

    #[serde(default = "default_gt_rel_path")]
    pub gt_rel_path: PathBuf,

    /// Calibration window start (ns, dataset clock).
    pub stand_still_start: Timestamp,

    /// Calibration window end, exclusive.
    pub stand_still_end: Timestamp,

    /// Use the ground-truth-assisted procedure instead of leveling.
    #[serde(default)]
    pub init_states_with_gt: bool,

    #[serde(default = "default_gravity_magnitude")]
    pub gravity_magnitude: f64,

    /// Conditioning guard for the gravity least-squares solve.
    #[serde(default = "default_min_rcond")]
    pub min_rcond: f64,

    #[serde(default)]
    pub noise: NoiseConfig,

    #[serde(default)]
    pub filter: FilterConfig,
}

/// Process and measurement noise handed to the filter.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NoiseConfig {
    /// Feature measurement standard deviation in pixels.
    pub feature_covariance: f64,
    pub imu_vars: ImuVars,
    pub imu_covars: ImuCovars,
}

impl Default for NoiseConfig {
    fn default() -> Self {
        Self {
            feature_covariance: 7.0,
            imu_vars: ImuVars::default(),
            imu_covars: ImuCovars::default(),
        }
    }
}

/// IMU random-walk and white-noise variances.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct ImuVars {
    pub w_var: f64,
    pub dbg_var: f64,
    pub a_var: f64,
    pub dba_var: f64,
}

impl Default for ImuVars {
    fn default() -> Self {
        Self {
            w_var: 1e-5,
            dbg_var: 3.6733e-5,
            a_var: 1e-3,
            dba_var: 7e-4,
        }
    }
}

/// Initial IMU state variances.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct ImuCovars {
    pub q_var_init: f64,
    pub bg_var_init: f64,
    pub v_var_init: f64,
    pub ba_var_init: f64,
    pub p_var_init: f64,
}

impl Default for ImuCovars {
    fn default() -> Self {
        Self {
            q_var_init: 1e-5,
            bg_var_init: 1e-2,
            v_var_init: 1e-2,
            ba_var_init: 1e-2,
            p_var_init: 1e-12,
        }
    }
}

/// Filter algorithm parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Gauss-Newton residual threshold in pixels.
    pub max_gn_cost_norm: f64,
    pub translation_threshold: f64,
    pub min_rcond: f64,
    pub keyframe_transl_dist: f64,
    pub keyframe_rot_dist: f64,
    pub max_track_length: usize,
    pub min_track_length: usize,
    pub max_cam_states: usize,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            max_gn_cost_norm: 11.0,
            translation_threshold: 0.05,
            min_rcond: 3e-12,
            keyframe_transl_dist: 0.005,
            keyframe_rot_dist: 0.05,
            max_track_length: 1000,
            min_track_length: 3,
            max_cam_states: 20,
        }
    }
}

fn default_gt_rel_path() -> PathBuf {
    PathBuf::from(DEFAULT_GT_REL_PATH)
}

fn default_gravity_magnitude() -> f64 {
    GRAVITY_MAGNITUDE
}

fn default_min_rcond() -> f64 {
    DEFAULT_MIN_RCOND
}

impl InitConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_yaml(&text).with_context(|| format!("Invalid config {}", path.display()))
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the run meaningless before touching any data.
    pub fn validate(&self) -> InitResult<()> {
        self.window()?;
        if !(self.gravity_magnitude > 0.0) {
            return Err(InitError::Config(format!(
                "gravity_magnitude must be positive, got {}",
                self.gravity_magnitude
            )));
        }
        if !(self.min_rcond >= 0.0) {
            return Err(InitError::Config(format!(
                "min_rcond must be non-negative, got {}",
                self.min_rcond
            )));
        }
        if self.filter.min_track_length > self.filter.max_track_length {
            return Err(InitError::Config(format!(
                "min_track_length {} exceeds max_track_length {}",
                self.filter.min_track_length, self.filter.max_track_length
            )));
        }
        Ok(())
    }

    pub fn window(&self) -> InitResult<CalibrationWindow> {
        CalibrationWindow::new(self.stand_still_start, self.stand_still_end)
    }

    pub fn mode(&self) -> InitMode {
        if self.init_states_with_gt {
            InitMode::GroundTruthAssisted
        } else {
            InitMode::Leveling
        }
    }

    pub fn initializer(&self) -> InitResult<InitializerConfig> {
        Ok(InitializerConfig {
            window: self.window()?,
            mode: self.mode(),
            gravity_magnitude: self.gravity_magnitude,
            min_rcond: self.min_rcond,
        })
    }

    pub fn ground_truth_path(&self) -> PathBuf {
        self.data_set_path.join(&self.gt_rel_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_takes_defaults() {
        let config = InitConfig::from_yaml(
            "data_set_path: /data/MH_01_easy/mav0\n\
             stand_still_start: 1403636580838555648\n\
             stand_still_end: 1403636581838555648\n",
        )
        .unwrap();

        assert_eq!(config.mode(), InitMode::Leveling);
        assert_eq!(config.gt_rel_path, PathBuf::from(DEFAULT_GT_REL_PATH));
        assert_eq!(
            config.ground_truth_path(),
            PathBuf::from("/data/MH_01_easy/mav0/state_groundtruth_estimate0/data.csv")
        );
        assert_eq!(config.gravity_magnitude, GRAVITY_MAGNITUDE);
        assert_eq!(config.noise.feature_covariance, 7.0);
        assert_eq!(config.noise.imu_vars.dbg_var, 3.6733e-5);
        assert_eq!(config.noise.imu_covars.p_var_init, 1e-12);
        assert_eq!(config.filter.max_cam_states, 20);
        assert_eq!(config.filter.min_rcond, 3e-12);

        let window = config.window().unwrap();
        assert_eq!(window.start(), 1403636580838555648);
        assert_eq!(window.end(), 1403636581838555648);
    }

    #[test]
    fn test_nested_overrides() {
        let config = InitConfig::from_yaml(
            r#"
data_set_path: mav0
gt_rel_path: gt/data.csv
stand_still_start: 100
stand_still_end: 200
init_states_with_gt: true
noise:
  feature_covariance: 2.5
  imu_vars:
    a_var: 0.002
filter:
  max_cam_states: 30
"#,
        )
        .unwrap();

        assert_eq!(config.mode(), InitMode::GroundTruthAssisted);
        assert_eq!(config.ground_truth_path(), PathBuf::from("mav0/gt/data.csv"));
        assert_eq!(config.noise.feature_covariance, 2.5);
        assert_eq!(config.noise.imu_vars.a_var, 0.002);
        assert_eq!(config.noise.imu_vars.w_var, 1e-5);
        assert_eq!(config.filter.max_cam_states, 30);
        assert_eq!(config.filter.min_track_length, 3);
    }

    #[test]
    fn test_rejects_inverted_window() {
        let err = InitConfig::from_yaml(
            "data_set_path: mav0\nstand_still_start: 200\nstand_still_end: 200\n",
        )
        .unwrap_err();
        assert!(matches!(err.downcast_ref::<InitError>(), Some(InitError::Config(_))));
    }

    #[test]
    fn test_rejects_missing_window() {
        assert!(InitConfig::from_yaml("data_set_path: mav0\n").is_err());
    }

    #[test]
    fn test_load_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "data_set_path: mav0\nstand_still_start: 5\nstand_still_end: 1\n").unwrap();

        let err = InitConfig::load(&path).unwrap_err();
        assert!(format!("{err:#}").contains("config.yaml"));
    }
}
