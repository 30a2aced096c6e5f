use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use csv::ReaderBuilder;
use nalgebra::{Matrix4, UnitQuaternion, Vector3};
use serde::Deserialize;
use tracing::{info, warn};

use crate::geometry::SE3;
use crate::imu::{ImuReading, Timestamp};

use super::stream::VecStream;

/// Reference to a camera frame on disk. Decoding happens downstream.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRef {
    pub path: PathBuf,
}

/// Lens distortion model tag from `sensor.yaml`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistortionModel {
    Equidistant,
    /// Radial-tangential; the fallback for any other tag.
    RadialTangential,
}

impl DistortionModel {
    pub fn from_tag(tag: &str) -> Self {
        if tag.trim() == "equidistant" {
            Self::Equidistant
        } else {
            Self::RadialTangential
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Self::Equidistant => "equidistant",
            Self::RadialTangential => "radtan",
        }
    }
}

/// Pinhole intrinsics plus body-from-sensor extrinsics of one camera.
#[derive(Debug, Clone)]
pub struct CameraCalibration {
    pub f_u: f64,
    pub f_v: f64,
    pub c_u: f64,
    pub c_v: f64,
    pub distortion_model: DistortionModel,
    pub distortion_coefficients: Vec<f64>,
    /// Transform from camera to body frame (T_BS).
    pub t_body_cam: SE3,
    /// Nominal frame period in seconds, when `rate_hz` is given.
    pub frame_period: Option<f64>,
}

impl CameraCalibration {
    /// Rotation part of T_BS.
    pub fn q_bs(&self) -> UnitQuaternion<f64> {
        self.t_body_cam.rotation
    }

    /// Translation part of T_BS.
    pub fn p_bs(&self) -> Vector3<f64> {
        self.t_body_cam.translation
    }
}

/// ASL-format dataset (EuRoC / TUM-VI layout) loaded into sensor streams.
#[derive(Debug)]
pub struct AslDataset {
    pub root: PathBuf,
    pub imu: VecStream<ImuReading>,
    pub cam0: VecStream<ImageRef>,
    pub ground_truth: Option<VecStream<SE3>>,
    pub camera: CameraCalibration,
}

impl AslDataset {
    /// Load `imu0`, `cam0` and, when `gt_rel_path` is given, the ground truth CSV.
    pub fn load<P: AsRef<Path>>(root: P, gt_rel_path: Option<&Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        let imu_samples = load_imu_list(root.join("imu0/data.csv"))?;
        let mut imu = VecStream::new("imu0", imu_samples);
        if let Some(rate) = load_sensor_rate(&root.join("imu0/sensor.yaml")) {
            imu = imu.with_nominal_dt(1.0 / rate);
        }

        let camera = load_camera_calibration(&root.join("cam0/sensor.yaml"))?;
        let image_samples = load_image_list(root.join("cam0/data.csv"), &root.join("cam0/data"))?;
        let mut cam0 = VecStream::new("cam0", image_samples);
        if let Some(period) = camera.frame_period {
            cam0 = cam0.with_nominal_dt(period);
        }

        let ground_truth = match gt_rel_path {
            Some(rel) => {
                let samples = load_groundtruth_list(root.join(rel))?;
                Some(VecStream::new("gt0", samples))
            }
            None => None,
        };

        info!(
            "Loaded {} IMU samples, {} frames, {} ground truth poses from {}",
            imu.len(),
            cam0.len(),
            ground_truth.as_ref().map_or(0, |gt| gt.len()),
            root.display()
        );

        Ok(Self {
            root,
            imu,
            cam0,
            ground_truth,
            camera,
        })
    }
}

fn csv_reader(csv_path: &Path) -> Result<csv::Reader<File>> {
    ReaderBuilder::new()
        .has_headers(false)
        .comment(Some(b'#'))
        .flexible(true)
        .from_path(csv_path)
        .with_context(|| format!("Failed to open {}", csv_path.display()))
}

fn check_monotonic(csv_path: &Path, prev: Option<Timestamp>, ts: Timestamp) -> Result<()> {
    if let Some(prev) = prev {
        if ts < prev {
            bail!(
                "{}: timestamp {} precedes previous sample {}",
                csv_path.display(),
                ts,
                prev
            );
        }
    }
    Ok(())
}

fn load_image_list(csv_path: PathBuf, image_dir: &Path) -> Result<Vec<(Timestamp, ImageRef)>> {
    let mut rdr = csv_reader(&csv_path)?;

    let mut entries = Vec::new();
    let mut prev = None;
    for rec in rdr.records() {
        let rec = rec?;
        if rec.len() < 2 {
            continue;
        }
        let ts: Timestamp = rec[0].trim().parse()?;
        check_monotonic(&csv_path, prev, ts)?;
        prev = Some(ts);
        entries.push((
            ts,
            ImageRef {
                path: image_dir.join(rec[1].trim()),
            },
        ));
    }
    Ok(entries)
}

fn load_imu_list(csv_path: PathBuf) -> Result<Vec<(Timestamp, ImuReading)>> {
    let mut rdr = csv_reader(&csv_path)?;

    let mut entries = Vec::new();
    let mut prev = None;
    for rec in rdr.records() {
        let rec = rec?;
        if rec.len() < 7 {
            continue;
        }
        let ts: Timestamp = rec[0].trim().parse()?;
        check_monotonic(&csv_path, prev, ts)?;
        prev = Some(ts);
        let gyro = Vector3::new(
            rec[1].trim().parse()?,
            rec[2].trim().parse()?,
            rec[3].trim().parse()?,
        );
        let accel = Vector3::new(
            rec[4].trim().parse()?,
            rec[5].trim().parse()?,
            rec[6].trim().parse()?,
        );
        entries.push((ts, ImuReading { accel, gyro }));
    }
    Ok(entries)
}

/// Ground truth rows start with `timestamp, p xyz, q wxyz`; EuRoC appends
/// velocity and biases, TUM-VI mocap stops there. Extra columns are ignored.
fn load_groundtruth_list(csv_path: PathBuf) -> Result<Vec<(Timestamp, SE3)>> {
    let mut rdr = csv_reader(&csv_path)?;

    let mut entries = Vec::new();
    let mut prev = None;
    for rec in rdr.records() {
        let rec = rec?;
        if rec.len() < 8 {
            continue;
        }
        let ts: Timestamp = rec[0].trim().parse()?;
        check_monotonic(&csv_path, prev, ts)?;
        prev = Some(ts);

        let position = Vector3::new(
            rec[1].trim().parse()?,
            rec[2].trim().parse()?,
            rec[3].trim().parse()?,
        );
        let qw: f64 = rec[4].trim().parse()?;
        let qx: f64 = rec[5].trim().parse()?;
        let qy: f64 = rec[6].trim().parse()?;
        let qz: f64 = rec[7].trim().parse()?;
        entries.push((ts, SE3::from_quaternion(qw, qx, qy, qz, position)));
    }
    Ok(entries)
}

/// T_BS transform format: has cols, rows, data fields
#[derive(Debug, Deserialize)]
struct TransformYaml {
    data: Vec<f64>,
}

/// ASL camera sensor.yaml format
#[derive(Debug, Deserialize)]
struct CameraYaml {
    #[serde(rename = "T_BS")]
    t_bs: TransformYaml,
    /// [fu, fv, cu, cv] intrinsics
    intrinsics: Vec<f64>,
    #[serde(default)]
    distortion_model: Option<String>,
    #[serde(default)]
    distortion_coefficients: Vec<f64>,
    #[serde(default)]
    rate_hz: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RateYaml {
    #[serde(default)]
    rate_hz: Option<f64>,
}

pub fn load_camera_calibration(yaml_path: &Path) -> Result<CameraCalibration> {
    let file = File::open(yaml_path).with_context(|| format!("Failed to open {:?}", yaml_path))?;
    let cam: CameraYaml = serde_yaml::from_reader(file)
        .with_context(|| format!("Failed to parse {:?}", yaml_path))?;
    camera_from_yaml(cam)
}

fn camera_from_yaml(cam: CameraYaml) -> Result<CameraCalibration> {
    if cam.intrinsics.len() != 4 {
        bail!(
            "Expected 4 intrinsics [fu, fv, cu, cv], got {}",
            cam.intrinsics.len()
        );
    }
    let distortion_model = cam
        .distortion_model
        .as_deref()
        .map(DistortionModel::from_tag)
        .unwrap_or(DistortionModel::RadialTangential);

    Ok(CameraCalibration {
        f_u: cam.intrinsics[0],
        f_v: cam.intrinsics[1],
        c_u: cam.intrinsics[2],
        c_v: cam.intrinsics[3],
        distortion_model,
        distortion_coefficients: cam.distortion_coefficients,
        t_body_cam: transform_from(&cam.t_bs.data)?,
        frame_period: cam.rate_hz.filter(|r| *r > 0.0).map(|r| 1.0 / r),
    })
}

fn load_sensor_rate(yaml_path: &Path) -> Option<f64> {
    let file = File::open(yaml_path).ok()?;
    match serde_yaml::from_reader::<_, RateYaml>(file) {
        Ok(yaml) => yaml.rate_hz.filter(|r| *r > 0.0),
        Err(e) => {
            warn!("Could not read rate from {:?}: {}", yaml_path, e);
            None
        }
    }
}

fn transform_from(data: &[f64]) -> Result<SE3> {
    if data.len() != 16 {
        bail!("Expected 16 elements for transform, got {}", data.len());
    }
    Ok(SE3::from_matrix(Matrix4::from_row_slice(data)))
}
