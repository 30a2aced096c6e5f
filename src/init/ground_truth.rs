//! Ground-truth-assisted initialization.
//!
//! Every camera frame inside the window becomes a keyframe. Inertial samples
//! between consecutive keyframes receive interpolated ground-truth poses and
//! are preintegrated in the frame of the earlier keyframe; the stacked
//! segments give gravity, and the ground-truth positions at the keyframes
//! give velocity.

use nalgebra::{Matrix3, Vector3};
use tracing::{debug, info, trace, warn};

use super::gravity::{GravityLeastSquares, renormalize};
use super::initializer::{InitializerConfig, exhausted, skip_to_window_start};
use super::state::{InitPhase, InitialState, Initialization};
use super::velocity::{Knot, REQUIRED_KNOTS, backward_difference_velocity};
use crate::error::{InitError, InitResult};
use crate::geometry::{SE3, interpolate, rotation_between_vectors};
use crate::imu::{ImuEntry, ImuReading, Preintegrator, SegmentSample, Timestamp, seconds_between};
use crate::io::{ImageRef, SensorStream};
use crate::sync::Synchronizer;

/// An inertial sample awaiting its ground-truth pose.
#[derive(Debug, Clone, Copy)]
struct PendingSample {
    timestamp_ns: Timestamp,
    reading: ImuReading,
    pose: Option<SE3>,
}

/// Keyframe bookkeeping for the accumulation phase.
///
/// `samples[0]` is always the most recent keyframe.
struct KeyframeAccumulator {
    samples: Vec<PendingSample>,
    pending_keyframe: Option<usize>,
    last_ground_truth: (Timestamp, SE3),
    gravity: GravityLeastSquares,
    knots: Vec<Knot>,
}

impl KeyframeAccumulator {
    fn new(first: PendingSample, last_ground_truth: (Timestamp, SE3), min_rcond: f64) -> Self {
        Self {
            samples: vec![first],
            pending_keyframe: None,
            last_ground_truth,
            gravity: GravityLeastSquares::new(min_rcond),
            knots: Vec::new(),
        }
    }

    fn latest_reading(&self) -> ImuReading {
        // Never empty: the keyframe at index 0 is only ever drained up to.
        self.samples[self.samples.len() - 1].reading
    }

    fn push_inertial(&mut self, timestamp_ns: Timestamp, reading: ImuReading) {
        self.samples.push(PendingSample {
            timestamp_ns,
            reading,
            pose: None,
        });
    }

    /// A camera frame repeats the latest reading at its own timestamp and
    /// marks the end of the current segment.
    ///
    /// While ground truth has not yet caught up with a pending keyframe, a
    /// newer frame takes its place and the older one stays behind as an
    /// ordinary sample of a longer segment.
    fn push_keyframe(&mut self, timestamp_ns: Timestamp) {
        if let Some(idx) = self.pending_keyframe {
            debug!(
                "Keyframe at {} superseded by {} before ground truth arrived",
                self.samples[idx].timestamp_ns, timestamp_ns
            );
        }
        let reading = self.latest_reading();
        self.push_inertial(timestamp_ns, reading);
        self.pending_keyframe = Some(self.samples.len() - 1);
    }

    /// Assign poses to every sample between the previous ground truth and this one.
    fn attach_ground_truth(&mut self, now: Timestamp, pose: SE3) -> InitResult<()> {
        let (prev_ts, prev_pose) = self.last_ground_truth;
        for sample in self.samples.iter_mut().filter(|s| s.pose.is_none()) {
            if sample.timestamp_ns == now {
                sample.pose = Some(pose);
                continue;
            }
            let interpolated = interpolate(&prev_pose, &pose, prev_ts, now, sample.timestamp_ns)
                .ok_or_else(|| InitError::TemporalOrdering {
                    at: sample.timestamp_ns,
                    reason: format!("sample not bracketed by ground truth [{prev_ts}, {now}]"),
                })?;
            sample.pose = Some(interpolated);
        }
        self.last_ground_truth = (now, pose);
        Ok(())
    }

    /// Close the segment once the pending keyframe has a pose. Returns true
    /// when a segment was added.
    fn try_close_segment(&mut self) -> InitResult<bool> {
        let Some(idx) = self.pending_keyframe else {
            return Ok(false);
        };
        let keyframe = self.samples[idx];
        let Some(keyframe_pose) = keyframe.pose else {
            return Ok(false);
        };

        let r_keyframe_world = keyframe_rotation(&self.samples[0])?.transpose();
        let mut segment_samples = Vec::with_capacity(idx + 1);
        for sample in &self.samples[..=idx] {
            let pose = sample.pose.ok_or_else(|| InitError::TemporalOrdering {
                at: sample.timestamp_ns,
                reason: "keyframe closed before all earlier samples had poses".to_string(),
            })?;
            segment_samples.push(SegmentSample {
                timestamp_ns: sample.timestamp_ns,
                reading: sample.reading,
                rotation: r_keyframe_world * pose.rotation_matrix(),
            });
        }

        let segment = Preintegrator::preintegrate(&segment_samples).ok_or_else(|| {
            InitError::TemporalOrdering {
                at: keyframe.timestamp_ns,
                reason: "keyframe does not advance past the previous one".to_string(),
            }
        })?;
        self.gravity.add_segment(&segment, &r_keyframe_world);

        self.samples.drain(..idx);
        self.pending_keyframe = None;

        self.knots.push(Knot {
            timestamp_ns: keyframe.timestamp_ns,
            position: keyframe_pose.translation,
        });
        trace!(
            "Segment [{}, {}] closed: alpha {:?}, beta {:?}",
            segment.start_ns,
            segment.end_ns,
            segment.alpha.as_slice(),
            segment.beta.as_slice()
        );
        Ok(true)
    }
}

/// Mean spacing in seconds over the knots the finite-difference stencil uses.
fn knot_spacing(knots: &[Knot]) -> f64 {
    let recent = &knots[knots.len().saturating_sub(REQUIRED_KNOTS)..];
    match (recent.first(), recent.last()) {
        (Some(first), Some(last)) if recent.len() > 1 => {
            seconds_between(first.timestamp_ns, last.timestamp_ns) / (recent.len() - 1) as f64
        }
        _ => 0.0,
    }
}

fn keyframe_rotation(sample: &PendingSample) -> InitResult<Matrix3<f64>> {
    sample
        .pose
        .map(|p| p.rotation_matrix())
        .ok_or_else(|| InitError::TemporalOrdering {
            at: sample.timestamp_ns,
            reason: "keyframe has no ground-truth pose".to_string(),
        })
}

pub(super) fn run<I, C, G>(
    sync: &mut Synchronizer<I, C, G>,
    config: &InitializerConfig,
    phase: &mut InitPhase,
) -> InitResult<Initialization>
where
    I: SensorStream<Sample = ImuReading>,
    C: SensorStream<Sample = ImageRef>,
    G: SensorStream<Sample = SE3>,
{
    let window = config.window;
    let mut last_ground_truth: Option<(Timestamp, SE3)> = None;
    let mut last_reading: Option<ImuReading> = None;

    let first = skip_to_window_start(sync, &window, *phase, |slot| {
        if let Some(pose) = slot.ground_truth {
            last_ground_truth = Some((slot.timestamp_ns, pose));
        }
        if let Some(reading) = slot.imu {
            last_reading = Some(reading);
        }
    })?;

    let start_ns = first.timestamp_ns;
    if first.image.is_none() {
        return Err(InitError::ExpectedCameraFrame(start_ns));
    }
    if let Some(reading) = first.imu {
        last_reading = Some(reading);
    }
    if let Some(pose) = first.ground_truth {
        last_ground_truth = Some((start_ns, pose));
    }
    let reading = last_reading.ok_or(InitError::NoInertialSamples("before the first keyframe"))?;
    let (gt_ts, gt_pose) = last_ground_truth.ok_or(InitError::MissingGroundTruth(start_ns))?;

    let first_keyframe = PendingSample {
        timestamp_ns: start_ns,
        reading,
        pose: (gt_ts == start_ns).then_some(gt_pose),
    };
    let mut acc = KeyframeAccumulator::new(first_keyframe, (gt_ts, gt_pose), config.min_rcond);
    sync.advance();
    phase.advance_to(InitPhase::AccumulatingWithinWindow);
    debug!("First keyframe at {}", start_ns);

    let mut last_time = Some(start_ns);
    loop {
        let slot = sync.peek().ok_or_else(|| exhausted(*phase, last_time))?;
        let now = slot.timestamp_ns;

        if let Some(reading) = slot.imu {
            acc.push_inertial(now, reading);
        }
        if slot.image.is_some() {
            acc.push_keyframe(now);
        }
        if let Some(pose) = slot.ground_truth {
            acc.attach_ground_truth(now, pose)?;
        }

        let closed = acc.try_close_segment()?;
        sync.advance();
        last_time = Some(now);

        if closed && now >= window.end() && acc.knots.len() >= REQUIRED_KNOTS {
            break;
        }
    }
    phase.advance_to(InitPhase::WindowComplete);

    let gravity_reaction = renormalize(&acc.gravity.solve()?, config.gravity_magnitude)?;
    let r_keyframe_world = keyframe_rotation(&acc.samples[0])?.transpose();
    let knot_dt = knot_spacing(&acc.knots);
    let camera_dt = sync.camera().current_dt();
    if (knot_dt - camera_dt).abs() > 0.1 * camera_dt {
        warn!(
            "Keyframe spacing {:.4}s differs from the camera period {:.4}s; frames were superseded",
            knot_dt, camera_dt
        );
    }
    let velocity_world = backward_difference_velocity(&acc.knots, knot_dt)?;

    let up_in_body = r_keyframe_world * gravity_reaction;
    let q_ig = rotation_between_vectors(&Vector3::new(0.0, 0.0, config.gravity_magnitude), &up_in_body);
    let v_i_g = q_ig.inverse() * (r_keyframe_world * velocity_world);

    let residual_imu: Vec<ImuEntry> = acc
        .samples
        .iter()
        .map(|s| ImuEntry {
            timestamp_ns: s.timestamp_ns,
            reading: s.reading,
        })
        .collect();

    phase.advance_to(InitPhase::SolvedInitialState);
    info!(
        "Ground-truth initialization over {} segments and {} knots, gravity reaction {:?}",
        acc.gravity.num_segments(),
        acc.knots.len(),
        gravity_reaction.as_slice()
    );

    Ok(Initialization {
        state: InitialState {
            q_ig,
            b_g: Vector3::zeros(),
            b_a: Vector3::zeros(),
            g: Vector3::new(0.0, 0.0, -config.gravity_magnitude),
            p_i_g: Vector3::zeros(),
            v_i_g,
        },
        residual_imu,
    })
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use nalgebra::{UnitQuaternion, Vector3};

    use super::*;
    use crate::imu::GRAVITY_MAGNITUDE;
    use crate::init::{CalibrationWindow, InitMode, Initializer};
    use crate::io::VecStream;

    const IMU_STEP_NS: Timestamp = 5_000_000;
    const CAM_STEP_NS: Timestamp = 50_000_000;
    const DURATION_NS: Timestamp = 2_000_000_000;

    type Streams = Synchronizer<VecStream<ImuReading>, VecStream<ImageRef>, VecStream<SE3>>;

    /// Timestamps `offset, offset + step, ...` up to the end of the fixture.
    fn every(step_ns: Timestamp, offset_ns: Timestamp) -> Vec<Timestamp> {
        (0..)
            .map(|k| offset_ns + k * step_ns)
            .take_while(|&ts| ts <= DURATION_NS)
            .collect()
    }

    /// IMU at 200 Hz, camera at 20 Hz, ground truth at `gt_times`, constant
    /// orientation and constant world velocity.
    fn constant_motion(
        rotation: UnitQuaternion<f64>,
        velocity: Vector3<f64>,
        gt_times: Vec<Timestamp>,
    ) -> Streams {
        let accel = rotation.inverse() * Vector3::new(0.0, 0.0, GRAVITY_MAGNITUDE);

        let imu = every(IMU_STEP_NS, 0)
            .into_iter()
            .map(|ts| (ts, ImuReading::new(accel, Vector3::zeros())))
            .collect();
        let gt = gt_times
            .into_iter()
            .map(|ts| {
                let pose = SE3 {
                    rotation,
                    translation: velocity * (ts as f64 * 1e-9),
                };
                (ts, pose)
            })
            .collect();
        let cam = (0..=DURATION_NS / CAM_STEP_NS)
            .map(|k| {
                let ts = k * CAM_STEP_NS;
                (ts, ImageRef { path: format!("{ts}.png").into() })
            })
            .collect();

        Synchronizer::new(
            VecStream::new("imu0", imu),
            VecStream::new("cam0", cam),
            VecStream::new("gt0", gt),
        )
    }

    fn ground_truth_init(start: Timestamp, end: Timestamp) -> Initializer {
        let window = CalibrationWindow::new(start, end).unwrap();
        Initializer::new(InitializerConfig::new(window, InitMode::GroundTruthAssisted))
    }

    #[test]
    fn test_constant_velocity_level_platform() {
        let mut sync = constant_motion(UnitQuaternion::identity(), Vector3::new(1.0, 0.0, 0.0), every(IMU_STEP_NS, 0));
        let mut initializer = ground_truth_init(100_000_000, 800_000_000);
        let init = initializer.run(&mut sync).unwrap();

        assert_eq!(initializer.phase(), InitPhase::SolvedInitialState);
        assert_relative_eq!(init.state.q_ig, UnitQuaternion::identity(), epsilon = 1e-6);
        assert_relative_eq!(init.state.v_i_g, Vector3::new(1.0, 0.0, 0.0), epsilon = 1e-6);
        assert_relative_eq!(init.state.g, Vector3::new(0.0, 0.0, -GRAVITY_MAGNITUDE));
        assert_eq!(init.state.b_g, Vector3::zeros());
        assert_eq!(init.state.b_a, Vector3::zeros());
        assert_eq!(init.state.p_i_g, Vector3::zeros());

        // Only the closing keyframe remains, and the synchronizer resumes after it.
        assert_eq!(init.residual_imu.len(), 1);
        assert_eq!(init.residual_imu[0].timestamp_ns, 800_000_000);
        assert_eq!(sync.current_time(), Some(805_000_000));
    }

    #[test]
    fn test_tilted_platform_recovers_up_direction() {
        let rotation = UnitQuaternion::from_euler_angles(0.2, -0.1, 0.6);
        let mut sync = constant_motion(rotation, Vector3::zeros(), every(IMU_STEP_NS, 0));
        let init = ground_truth_init(100_000_000, 800_000_000).run(&mut sync).unwrap();

        let accel = rotation.inverse() * Vector3::new(0.0, 0.0, GRAVITY_MAGNITUDE);
        assert_relative_eq!(
            init.state.q_ig * Vector3::new(0.0, 0.0, GRAVITY_MAGNITUDE),
            accel,
            epsilon = 1e-6
        );
        assert_relative_eq!(init.state.v_i_g, Vector3::zeros(), epsilon = 1e-6);
    }

    #[test]
    fn test_tilted_motion_keeps_velocity_horizontal() {
        let rotation = UnitQuaternion::from_euler_angles(0.2, -0.1, 0.6);
        let mut sync = constant_motion(rotation, Vector3::new(0.6, -0.8, 0.0), every(IMU_STEP_NS, 0));
        let init = ground_truth_init(100_000_000, 800_000_000).run(&mut sync).unwrap();

        // The gravity-aligned frame differs from the world only by yaw.
        assert_relative_eq!(init.state.v_i_g.norm(), 1.0, epsilon = 1e-6);
        assert_relative_eq!(init.state.v_i_g.z, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_ground_truth_slower_than_camera() {
        // 10 Hz ground truth against a 20 Hz camera: every other frame is
        // superseded and segments span two camera periods.
        let mut sync = constant_motion(
            UnitQuaternion::identity(),
            Vector3::new(1.0, 0.0, 0.0),
            every(100_000_000, 0),
        );
        let mut initializer = ground_truth_init(100_000_000, 800_000_000);
        let init = initializer.run(&mut sync).unwrap();

        assert_eq!(initializer.phase(), InitPhase::SolvedInitialState);
        assert_relative_eq!(init.state.q_ig, UnitQuaternion::identity(), epsilon = 1e-6);
        assert_relative_eq!(init.state.v_i_g, Vector3::new(1.0, 0.0, 0.0), epsilon = 1e-6);
        assert_eq!(init.residual_imu.len(), 1);
        assert_eq!(init.residual_imu[0].timestamp_ns, 800_000_000);
    }

    #[test]
    fn test_ground_truth_between_imu_samples_is_interpolated() {
        // Ground truth offset by half an IMU period: no sample shares its timestamp.
        let mut sync = constant_motion(
            UnitQuaternion::identity(),
            Vector3::new(1.0, 0.0, 0.0),
            every(IMU_STEP_NS, IMU_STEP_NS / 2),
        );
        let init = ground_truth_init(100_000_000, 800_000_000)
            .run(&mut sync)
            .unwrap();

        assert_relative_eq!(init.state.q_ig, UnitQuaternion::identity(), epsilon = 1e-6);
        assert_relative_eq!(init.state.v_i_g, Vector3::new(1.0, 0.0, 0.0), epsilon = 1e-6);
        assert_eq!(init.residual_imu[0].timestamp_ns, 800_000_000);
        assert_eq!(sync.current_time(), Some(805_000_000));
    }

    #[test]
    fn test_interpolated_ground_truth_on_tilted_platform() {
        let rotation = UnitQuaternion::from_euler_angles(0.2, -0.1, 0.6);
        let mut sync = constant_motion(rotation, Vector3::zeros(), every(IMU_STEP_NS, IMU_STEP_NS / 2));
        let init = ground_truth_init(100_000_000, 800_000_000)
            .run(&mut sync)
            .unwrap();

        let accel = rotation.inverse() * Vector3::new(0.0, 0.0, GRAVITY_MAGNITUDE);
        assert_relative_eq!(
            init.state.q_ig * Vector3::new(0.0, 0.0, GRAVITY_MAGNITUDE),
            accel,
            epsilon = 1e-6
        );
        assert_relative_eq!(init.state.v_i_g, Vector3::zeros(), epsilon = 1e-6);
    }

    #[test]
    fn test_window_start_without_camera_frame() {
        let mut sync = constant_motion(UnitQuaternion::identity(), Vector3::x(), every(IMU_STEP_NS, 0));
        let err = ground_truth_init(105_000_000, 800_000_000)
            .run(&mut sync)
            .unwrap_err();
        assert!(matches!(err, InitError::ExpectedCameraFrame(105_000_000)));
    }

    #[test]
    fn test_missing_ground_truth_before_first_keyframe() {
        let mut sync = constant_motion(UnitQuaternion::identity(), Vector3::x(), every(IMU_STEP_NS, 300_000_000));
        let err = ground_truth_init(100_000_000, 800_000_000)
            .run(&mut sync)
            .unwrap_err();
        assert!(matches!(err, InitError::MissingGroundTruth(100_000_000)));
    }

    #[test]
    fn test_data_ending_inside_window() {
        let mut sync = constant_motion(UnitQuaternion::identity(), Vector3::x(), every(IMU_STEP_NS, 0));
        let mut initializer = ground_truth_init(1_500_000_000, 2_500_000_000);
        let err = initializer.run(&mut sync).unwrap_err();

        assert!(matches!(
            err,
            InitError::InsufficientData {
                phase: InitPhase::AccumulatingWithinWindow,
                last_time: Some(DURATION_NS)
            }
        ));
    }
}
