//! Stand-still initialization: average the IMU over a window at rest.

use nalgebra::Vector3;
use tracing::{debug, info};

use super::initializer::{InitializerConfig, exhausted, skip_to_window_start};
use super::state::{InitPhase, InitialState, Initialization};
use crate::error::{InitError, InitResult};
use crate::geometry::{SE3, rotation_between_vectors};
use crate::imu::{ImuReading, Timestamp};
use crate::io::{ImageRef, SensorStream};
use crate::sync::Synchronizer;

/// Gyro bias is the mean angular rate. The orientation maps the gravity
/// reaction onto the mean specific force; whatever that rotation cannot
/// explain is attributed to accelerometer bias.
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
    skip_to_window_start(sync, &window, *phase, |_| {})?;
    phase.advance_to(InitPhase::AccumulatingWithinWindow);

    let mut accel_sum = Vector3::zeros();
    let mut gyro_sum = Vector3::zeros();
    let mut count = 0usize;
    let mut last_time: Option<Timestamp> = None;
    loop {
        let slot = sync.peek().ok_or_else(|| exhausted(*phase, last_time))?;
        if slot.timestamp_ns >= window.end() {
            break;
        }
        if let Some(reading) = slot.imu {
            accel_sum += reading.accel;
            gyro_sum += reading.gyro;
            count += 1;
        }
        last_time = Some(slot.timestamp_ns);
        sync.advance();
    }
    phase.advance_to(InitPhase::WindowComplete);

    if count == 0 {
        return Err(InitError::NoInertialSamples("inside the stand-still window"));
    }
    let accel_mean = accel_sum / count as f64;
    let gyro_mean = gyro_sum / count as f64;
    debug!(
        "Stand-still means over {} readings: accel {:?}, gyro {:?}",
        count,
        accel_mean.as_slice(),
        gyro_mean.as_slice()
    );

    let g = Vector3::new(0.0, 0.0, -config.gravity_magnitude);
    let q_ig = rotation_between_vectors(&(-g), &accel_mean);
    let b_a = q_ig * g + accel_mean;

    phase.advance_to(InitPhase::SolvedInitialState);
    info!("Leveled from {} stand-still IMU readings", count);

    Ok(Initialization {
        state: InitialState {
            q_ig,
            b_g: gyro_mean,
            b_a,
            g,
            p_i_g: Vector3::zeros(),
            v_i_g: Vector3::zeros(),
        },
        residual_imu: Vec::new(),
    })
}
