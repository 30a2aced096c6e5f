use nalgebra::Vector3;

/// Dataset clock timestamp in nanoseconds.
pub type Timestamp = u64;

/// Nominal gravity magnitude (m/s^2).
pub const GRAVITY_MAGNITUDE: f64 = 9.81;

/// Elapsed seconds from `t0` to `t1`. Negative when `t1` precedes `t0`.
#[inline]
pub fn seconds_between(t0: Timestamp, t1: Timestamp) -> f64 {
    if t1 >= t0 {
        (t1 - t0) as f64 * 1e-9
    } else {
        -((t0 - t1) as f64 * 1e-9)
    }
}

/// Single IMU measurement: specific force and angular rate in the body frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImuReading {
    pub accel: Vector3<f64>,
    pub gyro: Vector3<f64>,
}

impl ImuReading {
    pub fn new(accel: Vector3<f64>, gyro: Vector3<f64>) -> Self {
        Self { accel, gyro }
    }
}

/// An IMU reading stamped with the dataset clock.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImuEntry {
    pub timestamp_ns: Timestamp,
    pub reading: ImuReading,
}
