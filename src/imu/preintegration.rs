use nalgebra::{Matrix3, Vector3};
use tracing::warn;

use super::sample::{ImuReading, Timestamp, seconds_between};

/// One IMU reading inside an inter-keyframe interval, with the rotation
/// taking the body frame at that instant into the segment's reference frame.
#[derive(Debug, Clone, Copy)]
pub struct SegmentSample {
    pub timestamp_ns: Timestamp,
    pub reading: ImuReading,
    pub rotation: Matrix3<f64>,
}

/// Position (alpha) and velocity (beta) increments over one interval,
/// expressed in the reference frame of its first keyframe.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreintegratedSegment {
    pub alpha: Vector3<f64>,
    pub beta: Vector3<f64>,
    pub start_ns: Timestamp,
    pub end_ns: Timestamp,
}

impl PreintegratedSegment {
    pub fn duration_s(&self) -> f64 {
        seconds_between(self.start_ns, self.end_ns)
    }
}

/// First-order (Euler) double integrator for specific force.
///
/// Each sub-interval uses the reading and rotation of its left sample, so the
/// specific force is piecewise constant. Gyro bias is not corrected here.
#[derive(Debug, Clone, Default)]
pub struct Preintegrator {
    alpha: Vector3<f64>,
    beta: Vector3<f64>,
    start_ns: Option<Timestamp>,
    last: Option<SegmentSample>,
}

impl Preintegrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Extend the integration by the interval from the previous sample to `sample`.
    pub fn integrate(&mut self, sample: SegmentSample) {
        let Some(prev) = self.last else {
            self.start_ns = Some(sample.timestamp_ns);
            self.last = Some(sample);
            return;
        };

        if sample.timestamp_ns < prev.timestamp_ns {
            warn!(
                "Skipping out-of-order IMU sample at {} (previous {})",
                sample.timestamp_ns, prev.timestamp_ns
            );
            return;
        }

        let dt = seconds_between(prev.timestamp_ns, sample.timestamp_ns);
        let accel_ref = prev.rotation * prev.reading.accel;

        self.alpha += self.beta * dt + 0.5 * accel_ref * dt * dt;
        self.beta += accel_ref * dt;
        self.last = Some(sample);
    }

    /// The accumulated segment, once at least two samples were integrated.
    pub fn segment(&self) -> Option<PreintegratedSegment> {
        let start_ns = self.start_ns?;
        let end_ns = self.last?.timestamp_ns;
        if end_ns <= start_ns {
            return None;
        }
        Some(PreintegratedSegment {
            alpha: self.alpha,
            beta: self.beta,
            start_ns,
            end_ns,
        })
    }

    /// Integrate a whole interval in sample order.
    pub fn preintegrate(samples: &[SegmentSample]) -> Option<PreintegratedSegment> {
        let mut preintegrator = Self::new();
        for sample in samples {
            preintegrator.integrate(*sample);
        }
        preintegrator.segment()
    }
}
