//! Errors raised while computing the estimator's initial state.
//!
//! Every variant is fatal for the run: calibration either completes once over
//! the configured window or it aborts.

use thiserror::Error;

use crate::imu::Timestamp;
use crate::init::InitPhase;

#[derive(Debug, Error)]
pub enum InitError {
    /// Missing or inconsistent configuration, detected before any processing.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The synchronizer ran dry before the calibration window completed.
    #[error("insufficient data: streams exhausted while {phase:?} (last time {last_time:?})")]
    InsufficientData {
        phase: InitPhase,
        last_time: Option<Timestamp>,
    },

    /// Inertial readings were required but none were observed.
    #[error("insufficient data: no inertial samples {0}")]
    NoInertialSamples(&'static str),

    /// Ground-truth mode needs a camera frame to anchor the first keyframe.
    #[error("expected a camera frame at calibration start, got none at {0}")]
    ExpectedCameraFrame(Timestamp),

    /// No ground-truth pose preceded the first keyframe.
    #[error("no ground-truth pose at or before {0}")]
    MissingGroundTruth(Timestamp),

    /// A sample could not be bracketed by the ground-truth poses seen so far.
    #[error("temporal ordering violated at {at}: {reason}")]
    TemporalOrdering { at: Timestamp, reason: String },

    /// The calibration motion does not constrain the requested quantity.
    #[error("insufficient excitation during calibration: {0}")]
    InsufficientExcitation(String),
}

impl InitError {
    /// True for the variants that signal the data ran out or was absent.
    pub fn is_insufficient_data(&self) -> bool {
        matches!(
            self,
            Self::InsufficientData { .. } | Self::NoInertialSamples(_)
        )
    }
}

pub type InitResult<T> = std::result::Result<T, InitError>;
