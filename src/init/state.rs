//! Initialization state machine and the state handed to the filter.

use nalgebra::{UnitQuaternion, Vector3};
use tracing::debug;

use crate::error::{InitError, InitResult};
use crate::imu::{ImuEntry, Timestamp};

/// Progress of the initialization procedure.
///
/// Transitions only move forward; `SolvedInitialState` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum InitPhase {
    /// Skipping samples that precede the calibration window.
    AwaitingWindowStart,
    /// Consuming samples inside the calibration window.
    AccumulatingWithinWindow,
    /// Window closed, solving for the initial state.
    WindowComplete,
    /// Initial state produced.
    SolvedInitialState,
}

impl InitPhase {
    pub(crate) fn advance_to(&mut self, next: InitPhase) {
        debug!("Initialization phase {:?} -> {:?}", self, next);
        *self = next;
    }
}

impl Default for InitPhase {
    fn default() -> Self {
        Self::AwaitingWindowStart
    }
}

/// How the initial state is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitMode {
    /// Stand-still accelerometer leveling, no ground truth required.
    Leveling,
    /// Gravity and velocity from ground-truth-aligned preintegration.
    GroundTruthAssisted,
}

/// Half-open calibration interval `[start, end)` on the dataset clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalibrationWindow {
    start: Timestamp,
    end: Timestamp,
}

impl CalibrationWindow {
    pub fn new(start: Timestamp, end: Timestamp) -> InitResult<Self> {
        if start >= end {
            return Err(InitError::Config(format!(
                "calibration window start {start} must precede end {end}"
            )));
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> Timestamp {
        self.start
    }

    pub fn end(&self) -> Timestamp {
        self.end
    }

    pub fn contains(&self, ts: Timestamp) -> bool {
        ts >= self.start && ts < self.end
    }
}

/// The estimator's initial IMU state.
///
/// `q_ig` rotates global-frame vectors into the IMU frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InitialState {
    pub q_ig: UnitQuaternion<f64>,
    pub b_g: Vector3<f64>,
    pub b_a: Vector3<f64>,
    pub g: Vector3<f64>,
    pub p_i_g: Vector3<f64>,
    pub v_i_g: Vector3<f64>,
}

/// Result of a completed initialization.
#[derive(Debug, Clone)]
pub struct Initialization {
    pub state: InitialState,
    /// Inertial samples consumed after the last keyframe but not yet
    /// propagated; replay them before the next live reading.
    pub residual_imu: Vec<ImuEntry>,
}
