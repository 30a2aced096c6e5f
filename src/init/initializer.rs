use tracing::info;

use super::gravity::DEFAULT_MIN_RCOND;
use super::state::{CalibrationWindow, InitMode, InitPhase, Initialization};
use super::{ground_truth, leveling};
use crate::error::{InitError, InitResult};
use crate::geometry::SE3;
use crate::imu::{GRAVITY_MAGNITUDE, ImuReading, Timestamp};
use crate::io::{ImageRef, SensorStream};
use crate::sync::{SynchronizedSlot, Synchronizer};

/// Parameters of one initialization run.
#[derive(Debug, Clone, Copy)]
pub struct InitializerConfig {
    pub window: CalibrationWindow,
    pub mode: InitMode,
    pub gravity_magnitude: f64,
    pub min_rcond: f64,
}

impl InitializerConfig {
    pub fn new(window: CalibrationWindow, mode: InitMode) -> Self {
        Self {
            window,
            mode,
            gravity_magnitude: GRAVITY_MAGNITUDE,
            min_rcond: DEFAULT_MIN_RCOND,
        }
    }
}

/// Drives the synchronizer through the calibration window and produces the
/// initial state.
///
/// Single use: a second call to [`Initializer::run`] is a configuration error.
#[derive(Debug)]
pub struct Initializer {
    config: InitializerConfig,
    phase: InitPhase,
}

impl Initializer {
    pub fn new(config: InitializerConfig) -> Self {
        Self {
            config,
            phase: InitPhase::default(),
        }
    }

    pub fn config(&self) -> &InitializerConfig {
        &self.config
    }

    pub fn phase(&self) -> InitPhase {
        self.phase
    }

    /// Consume slots up to the end of the calibration window.
    ///
    /// On success the synchronizer is positioned just after the last slot the
    /// procedure consumed; anything consumed but not yet propagated is
    /// returned in [`Initialization::residual_imu`].
    pub fn run<I, C, G>(&mut self, sync: &mut Synchronizer<I, C, G>) -> InitResult<Initialization>
    where
        I: SensorStream<Sample = ImuReading>,
        C: SensorStream<Sample = ImageRef>,
        G: SensorStream<Sample = SE3>,
    {
        if self.phase != InitPhase::AwaitingWindowStart {
            return Err(InitError::Config(format!(
                "initializer already ran (phase {:?})",
                self.phase
            )));
        }

        info!(
            "Initializing ({:?}) over [{}, {})",
            self.config.mode,
            self.config.window.start(),
            self.config.window.end()
        );

        let result = match self.config.mode {
            InitMode::Leveling => leveling::run(sync, &self.config, &mut self.phase),
            InitMode::GroundTruthAssisted => ground_truth::run(sync, &self.config, &mut self.phase),
        }?;

        let state = &result.state;
        info!(
            "Initial state: q_IG {:?}, b_g {:?}, b_a {:?}, v_I_G {:?}, {} residual IMU samples",
            state.q_ig.coords.as_slice(),
            state.b_g.as_slice(),
            state.b_a.as_slice(),
            state.v_i_g.as_slice(),
            result.residual_imu.len()
        );
        Ok(result)
    }
}

pub(super) fn exhausted(phase: InitPhase, last_time: Option<Timestamp>) -> InitError {
    InitError::InsufficientData { phase, last_time }
}

/// Consume every slot strictly before the window start, handing each to `observe`.
///
/// Returns the first slot at or after the window start without consuming it.
pub(super) fn skip_to_window_start<I, C, G>(
    sync: &mut Synchronizer<I, C, G>,
    window: &CalibrationWindow,
    phase: InitPhase,
    mut observe: impl FnMut(&SynchronizedSlot),
) -> InitResult<SynchronizedSlot>
where
    I: SensorStream<Sample = ImuReading>,
    C: SensorStream<Sample = ImageRef>,
    G: SensorStream<Sample = SE3>,
{
    let mut last_time = None;
    loop {
        let slot = sync.peek().ok_or_else(|| exhausted(phase, last_time))?;
        if slot.timestamp_ns >= window.start() {
            return Ok(slot);
        }
        observe(&slot);
        last_time = Some(slot.timestamp_ns);
        sync.advance();
    }
}
