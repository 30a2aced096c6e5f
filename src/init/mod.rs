//! Initial state estimation over a calibration window.
//!
//! Two procedures are available: leveling from a stand-still period, and a
//! ground-truth-assisted procedure that estimates gravity from preintegrated
//! keyframe segments and velocity from ground-truth keyframe positions.

pub mod gravity;
mod ground_truth;
mod initializer;
mod leveling;
pub mod state;
pub mod velocity;

pub use gravity::{GravityLeastSquares, renormalize};
pub use initializer::{Initializer, InitializerConfig};
pub use state::{CalibrationWindow, InitMode, InitPhase, InitialState, Initialization};
pub use velocity::{Knot, backward_difference_velocity};
