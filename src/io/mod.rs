//! Sensor streams and ASL dataset loading.

pub mod euroc;
pub mod stream;

pub use euroc::{AslDataset, CameraCalibration, DistortionModel, ImageRef};
pub use stream::{SensorStream, VecStream};
