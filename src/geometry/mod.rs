//! Geometry utilities: SE3 transforms, SO(3) helpers, pose interpolation.

pub mod interpolation;
pub mod se3;
pub mod so3;

pub use interpolation::interpolate;
pub use se3::SE3;
pub use so3::rotation_between_vectors;
