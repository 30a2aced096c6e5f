pub mod preintegration;
pub mod replay;
pub mod sample;

pub use preintegration::{PreintegratedSegment, Preintegrator, SegmentSample};
pub use replay::{ImuReplayBuffer, TimedReading};
pub use sample::{
    GRAVITY_MAGNITUDE, ImuEntry, ImuReading, Timestamp, seconds_between,
};
