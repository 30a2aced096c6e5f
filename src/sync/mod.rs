//! Merging of asynchronous sensor streams into one causally ordered timeline.

mod synchronizer;

pub use synchronizer::{Sample, SynchronizedSlot, Synchronizer};
