//! Buffers IMU readings between camera frames and hands them to the filter's
//! propagation step with per-reading integration periods.
//!
//! The buffer is seeded with the residual readings left over by the
//! initialization so nothing captured after the calibration window is lost.

use super::sample::{ImuEntry, ImuReading, Timestamp, seconds_between};

/// A reading paired with the period it should be propagated over.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimedReading {
    pub reading: ImuReading,
    pub dt: f64,
}

#[derive(Debug, Clone, Default)]
pub struct ImuReplayBuffer {
    entries: Vec<ImuEntry>,
}

impl ImuReplayBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_residual(residual: Vec<ImuEntry>) -> Self {
        Self { entries: residual }
    }

    pub fn push(&mut self, entry: ImuEntry) {
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drain everything buffered up to a camera frame at `frame_ns`.
    ///
    /// Needs at least two buffered readings; otherwise nothing is drained.
    /// The last reading is held across the frame: it stays in the buffer,
    /// re-stamped at `frame_ns`, and starts the next batch.
    pub fn drain_for_frame(&mut self, frame_ns: Timestamp) -> Vec<TimedReading> {
        if self.entries.len() < 2 {
            return Vec::new();
        }

        let mut timed: Vec<TimedReading> = self
            .entries
            .windows(2)
            .map(|pair| TimedReading {
                reading: pair[0].reading,
                dt: seconds_between(pair[0].timestamp_ns, pair[1].timestamp_ns),
            })
            .collect();

        let Some(last) = self.entries.last().copied() else {
            return timed;
        };
        timed.push(TimedReading {
            reading: last.reading,
            dt: seconds_between(last.timestamp_ns, frame_ns).max(0.0),
        });

        self.entries.clear();
        self.entries.push(ImuEntry {
            timestamp_ns: frame_ns,
            reading: last.reading,
        });

        timed
    }
}
