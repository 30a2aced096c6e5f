//! Sensor streams: monotonically timestamped sources of one sample type.

use crate::imu::{Timestamp, seconds_between};

/// A source of timestamped samples consumed one at a time.
///
/// `current_*` accessors describe the next unconsumed sample and never move
/// the stream; only `advance` does.
pub trait SensorStream {
    type Sample: Clone;

    /// Name used in log messages.
    fn name(&self) -> &str;

    /// Timestamp of the next unconsumed sample, `None` once exhausted.
    fn current_time(&self) -> Option<Timestamp>;

    /// Nominal inter-sample period in seconds.
    fn current_dt(&self) -> f64;

    /// True while an unconsumed sample remains.
    fn has_next(&self) -> bool;

    /// Consume the current sample.
    fn advance(&mut self);

    fn current_sample(&self) -> Option<&Self::Sample>;
}

/// In-memory stream over samples loaded up front.
#[derive(Debug, Clone)]
pub struct VecStream<T> {
    name: String,
    samples: Vec<(Timestamp, T)>,
    cursor: usize,
    nominal_dt: f64,
}

impl<T: Clone> VecStream<T> {
    /// Samples must already be in non-decreasing timestamp order.
    /// The nominal period defaults to the mean sample spacing.
    pub fn new(name: impl Into<String>, samples: Vec<(Timestamp, T)>) -> Self {
        let nominal_dt = mean_spacing(&samples);
        Self {
            name: name.into(),
            samples,
            cursor: 0,
            nominal_dt,
        }
    }

    pub fn empty(name: impl Into<String>) -> Self {
        Self::new(name, Vec::new())
    }

    /// Override the nominal period (e.g. from a sensor's `rate_hz`).
    pub fn with_nominal_dt(mut self, dt: f64) -> Self {
        self.nominal_dt = dt;
        self
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.samples.len() - self.cursor
    }
}

impl<T: Clone> SensorStream for VecStream<T> {
    type Sample = T;

    fn name(&self) -> &str {
        &self.name
    }

    fn current_time(&self) -> Option<Timestamp> {
        self.samples.get(self.cursor).map(|(ts, _)| *ts)
    }

    fn current_dt(&self) -> f64 {
        self.nominal_dt
    }

    fn has_next(&self) -> bool {
        self.cursor < self.samples.len()
    }

    fn advance(&mut self) {
        if self.cursor < self.samples.len() {
            self.cursor += 1;
        }
    }

    fn current_sample(&self) -> Option<&T> {
        self.samples.get(self.cursor).map(|(_, sample)| sample)
    }
}

fn mean_spacing<T>(samples: &[(Timestamp, T)]) -> f64 {
    match (samples.first(), samples.last()) {
        (Some((first, _)), Some((last, _))) if samples.len() > 1 => {
            seconds_between(*first, *last) / (samples.len() - 1) as f64
        }
        _ => 0.0,
    }
}
