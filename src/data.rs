use serde::{Deserialize, Serialize};
use std::fmt;

/// A timestamped scalar flowing through the pipeline.
///
/// The same shape carries raw samples, smoothed values, peak scores,
/// candidate peaks and confirmed peaks; each stage decides what `value` means.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    pub time: f64,
    pub value: f64,
}

impl DataPoint {
    pub fn new(time: f64, value: f64) -> Self {
        Self { time, value }
    }

    /// Same timestamp, different value
    pub fn with_value(self, value: f64) -> Self {
        Self { value, ..self }
    }
}

impl fmt::Display for DataPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.3}, {:.3})", self.time, self.value)
    }
}

impl From<(f64, f64)> for DataPoint {
    fn from((time, value): (f64, f64)) -> Self {
        Self::new(time, value)
    }
}
