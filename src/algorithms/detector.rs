use crate::config::{parse_params, StageParams};
use crate::data::DataPoint;
use crate::error::{PipelineError, Result};
use crate::stage::Stage;
use serde::{Deserialize, Serialize};

/// Detector parameters. Exactly one of `threshold` and `h` must be set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DetectorParams {
    /// Fixed score threshold
    pub threshold: Option<f64>,
    /// Adaptive threshold: running mean plus `h` standard deviations
    pub h: Option<f64>,
}

#[derive(Debug, Clone, Copy)]
enum Rule {
    Fixed(f64),
    Adaptive(f64),
}

/// Running mean and variance (Welford)
#[derive(Debug, Default)]
struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
}

impl RunningStats {
    fn push(&mut self, x: f64) {
        self.count += 1;
        let delta = x - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (x - self.mean);
    }

    fn std_dev(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            (self.m2 / self.count as f64).sqrt()
        }
    }
}

/// Emits every score strictly above the threshold as a candidate peak
#[derive(Debug)]
pub struct PeakDetector {
    rule: Rule,
    stats: RunningStats,
}

impl PeakDetector {
    pub fn new(params: DetectorParams) -> Result<Self> {
        let rule = match (params.threshold, params.h) {
            (Some(threshold), None) if threshold.is_finite() => Rule::Fixed(threshold),
            (None, Some(h)) if h.is_finite() && h >= 0.0 => Rule::Adaptive(h),
            (None, None) => {
                return Err(PipelineError::invalid_parameter(
                    "peak_detector",
                    "one of 'threshold' or 'h' is required",
                ))
            }
            (Some(_), Some(_)) => {
                return Err(PipelineError::invalid_parameter(
                    "peak_detector",
                    "'threshold' and 'h' are mutually exclusive",
                ))
            }
            _ => {
                return Err(PipelineError::invalid_parameter(
                    "peak_detector",
                    "threshold must be finite and h non-negative",
                ))
            }
        };
        Ok(Self {
            rule,
            stats: RunningStats::default(),
        })
    }

    pub fn from_params(params: &StageParams) -> Result<Self> {
        Self::new(parse_params("peak_detector", params)?)
    }
}

impl Stage<DataPoint, DataPoint> for PeakDetector {
    fn process(&mut self, score: DataPoint) -> Result<Vec<DataPoint>> {
        let threshold = match self.rule {
            Rule::Fixed(threshold) => threshold,
            Rule::Adaptive(h) => {
                self.stats.push(score.value);
                // Too little history to tell a peak from noise.
                if self.stats.count < 2 {
                    return Ok(Vec::new());
                }
                self.stats.mean + h * self.stats.std_dev()
            }
        };

        if score.value > threshold {
            Ok(vec![score])
        } else {
            Ok(Vec::new())
        }
    }

    fn name(&self) -> &str {
        "peak_detector"
    }
}
