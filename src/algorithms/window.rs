use crate::config::{parse_params, StageParams};
use crate::data::DataPoint;
use crate::error::{PipelineError, Result};
use crate::stage::Stage;
use serde::Deserialize;
use std::collections::VecDeque;

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct MovingAverageParams {
    size: usize,
}

impl Default for MovingAverageParams {
    fn default() -> Self {
        Self { size: 5 }
    }
}

/// Centered moving average over an odd number of samples.
///
/// Each output carries the timestamp of the window's middle sample, so the
/// stage lags by `size / 2` items. The first and last `size / 2` samples
/// never sit in the middle of a full window and produce no output.
#[derive(Debug)]
pub struct MovingAverage {
    size: usize,
    window: VecDeque<DataPoint>,
}

impl MovingAverage {
    pub fn new(size: usize) -> Result<Self> {
        if size == 0 || size % 2 == 0 {
            return Err(PipelineError::invalid_parameter(
                "moving_average",
                format!("size must be a positive odd number, got {size}"),
            ));
        }
        Ok(Self {
            size,
            window: VecDeque::with_capacity(size),
        })
    }

    pub fn from_params(params: &StageParams) -> Result<Self> {
        let params: MovingAverageParams = parse_params("moving_average", params)?;
        Self::new(params.size)
    }
}

impl Stage<DataPoint, DataPoint> for MovingAverage {
    fn process(&mut self, input: DataPoint) -> Result<Vec<DataPoint>> {
        self.window.push_back(input);
        if self.window.len() < self.size {
            return Ok(Vec::new());
        }

        let mean = self.window.iter().map(|p| p.value).sum::<f64>() / self.size as f64;
        let center = self.window[self.size / 2];
        self.window.pop_front();
        Ok(vec![center.with_value(mean)])
    }

    fn name(&self) -> &str {
        "moving_average"
    }
}
