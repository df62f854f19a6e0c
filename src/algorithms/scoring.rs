use crate::config::{parse_params, StageParams};
use crate::data::DataPoint;
use crate::error::{PipelineError, Result};
use crate::stage::Stage;
use serde::Deserialize;
use std::collections::VecDeque;

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct MaxDiffParams {
    k: usize,
}

impl Default for MaxDiffParams {
    fn default() -> Self {
        Self { k: 3 }
    }
}

/// Peakiness as the mean of the largest rise over the `k` samples on each side.
///
/// A sample scores high when it stands above both its left and right
/// neighbours. Needs `k` samples of lookahead, so the first and last `k`
/// samples are not scored.
#[derive(Debug)]
pub struct MaxDiff {
    k: usize,
    window: VecDeque<DataPoint>,
}

impl MaxDiff {
    pub fn new(k: usize) -> Result<Self> {
        if k == 0 {
            return Err(PipelineError::invalid_parameter("max_diff", "k must be at least 1"));
        }
        Ok(Self {
            k,
            window: VecDeque::with_capacity(2 * k + 1),
        })
    }

    pub fn from_params(params: &StageParams) -> Result<Self> {
        let params: MaxDiffParams = parse_params("max_diff", params)?;
        Self::new(params.k)
    }

    fn score(&self) -> f64 {
        let center = self.window[self.k].value;
        let left = (0..self.k)
            .map(|i| center - self.window[i].value)
            .fold(f64::NEG_INFINITY, f64::max);
        let right = (self.k + 1..self.window.len())
            .map(|i| center - self.window[i].value)
            .fold(f64::NEG_INFINITY, f64::max);
        (left + right) / 2.0
    }
}

impl Stage<DataPoint, DataPoint> for MaxDiff {
    fn process(&mut self, input: DataPoint) -> Result<Vec<DataPoint>> {
        self.window.push_back(input);
        if self.window.len() < 2 * self.k + 1 {
            return Ok(Vec::new());
        }

        let scored = self.window[self.k].with_value(self.score());
        self.window.pop_front();
        Ok(vec![scored])
    }

    fn name(&self) -> &str {
        "max_diff"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peak_scores_highest() {
        let mut scorer = MaxDiff::new(1).unwrap();
        let values = [1.0, 2.0, 5.0, 2.0, 1.0];
        let scores: Vec<_> = values
            .iter()
            .enumerate()
            .flat_map(|(t, v)| scorer.process(DataPoint::new(t as f64, *v)).unwrap())
            .collect();

        assert_eq!(
            scores,
            vec![
                DataPoint::new(1.0, -1.0),
                DataPoint::new(2.0, 3.0),
                DataPoint::new(3.0, -1.0),
            ]
        );
    }

    #[test]
    fn test_wider_window_uses_largest_rise() {
        let mut scorer = MaxDiff::new(2).unwrap();
        let mut out = Vec::new();
        for (t, v) in [0.0, 4.0, 5.0, 3.0, 1.0].into_iter().enumerate() {
            out.extend(scorer.process(DataPoint::new(t as f64, v)).unwrap());
        }
        // left rise max(5-0, 5-4) = 5, right rise max(5-3, 5-1) = 4
        assert_eq!(out, vec![DataPoint::new(2.0, 4.5)]);
    }

    #[test]
    fn test_rejects_zero_k() {
        assert!(matches!(
            MaxDiff::new(0),
            Err(PipelineError::InvalidParameter { .. })
        ));
    }
}
