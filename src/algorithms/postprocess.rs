use crate::config::{parse_params, StageParams};
use crate::data::DataPoint;
use crate::error::{PipelineError, Result};
use crate::stage::Stage;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PostProcessingParams {
    /// Candidates closer than this (in time units) collapse into the larger
    /// one. Zero confirms every candidate.
    pub min_separation: f64,
}

/// Confirms candidate peaks, merging ones that are too close together.
///
/// With merging enabled the most recent candidate is held back until a
/// candidate at least `min_separation` later arrives, or the input ends.
#[derive(Debug)]
pub struct PostProcessor {
    min_separation: f64,
    pending: Option<DataPoint>,
}

impl PostProcessor {
    pub fn new(params: PostProcessingParams) -> Result<Self> {
        if !params.min_separation.is_finite() || params.min_separation < 0.0 {
            return Err(PipelineError::invalid_parameter(
                "post_processing",
                format!("min_separation must be >= 0, got {}", params.min_separation),
            ));
        }
        Ok(Self {
            min_separation: params.min_separation,
            pending: None,
        })
    }

    pub fn from_params(params: &StageParams) -> Result<Self> {
        Self::new(parse_params("post_processing", params)?)
    }
}

impl Stage<DataPoint, DataPoint> for PostProcessor {
    fn process(&mut self, candidate: DataPoint) -> Result<Vec<DataPoint>> {
        if self.min_separation == 0.0 {
            return Ok(vec![candidate]);
        }

        match self.pending.take() {
            None => {
                self.pending = Some(candidate);
                Ok(Vec::new())
            }
            Some(held) if candidate.time - held.time < self.min_separation => {
                self.pending = Some(if candidate.value > held.value { candidate } else { held });
                Ok(Vec::new())
            }
            Some(held) => {
                self.pending = Some(candidate);
                Ok(vec![held])
            }
        }
    }

    fn finish(&mut self) -> Result<Vec<DataPoint>> {
        Ok(self.pending.take().into_iter().collect())
    }

    fn name(&self) -> &str {
        "post_processor"
    }
}
