use crate::config::{parse_params, StageParams};
use crate::data::DataPoint;
use crate::error::{PipelineError, Result};
use crate::stage::Stage;
use serde::{Deserialize, Serialize};

/// Pre-processing parameters. The defaults make the stage a no-op for
/// finite input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PreProcessingParams {
    /// Multiplier applied to every sample value
    pub scale: f64,
    /// Added after scaling
    pub offset: f64,
    /// Silently skip NaN and infinite samples instead of failing the stage
    pub drop_non_finite: bool,
}

impl Default for PreProcessingParams {
    fn default() -> Self {
        Self {
            scale: 1.0,
            offset: 0.0,
            drop_non_finite: true,
        }
    }
}

/// Normalizes raw samples: affine rescale and removal of unusable values
#[derive(Debug)]
pub struct PreProcessor {
    params: PreProcessingParams,
}

impl PreProcessor {
    pub fn new(params: PreProcessingParams) -> Result<Self> {
        if !params.scale.is_finite() || !params.offset.is_finite() {
            return Err(PipelineError::invalid_parameter(
                "pre_processing",
                "scale and offset must be finite",
            ));
        }
        Ok(Self { params })
    }

    pub fn from_params(params: &StageParams) -> Result<Self> {
        Self::new(parse_params("pre_processing", params)?)
    }
}

impl Stage<DataPoint, DataPoint> for PreProcessor {
    fn process(&mut self, input: DataPoint) -> Result<Vec<DataPoint>> {
        if !input.time.is_finite() || !input.value.is_finite() {
            if self.params.drop_non_finite {
                return Ok(Vec::new());
            }
            return Err(PipelineError::StageError(format!("non-finite sample {input}")));
        }
        let value = input.value * self.params.scale + self.params.offset;
        Ok(vec![input.with_value(value)])
    }

    fn name(&self) -> &str {
        "pre_processor"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_noop() {
        let mut stage = PreProcessor::from_params(&StageParams::new()).unwrap();
        let point = DataPoint::new(0.5, 9.81);
        assert_eq!(stage.process(point).unwrap(), vec![point]);
    }

    #[test]
    fn test_scale_and_offset() {
        let mut stage = PreProcessor::new(PreProcessingParams {
            scale: 2.0,
            offset: -1.0,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(
            stage.process(DataPoint::new(1.0, 3.0)).unwrap(),
            vec![DataPoint::new(1.0, 5.0)]
        );
    }

    #[test]
    fn test_non_finite_dropped_or_rejected() {
        let mut lenient = PreProcessor::new(PreProcessingParams::default()).unwrap();
        assert!(lenient.process(DataPoint::new(0.0, f64::NAN)).unwrap().is_empty());

        let mut strict = PreProcessor::new(PreProcessingParams {
            drop_non_finite: false,
            ..Default::default()
        })
        .unwrap();
        assert!(strict.process(DataPoint::new(0.0, f64::INFINITY)).is_err());
    }

    #[test]
    fn test_rejects_unknown_parameter() {
        let mut params = StageParams::new();
        params.insert("gain".into(), serde_json::json!(2.0));
        assert!(PreProcessor::from_params(&params).is_err());
    }
}
