//! Parameter bundles and the serializable pipeline description.

use crate::error::{PipelineError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Stage parameters as a flexible key-value map
pub type StageParams = HashMap<String, serde_json::Value>;

/// Build a parameter bundle from key/value pairs
pub fn params<const N: usize>(pairs: [(&str, serde_json::Value); N]) -> StageParams {
    pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

/// Decode a parameter bundle into a typed, `#[serde(default)]` struct.
///
/// Unknown keys are rejected when the target uses `deny_unknown_fields`.
pub fn parse_params<P: DeserializeOwned>(stage: &str, params: &StageParams) -> Result<P> {
    let object: serde_json::Map<String, serde_json::Value> =
        params.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
    serde_json::from_value(serde_json::Value::Object(object))
        .map_err(|e| PipelineError::invalid_parameter(stage, e.to_string()))
}

/// A type selector plus its parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlgorithmConfig {
    /// Registry key, e.g. `"moving_average"`
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub params: StageParams,
}

impl AlgorithmConfig {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            params: StageParams::new(),
        }
    }

    /// Add one parameter
    pub fn param(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

impl Default for AlgorithmConfig {
    fn default() -> Self {
        Self::new("identity")
    }
}

/// Everything needed to build a pipeline except the source queue and the
/// observer.
///
/// ```json
/// {
///   "window": { "type": "moving_average", "params": { "size": 5 } },
///   "peak_scorer": { "type": "max_diff", "params": { "k": 3 } },
///   "peak_detector": { "h": 1.5 },
///   "post_processing": { "min_separation": 0.25 }
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub pre_processing: StageParams,
    pub window: AlgorithmConfig,
    pub peak_scorer: AlgorithmConfig,
    pub peak_detector: StageParams,
    pub post_processing: StageParams,
}

impl PipelineConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, Deserialize, PartialEq)]
    #[serde(default, deny_unknown_fields)]
    struct Sample {
        size: usize,
        label: Option<String>,
    }

    #[test]
    fn test_parse_params_defaults() {
        let parsed: Sample = parse_params("test", &StageParams::new()).unwrap();
        assert_eq!(parsed, Sample::default());
    }

    #[test]
    fn test_parse_params_rejects_bad_types() {
        let mut params = StageParams::new();
        params.insert("size".into(), serde_json::json!("five"));
        let err = parse_params::<Sample>("window", &params).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidParameter { ref stage, .. } if stage == "window"));
    }

    #[test]
    fn test_parse_params_rejects_unknown_keys() {
        let mut params = StageParams::new();
        params.insert("sise".into(), serde_json::json!(5));
        assert!(parse_params::<Sample>("window", &params).is_err());
    }

    #[test]
    fn test_pipeline_config_from_json() {
        let config = PipelineConfig::from_json_str(
            r#"{
                "window": { "type": "moving_average", "params": { "size": 5 } },
                "peak_detector": { "threshold": 4.0 }
            }"#,
        )
        .unwrap();
        assert_eq!(config.window.kind, "moving_average");
        assert_eq!(config.window.params["size"], serde_json::json!(5));
        assert_eq!(config.peak_scorer, AlgorithmConfig::new("identity"));
        assert_eq!(config.peak_detector["threshold"], serde_json::json!(4.0));
        assert!(config.pre_processing.is_empty());
    }

    #[test]
    fn test_pipeline_config_rejects_malformed_json() {
        assert!(matches!(
            PipelineConfig::from_json_str("{ window: }"),
            Err(PipelineError::Json(_))
        ));
    }

    #[test]
    fn test_missing_config_file() {
        let err = PipelineConfig::from_path("/nonexistent/wpd.json").unwrap_err();
        assert!(matches!(err, PipelineError::Config(ref msg) if msg.contains("wpd.json")));
    }

    #[test]
    fn test_algorithm_config_builder() {
        let config = AlgorithmConfig::new("max_diff").param("k", 2);
        assert_eq!(config.params["k"], serde_json::json!(2));
    }
}
