//! Built-in strategies for the five pipeline stages.
//!
//! Windows and scorers are reached through the
//! [`AlgorithmRegistry`](crate::registry::AlgorithmRegistry); the
//! pre-processor, detector and post-processor are configured by parameters
//! alone.

pub mod detector;
pub mod postprocess;
pub mod preprocess;
pub mod scoring;
pub mod window;

pub use detector::{DetectorParams, PeakDetector};
pub use postprocess::{PostProcessingParams, PostProcessor};
pub use preprocess::{PreProcessingParams, PreProcessor};
pub use scoring::MaxDiff;
pub use window::MovingAverage;

use crate::config::{parse_params, StageParams};
use crate::error::Result;
use crate::registry::{AlgorithmRegistry, PointStage};
use crate::stage::Passthrough;
use serde::Deserialize;

/// Parameters for algorithms that take none
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct NoParams {}

fn identity(kind: &str, params: &StageParams) -> Result<PointStage> {
    parse_params::<NoParams>(kind, params)?;
    Ok(Box::new(Passthrough))
}

/// Register every built-in window and scorer
pub fn register_builtins(registry: &mut AlgorithmRegistry) {
    registry.register_window("identity", |params: &StageParams| identity("identity window", params));
    registry.register_window("moving_average", |params: &StageParams| -> Result<PointStage> {
        Ok(Box::new(MovingAverage::from_params(params)?))
    });

    registry.register_scorer("identity", |params: &StageParams| identity("identity scorer", params));
    registry.register_scorer("max_diff", |params: &StageParams| -> Result<PointStage> {
        Ok(Box::new(MaxDiff::from_params(params)?))
    });
}
