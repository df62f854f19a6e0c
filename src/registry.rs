//! Type-selector registry for the pluggable window and scoring stages.

use crate::config::{AlgorithmConfig, StageParams};
use crate::data::DataPoint;
use crate::error::{PipelineError, Result};
use crate::stage::Stage;
use std::collections::HashMap;
use std::sync::Arc;

/// A boxed stage that maps data points to data points
pub type PointStage = Box<dyn Stage<DataPoint, DataPoint>>;

/// Builds one algorithm instance from its parameter bundle
pub trait AlgorithmFactory: Send + Sync {
    fn create(&self, params: &StageParams) -> Result<PointStage>;
}

impl<F> AlgorithmFactory for F
where
    F: Fn(&StageParams) -> Result<PointStage> + Send + Sync,
{
    fn create(&self, params: &StageParams) -> Result<PointStage> {
        self(params)
    }
}

/// Maps type selectors to factories.
///
/// A registry is an ordinary value handed to
/// [`PipelineBuilder::build`](crate::pipeline::PipelineBuilder::build), so
/// pipelines built side by side can use different algorithm sets.
#[derive(Clone, Default)]
pub struct AlgorithmRegistry {
    windows: HashMap<String, Arc<dyn AlgorithmFactory>>,
    scorers: HashMap<String, Arc<dyn AlgorithmFactory>>,
}

impl AlgorithmRegistry {
    /// Creates a new, empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the built-in windows and scorers
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        crate::algorithms::register_builtins(&mut registry);
        registry
    }

    /// Registers a smoothing window under `name`, replacing any previous one
    pub fn register_window<F>(&mut self, name: &str, factory: F)
    where
        F: AlgorithmFactory + 'static,
    {
        self.windows.insert(name.to_string(), Arc::new(factory));
    }

    /// Registers a peak scoring function under `name`, replacing any previous one
    pub fn register_scorer<F>(&mut self, name: &str, factory: F)
    where
        F: AlgorithmFactory + 'static,
    {
        self.scorers.insert(name.to_string(), Arc::new(factory));
    }

    pub fn create_window(&self, config: &AlgorithmConfig) -> Result<PointStage> {
        Self::create(&self.windows, "window", config)
    }

    pub fn create_scorer(&self, config: &AlgorithmConfig) -> Result<PointStage> {
        Self::create(&self.scorers, "peak scorer", config)
    }

    /// Registered window selectors, sorted
    pub fn window_types(&self) -> Vec<&str> {
        sorted_keys(&self.windows)
    }

    /// Registered scorer selectors, sorted
    pub fn scorer_types(&self) -> Vec<&str> {
        sorted_keys(&self.scorers)
    }

    fn create(
        factories: &HashMap<String, Arc<dyn AlgorithmFactory>>,
        kind: &'static str,
        config: &AlgorithmConfig,
    ) -> Result<PointStage> {
        factories
            .get(&config.kind)
            .ok_or_else(|| PipelineError::UnknownAlgorithm {
                kind,
                name: config.kind.clone(),
            })?
            .create(&config.params)
    }
}

fn sorted_keys(map: &HashMap<String, Arc<dyn AlgorithmFactory>>) -> Vec<&str> {
    let mut keys: Vec<&str> = map.keys().map(String::as_str).collect();
    keys.sort_unstable();
    keys
}
