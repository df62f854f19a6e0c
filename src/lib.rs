//! A threaded five-stage pipeline for windowed peak detection on streaming signals.
//!
//! Raw samples flow through pre-processing, a smoothing window, a peak
//! scoring function, a peak detector and a post-processor. Each stage runs on
//! its own thread and hands items to the next through an unbounded
//! [`WorkQueue`]. Along the way every stage publishes what it saw to an
//! [`ObservableSequence`], which fans values out to observers such as a UI.
//!
//! # Features
//!
//! - Uniform stage lifecycle (`start`, `stop`, `is_done`, `is_running`)
//! - Cancellable blocking pops, so `stop` never deadlocks on an idle stage
//! - Pluggable windows and scorers selected by name from an [`AlgorithmRegistry`]
//! - Configuration errors fail at build time, before any thread starts
//! - Per-stage metrics: throughput and processing latency percentiles
//!
//! # Example
//!
//! ```ignore
//! use wpd_pipeline::{params, AlgorithmRegistry, DataPoint, PipelineBuilder, WorkQueue};
//! use serde_json::json;
//!
//! let source = WorkQueue::new();
//! let pipeline = PipelineBuilder::new()
//!     .window("moving_average", params([("size", json!(5))]))
//!     .peak_scorer("max_diff", params([("k", json!(3))]))
//!     .peak_detector(params([("h", json!(1.5))]))
//!     .build(source.clone(), &AlgorithmRegistry::with_builtins())?;
//!
//! pipeline.start()?;
//! for (t, v) in samples {
//!     source.push(DataPoint::new(t, v)).ok();
//! }
//! source.close();
//! pipeline.wait(Duration::from_secs(5))?;
//! println!("steps: {}", pipeline.steps());
//! ```

pub mod algorithms;
pub mod config;
pub mod data;
pub mod error;
pub mod metrics;
pub mod observable;
pub mod pipeline;
pub mod queue;
pub mod registry;
pub mod stage;

// Re-exports for convenience
pub use config::{params, AlgorithmConfig, PipelineConfig, StageParams};
pub use data::DataPoint;
pub use error::{PipelineError, Result};
pub use metrics::{MetricsSnapshot, StageMetrics};
pub use observable::{ObservableSequence, Observer};
pub use pipeline::{topics, Pipeline, PipelineBuilder};
pub use queue::{Popped, WorkQueue};
pub use registry::{AlgorithmFactory, AlgorithmRegistry, PointStage};
pub use stage::{Lifecycle, MapStage, Passthrough, Stage, StageRunner, StageStatus};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
