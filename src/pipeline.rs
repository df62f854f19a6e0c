use crate::algorithms::{PeakDetector, PostProcessor, PreProcessor};
use crate::config::{AlgorithmConfig, PipelineConfig, StageParams};
use crate::data::DataPoint;
use crate::error::{PipelineError, Result};
use crate::observable::{ObservableSequence, Observer};
use crate::queue::WorkQueue;
use crate::registry::AlgorithmRegistry;
use crate::stage::{Lifecycle, StageRunner, StageStatus};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, warn};

type PointRunner = StageRunner<DataPoint, DataPoint>;
type Record = Arc<ObservableSequence<DataPoint>>;

/// Topic names the pipeline observer is subscribed under
pub mod topics {
    pub const RAW_DATA: &str = "raw_data";
    pub const SMOOTH_DATA: &str = "smooth_data";
    pub const PEAK_SCORE_DATA: &str = "peak_score_data";
    pub const PEAK_DATA: &str = "peak_data";
    pub const CONFIRMED_PEAK_DATA: &str = "confirmed_peak_data";
}

/// Builder for constructing peak detection pipelines
pub struct PipelineBuilder {
    config: PipelineConfig,
    observer: Option<Arc<dyn Observer<DataPoint>>>,
}

impl PipelineBuilder {
    /// Identity window and scorer, no-op pre- and post-processing. A detector
    /// rule must still be supplied.
    pub fn new() -> Self {
        Self::from_config(PipelineConfig::default())
    }

    pub fn from_config(config: PipelineConfig) -> Self {
        Self {
            config,
            observer: None,
        }
    }

    pub fn pre_processing(mut self, params: StageParams) -> Self {
        self.config.pre_processing = params;
        self
    }

    /// Select the smoothing window by registry name
    pub fn window(mut self, kind: impl Into<String>, params: StageParams) -> Self {
        self.config.window = AlgorithmConfig {
            kind: kind.into(),
            params,
        };
        self
    }

    /// Select the peak scoring function by registry name
    pub fn peak_scorer(mut self, kind: impl Into<String>, params: StageParams) -> Self {
        self.config.peak_scorer = AlgorithmConfig {
            kind: kind.into(),
            params,
        };
        self
    }

    pub fn peak_detector(mut self, params: StageParams) -> Self {
        self.config.peak_detector = params;
        self
    }

    pub fn post_processing(mut self, params: StageParams) -> Self {
        self.config.post_processing = params;
        self
    }

    /// Observer subscribed to all five published topics
    pub fn observer(mut self, observer: Arc<dyn Observer<DataPoint>>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Resolve every algorithm and wire the pipeline around `source`.
    ///
    /// All configuration errors surface here; no thread is started.
    pub fn build(self, source: WorkQueue<DataPoint>, registry: &AlgorithmRegistry) -> Result<Pipeline> {
        let config = self.config;

        let pre_processor = PreProcessor::from_params(&config.pre_processing)?;
        let window = registry.create_window(&config.window)?;
        let peak_scorer = registry.create_scorer(&config.peak_scorer)?;
        let peak_detector = PeakDetector::from_params(&config.peak_detector)?;
        let post_processor = PostProcessor::from_params(&config.post_processing)?;

        let data_queue: WorkQueue<DataPoint> = WorkQueue::new();
        let smoothed_queue: WorkQueue<DataPoint> = WorkQueue::new();
        let score_queue: WorkQueue<DataPoint> = WorkQueue::new();
        let peak_queue: WorkQueue<DataPoint> = WorkQueue::new();

        let raw_data: Record = Arc::new(ObservableSequence::new());
        let smoothed_data: Record = Arc::new(ObservableSequence::new());
        let peak_score_data: Record = Arc::new(ObservableSequence::new());
        let peak_data: Record = Arc::new(ObservableSequence::new());
        let confirmed_peaks: Record = Arc::new(ObservableSequence::new());

        if let Some(observer) = self.observer {
            raw_data.subscribe(Arc::clone(&observer), topics::RAW_DATA);
            smoothed_data.subscribe(Arc::clone(&observer), topics::SMOOTH_DATA);
            peak_score_data.subscribe(Arc::clone(&observer), topics::PEAK_SCORE_DATA);
            peak_data.subscribe(Arc::clone(&observer), topics::PEAK_DATA);
            confirmed_peaks.subscribe(observer, topics::CONFIRMED_PEAK_DATA);
        }

        let stages: Vec<Box<dyn Lifecycle>> = vec![
            Box::new(
                PointRunner::new("pre_processor", Box::new(pre_processor), source.clone())
                    .publish_output(Arc::clone(&raw_data))
                    .output_queue(data_queue.clone()),
            ),
            Box::new(
                PointRunner::new("window", window, data_queue.clone())
                    .output_queue(smoothed_queue.clone()),
            ),
            Box::new(
                PointRunner::new("peak_scorer", peak_scorer, smoothed_queue.clone())
                    .publish_input(Arc::clone(&smoothed_data))
                    .output_queue(score_queue.clone()),
            ),
            Box::new(
                PointRunner::new("peak_detector", Box::new(peak_detector), score_queue.clone())
                    .publish_input(Arc::clone(&peak_score_data))
                    .output_queue(peak_queue.clone()),
            ),
            Box::new(
                PointRunner::new("post_processor", Box::new(post_processor), peak_queue.clone())
                    .publish_input(Arc::clone(&peak_data))
                    .publish_output(Arc::clone(&confirmed_peaks)),
            ),
        ];

        info!(
            window = %config.window.kind,
            peak_scorer = %config.peak_scorer.kind,
            "pipeline built"
        );

        Ok(Pipeline {
            source,
            data_queue,
            smoothed_queue,
            score_queue,
            peak_queue,
            raw_data,
            smoothed_data,
            peak_score_data,
            peak_data,
            confirmed_peaks,
            stages,
        })
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Five stages chained through work queues, each publishing to an
/// observable sequence.
///
/// A stalled external producer that never closes the source queue keeps the
/// pipeline waiting indefinitely; there are no timeouts in the data path.
///
/// When a stage fails it closes its input, so the stage feeding it halts on
/// its next push and closes its own input in turn. Once that reaches the
/// source queue, further pushes by the producer are refused.
pub struct Pipeline {
    source: WorkQueue<DataPoint>,
    data_queue: WorkQueue<DataPoint>,
    smoothed_queue: WorkQueue<DataPoint>,
    score_queue: WorkQueue<DataPoint>,
    peak_queue: WorkQueue<DataPoint>,
    raw_data: Record,
    smoothed_data: Record,
    peak_score_data: Record,
    peak_data: Record,
    confirmed_peaks: Record,
    stages: Vec<Box<dyn Lifecycle>>,
}

impl Pipeline {
    /// Start every stage, source to sink
    pub fn start(&self) -> Result<()> {
        for stage in &self.stages {
            stage.start()?;
        }
        info!("pipeline started");
        Ok(())
    }

    /// Ask every stage to halt. Does not wait; poll `is_running`/`is_done`
    /// or call [`wait`](Self::wait).
    pub fn stop(&self) {
        for stage in &self.stages {
            stage.stop();
        }
    }

    /// Every stage has drained its input
    pub fn is_done(&self) -> bool {
        self.stages.iter().all(|s| s.is_done())
    }

    /// At least one worker is alive, including one finishing its last
    /// iteration after [`stop`](Self::stop)
    pub fn is_running(&self) -> bool {
        self.stages.iter().any(|s| s.is_running())
    }

    /// The first stage failure, if any
    pub fn check(&self) -> Result<()> {
        for stage in &self.stages {
            if let StageStatus::Errored(message) = stage.status() {
                return Err(PipelineError::StageFailed {
                    stage: stage.name().to_string(),
                    message,
                });
            }
        }
        Ok(())
    }

    /// Poll until every worker has exited or `timeout` elapses.
    ///
    /// Returns whether the pipeline finished its input, or the first stage
    /// failure.
    pub fn wait(&self, timeout: Duration) -> Result<bool> {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if self.is_done() || !self.is_running() {
                break;
            }
            thread::sleep(Duration::from_millis(1));
        }
        self.check()?;
        Ok(self.is_done())
    }

    /// Stop, wait for every worker thread, then report any stage failure
    pub fn shutdown(&self) -> Result<()> {
        self.stop();
        for stage in &self.stages {
            stage.join()?;
        }
        self.check()
    }

    /// Lifecycle status of every stage, in pipeline order
    pub fn stage_statuses(&self) -> Vec<(String, StageStatus)> {
        self.stages
            .iter()
            .map(|s| (s.name().to_string(), s.status()))
            .collect()
    }

    /// The external queue feeding the pre-processor
    pub fn source(&self) -> &WorkQueue<DataPoint> {
        &self.source
    }

    pub fn raw_data(&self) -> &Record {
        &self.raw_data
    }

    pub fn smoothed_data(&self) -> &Record {
        &self.smoothed_data
    }

    /// Scores consumed by the detector
    pub fn peak_score_data(&self) -> &Record {
        &self.peak_score_data
    }

    /// Candidate peaks, before post-processing
    pub fn peak_data(&self) -> &Record {
        &self.peak_data
    }

    /// Confirmed peaks
    pub fn peaks(&self) -> &Record {
        &self.confirmed_peaks
    }

    /// Samples waiting between the pre-processor and the window
    pub fn processed_data_size(&self) -> usize {
        self.data_queue.len()
    }

    /// Number of confirmed peaks
    pub fn steps(&self) -> usize {
        self.confirmed_peaks.len()
    }

    /// Items waiting in each inter-stage queue, in pipeline order
    pub fn queue_depths(&self) -> [usize; 4] {
        [
            self.data_queue.len(),
            self.smoothed_queue.len(),
            self.score_queue.len(),
            self.peak_queue.len(),
        ]
    }

    /// Get a summary of all stage metrics
    pub fn metrics_summary(&self) -> String {
        let mut summary = String::from("Pipeline Metrics Summary:\n");
        for stage in &self.stages {
            summary.push_str(&format!(
                "  {}: {}\n",
                stage.name(),
                stage.metrics().snapshot().format()
            ));
        }
        summary
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.stop();
        for stage in &self.stages {
            if let Err(e) = stage.join() {
                warn!(stage = %stage.name(), error = %e, "stage did not shut down cleanly");
            }
        }
    }
}
