use crate::error::{PipelineError, Result};
use crate::metrics::StageMetrics;
use crate::observable::ObservableSequence;
use crate::queue::{Popped, WorkQueue};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Algorithm plugged into one pipeline stage.
///
/// Each call consumes exactly one item. Implementations may keep a small,
/// bounded window of recent items, but must never need to see the future
/// of the stream to make progress.
pub trait Stage<I, O>: Send + 'static {
    /// Process an input item and produce zero or more outputs
    fn process(&mut self, input: I) -> Result<Vec<O>>;

    /// Flush anything still buffered once the input has ended
    fn finish(&mut self) -> Result<Vec<O>> {
        Ok(Vec::new())
    }

    /// Called on the worker thread before the first item
    fn on_start(&mut self) -> Result<()> {
        Ok(())
    }

    /// Called on the worker thread when it exits for any reason but a panic
    fn on_shutdown(&mut self) -> Result<()> {
        Ok(())
    }

    /// Get a human-readable name for this algorithm
    fn name(&self) -> &str {
        "stage"
    }
}

/// Lifecycle state of a stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageStatus {
    /// Built but never started
    Idle,
    /// Worker thread is alive and processing
    Running,
    /// Stop requested; the iteration in flight is finishing
    Stopping,
    /// Worker has exited (stopped or reached end of input)
    Stopped,
    /// The algorithm failed; the output has been closed
    Errored(String),
}

/// Uniform control surface every stage exposes to the orchestrator
pub trait Lifecycle: Send + Sync {
    fn name(&self) -> &str;

    /// Spawn the worker. Valid from `Idle`, `Stopped` and `Errored`.
    fn start(&self) -> Result<()>;

    /// Ask the worker to halt after the iteration in flight. Does not wait.
    fn stop(&self);

    /// Input reached end-of-stream, everything was processed and the
    /// output has been closed
    fn is_done(&self) -> bool;

    /// A worker thread is alive: running, or finishing the iteration in
    /// flight after a stop request
    fn is_running(&self) -> bool;

    fn status(&self) -> StageStatus;

    fn metrics(&self) -> &StageMetrics;

    /// Wait for the worker thread to exit, if one was started
    fn join(&self) -> Result<()>;
}

#[derive(Debug)]
struct Control {
    status: Mutex<StageStatus>,
    done: AtomicBool,
    shutdown: AtomicBool,
    halted: AtomicBool,
}

/// Why a worker left its loop
enum Exit {
    EndOfStream,
    Stopped,
    /// The downstream queue refused an output
    Halted,
    Failed(String),
}

type StageSlot<I, O> = Arc<Mutex<Option<Box<dyn Stage<I, O>>>>>;

/// Runs a [`Stage`] on its own thread between an input queue and its outputs.
///
/// Each iteration pops one item, optionally publishes it, processes it, then
/// publishes and forwards the results. The output queue is closed on every
/// exit path so the downstream stage always observes end-of-stream.
pub struct StageRunner<I, O> {
    name: String,
    input: WorkQueue<I>,
    input_record: Option<Arc<ObservableSequence<I>>>,
    output: Option<WorkQueue<O>>,
    output_record: Option<Arc<ObservableSequence<O>>>,
    stage: StageSlot<I, O>,
    control: Arc<Control>,
    metrics: StageMetrics,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl<I, O> StageRunner<I, O>
where
    I: Clone + Send + Sync + 'static,
    O: Clone + Send + Sync + 'static,
{
    /// Create a runner reading from `input`; outputs are attached with the
    /// builder methods below
    pub fn new(name: impl Into<String>, stage: Box<dyn Stage<I, O>>, input: WorkQueue<I>) -> Self {
        Self {
            name: name.into(),
            input,
            input_record: None,
            output: None,
            output_record: None,
            stage: Arc::new(Mutex::new(Some(stage))),
            control: Arc::new(Control {
                status: Mutex::new(StageStatus::Idle),
                done: AtomicBool::new(false),
                shutdown: AtomicBool::new(false),
                halted: AtomicBool::new(false),
            }),
            metrics: StageMetrics::new(),
            handle: Mutex::new(None),
        }
    }

    /// Append every consumed input item to `record`
    pub fn publish_input(mut self, record: Arc<ObservableSequence<I>>) -> Self {
        self.input_record = Some(record);
        self
    }

    /// Forward outputs into `queue`
    pub fn output_queue(mut self, queue: WorkQueue<O>) -> Self {
        self.output = Some(queue);
        self
    }

    /// Append every output item to `record`
    pub fn publish_output(mut self, record: Arc<ObservableSequence<O>>) -> Self {
        self.output_record = Some(record);
        self
    }

    /// Get the input queue handle
    pub fn input(&self) -> &WorkQueue<I> {
        &self.input
    }

    fn reap(&self) -> Result<()> {
        if let Some(handle) = self.handle.lock().take() {
            handle
                .join()
                .map_err(|_| PipelineError::ThreadError(format!("stage '{}' panicked", self.name)))?;
        }
        Ok(())
    }
}

impl<I, O> Lifecycle for StageRunner<I, O>
where
    I: Clone + Send + Sync + 'static,
    O: Clone + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&self) -> Result<()> {
        let mut status = self.control.status.lock();
        if matches!(*status, StageStatus::Running | StageStatus::Stopping) {
            return Err(PipelineError::AlreadyStarted(self.name.clone()));
        }

        // The previous worker, if any, has already published its final status.
        self.reap()?;

        let stage = self.stage.lock().take().ok_or_else(|| {
            PipelineError::ThreadError(format!("stage '{}' lost its algorithm", self.name))
        })?;

        if *status != StageStatus::Idle {
            if let Some(output) = &self.output {
                output.reopen();
            }
        }
        // A failed or halted worker closed its input to stop the upstream stage.
        if matches!(*status, StageStatus::Errored(_)) || self.control.halted.load(Ordering::SeqCst) {
            self.input.reopen();
        }
        self.control.done.store(false, Ordering::SeqCst);
        self.control.shutdown.store(false, Ordering::SeqCst);
        self.control.halted.store(false, Ordering::SeqCst);

        let worker = Worker {
            name: self.name.clone(),
            input: self.input.clone(),
            input_record: self.input_record.clone(),
            output: self.output.clone(),
            output_record: self.output_record.clone(),
            slot: Arc::clone(&self.stage),
            control: Arc::clone(&self.control),
            metrics: self.metrics.clone(),
        };

        let handle = thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || worker.run(stage))
            .map_err(|e| {
                PipelineError::ThreadError(format!("failed to spawn '{}': {}", self.name, e))
            })?;

        *status = StageStatus::Running;
        *self.handle.lock() = Some(handle);
        info!(stage = %self.name, "stage started");
        Ok(())
    }

    fn stop(&self) {
        let mut status = self.control.status.lock();
        if *status != StageStatus::Running {
            debug!(stage = %self.name, status = ?*status, "stop ignored");
            return;
        }
        *status = StageStatus::Stopping;
        self.control.shutdown.store(true, Ordering::SeqCst);
        drop(status);

        self.input.interrupt();
        info!(stage = %self.name, "stop requested");
    }

    fn is_done(&self) -> bool {
        self.control.done.load(Ordering::SeqCst)
    }

    fn is_running(&self) -> bool {
        matches!(
            *self.control.status.lock(),
            StageStatus::Running | StageStatus::Stopping
        )
    }

    fn status(&self) -> StageStatus {
        self.control.status.lock().clone()
    }

    fn metrics(&self) -> &StageMetrics {
        &self.metrics
    }

    fn join(&self) -> Result<()> {
        self.reap()
    }
}

impl<I, O> Drop for StageRunner<I, O> {
    fn drop(&mut self) {
        {
            let mut status = self.control.status.lock();
            if *status == StageStatus::Running {
                *status = StageStatus::Stopping;
                self.control.shutdown.store(true, Ordering::SeqCst);
            }
        }
        self.input.interrupt();
        if let Some(handle) = self.handle.lock().take() {
            if handle.join().is_err() {
                warn!(stage = %self.name, "stage worker panicked");
            }
        }
    }
}

/// Everything the worker thread needs, moved onto it at start
struct Worker<I, O> {
    name: String,
    input: WorkQueue<I>,
    input_record: Option<Arc<ObservableSequence<I>>>,
    output: Option<WorkQueue<O>>,
    output_record: Option<Arc<ObservableSequence<O>>>,
    slot: StageSlot<I, O>,
    control: Arc<Control>,
    metrics: StageMetrics,
}

impl<I, O> Worker<I, O>
where
    I: Clone + Send + Sync + 'static,
    O: Clone + Send + Sync + 'static,
{
    fn run(self, mut stage: Box<dyn Stage<I, O>>) {
        let mut guard = ExitGuard {
            name: self.name.clone(),
            input: self.input.clone(),
            output: self.output.clone(),
            control: Arc::clone(&self.control),
            exit: None,
        };

        let exit = match stage.on_start() {
            Ok(()) => self.drive(stage.as_mut()),
            Err(e) => Exit::Failed(e.to_string()),
        };

        if let Err(e) = stage.on_shutdown() {
            warn!(stage = %self.name, error = %e, "shutdown hook failed");
        }
        *self.slot.lock() = Some(stage);
        guard.exit = Some(exit);
    }

    fn drive(&self, stage: &mut dyn Stage<I, O>) -> Exit {
        loop {
            if self.control.shutdown.load(Ordering::SeqCst) {
                return Exit::Stopped;
            }

            match self.input.pop_or_cancel(&self.control.shutdown) {
                Popped::Item(item) => {
                    self.metrics.record_consumed();
                    if let Some(record) = &self.input_record {
                        record.append(item.clone());
                    }

                    let started = Instant::now();
                    match stage.process(item) {
                        Ok(outputs) => {
                            self.metrics.record_latency(started.elapsed());
                            if !self.forward(outputs) {
                                return Exit::Halted;
                            }
                        }
                        Err(e) => {
                            self.metrics.record_failure();
                            return Exit::Failed(e.to_string());
                        }
                    }
                }
                Popped::EndOfStream => {
                    return match stage.finish() {
                        Ok(outputs) => {
                            if self.forward(outputs) {
                                Exit::EndOfStream
                            } else {
                                Exit::Halted
                            }
                        }
                        Err(e) => {
                            self.metrics.record_failure();
                            Exit::Failed(e.to_string())
                        }
                    };
                }
                Popped::Cancelled => return Exit::Stopped,
            }
        }
    }

    /// Publish and push outputs; false if the downstream queue refused one
    fn forward(&self, outputs: Vec<O>) -> bool {
        let count = outputs.len();
        for item in outputs {
            if let Some(record) = &self.output_record {
                record.append(item.clone());
            }
            if let Some(queue) = &self.output {
                if queue.push(item).is_err() {
                    warn!(stage = %self.name, "output queue closed, halting");
                    return false;
                }
            }
        }
        self.metrics.record_emitted(count);
        true
    }
}

/// Closes the output and publishes the final status however the worker exits.
///
/// A worker that will never drain its input again (failure, refused output,
/// panic) also closes the input, so the upstream stage halts on its next
/// push instead of filling a queue nobody reads.
struct ExitGuard<I, O> {
    name: String,
    input: WorkQueue<I>,
    output: Option<WorkQueue<O>>,
    control: Arc<Control>,
    exit: Option<Exit>,
}

impl<I, O> Drop for ExitGuard<I, O> {
    fn drop(&mut self) {
        if let Some(output) = &self.output {
            output.close();
        }
        if !matches!(self.exit, Some(Exit::EndOfStream) | Some(Exit::Stopped)) {
            self.input.close();
        }

        let status = match self.exit.take() {
            Some(Exit::EndOfStream) => {
                self.control.done.store(true, Ordering::SeqCst);
                info!(stage = %self.name, "input drained, stage done");
                StageStatus::Stopped
            }
            Some(Exit::Stopped) => {
                info!(stage = %self.name, "stage stopped");
                StageStatus::Stopped
            }
            Some(Exit::Halted) => {
                self.control.halted.store(true, Ordering::SeqCst);
                info!(stage = %self.name, "stage halted");
                StageStatus::Stopped
            }
            Some(Exit::Failed(message)) => {
                error!(stage = %self.name, error = %message, "stage failed");
                StageStatus::Errored(message)
            }
            None => {
                error!(stage = %self.name, "stage worker panicked");
                StageStatus::Errored("stage worker panicked".to_string())
            }
        };
        *self.control.status.lock() = status;
    }
}

/// Forwards every item unchanged
#[derive(Debug, Default)]
pub struct Passthrough;

impl<T: Send + 'static> Stage<T, T> for Passthrough {
    fn process(&mut self, input: T) -> Result<Vec<T>> {
        Ok(vec![input])
    }

    fn name(&self) -> &str {
        "passthrough"
    }
}

/// A stage that maps each item through a fallible closure
pub struct MapStage<F> {
    name: String,
    mapper: F,
}

impl<F> MapStage<F> {
    pub fn new(name: impl Into<String>, mapper: F) -> Self {
        Self {
            name: name.into(),
            mapper,
        }
    }
}

impl<I, O, F> Stage<I, O> for MapStage<F>
where
    F: FnMut(I) -> Result<O> + Send + 'static,
{
    fn process(&mut self, input: I) -> Result<Vec<O>> {
        Ok(vec![(self.mapper)(input)?])
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        condition()
    }

    fn doubler() -> Box<dyn Stage<i64, i64>> {
        Box::new(MapStage::new("double", |x: i64| -> Result<i64> { Ok(x * 2) }))
    }

    /// Emits pairwise sums, flushing a leftover item at end of input
    struct Pairs {
        pending: Option<i64>,
    }

    impl Stage<i64, i64> for Pairs {
        fn process(&mut self, input: i64) -> Result<Vec<i64>> {
            Ok(match self.pending.take() {
                Some(first) => vec![first + input],
                None => {
                    self.pending = Some(input);
                    vec![]
                }
            })
        }

        fn finish(&mut self) -> Result<Vec<i64>> {
            Ok(self.pending.take().into_iter().collect())
        }
    }

    #[test]
    fn test_passthrough_stage() {
        let mut stage = Passthrough;
        let output = Stage::<Vec<u8>, Vec<u8>>::process(&mut stage, vec![1, 2, 3]).unwrap();
        assert_eq!(output, vec![vec![1, 2, 3]]);
    }

    #[test]
    fn test_map_stage() {
        let mut stage = MapStage::new("test_map", |x: i32| -> Result<i32> { Ok(x + 1) });
        assert_eq!(stage.process(5).unwrap(), vec![6]);
        assert_eq!(Stage::<i32, i32>::name(&stage), "test_map");
    }

    #[test]
    fn test_runner_drains_and_closes_output() {
        let input: WorkQueue<i64> = WorkQueue::new();
        let output: WorkQueue<i64> = WorkQueue::new();
        let runner = StageRunner::new("double", doubler(), input.clone()).output_queue(output.clone());

        assert_eq!(runner.status(), StageStatus::Idle);
        runner.start().unwrap();
        for i in 1..=4 {
            input.push(i).unwrap();
        }
        input.close();

        assert!(wait_for(|| runner.is_done()));
        assert!(!runner.is_running());
        assert_eq!(runner.status(), StageStatus::Stopped);
        assert!(output.is_closed());
        let results: Vec<_> = std::iter::from_fn(|| output.pop()).collect();
        assert_eq!(results, vec![2, 4, 6, 8]);
        assert_eq!(runner.metrics().total_consumed(), 4);
        assert_eq!(runner.metrics().total_emitted(), 4);
    }

    #[test]
    fn test_finish_flushes_on_end_of_stream() {
        let input: WorkQueue<i64> = WorkQueue::new();
        let record: Arc<ObservableSequence<i64>> = Arc::new(ObservableSequence::new());
        let runner = StageRunner::new("pairs", Box::new(Pairs { pending: None }), input.clone())
            .publish_output(Arc::clone(&record));

        runner.start().unwrap();
        for i in [1, 2, 3] {
            input.push(i).unwrap();
        }
        input.close();

        assert!(wait_for(|| runner.is_done()));
        assert_eq!(record.snapshot(), vec![3, 3]);
    }

    #[test]
    fn test_publishes_consumed_input() {
        let input: WorkQueue<i64> = WorkQueue::new();
        let record: Arc<ObservableSequence<i64>> = Arc::new(ObservableSequence::new());
        let runner = StageRunner::new("double", doubler(), input.clone())
            .publish_input(Arc::clone(&record));

        runner.start().unwrap();
        input.push(10).unwrap();
        input.push(20).unwrap();
        input.close();

        assert!(wait_for(|| runner.is_done()));
        assert_eq!(record.snapshot(), vec![10, 20]);
    }

    #[test]
    fn test_stop_unblocks_idle_worker() {
        let input: WorkQueue<i64> = WorkQueue::new();
        let output: WorkQueue<i64> = WorkQueue::new();
        let runner = StageRunner::new("double", doubler(), input.clone()).output_queue(output.clone());

        runner.start().unwrap();
        assert!(runner.is_running());
        runner.stop();

        assert!(wait_for(|| runner.status() == StageStatus::Stopped));
        assert!(!runner.is_done());
        assert!(!runner.is_running());
        assert!(output.is_closed());
        assert_eq!(output.pop(), None);
    }

    #[test]
    fn test_stop_on_idle_stage_is_ignored() {
        let runner = StageRunner::new("double", doubler(), WorkQueue::new());
        runner.stop();
        assert_eq!(runner.status(), StageStatus::Idle);
        assert!(!runner.is_done());
        assert!(!runner.is_running());
    }

    #[test]
    fn test_double_start_is_rejected() {
        let runner = StageRunner::new("double", doubler(), WorkQueue::new());
        runner.start().unwrap();
        assert!(matches!(runner.start(), Err(PipelineError::AlreadyStarted(_))));
        runner.stop();
        runner.join().unwrap();
    }

    #[test]
    fn test_restart_after_stop_resumes() {
        let input: WorkQueue<i64> = WorkQueue::new();
        let output: WorkQueue<i64> = WorkQueue::new();
        let runner = StageRunner::new("double", doubler(), input.clone()).output_queue(output.clone());

        runner.start().unwrap();
        runner.stop();
        assert!(wait_for(|| runner.status() == StageStatus::Stopped));

        runner.start().unwrap();
        assert!(!output.is_closed());
        input.push(21).unwrap();
        input.close();

        assert!(wait_for(|| runner.is_done()));
        assert_eq!(output.pop(), Some(42));
    }

    #[test]
    fn test_algorithm_error_marks_stage_errored() {
        let input: WorkQueue<i64> = WorkQueue::new();
        let output: WorkQueue<i64> = WorkQueue::new();
        let failing = MapStage::new("fails_on_negative", |x: i64| -> Result<i64> {
            if x < 0 {
                Err(PipelineError::StageError(format!("negative sample {x}")))
            } else {
                Ok(x)
            }
        });
        let runner = StageRunner::new("checked", Box::new(failing), input.clone())
            .output_queue(output.clone());

        runner.start().unwrap();
        for x in [1, -1, 2] {
            input.push(x).unwrap();
        }

        assert!(wait_for(|| matches!(runner.status(), StageStatus::Errored(_))));
        assert!(!runner.is_done());
        assert!(!runner.is_running());
        assert_eq!(runner.metrics().total_failures(), 1);
        assert_eq!(output.pop(), Some(1));
        assert_eq!(output.pop(), None);

        // The upstream producer is refused instead of growing the queue.
        assert!(input.is_closed());
        assert_eq!(input.push(3), Err(3));
    }

    #[test]
    fn test_stop_finishes_iteration_in_flight() {
        let (entered_tx, entered_rx) = crossbeam::channel::unbounded::<i64>();
        let (release_tx, release_rx) = crossbeam::channel::unbounded::<()>();
        let gated = MapStage::new("gated", move |x: i64| -> Result<i64> {
            let _ = entered_tx.send(x);
            release_rx
                .recv()
                .map_err(|e| PipelineError::StageError(e.to_string()))?;
            Ok(x)
        });

        let input: WorkQueue<i64> = WorkQueue::new();
        let output: WorkQueue<i64> = WorkQueue::new();
        let runner = StageRunner::new("gated", Box::new(gated), input.clone())
            .output_queue(output.clone());

        runner.start().unwrap();
        input.push(1).unwrap();
        input.push(2).unwrap();
        assert_eq!(entered_rx.recv_timeout(Duration::from_secs(5)), Ok(1));

        runner.stop();
        thread::sleep(Duration::from_millis(20));
        assert_eq!(runner.status(), StageStatus::Stopping);
        assert!(runner.is_running());

        release_tx.send(()).unwrap();
        assert!(wait_for(|| runner.status() == StageStatus::Stopped));
        assert!(!runner.is_running());
        assert!(!runner.is_done());
        assert!(entered_rx.try_recv().is_err());

        let results: Vec<_> = std::iter::from_fn(|| output.pop()).collect();
        assert_eq!(results, vec![1]);
        assert_eq!(input.len(), 1);
        assert!(!input.is_closed());
    }

    #[test]
    fn test_refused_output_halts_and_closes_input() {
        let input: WorkQueue<i64> = WorkQueue::new();
        let output: WorkQueue<i64> = WorkQueue::new();
        let runner = StageRunner::new("double", doubler(), input.clone()).output_queue(output.clone());

        output.close();
        runner.start().unwrap();
        input.push(1).unwrap();

        assert!(wait_for(|| runner.status() == StageStatus::Stopped));
        assert!(!runner.is_done());
        assert!(input.is_closed());

        // Restarting reopens both ends.
        runner.start().unwrap();
        assert!(!input.is_closed());
        assert!(!output.is_closed());
        input.push(5).unwrap();
        input.close();
        assert!(wait_for(|| runner.is_done()));
        assert_eq!(output.pop(), Some(10));
    }
}
