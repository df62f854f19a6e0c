use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Sliding window of per-item processing times
#[derive(Debug, Clone)]
pub struct LatencyWindow {
    samples: Arc<Mutex<VecDeque<u64>>>,
    window_size: usize,
}

impl LatencyWindow {
    pub fn new(window_size: usize) -> Self {
        Self {
            samples: Arc::new(Mutex::new(VecDeque::with_capacity(window_size))),
            window_size: window_size.max(1),
        }
    }

    /// Record a processing time in nanoseconds
    pub fn record(&self, nanos: u64) {
        let mut samples = self.samples.lock();
        if samples.len() >= self.window_size {
            samples.pop_front();
        }
        samples.push_back(nanos);
    }

    /// Percentile `p` (0.0..=1.0) of the window, in microseconds
    pub fn percentile_us(&self, p: f64) -> f64 {
        let samples = self.samples.lock();
        if samples.is_empty() {
            return 0.0;
        }

        let mut sorted: Vec<_> = samples.iter().copied().collect();
        sorted.sort_unstable();

        let idx = ((sorted.len() as f64 * p.clamp(0.0, 1.0)).ceil() as usize)
            .saturating_sub(1)
            .min(sorted.len() - 1);
        sorted[idx] as f64 / 1000.0
    }

    pub fn len(&self) -> usize {
        self.samples.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.lock().is_empty()
    }
}

/// Counters shared between a stage handle and its worker thread
#[derive(Debug, Clone)]
pub struct StageMetrics {
    consumed: Arc<AtomicU64>,
    emitted: Arc<AtomicU64>,
    failures: Arc<AtomicU64>,
    latency: LatencyWindow,
    created: Instant,
}

impl StageMetrics {
    pub fn new() -> Self {
        Self {
            consumed: Arc::new(AtomicU64::new(0)),
            emitted: Arc::new(AtomicU64::new(0)),
            failures: Arc::new(AtomicU64::new(0)),
            latency: LatencyWindow::new(1000),
            created: Instant::now(),
        }
    }

    /// An item was popped from the stage input
    pub fn record_consumed(&self) {
        self.consumed.fetch_add(1, Ordering::Relaxed);
    }

    /// `count` items were forwarded downstream
    pub fn record_emitted(&self, count: usize) {
        self.emitted.fetch_add(count as u64, Ordering::Relaxed);
    }

    /// The stage algorithm returned an error
    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Time spent in one `process` call
    pub fn record_latency(&self, elapsed: Duration) {
        self.latency.record(elapsed.as_nanos().min(u64::MAX as u128) as u64);
    }

    pub fn total_consumed(&self) -> u64 {
        self.consumed.load(Ordering::Relaxed)
    }

    pub fn total_emitted(&self) -> u64 {
        self.emitted.load(Ordering::Relaxed)
    }

    pub fn total_failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Items consumed per second since the metrics were created
    pub fn throughput(&self) -> f64 {
        let secs = self.created.elapsed().as_secs_f64();
        if secs == 0.0 {
            0.0
        } else {
            self.total_consumed() as f64 / secs
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            consumed: self.total_consumed(),
            emitted: self.total_emitted(),
            failures: self.total_failures(),
            throughput: self.throughput(),
            latency_p50_us: self.latency.percentile_us(0.50),
            latency_p99_us: self.latency.percentile_us(0.99),
            elapsed: self.created.elapsed(),
        }
    }
}

impl Default for StageMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// A point-in-time copy of a stage's counters
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub consumed: u64,
    pub emitted: u64,
    pub failures: u64,
    pub throughput: f64,
    pub latency_p50_us: f64,
    pub latency_p99_us: f64,
    pub elapsed: Duration,
}

impl MetricsSnapshot {
    /// Format metrics as a human-readable string
    pub fn format(&self) -> String {
        format!(
            "In: {}, Out: {}, Failures: {}, Throughput: {:.2} items/s, \
             Latency P50: {:.2}µs, P99: {:.2}µs, Elapsed: {:.2}s",
            self.consumed,
            self.emitted,
            self.failures,
            self.throughput,
            self.latency_p50_us,
            self.latency_p99_us,
            self.elapsed.as_secs_f64()
        )
    }
}
