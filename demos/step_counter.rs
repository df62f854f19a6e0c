//! Step counter over an accelerometer magnitude trace
//!
//! Reads `time,value` lines from stdin, runs them through the peak detection
//! pipeline and prints every confirmed step as it is found.
//!
//! Usage: cargo run --example step_counter --release [config.json] < trace.csv
//!        (Without a config file a 5-sample moving average, max_diff scoring
//!        and an adaptive h = 1.5 detector are used.)

use serde_json::json;
use std::io::{self, BufRead};
use std::sync::Arc;
use std::time::{Duration, Instant};
use wpd_pipeline::{
    params, topics, AlgorithmRegistry, DataPoint, PipelineBuilder, PipelineConfig,
    Result as PipelineResult, WorkQueue,
};

fn default_builder() -> PipelineBuilder {
    PipelineBuilder::new()
        .window("moving_average", params([("size", json!(5))]))
        .peak_scorer("max_diff", params([("k", json!(3))]))
        .peak_detector(params([("h", json!(1.5))]))
        .post_processing(params([("min_separation", json!(0.3))]))
}

fn parse_line(line: &str) -> Option<DataPoint> {
    let (time, value) = line.split_once(',')?;
    Some(DataPoint::new(time.trim().parse().ok()?, value.trim().parse().ok()?))
}

fn main() -> PipelineResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    println!("=== Step Counter ===");

    let builder = match std::env::args().nth(1) {
        Some(path) => {
            println!("Loading configuration from {path}");
            PipelineBuilder::from_config(PipelineConfig::from_path(path)?)
        }
        None => default_builder(),
    };

    let source = WorkQueue::new();
    let pipeline = builder
        .observer(Arc::new(|topic: &str, step: &DataPoint| -> PipelineResult<()> {
            if topic == topics::CONFIRMED_PEAK_DATA {
                println!("step at {step}");
            }
            Ok(())
        }))
        .build(source.clone(), &AlgorithmRegistry::with_builtins())?;

    pipeline.start()?;
    let started = Instant::now();

    let stdin = io::stdin();
    let (mut pushed, mut skipped) = (0usize, 0usize);
    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() || line.starts_with('#') {
            continue;
        }
        match parse_line(&line) {
            Some(point) => {
                if source.push(point).is_err() {
                    break;
                }
                pushed += 1;
            }
            None => skipped += 1,
        }
    }
    source.close();

    while !pipeline.wait(Duration::from_millis(500))? {
        if !pipeline.is_running() {
            break;
        }
    }

    println!("\n=== Final Results ===");
    println!("Samples read: {pushed}");
    println!("Samples accepted: {}", pipeline.raw_data().len());
    if skipped > 0 {
        println!("Malformed lines skipped: {skipped}");
    }
    println!("Steps: {}", pipeline.steps());
    println!("Elapsed: {:.2?}", started.elapsed());
    println!("\n{}", pipeline.metrics_summary());

    Ok(())
}
