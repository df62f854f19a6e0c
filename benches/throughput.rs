use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::json;
use std::time::Duration;
use wpd_pipeline::{params, AlgorithmRegistry, DataPoint, PipelineBuilder, StageParams, WorkQueue};

fn signal(len: usize) -> Vec<DataPoint> {
    (0..len)
        .map(|t| {
            let phase = t as f64 * 0.05;
            DataPoint::new(t as f64 * 0.01, phase.sin() + 0.2 * (phase * 7.0).cos())
        })
        .collect()
}

fn run_to_completion(builder: PipelineBuilder, registry: &AlgorithmRegistry, samples: &[DataPoint]) -> usize {
    let source = WorkQueue::new();
    let pipeline = builder.build(source.clone(), registry).expect("Build failed");
    pipeline.start().expect("Start failed");

    for point in samples {
        let _ = source.push(black_box(*point));
    }
    source.close();

    let _ = pipeline.wait(Duration::from_secs(30));
    pipeline.steps()
}

fn benchmark_identity_pipeline(c: &mut Criterion) {
    let registry = AlgorithmRegistry::with_builtins();
    let samples = signal(1000);

    c.bench_function("identity_pipeline_1000_samples", |b| {
        b.iter(|| {
            let builder = PipelineBuilder::new()
                .window("identity", StageParams::new())
                .peak_scorer("identity", StageParams::new())
                .peak_detector(params([("threshold", json!(0.9))]));
            run_to_completion(builder, &registry, &samples)
        });
    });
}

fn benchmark_smoothed_pipeline(c: &mut Criterion) {
    let registry = AlgorithmRegistry::with_builtins();
    let mut group = c.benchmark_group("smoothed_pipeline");

    for len in [1_000usize, 10_000] {
        let samples = signal(len);
        group.throughput(Throughput::Elements(len as u64));
        group.bench_with_input(BenchmarkId::from_parameter(len), &samples, |b, samples| {
            b.iter(|| {
                let builder = PipelineBuilder::new()
                    .window("moving_average", params([("size", json!(5))]))
                    .peak_scorer("max_diff", params([("k", json!(3))]))
                    .peak_detector(params([("h", json!(1.5))]))
                    .post_processing(params([("min_separation", json!(0.5))]));
                run_to_completion(builder, &registry, samples)
            });
        });
    }
    group.finish();
}

criterion_group!(
    name = benches;
    config = Criterion::default().measurement_time(Duration::from_secs(10));
    targets = benchmark_identity_pipeline, benchmark_smoothed_pipeline
);
criterion_main!(benches);
