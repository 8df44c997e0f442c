//! Integration tests for performance characteristics
//!
//! Timing bounds are generous; the ignored tests are meant for manual runs
//! on release builds.

use series_prep::generators::*;
use series_prep::{
    ChangePointConfig, ChangePointDetector, CostKind, InMemorySource, PipelineConfig,
    PreparationPipeline, RollingOutlierDetector, TimeSeries,
};
use std::collections::BTreeMap;
use std::time::Instant;

fn universe(count: usize, length: usize) -> BTreeMap<String, TimeSeries> {
    (0..count)
        .map(|i| {
            let config = GeneratorConfig { length, seed: 1000 + i as u64 };
            let prices = geometric_walk(&config, 100.0, 0.0002, 0.012).unwrap();
            (format!("T{:03}", i), daily_series(prices).unwrap())
        })
        .collect()
}

/// Test scenario: pruning keeps the exact search affordable on long series
#[test]
fn test_pruning_reduces_cost_evaluations() {
    let values = step_series(
        &GeneratorConfig { length: 0, seed: 8 },
        &[(300, 0.0), (300, 4.0), (300, 1.0)],
        0.5,
    )
    .unwrap();

    let pruned = ChangePointDetector::new(ChangePointConfig {
        cost: CostKind::L2,
        ..ChangePointConfig::default()
    })
    .unwrap()
    .partition(&values)
    .unwrap();
    assert!(pruned.candidates_pruned > 0);

    // jump < min_size disables pruning; every admissible start is scored.
    let exhaustive = ChangePointDetector::new(ChangePointConfig {
        cost: CostKind::L2,
        min_size: 10,
        jump: 5,
        ..ChangePointConfig::default()
    })
    .unwrap()
    .partition(&values)
    .unwrap();
    assert_eq!(exhaustive.candidates_pruned, 0);
    assert!(exhaustive.cost_evals > pruned.cost_evals);
    assert_eq!(pruned.breakpoints.indices(), &[300, 600]);
}

/// Test scenario: batch cleaning matches per-series cleaning
#[test]
fn test_batch_matches_sequential() {
    let data = universe(8, 300);
    let detector = RollingOutlierDetector::default();
    let batch = detector.process_batch(&data).unwrap();
    assert_eq!(batch.len(), data.len());
    for (ticker, series) in &data {
        assert_eq!(&batch[ticker], &detector.process_series(series).unwrap());
    }

    let cp = ChangePointDetector::default();
    let regimes = cp.process_batch(&data).unwrap();
    for (ticker, series) in &data {
        assert_eq!(&regimes[ticker], &cp.detect(series).unwrap());
    }
}

/// Test scenario: full pipeline over a five-year daily universe
#[test]
#[ignore] // Timing bound depends on hardware; run with --release
fn test_pipeline_throughput() {
    let data = universe(20, 1260);
    let tickers: Vec<&str> = data.keys().map(String::as_str).collect();
    let source = InMemorySource::from(data.clone());

    let start = Instant::now();
    let mut pipeline = PreparationPipeline::new(PipelineConfig::default()).unwrap();
    pipeline.run(&source, &tickers).unwrap();
    let elapsed = start.elapsed();

    assert!(
        elapsed.as_secs() < 60,
        "20 x 1260 points should prepare within 60 seconds, took {:?}",
        elapsed
    );
    assert_eq!(pipeline.records().len(), 20);
}
