//! Integration tests for full preparation workflows
//!
//! These tests drive the PreparationPipeline and the individual stages
//! end to end on synthetic universes with known structure.

use assert_approx_eq::assert_approx_eq;
use series_prep::generators::*;
use series_prep::{
    integrate_differences, difference_initial_values, ChangePointConfig, ChangePointDetector,
    CostKind, InMemorySource, OutlierConfig, PipelineConfig, PipelineStage, PreparationPipeline,
    RollingOutlierDetector, StationarityConfig, StationarityTransformer, TimeSeries,
    TransformConfig,
};
use std::collections::BTreeMap;

fn spiked_universe() -> InMemorySource {
    let mut source = InMemorySource::new();
    for (ticker, seed) in [("ALPHA", 3_u64), ("BETA", 4), ("GAMMA", 5)] {
        let config = GeneratorConfig { length: 400, seed };
        let mut prices = geometric_walk(&config, 100.0, 0.0002, 0.01).unwrap();
        inject_spikes(&mut prices, &[150], 40.0);
        source.insert(ticker, daily_series(prices).unwrap());
    }
    source
}

/// Test scenario: analyst prepares a small universe from load to transform
///
/// 1. Load closes from a source
/// 2. Rebase, clean, segment
/// 3. Search and apply one shared transform with fresh tests
#[test]
fn test_complete_preparation_workflow() {
    let source = spiked_universe();
    let mut pipeline = PreparationPipeline::new(PipelineConfig::default()).unwrap();
    let records = pipeline.run(&source, &["ALPHA", "BETA", "GAMMA"]).unwrap();
    assert_eq!(records.len(), 3);

    for (ticker, record) in records {
        let cleaned = record.cleaned().expect("cleaning ran");
        assert!(cleaned.mask().is_flagged(150), "{}: spike not flagged", ticker);
        assert!(!cleaned.mask().is_flagged(0));
        assert_eq!(cleaned.mask().len(), record.raw().len());

        let normalized = record.series(PipelineStage::Normalized).unwrap();
        let expected = normalized.values()[140..150].iter().sum::<f64>() / 10.0;
        assert_approx_eq!(cleaned.cleaned().values()[150], expected, 1e-9);

        let segments = record.segments().expect("regimes detected");
        let parts: Vec<TimeSeries> = segments.iter().map(|s| s.series().clone()).collect();
        assert_eq!(&TimeSeries::concat(&parts).unwrap(), cleaned.cleaned());
        assert_eq!(
            segments.len(),
            record.breakpoints().unwrap().segment_count()
        );

        let transformed = record.series(PipelineStage::Transformed).expect("transform applied");
        let report = record.report().expect("tests re-run");
        assert!(report.adf.is_completed());
        assert!(report.kpss.is_completed());
        assert!(transformed.len() < record.raw().len());
    }

    let selection = pipeline.selection().unwrap();
    assert!(selection.config().diff_order >= 1);
    assert!(selection.config().diff_order <= 2);
}

/// Test scenario: a level shift is found and split into two regimes
#[test]
fn test_level_shift_breakpoint() {
    let mut values = vec![0.0; 20];
    values.extend(vec![10.0; 20]);
    let series = daily_series(values).unwrap();

    for cost in [CostKind::default(), CostKind::L2, CostKind::L1] {
        let detector = ChangePointDetector::new(ChangePointConfig {
            cost,
            ..ChangePointConfig::default()
        })
        .unwrap();
        let (breakpoints, segments) = detector.detect_and_segment(&series).unwrap();
        assert_eq!(breakpoints.indices(), &[20], "{:?}", cost);
        assert_eq!(segments.len(), 2);
        assert!(segments[0].series().values().iter().all(|&v| v == 0.0));
        assert!(segments[1].series().values().iter().all(|&v| v == 10.0));
    }
}

/// Test scenario: noisy regimes with several shifts
#[test]
fn test_multiple_regimes_on_noisy_steps() {
    let values = step_series(
        &GeneratorConfig { length: 0, seed: 17 },
        &[(60, 0.0), (60, 6.0), (60, -3.0)],
        0.5,
    )
    .unwrap();
    let series = daily_series(values).unwrap();
    let detector = ChangePointDetector::default();
    let breakpoints = detector.detect(&series).unwrap();
    assert_eq!(breakpoints.indices(), &[60, 120]);

    let annotation = detector.annotate(&series).unwrap();
    let flagged: Vec<usize> = annotation
        .flags()
        .iter()
        .enumerate()
        .filter(|(_, f)| **f)
        .map(|(i, _)| i)
        .collect();
    assert_eq!(flagged, vec![60, 120]);
}

/// Test scenario: a spike on a slightly noisy plateau is repaired by all tests
#[test]
fn test_spike_on_jittered_plateau() {
    let values = vec![1.0, 1.1, 0.9, 1.0, 1.1, 100.0, 0.9, 1.0, 1.1, 0.9, 1.0];
    let detector = RollingOutlierDetector::new(OutlierConfig {
        window: 3,
        ..OutlierConfig::default()
    })
    .unwrap();
    let result = detector.process_series(&daily_series(values).unwrap()).unwrap();
    let votes = result.votes()[5];
    assert!(votes.zscore && votes.iqr && votes.mad);
    assert_eq!(result.mask().flagged_indices(), vec![5]);
    assert_approx_eq!(result.cleaned().values()[5], 1.0, 1e-12);
}

/// Test scenario: random walks dominate the universe, so differencing wins
#[test]
fn test_random_walk_universe_selects_differencing() {
    let data: BTreeMap<String, TimeSeries> = (0..5)
        .map(|seed| {
            let walk = random_walk(&GeneratorConfig { length: 250, seed: 100 + seed }, 1000.0, 2.0)
                .unwrap();
            (format!("RW{}", seed), daily_series(walk).unwrap())
        })
        .collect();
    let transformer = StationarityTransformer::default();
    let selection = transformer.find_best_transformation(&data).unwrap();
    assert!(selection.config().diff_order >= 1);
    assert_eq!(selection.candidates().len(), 6);

    let output = transformer.apply(&selection, &data, true).unwrap();
    assert_eq!(output.transformed.len(), 5);
    assert_eq!(output.reports.len(), 5);
    assert!(output.insufficient.is_empty());
}

/// Test scenario: undo a differencing transform
#[test]
fn test_difference_and_integrate_round_trip() {
    let prices = geometric_walk(&GeneratorConfig { length: 120, seed: 9 }, 50.0, 0.0, 0.02).unwrap();
    let series = daily_series(prices.clone()).unwrap();
    let transformer = StationarityTransformer::new(StationarityConfig {
        standardize: false,
        ..StationarityConfig::default()
    })
    .unwrap();

    for d in 0..=2 {
        let transformed = transformer
            .transform_series(&series, &TransformConfig::new(false, d))
            .unwrap();
        assert_eq!(transformed.len(), series.len() - d);
        assert_eq!(transformed.timestamps(), &series.timestamps()[d..]);

        let rebuilt = integrate_differences(transformed.values(), &difference_initial_values(&prices, d));
        for (a, b) in rebuilt.iter().zip(&prices) {
            assert_approx_eq!(a, b, 1e-9);
        }
    }
}
