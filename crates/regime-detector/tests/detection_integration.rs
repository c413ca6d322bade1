//! 레짐 탐지 통합 테스트
//!
//! 합성 3-레짐 지표 이력으로 Hamilton 탐지기를 적합하고,
//! 임계값 분류기와 같은 인터페이스로 사용할 수 있는지 확인합니다.

use chrono::{DateTime, Duration, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

use regime_core::{
    DetectorConfig, HamiltonConfig, IndicatorHistory, IndicatorSeries, IndicatorSnapshot, Regime,
    RegimeClassification, RegimeClassifier, RegimeError, BAA_SPREADS, HY_SPREADS, VIX,
};
use regime_detector::{HamiltonDetector, ThresholdClassifier};

/// 레짐별 (VIX, HY, BAA) 평균과 표준편차
const PROFILES: [(Regime, [(f64, f64); 3]); 3] = [
    (Regime::Normal, [(14.0, 1.5), (3.5, 0.3), (4.5, 0.2)]),
    (Regime::Stress, [(22.0, 1.5), (6.0, 0.3), (5.8, 0.2)]),
    (Regime::Crisis, [(38.0, 2.0), (10.0, 0.5), (7.5, 0.3)]),
];

const BLOCK_LEN: usize = 40;

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap()
}

/// 정상 → 긴장 → 위기 블록을 두 번 반복한 일별 시계열과 실제 레짐.
fn synthetic_series(seed: u64) -> (Vec<IndicatorSeries>, Vec<Regime>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let names = [VIX, HY_SPREADS, BAA_SPREADS];
    let mut points: Vec<Vec<(DateTime<Utc>, f64)>> = vec![Vec::new(); 3];
    let mut truth = Vec::new();

    let mut t = 0;
    for _ in 0..2 {
        for (regime, profile) in PROFILES {
            for _ in 0..BLOCK_LEN {
                let ts = start() + Duration::days(t);
                for (k, &(mean, sd)) in profile.iter().enumerate() {
                    let value = Normal::new(mean, sd).unwrap().sample(&mut rng);
                    points[k].push((ts, value));
                }
                truth.push(regime);
                t += 1;
            }
        }
    }

    let series = names
        .iter()
        .zip(points)
        .map(|(name, pts)| IndicatorSeries::new(*name, pts))
        .collect();
    (series, truth)
}

fn history(seed: u64) -> (IndicatorHistory, Vec<Regime>) {
    let (series, truth) = synthetic_series(seed);
    (IndicatorHistory::align(&series).unwrap(), truth)
}

fn config(standardize_online: bool) -> DetectorConfig {
    DetectorConfig {
        hamilton: HamiltonConfig {
            standardize_online,
            ..HamiltonConfig::default()
        },
        ..DetectorConfig::default()
    }
}

fn crisis_snapshot() -> IndicatorSnapshot {
    IndicatorSnapshot::at(
        [(VIX, 40.0), (HY_SPREADS, 10.5), (BAA_SPREADS, 7.6), ("TERM_SPREAD", -0.3)],
        start() + Duration::days(300),
    )
}

#[test]
fn test_fit_recovers_descending_regimes() {
    let (history, truth) = history(2024);
    let mut detector = HamiltonDetector::from_config(&config(false)).unwrap();
    let model = detector.fit(&history).unwrap();

    let params = model.parameters();
    assert_eq!(params.n_regimes(), 3);
    assert!(params.is_ordered(), "means = {}", params.means());

    for row in params.transition_matrix().rows() {
        assert!((row.sum() - 1.0).abs() < 1e-9);
    }

    let slots = model.trajectory().most_likely_slots();
    assert_eq!(slots.len(), truth.len());
    let correct = slots
        .iter()
        .zip(&truth)
        .filter(|(slot, regime)| Regime::for_slot(**slot, 3) == **regime)
        .count();
    let accuracy = correct as f64 / truth.len() as f64;
    assert!(accuracy >= 0.9, "accuracy = {}", accuracy);

    // 마지막 블록은 위기
    assert_eq!(slots.last().copied(), Some(0));
}

#[test]
fn test_refit_is_deterministic() {
    let (history, _) = history(7);
    let mut a = HamiltonDetector::from_config(&config(false)).unwrap();
    let mut b = HamiltonDetector::from_config(&config(false)).unwrap();

    let first = a.fit(&history).unwrap().clone();
    let second = b.fit(&history).unwrap();

    assert_eq!(first.parameters(), second.parameters());
    assert_eq!(first.trajectory(), second.trajectory());
}

#[test]
fn test_unfitted_detector_never_classifies() {
    let detector = HamiltonDetector::from_config(&DetectorConfig::default()).unwrap();
    let result = detector.classify(&crisis_snapshot());
    assert!(matches!(result, Err(RegimeError::NotFitted)));
    assert!(result.unwrap_err().requires_fit());
}

#[test]
fn test_fit_with_too_few_observations() {
    let (series, _) = synthetic_series(1);
    let truncated: Vec<IndicatorSeries> = series
        .into_iter()
        .map(|s| IndicatorSeries::new(s.name, s.points.into_iter().take(49).collect()))
        .collect();
    let history = IndicatorHistory::align(&truncated).unwrap();

    let mut detector = HamiltonDetector::from_config(&DetectorConfig::default()).unwrap();
    let err = detector.fit(&history).unwrap_err();
    assert!(matches!(
        err,
        RegimeError::InsufficientData {
            required: 50,
            provided: 49
        }
    ));
    assert!(err.is_recoverable());
}

#[test]
fn test_detectors_are_interchangeable() {
    let config = config(true);
    let (history, _) = history(99);

    let mut hamilton = HamiltonDetector::from_config(&config).unwrap();
    hamilton.fit(&history).unwrap();
    let threshold = ThresholdClassifier::from_config(&config).unwrap();

    let classifiers: Vec<Box<dyn RegimeClassifier>> = vec![Box::new(hamilton), Box::new(threshold)];
    let snapshot = crisis_snapshot();

    let results: Vec<RegimeClassification> = classifiers
        .iter()
        .map(|c| c.classify(&snapshot).unwrap())
        .collect();

    assert_eq!(classifiers[0].name(), "hamilton");
    assert_eq!(classifiers[1].name(), "threshold");
    for result in &results {
        assert_eq!(result.regime, Regime::Crisis);
        assert!((result.probabilities.total() - 1.0).abs() < 1e-9);
        assert!((0.0..=1.0).contains(&result.confidence));
        assert_eq!(result.timestamp, snapshot.timestamp);
        assert_eq!(result.indicators.get(VIX), Some(&40.0));
    }
}

#[test]
fn test_raw_online_composite_still_yields_distribution() {
    let (history, _) = history(3);
    let mut detector = HamiltonDetector::from_config(&config(false)).unwrap();
    detector.fit(&history).unwrap();

    let result = detector.predict(&crisis_snapshot()).unwrap();
    assert!((result.probabilities.total() - 1.0).abs() < 1e-9);
    assert!(result.confidence >= 1.0 / 3.0 - 1e-12);
}

#[test]
fn test_observe_advances_prior() {
    let (history, _) = history(11);
    let mut detector = HamiltonDetector::from_config(&config(true)).unwrap();
    detector.fit(&history).unwrap();
    let before = detector.model().unwrap().trajectory().len();

    for day in 0..5 {
        let snapshot = IndicatorSnapshot::at(
            [(VIX, 14.0), (HY_SPREADS, 3.5), (BAA_SPREADS, 4.5)],
            start() + Duration::days(240 + day),
        );
        detector.observe(&snapshot).unwrap();
    }

    let model = detector.model().unwrap();
    assert_eq!(model.trajectory().len(), before + 5);
    let last = detector
        .predict(&IndicatorSnapshot::at(
            [(VIX, 14.0), (HY_SPREADS, 3.5), (BAA_SPREADS, 4.5)],
            start() + Duration::days(250),
        ))
        .unwrap();
    assert_eq!(last.regime, Regime::Normal);
}

#[test]
fn test_classification_json_boundary() {
    let classifier = ThresholdClassifier::from_config(&DetectorConfig::default()).unwrap();
    let result = classifier.classify(&crisis_snapshot()).unwrap();

    let json = result.to_json().unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["regime"], "CRISIS");
    assert!(value["probabilities"]["CRISIS"].as_f64().unwrap() > 0.7);
    assert!(value["indicators"]["TERM_SPREAD"].is_number());

    let parsed: RegimeClassification = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, result);
}

#[test]
fn test_detectors_from_config_file() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../../config/default.toml");
    let config = DetectorConfig::load(path).unwrap();

    assert!(HamiltonDetector::from_config(&config).is_ok());
    let classifier = ThresholdClassifier::from_config(&config).unwrap();
    let normal = classifier
        .classify(&IndicatorSnapshot::new([
            (VIX, 16.0),
            (HY_SPREADS, 4.5),
            (BAA_SPREADS, 5.2),
            ("TERM_SPREAD", 1.5),
        ]))
        .unwrap();
    assert_eq!(normal.regime, Regime::Normal);
}
