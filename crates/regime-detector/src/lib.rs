//! # Regime Detector
//!
//! 매크로 지표로 시장 레짐(CRISIS / STRESS / NORMAL)을 탐지합니다.
//!
//! ## 구성 요소
//!
//! - [`composite`]: 가중 z-score 합성 지표
//! - [`initializer`]: k-means 기반 초기 파라미터
//! - [`filter`]: Hamilton 전방 필터
//! - [`optimizer`]: 경계 제약 BFGS
//! - [`estimator`]: 다중 시작점 최대우도 추정
//! - [`hamilton`]: 적합 모델과 온라인 예측
//! - [`threshold`]: 임계값 퍼지 분류기
//!
//! 두 탐지기는 [`RegimeClassifier`](regime_core::RegimeClassifier)를 구현하므로
//! 서로 교체해서 사용할 수 있습니다.
//!
//! ## 사용 예
//!
//! ```no_run
//! use regime_core::{DetectorConfig, IndicatorSnapshot, RegimeClassifier};
//! use regime_detector::ThresholdClassifier;
//!
//! let config = DetectorConfig::default();
//! let classifier = ThresholdClassifier::from_config(&config).unwrap();
//! let snapshot = IndicatorSnapshot::new([("VIX", 35.0), ("HY_SPREADS", 9.2)]);
//! let result = classifier.classify(&snapshot).unwrap();
//! println!("{}", result.summary());
//! ```

pub mod composite;
pub mod estimator;
pub mod filter;
pub mod hamilton;
pub mod initializer;
pub mod optimizer;
pub mod threshold;

pub use composite::{CompositeBuilder, CompositeSeries, IndicatorStatistics};
pub use estimator::{Estimate, ParameterEstimator, Parameterization, DIAGONAL_BIAS};
pub use filter::{FilterStep, HamiltonFilter, UNDERFLOW_PENALTY, UNDERFLOW_THRESHOLD};
pub use hamilton::{fit_model, FittedModel, HamiltonDetector, HAMILTON_CLASSIFIER};
pub use initializer::{kmeans_1d, KMeansResult, ParameterInitializer, INITIAL_PERSISTENCE};
pub use optimizer::{BoundedBfgs, OptimizationReport, OptimizerError, Termination};
pub use threshold::{fuzzy_membership, ThresholdClassifier, THRESHOLD_CLASSIFIER};
