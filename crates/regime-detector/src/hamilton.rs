//! Hamilton 레짐 탐지기와 온라인 예측.
//!
//! [`fit_model`]은 불변 [`FittedModel`]을 만들고, 예측은 그 값에 대해서만 동작합니다.
//! [`HamiltonDetector`]는 적합 결과를 보관하는 얇은 소유자로, 적합 전 예측은
//! [`RegimeError::NotFitted`]로 실패합니다.

use chrono::{DateTime, Utc};
use ndarray::Array1;
use std::collections::BTreeMap;
use tracing::{debug, info};

use regime_core::{
    argmax, detection_span, DetectorConfig, FilteredTrajectory, HamiltonConfig,
    IndicatorHistory, IndicatorSet, IndicatorSnapshot, ModelParameters, Regime,
    RegimeClassification, RegimeClassifier, RegimeError, RegimeProbabilities, RegimeResult,
};

use crate::composite::{CompositeBuilder, IndicatorStatistics};
use crate::estimator::ParameterEstimator;
use crate::filter::{FilterStep, HamiltonFilter};
use crate::initializer::ParameterInitializer;

/// 분류기 이름.
pub const HAMILTON_CLASSIFIER: &str = "hamilton";

// ================================================================================================
// FittedModel
// ================================================================================================

/// 적합이 끝난 레짐 전환 모델.
#[derive(Debug, Clone)]
pub struct FittedModel {
    parameters: ModelParameters,
    trajectory: FilteredTrajectory,
    builder: CompositeBuilder,
    statistics: BTreeMap<String, IndicatorStatistics>,
    standardize_online: bool,
    fitted_at: DateTime<Utc>,
}

/// 지표 이력으로 모델을 적합합니다.
///
/// 합성 지표 생성 → k-means 초기화 → 다중 시작점 최대우도 추정 순서로 진행합니다.
/// 합성 값이 정의되지 않은 시점은 관측 시계열에서 제외됩니다.
///
/// # 에러
/// - 정의된 합성 관측치가 `min_observations`보다 적음 (`InsufficientData`)
/// - 모든 최적화 시도 실패 (`OptimizationFailure`)
/// - 설정에 없는 지표 (`UnknownIndicator`)
pub fn fit_model(
    indicators: &IndicatorSet,
    config: &HamiltonConfig,
    history: &IndicatorHistory,
) -> RegimeResult<FittedModel> {
    let span = detection_span!("fit", HAMILTON_CLASSIFIER, config.n_regimes);
    let _guard = span.enter();

    let builder = CompositeBuilder::new(indicators.clone());
    let composite = builder.build(history)?;
    let observations = composite.defined_values();

    if observations.len() < config.min_observations {
        return Err(RegimeError::InsufficientData {
            required: config.min_observations,
            provided: observations.len(),
        });
    }
    debug!(
        observations = observations.len(),
        skipped = composite.len() - observations.len(),
        "Composite series built"
    );

    let initial = ParameterInitializer::new(config.n_regimes).initialize(&observations)?;
    let estimate = ParameterEstimator::from_config(config).estimate(&observations, &initial)?;

    info!(
        log_likelihood = estimate.trajectory.log_likelihood(),
        means = ?estimate.parameters.means().to_vec(),
        "Hamilton model fitted"
    );

    Ok(FittedModel {
        parameters: estimate.parameters,
        trajectory: estimate.trajectory,
        builder,
        statistics: composite.statistics().clone(),
        standardize_online: config.standardize_online,
        fitted_at: Utc::now(),
    })
}

impl FittedModel {
    /// 추정된 파라미터.
    pub fn parameters(&self) -> &ModelParameters {
        &self.parameters
    }

    /// 학습 구간 (및 이후 온라인 단계)의 필터링 궤적.
    pub fn trajectory(&self) -> &FilteredTrajectory {
        &self.trajectory
    }

    /// 학습 구간 지표 통계.
    pub fn statistics(&self) -> &BTreeMap<String, IndicatorStatistics> {
        &self.statistics
    }

    /// 설정된 지표 집합.
    pub fn indicators(&self) -> &IndicatorSet {
        self.builder.indicators()
    }

    /// 레짐 수.
    pub fn n_regimes(&self) -> usize {
        self.parameters.n_regimes()
    }

    /// 적합 시각.
    pub fn fitted_at(&self) -> DateTime<Utc> {
        self.fitted_at
    }

    /// 최신 값의 합성 스칼라.
    ///
    /// 기본은 원시 값의 가중 평균이며, `standardize_online`이면 학습 구간 통계로
    /// z-score를 적용합니다.
    pub fn online_composite(&self, snapshot: &IndicatorSnapshot) -> RegimeResult<Option<f64>> {
        let standardization = self.standardize_online.then_some(&self.statistics);
        self.builder.combine_latest(snapshot, standardization)
    }

    /// 궤적의 마지막 사후확률을 사전확률로 한 단계 필터링합니다.
    ///
    /// 합성 값이 정의되지 않으면 관측 없이 예측만 수행합니다.
    pub fn step(&self, snapshot: &IndicatorSnapshot) -> RegimeResult<FilterStep> {
        let prior: Array1<f64> = match self.trajectory.last() {
            Some(row) => row.to_owned(),
            None => self.parameters.initial_probabilities().clone(),
        };
        let filter = HamiltonFilter::new(&self.parameters);

        match self.online_composite(snapshot)? {
            Some(value) => Ok(filter.update(prior.view(), value)),
            None => {
                debug!("No usable indicator in snapshot, predict-only step");
                Ok(filter.predict_only(prior.view()))
            }
        }
    }

    /// 다음 시점의 레짐을 예측합니다. 모델은 변경되지 않습니다.
    pub fn predict(&self, snapshot: &IndicatorSnapshot) -> RegimeResult<RegimeClassification> {
        let step = self.step(snapshot)?;
        Ok(classification_from_posterior(&step.posterior, snapshot))
    }

    /// 한 단계 전진한 새 모델과 그 시점의 분류 결과를 반환합니다.
    ///
    /// 새 모델의 궤적은 이번 사후확률이 덧붙어 다음 예측의 사전확률이 됩니다.
    pub fn advance(
        &self,
        snapshot: &IndicatorSnapshot,
    ) -> RegimeResult<(FittedModel, RegimeClassification)> {
        let step = self.step(snapshot)?;
        let classification = classification_from_posterior(&step.posterior, snapshot);
        let trajectory = self
            .trajectory
            .extended(step.posterior.view(), step.log_increment)?;

        let model = FittedModel {
            trajectory,
            ..self.clone()
        };
        Ok((model, classification))
    }
}

impl RegimeClassifier for FittedModel {
    fn name(&self) -> &str {
        HAMILTON_CLASSIFIER
    }

    fn classify(&self, snapshot: &IndicatorSnapshot) -> RegimeResult<RegimeClassification> {
        self.predict(snapshot)
    }
}

/// 슬롯 사후확률에서 분류 결과를 만듭니다.
///
/// 레이블은 최대 사후확률 슬롯 (동률이면 낮은 인덱스), 신뢰도는 그 확률입니다.
fn classification_from_posterior(
    posterior: &Array1<f64>,
    snapshot: &IndicatorSnapshot,
) -> RegimeClassification {
    let slots = posterior.to_vec();
    let best = argmax(&slots);
    RegimeClassification {
        regime: Regime::for_slot(best, slots.len()),
        probabilities: RegimeProbabilities::from_slots(&slots),
        confidence: slots.get(best).copied().unwrap_or(0.0),
        indicators: snapshot.values.clone(),
        timestamp: snapshot.timestamp,
    }
}

// ================================================================================================
// HamiltonDetector
// ================================================================================================

/// 적합 상태를 보관하는 Hamilton 탐지기.
///
/// 생성 직후에는 적합되지 않은 상태이며 `fit()` 이후에만 예측할 수 있습니다.
#[derive(Debug, Clone)]
pub struct HamiltonDetector {
    indicators: IndicatorSet,
    config: HamiltonConfig,
    model: Option<FittedModel>,
}

impl HamiltonDetector {
    /// 새 탐지기를 생성합니다.
    pub fn new(indicators: IndicatorSet, config: HamiltonConfig) -> RegimeResult<Self> {
        config.validate()?;
        Ok(Self {
            indicators,
            config,
            model: None,
        })
    }

    /// 전체 설정에서 탐지기를 생성합니다.
    pub fn from_config(config: &DetectorConfig) -> RegimeResult<Self> {
        Self::new(config.indicator_set()?, config.hamilton.clone())
    }

    /// 모델을 적합합니다. 실패하면 이전 적합 결과가 그대로 유지됩니다.
    pub fn fit(&mut self, history: &IndicatorHistory) -> RegimeResult<&FittedModel> {
        let model = fit_model(&self.indicators, &self.config, history)?;
        Ok(self.model.insert(model))
    }

    /// 최신 지표 값으로 레짐을 예측합니다.
    pub fn predict(&self, snapshot: &IndicatorSnapshot) -> RegimeResult<RegimeClassification> {
        self.model.as_ref().ok_or(RegimeError::NotFitted)?.predict(snapshot)
    }

    /// 예측하고 그 사후확률을 다음 단계의 사전확률로 저장합니다.
    pub fn observe(&mut self, snapshot: &IndicatorSnapshot) -> RegimeResult<RegimeClassification> {
        let model = self.model.as_ref().ok_or(RegimeError::NotFitted)?;
        let (next, classification) = model.advance(snapshot)?;
        self.model = Some(next);
        Ok(classification)
    }

    /// 적합된 모델.
    pub fn model(&self) -> Option<&FittedModel> {
        self.model.as_ref()
    }

    /// 적합 여부.
    pub fn is_fitted(&self) -> bool {
        self.model.is_some()
    }

    /// 추정 설정.
    pub fn config(&self) -> &HamiltonConfig {
        &self.config
    }
}

impl RegimeClassifier for HamiltonDetector {
    fn name(&self) -> &str {
        HAMILTON_CLASSIFIER
    }

    fn classify(&self, snapshot: &IndicatorSnapshot) -> RegimeResult<RegimeClassification> {
        self.predict(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rand_distr::{Distribution, Normal};

    fn indicators() -> IndicatorSet {
        IndicatorSet::new([("VIX", 1.0)]).unwrap()
    }

    /// 정상 → 위기 → 정상 블록의 VIX 이력.
    fn history(seed: u64) -> IndicatorHistory {
        let mut rng = StdRng::seed_from_u64(seed);
        let blocks = [(14.0, 1.0, 40), (24.0, 1.0, 30), (40.0, 2.0, 30), (14.0, 1.0, 20)];
        let mut values = Vec::new();
        for (mean, sd, len) in blocks {
            let dist = Normal::new(mean, sd).unwrap();
            values.extend((0..len).map(|_| dist.sample(&mut rng)));
        }
        IndicatorHistory::from_columns([("VIX", values)]).unwrap()
    }

    fn fitted_model() -> FittedModel {
        FittedModel {
            parameters: ModelParameters::new(
                array![2.0, 0.0, -2.0],
                array![0.25, 0.25, 0.25],
                array![[0.9, 0.05, 0.05], [0.05, 0.9, 0.05], [0.05, 0.05, 0.9]],
                ModelParameters::uniform_initial(3),
            )
            .unwrap(),
            trajectory: FilteredTrajectory::new(array![[0.1, 0.1, 0.8]], 0.0),
            builder: CompositeBuilder::new(indicators()),
            statistics: BTreeMap::from([(
                "VIX".to_string(),
                IndicatorStatistics {
                    mean: 20.0,
                    std_dev: 5.0,
                    samples: 100,
                },
            )]),
            standardize_online: true,
            fitted_at: Utc::now(),
        }
    }

    #[test]
    fn test_predict_before_fit_fails() {
        let detector = HamiltonDetector::new(indicators(), HamiltonConfig::default()).unwrap();
        let snapshot = IndicatorSnapshot::new([("VIX", 20.0)]);

        assert!(!detector.is_fitted());
        assert!(matches!(detector.predict(&snapshot), Err(RegimeError::NotFitted)));
        assert!(matches!(detector.classify(&snapshot), Err(RegimeError::NotFitted)));
    }

    #[test]
    fn test_predict_uses_last_posterior_as_prior() {
        let model = fitted_model();
        // z = (30 - 20) / 5 = 2 → 슬롯 0
        let crisis = model.predict(&IndicatorSnapshot::new([("VIX", 30.0)])).unwrap();
        assert_eq!(crisis.regime, Regime::Crisis);
        assert!((crisis.probabilities.total() - 1.0).abs() < 1e-9);
        assert!((crisis.confidence - crisis.probabilities.crisis).abs() < 1e-12);

        // z = -2 → 슬롯 2
        let normal = model.predict(&IndicatorSnapshot::new([("VIX", 10.0)])).unwrap();
        assert_eq!(normal.regime, Regime::Normal);
    }

    #[test]
    fn test_predict_does_not_mutate_model() {
        let model = fitted_model();
        let snapshot = IndicatorSnapshot::new([("VIX", 30.0)]);
        let first = model.predict(&snapshot).unwrap();
        let second = model.predict(&snapshot).unwrap();
        assert_eq!(first, second);
        assert_eq!(model.trajectory().len(), 1);
    }

    #[test]
    fn test_advance_extends_trajectory() {
        let model = fitted_model();
        let snapshot = IndicatorSnapshot::new([("VIX", 30.0)]);
        let (next, classification) = model.advance(&snapshot).unwrap();

        assert_eq!(next.trajectory().len(), 2);
        assert_eq!(model.trajectory().len(), 1);
        let last = next.trajectory().last().unwrap();
        assert!((last[0] - classification.probabilities.crisis).abs() < 1e-12);
        assert!(next.trajectory().log_likelihood() < 0.0);
    }

    #[test]
    fn test_undefined_composite_is_predict_only() {
        let model = fitted_model();
        let snapshot = IndicatorSnapshot::new([("VIX", f64::NAN)]);
        let step = model.step(&snapshot).unwrap();

        let expected = array![0.1, 0.1, 0.8].dot(model.parameters().transition_matrix());
        for j in 0..3 {
            assert!((step.posterior[j] - expected[j]).abs() < 1e-12);
        }
        assert_eq!(step.log_increment, 0.0);
    }

    #[test]
    fn test_two_regime_labels() {
        let posterior = array![0.3, 0.7];
        let snapshot = IndicatorSnapshot::new([("VIX", 1.0)]);
        let c = classification_from_posterior(&posterior, &snapshot);
        assert_eq!(c.regime, Regime::Normal);
        assert_eq!(c.probabilities.stress, 0.0);
        assert!((c.confidence - 0.7).abs() < 1e-12);
    }

    #[test]
    fn test_fit_recovers_ordered_regimes() {
        let config = HamiltonConfig {
            standardize_online: true,
            ..HamiltonConfig::default()
        };
        let mut detector = HamiltonDetector::new(indicators(), config).unwrap();
        let model = detector.fit(&history(5)).unwrap();

        assert!(model.parameters().is_ordered());
        assert_eq!(model.trajectory().len(), 120);
        assert!(model.statistics().contains_key("VIX"));

        let snapshot = IndicatorSnapshot::new([("VIX", 42.0)]);
        let crisis = detector.predict(&snapshot).unwrap();
        assert_eq!(crisis.regime, Regime::Crisis);

        let observed = detector.observe(&snapshot).unwrap();
        assert_eq!(observed, crisis);
        assert_eq!(detector.model().unwrap().trajectory().len(), 121);
    }

    #[test]
    fn test_fit_with_insufficient_data_keeps_state() {
        let mut detector = HamiltonDetector::new(indicators(), HamiltonConfig::default()).unwrap();
        let short = IndicatorHistory::from_columns([("VIX", (0..30).map(f64::from).collect())])
            .unwrap();
        assert!(matches!(
            detector.fit(&short),
            Err(RegimeError::InsufficientData {
                required: 50,
                provided: 30
            })
        ));
        assert!(!detector.is_fitted());
    }
}
