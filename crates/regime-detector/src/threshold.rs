//! 임계값 기반 퍼지 레짐 분류기.
//!
//! 적합이 필요 없는 결정적 분류기입니다. 지표별로 밴드 사이를 선형 보간한
//! 3원소 확률 벡터 `[CRISIS, STRESS, NORMAL]`을 만들고 설정 가중치로 결합합니다.
//!
//! # 표준 밴드 (crisis > stress > normal)
//!
//! | 값 | 확률 |
//! |----|------|
//! | `v ≥ crisis` | `[1, 0, 0]` |
//! | `stress ≤ v < crisis` | CRISIS ↔ STRESS 보간 |
//! | `normal ≤ v < stress` | STRESS ↔ NORMAL 보간 |
//! | `v < normal` | `[0, 0, 1]` |
//!
//! # 역방향 밴드 (inversion < flat < steep < very_steep)
//!
//! 값이 작을수록 위험합니다 (장단기 금리차).
//!
//! | 값 | 확률 |
//! |----|------|
//! | `v ≤ inversion` | `[1, 0, 0]` |
//! | `inversion < v ≤ flat` | CRISIS ↔ STRESS 보간 |
//! | `flat < v ≤ steep` | STRESS ↔ NORMAL 보간 |
//! | `steep < v ≤ very_steep` | NORMAL → 과열 경계로 보간 |
//! | `v > very_steep` | `[0, 0.25, 0.75]` |

use std::collections::BTreeMap;
use tracing::warn;

use regime_core::{
    canonical_name, DetectorConfig, IndicatorSet, IndicatorSnapshot, RegimeClassification,
    RegimeClassifier, RegimeError, RegimeProbabilities, RegimeResult, ThresholdBands,
};

/// 분류기 이름.
pub const THRESHOLD_CLASSIFIER: &str = "threshold";

/// 금리차가 지나치게 가파를 때 STRESS로 넘기는 확률.
const VERY_STEEP_STRESS_SHARE: f64 = 0.25;

/// 밴드 기준 퍼지 소속도 `[CRISIS, STRESS, NORMAL]`.
pub fn fuzzy_membership(bands: &ThresholdBands, value: f64) -> [f64; 3] {
    match *bands {
        ThresholdBands::Standard {
            crisis,
            stress,
            normal,
        } => {
            if value >= crisis {
                [1.0, 0.0, 0.0]
            } else if value >= stress {
                let t = (value - stress) / (crisis - stress);
                [t, 1.0 - t, 0.0]
            } else if value >= normal {
                let t = (value - normal) / (stress - normal);
                [0.0, t, 1.0 - t]
            } else {
                [0.0, 0.0, 1.0]
            }
        }
        ThresholdBands::Inverted {
            inversion,
            flat,
            steep,
            very_steep,
        } => {
            if value <= inversion {
                [1.0, 0.0, 0.0]
            } else if value <= flat {
                let t = (value - inversion) / (flat - inversion);
                [1.0 - t, t, 0.0]
            } else if value <= steep {
                let t = (value - flat) / (steep - flat);
                [0.0, 1.0 - t, t]
            } else if value <= very_steep {
                let t = (value - steep) / (very_steep - steep) * VERY_STEEP_STRESS_SHARE;
                [0.0, t, 1.0 - t]
            } else {
                [0.0, VERY_STEEP_STRESS_SHARE, 1.0 - VERY_STEEP_STRESS_SHARE]
            }
        }
    }
}

/// 임계값 퍼지 분류기.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdClassifier {
    indicators: IndicatorSet,
    bands: BTreeMap<String, ThresholdBands>,
}

impl ThresholdClassifier {
    /// 새 분류기를 생성합니다.
    ///
    /// # 에러
    /// - 가중치가 있는 지표와 밴드가 있는 지표가 일치하지 않음 (`Config`)
    /// - 순서가 잘못된 밴드 (`Config`)
    pub fn new(
        indicators: IndicatorSet,
        bands: BTreeMap<String, ThresholdBands>,
    ) -> RegimeResult<Self> {
        let bands: BTreeMap<String, ThresholdBands> = bands
            .into_iter()
            .map(|(name, b)| (canonical_name(&name), b))
            .collect();

        for (name, b) in &bands {
            b.validate(name)?;
            if !indicators.contains(name) {
                return Err(RegimeError::Config(format!(
                    "{} 임계값 밴드에 대응하는 가중치가 없습니다",
                    name
                )));
            }
        }
        if let Some(missing) = indicators.names().find(|name| !bands.contains_key(*name)) {
            return Err(RegimeError::Config(format!(
                "{} 지표의 임계값 밴드가 없습니다",
                missing
            )));
        }

        Ok(Self { indicators, bands })
    }

    /// 전체 설정에서 분류기를 생성합니다.
    pub fn from_config(config: &DetectorConfig) -> RegimeResult<Self> {
        Self::new(config.indicator_set()?, config.thresholds.clone())
    }

    /// 설정된 지표 집합.
    pub fn indicators(&self) -> &IndicatorSet {
        &self.indicators
    }

    /// 지표별 퍼지 확률. 누락되거나 유한하지 않은 값은 제외됩니다.
    pub fn indicator_probabilities(
        &self,
        snapshot: &IndicatorSnapshot,
    ) -> RegimeResult<BTreeMap<String, [f64; 3]>> {
        self.indicators.check_names(snapshot.names())?;

        let mut result = BTreeMap::new();
        for (name, bands) in &self.bands {
            match snapshot.get(name) {
                Some(value) if value.is_finite() => {
                    result.insert(name.clone(), fuzzy_membership(bands, value));
                }
                Some(_) => warn!(indicator = %name, "Non-finite indicator value excluded"),
                None => warn!(indicator = %name, "Configured indicator missing from snapshot, excluded"),
            }
        }
        Ok(result)
    }

    /// 스냅샷을 분류합니다.
    ///
    /// 사용 가능한 지표가 없으면 균등 확률(1/3)을 반환하며, 동률 규칙에 따라
    /// 레이블은 CRISIS가 됩니다.
    pub fn classify(&self, snapshot: &IndicatorSnapshot) -> RegimeResult<RegimeClassification> {
        let per_indicator = self.indicator_probabilities(snapshot)?;

        let mut combined = [0.0; 3];
        let mut total_weight = 0.0;
        for (name, probs) in &per_indicator {
            let Some(weight) = self.indicators.weight(name) else {
                continue;
            };
            for (acc, p) in combined.iter_mut().zip(probs) {
                *acc += weight * p;
            }
            total_weight += weight;
        }

        let probabilities = if total_weight > 0.0 {
            RegimeProbabilities::new(combined.map(|v| v / total_weight))
        } else {
            warn!("No usable indicator, falling back to uniform probabilities");
            RegimeProbabilities::uniform()
        };

        Ok(RegimeClassification::from_probabilities(probabilities, snapshot))
    }
}

impl RegimeClassifier for ThresholdClassifier {
    fn name(&self) -> &str {
        THRESHOLD_CLASSIFIER
    }

    fn classify(&self, snapshot: &IndicatorSnapshot) -> RegimeResult<RegimeClassification> {
        ThresholdClassifier::classify(self, snapshot)
    }
}
