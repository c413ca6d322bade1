//! 합성 지표 생성기.
//!
//! 여러 원시 지표를 z-score로 표준화한 뒤 가중 평균하여 시점별 단일 스칼라로 합칩니다.
//!
//! # 제외 규칙
//!
//! - 설정에는 있으나 입력에 없는 지표
//! - 유한 샘플이 2개 미만인 지표
//! - 표본 표준편차가 0인 지표
//!
//! 제외된 지표는 0으로 채우지 않고 해당 계산에서 빠지며, 경고 로그를 남깁니다.
//! 어떤 시점에 사용 가능한 지표가 하나도 없으면 그 시점의 값은 `None`입니다.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

use regime_core::{IndicatorHistory, IndicatorSet, IndicatorSnapshot, RegimeResult};

/// 학습 구간의 지표 통계 (z-score 기준).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndicatorStatistics {
    /// 평균
    pub mean: f64,
    /// 표본 표준편차 (n - 1)
    pub std_dev: f64,
    /// 유한 샘플 수
    pub samples: usize,
}

impl IndicatorStatistics {
    /// 유한 샘플로 통계를 계산합니다.
    ///
    /// 샘플이 2개 미만이거나 표준편차가 0이면 제외 사유를 반환합니다.
    pub fn from_samples(values: &[f64]) -> Result<Self, &'static str> {
        let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        let n = finite.len();
        if n < 2 {
            return Err("fewer than 2 samples");
        }

        let mean = finite.iter().sum::<f64>() / n as f64;
        let variance = finite.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
        let std_dev = variance.sqrt();

        if !(std_dev.is_finite() && std_dev > 0.0) {
            return Err("zero variance");
        }

        Ok(Self {
            mean,
            std_dev,
            samples: n,
        })
    }

    /// z-score.
    pub fn z_score(&self, value: f64) -> f64 {
        (value - self.mean) / self.std_dev
    }
}

/// 합성 관측치 시계열.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeSeries {
    values: Vec<Option<f64>>,
    statistics: BTreeMap<String, IndicatorStatistics>,
    timestamps: Option<Vec<DateTime<Utc>>>,
}

impl CompositeSeries {
    /// 시점별 합성 값 (정의되지 않은 시점은 `None`).
    pub fn values(&self) -> &[Option<f64>] {
        &self.values
    }

    /// 정의된 값만 시간 순으로 추출합니다.
    pub fn defined_values(&self) -> Vec<f64> {
        self.values.iter().flatten().copied().collect()
    }

    /// 정의된 값의 개수.
    pub fn defined_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_some()).count()
    }

    /// 결합에 포함된 지표의 통계.
    pub fn statistics(&self) -> &BTreeMap<String, IndicatorStatistics> {
        &self.statistics
    }

    /// 시각 목록 (입력 이력에 있었던 경우).
    pub fn timestamps(&self) -> Option<&[DateTime<Utc>]> {
        self.timestamps.as_deref()
    }

    /// 시점 수.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// 빈 시계열 여부.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// 합성 지표 생성기.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompositeBuilder {
    indicators: IndicatorSet,
}

impl CompositeBuilder {
    /// 새 생성기를 만듭니다.
    pub fn new(indicators: IndicatorSet) -> Self {
        Self { indicators }
    }

    /// 설정된 지표 집합.
    pub fn indicators(&self) -> &IndicatorSet {
        &self.indicators
    }

    /// 이력 전체에 대해 가중 z-score 합성 시계열을 만듭니다.
    ///
    /// # 에러
    /// - 설정에 없는 지표가 이력에 포함된 경우 (`UnknownIndicator`)
    pub fn build(&self, history: &IndicatorHistory) -> RegimeResult<CompositeSeries> {
        self.indicators.check_names(history.names())?;

        let len = history.len();
        let mut weighted_sum = vec![0.0; len];
        let mut total_weight = vec![0.0; len];
        let mut statistics = BTreeMap::new();

        for (name, weight) in self.indicators.iter() {
            let Some(column) = history.column(name) else {
                warn!(indicator = name, "Configured indicator missing from history, excluded");
                continue;
            };

            let stats = match IndicatorStatistics::from_samples(column) {
                Ok(stats) => stats,
                Err(reason) => {
                    warn!(indicator = name, reason, "Degenerate indicator excluded from composite");
                    continue;
                }
            };

            for (t, value) in column.iter().enumerate() {
                if value.is_finite() {
                    weighted_sum[t] += weight * stats.z_score(*value);
                    total_weight[t] += weight;
                }
            }
            statistics.insert(name.to_string(), stats);
        }

        let values = weighted_sum
            .into_iter()
            .zip(total_weight)
            .map(|(sum, weight)| (weight > 0.0).then(|| sum / weight))
            .collect();

        Ok(CompositeSeries {
            values,
            statistics,
            timestamps: history.timestamps().map(<[_]>::to_vec),
        })
    }

    /// 단일 시점 값의 가중 평균을 계산합니다.
    ///
    /// `standardization`이 없으면 원시 값의 가중 평균을, 있으면 해당 통계로
    /// z-score를 적용한 가중 평균을 반환합니다. 통계가 없는 지표는 제외됩니다.
    /// 사용 가능한 지표가 없으면 `None`입니다.
    pub fn combine_latest(
        &self,
        snapshot: &IndicatorSnapshot,
        standardization: Option<&BTreeMap<String, IndicatorStatistics>>,
    ) -> RegimeResult<Option<f64>> {
        self.indicators.check_names(snapshot.names())?;

        let mut weighted_sum = 0.0;
        let mut total_weight = 0.0;

        for (name, weight) in self.indicators.iter() {
            let value = match snapshot.get(name) {
                Some(v) if v.is_finite() => v,
                Some(_) => {
                    warn!(indicator = name, "Non-finite indicator value excluded");
                    continue;
                }
                None => {
                    warn!(indicator = name, "Configured indicator missing from snapshot, excluded");
                    continue;
                }
            };

            let value = match standardization {
                None => value,
                Some(stats) => match stats.get(name) {
                    Some(s) => s.z_score(value),
                    None => {
                        warn!(indicator = name, "No training statistics for indicator, excluded");
                        continue;
                    }
                },
            };

            weighted_sum += weight * value;
            total_weight += weight;
        }

        Ok((total_weight > 0.0).then(|| weighted_sum / total_weight))
    }
}
