//! 지표 입력 타입.
//!
//! 지표 이름은 설정에서 오며 코드에 하드코딩되지 않습니다.
//! [`IndicatorSet`]은 설정 시점에 검증된 이름/가중치 집합이며,
//! 입력에 설정되지 않은 이름이 섞여 있으면 경계에서 거부합니다.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::{RegimeError, RegimeResult};

/// 지표 이름 정규화 (공백 제거, 대문자).
pub fn canonical_name(name: &str) -> String {
    name.trim().to_uppercase()
}

// ================================================================================================
// IndicatorSet
// ================================================================================================

/// 검증된 지표 이름 → 가중치 집합.
///
/// 이름 순으로 정렬되어 있어 설정 순서와 무관하게 동일한 순서로 순회합니다.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndicatorSet {
    weights: BTreeMap<String, f64>,
}

impl IndicatorSet {
    /// 가중치 목록으로 지표 집합을 생성합니다.
    ///
    /// # 에러
    /// - 빈 집합
    /// - 양수 유한값이 아닌 가중치
    /// - 정규화 후 중복되는 이름
    pub fn new<'a, I>(weights: I) -> RegimeResult<Self>
    where
        I: IntoIterator<Item = (&'a str, f64)>,
    {
        let mut map = BTreeMap::new();
        for (name, weight) in weights {
            let key = canonical_name(name);
            if key.is_empty() {
                return Err(RegimeError::Config("빈 지표 이름".to_string()));
            }
            if !weight.is_finite() || weight <= 0.0 {
                return Err(RegimeError::Config(format!(
                    "{} 가중치는 양수여야 합니다: {}",
                    key, weight
                )));
            }
            if map.insert(key.clone(), weight).is_some() {
                return Err(RegimeError::Config(format!("중복된 지표 이름: {}", key)));
            }
        }

        if map.is_empty() {
            return Err(RegimeError::Config(
                "최소 하나의 지표 가중치가 필요합니다".to_string(),
            ));
        }

        Ok(Self { weights: map })
    }

    /// 지표 가중치.
    pub fn weight(&self, name: &str) -> Option<f64> {
        self.weights.get(&canonical_name(name)).copied()
    }

    /// 설정된 지표인지 확인합니다.
    pub fn contains(&self, name: &str) -> bool {
        self.weights.contains_key(&canonical_name(name))
    }

    /// (이름, 가중치)를 이름 순으로 순회합니다.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.weights.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// 지표 이름 목록.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.weights.keys().map(String::as_str)
    }

    /// 지표 수.
    pub fn len(&self) -> usize {
        self.weights.len()
    }

    /// 빈 집합 여부 (검증된 집합은 항상 false).
    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    /// 전체 가중치 합.
    pub fn total_weight(&self) -> f64 {
        self.weights.values().sum()
    }

    /// 입력 이름이 모두 설정된 지표인지 확인합니다.
    pub fn check_names<'a, I>(&self, names: I) -> RegimeResult<()>
    where
        I: IntoIterator<Item = &'a str>,
    {
        for name in names {
            if !self.contains(name) {
                return Err(RegimeError::UnknownIndicator(name.to_string()));
            }
        }
        Ok(())
    }
}

// ================================================================================================
// IndicatorSeries / IndicatorHistory
// ================================================================================================

/// 타임스탬프가 있는 단일 지표 시계열.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSeries {
    /// 지표 이름
    pub name: String,
    /// (시각, 값) 목록
    pub points: Vec<(DateTime<Utc>, f64)>,
}

impl IndicatorSeries {
    /// 새 시계열을 생성합니다.
    pub fn new(name: impl Into<String>, points: Vec<(DateTime<Utc>, f64)>) -> Self {
        Self {
            name: name.into(),
            points,
        }
    }

    /// 값만 추출합니다.
    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|(_, v)| *v).collect()
    }
}

/// 시각 정렬된 다지표 이력 (모든 열의 길이가 같음).
///
/// 값이 없는 칸은 NaN으로 채워지며, 합성 지표 계산 시 해당 시점의 결측으로 처리됩니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorHistory {
    timestamps: Option<Vec<DateTime<Utc>>>,
    columns: BTreeMap<String, Vec<f64>>,
    len: usize,
}

impl IndicatorHistory {
    /// 이미 정렬된 동일 길이 열로 이력을 생성합니다.
    pub fn from_columns<I, S>(columns: I) -> RegimeResult<Self>
    where
        I: IntoIterator<Item = (S, Vec<f64>)>,
        S: AsRef<str>,
    {
        let mut map = BTreeMap::new();
        let mut len: Option<usize> = None;

        for (name, values) in columns {
            let key = canonical_name(name.as_ref());
            match len {
                Some(expected) if expected != values.len() => {
                    return Err(RegimeError::InvalidInput(format!(
                        "{} 길이 {}가 다른 지표 길이 {}와 다릅니다",
                        key,
                        values.len(),
                        expected
                    )));
                }
                None => len = Some(values.len()),
                _ => {}
            }
            if map.insert(key.clone(), values).is_some() {
                return Err(RegimeError::InvalidInput(format!("중복된 지표 이름: {}", key)));
            }
        }

        Ok(Self {
            timestamps: None,
            columns: map,
            len: len.unwrap_or(0),
        })
    }

    /// 타임스탬프 기준으로 시계열들을 외부 조인합니다.
    ///
    /// 결과 시각은 오름차순이며, 해당 시각에 값이 없는 지표는 NaN입니다.
    /// 같은 시계열에 중복 시각이 있으면 마지막 값을 사용합니다.
    pub fn align(series: &[IndicatorSeries]) -> RegimeResult<Self> {
        let timestamps: Vec<DateTime<Utc>> = series
            .iter()
            .flat_map(|s| s.points.iter().map(|(t, _)| *t))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let mut columns = BTreeMap::new();
        for s in series {
            let key = canonical_name(&s.name);
            let by_time: BTreeMap<DateTime<Utc>, f64> = s.points.iter().copied().collect();
            let column: Vec<f64> = timestamps
                .iter()
                .map(|t| by_time.get(t).copied().unwrap_or(f64::NAN))
                .collect();
            if columns.insert(key.clone(), column).is_some() {
                return Err(RegimeError::InvalidInput(format!("중복된 지표 이름: {}", key)));
            }
        }

        Ok(Self {
            len: timestamps.len(),
            timestamps: Some(timestamps),
            columns,
        })
    }

    /// 시점 수.
    pub fn len(&self) -> usize {
        self.len
    }

    /// 빈 이력 여부.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// 지표 열.
    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns.get(&canonical_name(name)).map(Vec::as_slice)
    }

    /// 지표 이름 목록.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    /// 시각 목록 (정렬 조인으로 만든 경우에만 존재).
    pub fn timestamps(&self) -> Option<&[DateTime<Utc>]> {
        self.timestamps.as_deref()
    }

    /// 가장 최근 시점의 유한한 값들로 스냅샷을 만듭니다.
    ///
    /// 타임스탬프가 없는 이력은 현재 시각을 사용합니다.
    pub fn latest_snapshot(&self) -> Option<IndicatorSnapshot> {
        let last = self.len.checked_sub(1)?;
        let values: BTreeMap<String, f64> = self
            .columns
            .iter()
            .filter_map(|(name, col)| {
                let v = col[last];
                v.is_finite().then(|| (name.clone(), v))
            })
            .collect();
        let timestamp = self
            .timestamps
            .as_ref()
            .and_then(|ts| ts.last().copied())
            .unwrap_or_else(Utc::now);
        Some(IndicatorSnapshot { values, timestamp })
    }
}

// ================================================================================================
// IndicatorSnapshot
// ================================================================================================

/// 단일 시점의 최신 지표 값.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    /// 지표 이름 → 값
    pub values: BTreeMap<String, f64>,
    /// 관측 시각
    pub timestamp: DateTime<Utc>,
}

impl IndicatorSnapshot {
    /// 현재 시각으로 스냅샷을 생성합니다.
    pub fn new<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: AsRef<str>,
    {
        Self::at(values, Utc::now())
    }

    /// 지정한 시각으로 스냅샷을 생성합니다.
    pub fn at<I, S>(values: I, timestamp: DateTime<Utc>) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: AsRef<str>,
    {
        Self {
            values: values
                .into_iter()
                .map(|(name, v)| (canonical_name(name.as_ref()), v))
                .collect(),
            timestamp,
        }
    }

    /// 지표 값.
    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(&canonical_name(name)).copied()
    }

    /// 지표 이름 목록.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_indicator_set_validation() {
        assert!(IndicatorSet::new([("VIX", 0.5), ("HY_SPREADS", 0.5)]).is_ok());
        assert!(IndicatorSet::new(std::iter::empty::<(&str, f64)>()).is_err());
        assert!(IndicatorSet::new([("VIX", -1.0)]).is_err());
        assert!(IndicatorSet::new([("VIX", f64::INFINITY)]).is_err());
        assert!(IndicatorSet::new([("vix", 1.0), ("VIX ", 1.0)]).is_err());
    }

    #[test]
    fn test_indicator_set_lookup_is_case_insensitive() {
        let set = IndicatorSet::new([("vix", 2.0), ("TERM_SPREAD", 1.0)]).unwrap();
        assert_eq!(set.weight("VIX"), Some(2.0));
        assert!(set.contains("term_spread"));
        assert!((set.total_weight() - 3.0).abs() < 1e-12);
        assert_eq!(set.names().collect::<Vec<_>>(), vec!["TERM_SPREAD", "VIX"]);
    }

    #[test]
    fn test_check_names_rejects_unknown() {
        let set = IndicatorSet::new([("VIX", 1.0)]).unwrap();
        assert!(set.check_names(["VIX"]).is_ok());
        assert!(matches!(
            set.check_names(["VIX", "GDP"]),
            Err(RegimeError::UnknownIndicator(name)) if name == "GDP"
        ));
    }

    #[test]
    fn test_history_from_columns_rejects_ragged() {
        let ok = IndicatorHistory::from_columns([("VIX", vec![1.0, 2.0]), ("HY", vec![3.0, 4.0])]);
        assert_eq!(ok.unwrap().len(), 2);

        let ragged =
            IndicatorHistory::from_columns([("VIX", vec![1.0, 2.0]), ("HY", vec![3.0])]);
        assert!(matches!(ragged, Err(RegimeError::InvalidInput(_))));
    }

    #[test]
    fn test_align_outer_joins_with_nan() {
        let vix = IndicatorSeries::new("VIX", vec![(day(1), 15.0), (day(2), 16.0), (day(3), 17.0)]);
        let hy = IndicatorSeries::new("HY_SPREADS", vec![(day(3), 4.5), (day(1), 4.0)]);

        let history = IndicatorHistory::align(&[vix, hy]).unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history.timestamps().unwrap(), &[day(1), day(2), day(3)]);

        let hy_col = history.column("HY_SPREADS").unwrap();
        assert_eq!(hy_col[0], 4.0);
        assert!(hy_col[1].is_nan());
        assert_eq!(hy_col[2], 4.5);
    }

    #[test]
    fn test_latest_snapshot_skips_missing() {
        let vix = IndicatorSeries::new("VIX", vec![(day(1), 15.0), (day(2), 18.0)]);
        let hy = IndicatorSeries::new("HY_SPREADS", vec![(day(1), 4.0)]);
        let history = IndicatorHistory::align(&[vix, hy]).unwrap();

        let snapshot = history.latest_snapshot().unwrap();
        assert_eq!(snapshot.timestamp, day(2));
        assert_eq!(snapshot.get("VIX"), Some(18.0));
        assert_eq!(snapshot.get("HY_SPREADS"), None);
    }

    #[test]
    fn test_snapshot_canonicalizes_names() {
        let snapshot = IndicatorSnapshot::at([("vix", 20.0)], day(5));
        assert_eq!(snapshot.get("VIX"), Some(20.0));
        assert_eq!(snapshot.names().collect::<Vec<_>>(), vec!["VIX"]);
    }
}
