//! 레짐 분류 결과와 분류기 trait.
//!
//! Hamilton 기반 예측기와 임계값 분류기는 같은 [`RegimeClassifier`] 계약을 구현하므로
//! 호출자는 다른 변경 없이 둘을 교체할 수 있습니다.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::indicator::IndicatorSnapshot;
use super::regime::{Regime, RegimeProbabilities};
use crate::error::RegimeResult;

/// 레짐 분류 결과 (두 탐지기의 공통 출력).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeClassification {
    /// 판정된 레짐
    pub regime: Regime,
    /// 레짐별 확률
    pub probabilities: RegimeProbabilities,
    /// 신뢰도 = 최대 사후확률 (엔트로피 기반 아님)
    pub confidence: f64,
    /// 판정에 사용된 입력 지표 값
    pub indicators: BTreeMap<String, f64>,
    /// 관측 시각
    pub timestamp: DateTime<Utc>,
}

impl RegimeClassification {
    /// 확률에서 레이블과 신뢰도를 도출하여 결과를 만듭니다.
    pub fn from_probabilities(
        probabilities: RegimeProbabilities,
        snapshot: &IndicatorSnapshot,
    ) -> Self {
        let (regime, confidence) = probabilities.most_likely();
        Self {
            regime,
            probabilities,
            confidence,
            indicators: snapshot.values.clone(),
            timestamp: snapshot.timestamp,
        }
    }

    /// JSON 문자열로 직렬화합니다 (저장 계층 경계용).
    pub fn to_json(&self) -> RegimeResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// 요약 문자열 (로그/알림용).
    pub fn summary(&self) -> String {
        format!(
            "레짐: {} (신뢰도 {:.1}%) | CRISIS {:.1}% / STRESS {:.1}% / NORMAL {:.1}%",
            self.regime,
            self.confidence * 100.0,
            self.probabilities.crisis * 100.0,
            self.probabilities.stress * 100.0,
            self.probabilities.normal * 100.0,
        )
    }
}

/// 최신 지표 값으로 현재 레짐을 분류하는 기능.
pub trait RegimeClassifier: Send + Sync {
    /// 분류기 이름.
    fn name(&self) -> &str;

    /// 스냅샷을 분류합니다.
    fn classify(&self, snapshot: &IndicatorSnapshot) -> RegimeResult<RegimeClassification>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_from_probabilities() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let snapshot = IndicatorSnapshot::at([("VIX", 22.0)], ts);
        let result =
            RegimeClassification::from_probabilities(RegimeProbabilities::new([0.2, 0.5, 0.3]), &snapshot);

        assert_eq!(result.regime, Regime::Stress);
        assert!((result.confidence - 0.5).abs() < 1e-12);
        assert_eq!(result.indicators.get("VIX"), Some(&22.0));
        assert_eq!(result.timestamp, ts);
        assert!(result.summary().contains("STRESS"));
    }

    #[test]
    fn test_json_round_trip() {
        let snapshot = IndicatorSnapshot::new([("VIX", 35.0)]);
        let result = RegimeClassification::from_probabilities(
            RegimeProbabilities::new([0.9, 0.1, 0.0]),
            &snapshot,
        );
        let json = result.to_json().unwrap();
        assert!(json.contains("\"regime\":\"CRISIS\""));
        assert!(json.contains("\"CRISIS\":0.9"));

        let parsed: RegimeClassification = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, result);
    }
}
