//! Regime - 시장/매크로 레짐 분류.
//!
//! 레짐 인덱스 순서(CRISIS=0, STRESS=1, NORMAL=2)는 계약입니다.
//! Hamilton 필터의 슬롯 0은 항상 가장 스트레스가 높은 레짐입니다.

use serde::{Deserialize, Serialize};
use std::fmt;

/// 시장 레짐 3단계.
///
/// - **Crisis**: 위기 (변동성 급등, 신용 스프레드 확대, 금리 역전)
/// - **Stress**: 긴장 (위험 신호가 일부 관측됨)
/// - **Normal**: 정상 시장
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Regime {
    /// 위기
    Crisis,
    /// 긴장
    Stress,
    /// 정상
    Normal,
}

impl Regime {
    /// 인덱스 순서대로 나열한 전체 레짐.
    pub const ALL: [Regime; 3] = [Regime::Crisis, Regime::Stress, Regime::Normal];

    /// 레짐 인덱스 (0 = 가장 위험).
    pub fn index(self) -> usize {
        match self {
            Self::Crisis => 0,
            Self::Stress => 1,
            Self::Normal => 2,
        }
    }

    /// `n`개 슬롯 중 `slot` 번째 슬롯의 레이블.
    ///
    /// 슬롯 0은 CRISIS, 마지막 슬롯은 NORMAL, 그 사이는 모두 STRESS입니다.
    pub fn for_slot(slot: usize, n_slots: usize) -> Self {
        if slot == 0 {
            Self::Crisis
        } else if slot + 1 >= n_slots {
            Self::Normal
        } else {
            Self::Stress
        }
    }

    /// 위험 우선순위 (높을수록 위험).
    pub fn severity(self) -> u8 {
        match self {
            Self::Crisis => 3,
            Self::Stress => 2,
            Self::Normal => 1,
        }
    }

    /// 리스크 축소 필요 여부.
    pub fn needs_caution(self) -> bool {
        !matches!(self, Self::Normal)
    }

    /// 설명 문자열.
    pub fn description(self) -> &'static str {
        match self {
            Self::Crisis => "위기 (고변동성, 신용 경색)",
            Self::Stress => "긴장 (위험 신호 일부 관측)",
            Self::Normal => "정상 시장",
        }
    }
}

impl fmt::Display for Regime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Crisis => "CRISIS",
            Self::Stress => "STRESS",
            Self::Normal => "NORMAL",
        };
        write!(f, "{}", s)
    }
}

/// 레짐별 확률.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegimeProbabilities {
    #[serde(rename = "CRISIS")]
    pub crisis: f64,
    #[serde(rename = "STRESS")]
    pub stress: f64,
    #[serde(rename = "NORMAL")]
    pub normal: f64,
}

impl RegimeProbabilities {
    /// 인덱스 순서 배열에서 생성합니다.
    pub fn new(values: [f64; 3]) -> Self {
        Self {
            crisis: values[0],
            stress: values[1],
            normal: values[2],
        }
    }

    /// 균등 분포 (각 1/3).
    pub fn uniform() -> Self {
        let third = 1.0 / 3.0;
        Self::new([third, third, third])
    }

    /// 슬롯 사후확률을 레이블별로 합산합니다.
    pub fn from_slots(posterior: &[f64]) -> Self {
        let mut acc = [0.0; 3];
        for (slot, p) in posterior.iter().enumerate() {
            acc[Regime::for_slot(slot, posterior.len()).index()] += p;
        }
        Self::new(acc)
    }

    /// 특정 레짐의 확률.
    pub fn get(&self, regime: Regime) -> f64 {
        match regime {
            Regime::Crisis => self.crisis,
            Regime::Stress => self.stress,
            Regime::Normal => self.normal,
        }
    }

    /// 인덱스 순서 배열.
    pub fn to_array(&self) -> [f64; 3] {
        [self.crisis, self.stress, self.normal]
    }

    /// 확률 합계.
    pub fn total(&self) -> f64 {
        self.crisis + self.stress + self.normal
    }

    /// 최대 확률 레짐과 그 확률 (동률이면 낮은 인덱스 우선).
    pub fn most_likely(&self) -> (Regime, f64) {
        let values = self.to_array();
        let slot = argmax(&values);
        (Regime::ALL[slot], values[slot])
    }
}

/// 최대값 인덱스 (동률이면 낮은 인덱스). 빈 슬라이스는 0.
pub fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, v) in values.iter().enumerate().skip(1) {
        if *v > values[best] {
            best = i;
        }
    }
    best
}
