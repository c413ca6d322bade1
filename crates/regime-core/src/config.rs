//! 설정 관리.
//!
//! 지표 가중치, 임계값 밴드, Hamilton 추정 옵션, 로깅 설정을 정의합니다.
//! 설정은 기본값 → TOML 파일 → `REGIME__` 환경 변수 순으로 병합됩니다.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::domain::{canonical_name, IndicatorSet};
use crate::error::{RegimeError, RegimeResult};

/// 기본 설정 파일 경로.
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// VIX 변동성 지수
pub const VIX: &str = "VIX";
/// 하이일드 스프레드
pub const HY_SPREADS: &str = "HY_SPREADS";
/// BAA 회사채 스프레드
pub const BAA_SPREADS: &str = "BAA_SPREADS";
/// 장단기 금리차 (10Y-2Y)
pub const TERM_SPREAD: &str = "TERM_SPREAD";

/// 레짐 탐지기 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DetectorConfig {
    /// 지표 이름 → 가중치 (양수, 합이 1일 필요 없음)
    #[serde(default = "default_weights")]
    pub weights: BTreeMap<String, f64>,
    /// 지표 이름 → 임계값 밴드 (Threshold 분류기용)
    #[serde(default = "default_thresholds")]
    pub thresholds: BTreeMap<String, ThresholdBands>,
    /// Hamilton 필터 추정 설정
    #[serde(default)]
    pub hamilton: HamiltonConfig,
    /// 로깅 설정
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            weights: default_weights(),
            thresholds: default_thresholds(),
            hamilton: HamiltonConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

fn default_weights() -> BTreeMap<String, f64> {
    BTreeMap::from([
        (VIX.to_string(), 0.30),
        (HY_SPREADS.to_string(), 0.30),
        (BAA_SPREADS.to_string(), 0.20),
        (TERM_SPREAD.to_string(), 0.20),
    ])
}

fn default_thresholds() -> BTreeMap<String, ThresholdBands> {
    BTreeMap::from([
        (
            VIX.to_string(),
            ThresholdBands::Standard {
                crisis: 30.0,
                stress: 20.0,
                normal: 15.0,
            },
        ),
        (
            HY_SPREADS.to_string(),
            ThresholdBands::Standard {
                crisis: 8.0,
                stress: 5.5,
                normal: 4.0,
            },
        ),
        (
            BAA_SPREADS.to_string(),
            ThresholdBands::Standard {
                crisis: 7.0,
                stress: 6.0,
                normal: 5.0,
            },
        ),
        (
            TERM_SPREAD.to_string(),
            ThresholdBands::Inverted {
                inversion: 0.0,
                flat: 0.5,
                steep: 1.5,
                very_steep: 2.5,
            },
        ),
    ])
}

/// 지표별 임계값 밴드.
///
/// - `standard`: 값이 클수록 위험 (VIX, 신용 스프레드)
/// - `inverted`: 값이 작을수록 위험 (장단기 금리차, 음수 = 역전)
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ThresholdBands {
    /// 3단계 밴드: crisis > stress > normal
    Standard { crisis: f64, stress: f64, normal: f64 },
    /// 4단계 역방향 밴드: inversion < flat < steep < very_steep
    Inverted {
        inversion: f64,
        flat: f64,
        steep: f64,
        very_steep: f64,
    },
}

impl ThresholdBands {
    /// 밴드 경계값의 순서를 검증합니다.
    pub fn validate(&self, name: &str) -> RegimeResult<()> {
        let ordered = match *self {
            Self::Standard {
                crisis,
                stress,
                normal,
            } => is_strictly_increasing(&[normal, stress, crisis]),
            Self::Inverted {
                inversion,
                flat,
                steep,
                very_steep,
            } => is_strictly_increasing(&[inversion, flat, steep, very_steep]),
        };

        if ordered {
            Ok(())
        } else {
            Err(RegimeError::Config(format!(
                "{} 임계값 밴드의 순서가 올바르지 않습니다: {:?}",
                name, self
            )))
        }
    }
}

fn is_strictly_increasing(values: &[f64]) -> bool {
    values.iter().all(|v| v.is_finite()) && values.windows(2).all(|w| w[0] < w[1])
}

/// Hamilton 필터 추정 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HamiltonConfig {
    /// 레짐 수 (최소 2)
    #[serde(default = "default_n_regimes")]
    pub n_regimes: usize,
    /// 최적화 시작점 수 (섭동 없는 시드 포함)
    #[serde(default = "default_n_restarts")]
    pub n_restarts: usize,
    /// 재시작 시드에 더하는 가우시안 노이즈 표준편차
    #[serde(default = "default_perturbation_scale")]
    pub perturbation_scale: f64,
    /// 재시작 노이즈용 난수 시드
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// 적합에 필요한 최소 합성 관측치 수
    #[serde(default = "default_min_observations")]
    pub min_observations: usize,
    /// 최적화 1회당 최대 반복 수
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    /// 온라인 예측 시 학습 구간 통계로 z-score 적용 여부
    #[serde(default)]
    pub standardize_online: bool,
}

fn default_n_regimes() -> usize {
    3
}
fn default_n_restarts() -> usize {
    5
}
fn default_perturbation_scale() -> f64 {
    0.1
}
fn default_seed() -> u64 {
    42
}
fn default_min_observations() -> usize {
    50
}
fn default_max_iterations() -> usize {
    500
}

impl Default for HamiltonConfig {
    fn default() -> Self {
        Self {
            n_regimes: default_n_regimes(),
            n_restarts: default_n_restarts(),
            perturbation_scale: default_perturbation_scale(),
            seed: default_seed(),
            min_observations: default_min_observations(),
            max_iterations: default_max_iterations(),
            standardize_online: false,
        }
    }
}

impl HamiltonConfig {
    /// 설정값 범위를 검증합니다.
    pub fn validate(&self) -> RegimeResult<()> {
        if self.n_regimes < 2 {
            return Err(RegimeError::Config(format!(
                "n_regimes는 2 이상이어야 합니다: {}",
                self.n_regimes
            )));
        }
        if self.n_restarts == 0 {
            return Err(RegimeError::Config(
                "n_restarts는 1 이상이어야 합니다".to_string(),
            ));
        }
        if !self.perturbation_scale.is_finite() || self.perturbation_scale < 0.0 {
            return Err(RegimeError::Config(format!(
                "perturbation_scale은 0 이상의 유한값이어야 합니다: {}",
                self.perturbation_scale
            )));
        }
        if self.min_observations < self.n_regimes {
            return Err(RegimeError::Config(format!(
                "min_observations({})는 n_regimes({}) 이상이어야 합니다",
                self.min_observations, self.n_regimes
            )));
        }
        if self.max_iterations == 0 {
            return Err(RegimeError::Config(
                "max_iterations는 1 이상이어야 합니다".to_string(),
            ));
        }
        Ok(())
    }
}

/// 로깅 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// 로그 레벨
    pub level: String,
    /// 로그 형식 (pretty, json, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl DetectorConfig {
    /// 파일과 환경 변수에서 설정을 로드하고 검증합니다.
    pub fn load<P: AsRef<Path>>(path: P) -> RegimeResult<Self> {
        let builder = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("REGIME")
                    .separator("__")
                    .try_parsing(true),
            );

        let config: Self = builder.build()?.try_deserialize()?;
        let config = config.canonicalized();
        config.validate()?;
        Ok(config)
    }

    /// 기본 경로에서 설정을 로드합니다.
    pub fn load_default() -> RegimeResult<Self> {
        Self::load(DEFAULT_CONFIG_PATH)
    }

    /// 지표 이름을 정규형(대문자)으로 변환합니다.
    ///
    /// 키를 소문자로 접는 설정 소스에서도 지표 이름이 일치하도록 합니다.
    pub fn canonicalized(self) -> Self {
        Self {
            weights: self
                .weights
                .into_iter()
                .map(|(name, w)| (canonical_name(&name), w))
                .collect(),
            thresholds: self
                .thresholds
                .into_iter()
                .map(|(name, bands)| (canonical_name(&name), bands))
                .collect(),
            ..self
        }
    }

    /// 전체 설정을 검증합니다.
    pub fn validate(&self) -> RegimeResult<()> {
        self.indicator_set()?;
        for (name, bands) in &self.thresholds {
            bands.validate(name)?;
        }
        self.hamilton.validate()
    }

    /// 가중치 설정에서 검증된 지표 집합을 생성합니다.
    pub fn indicator_set(&self) -> RegimeResult<IndicatorSet> {
        IndicatorSet::new(self.weights.iter().map(|(name, w)| (name.as_str(), *w)))
    }
}
