//! 레짐 탐지 시스템의 에러 타입.
//!
//! 수치 언더플로우와 누락 지표는 에러로 노출되지 않습니다.
//! 전자는 필터 내부에서 복구되고, 후자는 경고 로그로만 남습니다.

use thiserror::Error;

/// 레짐 탐지 에러.
#[derive(Debug, Error)]
pub enum RegimeError {
    /// 적합(fit)에 필요한 관측치 부족
    #[error("데이터 부족: 필요 {required}개, 제공 {provided}개")]
    InsufficientData { required: usize, provided: usize },

    /// 모든 최적화 재시작 실패
    #[error("최적화 실패: {attempts}회 시도 모두 실패 (마지막 원인: {last_error})")]
    OptimizationFailure { attempts: usize, last_error: String },

    /// 적합 전에 예측 호출
    #[error("모델이 적합되지 않았습니다. predict() 전에 fit()을 호출하세요")]
    NotFitted,

    /// 설정에 없는 지표 이름
    #[error("알 수 없는 지표: {0}")]
    UnknownIndicator(String),

    /// 잘못된 입력
    #[error("잘못된 입력: {0}")]
    InvalidInput(String),

    /// 설정 검증 에러
    #[error("설정 에러: {0}")]
    Config(String),

    /// 설정 로드 에러
    #[error("설정 로드 실패: {0}")]
    ConfigLoad(#[from] config::ConfigError),

    /// 직렬화 에러
    #[error("직렬화 에러: {0}")]
    Serialization(String),
}

/// 레짐 탐지 작업을 위한 Result 타입.
pub type RegimeResult<T> = Result<T, RegimeError>;

impl RegimeError {
    /// 다른 입력 데이터로 재시도하면 해결될 수 있는 에러인지 확인합니다.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            RegimeError::InsufficientData { .. }
                | RegimeError::InvalidInput(_)
                | RegimeError::UnknownIndicator(_)
        )
    }

    /// 호출자가 모델을 (재)적합해야 하는 에러인지 확인합니다.
    pub fn requires_fit(&self) -> bool {
        matches!(
            self,
            RegimeError::NotFitted | RegimeError::OptimizationFailure { .. }
        )
    }
}

impl From<serde_json::Error> for RegimeError {
    fn from(err: serde_json::Error) -> Self {
        RegimeError::Serialization(err.to_string())
    }
}
