//! # Regime Core
//!
//! 매크로/시장 레짐 탐지의 핵심 도메인 모델 및 타입을 제공합니다:
//! - 레짐 레이블 및 확률 (CRISIS / STRESS / NORMAL)
//! - 지표 입력 (검증된 지표 집합, 시계열, 스냅샷)
//! - Hamilton 필터 파라미터와 사후확률 궤적
//! - 공통 분류 결과 및 [`RegimeClassifier`] trait
//! - 설정 관리
//! - 로깅 인프라

pub mod config;
pub mod domain;
pub mod error;
pub mod logging;

pub use self::config::*;
pub use domain::*;
pub use error::*;
pub use logging::*;
