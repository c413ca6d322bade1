//! Hamilton 필터.
//!
//! 숨은 레짐에 대한 전방(forward) 재귀 베이즈 필터입니다. 시점마다
//!
//! 1. **예측**: `predicted = p[t-1] · A`
//! 2. **우도**: 레짐별 가우시안 밀도 `N(y_t; mean_j, variance_j)`
//! 3. **결합**: `joint = predicted ⊙ likelihood`
//! 4. **정규화**: `marginal = Σ joint`
//!
//! 를 수행합니다. `marginal`이 [`UNDERFLOW_THRESHOLD`] 이하이면 관측을 건너뛰고
//! (`p[t] = predicted`) 로그우도에 [`UNDERFLOW_PENALTY`]를 더합니다.
//! 초기 조건은 `p[0] = initial_probabilities`이며 재귀는 t = 1부터 시작합니다.

use ndarray::{Array1, Array2, ArrayView1};
use std::f64::consts::PI;
use tracing::debug;

use regime_core::{FilteredTrajectory, ModelParameters};

/// 수치 언더플로우 판정 기준.
pub const UNDERFLOW_THRESHOLD: f64 = 1e-50;

/// 언더플로우 시 로그우도 페널티.
pub const UNDERFLOW_PENALTY: f64 = -50.0;

/// 가우시안 확률밀도.
pub fn gaussian_pdf(x: f64, mean: f64, variance: f64) -> f64 {
    let diff = x - mean;
    (-0.5 * diff * diff / variance).exp() / (2.0 * PI * variance).sqrt()
}

/// 한 단계 필터링 결과.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterStep {
    /// 사후확률
    pub posterior: Array1<f64>,
    /// 로그우도 증가분
    pub log_increment: f64,
    /// 언더플로우 대체 경로 사용 여부
    pub underflow: bool,
}

/// 모델 파라미터에 묶인 Hamilton 필터.
#[derive(Debug, Clone, Copy)]
pub struct HamiltonFilter<'a> {
    params: &'a ModelParameters,
}

impl<'a> HamiltonFilter<'a> {
    /// 새 필터를 생성합니다.
    pub fn new(params: &'a ModelParameters) -> Self {
        Self { params }
    }

    /// 예측 단계: 이전 사후확률 × 전이행렬.
    pub fn predict(&self, prior: ArrayView1<'_, f64>) -> Array1<f64> {
        prior.dot(self.params.transition_matrix())
    }

    /// 레짐별 관측 우도.
    pub fn likelihoods(&self, observation: f64) -> Array1<f64> {
        let means = self.params.means();
        let variances = self.params.variances();
        Array1::from_shape_fn(means.len(), |j| {
            gaussian_pdf(observation, means[j], variances[j])
        })
    }

    /// 예측 + 갱신 한 단계.
    pub fn update(&self, prior: ArrayView1<'_, f64>, observation: f64) -> FilterStep {
        let predicted = self.predict(prior);
        let joint = &predicted * &self.likelihoods(observation);
        let marginal = joint.sum();

        if marginal > UNDERFLOW_THRESHOLD {
            FilterStep {
                posterior: joint / marginal,
                log_increment: marginal.ln(),
                underflow: false,
            }
        } else {
            debug!(observation, marginal, "Marginal likelihood underflow, skipping observation");
            FilterStep {
                posterior: predicted,
                log_increment: UNDERFLOW_PENALTY,
                underflow: true,
            }
        }
    }

    /// 관측 없이 예측만 수행합니다 (로그우도 변화 없음).
    pub fn predict_only(&self, prior: ArrayView1<'_, f64>) -> FilterStep {
        FilterStep {
            posterior: self.predict(prior),
            log_increment: 0.0,
            underflow: false,
        }
    }

    /// 전체 시계열을 필터링합니다.
    pub fn run(&self, observations: &[f64]) -> FilteredTrajectory {
        let n = self.params.n_regimes();
        let mut posteriors = Array2::zeros((observations.len(), n));
        let log_likelihood = self.forward(observations, |t, p| {
            posteriors.row_mut(t).assign(&ArrayView1::from(p));
        });
        FilteredTrajectory::new(posteriors, log_likelihood)
    }

    /// 누적 로그우도만 계산합니다 (최적화 목적함수용).
    pub fn log_likelihood(&self, observations: &[f64]) -> f64 {
        self.forward(observations, |_, _| {})
    }

    /// 버퍼를 재사용하는 전방 재귀. 시점마다 `on_step(t, posterior)`를 호출합니다.
    fn forward<F>(&self, observations: &[f64], mut on_step: F) -> f64
    where
        F: FnMut(usize, &[f64]),
    {
        if observations.is_empty() {
            return 0.0;
        }

        let n = self.params.n_regimes();
        let means = self.params.means();
        let variances = self.params.variances();
        let transition = self.params.transition_matrix();

        let mut posterior: Vec<f64> = self.params.initial_probabilities().to_vec();
        let mut predicted = vec![0.0; n];
        let mut joint = vec![0.0; n];
        let mut log_likelihood = 0.0;

        on_step(0, &posterior);

        for (t, &y) in observations.iter().enumerate().skip(1) {
            for j in 0..n {
                predicted[j] = (0..n).map(|i| posterior[i] * transition[[i, j]]).sum();
            }
            let mut marginal = 0.0;
            for j in 0..n {
                joint[j] = predicted[j] * gaussian_pdf(y, means[j], variances[j]);
                marginal += joint[j];
            }

            if marginal > UNDERFLOW_THRESHOLD {
                for j in 0..n {
                    posterior[j] = joint[j] / marginal;
                }
                log_likelihood += marginal.ln();
            } else {
                posterior.copy_from_slice(&predicted);
                log_likelihood += UNDERFLOW_PENALTY;
            }
            on_step(t, &posterior);
        }

        log_likelihood
    }
}
