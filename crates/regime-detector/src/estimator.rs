//! 최대우도 파라미터 추정기.
//!
//! Hamilton 필터의 로그우도를 다중 시작점 경계 제약 BFGS로 최대화합니다.
//!
//! # 파라미터 벡터 배치
//!
//! `[means (n), log_variances (n), logits (n × n, 행 우선)]`
//!
//! 전이행렬은 각 행의 logit에 대각 편향([`DIAGONAL_BIAS`])을 더한 softmax입니다.
//! logit이 모두 0이면 대각 원소는 약 0.79 (n = 3)가 됩니다.

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use tracing::{debug, info, warn};

use ndarray::{Array1, Array2};
use regime_core::{
    FilteredTrajectory, HamiltonConfig, ModelParameters, RegimeError, RegimeResult, VARIANCE_FLOOR,
};

use crate::filter::HamiltonFilter;
use crate::optimizer::{BoundedBfgs, OptimizationReport};

/// 전이행렬 softmax의 대각 편향 (레짐 지속성 사전 정보).
pub const DIAGONAL_BIAS: f64 = 2.0;

/// logit 탐색 범위 (±).
const LOGIT_BOUND: f64 = 10.0;

/// 시드 logit 계산 시 확률 하한.
const MIN_SEED_PROBABILITY: f64 = 1e-12;

// ================================================================================================
// Parameterization
// ================================================================================================

/// 모델 파라미터와 최적화 벡터 사이의 변환.
#[derive(Debug, Clone)]
pub struct Parameterization {
    n_regimes: usize,
    initial_probabilities: Array1<f64>,
}

impl Parameterization {
    /// 초기 확률을 고정한 변환을 생성합니다.
    pub fn new(initial_probabilities: Array1<f64>) -> Self {
        Self {
            n_regimes: initial_probabilities.len(),
            initial_probabilities,
        }
    }

    /// 벡터 차원 (2n + n²).
    pub fn dimension(&self) -> usize {
        2 * self.n_regimes + self.n_regimes * self.n_regimes
    }

    /// 파라미터를 최적화 벡터로 변환합니다.
    ///
    /// logit은 `ln(a_ij) - bias·δ_ij`를 행별로 중심화한 값이므로
    /// [`unpack`](Self::unpack)으로 원래 전이행렬이 복원됩니다.
    pub fn pack(&self, params: &ModelParameters) -> Vec<f64> {
        let n = self.n_regimes;
        let mut theta = Vec::with_capacity(self.dimension());
        theta.extend(params.means().iter().copied());
        theta.extend(params.variances().iter().map(|v| v.ln()));

        let transition = params.transition_matrix();
        for i in 0..n {
            let row: Vec<f64> = (0..n)
                .map(|j| {
                    let bias = if i == j { DIAGONAL_BIAS } else { 0.0 };
                    transition[[i, j]].max(MIN_SEED_PROBABILITY).ln() - bias
                })
                .collect();
            let center = row.iter().sum::<f64>() / n as f64;
            theta.extend(row.iter().map(|l| l - center));
        }
        theta
    }

    /// 최적화 벡터를 파라미터로 변환합니다.
    pub fn unpack(&self, theta: &[f64]) -> RegimeResult<ModelParameters> {
        let n = self.n_regimes;
        if theta.len() != self.dimension() {
            return Err(RegimeError::InvalidInput(format!(
                "파라미터 벡터 차원 불일치: 기대 {}, 실제 {}",
                self.dimension(),
                theta.len()
            )));
        }

        let means = Array1::from_iter(theta[..n].iter().copied());
        let variances = Array1::from_iter(theta[n..2 * n].iter().map(|v| v.exp()));

        let logits = &theta[2 * n..];
        let mut transition = Array2::zeros((n, n));
        for i in 0..n {
            let biased: Vec<f64> = (0..n)
                .map(|j| logits[i * n + j] + if i == j { DIAGONAL_BIAS } else { 0.0 })
                .collect();
            let max = biased.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let exps: Vec<f64> = biased.iter().map(|l| (l - max).exp()).collect();
            let total: f64 = exps.iter().sum();
            for j in 0..n {
                transition[[i, j]] = exps[j] / total;
            }
        }

        ModelParameters::new(
            means,
            variances,
            transition,
            self.initial_probabilities.clone(),
        )
    }

    /// 관측 범위에서 유도한 탐색 경계.
    ///
    /// - 평균: `[min - span, max + span]`
    /// - 로그 분산: `[ln(1e-6), ln(max(span², 1) · 10)]`
    /// - logit: `[-10, 10]`
    pub fn bounds(&self, observations: &[f64]) -> Vec<(f64, f64)> {
        let n = self.n_regimes;
        let lo = observations.iter().copied().fold(f64::INFINITY, f64::min);
        let hi = observations.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let (lo, hi) = if lo.is_finite() && hi.is_finite() {
            (lo, hi)
        } else {
            (0.0, 0.0)
        };
        let span = (hi - lo).max(1.0);
        let max_log_variance = ((span * span).max(1.0) * 10.0).ln();

        let mut bounds = Vec::with_capacity(self.dimension());
        bounds.extend(std::iter::repeat((lo - span, hi + span)).take(n));
        bounds.extend(std::iter::repeat((VARIANCE_FLOOR.ln(), max_log_variance)).take(n));
        bounds.extend(std::iter::repeat((-LOGIT_BOUND, LOGIT_BOUND)).take(n * n));
        bounds
    }

    /// 음의 로그우도 (최적화 목적함수). 변환 실패나 비유한 값은 +∞입니다.
    pub fn negative_log_likelihood(&self, theta: &[f64], observations: &[f64]) -> f64 {
        match self.unpack(theta) {
            Ok(params) => {
                let value = -HamiltonFilter::new(&params).log_likelihood(observations);
                if value.is_finite() {
                    value
                } else {
                    f64::INFINITY
                }
            }
            Err(_) => f64::INFINITY,
        }
    }
}

fn project(x: &[f64], bounds: &[(f64, f64)]) -> Vec<f64> {
    x.iter()
        .zip(bounds)
        .map(|(v, &(lower, upper))| v.clamp(lower, upper))
        .collect()
}

// ================================================================================================
// ParameterEstimator
// ================================================================================================

/// 추정 결과.
#[derive(Debug, Clone)]
pub struct Estimate {
    /// 평균 내림차순으로 정렬된 최적 파라미터
    pub parameters: ModelParameters,
    /// 최적 파라미터로 다시 계산한 필터링 궤적
    pub trajectory: FilteredTrajectory,
    /// 최적 재시작의 최적화 보고서
    pub report: OptimizationReport,
    /// 수렴한 재시작 수
    pub converged_restarts: usize,
    /// 전체 시도 수
    pub attempts: usize,
}

/// 다중 시작점 최대우도 추정기.
#[derive(Debug, Clone)]
pub struct ParameterEstimator {
    n_restarts: usize,
    perturbation_scale: f64,
    seed: u64,
    min_observations: usize,
    optimizer: BoundedBfgs,
}

impl Default for ParameterEstimator {
    fn default() -> Self {
        Self::from_config(&HamiltonConfig::default())
    }
}

impl ParameterEstimator {
    /// 설정에서 추정기를 생성합니다.
    pub fn from_config(config: &HamiltonConfig) -> Self {
        Self {
            n_restarts: config.n_restarts,
            perturbation_scale: config.perturbation_scale,
            seed: config.seed,
            min_observations: config.min_observations,
            optimizer: BoundedBfgs::with_max_iterations(config.max_iterations),
        }
    }

    /// 최적화기를 교체합니다.
    pub fn with_optimizer(mut self, optimizer: BoundedBfgs) -> Self {
        self.optimizer = optimizer;
        self
    }

    /// 최소 관측치 수.
    pub fn min_observations(&self) -> usize {
        self.min_observations
    }

    /// 로그우도를 최대화하는 파라미터를 찾습니다.
    ///
    /// 시도 0은 `initial`에서, 이후 시도는 같은 시드에 가우시안 노이즈를 더한 점에서
    /// 시작합니다. 실패하거나 수렴하지 않은 시도는 버려집니다.
    ///
    /// # 에러
    /// - 관측치가 `min_observations`보다 적음 (`InsufficientData`)
    /// - 모든 시도 실패 (`OptimizationFailure`)
    pub fn estimate(
        &self,
        observations: &[f64],
        initial: &ModelParameters,
    ) -> RegimeResult<Estimate> {
        if observations.len() < self.min_observations {
            return Err(RegimeError::InsufficientData {
                required: self.min_observations,
                provided: observations.len(),
            });
        }
        if observations.iter().any(|x| !x.is_finite()) {
            return Err(RegimeError::InvalidInput(
                "합성 관측치에 유한하지 않은 값".to_string(),
            ));
        }

        let parameterization = Parameterization::new(initial.initial_probabilities().clone());
        let bounds = parameterization.bounds(observations);
        let seed_theta = project(&parameterization.pack(initial), &bounds);

        let noise = Normal::new(0.0, self.perturbation_scale).map_err(|e| {
            RegimeError::Config(format!("잘못된 perturbation_scale: {}", e))
        })?;
        let mut rng = StdRng::seed_from_u64(self.seed);

        let mut best: Option<OptimizationReport> = None;
        let mut converged = 0;
        let mut last_error = String::from("no attempts");

        for attempt in 0..self.n_restarts {
            let start = if attempt == 0 {
                seed_theta.clone()
            } else {
                let perturbed: Vec<f64> = seed_theta
                    .iter()
                    .map(|v| v + noise.sample(&mut rng))
                    .collect();
                project(&perturbed, &bounds)
            };

            let objective =
                |theta: &[f64]| parameterization.negative_log_likelihood(theta, observations);

            match self.optimizer.minimize(objective, &start, &bounds) {
                Ok(report) => {
                    debug!(
                        attempt,
                        log_likelihood = -report.objective,
                        iterations = report.iterations,
                        evaluations = report.evaluations,
                        termination = ?report.termination,
                        "Restart converged"
                    );
                    converged += 1;
                    let improves = best
                        .as_ref()
                        .map_or(true, |b| report.objective < b.objective);
                    if improves {
                        best = Some(report);
                    }
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Discarding failed optimizer restart");
                    last_error = e.to_string();
                }
            }
        }

        let Some(report) = best else {
            return Err(RegimeError::OptimizationFailure {
                attempts: self.n_restarts,
                last_error,
            });
        };

        let parameters = parameterization.unpack(&report.x)?.sorted_by_mean_desc();
        let trajectory = HamiltonFilter::new(&parameters).run(observations);

        info!(
            log_likelihood = trajectory.log_likelihood(),
            converged_restarts = converged,
            attempts = self.n_restarts,
            "Parameter estimation completed"
        );

        Ok(Estimate {
            parameters,
            trajectory,
            report,
            converged_restarts: converged,
            attempts: self.n_restarts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::initializer::{persistence_matrix, ParameterInitializer};
    use ndarray::{array, Axis};

    fn synthetic(seed: u64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let clusters = [(-1.5, 0.3), (0.0, 0.3), (2.0, 0.4)];
        let mut data = Vec::new();
        for _ in 0..2 {
            for &(mean, sd) in &clusters {
                let dist = Normal::new(mean, sd).unwrap();
                data.extend((0..30).map(|_| dist.sample(&mut rng)));
            }
        }
        data
    }

    #[test]
    fn test_pack_unpack_recovers_parameters() {
        let params = ModelParameters::new(
            array![1.0, 0.0, -1.0],
            array![0.5, 1.0, 2.0],
            persistence_matrix(3, 0.8),
            ModelParameters::uniform_initial(3),
        )
        .unwrap();
        let p = Parameterization::new(params.initial_probabilities().clone());
        let theta = p.pack(&params);
        assert_eq!(theta.len(), p.dimension());

        let restored = p.unpack(&theta).unwrap();
        for (a, b) in restored.means().iter().zip(params.means()) {
            assert!((a - b).abs() < 1e-12);
        }
        for (a, b) in restored.variances().iter().zip(params.variances()) {
            assert!((a - b).abs() < 1e-12);
        }
        for (a, b) in restored
            .transition_matrix()
            .iter()
            .zip(params.transition_matrix())
        {
            assert!((a - b).abs() < 1e-9);
        }
    }

    #[test]
    fn test_zero_logits_encode_persistence() {
        let p = Parameterization::new(ModelParameters::uniform_initial(3));
        let mut theta = vec![0.0; p.dimension()];
        theta[..3].copy_from_slice(&[1.0, 0.0, -1.0]);
        let params = p.unpack(&theta).unwrap();

        let diagonal = DIAGONAL_BIAS.exp() / (DIAGONAL_BIAS.exp() + 2.0);
        assert!((params.transition_matrix()[[0, 0]] - diagonal).abs() < 1e-12);
        for row in params.transition_matrix().axis_iter(Axis(0)) {
            assert!((row.sum() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_bounds() {
        let p = Parameterization::new(ModelParameters::uniform_initial(2));
        let bounds = p.bounds(&[1.0, 4.0]);
        assert_eq!(bounds.len(), p.dimension());
        assert_eq!(bounds[0], (-2.0, 7.0));
        assert!((bounds[2].0 - VARIANCE_FLOOR.ln()).abs() < 1e-12);
        assert!((bounds[2].1 - 90.0f64.ln()).abs() < 1e-12);
        assert_eq!(bounds[4], (-LOGIT_BOUND, LOGIT_BOUND));
    }

    #[test]
    fn test_negative_log_likelihood_handles_bad_vectors() {
        let p = Parameterization::new(ModelParameters::uniform_initial(2));
        assert_eq!(p.negative_log_likelihood(&[0.0], &[1.0, 2.0]), f64::INFINITY);
        let mut theta = vec![0.0; p.dimension()];
        theta[0] = f64::NAN;
        assert_eq!(p.negative_log_likelihood(&theta, &[1.0, 2.0]), f64::INFINITY);
    }

    #[test]
    fn test_estimate_improves_likelihood() {
        let data = synthetic(7);
        let initial = ParameterInitializer::new(3).initialize(&data).unwrap();
        let initial_ll = HamiltonFilter::new(&initial).log_likelihood(&data);

        let estimate = ParameterEstimator::default().estimate(&data, &initial).unwrap();

        assert!(estimate.parameters.is_ordered());
        assert!(estimate.trajectory.log_likelihood() >= initial_ll - 1e-6);
        assert_eq!(estimate.trajectory.len(), data.len());
        assert!(estimate.converged_restarts >= 1);
        assert_eq!(estimate.attempts, 5);
        assert!((estimate.parameters.means()[0] - 2.0).abs() < 0.3);
        assert!((estimate.parameters.means()[2] + 1.5).abs() < 0.3);
    }

    #[test]
    fn test_estimate_is_deterministic() {
        let data = synthetic(11);
        let initial = ParameterInitializer::new(3).initialize(&data).unwrap();
        let estimator = ParameterEstimator::default();

        let a = estimator.estimate(&data, &initial).unwrap();
        let b = estimator.estimate(&data, &initial).unwrap();
        assert_eq!(a.parameters, b.parameters);
        assert_eq!(a.trajectory, b.trajectory);
    }

    #[test]
    fn test_insufficient_data() {
        let data: Vec<f64> = (0..49).map(|i| i as f64).collect();
        let initial = ParameterInitializer::new(3).initialize(&data).unwrap();
        let result = ParameterEstimator::default().estimate(&data, &initial);
        assert!(matches!(
            result,
            Err(RegimeError::InsufficientData {
                required: 50,
                provided: 49
            })
        ));
    }

    #[test]
    fn test_all_restarts_failing() {
        let data = synthetic(3);
        let initial = ParameterInitializer::new(3).initialize(&data).unwrap();
        let config = HamiltonConfig {
            max_iterations: 1,
            ..HamiltonConfig::default()
        };
        let result = ParameterEstimator::from_config(&config).estimate(&data, &initial);
        assert!(matches!(
            result,
            Err(RegimeError::OptimizationFailure { attempts: 5, .. })
        ));
    }
}
