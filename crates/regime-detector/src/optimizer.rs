//! 경계 제약 준뉴턴 최적화기.
//!
//! 투영(projected) BFGS 방식입니다.
//!
//! - 탐색 방향: 활성 경계 좌표를 제외한 `d = -H·g`
//! - 선 탐색: 경계 투영 + Armijo 백트래킹
//! - 기울기: 중앙 차분 (경계 근처에서는 한쪽 차분)
//! - 종료: 투영 기울기 노름, 상대 목적함수 변화, 선 탐색 정체

use ndarray::Array2;
use thiserror::Error;
use tracing::trace;

/// Armijo 충분 감소 계수.
const ARMIJO_C1: f64 = 1e-4;

/// 곡률 조건 하한 (이보다 작으면 BFGS 갱신 생략).
const CURVATURE_EPSILON: f64 = 1e-12;

/// 유한 차분 상대 스텝.
const FD_RELATIVE_STEP: f64 = 1e-6;

/// 최적화 오류.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OptimizerError {
    #[error("차원 불일치: 시작점 {start}, 경계 {bounds}")]
    DimensionMismatch { start: usize, bounds: usize },

    #[error("잘못된 경계 (좌표 {index}): [{lower}, {upper}]")]
    InvalidBounds { index: usize, lower: f64, upper: f64 },

    #[error("시작점의 목적함수 값이 유한하지 않습니다: {0}")]
    NonFiniteStart(f64),

    #[error("최대 반복 횟수 도달: {iterations}회 (목적함수 {objective})")]
    MaxIterations { iterations: usize, objective: f64 },
}

/// 종료 사유.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// 투영 기울기가 허용 오차 이하
    GradientTolerance,
    /// 목적함수 상대 변화가 허용 오차 이하
    FunctionTolerance,
    /// 더 이상 감소하는 스텝을 찾지 못함 (수치적 최적점)
    LineSearchStalled,
}

/// 최적화 결과.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizationReport {
    /// 최적점
    pub x: Vec<f64>,
    /// 최적점의 목적함수 값
    pub objective: f64,
    /// 수행한 반복 수
    pub iterations: usize,
    /// 목적함수 평가 횟수
    pub evaluations: usize,
    /// 종료 사유
    pub termination: Termination,
}

/// 경계 제약 BFGS 최적화기.
#[derive(Debug, Clone)]
pub struct BoundedBfgs {
    /// 최대 반복 수
    pub max_iterations: usize,
    /// 투영 기울기 무한 노름 허용 오차
    pub gradient_tolerance: f64,
    /// 목적함수 상대 변화 허용 오차
    pub function_tolerance: f64,
    /// 선 탐색 최대 반감 횟수
    pub max_line_search: usize,
}

impl Default for BoundedBfgs {
    fn default() -> Self {
        Self {
            max_iterations: 500,
            gradient_tolerance: 1e-5,
            function_tolerance: 2.2e-9,
            max_line_search: 40,
        }
    }
}

impl BoundedBfgs {
    /// 최대 반복 수를 지정하여 생성합니다.
    pub fn with_max_iterations(max_iterations: usize) -> Self {
        Self {
            max_iterations,
            ..Self::default()
        }
    }

    /// `objective`를 `bounds` 안에서 최소화합니다.
    ///
    /// 시작점은 경계 안으로 투영된 뒤 사용됩니다. 목적함수가 유한하지 않은 값을
    /// 돌려주는 점은 선 탐색에서 거부됩니다.
    pub fn minimize<F>(
        &self,
        objective: F,
        x0: &[f64],
        bounds: &[(f64, f64)],
    ) -> Result<OptimizationReport, OptimizerError>
    where
        F: FnMut(&[f64]) -> f64,
    {
        if x0.len() != bounds.len() {
            return Err(OptimizerError::DimensionMismatch {
                start: x0.len(),
                bounds: bounds.len(),
            });
        }
        for (index, &(lower, upper)) in bounds.iter().enumerate() {
            if lower.is_nan() || upper.is_nan() || lower > upper {
                return Err(OptimizerError::InvalidBounds {
                    index,
                    lower,
                    upper,
                });
            }
        }

        let n = x0.len();
        let mut problem = Problem {
            objective,
            bounds,
            evaluations: 0,
        };

        let mut x = project(x0, bounds);
        let mut f = problem.eval(&x);
        if !f.is_finite() {
            return Err(OptimizerError::NonFiniteStart(f));
        }
        let mut g = problem.gradient(&x, f);

        let mut h = Array2::<f64>::eye(n);
        let mut fresh = true;

        for iteration in 1..=self.max_iterations {
            let pg = projected_gradient(&x, &g, bounds);
            let pg_norm = inf_norm(&pg);
            if pg_norm <= self.gradient_tolerance {
                return Ok(problem.report(x, f, iteration - 1, Termination::GradientTolerance));
            }

            // 경계에 붙어 바깥을 향하는 좌표는 고정
            let active: Vec<bool> = (0..n).map(|i| is_active(x[i], g[i], bounds[i])).collect();
            let free_g: Vec<f64> = (0..n).map(|i| if active[i] { 0.0 } else { g[i] }).collect();

            let mut d: Vec<f64> = (0..n)
                .map(|i| {
                    if active[i] {
                        0.0
                    } else {
                        -(0..n).map(|j| h[[i, j]] * free_g[j]).sum::<f64>()
                    }
                })
                .collect();
            if dot(&free_g, &d) >= 0.0 {
                h = Array2::eye(n);
                fresh = true;
                d = free_g.iter().map(|v| -v).collect();
            }

            let initial_step = if fresh { (1.0 / pg_norm).min(1.0) } else { 1.0 };
            let Some((x_new, f_new)) = self.line_search(&mut problem, &x, f, &g, &d, initial_step)
            else {
                if fresh {
                    trace!(iteration, objective = f, "Line search stalled");
                    return Ok(problem.report(x, f, iteration, Termination::LineSearchStalled));
                }
                h = Array2::eye(n);
                fresh = true;
                continue;
            };

            let g_new = problem.gradient(&x_new, f_new);
            let s: Vec<f64> = x_new.iter().zip(&x).map(|(a, b)| a - b).collect();
            let y: Vec<f64> = g_new.iter().zip(&g).map(|(a, b)| a - b).collect();

            let relative_change = (f - f_new) / f.abs().max(f_new.abs()).max(1.0);
            if relative_change <= self.function_tolerance {
                return Ok(problem.report(x_new, f_new, iteration, Termination::FunctionTolerance));
            }

            let sy = dot(&s, &y);
            if sy > CURVATURE_EPSILON {
                bfgs_update(&mut h, &s, &y, sy);
                fresh = false;
            }

            x = x_new;
            f = f_new;
            g = g_new;
        }

        Err(OptimizerError::MaxIterations {
            iterations: self.max_iterations,
            objective: f,
        })
    }

    /// 투영 Armijo 백트래킹.
    fn line_search<F>(
        &self,
        problem: &mut Problem<'_, F>,
        x: &[f64],
        f: f64,
        g: &[f64],
        d: &[f64],
        initial_step: f64,
    ) -> Option<(Vec<f64>, f64)>
    where
        F: FnMut(&[f64]) -> f64,
    {
        let mut alpha = initial_step;
        for _ in 0..self.max_line_search {
            let trial: Vec<f64> = x.iter().zip(d).map(|(xi, di)| xi + alpha * di).collect();
            let candidate = project(&trial, problem.bounds);
            let step: Vec<f64> = candidate.iter().zip(x).map(|(a, b)| a - b).collect();
            if step.iter().all(|v| *v == 0.0) {
                return None;
            }

            let f_new = problem.eval(&candidate);
            if f_new.is_finite() && f_new <= f + ARMIJO_C1 * dot(g, &step) {
                return Some((candidate, f_new));
            }
            alpha *= 0.5;
        }
        None
    }
}

/// 목적함수와 평가 횟수.
struct Problem<'b, F> {
    objective: F,
    bounds: &'b [(f64, f64)],
    evaluations: usize,
}

impl<F> Problem<'_, F>
where
    F: FnMut(&[f64]) -> f64,
{
    fn eval(&mut self, x: &[f64]) -> f64 {
        self.evaluations += 1;
        let value = (self.objective)(x);
        if value.is_nan() {
            f64::INFINITY
        } else {
            value
        }
    }

    /// 유한 차분 기울기. 경계 밖으로 나가는 쪽이나 유한하지 않은 쪽은 사용하지 않습니다.
    fn gradient(&mut self, x: &[f64], fx: f64) -> Vec<f64> {
        let mut point = x.to_vec();
        let mut gradient = vec![0.0; x.len()];

        for i in 0..x.len() {
            let (lower, upper) = self.bounds[i];
            let xi = x[i];
            let h = FD_RELATIVE_STEP * xi.abs().max(1.0);

            let forward = if xi + h <= upper {
                point[i] = xi + h;
                Some(self.eval(&point)).filter(|v| v.is_finite())
            } else {
                None
            };
            let backward = if xi - h >= lower {
                point[i] = xi - h;
                Some(self.eval(&point)).filter(|v| v.is_finite())
            } else {
                None
            };
            point[i] = xi;

            gradient[i] = match (forward, backward) {
                (Some(fp), Some(fm)) => (fp - fm) / (2.0 * h),
                (Some(fp), None) => (fp - fx) / h,
                (None, Some(fm)) => (fx - fm) / h,
                (None, None) => 0.0,
            };
        }
        gradient
    }

    fn report(
        &self,
        x: Vec<f64>,
        objective: f64,
        iterations: usize,
        termination: Termination,
    ) -> OptimizationReport {
        OptimizationReport {
            x,
            objective,
            iterations,
            evaluations: self.evaluations,
            termination,
        }
    }
}

fn project(x: &[f64], bounds: &[(f64, f64)]) -> Vec<f64> {
    x.iter()
        .zip(bounds)
        .map(|(v, &(lower, upper))| v.clamp(lower, upper))
        .collect()
}

fn projected_gradient(x: &[f64], g: &[f64], bounds: &[(f64, f64)]) -> Vec<f64> {
    x.iter()
        .zip(g)
        .zip(bounds)
        .map(|((xi, gi), &(lower, upper))| xi - (xi - gi).clamp(lower, upper))
        .collect()
}

fn is_active(x: f64, g: f64, (lower, upper): (f64, f64)) -> bool {
    (x <= lower && g > 0.0) || (x >= upper && g < 0.0)
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn inf_norm(v: &[f64]) -> f64 {
    v.iter().fold(0.0, |acc: f64, x| acc.max(x.abs()))
}

/// 역헤시안 BFGS 갱신.
///
/// `H+ = H + ((sᵀy + yᵀHy) / (sᵀy)²) ssᵀ - (Hy sᵀ + s (Hy)ᵀ) / sᵀy`
fn bfgs_update(h: &mut Array2<f64>, s: &[f64], y: &[f64], sy: f64) {
    let n = s.len();
    let hy: Vec<f64> = (0..n)
        .map(|i| (0..n).map(|j| h[[i, j]] * y[j]).sum())
        .collect();
    let yhy = dot(y, &hy);
    let scale = (sy + yhy) / (sy * sy);

    for i in 0..n {
        for j in 0..n {
            h[[i, j]] += scale * s[i] * s[j] - (hy[i] * s[j] + s[i] * hy[j]) / sy;
        }
    }
}
