//! Hamilton 필터 모델 파라미터와 필터링 결과.
//!
//! 불변식:
//! - 레짐 수는 생성 후 변하지 않음
//! - 분산은 항상 [`VARIANCE_FLOOR`] 이상
//! - 전이행렬의 각 행은 합이 1, 모든 원소는 [0, 1]
//! - 레짐은 평균 내림차순 (슬롯 0 = 가장 스트레스가 높은 레짐)

use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};

use crate::domain::regime::{argmax, RegimeProbabilities};
use crate::error::{RegimeError, RegimeResult};

/// 분산 하한.
pub const VARIANCE_FLOOR: f64 = 1e-6;

/// 확률 벡터 합계 허용 오차.
pub const PROBABILITY_TOLERANCE: f64 = 1e-6;

/// 레짐 전환 모델 파라미터.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelParameters {
    means: Array1<f64>,
    variances: Array1<f64>,
    transition_matrix: Array2<f64>,
    initial_probabilities: Array1<f64>,
}

impl ModelParameters {
    /// 파라미터를 검증하여 생성합니다.
    ///
    /// 분산은 [`VARIANCE_FLOOR`]로 하한 처리되고, 허용 오차 이내의 행/벡터는
    /// 정확히 합이 1이 되도록 재정규화됩니다. 레짐 순서는 바꾸지 않습니다.
    pub fn new(
        means: Array1<f64>,
        variances: Array1<f64>,
        transition_matrix: Array2<f64>,
        initial_probabilities: Array1<f64>,
    ) -> RegimeResult<Self> {
        let n = means.len();
        if n < 2 {
            return Err(RegimeError::InvalidInput(format!(
                "레짐 수는 2 이상이어야 합니다: {}",
                n
            )));
        }
        if variances.len() != n
            || transition_matrix.dim() != (n, n)
            || initial_probabilities.len() != n
        {
            return Err(RegimeError::InvalidInput(format!(
                "파라미터 차원 불일치: means {}, variances {}, transition {:?}, initial {}",
                n,
                variances.len(),
                transition_matrix.dim(),
                initial_probabilities.len()
            )));
        }
        if means.iter().any(|m| !m.is_finite()) {
            return Err(RegimeError::InvalidInput("평균에 유한하지 않은 값".to_string()));
        }
        if variances.iter().any(|v| !v.is_finite()) {
            return Err(RegimeError::InvalidInput("분산에 유한하지 않은 값".to_string()));
        }

        let variances = variances.mapv(|v| v.max(VARIANCE_FLOOR));

        let mut transition_matrix = transition_matrix;
        for (i, mut row) in transition_matrix.axis_iter_mut(Axis(0)).enumerate() {
            let normalized = normalize_probabilities(row.view())
                .map_err(|e| RegimeError::InvalidInput(format!("전이행렬 {}행: {}", i, e)))?;
            row.assign(&normalized);
        }

        let initial_probabilities = normalize_probabilities(initial_probabilities.view())
            .map_err(|e| RegimeError::InvalidInput(format!("초기 확률: {}", e)))?;

        Ok(Self {
            means,
            variances,
            transition_matrix,
            initial_probabilities,
        })
    }

    /// 균등 초기 확률 (1/n).
    pub fn uniform_initial(n: usize) -> Array1<f64> {
        Array1::from_elem(n, 1.0 / n as f64)
    }

    /// 레짐 수.
    pub fn n_regimes(&self) -> usize {
        self.means.len()
    }

    /// 레짐별 평균.
    pub fn means(&self) -> &Array1<f64> {
        &self.means
    }

    /// 레짐별 분산.
    pub fn variances(&self) -> &Array1<f64> {
        &self.variances
    }

    /// 전이행렬 (행 = 이전 레짐, 열 = 다음 레짐).
    pub fn transition_matrix(&self) -> &Array2<f64> {
        &self.transition_matrix
    }

    /// 초기 확률.
    pub fn initial_probabilities(&self) -> &Array1<f64> {
        &self.initial_probabilities
    }

    /// 평균 내림차순으로 레짐을 재배열합니다.
    ///
    /// 평균, 분산, 초기 확률과 전이행렬의 행/열이 같은 순열로 이동합니다.
    pub fn sorted_by_mean_desc(&self) -> Self {
        let n = self.n_regimes();
        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| self.means[b].total_cmp(&self.means[a]));

        let means = Array1::from_iter(order.iter().map(|&i| self.means[i]));
        let variances = Array1::from_iter(order.iter().map(|&i| self.variances[i]));
        let initial = Array1::from_iter(order.iter().map(|&i| self.initial_probabilities[i]));
        let transition =
            Array2::from_shape_fn((n, n), |(r, c)| self.transition_matrix[[order[r], order[c]]]);

        Self {
            means,
            variances,
            transition_matrix: transition,
            initial_probabilities: initial,
        }
    }

    /// 평균이 내림차순인지 확인합니다.
    pub fn is_ordered(&self) -> bool {
        self.means
            .iter()
            .zip(self.means.iter().skip(1))
            .all(|(a, b)| a >= b)
    }
}

/// 확률 벡터를 검증하고 합이 정확히 1이 되도록 재정규화합니다.
fn normalize_probabilities(values: ArrayView1<'_, f64>) -> Result<Array1<f64>, String> {
    if values.iter().any(|p| !p.is_finite() || *p < 0.0 || *p > 1.0 + PROBABILITY_TOLERANCE) {
        return Err(format!("[0, 1] 범위를 벗어난 확률: {}", values));
    }
    let total = values.sum();
    if (total - 1.0).abs() > PROBABILITY_TOLERANCE {
        return Err(format!("확률 합계가 1이 아닙니다: {}", total));
    }
    Ok(values.mapv(|p| (p / total).min(1.0)))
}

/// Hamilton 필터의 사후확률 궤적.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilteredTrajectory {
    /// 시점 × 레짐 사후확률 (각 행의 합 = 1)
    posteriors: Array2<f64>,
    /// 누적 로그우도
    log_likelihood: f64,
}

impl FilteredTrajectory {
    /// 새 궤적을 생성합니다.
    pub fn new(posteriors: Array2<f64>, log_likelihood: f64) -> Self {
        Self {
            posteriors,
            log_likelihood,
        }
    }

    /// 사후확률 행렬.
    pub fn posteriors(&self) -> &Array2<f64> {
        &self.posteriors
    }

    /// 누적 로그우도.
    pub fn log_likelihood(&self) -> f64 {
        self.log_likelihood
    }

    /// 시점 수.
    pub fn len(&self) -> usize {
        self.posteriors.nrows()
    }

    /// 빈 궤적 여부.
    pub fn is_empty(&self) -> bool {
        self.posteriors.nrows() == 0
    }

    /// 마지막 사후확률 (다음 온라인 단계의 사전확률).
    pub fn last(&self) -> Option<ArrayView1<'_, f64>> {
        self.len().checked_sub(1).map(|t| self.posteriors.row(t))
    }

    /// 각 시점의 최대 사후확률 슬롯.
    pub fn most_likely_slots(&self) -> Vec<usize> {
        self.posteriors
            .axis_iter(Axis(0))
            .map(|row| argmax(&row.to_vec()))
            .collect()
    }

    /// 각 시점의 레이블별 확률.
    pub fn regime_probabilities(&self) -> Vec<RegimeProbabilities> {
        self.posteriors
            .axis_iter(Axis(0))
            .map(|row| RegimeProbabilities::from_slots(&row.to_vec()))
            .collect()
    }

    /// 새 사후확률을 덧붙인 궤적을 반환합니다.
    pub fn extended(&self, posterior: ArrayView1<'_, f64>, log_increment: f64) -> RegimeResult<Self> {
        let mut posteriors = self.posteriors.clone();
        posteriors
            .push_row(posterior)
            .map_err(|e| RegimeError::InvalidInput(format!("사후확률 차원 불일치: {}", e)))?;
        Ok(Self {
            posteriors,
            log_likelihood: self.log_likelihood + log_increment,
        })
    }
}
