//! 파라미터 초기화기.
//!
//! 1차원 합성 시계열에 k-means를 적용해 레짐별 평균/분산의 시작값을 구합니다.
//! 중심점은 분위수에서 시작하므로 같은 입력에는 항상 같은 결과가 나옵니다.

use ndarray::{Array1, Array2};

use regime_core::{ModelParameters, RegimeError, RegimeResult, VARIANCE_FLOOR};

/// 초기 전이행렬의 대각 원소 (레짐 지속 확률).
pub const INITIAL_PERSISTENCE: f64 = 0.8;

/// k-means 결과.
#[derive(Debug, Clone, PartialEq)]
pub struct KMeansResult {
    /// 클러스터 중심
    pub centers: Vec<f64>,
    /// 관측치별 클러스터 레이블
    pub labels: Vec<usize>,
    /// 수행한 반복 수
    pub iterations: usize,
}

/// 1차원 Lloyd k-means.
///
/// 중심점은 정렬된 데이터의 (i + 0.5) / k 분위수로 초기화하며,
/// 거리가 같으면 낮은 인덱스의 클러스터에 배정합니다.
pub fn kmeans_1d(observations: &[f64], k: usize, max_iterations: usize) -> KMeansResult {
    let n = observations.len();
    if n == 0 || k == 0 {
        return KMeansResult {
            centers: Vec::new(),
            labels: Vec::new(),
            iterations: 0,
        };
    }

    let mut sorted = observations.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mut centers: Vec<f64> = (0..k)
        .map(|i| {
            let idx = (((i as f64 + 0.5) / k as f64) * n as f64) as usize;
            sorted[idx.min(n - 1)]
        })
        .collect();

    let mut labels = vec![usize::MAX; n];
    let mut iterations = 0;

    while iterations < max_iterations {
        iterations += 1;

        let mut changed = false;
        for (label, &x) in labels.iter_mut().zip(observations) {
            let nearest = nearest_center(&centers, x);
            if *label != nearest {
                *label = nearest;
                changed = true;
            }
        }
        if !changed {
            break;
        }

        let mut sums = vec![0.0; k];
        let mut counts = vec![0usize; k];
        for (&label, &x) in labels.iter().zip(observations) {
            sums[label] += x;
            counts[label] += 1;
        }
        for j in 0..k {
            if counts[j] > 0 {
                centers[j] = sums[j] / counts[j] as f64;
            }
        }
    }

    KMeansResult {
        centers,
        labels,
        iterations,
    }
}

fn nearest_center(centers: &[f64], x: f64) -> usize {
    let mut best = 0;
    let mut best_dist = f64::INFINITY;
    for (j, c) in centers.iter().enumerate() {
        let dist = (x - c).abs();
        if dist < best_dist {
            best = j;
            best_dist = dist;
        }
    }
    best
}

/// 모집단 평균/분산 (분산은 하한 적용).
fn mean_variance(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.max(VARIANCE_FLOOR))
}

/// 클러스터링 기반 파라미터 초기화기.
#[derive(Debug, Clone)]
pub struct ParameterInitializer {
    n_regimes: usize,
    max_iterations: usize,
    persistence: f64,
}

impl ParameterInitializer {
    /// 새 초기화기를 생성합니다.
    pub fn new(n_regimes: usize) -> Self {
        Self {
            n_regimes,
            max_iterations: 100,
            persistence: INITIAL_PERSISTENCE,
        }
    }

    /// 초기 파라미터를 계산합니다.
    ///
    /// 빈 클러스터는 전체 평균/분산으로 대체하며, 결과는 평균 내림차순으로 정렬됩니다.
    pub fn initialize(&self, observations: &[f64]) -> RegimeResult<ModelParameters> {
        if observations.is_empty() {
            return Err(RegimeError::InsufficientData {
                required: 1,
                provided: 0,
            });
        }
        if observations.iter().any(|x| !x.is_finite()) {
            return Err(RegimeError::InvalidInput(
                "합성 관측치에 유한하지 않은 값".to_string(),
            ));
        }

        let n = self.n_regimes;
        let clusters = kmeans_1d(observations, n, self.max_iterations);
        let (global_mean, global_variance) = mean_variance(observations);

        let mut means = Array1::zeros(n);
        let mut variances = Array1::zeros(n);
        for j in 0..n {
            let members: Vec<f64> = clusters
                .labels
                .iter()
                .zip(observations)
                .filter(|(&label, _)| label == j)
                .map(|(_, &x)| x)
                .collect();

            let (mean, variance) = if members.is_empty() {
                (global_mean, global_variance)
            } else {
                mean_variance(&members)
            };
            means[j] = mean;
            variances[j] = variance;
        }

        let params = ModelParameters::new(
            means,
            variances,
            persistence_matrix(n, self.persistence),
            ModelParameters::uniform_initial(n),
        )?;
        Ok(params.sorted_by_mean_desc())
    }
}

/// 대각 원소가 `persistence`이고 나머지가 균등한 전이행렬.
pub fn persistence_matrix(n: usize, persistence: f64) -> Array2<f64> {
    let off_diagonal = if n > 1 {
        (1.0 - persistence) / (n - 1) as f64
    } else {
        0.0
    };
    Array2::from_shape_fn((n, n), |(i, j)| if i == j { persistence } else { off_diagonal })
}
