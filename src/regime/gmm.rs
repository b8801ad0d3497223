// =============================================================================
// Gaussian Mixture Model — diagonal covariance, seeded EM
// =============================================================================
//
// Batch-fitted clustering model for regime features. Fitting:
//
//   1. Initialise component means greedily: the first centre is drawn with a
//      seeded RNG, each further centre is the row farthest from all chosen
//      centres (deterministic given the seed).
//   2. Run expectation-maximisation with diagonal covariances until the
//      mean log-likelihood converges or `max_iter` is reached.
//
// The fixed seed makes `fit` reproducible: the same history always yields
// the same fitted model, and therefore the same predictions.

use crate::regime::features::{FeatureRow, FEATURE_DIM};

/// Variance floor preventing components from collapsing onto a point.
const VARIANCE_FLOOR: f64 = 1e-6;

/// Fit-time hyperparameters.
#[derive(Debug, Clone, Copy)]
pub struct GmmParams {
    pub n_components: usize,
    pub max_iter: usize,
    pub tolerance: f64,
    pub seed: u64,
}

impl Default for GmmParams {
    fn default() -> Self {
        Self {
            n_components: 4,
            max_iter: 100,
            tolerance: 1e-4,
            seed: 42,
        }
    }
}

/// The fitting procedure. Stateless apart from its parameters; every call
/// to [`GaussianMixture::fit`] produces a fresh immutable [`FittedGmm`].
#[derive(Debug, Clone, Copy, Default)]
pub struct GaussianMixture {
    pub params: GmmParams,
}

/// An immutable fitted mixture: component weights, means and per-dimension
/// variances.
#[derive(Debug, Clone)]
pub struct FittedGmm {
    weights: Vec<f64>,
    means: Vec<FeatureRow>,
    variances: Vec<FeatureRow>,
}

impl GaussianMixture {
    pub fn new(params: GmmParams) -> Self {
        Self { params }
    }

    /// Fit the mixture over the given rows.
    ///
    /// Returns `None` when there are fewer rows than components or a
    /// degenerate likelihood is encountered.
    pub fn fit(&self, rows: &[FeatureRow]) -> Option<FittedGmm> {
        let k = self.params.n_components;
        if k == 0 || rows.len() < k {
            return None;
        }

        let n = rows.len();
        let mut means = self.initial_means(rows);

        // Shared initial variance: the global per-dimension variance.
        let global_variance = global_variance(rows);
        let mut variances = vec![global_variance; k];
        let mut weights = vec![1.0 / k as f64; k];

        let mut responsibilities = vec![vec![0.0_f64; k]; n];
        let mut prev_log_likelihood = f64::NEG_INFINITY;

        for _iter in 0..self.params.max_iter {
            // --- E-step: responsibilities via log-sum-exp ---------------------
            let mut log_likelihood = 0.0;
            for (i, row) in rows.iter().enumerate() {
                let mut log_terms = Vec::with_capacity(k);
                for c in 0..k {
                    let term = weights[c].max(f64::MIN_POSITIVE).ln()
                        + diag_log_pdf(row, &means[c], &variances[c]);
                    log_terms.push(term);
                }
                let log_norm = log_sum_exp(&log_terms);
                if !log_norm.is_finite() {
                    return None;
                }
                log_likelihood += log_norm;
                for c in 0..k {
                    responsibilities[i][c] = (log_terms[c] - log_norm).exp();
                }
            }
            log_likelihood /= n as f64;

            // --- M-step: weights, means, variances ----------------------------
            for c in 0..k {
                let resp_sum: f64 = responsibilities.iter().map(|r| r[c]).sum();
                let resp_sum = resp_sum.max(1e-10);
                weights[c] = resp_sum / n as f64;

                let mut mean = [0.0; FEATURE_DIM];
                for (i, row) in rows.iter().enumerate() {
                    for d in 0..FEATURE_DIM {
                        mean[d] += responsibilities[i][c] * row[d];
                    }
                }
                for m in &mut mean {
                    *m /= resp_sum;
                }

                let mut variance = [0.0; FEATURE_DIM];
                for (i, row) in rows.iter().enumerate() {
                    for d in 0..FEATURE_DIM {
                        variance[d] += responsibilities[i][c] * (row[d] - mean[d]).powi(2);
                    }
                }
                for v in &mut variance {
                    *v = (*v / resp_sum).max(VARIANCE_FLOOR);
                }

                means[c] = mean;
                variances[c] = variance;
            }

            if (log_likelihood - prev_log_likelihood).abs() < self.params.tolerance {
                break;
            }
            prev_log_likelihood = log_likelihood;
        }

        Some(FittedGmm {
            weights,
            means,
            variances,
        })
    }

    /// Greedy farthest-point initialisation with a seeded first pick.
    fn initial_means(&self, rows: &[FeatureRow]) -> Vec<FeatureRow> {
        let k = self.params.n_components;
        let mut rng = fastrand::Rng::with_seed(self.params.seed);

        let mut means: Vec<FeatureRow> = Vec::with_capacity(k);
        means.push(rows[rng.usize(..rows.len())]);

        while means.len() < k {
            let farthest = rows
                .iter()
                .enumerate()
                .map(|(i, row)| {
                    let nearest = means
                        .iter()
                        .map(|m| squared_distance(row, m))
                        .fold(f64::INFINITY, f64::min);
                    (i, nearest)
                })
                .max_by(|a, b| a.1.total_cmp(&b.1))
                .map(|(i, _)| i)
                .unwrap_or(0);
            means.push(rows[farthest]);
        }

        means
    }
}

impl FittedGmm {
    pub fn n_components(&self) -> usize {
        self.weights.len()
    }

    /// Mean vector of one component.
    pub fn component_mean(&self, component: usize) -> &FeatureRow {
        &self.means[component]
    }

    /// Posterior probability of each component for `row`, summing to 1.
    pub fn responsibilities(&self, row: &FeatureRow) -> Vec<f64> {
        let log_terms: Vec<f64> = (0..self.n_components())
            .map(|c| {
                self.weights[c].max(f64::MIN_POSITIVE).ln()
                    + diag_log_pdf(row, &self.means[c], &self.variances[c])
            })
            .collect();
        let log_norm = log_sum_exp(&log_terms);
        log_terms.iter().map(|t| (t - log_norm).exp()).collect()
    }

    /// Most probable component and its posterior probability.
    pub fn predict(&self, row: &FeatureRow) -> (usize, f64) {
        let resp = self.responsibilities(row);
        resp.iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(c, &p)| (c, p))
            .unwrap_or((0, 0.0))
    }

    /// Hard assignment of every row to its most probable component.
    pub fn assign(&self, rows: &[FeatureRow]) -> Vec<usize> {
        rows.iter().map(|r| self.predict(r).0).collect()
    }
}

// =============================================================================
// Numeric helpers
// =============================================================================

fn diag_log_pdf(row: &FeatureRow, mean: &FeatureRow, variance: &FeatureRow) -> f64 {
    let mut log_pdf = 0.0;
    for d in 0..FEATURE_DIM {
        let var = variance[d].max(VARIANCE_FLOOR);
        let diff = row[d] - mean[d];
        log_pdf += -0.5 * (std::f64::consts::TAU * var).ln() - diff * diff / (2.0 * var);
    }
    log_pdf
}

fn log_sum_exp(terms: &[f64]) -> f64 {
    let max = terms.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return max;
    }
    max + terms.iter().map(|t| (t - max).exp()).sum::<f64>().ln()
}

fn squared_distance(a: &FeatureRow, b: &FeatureRow) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
}

fn global_variance(rows: &[FeatureRow]) -> FeatureRow {
    let n = rows.len() as f64;
    let mut mean = [0.0; FEATURE_DIM];
    for row in rows {
        for d in 0..FEATURE_DIM {
            mean[d] += row[d];
        }
    }
    for m in &mut mean {
        *m /= n;
    }

    let mut variance = [0.0; FEATURE_DIM];
    for row in rows {
        for d in 0..FEATURE_DIM {
            variance[d] += (row[d] - mean[d]).powi(2);
        }
    }
    for v in &mut variance {
        *v = (*v / n).max(VARIANCE_FLOOR);
    }
    variance
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    /// Two well-separated blobs along the first dimension, deterministic.
    fn two_blobs(per_blob: usize) -> Vec<FeatureRow> {
        let mut rows = Vec::with_capacity(per_blob * 2);
        for i in 0..per_blob {
            let jitter = (i as f64 * 0.7).sin() * 0.1;
            let mut low = [0.0; FEATURE_DIM];
            low[0] = -5.0 + jitter;
            low[1] = jitter;
            rows.push(low);

            let mut high = [0.0; FEATURE_DIM];
            high[0] = 5.0 - jitter;
            high[1] = -jitter;
            rows.push(high);
        }
        rows
    }

    fn params(k: usize) -> GmmParams {
        GmmParams {
            n_components: k,
            ..GmmParams::default()
        }
    }

    #[test]
    fn fit_requires_enough_rows() {
        let gmm = GaussianMixture::new(params(4));
        let rows = two_blobs(1);
        assert!(gmm.fit(&rows[..2]).is_none());
    }

    #[test]
    fn fit_separates_two_blobs() {
        let gmm = GaussianMixture::new(params(2));
        let rows = two_blobs(50);
        let fitted = gmm.fit(&rows).unwrap();

        let mut low = [0.0; FEATURE_DIM];
        low[0] = -5.0;
        let mut high = [0.0; FEATURE_DIM];
        high[0] = 5.0;

        let (c_low, p_low) = fitted.predict(&low);
        let (c_high, p_high) = fitted.predict(&high);
        assert_ne!(c_low, c_high, "blobs should land in different components");
        assert!(p_low > 0.9);
        assert!(p_high > 0.9);
    }

    #[test]
    fn fit_is_deterministic_for_fixed_seed() {
        let gmm = GaussianMixture::new(params(3));
        let rows = two_blobs(40);
        let a = gmm.fit(&rows).unwrap();
        let b = gmm.fit(&rows).unwrap();

        let mut probe = [0.3; FEATURE_DIM];
        probe[0] = 1.5;
        assert_eq!(a.predict(&probe), b.predict(&probe));
        for c in 0..a.n_components() {
            assert_eq!(a.component_mean(c), b.component_mean(c));
        }
    }

    #[test]
    fn responsibilities_sum_to_one() {
        let gmm = GaussianMixture::new(params(3));
        let rows = two_blobs(30);
        let fitted = gmm.fit(&rows).unwrap();

        let probe = [0.7; FEATURE_DIM];
        let resp = fitted.responsibilities(&probe);
        let sum: f64 = resp.iter().sum();
        assert!((sum - 1.0).abs() < 1e-9, "responsibilities sum {sum}");
        assert!(resp.iter().all(|p| (0.0..=1.0).contains(p)));
    }

    #[test]
    fn assign_covers_all_rows() {
        let gmm = GaussianMixture::new(params(2));
        let rows = two_blobs(20);
        let fitted = gmm.fit(&rows).unwrap();
        let assignments = fitted.assign(&rows);
        assert_eq!(assignments.len(), rows.len());
        assert!(assignments.iter().all(|&c| c < 2));
    }

    #[test]
    fn log_sum_exp_stability() {
        // Large negative values must not underflow to -inf incorrectly.
        let terms = [-1000.0, -1000.5, -999.5];
        let result = log_sum_exp(&terms);
        assert!(result.is_finite());
        assert!(result > -1000.0 && result < -998.0);
    }
}
