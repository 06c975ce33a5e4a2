use ndarray::{Array1, Array2, ArrayView1};
use crate::{
    data::SurvivalData,
    error::{CoxError, Result},
};

/// max step-halvings before a newton step is declared hopeless
const MAX_STEP_HALVINGS: usize = 30;

/// Optimization algorithm types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimizerType {
    /// full newton steps, only valid without an L1 component
    NewtonRaphson,
    /// cyclic coordinate descent w/ soft thresholding
    CoordinateDescent,
}

/// Configuration for Cox model optimization
#[derive(Debug, Clone)]
pub struct OptimizationConfig {
    pub l1_penalty: f64,
    pub l2_penalty: f64,
    pub max_iterations: usize,
    pub tolerance: f64,
    pub optimizer_type: OptimizerType,
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self {
            l1_penalty: 0.0,
            l2_penalty: 0.0,
            max_iterations: 100,
            tolerance: 1e-8,
            optimizer_type: OptimizerType::NewtonRaphson,
        }
    }
}

/// Cox proportional hazards optimizer with elastic net regularization.
///
/// Maximizes `loglik(beta) - 0.5 * l2 * |beta|^2 - l1 * |beta|_1` where loglik is the
/// Breslow partial likelihood. Every exponent is shifted by the risk-set maximum, so
/// perfectly separable data makes coefficients large but never overflows.
pub struct CoxOptimizer {
    config: OptimizationConfig,
}

impl CoxOptimizer {
    pub fn new(config: OptimizationConfig) -> Self {
        Self { config }
    }

    /// Optimize Cox model using configured optimizer
    pub fn optimize(&self, data: &SurvivalData) -> Result<Array1<f64>> {
        if self.config.l1_penalty < 0.0 || self.config.l2_penalty < 0.0 {
            return Err(CoxError::invalid_parameter(
                "penalty",
                format!("l1={}, l2={}", self.config.l1_penalty, self.config.l2_penalty),
            ));
        }

        let mut beta = Array1::zeros(data.n_features());

        // L1 needs soft thresholding, which newton can't do
        if self.config.l1_penalty > 0.0 || self.config.optimizer_type == OptimizerType::CoordinateDescent {
            self.coordinate_descent_optimize(data, &mut beta)?;
        } else {
            self.newton_raphson_optimize(data, &mut beta)?;
        }

        if beta.iter().any(|b| !b.is_finite()) {
            return Err(CoxError::fit_failed("coefficients became non-finite"));
        }

        Ok(beta)
    }

    /// penalized log partial likelihood
    pub fn penalized_log_likelihood(&self, data: &SurvivalData, beta: &Array1<f64>) -> f64 {
        let eta = data.covariates().dot(beta);
        log_partial_likelihood(data, eta.view()) - self.penalty(beta)
    }

    fn penalty(&self, beta: &Array1<f64>) -> f64 {
        0.5 * self.config.l2_penalty * beta.dot(beta)
            + self.config.l1_penalty * beta.mapv(f64::abs).sum()
    }

    /// Newton-Raphson w/ step halving (ridge or unpenalized)
    fn newton_raphson_optimize(&self, data: &SurvivalData, beta: &mut Array1<f64>) -> Result<()> {
        let n_features = beta.len();
        let mut current = self.penalized_log_likelihood(data, beta);

        for iteration in 0..self.config.max_iterations {
            let (_, gradient, information) = likelihood_derivatives(data, beta);

            // ridge terms: gradient - l2*beta, information + l2*I
            let penalized_gradient = &gradient - &(self.config.l2_penalty * &*beta);
            let mut penalized_information = information;
            for i in 0..n_features {
                penalized_information[[i, i]] += self.config.l2_penalty;
            }

            let step = solve_linear_system(&penalized_information, &penalized_gradient)
                .map_err(|e| CoxError::fit_failed(format!("newton step at iteration {}: {}", iteration, e)))?;

            let mut scale = 1.0;
            let mut accepted = None;
            for _ in 0..MAX_STEP_HALVINGS {
                let candidate = &*beta + &(scale * &step);
                let value = self.penalized_log_likelihood(data, &candidate);
                if value.is_finite() && value >= current - 1e-12 * current.abs().max(1.0) {
                    accepted = Some((candidate, value));
                    break;
                }
                scale *= 0.5;
            }

            let Some((candidate, value)) = accepted else {
                return Err(CoxError::fit_failed(
                    format!("no ascent direction at iteration {}", iteration)
                ));
            };

            let max_change = (&candidate - &*beta).mapv(f64::abs).fold(0.0_f64, |a, &b| a.max(b));
            let improvement = value - current;
            *beta = candidate;
            current = value;

            if improvement.abs() < self.config.tolerance || max_change < self.config.tolerance {
                return Ok(());
            }
        }

        Err(CoxError::fit_failed(format!(
            "Newton-Raphson failed to converge in {} iterations",
            self.config.max_iterations
        )))
    }

    /// Coordinate descent optimization (for elastic net)
    fn coordinate_descent_optimize(&self, data: &SurvivalData, beta: &mut Array1<f64>) -> Result<()> {
        let covariates = data.covariates();
        let mut eta = covariates.dot(&*beta);
        let mut current = log_partial_likelihood(data, eta.view()) - self.penalty(beta);

        for _ in 0..self.config.max_iterations {
            let mut max_change = 0.0_f64;

            for j in 0..beta.len() {
                let column = covariates.column(j);
                let (gradient, curvature) = coordinate_derivatives(data, eta.view(), column);
                let denominator = curvature + self.config.l2_penalty;
                if denominator <= 0.0 {
                    continue; // flat coordinate, nothing to learn
                }

                let old = beta[j];
                let proposal = soft_threshold(curvature * old + gradient, self.config.l1_penalty) / denominator;

                // damp the coordinate step until the objective doesn't drop
                let mut delta = proposal - old;
                let mut accepted = false;
                for _ in 0..MAX_STEP_HALVINGS {
                    beta[j] = old + delta;
                    let trial_eta = &eta + &(delta * &column);
                    let value = log_partial_likelihood(data, trial_eta.view()) - self.penalty(beta);
                    if value.is_finite() && value >= current - 1e-12 * current.abs().max(1.0) {
                        eta = trial_eta;
                        current = value;
                        accepted = true;
                        break;
                    }
                    delta *= 0.5;
                }

                if !accepted {
                    beta[j] = old;
                    continue;
                }
                max_change = max_change.max(delta.abs());
            }

            if max_change < self.config.tolerance {
                return Ok(());
            }
        }

        Err(CoxError::fit_failed(format!(
            "coordinate descent failed to converge in {} iterations",
            self.config.max_iterations
        )))
    }
}

/// Soft thresholding operator for L1 regularization
pub(crate) fn soft_threshold(x: f64, lambda: f64) -> f64 {
    if x > lambda {
        x - lambda
    } else if x < -lambda {
        x + lambda
    } else {
        0.0
    }
}

/// shifted exp weights over a risk set: (max eta, weights, sum of weights)
fn risk_set_weights(at_risk: &[usize], eta: ArrayView1<f64>) -> (f64, Vec<f64>, f64) {
    let max_eta = at_risk.iter().map(|&i| eta[i]).fold(f64::NEG_INFINITY, f64::max);
    let weights: Vec<f64> = at_risk.iter().map(|&i| (eta[i] - max_eta).exp()).collect();
    let total = weights.iter().sum();
    (max_eta, weights, total)
}

/// Breslow log partial likelihood at linear predictor `eta`
pub fn log_partial_likelihood(data: &SurvivalData, eta: ArrayView1<f64>) -> f64 {
    data.risk_sets()
        .iter()
        .map(|rs| {
            let (max_eta, _, total) = risk_set_weights(&rs.at_risk, eta);
            let log_sum = max_eta + total.ln();
            rs.events.iter().map(|&i| eta[i] - log_sum).sum::<f64>()
        })
        .sum()
}

/// loglik, score vector and observed information matrix (negative hessian)
fn likelihood_derivatives(data: &SurvivalData, beta: &Array1<f64>) -> (f64, Array1<f64>, Array2<f64>) {
    let covariates = data.covariates();
    let n_features = beta.len();
    let eta = covariates.dot(beta);

    let mut loglik = 0.0;
    let mut gradient = Array1::zeros(n_features);
    let mut information = Array2::zeros((n_features, n_features));

    for rs in data.risk_sets() {
        let (max_eta, weights, total) = risk_set_weights(&rs.at_risk, eta.view());

        let mut mean = Array1::<f64>::zeros(n_features);
        let mut second = Array2::<f64>::zeros((n_features, n_features));
        for (&i, &w) in rs.at_risk.iter().zip(weights.iter()) {
            let row = covariates.row(i);
            mean.scaled_add(w, &row);
            for a in 0..n_features {
                for b in a..n_features {
                    second[[a, b]] += w * row[a] * row[b];
                }
            }
        }
        mean /= total;

        let d = rs.events.len() as f64;
        let log_sum = max_eta + total.ln();
        for &i in &rs.events {
            loglik += eta[i] - log_sum;
            gradient += &covariates.row(i);
        }
        gradient.scaled_add(-d, &mean);

        for a in 0..n_features {
            for b in a..n_features {
                let variance = second[[a, b]] / total - mean[a] * mean[b];
                information[[a, b]] += d * variance;
                if a != b {
                    information[[b, a]] += d * variance;
                }
            }
        }
    }

    (loglik, gradient, information)
}

/// first derivative and curvature (negative second derivative) along one coordinate
fn coordinate_derivatives(data: &SurvivalData, eta: ArrayView1<f64>, column: ArrayView1<f64>) -> (f64, f64) {
    let mut gradient = 0.0;
    let mut curvature = 0.0;

    for rs in data.risk_sets() {
        let (_, weights, total) = risk_set_weights(&rs.at_risk, eta);

        let mut first = 0.0;
        let mut second = 0.0;
        for (&i, &w) in rs.at_risk.iter().zip(weights.iter()) {
            first += w * column[i];
            second += w * column[i] * column[i];
        }
        let mean = first / total;

        let d = rs.events.len() as f64;
        gradient += rs.events.iter().map(|&i| column[i]).sum::<f64>() - d * mean;
        curvature += d * (second / total - mean * mean);
    }

    (gradient, curvature.max(0.0))
}

/// Solve linear system Ax = b via gaussian elimination w/ partial pivoting
fn solve_linear_system(a: &Array2<f64>, b: &Array1<f64>) -> Result<Array1<f64>> {
    let n = a.nrows();
    if n != a.ncols() || n != b.len() {
        return Err(CoxError::invalid_dimensions("Matrix dimensions mismatch"));
    }

    let mut a = a.clone();
    let mut b = b.clone();
    let scale = a.iter().fold(0.0_f64, |m, &x| m.max(x.abs())).max(1.0);

    for i in 0..n {
        let pivot = (i..n)
            .max_by(|&r, &s| a[[r, i]].abs().total_cmp(&a[[s, i]].abs()))
            .unwrap_or(i);

        if a[[pivot, i]].abs() < 1e-12 * scale {
            return Err(CoxError::numerical_error("Matrix is singular"));
        }

        if pivot != i {
            for j in 0..n {
                a.swap([i, j], [pivot, j]);
            }
            b.swap(i, pivot);
        }

        for k in i + 1..n {
            let factor = a[[k, i]] / a[[i, i]];
            for j in i..n {
                a[[k, j]] -= factor * a[[i, j]];
            }
            b[k] -= factor * b[i];
        }
    }

    let mut x = Array1::zeros(n);
    for i in (0..n).rev() {
        let tail: f64 = (i + 1..n).map(|j| a[[i, j]] * x[j]).sum();
        x[i] = (b[i] - tail) / a[[i, i]];
    }

    if x.iter().any(|v: &f64| !v.is_finite()) {
        return Err(CoxError::numerical_error("non-finite solution"));
    }

    Ok(x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};
    use approx::assert_relative_eq;

    fn create_test_data() -> SurvivalData {
        let times = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let events = vec![true, true, true, true, true];
        let covariates = Array2::from_shape_vec((5, 2), vec![
            1.0, 0.0,
            0.0, 1.0,
            1.0, 1.0,
            -1.0, 0.0,
            0.0, -1.0,
        ]).unwrap();

        SurvivalData::new(times, events, covariates).unwrap()
    }

    fn separable_data() -> SurvivalData {
        let times: Vec<f64> = (1..=10).map(|t| t as f64).collect();
        let events = vec![true; 10];
        let covariates = Array2::from_shape_fn((10, 1), |(i, _)| -(i as f64));
        SurvivalData::new(times, events, covariates).unwrap()
    }

    #[test]
    fn test_soft_threshold() {
        assert_relative_eq!(soft_threshold(2.0, 1.0), 1.0, epsilon = 1e-10);
        assert_relative_eq!(soft_threshold(-2.0, 1.0), -1.0, epsilon = 1e-10);
        assert_relative_eq!(soft_threshold(0.5, 1.0), 0.0, epsilon = 1e-10);
    }

    #[test]
    fn test_log_likelihood_at_zero() {
        // with beta = 0 every risk set contributes -ln(|R|)
        let data = create_test_data();
        let eta = Array1::zeros(5);
        let expected = -(5.0_f64.ln() + 4.0_f64.ln() + 3.0_f64.ln() + 2.0_f64.ln());
        assert_relative_eq!(log_partial_likelihood(&data, eta.view()), expected, epsilon = 1e-12);
    }

    #[test]
    fn test_newton_ridge_reaches_stationary_point() {
        let data = create_test_data();
        let config = OptimizationConfig { l2_penalty: 0.1, ..Default::default() };
        let beta = CoxOptimizer::new(config).optimize(&data).unwrap();

        let (_, gradient, _) = likelihood_derivatives(&data, &beta);
        let penalized = &gradient - &(0.1 * &beta);
        assert!(penalized.iter().all(|g| g.abs() < 1e-5));
    }

    #[test]
    fn test_coordinate_descent_matches_newton_for_ridge() {
        let data = create_test_data();
        let newton = CoxOptimizer::new(OptimizationConfig { l2_penalty: 0.5, ..Default::default() })
            .optimize(&data)
            .unwrap();
        let cd = CoxOptimizer::new(OptimizationConfig {
            l2_penalty: 0.5,
            max_iterations: 500,
            optimizer_type: OptimizerType::CoordinateDescent,
            ..Default::default()
        })
        .optimize(&data)
        .unwrap();

        for (a, b) in newton.iter().zip(cd.iter()) {
            assert_relative_eq!(*a, *b, epsilon = 1e-4);
        }
    }

    #[test]
    fn test_lasso_zeros_out_with_big_penalty() {
        let data = create_test_data();
        let config = OptimizationConfig { l1_penalty: 50.0, ..Default::default() };
        let beta = CoxOptimizer::new(config).optimize(&data).unwrap();
        assert!(beta.iter().all(|&b| b == 0.0));
    }

    #[test]
    fn test_separable_data_with_ridge_stays_finite() {
        let data = separable_data();
        let config = OptimizationConfig { l2_penalty: 1e-3, ..Default::default() };
        let beta = CoxOptimizer::new(config).optimize(&data).unwrap();

        // covariate decreases with time, so the hazard coefficient is positive
        assert!(beta[0] > 0.0 && beta[0].is_finite());
    }

    #[test]
    fn test_negative_penalty_rejected() {
        let data = create_test_data();
        let config = OptimizationConfig { l2_penalty: -1.0, ..Default::default() };
        assert!(CoxOptimizer::new(config).optimize(&data).is_err());
    }

    #[test]
    fn test_solve_linear_system() {
        let a = array![[4.0, 1.0], [1.0, 3.0]];
        let b = array![1.0, 2.0];
        let x = solve_linear_system(&a, &b).unwrap();
        assert_relative_eq!(x[0], 1.0 / 11.0, epsilon = 1e-12);
        assert_relative_eq!(x[1], 7.0 / 11.0, epsilon = 1e-12);

        let singular = array![[1.0, 2.0], [2.0, 4.0]];
        assert!(solve_linear_system(&singular, &b).is_err());
    }
}
