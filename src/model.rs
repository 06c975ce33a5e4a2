use ndarray::{Array1, ArrayView1, ArrayView2};
use crate::{
    data::SurvivalData,
    error::{CoxError, Result},
    optimization::{CoxOptimizer, OptimizationConfig, OptimizerType},
    trainer::FittedModel,
};

/// cox model w/ elastic net regularization
#[derive(Debug, Clone)]
pub struct CoxModel {
    coefficients: Option<Array1<f64>>, // fitted coefficients
    l1_penalty: f64,                   // lasso penalty
    l2_penalty: f64,                   // ridge penalty
    max_iterations: usize,             // optimization limit
    tolerance: f64,                    // convergence threshold
    optimizer_type: OptimizerType,
}

impl Default for CoxModel {
    fn default() -> Self {
        let defaults = OptimizationConfig::default();
        Self {
            coefficients: None,
            l1_penalty: defaults.l1_penalty,
            l2_penalty: defaults.l2_penalty,
            max_iterations: defaults.max_iterations,
            tolerance: defaults.tolerance,
            optimizer_type: defaults.optimizer_type,
        }
    }
}

impl CoxModel {
    /// new cox model w/ defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// add lasso penalty (L1) - encourages sparsity
    pub fn with_l1_penalty(mut self, penalty: f64) -> Self {
        self.l1_penalty = penalty.max(0.0);
        self
    }

    /// add ridge penalty (L2) - shrinks coefficients
    pub fn with_l2_penalty(mut self, penalty: f64) -> Self {
        self.l2_penalty = penalty.max(0.0);
        self
    }

    /// elastic net mixing: alpha=0 -> pure ridge, alpha=1 -> pure lasso
    pub fn with_elastic_net(mut self, alpha: f64, penalty: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&alpha) {
            return Err(CoxError::invalid_parameter("alpha", alpha));
        }
        let penalty = penalty.max(0.0);
        self.l1_penalty = alpha * penalty;         // lasso component
        self.l2_penalty = (1.0 - alpha) * penalty; // ridge component
        Ok(self)
    }

    /// max iterations before giving up
    pub fn with_max_iterations(mut self, max_iter: usize) -> Self {
        self.max_iterations = max_iter;
        self
    }

    /// how close is close enough for convergence
    pub fn with_tolerance(mut self, tol: f64) -> Self {
        self.tolerance = tol;
        self
    }

    pub fn with_optimizer(mut self, optimizer_type: OptimizerType) -> Self {
        self.optimizer_type = optimizer_type;
        self
    }

    /// fit the model to data - this does the actual work
    pub fn fit(&mut self, data: &SurvivalData) -> Result<&mut Self> {
        let config = OptimizationConfig {
            l1_penalty: self.l1_penalty,
            l2_penalty: self.l2_penalty,
            max_iterations: self.max_iterations,
            tolerance: self.tolerance,
            optimizer_type: self.optimizer_type,
        };

        let optimizer = CoxOptimizer::new(config);
        self.coefficients = Some(optimizer.optimize(data)?);

        Ok(self)
    }

    /// get the fitted coefficients (betas)
    pub fn coefficients(&self) -> Result<ArrayView1<'_, f64>> {
        match &self.coefficients {
            Some(coefs) => Ok(coefs.view()),
            None => Err(CoxError::ModelNotFitted),
        }
    }

    /// linear predictor X·beta - higher = higher hazard
    pub fn predict(&self, covariates: ArrayView2<f64>) -> Result<Array1<f64>> {
        let coefs = self.coefficients()?;

        if covariates.ncols() != coefs.len() {
            return Err(CoxError::invalid_dimensions(
                format!("feature count mismatch: expected {}, got {}",
                       coefs.len(), covariates.ncols())
            ));
        }

        Ok(covariates.dot(&coefs))
    }

    /// has this model been fit to data yet?
    pub fn is_fitted(&self) -> bool {
        self.coefficients.is_some()
    }

    /// what regularization penalties are we using?
    pub fn regularization_params(&self) -> (f64, f64) {
        (self.l1_penalty, self.l2_penalty) // (lasso, ridge)
    }
}

impl FittedModel for CoxModel {
    fn predict_risk(&self, covariates: ArrayView2<f64>) -> Result<Array1<f64>> {
        self.predict(covariates)
    }
}
