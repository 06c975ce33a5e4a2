use ndarray::{Array1, ArrayView2};
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use crate::{
    data::SurvivalData,
    error::{CoxError, Result},
    metrics::HarrellConcordance,
    model::CoxModel,
    search::{self, Folds, SearchConfig, SearchSummary},
};

/// what the validator needs from a trained model
pub trait FittedModel {
    /// risk score per row, higher = higher hazard. must not mutate the model.
    fn predict_risk(&self, covariates: ArrayView2<f64>) -> Result<Array1<f64>>;
}

/// selected hyperparameters - a single penalty coefficient on the natural scale
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Hyperparameters {
    pub penalty: f64,
}

impl Hyperparameters {
    pub fn from_log10(log10_penalty: f64) -> Self {
        Self { penalty: 10f64.powf(log10_penalty) }
    }
}

/// model-agnostic training contract: pick hyperparameters, then fit with them.
///
/// Both calls must be deterministic for a given rng state and data. The validator
/// shares one trainer across worker threads, hence `Sync`.
pub trait ModelTrainer: Sync {
    type Model: FittedModel;

    fn select_hyperparameters(
        &self,
        data: &SurvivalData,
        search: &SearchConfig,
        rng: &mut StdRng,
    ) -> Result<(Hyperparameters, SearchSummary)>;

    fn fit(&self, data: &SurvivalData, hyperparameters: &Hyperparameters) -> Result<Self::Model>;
}

/// penalized cox trainer: penalty split into lasso/ridge parts by `l1_ratio`
#[derive(Debug, Clone)]
pub struct CoxTrainer {
    l1_ratio: f64,
    max_iterations: usize,
    tolerance: f64,
}

impl Default for CoxTrainer {
    fn default() -> Self {
        Self {
            l1_ratio: 0.0, // pure ridge
            max_iterations: 100,
            tolerance: 1e-8,
        }
    }
}

impl CoxTrainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// 0 = ridge, 1 = lasso
    pub fn with_l1_ratio(mut self, l1_ratio: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&l1_ratio) {
            return Err(CoxError::invalid_parameter("l1_ratio", l1_ratio));
        }
        self.l1_ratio = l1_ratio;
        Ok(self)
    }

    pub fn with_max_iterations(mut self, max_iter: usize) -> Self {
        self.max_iterations = max_iter;
        self
    }

    pub fn with_tolerance(mut self, tol: f64) -> Self {
        self.tolerance = tol;
        self
    }
}

impl ModelTrainer for CoxTrainer {
    type Model = CoxModel;

    fn select_hyperparameters(
        &self,
        data: &SurvivalData,
        search: &SearchConfig,
        rng: &mut StdRng,
    ) -> Result<(Hyperparameters, SearchSummary)> {
        search.validate()?;
        let folds = Folds::shuffled(data.n_samples(), search.fold_count, rng)?;

        let summary = search::maximize(search, rng, |log10_penalty| {
            let hyperparameters = Hyperparameters::from_log10(log10_penalty);
            search::cross_validated_score(data, &folds, &HarrellConcordance, |train| {
                self.fit(train, &hyperparameters)
            })
        })?;

        Ok((Hyperparameters::from_log10(summary.best_log10_penalty), summary))
    }

    fn fit(&self, data: &SurvivalData, hyperparameters: &Hyperparameters) -> Result<CoxModel> {
        if !hyperparameters.penalty.is_finite() || hyperparameters.penalty < 0.0 {
            return Err(CoxError::invalid_parameter("penalty", hyperparameters.penalty));
        }

        let mut model = CoxModel::new()
            .with_elastic_net(self.l1_ratio, hyperparameters.penalty)?
            .with_max_iterations(self.max_iterations)
            .with_tolerance(self.tolerance);
        model.fit(data)?;
        Ok(model)
    }
}
