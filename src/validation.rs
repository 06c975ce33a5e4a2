//! Bootstrap optimism correction for a concordance index.
//!
//! The run goes apparent fit -> bootstrap loop -> aggregation. Each draw re-runs the
//! full hyperparameter search on its resample, fits, and scores the same model twice:
//! once on the resample it was trained on and once on the original cohort. The gap
//! between those two scores is that draw's optimism.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, info, warn};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{
    aggregate::{self, ConfidenceInterval},
    data::SurvivalData,
    error::{CoxError, Result},
    metrics::{ConcordanceScorer, HarrellConcordance},
    resample::{BootstrapDraw, stream_seed},
    search::{SearchConfig, SearchSummary},
    trainer::{FittedModel, Hyperparameters, ModelTrainer},
};

/// what to do when a draw's concordance has no comparable pairs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UndefinedScorePolicy {
    /// fail the whole run, naming the draw
    #[default]
    Abort,
    /// drop the draw from aggregation and record it in `skipped_draws`
    Skip,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// number of bootstrap draws (B)
    pub n_bootstraps: usize,
    pub seed: u64,
    /// fan draws out over the rayon pool
    pub parallel: bool,
    pub undefined_score: UndefinedScorePolicy,
    /// keep each draw's row indices in the result
    pub record_indices: bool,
    pub search: SearchConfig,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            n_bootstraps: 200,
            seed: 42,
            parallel: false,
            undefined_score: UndefinedScorePolicy::Abort,
            record_indices: false,
            search: SearchConfig::default(),
        }
    }
}

impl ValidationConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// parse from toml; missing keys fall back to defaults
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.n_bootstraps == 0 {
            return Err(CoxError::invalid_parameter("n_bootstraps", self.n_bootstraps));
        }
        self.search.validate()
    }

    pub fn with_bootstraps(mut self, n_bootstraps: usize) -> Self {
        self.n_bootstraps = n_bootstraps;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_undefined_score_policy(mut self, policy: UndefinedScorePolicy) -> Self {
        self.undefined_score = policy;
        self
    }

    pub fn with_recorded_indices(mut self, record: bool) -> Self {
        self.record_indices = record;
        self
    }

    pub fn with_search(mut self, search: SearchConfig) -> Self {
        self.search = search;
        self
    }
}

/// run-level cancellation flag, cheap to clone and share across threads
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// full-sample fit, kept so callers can re-score or inspect the model
#[derive(Debug, Clone)]
pub struct ApparentFit<M> {
    pub concordance: f64,
    pub hyperparameters: Hyperparameters,
    pub search: SearchSummary,
    pub model: M,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DrawOutcome {
    pub draw: usize,
    /// resample-fitted model scored on its own resample
    pub boot_concordance: f64,
    /// resample-fitted model scored on the original cohort
    pub full_concordance: f64,
    /// boot_concordance - full_concordance
    pub optimism: f64,
    pub hyperparameters: Hyperparameters,
    pub search_converged: bool,
    pub indices: Option<Vec<usize>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedDraw {
    pub draw: usize,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationResult {
    pub apparent_concordance: f64,
    pub mean_optimism: f64,
    pub adjusted_concordance: f64,
    pub interval: ConfidenceInterval,
    pub apparent_hyperparameters: Hyperparameters,
    pub apparent_search: SearchSummary,
    /// accepted draws in draw order
    pub draws: Vec<DrawOutcome>,
    /// only non-empty under `UndefinedScorePolicy::Skip`
    pub skipped_draws: Vec<SkippedDraw>,
}

impl ValidationResult {
    pub fn optimism_samples(&self) -> Vec<f64> {
        self.draws.iter().map(|d| d.optimism).collect()
    }
}

enum DrawAttempt {
    Done(DrawOutcome),
    Failed(CoxError),
    Cancelled,
}

pub struct BootstrapValidator<T, S = HarrellConcordance> {
    trainer: T,
    scorer: S,
    config: ValidationConfig,
    cancellation: Option<CancellationToken>,
}

impl<T: ModelTrainer> BootstrapValidator<T> {
    pub fn new(trainer: T, config: ValidationConfig) -> Self {
        Self {
            trainer,
            scorer: HarrellConcordance,
            config,
            cancellation: None,
        }
    }
}

impl<T: ModelTrainer, S: ConcordanceScorer> BootstrapValidator<T, S> {
    /// swap in a different concordance scorer
    pub fn with_scorer<S2: ConcordanceScorer>(self, scorer: S2) -> BootstrapValidator<T, S2> {
        BootstrapValidator {
            trainer: self.trainer,
            scorer,
            config: self.config,
            cancellation: self.cancellation,
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    pub fn trainer(&self) -> &T {
        &self.trainer
    }

    /// full optimism-corrected validation with `n_bootstraps` fresh draws
    pub fn run(&self, data: &SurvivalData) -> Result<ValidationResult> {
        self.config.validate()?;
        let tasks: Vec<(usize, Option<&BootstrapDraw>)> =
            (0..self.config.n_bootstraps).map(|b| (b, None)).collect();
        self.execute(data, tasks)
    }

    /// same procedure over caller-supplied draws (replays, partial reruns).
    /// `n_bootstraps` is ignored; each draw's `index` picks its search seed.
    pub fn run_with_draws(&self, data: &SurvivalData, draws: &[BootstrapDraw]) -> Result<ValidationResult> {
        self.config.search.validate()?;
        if draws.is_empty() {
            return Err(CoxError::invalid_parameter("draws", 0));
        }
        let tasks = draws.iter().map(|d| (d.index, Some(d))).collect();
        self.execute(data, tasks)
    }

    /// hyperparameter search + fit on the whole cohort, scored in-sample
    pub fn apparent_fit(&self, data: &SurvivalData) -> Result<ApparentFit<T::Model>> {
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let (hyperparameters, search) =
            self.trainer.select_hyperparameters(data, &self.config.search, &mut rng)?;
        let model = self.trainer.fit(data, &hyperparameters)?;
        let risk = model.predict_risk(data.covariates())?;
        let concordance = self.scorer.score(data.times(), risk.view(), data.events())?;

        Ok(ApparentFit { concordance, hyperparameters, search, model })
    }

    /// one fit-then-score-twice cycle. `rng` drives the search on the resample.
    pub fn evaluate_draw(
        &self,
        data: &SurvivalData,
        draw: &BootstrapDraw,
        rng: &mut StdRng,
    ) -> Result<DrawOutcome> {
        let resample = draw.resample(data)?;

        // search again on the resample, never reuse the apparent penalty
        let (hyperparameters, search) =
            self.trainer.select_hyperparameters(&resample, &self.config.search, rng)?;
        let model = self.trainer.fit(&resample, &hyperparameters)?;

        let boot_risk = model.predict_risk(resample.covariates())?;
        let boot_concordance = self.scorer.score(resample.times(), boot_risk.view(), resample.events())?;

        let full_risk = model.predict_risk(data.covariates())?;
        let full_concordance = self.scorer.score(data.times(), full_risk.view(), data.events())?;

        let optimism = boot_concordance - full_concordance;
        debug!(
            "draw {}: penalty={:.4e} boot={:.4} full={:.4} optimism={:+.4}",
            draw.index, hyperparameters.penalty, boot_concordance, full_concordance, optimism
        );

        Ok(DrawOutcome {
            draw: draw.index,
            boot_concordance,
            full_concordance,
            optimism,
            hyperparameters,
            search_converged: search.converged,
            indices: self.config.record_indices.then(|| draw.indices.clone()),
        })
    }

    fn attempt(&self, data: &SurvivalData, b: usize, supplied: Option<&BootstrapDraw>) -> DrawAttempt {
        if self.is_cancelled() {
            return DrawAttempt::Cancelled;
        }

        let mut rng = StdRng::seed_from_u64(stream_seed(self.config.seed, b as u64));
        let outcome = match supplied {
            Some(draw) => self.evaluate_draw(data, draw, &mut rng),
            None => BootstrapDraw::sample(b, data.n_samples(), &mut rng)
                .and_then(|draw| self.evaluate_draw(data, &draw, &mut rng)),
        };

        match outcome {
            Ok(outcome) => DrawAttempt::Done(outcome),
            Err(e) => DrawAttempt::Failed(e),
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancellation.as_ref().is_some_and(CancellationToken::is_cancelled)
    }

    fn execute(&self, data: &SurvivalData, tasks: Vec<(usize, Option<&BootstrapDraw>)>) -> Result<ValidationResult> {
        info!(
            "bootstrap validation: n={} p={} events={} draws={} parallel={}",
            data.n_samples(),
            data.n_features(),
            data.n_events(),
            tasks.len(),
            self.config.parallel
        );
        if tasks.len() == 1 {
            warn!("a single bootstrap draw gives a degenerate, high-variance optimism estimate");
        }

        if self.is_cancelled() {
            return Err(CoxError::Cancelled { completed: 0 });
        }
        let apparent = self.apparent_fit(data)?;
        info!(
            "apparent concordance {:.4} at penalty {:.4e}",
            apparent.concordance, apparent.hyperparameters.penalty
        );

        let (draws, skipped_draws) = if self.config.parallel {
            let attempts: Vec<(usize, DrawAttempt)> = tasks
                .par_iter()
                .map(|&(b, supplied)| (b, self.attempt(data, b, supplied)))
                .collect();
            self.gather(attempts)?
        } else {
            self.gather(tasks.iter().map(|&(b, supplied)| (b, self.attempt(data, b, supplied))))?
        };

        let optimism: Vec<f64> = draws.iter().map(|d| d.optimism).collect();
        if optimism.is_empty() {
            return Err(CoxError::undefined_score(format!(
                "all {} bootstrap draws were skipped",
                skipped_draws.len()
            )));
        }
        let summary = aggregate::aggregate(apparent.concordance, &optimism)?;

        info!(
            "optimism-adjusted concordance {:.4} (optimism {:.4}, 95% interval [{:.4}, {:.4}], {} skipped)",
            summary.adjusted,
            summary.mean_optimism,
            summary.interval.lower,
            summary.interval.upper,
            skipped_draws.len()
        );

        Ok(ValidationResult {
            apparent_concordance: summary.apparent,
            mean_optimism: summary.mean_optimism,
            adjusted_concordance: summary.adjusted,
            interval: summary.interval,
            apparent_hyperparameters: apparent.hyperparameters,
            apparent_search: apparent.search,
            draws,
            skipped_draws,
        })
    }

    /// fold attempts in draw order; stops pulling from a lazy iterator on the first fatal one
    fn gather<I>(&self, attempts: I) -> Result<(Vec<DrawOutcome>, Vec<SkippedDraw>)>
    where
        I: IntoIterator<Item = (usize, DrawAttempt)>,
    {
        let mut draws = Vec::new();
        let mut skipped = Vec::new();

        for (b, attempt) in attempts {
            match attempt {
                DrawAttempt::Done(outcome) => draws.push(outcome),
                DrawAttempt::Cancelled => {
                    warn!("validation cancelled before draw {}", b);
                    return Err(CoxError::Cancelled { completed: draws.len() + skipped.len() });
                }
                DrawAttempt::Failed(e)
                    if e.is_undefined_score() && self.config.undefined_score == UndefinedScorePolicy::Skip =>
                {
                    warn!("skipping draw {}: {}", b, e);
                    skipped.push(SkippedDraw { draw: b, reason: e.to_string() });
                }
                DrawAttempt::Failed(e) => return Err(e.in_draw(b)),
            }
        }

        Ok((draws, skipped))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trainer::CoxTrainer;
    use crate::search::SearchMethod;
    use ndarray::{Array1, Array2, ArrayView2};

    /// trainer that skips the search and hands back a fixed-coefficient model
    struct FixedTrainer {
        beta: Vec<f64>,
    }

    struct FixedModel(Array1<f64>);

    impl FittedModel for FixedModel {
        fn predict_risk(&self, covariates: ArrayView2<f64>) -> Result<Array1<f64>> {
            Ok(covariates.dot(&self.0))
        }
    }

    impl ModelTrainer for FixedTrainer {
        type Model = FixedModel;

        fn select_hyperparameters(
            &self,
            _data: &SurvivalData,
            search: &SearchConfig,
            _rng: &mut StdRng,
        ) -> Result<(Hyperparameters, SearchSummary)> {
            Ok((
                Hyperparameters { penalty: 1.0 },
                SearchSummary {
                    method: search.method,
                    best_log10_penalty: 0.0,
                    best_score: 0.5,
                    evaluations: Vec::new(),
                    converged: true,
                    note: None,
                },
            ))
        }

        fn fit(&self, _data: &SurvivalData, _hyperparameters: &Hyperparameters) -> Result<FixedModel> {
            Ok(FixedModel(Array1::from(self.beta.clone())))
        }
    }

    fn small_cohort() -> SurvivalData {
        let times: Vec<f64> = (1..=12).map(|t| t as f64).collect();
        let events = (0..12).map(|i| i % 3 != 2).collect();
        let covariates = Array2::from_shape_fn((12, 1), |(i, _)| ((i * 7) % 12) as f64);
        SurvivalData::new(times, events, covariates).unwrap()
    }

    #[test]
    fn test_config_defaults_and_toml() {
        let config = ValidationConfig::from_toml_str(
            r#"
            n_bootstraps = 50
            parallel = true
            undefined_score = "skip"

            [search]
            method = "grid"
            log10_penalty_range = [-2.0, 1.0]
            "#,
        )
        .unwrap();

        assert_eq!(config.n_bootstraps, 50);
        assert_eq!(config.seed, 42);
        assert!(config.parallel);
        assert_eq!(config.undefined_score, UndefinedScorePolicy::Skip);
        assert_eq!(config.search.method, SearchMethod::Grid);
        assert_eq!(config.search.fold_count, 5);
        assert_eq!(config.search.log10_penalty_range, (-2.0, 1.0));
    }

    #[test]
    fn test_config_rejects_zero_bootstraps() {
        assert!(ValidationConfig::from_toml_str("n_bootstraps = 0").is_err());
        assert!(matches!(
            ValidationConfig::from_toml_str("n_bootstraps = \"many\""),
            Err(CoxError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_fixed_model_optimism_matches_definition() {
        let data = small_cohort();
        let config = ValidationConfig::new().with_bootstraps(8).with_seed(3);
        let validator = BootstrapValidator::new(FixedTrainer { beta: vec![-1.0] }, config);
        let result = validator.run(&data).unwrap();

        assert_eq!(result.draws.len(), 8);
        for (b, draw) in result.draws.iter().enumerate() {
            assert_eq!(draw.draw, b);
            assert_eq!(draw.optimism, draw.boot_concordance - draw.full_concordance);
            // a fixed model scores the full cohort the same way every draw
            assert_eq!(draw.full_concordance, result.apparent_concordance);
        }
    }

    #[test]
    fn test_cancelled_before_start() {
        let data = small_cohort();
        let token = CancellationToken::new();
        token.cancel();
        let validator = BootstrapValidator::new(FixedTrainer { beta: vec![1.0] }, ValidationConfig::new())
            .with_cancellation(token);

        assert!(matches!(validator.run(&data), Err(CoxError::Cancelled { completed: 0 })));
    }

    #[test]
    fn test_evaluate_draw_records_indices_on_request() {
        let data = small_cohort();
        let config = ValidationConfig::new().with_recorded_indices(true).with_search(SearchConfig {
            method: SearchMethod::Grid,
            fold_count: 3,
            eval_budget: 3,
            log10_penalty_range: (-1.0, 1.0),
        });
        let validator = BootstrapValidator::new(CoxTrainer::new(), config);

        let draw = BootstrapDraw::from_indices(4, (0..12).collect());
        let outcome = validator
            .evaluate_draw(&data, &draw, &mut StdRng::seed_from_u64(1))
            .unwrap();

        assert_eq!(outcome.draw, 4);
        assert_eq!(outcome.indices, Some((0..12).collect()));
        // resample == cohort, so both evaluations see the same rows
        assert_eq!(outcome.boot_concordance, outcome.full_concordance);
        assert_eq!(outcome.optimism, 0.0);
    }
}
