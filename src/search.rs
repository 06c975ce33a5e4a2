//! Penalty search over a log10 range, scored by k-fold cross-validated concordance.
//!
//! The search itself is a black box to the validator: it only sees the best
//! candidate and a [`SearchSummary`]. Running out of budget without a clear optimum
//! is reported through `SearchSummary::converged`, never as an error.

use log::{debug, warn};
use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use crate::{
    data::SurvivalData,
    error::{CoxError, Result},
    metrics::ConcordanceScorer,
    trainer::FittedModel,
};

const SWARM_INERTIA: f64 = 0.7;
const SWARM_COGNITIVE: f64 = 1.5;
const SWARM_SOCIAL: f64 = 1.5;
/// final swarm spread, as a fraction of the range, above which we call it unconverged
const SWARM_SPREAD_TOLERANCE: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMethod {
    /// evenly spaced points over the range
    Grid,
    /// 1-d particle swarm
    ParticleSwarm,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub method: SearchMethod,
    /// number of cross-validation folds
    pub fold_count: usize,
    /// max number of objective evaluations
    pub eval_budget: usize,
    /// inclusive bounds on log10(penalty)
    pub log10_penalty_range: (f64, f64),
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            method: SearchMethod::ParticleSwarm,
            fold_count: 5,
            eval_budget: 30,
            log10_penalty_range: (-3.0, 2.0),
        }
    }
}

impl SearchConfig {
    pub fn validate(&self) -> Result<()> {
        if self.fold_count < 2 {
            return Err(CoxError::invalid_parameter("fold_count", self.fold_count));
        }
        if self.eval_budget == 0 {
            return Err(CoxError::invalid_parameter("eval_budget", self.eval_budget));
        }
        let (lo, hi) = self.log10_penalty_range;
        if !lo.is_finite() || !hi.is_finite() || lo > hi {
            return Err(CoxError::invalid_parameter(
                "log10_penalty_range",
                format!("[{}, {}]", lo, hi),
            ));
        }
        Ok(())
    }
}

/// one objective evaluation
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Evaluation {
    pub log10_penalty: f64,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchSummary {
    pub method: SearchMethod,
    pub best_log10_penalty: f64,
    pub best_score: f64,
    /// every evaluation, in the order it was made
    pub evaluations: Vec<Evaluation>,
    pub converged: bool,
    pub note: Option<String>,
}

/// maximize `objective` over log10(penalty) with the configured strategy
pub fn maximize<R, F>(config: &SearchConfig, rng: &mut R, mut objective: F) -> Result<SearchSummary>
where
    R: Rng + ?Sized,
    F: FnMut(f64) -> Result<f64>,
{
    config.validate()?;

    let mut evaluations = Vec::with_capacity(config.eval_budget);
    let mut evaluate = |x: f64| -> Result<f64> {
        let score = objective(x)?;
        debug!("search candidate log10(penalty)={:.4} -> {:.6}", x, score);
        evaluations.push(Evaluation { log10_penalty: x, score });
        Ok(score)
    };

    let (converged, note) = match config.method {
        SearchMethod::Grid => grid_search(config, &mut evaluate)?,
        SearchMethod::ParticleSwarm => particle_swarm(config, rng, &mut evaluate)?,
    };

    // first strict maximum wins, so ties go to the earliest candidate
    let best = evaluations
        .iter()
        .fold(None::<Evaluation>, |best, e| match best {
            Some(b) if b.score >= e.score => Some(b),
            _ => Some(*e),
        })
        .ok_or_else(|| CoxError::numerical_error("search made no evaluations"))?;

    if !converged {
        warn!(
            "{:?} search did not settle: {}; using log10(penalty)={:.4}",
            config.method,
            note.as_deref().unwrap_or("no detail"),
            best.log10_penalty
        );
    }

    Ok(SearchSummary {
        method: config.method,
        best_log10_penalty: best.log10_penalty,
        best_score: best.score,
        evaluations,
        converged,
        note,
    })
}

fn grid_search<F>(config: &SearchConfig, evaluate: &mut F) -> Result<(bool, Option<String>)>
where
    F: FnMut(f64) -> Result<f64>,
{
    let (lo, hi) = config.log10_penalty_range;
    let points = grid_points(lo, hi, config.eval_budget);

    let mut best_index = 0;
    let mut best_score = f64::NEG_INFINITY;
    for (i, &x) in points.iter().enumerate() {
        let score = evaluate(x)?;
        if score > best_score {
            best_score = score;
            best_index = i;
        }
    }

    if points.len() > 2 && (best_index == 0 || best_index == points.len() - 1) {
        return Ok((false, Some(format!("best point {:.4} lies on the search boundary", points[best_index]))));
    }
    Ok((true, None))
}

fn grid_points(lo: f64, hi: f64, budget: usize) -> Vec<f64> {
    if budget == 1 || lo == hi {
        return vec![0.5 * (lo + hi)];
    }
    let step = (hi - lo) / (budget - 1) as f64;
    (0..budget).map(|i| lo + step * i as f64).collect()
}

fn particle_swarm<R, F>(config: &SearchConfig, rng: &mut R, evaluate: &mut F) -> Result<(bool, Option<String>)>
where
    R: Rng + ?Sized,
    F: FnMut(f64) -> Result<f64>,
{
    let (lo, hi) = config.log10_penalty_range;
    let width = hi - lo;
    if width == 0.0 {
        evaluate(lo)?;
        return Ok((true, None));
    }

    let budget = config.eval_budget;
    let n_particles = (budget / 5).clamp(2, 10).min(budget);

    let mut positions: Vec<f64> = (0..n_particles).map(|_| rng.gen_range(lo..=hi)).collect();
    let mut velocities: Vec<f64> = (0..n_particles)
        .map(|_| rng.gen_range(-0.25 * width..=0.25 * width))
        .collect();

    let mut personal_best = positions.clone();
    let mut personal_score = Vec::with_capacity(n_particles);
    for &x in &positions {
        personal_score.push(evaluate(x)?);
    }
    let mut used = n_particles;

    let mut global = 0;
    for i in 1..n_particles {
        if personal_score[i] > personal_score[global] {
            global = i;
        }
    }

    'swarm: while used < budget {
        for i in 0..n_particles {
            if used >= budget {
                break 'swarm;
            }
            let (r1, r2): (f64, f64) = (rng.r#gen(), rng.r#gen());
            let velocity = SWARM_INERTIA * velocities[i]
                + SWARM_COGNITIVE * r1 * (personal_best[i] - positions[i])
                + SWARM_SOCIAL * r2 * (personal_best[global] - positions[i]);
            velocities[i] = velocity.clamp(-width, width);
            positions[i] = (positions[i] + velocities[i]).clamp(lo, hi);

            let score = evaluate(positions[i])?;
            used += 1;
            if score > personal_score[i] {
                personal_score[i] = score;
                personal_best[i] = positions[i];
                if score > personal_score[global] {
                    global = i;
                }
            }
        }
    }

    let spread = positions.iter().copied().fold(f64::NEG_INFINITY, f64::max)
        - positions.iter().copied().fold(f64::INFINITY, f64::min);
    if spread > SWARM_SPREAD_TOLERANCE * width {
        return Ok((false, Some(format!(
            "budget of {} evaluations exhausted with swarm spread {:.4}",
            budget, spread
        ))));
    }
    Ok((true, None))
}

/// shuffled k-fold split; each entry is one fold's validation rows
#[derive(Debug, Clone)]
pub struct Folds {
    n_samples: usize,
    validation: Vec<Vec<usize>>,
}

impl Folds {
    /// `k` is clamped to n, so tiny cohorts degrade to leave-one-out
    pub fn shuffled<R: Rng + ?Sized>(n_samples: usize, k: usize, rng: &mut R) -> Result<Self> {
        if n_samples < 2 {
            return Err(CoxError::invalid_parameter("n_samples for cross-validation", n_samples));
        }
        if k < 2 {
            return Err(CoxError::invalid_parameter("fold_count", k));
        }
        let k = k.min(n_samples);

        let mut order: Vec<usize> = (0..n_samples).collect();
        order.shuffle(rng);

        let mut validation = vec![Vec::new(); k];
        for (position, row) in order.into_iter().enumerate() {
            validation[position % k].push(row);
        }
        for fold in &mut validation {
            fold.sort_unstable();
        }

        Ok(Self { n_samples, validation })
    }

    /// caller-chosen validation sets over rows `0..n_samples`
    pub fn from_validation_sets(n_samples: usize, validation: Vec<Vec<usize>>) -> Result<Self> {
        if validation.len() < 2 {
            return Err(CoxError::invalid_parameter("fold_count", validation.len()));
        }
        if let Some(&bad) = validation.iter().flatten().find(|&&i| i >= n_samples) {
            return Err(CoxError::invalid_dimensions(
                format!("fold index {} out of bounds for {} samples", bad, n_samples)
            ));
        }
        Ok(Self { n_samples, validation })
    }

    pub fn len(&self) -> usize {
        self.validation.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validation.is_empty()
    }

    pub fn validation_indices(&self, fold: usize) -> &[usize] {
        &self.validation[fold]
    }

    /// every row not in `fold`'s validation part
    pub fn train_indices(&self, fold: usize) -> Vec<usize> {
        let mut held_out = vec![false; self.n_samples];
        for &i in &self.validation[fold] {
            held_out[i] = true;
        }
        (0..self.n_samples).filter(|&i| !held_out[i]).collect()
    }
}

/// mean validation concordance over folds; folds with no comparable pairs are skipped
pub fn cross_validated_score<S, M, F>(
    data: &SurvivalData,
    folds: &Folds,
    scorer: &S,
    mut fit: F,
) -> Result<f64>
where
    S: ConcordanceScorer + ?Sized,
    M: FittedModel,
    F: FnMut(&SurvivalData) -> Result<M>,
{
    let mut total = 0.0;
    let mut scored = 0usize;

    for fold in 0..folds.len() {
        let train = data.subset(&folds.train_indices(fold))?;
        let validation = data.subset(folds.validation_indices(fold))?;

        let model = fit(&train)?;
        let risk = model.predict_risk(validation.covariates())?;
        match scorer.score(validation.times(), risk.view(), validation.events()) {
            Ok(c) => {
                total += c;
                scored += 1;
            }
            Err(e) if e.is_undefined_score() => continue,
            Err(e) => return Err(e),
        }
    }

    if scored == 0 {
        return Err(CoxError::undefined_score(
            format!("no cross-validation fold out of {} had comparable pairs", folds.len())
        ));
    }
    Ok(total / scored as f64)
}
