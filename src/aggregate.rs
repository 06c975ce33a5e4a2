use serde::Serialize;
use crate::error::{CoxError, Result};

/// lower/upper quantiles of the optimism-adjusted bootstrap distribution
pub const INTERVAL_QUANTILES: (f64, f64) = (0.025, 0.975);

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ConfidenceInterval {
    pub lower: f64,
    pub upper: f64,
}

/// optimism correction reduced from the per-draw optimism values
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OptimismSummary {
    pub apparent: f64,
    pub mean_optimism: f64,
    pub adjusted: f64,
    pub interval: ConfidenceInterval,
}

/// pure reduction: mean optimism, adjusted concordance, and the percentile
/// interval of `apparent - optimism_b`
pub fn aggregate(apparent: f64, optimism: &[f64]) -> Result<OptimismSummary> {
    if optimism.is_empty() {
        return Err(CoxError::invalid_dimensions("need at least one optimism sample"));
    }
    if !apparent.is_finite() || optimism.iter().any(|o| !o.is_finite()) {
        return Err(CoxError::numerical_error("optimism samples must be finite"));
    }

    let mean_optimism = optimism.iter().sum::<f64>() / optimism.len() as f64;

    let mut adjusted_samples: Vec<f64> = optimism.iter().map(|o| apparent - o).collect();
    adjusted_samples.sort_by(|a, b| a.total_cmp(b));

    let (lo, hi) = INTERVAL_QUANTILES;
    Ok(OptimismSummary {
        apparent,
        mean_optimism,
        adjusted: apparent - mean_optimism,
        interval: ConfidenceInterval {
            lower: percentile_sorted(&adjusted_samples, lo),
            upper: percentile_sorted(&adjusted_samples, hi),
        },
    })
}

/// linear interpolation between order statistics at position q * (m - 1)
pub fn percentile_sorted(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        m => {
            let position = q.clamp(0.0, 1.0) * (m - 1) as f64;
            let below = position.floor() as usize;
            let above = (below + 1).min(m - 1);
            let fraction = position - below as f64;
            sorted[below] + fraction * (sorted[above] - sorted[below])
        }
    }
}
