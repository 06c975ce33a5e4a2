//! # cox optimism
//!
//! bootstrap internal validation for penalized cox models - how much of your
//! c-index is real, and how much is the model grading its own homework?
//!
//! ## what you get
//!
//! - apparent concordance on the full cohort
//! - optimism estimated from B bootstrap refits, each w/ its own penalty search
//! - optimism-adjusted c-index + 95% percentile interval
//! - ridge / elastic net cox regression as the default model
//! - grid or particle-swarm penalty search over k-fold cv concordance
//! - parallel draws when you want them, same numbers either way
//!
//! ## quick start
//!
//! ```rust
//! use cox_optimism::{BootstrapValidator, CoxTrainer, SurvivalData, ValidationConfig};
//! use ndarray::Array2;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // 60 patients, one biomarker; every 4th patient is censored
//! let n = 60;
//! let biomarker: Vec<f64> = (0..n).map(|i| ((i * 37) % n) as f64 / 30.0 - 1.0).collect();
//! let times: Vec<f64> = (0..n).map(|i| 1.0 + ((i * 13) % n) as f64 * (1.5 - biomarker[i] / 2.0)).collect();
//! let events: Vec<bool> = (0..n).map(|i| i % 4 != 0).collect(); // true = died, false = censored
//! let covariates = Array2::from_shape_vec((n, 1), biomarker)?;
//! let data = SurvivalData::new(times, events, covariates)?;
//!
//! // default search: particle swarm over 5-fold cv concordance
//! let config = ValidationConfig::new().with_bootstraps(20).with_seed(7);
//! let result = BootstrapValidator::new(CoxTrainer::new(), config).run(&data)?;
//!
//! println!(
//!     "c-index {:.3} -> adjusted {:.3} [{:.3}, {:.3}]",
//!     result.apparent_concordance,
//!     result.adjusted_concordance,
//!     result.interval.lower,
//!     result.interval.upper,
//! );
//! # Ok(())
//! # }
//! ```

pub mod aggregate;
pub mod data;
pub mod error;
pub mod metrics;
pub mod model;
pub mod optimization;
pub mod resample;
pub mod search;
pub mod trainer;
pub mod validation;

pub use aggregate::{ConfidenceInterval, OptimismSummary};
pub use data::SurvivalData;
pub use error::{CoxError, Result};
pub use metrics::{ConcordanceScorer, HarrellConcordance};
pub use model::CoxModel;
pub use resample::BootstrapDraw;
pub use search::{SearchConfig, SearchMethod, SearchSummary};
pub use trainer::{CoxTrainer, FittedModel, Hyperparameters, ModelTrainer};
pub use validation::{
    BootstrapValidator, CancellationToken, UndefinedScorePolicy, ValidationConfig, ValidationResult,
};
