use ndarray::ArrayView1;
use crate::error::{CoxError, Result};

/// anything that turns risk scores + observed outcomes into a concordance in [0, 1]
pub trait ConcordanceScorer: Sync {
    /// `risk_scores` are hazard-oriented: higher score = expected shorter survival
    fn score(
        &self,
        times: ArrayView1<f64>,
        risk_scores: ArrayView1<f64>,
        events: &[bool],
    ) -> Result<f64>;
}

/// Harrell's C-index, ties in risk count as half-concordant
#[derive(Debug, Clone, Copy, Default)]
pub struct HarrellConcordance;

impl ConcordanceScorer for HarrellConcordance {
    fn score(
        &self,
        times: ArrayView1<f64>,
        risk_scores: ArrayView1<f64>,
        events: &[bool],
    ) -> Result<f64> {
        harrell_c_index(risk_scores, times, events)
    }
}

/// Harrell's C-index with tie handling
///
/// A pair (i, j) is comparable when i had an event and j outlived it: either
/// `t_j > t_i`, or j was censored no earlier than `t_i`. Returns
/// `UndefinedScore` if there are no comparable pairs (e.g. zero events).
pub fn harrell_c_index(
    risk_scores: ArrayView1<f64>,
    times: ArrayView1<f64>,
    events: &[bool],
) -> Result<f64> {
    let n = risk_scores.len();
    if n != times.len() || n != events.len() {
        return Err(CoxError::invalid_dimensions(
            format!("risk scores ({}), times ({}) and events ({}) must have same length",
                    n, times.len(), events.len())
        ));
    }

    if risk_scores.iter().any(|r| !r.is_finite()) {
        return Err(CoxError::numerical_error("risk scores must be finite"));
    }

    let mut concordant = 0u64;
    let mut discordant = 0u64;
    let mut tied_risk = 0u64;

    for i in 0..n {
        if !events[i] {
            continue;
        }

        for j in 0..n {
            if i == j {
                continue;
            }

            if times[j] > times[i] || (!events[j] && times[j] >= times[i]) {
                if risk_scores[i] > risk_scores[j] {
                    concordant += 1;
                } else if risk_scores[i] < risk_scores[j] {
                    discordant += 1;
                } else {
                    tied_risk += 1;
                }
            }
        }
    }

    let total_pairs = concordant + discordant + tied_risk;
    if total_pairs == 0 {
        return Err(CoxError::undefined_score(
            format!("no comparable pairs among {} samples ({} events)",
                    n, events.iter().filter(|&&e| e).count())
        ));
    }

    Ok((concordant as f64 + 0.5 * tied_risk as f64) / total_pairs as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array1;
    use approx::assert_relative_eq;
    use rand::{Rng, SeedableRng};
    use rand::rngs::StdRng;

    #[test]
    fn test_perfect_concordance() {
        let times = Array1::from(vec![1.0, 2.0, 3.0, 4.0]);
        let events = vec![true, true, true, true];
        let risk_scores = Array1::from(vec![4.0, 3.0, 2.0, 1.0]); // anti-correlated with time

        let c = HarrellConcordance.score(times.view(), risk_scores.view(), &events).unwrap();
        assert_eq!(c, 1.0);
    }

    #[test]
    fn test_reversed_concordance() {
        let times = Array1::from(vec![1.0, 2.0, 3.0, 4.0]);
        let events = vec![true, true, true, true];
        let risk_scores = Array1::from(vec![1.0, 2.0, 3.0, 4.0]);

        let c = HarrellConcordance.score(times.view(), risk_scores.view(), &events).unwrap();
        assert_eq!(c, 0.0);
    }

    #[test]
    fn test_ties_count_half() {
        let times = Array1::from(vec![1.0, 2.0, 3.0]);
        let events = vec![true, true, true];
        let risk_scores = Array1::from(vec![1.0, 1.0, 1.0]);

        let c = harrell_c_index(risk_scores.view(), times.view(), &events).unwrap();
        assert_relative_eq!(c, 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_censoring_rules() {
        // subject 1 censored at t=2: comparable to the event at t=1, but never as the earlier one.
        // subject 2 censored at t=1 ties the event time and still counts as outliving it.
        let times = Array1::from(vec![1.0, 2.0, 1.0, 3.0]);
        let events = vec![true, false, false, true];
        let risk_scores = Array1::from(vec![5.0, 1.0, 6.0, 0.0]);

        // comparable: (0,1) conc, (0,2) disc, (0,3) conc
        let c = harrell_c_index(risk_scores.view(), times.view(), &events).unwrap();
        assert_relative_eq!(c, 2.0 / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_random_scores_near_half() {
        let mut rng = StdRng::seed_from_u64(7);
        let n = 2000;
        let times = Array1::from_iter((0..n).map(|_| rng.gen_range(0.1_f64..10.0)));
        let events: Vec<bool> = (0..n).map(|_| rng.gen_bool(0.7)).collect();
        let risk_scores = Array1::from_iter((0..n).map(|_| rng.r#gen::<f64>()));

        let c = harrell_c_index(risk_scores.view(), times.view(), &events).unwrap();
        assert!((c - 0.5).abs() < 0.03, "random c-index {}", c);
    }

    #[test]
    fn test_no_events_is_undefined() {
        let times = Array1::from(vec![1.0, 2.0, 3.0]);
        let events = vec![false, false, false];
        let risk_scores = Array1::from(vec![1.0, 2.0, 3.0]);

        let result = harrell_c_index(risk_scores.view(), times.view(), &events);
        assert!(matches!(result, Err(CoxError::UndefinedScore { .. })));
    }

    #[test]
    fn test_dimension_mismatch_error() {
        let risk_scores = Array1::from(vec![1.0, 2.0]);
        let times = Array1::from(vec![1.0, 2.0, 3.0]); // Different length
        let events = vec![true, false];

        assert!(harrell_c_index(risk_scores.view(), times.view(), &events).is_err());
    }
}
