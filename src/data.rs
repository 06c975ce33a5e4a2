use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use crate::error::{CoxError, Result};

/// one distinct event time: who died there, and who was still at risk
#[derive(Debug, Clone)]
pub struct RiskSet {
    pub time: f64,
    pub events: Vec<usize>,  // rows with an observed event at `time`
    pub at_risk: Vec<usize>, // rows with time >= `time`
}

/// survival data - times, events, and patient features
#[derive(Debug, Clone)]
pub struct SurvivalData {
    times: Array1<f64>,      // time to event/censoring
    events: Vec<bool>,       // true = event, false = censored
    covariates: Array2<f64>, // patient features (n_samples x n_features)
    risk_sets: Vec<RiskSet>, // precomputed, ordered by event time
}

impl SurvivalData {
    /// make new survival data from raw vecs/arrays
    pub fn new(
        times: Vec<f64>,         // survival/censoring times
        events: Vec<bool>,       // true = event occurred, false = censored
        covariates: Array2<f64>, // patient features matrix
    ) -> Result<Self> {
        let n_samples = times.len();

        if events.len() != n_samples {
            return Err(CoxError::invalid_dimensions(
                format!("times len ({}) != events len ({})", n_samples, events.len())
            ));
        }

        if covariates.nrows() != n_samples {
            return Err(CoxError::invalid_dimensions(
                format!("covariates rows ({}) != n_samples ({})", covariates.nrows(), n_samples)
            ));
        }

        if times.iter().any(|&t| t <= 0.0 || !t.is_finite()) {
            return Err(CoxError::invalid_survival_data(
                "survival times must be positive & finite"
            ));
        }

        if covariates.iter().any(|x| !x.is_finite()) {
            return Err(CoxError::invalid_survival_data("covariates must be finite"));
        }

        let times = Array1::from(times);
        let risk_sets = build_risk_sets(times.view(), &events);

        Ok(Self {
            times,
            events,
            covariates,
            risk_sets,
        })
    }

    /// build from a feature matrix plus an n x 2 outcome matrix
    /// (column 0 = event indicator 0/1, column 1 = time)
    pub fn from_outcome_matrix(covariates: Array2<f64>, outcomes: ArrayView2<f64>) -> Result<Self> {
        if outcomes.ncols() != 2 {
            return Err(CoxError::invalid_dimensions(
                format!("outcome matrix needs 2 columns, got {}", outcomes.ncols())
            ));
        }

        let mut events = Vec::with_capacity(outcomes.nrows());
        for &indicator in outcomes.column(0) {
            match indicator {
                x if x == 1.0 => events.push(true),
                x if x == 0.0 => events.push(false),
                other => {
                    return Err(CoxError::invalid_survival_data(
                        format!("event indicator must be 0 or 1, got {}", other)
                    ));
                }
            }
        }

        let times = outcomes.column(1).to_vec();
        Self::new(times, events, covariates)
    }

    /// how many patients
    pub fn n_samples(&self) -> usize {
        self.times.len()
    }

    /// how many features per patient
    pub fn n_features(&self) -> usize {
        self.covariates.ncols()
    }

    /// how many observed (uncensored) events
    pub fn n_events(&self) -> usize {
        self.events.iter().filter(|&&e| e).count()
    }

    /// survival/censoring times
    pub fn times(&self) -> ArrayView1<'_, f64> {
        self.times.view()
    }

    /// event indicators (true = event, false = censored)
    pub fn events(&self) -> &[bool] {
        &self.events
    }

    /// patient feature matrix
    pub fn covariates(&self) -> ArrayView2<'_, f64> {
        self.covariates.view()
    }

    /// risk sets at each distinct event time, earliest first
    pub fn risk_sets(&self) -> &[RiskSet] {
        &self.risk_sets
    }

    /// unique event times in order
    pub fn event_times(&self) -> Vec<f64> {
        self.risk_sets.iter().map(|rs| rs.time).collect()
    }

    /// grab patients by index - repeats are fine, so this also builds bootstrap resamples
    pub fn subset(&self, indices: &[usize]) -> Result<Self> {
        if let Some(&bad) = indices.iter().find(|&&i| i >= self.n_samples()) {
            return Err(CoxError::invalid_dimensions(
                format!("subset index {} out of bounds for {} samples", bad, self.n_samples())
            ));
        }

        let times: Vec<f64> = indices.iter().map(|&i| self.times[i]).collect();
        let events: Vec<bool> = indices.iter().map(|&i| self.events[i]).collect();
        let covariates = self.covariates.select(Axis(0), indices);

        Self::new(times, events, covariates)
    }
}

fn build_risk_sets(times: ArrayView1<f64>, events: &[bool]) -> Vec<RiskSet> {
    let mut event_times: Vec<f64> = times
        .iter()
        .zip(events.iter())
        .filter_map(|(&time, &event)| if event { Some(time) } else { None })
        .collect();

    // times are validated finite so total_cmp == partial_cmp here
    event_times.sort_by(|a, b| a.total_cmp(b));
    event_times.dedup();

    event_times
        .into_iter()
        .map(|time| {
            let events_here = (0..times.len())
                .filter(|&i| events[i] && times[i] == time)
                .collect();
            let at_risk = (0..times.len()).filter(|&i| times[i] >= time).collect();
            RiskSet { time, events: events_here, at_risk }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn create_test_data() -> SurvivalData {
        let times = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let events = vec![true, false, true, true, false];
        let covariates = Array2::from_shape_vec((5, 2), vec![
            1.0, 2.0,
            3.0, 4.0,
            5.0, 6.0,
            7.0, 8.0,
            9.0, 10.0,
        ]).unwrap();

        SurvivalData::new(times, events, covariates).unwrap()
    }

    #[test]
    fn test_survival_data_creation() {
        let data = create_test_data();
        assert_eq!(data.n_samples(), 5);
        assert_eq!(data.n_features(), 2);
        assert_eq!(data.n_events(), 3);
        assert_eq!(data.event_times(), vec![1.0, 3.0, 4.0]);
    }

    #[test]
    fn test_risk_sets() {
        let data = create_test_data();
        let sets = data.risk_sets();
        assert_eq!(sets.len(), 3);
        assert_eq!(sets[0].events, vec![0]);
        assert_eq!(sets[0].at_risk, vec![0, 1, 2, 3, 4]);
        assert_eq!(sets[1].at_risk, vec![2, 3, 4]);
        assert_eq!(sets[2].events, vec![3]);
    }

    #[test]
    fn test_invalid_dimensions() {
        let times = vec![1.0, 2.0];
        let events = vec![true]; // wrong length
        let covariates = Array2::zeros((2, 2));

        assert!(SurvivalData::new(times, events, covariates).is_err());
    }

    #[test]
    fn test_invalid_times() {
        let times = vec![-1.0, 2.0]; // negative time
        let events = vec![true, false];
        let covariates = Array2::zeros((2, 2));

        assert!(SurvivalData::new(times, events, covariates).is_err());
    }

    #[test]
    fn test_from_outcome_matrix() {
        let covariates = Array2::zeros((3, 1));
        let outcomes = array![[1.0, 2.5], [0.0, 4.0], [1.0, 1.0]];
        let data = SurvivalData::from_outcome_matrix(covariates, outcomes.view()).unwrap();

        assert_eq!(data.events(), &[true, false, true]);
        assert_eq!(data.times().to_vec(), vec![2.5, 4.0, 1.0]);
    }

    #[test]
    fn test_outcome_matrix_rejects_bad_indicator() {
        let outcomes = array![[1.0, 2.5], [0.5, 4.0]];
        assert!(SurvivalData::from_outcome_matrix(Array2::zeros((2, 1)), outcomes.view()).is_err());

        let one_column = array![[1.0], [0.0]];
        assert!(SurvivalData::from_outcome_matrix(Array2::zeros((2, 1)), one_column.view()).is_err());
    }

    #[test]
    fn test_subset() {
        let data = create_test_data();
        let subset = data.subset(&[0, 2, 4]).unwrap();

        assert_eq!(subset.n_samples(), 3);
        assert_eq!(subset.times()[0], 1.0);
        assert_eq!(subset.times()[1], 3.0);
        assert_eq!(subset.times()[2], 5.0);
    }

    #[test]
    fn test_subset_with_repeats() {
        let data = create_test_data();
        let resample = data.subset(&[1, 1, 3, 3, 3]).unwrap();

        assert_eq!(resample.n_samples(), 5);
        assert_eq!(resample.n_events(), 3);
        assert_eq!(resample.covariates().row(4).to_vec(), vec![7.0, 8.0]);
        assert!(data.subset(&[5]).is_err());
    }
}
