use rand::Rng;
use serde::Serialize;
use crate::{
    data::SurvivalData,
    error::{CoxError, Result},
};

/// n row indices drawn uniformly from [0, n) with replacement
pub fn draw_bootstrap_indices<R: Rng + ?Sized>(n: usize, rng: &mut R) -> Result<Vec<usize>> {
    if n == 0 {
        return Err(CoxError::invalid_parameter("n", n));
    }
    Ok((0..n).map(|_| rng.gen_range(0..n)).collect())
}

/// independent seed for stream `counter` under `base` (splitmix64 finalizer).
///
/// Draw b always gets `stream_seed(seed, b)`, so a parallel run reproduces the
/// sequential one exactly.
pub fn stream_seed(base: u64, counter: u64) -> u64 {
    let mut z = base.wrapping_add(counter.wrapping_mul(0x9e37_79b9_7f4a_7c15));
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

/// one bootstrap resample: its position in the run plus the drawn rows
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BootstrapDraw {
    pub index: usize,
    pub indices: Vec<usize>,
}

impl BootstrapDraw {
    /// fresh draw of size `n`
    pub fn sample<R: Rng + ?Sized>(index: usize, n: usize, rng: &mut R) -> Result<Self> {
        Ok(Self { index, indices: draw_bootstrap_indices(n, rng)? })
    }

    /// draw from caller-supplied rows, e.g. to replay a failed draw
    pub fn from_indices(index: usize, indices: Vec<usize>) -> Self {
        Self { index, indices }
    }

    /// the resampled cohort
    pub fn resample(&self, data: &SurvivalData) -> Result<SurvivalData> {
        if self.indices.len() != data.n_samples() {
            return Err(CoxError::invalid_dimensions(format!(
                "draw {} has {} rows, cohort has {}",
                self.index,
                self.indices.len(),
                data.n_samples()
            )));
        }
        data.subset(&self.indices)
    }

    /// rows of the original cohort that never got drawn
    pub fn out_of_bag(&self, n: usize) -> Vec<usize> {
        let mut drawn = vec![false; n];
        for &i in &self.indices {
            if i < n {
                drawn[i] = true;
            }
        }
        (0..n).filter(|&i| !drawn[i]).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_indices_length_and_range() {
        let mut rng = StdRng::seed_from_u64(42);
        for n in [1, 2, 7, 100] {
            let indices = draw_bootstrap_indices(n, &mut rng).unwrap();
            assert_eq!(indices.len(), n);
            assert!(indices.iter().all(|&i| i < n));
        }
        assert!(draw_bootstrap_indices(0, &mut rng).is_err());
    }

    #[test]
    fn test_inclusion_rate_converges() {
        let mut rng = StdRng::seed_from_u64(3);
        let n = 50;
        let n_draws = 4000;
        let mut included = 0usize;
        for _ in 0..n_draws {
            let draw = BootstrapDraw::sample(0, n, &mut rng).unwrap();
            if draw.indices.contains(&0) {
                included += 1;
            }
        }

        let expected = 1.0 - (1.0 - 1.0 / n as f64).powi(n as i32);
        let rate = included as f64 / n_draws as f64;
        assert!((rate - expected).abs() < 0.03, "rate {} vs {}", rate, expected);
    }

    #[test]
    fn test_same_seed_same_draw() {
        let a = draw_bootstrap_indices(30, &mut StdRng::seed_from_u64(stream_seed(1, 4))).unwrap();
        let b = draw_bootstrap_indices(30, &mut StdRng::seed_from_u64(stream_seed(1, 4))).unwrap();
        assert_eq!(a, b);
        assert_ne!(stream_seed(1, 4), stream_seed(1, 5));
        assert_ne!(stream_seed(1, 4), stream_seed(2, 4));
    }

    #[test]
    fn test_out_of_bag() {
        let draw = BootstrapDraw::from_indices(0, vec![0, 0, 2, 2, 4]);
        assert_eq!(draw.out_of_bag(5), vec![1, 3]);
    }

    #[test]
    fn test_resample_checks_size() {
        let data = SurvivalData::new(
            vec![1.0, 2.0, 3.0],
            vec![true, true, false],
            Array2::zeros((3, 1)),
        ).unwrap();

        let draw = BootstrapDraw::from_indices(0, vec![2, 2, 0]);
        let resampled = draw.resample(&data).unwrap();
        assert_eq!(resampled.times().to_vec(), vec![3.0, 3.0, 1.0]);

        let short = BootstrapDraw::from_indices(1, vec![0, 1]);
        assert!(short.resample(&data).is_err());
    }
}
