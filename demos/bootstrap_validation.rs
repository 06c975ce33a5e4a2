use cox_optimism::{BootstrapValidator, CoxTrainer, SurvivalData, ValidationConfig};
use ndarray::{Array1, Array2};
use rand::{Rng, SeedableRng};
use rand::rngs::StdRng;

fn generate_synthetic_dataset(n_samples: usize, n_features: usize, seed: u64) -> cox_optimism::Result<SurvivalData> {
    let mut rng = StdRng::seed_from_u64(seed);

    let covariates = Array2::from_shape_fn((n_samples, n_features), |_| rng.gen_range(-2.0_f64..2.0));

    // True coefficients - first 3 features are truly predictive, the rest is noise
    let true_coefficients = Array1::from(vec![0.8, -0.5, 0.3]);
    let n_coef = n_features.min(3);

    let mut times = Vec::with_capacity(n_samples);
    let mut events = Vec::with_capacity(n_samples);

    for i in 0..n_samples {
        let linear_pred: f64 = covariates.slice(ndarray::s![i, 0..n_coef])
            .dot(&true_coefficients.slice(ndarray::s![0..n_coef]));

        let hazard = 0.1 * linear_pred.exp();
        let time = -rng.r#gen::<f64>().ln() / hazard;
        let censoring_time = rng.gen_range(1.0..15.0);

        if time < censoring_time {
            times.push(time);
            events.push(true);
        } else {
            times.push(censoring_time);
            events.push(false);
        }
    }

    SurvivalData::new(times, events, covariates)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    println!("Cox Proportional Hazards - Bootstrap Optimism Correction");
    println!("========================================================\n");

    let data = generate_synthetic_dataset(150, 10, 42)?;
    println!("Dataset created:");
    println!("  - Samples: {}", data.n_samples());
    println!("  - Features: {}", data.n_features());
    println!("  - Events: {}", data.n_events());
    println!("  - Censored: {}", data.n_samples() - data.n_events());
    println!();

    // a config file works too: ValidationConfig::from_toml_str(&std::fs::read_to_string(path)?)?
    let config = ValidationConfig::from_toml_str(
        r#"
        n_bootstraps = 50
        seed = 2024
        parallel = true

        [search]
        method = "particle_swarm"
        fold_count = 5
        eval_budget = 12
        log10_penalty_range = [-3.0, 2.0]
        "#,
    )?;

    let validator = BootstrapValidator::new(CoxTrainer::new(), config);
    let result = validator.run(&data)?;

    println!("Validation Summary");
    println!("==================");
    println!("  Apparent C-index:  {:.4}", result.apparent_concordance);
    println!("  Mean optimism:     {:.4}", result.mean_optimism);
    println!("  Adjusted C-index:  {:.4}", result.adjusted_concordance);
    println!("  95% interval:      [{:.4}, {:.4}]", result.interval.lower, result.interval.upper);
    println!("  Apparent penalty:  {:.4e}", result.apparent_hyperparameters.penalty);
    println!();

    println!("{:<6} {:>12} {:>10} {:>10} {:>10}", "Draw", "Penalty", "Boot C", "Full C", "Optimism");
    println!("{:-<52}", "");
    for draw in result.draws.iter().take(10) {
        println!(
            "{:<6} {:>12.4e} {:>10.4} {:>10.4} {:>+10.4}",
            draw.draw, draw.hyperparameters.penalty, draw.boot_concordance, draw.full_concordance, draw.optimism
        );
    }
    if result.draws.len() > 10 {
        println!("... {} more draws", result.draws.len() - 10);
    }

    let unconverged = result.draws.iter().filter(|d| !d.search_converged).count();
    if unconverged > 0 {
        println!("\nNote: {} draw searches hit their budget before settling.", unconverged);
    }

    Ok(())
}
