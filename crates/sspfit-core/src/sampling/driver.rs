//! Full sampling run: load inputs, initialise or resume walkers, step the
//! ensemble and persist the chain log.

use super::chain_log::{ChainHeader, ChainLogWriter, read_chain_log};
use super::ensemble::{EnsembleSampler, EnsembleState};
use super::initialization::{initialize_walkers, restart_positions};
use super::posterior::SpectralPosterior;
use crate::common::config::RunConfig;
use crate::common::features::{FeatureDefinition, auxiliary_features, select_features};
use crate::domain::{FitError, FitResult, ParameterKind, ParameterSpace};
use crate::grid::{GridStore, load_grid_store};
use crate::likelihood::{
    AuxiliaryDataset, LikelihoodEvaluator, LikelihoodOptions, unconstrained_features,
};
use crate::observed::{ObservedFeatureSet, read_observed_spectrum};
use crate::synthesis::SpectrumSynthesizer;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info};

pub const PROGRESS_INTERVAL: usize = 100;

/// Everything a run reads from disk, loaded once before sampling.
#[derive(Debug)]
pub struct RunInputs {
    pub store: GridStore,
    pub space: ParameterSpace,
    pub primary_features: Vec<FeatureDefinition>,
    pub primary: ObservedFeatureSet,
    pub auxiliary: Option<AuxiliaryDataset>,
}

pub fn load_run_inputs(config: &RunConfig) -> FitResult<RunInputs> {
    let space = config.validate()?;
    let mode = config.fit_mode();
    let store = load_grid_store(&config.grid)?;

    let (primary_features, primary) = if mode.uses_primary() {
        let features = select_features(&config.primary_catalogue()?, &config.features)?;
        let spectrum = read_observed_spectrum(&config.observed)?.deredshift(config.redshift)?;
        let windows =
            ObservedFeatureSet::from_spectrum(&spectrum, &features, config.normalize_observed)?;
        (features, windows)
    } else {
        (Vec::new(), ObservedFeatureSet::default())
    };

    let auxiliary = match &config.auxiliary {
        Some(auxiliary) => {
            let features = select_features(&auxiliary_features(), &auxiliary.features)?;
            let spectrum = read_observed_spectrum(&auxiliary.file)?.deredshift(auxiliary.redshift)?;
            let windows =
                ObservedFeatureSet::from_spectrum(&spectrum, &features, config.normalize_observed)?;
            Some(AuxiliaryDataset::new(windows, auxiliary.velocity_dispersion))
        }
        None => None,
    };

    info!(
        mode = %mode,
        sampled = space.dimension(),
        primary_features = primary.len(),
        auxiliary_features = auxiliary.as_ref().map_or(0, |auxiliary| auxiliary.features.len()),
        "loaded run inputs"
    );

    Ok(RunInputs {
        store,
        space,
        primary_features,
        primary,
        auxiliary,
    })
}

pub fn build_posterior<'a>(
    config: &RunConfig,
    inputs: &'a RunInputs,
) -> FitResult<SpectralPosterior<'a>> {
    let synthesizer = SpectrumSynthesizer::new(&inputs.store)?;
    let options = LikelihoodOptions {
        noise_inflation: config.noise_inflation,
        nan_policy: config.nan_policy,
    };
    let include = inputs
        .primary_features
        .iter()
        .map(|feature| feature.name().to_string());

    let mut likelihood = LikelihoodEvaluator::new(
        synthesizer,
        config.fit_mode(),
        inputs.primary.clone(),
        include,
        options,
    );
    if let Some(auxiliary) = &inputs.auxiliary {
        likelihood = likelihood.with_auxiliary(auxiliary.clone());
    }
    if let Some(velocity_dispersion) = config.velocity_dispersion {
        likelihood = likelihood.with_velocity_dispersion(velocity_dispersion);
    }
    if config.exclude_unconstrained_features {
        let dropped = unconstrained_features(&inputs.primary_features, inputs.space.sampled());
        if !dropped.is_empty() {
            info!(features = %dropped.join(","), "excluding features with unsampled abundances");
        }
        likelihood = likelihood.excluding(dropped);
    }

    Ok(SpectralPosterior::new(inputs.space.clone(), likelihood))
}

/// Header describing a run: sampled names, fitted features and every
/// configured parameter (`None` for sampled ones).
pub fn chain_header(config: &RunConfig, posterior: &SpectralPosterior<'_>) -> ChainHeader {
    let space = posterior.space();
    let settings = ParameterKind::ALL
        .into_iter()
        .filter_map(|kind| {
            if space.is_sampled(kind) {
                Some((kind.to_string(), None))
            } else {
                space
                    .fixed()
                    .get(kind)
                    .map(|value| (kind.to_string(), Some(value.to_string())))
            }
        })
        .collect();

    ChainHeader {
        walkers: config.walkers,
        iterations: config.iterations,
        galaxy: config.galaxy.clone(),
        parameters: space.sampled().iter().map(ToString::to_string).collect(),
        features: posterior.likelihood().fitted_feature_names(),
        settings,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressReport {
    pub elapsed_minutes: f64,
    pub percent_done: f64,
    pub remaining_minutes: f64,
}

pub fn progress_report(done: usize, total: usize, elapsed: Duration) -> ProgressReport {
    let elapsed_minutes = elapsed.as_secs_f64() / 60.0;
    let fraction = if total == 0 {
        1.0
    } else {
        done as f64 / total as f64
    };
    let remaining_minutes = if fraction > 0.0 {
        elapsed_minutes * (1.0 - fraction) / fraction
    } else {
        0.0
    };
    ProgressReport {
        elapsed_minutes,
        percent_done: 100.0 * fraction,
        remaining_minutes,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub output: PathBuf,
    pub iterations: usize,
    pub resumed: bool,
    pub state: EnsembleState,
    pub acceptance: Vec<f64>,
}

pub fn run(config: &RunConfig) -> FitResult<RunOutcome> {
    let inputs = load_run_inputs(config)?;
    run_with_inputs(config, &inputs)
}

pub fn run_with_inputs(config: &RunConfig, inputs: &RunInputs) -> FitResult<RunOutcome> {
    let posterior = build_posterior(config, inputs)?;
    let header = chain_header(config, &posterior);
    let mut sampler = EnsembleSampler::new(&posterior, config.walkers, config.seed, config.threads)?;

    let (positions, mut writer, resumed) = match &config.restart {
        Some(restart) => {
            let positions = resume_positions(restart, &header)?;
            let writer = if same_file(restart, &config.output) {
                ChainLogWriter::append(&config.output)?
            } else {
                ChainLogWriter::create(&config.output, &header)?
            };
            info!(chain = %restart.display(), "resuming from last complete iteration");
            (positions, writer, true)
        }
        None => {
            let positions =
                initialize_walkers(posterior.space(), config.walkers, sampler.rng_mut());
            (positions, ChainLogWriter::create(&config.output, &header)?, false)
        }
    };

    let mut state = sampler.initial_state(positions)?;
    info!(
        galaxy = %config.galaxy,
        walkers = config.walkers,
        iterations = config.iterations,
        output = %config.output.display(),
        "starting ensemble sampling"
    );

    let started = Instant::now();
    for iteration in 1..=config.iterations {
        sampler.step(&mut state)?;
        writer.record(&state.positions, &state.log_prob);
        if writer.pending_iterations() >= config.persist_every {
            writer.flush()?;
            debug!(iteration, "persisted chain log");
        }
        if iteration % PROGRESS_INTERVAL == 0 {
            let report = progress_report(iteration, config.iterations, started.elapsed());
            info!(
                iteration,
                elapsed_minutes = format!("{:.2}", report.elapsed_minutes),
                percent_done = format!("{:.1}", report.percent_done),
                remaining_minutes = format!("{:.2}", report.remaining_minutes),
                "sampling progress"
            );
        }
    }
    writer.flush()?;

    let acceptance = sampler.acceptance_fraction();
    info!(
        mean_acceptance = acceptance.iter().sum::<f64>() / acceptance.len().max(1) as f64,
        "finished ensemble sampling"
    );

    Ok(RunOutcome {
        output: config.output.clone(),
        iterations: config.iterations,
        resumed,
        state,
        acceptance,
    })
}

fn resume_positions(restart: &Path, header: &ChainHeader) -> FitResult<Vec<Vec<f64>>> {
    let log = read_chain_log(restart)?;
    if log.header.parameters != header.parameters {
        return Err(FitError::input_validation(
            "INPUT.RESTART_SHAPE",
            format!(
                "restart chain samples [{}], run samples [{}]",
                log.header.parameters.join(", "),
                header.parameters.join(", ")
            ),
        ));
    }
    let last = log.last_complete_iteration().ok_or_else(|| {
        FitError::input_validation(
            "INPUT.RESTART_EMPTY",
            format!("restart chain '{}' has no complete iteration", restart.display()),
        )
    })?;
    restart_positions(last.positions.clone(), header.walkers, header.parameters.len())
}

fn same_file(lhs: &Path, rhs: &Path) -> bool {
    match (lhs.canonicalize(), rhs.canonicalize()) {
        (Ok(lhs), Ok(rhs)) => lhs == rhs,
        _ => lhs == rhs,
    }
}

#[cfg(test)]
mod tests {
    use super::{progress_report, same_file};
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn progress_extrapolates_remaining_time() {
        let report = progress_report(100, 400, Duration::from_secs(120));
        assert_eq!(report.elapsed_minutes, 2.0);
        assert_eq!(report.percent_done, 25.0);
        assert_eq!(report.remaining_minutes, 6.0);

        let finished = progress_report(400, 400, Duration::from_secs(60));
        assert_eq!(finished.remaining_minutes, 0.0);
    }

    #[test]
    fn restart_into_the_same_log_is_detected_through_relative_paths() {
        let temp = TempDir::new().expect("tempdir");
        let path = temp.path().join("chain.dat");
        fs::write(&path, "").expect("write");
        let indirect = temp.path().join(".").join("chain.dat");
        assert!(same_file(&path, &indirect));
        assert!(!same_file(&path, &temp.path().join("other.dat")));
    }
}
