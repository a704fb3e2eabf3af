use super::CliError;
use super::helpers::{
    SummaryRow, mean_acceptance, parse_parameter_assignment, parse_policy, render_feature_table,
};
use anyhow::Context;
use sspfit_core::common::{GridConfig, auxiliary_features, load_run_config, near_infrared_features};
use sspfit_core::domain::{
    FitError, FixedParameters, ParameterKind, ParameterVector, WavelengthRangePolicy,
};
use sspfit_core::grid::load_grid_store;
use sspfit_core::numerics::{BroadeningInput, broaden_gaussian};
use sspfit_core::sampling::{read_chain_log, run, summarize_chain};
use sspfit_core::serialization::{render_summary_table, write_spectrum_table};
use sspfit_core::synthesis::synthesize;
use std::path::PathBuf;
use tracing::info;

#[derive(clap::Args)]
pub(super) struct RunArgs {
    /// JSON run configuration
    #[arg(long)]
    config: PathBuf,

    /// Override the configured random seed
    #[arg(long)]
    seed: Option<u64>,

    /// Override the configured worker thread count
    #[arg(long)]
    threads: Option<usize>,

    /// Override the configured chain-log path
    #[arg(long)]
    output: Option<PathBuf>,

    /// Resume from the last complete iteration of this chain log
    #[arg(long)]
    restart: Option<PathBuf>,
}

#[derive(clap::Args)]
pub(super) struct SynthArgs {
    /// Grid root holding the IMF and abundance directories
    #[arg(long)]
    grid_root: PathBuf,

    /// Parameter assignment such as `Age=5` or `Na=0.3`; repeatable
    #[arg(long = "param", value_name = "NAME=VALUE", value_parser = parse_parameter_assignment)]
    params: Vec<(ParameterKind, f64)>,

    /// Wavelength range policy: full, blue_only or near_infrared
    #[arg(long, default_value = "near_infrared", value_parser = parse_policy)]
    policy: WavelengthRangePolicy,

    /// Broaden the model with this velocity dispersion (km/s)
    #[arg(long)]
    vel_disp: Option<f64>,

    /// Output spectrum table
    #[arg(long)]
    output: PathBuf,
}

#[derive(clap::Args)]
pub(super) struct SummarizeArgs {
    /// Chain log written by `sspfit run`
    #[arg(long)]
    chain: PathBuf,

    /// Iterations to discard; a negative value keeps only the last |N|
    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    burn_in: i64,

    /// Print JSON instead of a table
    #[arg(long)]
    json: bool,
}

#[derive(clap::Args)]
pub(super) struct FeaturesArgs {
    /// List the optical features used by auxiliary fits
    #[arg(long)]
    auxiliary: bool,

    /// Print JSON instead of a table
    #[arg(long)]
    json: bool,
}

pub(super) fn run_fit_command(args: RunArgs) -> Result<i32, CliError> {
    let mut config = load_run_config(&args.config).map_err(FitError::from)?;
    info!(config = %args.config.display(), galaxy = %config.galaxy, "loaded run configuration");
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    if let Some(threads) = args.threads {
        config.threads = Some(threads);
    }
    if let Some(output) = args.output {
        config.output = output;
    }
    if let Some(restart) = args.restart {
        config.restart = Some(restart);
    }

    let outcome = run(&config)?;
    println!("Chain log: {}", outcome.output.display());
    println!("Iterations: {}", outcome.iterations);
    println!("Resumed: {}", outcome.resumed);
    println!(
        "Mean acceptance fraction: {:.3}",
        mean_acceptance(&outcome.acceptance)
    );
    Ok(0)
}

pub(super) fn run_synth_command(args: SynthArgs) -> Result<i32, CliError> {
    let parameters = ParameterVector::from_pairs(args.params)?;
    let store = load_grid_store(&GridConfig::with_root(&args.grid_root))?;
    let spectrum = synthesize(&parameters, &FixedParameters::new(), &store, args.policy)?;
    info!(
        points = store.len(),
        samples = spectrum.wavelength.len(),
        policy = ?args.policy,
        "synthesized model spectrum"
    );

    match args.vel_disp {
        Some(velocity_dispersion) => {
            let range = args.policy.range();
            let flux = broaden_gaussian(BroadeningInput::new(
                &spectrum.wavelength,
                &spectrum.flux,
                velocity_dispersion,
                range,
            ))
            .map_err(FitError::from)?;
            let base = broaden_gaussian(BroadeningInput::new(
                &spectrum.wavelength,
                &spectrum.base,
                velocity_dispersion,
                range,
            ))
            .map_err(FitError::from)?;
            write_spectrum_table(
                &args.output,
                &["lambda", "flux", "base"],
                &[
                    flux.wavelength.as_slice(),
                    flux.flux.as_slice(),
                    base.flux.as_slice(),
                ],
            )?;
        }
        None => write_spectrum_table(
            &args.output,
            &["lambda", "flux", "base"],
            &[
                spectrum.wavelength.as_slice(),
                spectrum.flux.as_slice(),
                spectrum.base.as_slice(),
            ],
        )?,
    }

    println!("Spectrum: {}", args.output.display());
    Ok(0)
}

pub(super) fn run_summarize_command(args: SummarizeArgs) -> Result<i32, CliError> {
    let log = read_chain_log(&args.chain)?;
    let summary = summarize_chain(&log, args.burn_in)?;

    if args.json {
        let rows: Vec<SummaryRow> = summary.iter().map(SummaryRow::from).collect();
        let rendered =
            serde_json::to_string_pretty(&rows).context("failed to render summary as JSON")?;
        println!("{}", rendered);
    } else {
        println!("Galaxy: {}", log.header.galaxy);
        print!("{}", render_summary_table(&summary));
    }
    Ok(0)
}

pub(super) fn run_features_command(args: FeaturesArgs) -> Result<i32, CliError> {
    let features = if args.auxiliary {
        auxiliary_features()
    } else {
        near_infrared_features()
    };

    if args.json {
        let rendered = serde_json::to_string_pretty(&features)
            .context("failed to render features as JSON")?;
        println!("{}", rendered);
    } else {
        print!("{}", render_feature_table(&features));
    }
    Ok(0)
}
