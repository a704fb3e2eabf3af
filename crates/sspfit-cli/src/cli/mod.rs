mod commands;
mod helpers;

use clap::Parser;
use sspfit_core::domain::FitError;

pub fn run_from_env() -> i32 {
    let args: Vec<String> = std::env::args().skip(1).collect();
    match run(args) {
        Ok(code) => code,
        Err(error) => {
            let fit_error = error.as_fit_error();
            eprintln!("{}", fit_error.diagnostic_line());
            eprintln!("{}", fit_error.fatal_exit_line());
            fit_error.exit_code()
        }
    }
}

pub fn run<I, S>(args: I) -> Result<i32, CliError>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let full_args = std::iter::once("sspfit".to_string())
        .chain(args.into_iter().map(Into::into))
        .collect::<Vec<_>>();
    match Cli::try_parse_from(&full_args) {
        Ok(cli) => dispatch_parsed(cli.command),
        Err(err) => match err.kind() {
            clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => {
                print!("{}", err);
                Ok(0)
            }
            _ => Err(CliError::Usage(err.to_string())),
        },
    }
}

#[derive(Parser)]
#[command(
    name = "sspfit",
    version,
    about = "Near-infrared stellar population fitting with an ensemble MCMC sampler"
)]
struct Cli {
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(clap::Subcommand)]
enum CliCommand {
    /// Sample the posterior described by a JSON run configuration
    Run(commands::RunArgs),
    /// Write a synthesized (optionally broadened) model spectrum
    Synth(commands::SynthArgs),
    /// Print 16/50/84 percentile summaries of a chain log
    Summarize(commands::SummarizeArgs),
    /// List the built-in spectral feature definitions
    Features(commands::FeaturesArgs),
}

fn dispatch_parsed(command: CliCommand) -> Result<i32, CliError> {
    match command {
        CliCommand::Run(args) => commands::run_fit_command(args),
        CliCommand::Synth(args) => commands::run_synth_command(args),
        CliCommand::Summarize(args) => commands::run_summarize_command(args),
        CliCommand::Features(args) => commands::run_features_command(args),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("{0}")]
    Usage(String),
    #[error("{0}")]
    Fit(FitError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<FitError> for CliError {
    fn from(error: FitError) -> Self {
        Self::Fit(error)
    }
}

impl CliError {
    fn as_fit_error(&self) -> FitError {
        match self {
            Self::Usage(message) => FitError::input_validation("INPUT.CLI_USAGE", message.clone()),
            Self::Fit(error) => error.clone(),
            Self::Internal(error) => FitError::io_system("IO.CLI", format!("{error:#}")),
        }
    }
}
