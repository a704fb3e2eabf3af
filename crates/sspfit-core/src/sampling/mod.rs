pub mod chain_log;
pub mod driver;
pub mod ensemble;
pub mod initialization;
pub mod posterior;

pub use chain_log::{
    ChainHeader, ChainIteration, ChainLog, ChainLogWriter, ParameterSummary, read_chain_log,
    summarize_chain,
};
pub use driver::{
    RunInputs, RunOutcome, build_posterior, chain_header, load_run_inputs, run, run_with_inputs,
};
pub use ensemble::{EnsembleSampler, EnsembleState, STRETCH_SCALE};
pub use initialization::{initial_value, initialize_walkers, restart_positions};
pub use posterior::{LogProbability, SpectralPosterior};
