pub mod config;
pub mod constants;
pub mod features;

pub use config::{
    AuxiliaryConfig, CustomFeature, GridConfig, RunConfig, RunConfigError, load_run_config,
};
pub use features::{
    Bandpass, FeatureDefinition, auxiliary_features, default_auxiliary_include,
    default_near_infrared_include, near_infrared_features, select_features,
};
