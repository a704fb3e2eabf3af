//! JSON run configuration.

use super::features::{
    Bandpass, FeatureDefinition, default_auxiliary_include, default_near_infrared_include,
    near_infrared_features,
};
use crate::domain::{
    FitError, FitMode, FitResult, FixedParameters, NanPolicy, NoiseInflation, ParameterKind,
    ParameterSpace,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridConfig {
    #[serde(default = "default_grid_root")]
    pub root: PathBuf,
    #[serde(default = "default_imf_dir")]
    pub imf_dir: String,
    #[serde(default = "default_abundance_dir")]
    pub abundance_dir: String,
    #[serde(default = "default_imf_glob")]
    pub imf_glob: String,
    #[serde(default = "default_abundance_glob")]
    pub abundance_glob: String,
}

impl GridConfig {
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    pub fn imf_directory(&self) -> PathBuf {
        self.root.join(&self.imf_dir)
    }

    pub fn abundance_directory(&self) -> PathBuf {
        self.root.join(&self.abundance_dir)
    }
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            root: default_grid_root(),
            imf_dir: default_imf_dir(),
            abundance_dir: default_abundance_dir(),
            imf_glob: default_imf_glob(),
            abundance_glob: default_abundance_glob(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuxiliaryConfig {
    pub file: PathBuf,
    #[serde(default)]
    pub redshift: f64,
    pub velocity_dispersion: f64,
    #[serde(default)]
    pub only: bool,
    #[serde(default = "default_auxiliary_include")]
    pub features: Vec<String>,
}

/// Extra feature fitted alongside the built-in near-infrared set. An order
/// above 1 fits a polynomial to `model / data` over the whole window and
/// leaves the observed flux unnormalised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomFeature {
    pub name: String,
    pub blue: [f64; 2],
    pub feature: [f64; 2],
    pub red: [f64; 2],
    #[serde(default = "default_continuum_order")]
    pub continuum_order: usize,
}

impl CustomFeature {
    pub fn definition(&self) -> FitResult<FeatureDefinition> {
        FeatureDefinition::new(
            self.name.clone(),
            Bandpass::new(self.blue[0], self.blue[1]),
            Bandpass::new(self.feature[0], self.feature[1]),
            Bandpass::new(self.red[0], self.red[1]),
            self.continuum_order,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub galaxy: String,
    #[serde(default = "default_walkers")]
    pub walkers: usize,
    pub iterations: usize,
    #[serde(default)]
    pub redshift: f64,
    #[serde(default)]
    pub velocity_dispersion: Option<f64>,
    /// `null` marks a sampled parameter, a number fixes it.
    pub parameters: BTreeMap<String, Option<f64>>,
    #[serde(default = "default_near_infrared_include")]
    pub features: Vec<String>,
    #[serde(default)]
    pub custom_features: Vec<CustomFeature>,
    pub observed: PathBuf,
    #[serde(default)]
    pub auxiliary: Option<AuxiliaryConfig>,
    #[serde(default)]
    pub grid: GridConfig,
    #[serde(default)]
    pub seed: u64,
    #[serde(default)]
    pub threads: Option<usize>,
    #[serde(default = "default_persist_every")]
    pub persist_every: usize,
    #[serde(default)]
    pub noise_inflation: NoiseInflation,
    #[serde(default)]
    pub nan_policy: NanPolicy,
    #[serde(default)]
    pub exclude_unconstrained_features: bool,
    #[serde(default = "default_true")]
    pub normalize_observed: bool,
    pub output: PathBuf,
    #[serde(default)]
    pub restart: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum RunConfigError {
    #[error("failed to read run configuration '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse run configuration '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

impl From<RunConfigError> for FitError {
    fn from(error: RunConfigError) -> Self {
        match error {
            RunConfigError::Read { .. } => FitError::io_system("IO.CONFIG_READ", error.to_string()),
            RunConfigError::Parse { .. } => {
                FitError::input_validation("INPUT.CONFIG_PARSE", error.to_string())
            }
        }
    }
}

pub fn load_run_config(path: impl AsRef<Path>) -> Result<RunConfig, RunConfigError> {
    let path = path.as_ref();
    let source = fs::read_to_string(path).map_err(|source| RunConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&source).map_err(|source| RunConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

impl RunConfig {
    pub fn fit_mode(&self) -> FitMode {
        match &self.auxiliary {
            Some(auxiliary) if auxiliary.only => FitMode::AuxiliaryOnly,
            Some(_) => FitMode::Joint,
            None => FitMode::NearInfrared,
        }
    }

    /// Built-in near-infrared features followed by the configured custom
    /// ones; `features` selects from this list by name.
    pub fn primary_catalogue(&self) -> FitResult<Vec<FeatureDefinition>> {
        let mut catalogue = near_infrared_features();
        for custom in &self.custom_features {
            let definition = custom.definition()?;
            if catalogue
                .iter()
                .any(|feature| feature.name() == definition.name())
            {
                return Err(FitError::input_validation(
                    "INPUT.FEATURE_DUPLICATE",
                    format!("custom feature '{}' is already defined", definition.name()),
                ));
            }
            catalogue.push(definition);
        }
        Ok(catalogue)
    }

    /// Sampled parameters are ordered by kind, so the chain-log column order
    /// does not depend on the JSON key order.
    pub fn parameter_space(&self) -> FitResult<ParameterSpace> {
        let mut entries = self
            .parameters
            .iter()
            .map(|(name, value)| Ok((ParameterKind::parse(name)?, *value)))
            .collect::<FitResult<Vec<_>>>()?;
        entries.sort_by_key(|(kind, _)| *kind);

        let sampled = entries
            .iter()
            .filter(|(_, value)| value.is_none())
            .map(|(kind, _)| *kind)
            .collect();
        let fixed = entries
            .iter()
            .filter_map(|(kind, value)| value.map(|value| (*kind, value)))
            .fold(FixedParameters::new(), |fixed, (kind, value)| {
                fixed.with(kind, value)
            });

        ParameterSpace::new(sampled, fixed)
    }

    pub fn validate(&self) -> FitResult<ParameterSpace> {
        let space = self.parameter_space()?;
        let dimension = space.dimension();

        if dimension == 0 {
            return Err(FitError::input_validation(
                "INPUT.CONFIG_PARAMETER",
                "at least one parameter must be sampled",
            ));
        }
        if self.walkers < 2 * dimension || self.walkers % 2 != 0 {
            return Err(FitError::input_validation(
                "INPUT.CONFIG_WALKERS",
                format!(
                    "walkers must be even and at least twice the dimension ({}), got {}",
                    2 * dimension,
                    self.walkers
                ),
            ));
        }
        if self.iterations == 0 {
            return Err(FitError::input_validation(
                "INPUT.CONFIG_ITERATIONS",
                "iterations must be positive",
            ));
        }
        if self.persist_every == 0 {
            return Err(FitError::input_validation(
                "INPUT.CONFIG_PERSIST",
                "persist_every must be positive",
            ));
        }
        if self.threads == Some(0) {
            return Err(FitError::input_validation(
                "INPUT.CONFIG_THREADS",
                "threads must be positive when given",
            ));
        }
        if !self.redshift.is_finite() || self.redshift <= -1.0 {
            return Err(FitError::input_validation(
                "INPUT.CONFIG_REDSHIFT",
                format!("redshift must be finite and > -1, got {}", self.redshift),
            ));
        }

        let mode = self.fit_mode();
        if mode.uses_primary()
            && !space.contains(ParameterKind::VelDisp)
            && self.velocity_dispersion.is_none()
        {
            return Err(FitError::input_validation(
                "INPUT.CONFIG_VELDISP",
                "velocity_dispersion is required unless VelDisp is a parameter",
            ));
        }
        if mode == FitMode::AuxiliaryOnly {
            let forbidden = [
                ParameterKind::X1,
                ParameterKind::X2,
                ParameterKind::Na,
                ParameterKind::K,
                ParameterKind::Fe,
                ParameterKind::Ca,
            ];
            if let Some(kind) = space
                .sampled()
                .iter()
                .find(|kind| forbidden.contains(kind))
            {
                return Err(FitError::input_validation(
                    "INPUT.CONFIG_PARAMETER",
                    format!(
                        "auxiliary-only fits cannot sample '{}'; remove IMF and elemental abundance parameters",
                        kind
                    ),
                ));
            }
        }

        Ok(space)
    }
}

fn default_grid_root() -> PathBuf {
    PathBuf::from("spec")
}

fn default_imf_dir() -> String {
    "vcj_ssp".to_string()
}

fn default_abundance_dir() -> String {
    "atlas".to_string()
}

fn default_imf_glob() -> String {
    "VCJ_*".to_string()
}

fn default_abundance_glob() -> String {
    "atlas_ssp_*".to_string()
}

fn default_continuum_order() -> usize {
    1
}

fn default_walkers() -> usize {
    512
}

fn default_persist_every() -> usize {
    1
}

fn default_true() -> bool {
    true
}
