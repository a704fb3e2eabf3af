pub mod errors;
pub mod parameters;

pub use errors::{FitError, FitErrorCategory, FitResult};
pub use parameters::{
    FixedParameters, ParameterKind, ParameterSpace, ParameterVector, ResolvedParameters,
    merge_parameters,
};

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Open wavelength interval, in Angstrom.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WavelengthRange {
    pub low: f64,
    pub high: f64,
}

impl WavelengthRange {
    pub const fn new(low: f64, high: f64) -> Self {
        Self { low, high }
    }

    pub fn contains(&self, wavelength: f64) -> bool {
        wavelength > self.low && wavelength < self.high
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WavelengthRangePolicy {
    Full,
    BlueOnly,
    #[default]
    NearInfrared,
}

impl WavelengthRangePolicy {
    pub const fn range(self) -> WavelengthRange {
        match self {
            Self::Full => WavelengthRange::new(4000.0, 14000.0),
            Self::BlueOnly => WavelengthRange::new(4000.0, 6000.0),
            Self::NearInfrared => WavelengthRange::new(8500.0, 14000.0),
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::BlueOnly => "blue_only",
            Self::NearInfrared => "near_infrared",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "full" => Some(Self::Full),
            "blue_only" | "blue" => Some(Self::BlueOnly),
            "near_infrared" | "nir" => Some(Self::NearInfrared),
            _ => None,
        }
    }
}

impl Display for WavelengthRangePolicy {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str((*self).as_str())
    }
}

/// Which datasets contribute to the likelihood.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitMode {
    #[default]
    NearInfrared,
    Joint,
    AuxiliaryOnly,
}

impl FitMode {
    pub const fn wavelength_policy(self) -> WavelengthRangePolicy {
        match self {
            Self::NearInfrared => WavelengthRangePolicy::NearInfrared,
            Self::Joint => WavelengthRangePolicy::Full,
            Self::AuxiliaryOnly => WavelengthRangePolicy::BlueOnly,
        }
    }

    pub const fn uses_primary(self) -> bool {
        !matches!(self, Self::AuxiliaryOnly)
    }

    pub const fn uses_auxiliary(self) -> bool {
        !matches!(self, Self::NearInfrared)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NearInfrared => "near_infrared",
            Self::Joint => "joint",
            Self::AuxiliaryOnly => "auxiliary_only",
        }
    }
}

impl Display for FitMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str((*self).as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoiseInflation {
    Disabled,
    #[default]
    AuxiliaryOnly,
    AllDatasets,
}

impl NoiseInflation {
    pub const fn applies_to(self, auxiliary: bool) -> bool {
        match self {
            Self::Disabled => false,
            Self::AuxiliaryOnly => auxiliary,
            Self::AllDatasets => true,
        }
    }
}

/// What to do with a feature whose residuals are not finite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NanPolicy {
    #[default]
    ExcludeFeature,
    RejectSample,
    FailFast,
}
