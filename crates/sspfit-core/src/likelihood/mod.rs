//! Chi-square likelihood of a parameter vector against the observed feature
//! windows.

pub mod chi_square;

pub use chi_square::{chi_square, normalized_model};

use crate::common::features::FeatureDefinition;
use crate::domain::{
    FitError, FitErrorCategory, FitMode, FitResult, NanPolicy, NoiseInflation, ParameterKind,
    ResolvedParameters, WavelengthRangePolicy,
};
use crate::numerics::{BroadenedSpectrum, BroadeningInput, CubicSpline, broaden_gaussian};
use crate::observed::ObservedFeatureSet;
use crate::synthesis::{SpectrumSynthesizer, SyntheticSpectrum};
use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};
use std::sync::{Mutex, PoisonError};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LikelihoodOptions {
    pub noise_inflation: NoiseInflation,
    pub nan_policy: NanPolicy,
}

/// Optical dataset fitted against the broadened reference-IMF spectrum.
#[derive(Debug, Clone, PartialEq)]
pub struct AuxiliaryDataset {
    pub features: ObservedFeatureSet,
    pub velocity_dispersion: f64,
}

impl AuxiliaryDataset {
    pub fn new(features: ObservedFeatureSet, velocity_dispersion: f64) -> Self {
        Self {
            features,
            velocity_dispersion,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dataset {
    Primary,
    Auxiliary,
}

impl Display for Dataset {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Primary => "primary",
            Self::Auxiliary => "auxiliary",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureStatus {
    Included,
    Excluded,
    /// Residuals were not finite and the feature was dropped.
    Skipped,
    /// Residuals were not finite and the whole sample is rejected.
    Rejected,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureContribution {
    pub name: String,
    pub dataset: Dataset,
    pub status: FeatureStatus,
    pub chi_square: f64,
    pub samples: usize,
}

/// Names dropped when the abundance a feature constrains is not sampled.
pub fn unconstrained_features(
    features: &[FeatureDefinition],
    sampled: &[ParameterKind],
) -> Vec<String> {
    features
        .iter()
        .filter(|feature| {
            feature
                .constraining_parameter()
                .is_some_and(|kind| !sampled.contains(&kind))
        })
        .map(|feature| feature.name().to_string())
        .collect()
}

#[derive(Debug)]
pub struct LikelihoodEvaluator<'a> {
    synthesizer: SpectrumSynthesizer<'a>,
    mode: FitMode,
    primary: ObservedFeatureSet,
    include: BTreeSet<String>,
    auxiliary: Option<AuxiliaryDataset>,
    velocity_dispersion: Option<f64>,
    options: LikelihoodOptions,
    warned: Mutex<BTreeSet<String>>,
}

impl<'a> LikelihoodEvaluator<'a> {
    pub fn new(
        synthesizer: SpectrumSynthesizer<'a>,
        mode: FitMode,
        primary: ObservedFeatureSet,
        include: impl IntoIterator<Item = String>,
        options: LikelihoodOptions,
    ) -> Self {
        Self {
            synthesizer,
            mode,
            primary,
            include: include.into_iter().collect(),
            auxiliary: None,
            velocity_dispersion: None,
            options,
            warned: Mutex::new(BTreeSet::new()),
        }
    }

    pub fn with_auxiliary(mut self, auxiliary: AuxiliaryDataset) -> Self {
        self.auxiliary = Some(auxiliary);
        self
    }

    /// Primary dispersion used when `VelDisp` is neither sampled nor fixed.
    pub fn with_velocity_dispersion(mut self, velocity_dispersion: f64) -> Self {
        self.velocity_dispersion = Some(velocity_dispersion);
        self
    }

    pub fn excluding(mut self, names: impl IntoIterator<Item = String>) -> Self {
        for name in names {
            self.include.remove(&name);
        }
        self
    }

    pub fn mode(&self) -> FitMode {
        self.mode
    }

    pub fn include(&self) -> &BTreeSet<String> {
        &self.include
    }

    pub fn primary(&self) -> &ObservedFeatureSet {
        &self.primary
    }

    pub fn auxiliary(&self) -> Option<&AuxiliaryDataset> {
        self.auxiliary.as_ref()
    }

    pub fn is_included(&self, name: &str) -> bool {
        self.include.contains(name)
    }

    /// Included primary features in observed order, then auxiliary features.
    pub fn fitted_feature_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        if self.mode.uses_primary() {
            names.extend(
                self.primary
                    .names()
                    .into_iter()
                    .filter(|name| self.is_included(name))
                    .map(str::to_string),
            );
        }
        if let Some(auxiliary) = self.auxiliary.as_ref().filter(|_| self.mode.uses_auxiliary()) {
            names.extend(auxiliary.features.names().into_iter().map(str::to_string));
        }
        names
    }

    /// `−0.5 · Σ χ²` over every fitted feature, or −∞ when a feature is
    /// rejected under `NanPolicy::RejectSample`.
    pub fn log_likelihood(&self, parameters: &ResolvedParameters) -> FitResult<f64> {
        let contributions = self.breakdown(parameters)?;
        if contributions
            .iter()
            .any(|contribution| contribution.status == FeatureStatus::Rejected)
        {
            return Ok(f64::NEG_INFINITY);
        }
        let total: f64 = contributions
            .iter()
            .map(|contribution| contribution.chi_square)
            .sum();
        Ok(-0.5 * total)
    }

    /// Per-feature chi-square contributions; excluded features are listed
    /// with exactly zero.
    pub fn breakdown(&self, parameters: &ResolvedParameters) -> FitResult<Vec<FeatureContribution>> {
        let policy = self.mode.wavelength_policy();
        let spectrum = self.synthesizer.synthesize_resolved(parameters, policy)?;
        let mut contributions = Vec::new();

        if self.mode.uses_primary() {
            let dispersion = parameters
                .vel_disp
                .or(self.velocity_dispersion)
                .ok_or_else(|| {
                    FitError::input_validation(
                        "INPUT.CONFIG_VELDISP",
                        "no velocity dispersion for the primary dataset",
                    )
                })?;
            let broadened = broaden(&spectrum, &spectrum.flux, dispersion, policy)?;
            let ln_noise = parameters
                .noise_scale
                .filter(|_| self.options.noise_inflation.applies_to(false));
            self.accumulate(
                &mut contributions,
                Dataset::Primary,
                &self.primary,
                &broadened,
                ln_noise,
                |name| self.is_included(name),
            )?;
        }

        if let Some(auxiliary) = self.auxiliary.as_ref().filter(|_| self.mode.uses_auxiliary()) {
            let dispersion = match self.mode {
                FitMode::AuxiliaryOnly => parameters
                    .vel_disp
                    .unwrap_or(auxiliary.velocity_dispersion),
                _ => auxiliary.velocity_dispersion,
            };
            let broadened = broaden(
                &spectrum,
                &spectrum.base,
                dispersion,
                WavelengthRangePolicy::BlueOnly,
            )?;
            let ln_noise = parameters
                .noise_scale
                .filter(|_| self.options.noise_inflation.applies_to(true));
            self.accumulate(
                &mut contributions,
                Dataset::Auxiliary,
                &auxiliary.features,
                &broadened,
                ln_noise,
                |_| true,
            )?;
        }

        Ok(contributions)
    }

    fn accumulate(
        &self,
        contributions: &mut Vec<FeatureContribution>,
        dataset: Dataset,
        observed: &ObservedFeatureSet,
        broadened: &BroadenedSpectrum,
        ln_noise: Option<f64>,
        included: impl Fn(&str) -> bool,
    ) -> FitResult<()> {
        let spline = CubicSpline::not_a_knot(&broadened.wavelength, &broadened.flux).map_err(
            |error| FitError::numeric_degeneracy("NUMERIC.MODEL_SPLINE", error.to_string()),
        )?;

        for window in observed.windows() {
            let mut contribution = FeatureContribution {
                name: window.name().to_string(),
                dataset,
                status: FeatureStatus::Excluded,
                chi_square: 0.0,
                samples: window.len(),
            };
            if !included(window.name()) {
                contributions.push(contribution);
                continue;
            }

            let value = normalized_model(window, broadened, &spline).map(|model| {
                chi_square(&window.flux, &window.error, &model, ln_noise)
            });
            match value {
                Ok(value) if value.is_finite() => {
                    contribution.status = FeatureStatus::Included;
                    contribution.chi_square = value;
                }
                Ok(_) => {
                    contribution.status = self.non_finite(
                        dataset,
                        window.name(),
                        FitError::numeric_degeneracy(
                            "NUMERIC.NON_FINITE_RESIDUAL",
                            format!("{} feature {} has non-finite residuals", dataset, window.name()),
                        ),
                    )?;
                }
                Err(error) if error.category() == FitErrorCategory::NumericDegeneracy => {
                    contribution.status = self.non_finite(dataset, window.name(), error)?;
                }
                Err(error) => return Err(error),
            }
            contributions.push(contribution);
        }
        Ok(())
    }

    /// True the first time `(dataset, name)` is seen; a poisoned lock is
    /// recovered.
    fn first_warning(&self, dataset: Dataset, name: &str) -> bool {
        self.warned
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(format!("{}:{}", dataset, name))
    }

    fn non_finite(
        &self,
        dataset: Dataset,
        name: &str,
        error: FitError,
    ) -> FitResult<FeatureStatus> {
        match self.options.nan_policy {
            NanPolicy::FailFast => Err(error),
            NanPolicy::RejectSample => Ok(FeatureStatus::Rejected),
            NanPolicy::ExcludeFeature => {
                if self.first_warning(dataset, name) {
                    warn!(%dataset, feature = name, reason = %error, "excluding feature with non-finite residuals");
                }
                Ok(FeatureStatus::Skipped)
            }
        }
    }
}

fn broaden(
    spectrum: &SyntheticSpectrum,
    flux: &[f64],
    velocity_dispersion: f64,
    policy: WavelengthRangePolicy,
) -> FitResult<BroadenedSpectrum> {
    Ok(broaden_gaussian(BroadeningInput::new(
        &spectrum.wavelength,
        flux,
        velocity_dispersion,
        policy.range(),
    ))?)
}
