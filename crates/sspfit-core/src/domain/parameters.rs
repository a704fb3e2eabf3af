use super::errors::{FitError, FitResult};
use crate::common::constants::{REFERENCE_X1, REFERENCE_X2};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

/// Every parameter the model understands. Names outside this set are rejected
/// when a run is configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ParameterKind {
    Age,
    Metallicity,
    X1,
    X2,
    Na,
    K,
    Fe,
    Ca,
    Alpha,
    VelDisp,
    NoiseScale,
}

impl ParameterKind {
    pub const ALL: [Self; 11] = [
        Self::Age,
        Self::Metallicity,
        Self::X1,
        Self::X2,
        Self::Na,
        Self::K,
        Self::Fe,
        Self::Ca,
        Self::Alpha,
        Self::VelDisp,
        Self::NoiseScale,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Age => "Age",
            Self::Metallicity => "Z",
            Self::X1 => "x1",
            Self::X2 => "x2",
            Self::Na => "Na",
            Self::K => "K",
            Self::Fe => "Fe",
            Self::Ca => "Ca",
            Self::Alpha => "Alpha",
            Self::VelDisp => "VelDisp",
            Self::NoiseScale => "f",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == name.trim())
    }

    pub fn parse(name: &str) -> FitResult<Self> {
        Self::from_name(name).ok_or_else(|| {
            FitError::input_validation(
                "INPUT.PARAMETER_NAME",
                format!(
                    "unknown parameter '{}'; expected one of {}",
                    name,
                    Self::ALL
                        .iter()
                        .map(|kind| kind.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            )
        })
    }

    pub const fn is_abundance(self) -> bool {
        matches!(
            self,
            Self::Na | Self::K | Self::Fe | Self::Ca | Self::Alpha
        )
    }

    pub const fn is_imf_slope(self) -> bool {
        matches!(self, Self::X1 | Self::X2)
    }
}

impl Display for ParameterKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str((*self).as_str())
    }
}

/// Ordered name → value mapping for the sampled dimensions.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParameterVector {
    entries: Vec<(ParameterKind, f64)>,
}

impl ParameterVector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs(pairs: impl IntoIterator<Item = (ParameterKind, f64)>) -> FitResult<Self> {
        let mut vector = Self::new();
        for (kind, value) in pairs {
            vector.insert(kind, value)?;
        }
        Ok(vector)
    }

    pub fn insert(&mut self, kind: ParameterKind, value: f64) -> FitResult<()> {
        if self.contains(kind) {
            return Err(FitError::input_validation(
                "INPUT.PARAMETER_DUPLICATE",
                format!("parameter '{}' is listed more than once", kind),
            ));
        }
        self.entries.push((kind, value));
        Ok(())
    }

    pub fn get(&self, kind: ParameterKind) -> Option<f64> {
        self.entries
            .iter()
            .find(|(candidate, _)| *candidate == kind)
            .map(|(_, value)| *value)
    }

    pub fn contains(&self, kind: ParameterKind) -> bool {
        self.entries.iter().any(|(candidate, _)| *candidate == kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = ParameterKind> + '_ {
        self.entries.iter().map(|(kind, _)| *kind)
    }

    pub fn values(&self) -> Vec<f64> {
        self.entries.iter().map(|(_, value)| *value).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ParameterKind, f64)> + '_ {
        self.entries.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Parameters held constant for a whole run.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FixedParameters {
    values: BTreeMap<ParameterKind, f64>,
}

impl FixedParameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, kind: ParameterKind, value: f64) -> Self {
        self.values.insert(kind, value);
        self
    }

    pub fn insert(&mut self, kind: ParameterKind, value: f64) -> Option<f64> {
        self.values.insert(kind, value)
    }

    pub fn get(&self, kind: ParameterKind) -> Option<f64> {
        self.values.get(&kind).copied()
    }

    pub fn contains(&self, kind: ParameterKind) -> bool {
        self.values.contains_key(&kind)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ParameterKind, f64)> + '_ {
        self.values.iter().map(|(kind, value)| (*kind, *value))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Merge a sampled vector with the fixed mapping. A name present in both must
/// carry the same value; the fixed entry is the one kept.
pub fn merge_parameters(
    sampled: &ParameterVector,
    fixed: &FixedParameters,
) -> FitResult<ParameterVector> {
    let mut merged = ParameterVector::new();
    for (kind, value) in sampled.iter() {
        match fixed.get(kind) {
            Some(fixed_value) if fixed_value.to_bits() != value.to_bits() => {
                return Err(FitError::parameter_conflict(
                    "PARAM.CONFLICT",
                    format!(
                        "parameter '{}' is sampled ({}) and fixed ({}) at the same time",
                        kind, value, fixed_value
                    ),
                ));
            }
            Some(fixed_value) => merged.insert(kind, fixed_value)?,
            None => merged.insert(kind, value)?,
        }
    }
    for (kind, value) in fixed.iter() {
        if !merged.contains(kind) {
            merged.insert(kind, value)?;
        }
    }
    Ok(merged)
}

/// The sampled dimensions (in sampler order) plus the fixed mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSpace {
    sampled: Vec<ParameterKind>,
    fixed: FixedParameters,
}

impl ParameterSpace {
    pub fn new(sampled: Vec<ParameterKind>, fixed: FixedParameters) -> FitResult<Self> {
        for (index, kind) in sampled.iter().enumerate() {
            if sampled[..index].contains(kind) {
                return Err(FitError::input_validation(
                    "INPUT.PARAMETER_DUPLICATE",
                    format!("parameter '{}' is sampled more than once", kind),
                ));
            }
            if fixed.contains(*kind) {
                return Err(FitError::parameter_conflict(
                    "PARAM.CONFLICT",
                    format!("parameter '{}' is both sampled and fixed", kind),
                ));
            }
        }

        Ok(Self { sampled, fixed })
    }

    /// Build from `name → None` (sampled) / `name → Some(value)` (fixed) pairs,
    /// keeping the given order for sampled names.
    pub fn from_assignments<'a>(
        assignments: impl IntoIterator<Item = (&'a str, Option<f64>)>,
    ) -> FitResult<Self> {
        let mut sampled = Vec::new();
        let mut fixed = FixedParameters::new();
        for (name, value) in assignments {
            let kind = ParameterKind::parse(name)?;
            match value {
                None => sampled.push(kind),
                Some(value) => {
                    if fixed.insert(kind, value).is_some() {
                        return Err(FitError::input_validation(
                            "INPUT.PARAMETER_DUPLICATE",
                            format!("parameter '{}' is fixed more than once", kind),
                        ));
                    }
                }
            }
        }
        Self::new(sampled, fixed)
    }

    pub fn dimension(&self) -> usize {
        self.sampled.len()
    }

    pub fn sampled(&self) -> &[ParameterKind] {
        &self.sampled
    }

    pub fn fixed(&self) -> &FixedParameters {
        &self.fixed
    }

    pub fn is_sampled(&self, kind: ParameterKind) -> bool {
        self.sampled.contains(&kind)
    }

    pub fn contains(&self, kind: ParameterKind) -> bool {
        self.is_sampled(kind) || self.fixed.contains(kind)
    }

    pub fn vector(&self, theta: &[f64]) -> FitResult<ParameterVector> {
        if theta.len() != self.sampled.len() {
            return Err(FitError::input_validation(
                "INPUT.PARAMETER_DIMENSION",
                format!(
                    "expected {} sampled values, got {}",
                    self.sampled.len(),
                    theta.len()
                ),
            ));
        }
        ParameterVector::from_pairs(self.sampled.iter().copied().zip(theta.iter().copied()))
    }

    pub fn resolve(&self, theta: &[f64]) -> FitResult<ResolvedParameters> {
        let sampled = self.vector(theta)?;
        let merged = merge_parameters(&sampled, &self.fixed)?;
        ResolvedParameters::from_vector(&merged)
    }
}

/// Typed view over one merged parameter set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedParameters {
    pub age: f64,
    pub metallicity: f64,
    pub x1: f64,
    pub x2: f64,
    pub na: Option<f64>,
    pub k: Option<f64>,
    pub fe: Option<f64>,
    pub ca: Option<f64>,
    pub alpha: Option<f64>,
    pub vel_disp: Option<f64>,
    pub noise_scale: Option<f64>,
}

impl ResolvedParameters {
    pub fn from_vector(vector: &ParameterVector) -> FitResult<Self> {
        let required = |kind: ParameterKind| {
            vector.get(kind).ok_or_else(|| {
                FitError::input_validation(
                    "INPUT.PARAMETER_MISSING",
                    format!("parameter '{}' must be either sampled or fixed", kind),
                )
            })
        };

        Ok(Self {
            age: required(ParameterKind::Age)?,
            metallicity: required(ParameterKind::Metallicity)?,
            x1: vector.get(ParameterKind::X1).unwrap_or(REFERENCE_X1),
            x2: vector.get(ParameterKind::X2).unwrap_or(REFERENCE_X2),
            na: vector.get(ParameterKind::Na),
            k: vector.get(ParameterKind::K),
            fe: vector.get(ParameterKind::Fe),
            ca: vector.get(ParameterKind::Ca),
            alpha: vector.get(ParameterKind::Alpha),
            vel_disp: vector.get(ParameterKind::VelDisp),
            noise_scale: vector.get(ParameterKind::NoiseScale),
        })
    }

    pub fn abundance(&self, kind: ParameterKind) -> Option<f64> {
        match kind {
            ParameterKind::Na => self.na,
            ParameterKind::K => self.k,
            ParameterKind::Fe => self.fe,
            ParameterKind::Ca => self.ca,
            ParameterKind::Alpha => self.alpha,
            _ => None,
        }
    }

    pub fn has_abundances(&self) -> bool {
        self.na.is_some()
            || self.k.is_some()
            || self.fe.is_some()
            || self.ca.is_some()
            || self.alpha.is_some()
    }
}
