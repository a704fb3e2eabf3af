//! Elemental-abundance response functions.
//!
//! Each element contributes a fractional deviation `interp(v) / Solar − 1`,
//! where `interp` runs through anchor spectra built from the tabulated
//! abundance variants. Anchor weights depend only on the abundance value, so
//! they are computed once per call and applied row by row.

use crate::common::constants::{
    C_PLUS, CA_MINUS, CA_PLUS, FE_MINUS, FE_PLUS, K_PLUS, MG_PLUS, NA_MINUS, NA_PLUS, NA_PLUS_06,
    NA_PLUS_09, SI_PLUS, SOLAR,
};
use crate::domain::{FitError, FitResult, ResolvedParameters};
use crate::numerics::CubicSpline;
use std::collections::BTreeMap;

const SODIUM_ANCHORS: [f64; 6] = [-0.5, -0.3, 0.0, 0.3, 0.6, 0.9];
const SYMMETRIC_ANCHORS: [f64; 5] = [-0.5, -0.3, 0.0, 0.3, 0.5];
const TWO_POINT_ANCHORS: [f64; 2] = [0.0, 0.3];
const CARBON_ANCHORS: [f64; 3] = [0.0, 0.15, 0.3];

/// Scale that carries a ±0.3 dex variant out to ±0.5 dex.
const HALF_DEX_EXTENSION: f64 = 0.5 / 0.3;

/// Abundance columns interpolated to the requested (age, metallicity),
/// restricted to the synthesis rows.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AbundanceColumns {
    columns: BTreeMap<usize, Vec<f64>>,
}

impl AbundanceColumns {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, index: usize, values: Vec<f64>) {
        self.columns.insert(index, values);
    }

    pub fn column(&self, index: usize) -> FitResult<&[f64]> {
        self.columns
            .get(&index)
            .map(Vec::as_slice)
            .ok_or_else(|| {
                FitError::internal(
                    "SYS.ABUNDANCE_COLUMN",
                    format!("abundance column {} was not interpolated", index),
                )
            })
    }
}

/// Summed elemental (Na, K, Fe, Ca) and alpha contributions, one value per
/// row. Kept apart so the alpha term can be routed to the base spectrum.
#[derive(Debug, Clone, PartialEq)]
pub struct AbundanceContributions {
    pub elemental: Vec<f64>,
    pub alpha: Vec<f64>,
}

impl AbundanceContributions {
    pub fn combined(&self) -> Vec<f64> {
        self.elemental
            .iter()
            .zip(&self.alpha)
            .map(|(elemental, alpha)| elemental + alpha)
            .collect()
    }
}

/// Abundance columns needed by the active abundance parameters.
pub fn required_columns(parameters: &ResolvedParameters) -> Vec<usize> {
    let mut columns = vec![SOLAR];
    if parameters.na.is_some() {
        columns.extend([NA_PLUS, NA_MINUS, NA_PLUS_06, NA_PLUS_09]);
    }
    if parameters.k.is_some() {
        columns.push(K_PLUS);
    }
    if parameters.fe.is_some() {
        columns.extend([FE_PLUS, FE_MINUS]);
    }
    if parameters.ca.is_some() {
        columns.extend([CA_PLUS, CA_MINUS]);
    }
    if parameters.alpha.is_some() {
        columns.extend([CA_PLUS, C_PLUS, MG_PLUS, SI_PLUS]);
    }
    columns.sort_unstable();
    columns.dedup();
    columns
}

pub fn abundance_contributions(
    parameters: &ResolvedParameters,
    columns: &AbundanceColumns,
) -> FitResult<AbundanceContributions> {
    let solar = columns.column(SOLAR)?;
    let mut elemental = vec![0.0; solar.len()];
    let mut alpha = vec![0.0; solar.len()];

    if let Some(value) = parameters.na {
        accumulate(&mut elemental, &sodium_deviation(value, columns)?);
    }
    if let Some(value) = parameters.k {
        accumulate(&mut elemental, &potassium_deviation(value, columns)?);
    }
    if let Some(value) = parameters.fe {
        accumulate(
            &mut elemental,
            &symmetric_deviation(value, columns, FE_PLUS, FE_MINUS)?,
        );
    }
    if let Some(value) = parameters.ca {
        accumulate(
            &mut elemental,
            &symmetric_deviation(value, columns, CA_PLUS, CA_MINUS)?,
        );
    }
    if let Some(value) = parameters.alpha {
        accumulate(&mut alpha, &alpha_deviation(value, columns)?);
    }

    Ok(AbundanceContributions { elemental, alpha })
}

fn accumulate(total: &mut [f64], contribution: &[f64]) {
    for (total, value) in total.iter_mut().zip(contribution) {
        *total += value;
    }
}

fn extend(variant: f64, solar: f64) -> f64 {
    (variant - solar) * HALF_DEX_EXTENSION + solar
}

/// Cubic spline through (−0.5, −0.3, 0, 0.3, 0.6, 0.9) dex.
pub fn sodium_deviation(value: f64, columns: &AbundanceColumns) -> FitResult<Vec<f64>> {
    let solar = columns.column(SOLAR)?;
    let plus = columns.column(NA_PLUS)?;
    let minus = columns.column(NA_MINUS)?;
    let plus_06 = columns.column(NA_PLUS_06)?;
    let plus_09 = columns.column(NA_PLUS_09)?;
    let weights = spline_weights(&SODIUM_ANCHORS, value)?;

    Ok(anchored_deviation(&weights, solar, |row| {
        [
            extend(minus[row], solar[row]),
            minus[row],
            solar[row],
            plus[row],
            plus_06[row],
            plus_09[row],
        ]
    }))
}

/// Only K+ is tabulated; K− mirrors it about Solar.
pub fn potassium_deviation(value: f64, columns: &AbundanceColumns) -> FitResult<Vec<f64>> {
    let solar = columns.column(SOLAR)?;
    let plus = columns.column(K_PLUS)?;
    let weights = linear_weights(&SYMMETRIC_ANCHORS, value);

    Ok(anchored_deviation(&weights, solar, |row| {
        let minus = (2.0 - plus[row] / solar[row]) * solar[row];
        [
            extend(minus, solar[row]),
            minus,
            solar[row],
            plus[row],
            extend(plus[row], solar[row]),
        ]
    }))
}

pub fn symmetric_deviation(
    value: f64,
    columns: &AbundanceColumns,
    plus_column: usize,
    minus_column: usize,
) -> FitResult<Vec<f64>> {
    let solar = columns.column(SOLAR)?;
    let plus = columns.column(plus_column)?;
    let minus = columns.column(minus_column)?;
    let weights = linear_weights(&SYMMETRIC_ANCHORS, value);

    Ok(anchored_deviation(&weights, solar, |row| {
        [
            extend(minus[row], solar[row]),
            minus[row],
            solar[row],
            plus[row],
            extend(plus[row], solar[row]),
        ]
    }))
}

/// Sum of the Ca, C, Mg and Si responses to an alpha enhancement.
pub fn alpha_deviation(value: f64, columns: &AbundanceColumns) -> FitResult<Vec<f64>> {
    let solar = columns.column(SOLAR)?;
    let calcium = columns.column(CA_PLUS)?;
    let carbon = columns.column(C_PLUS)?;
    let magnesium = columns.column(MG_PLUS)?;
    let silicon = columns.column(SI_PLUS)?;

    let two_point = linear_weights(&TWO_POINT_ANCHORS, value);
    let carbon_weights = linear_weights(&CARBON_ANCHORS, value);

    let mut total = anchored_deviation(&two_point, solar, |row| [solar[row], calcium[row]]);
    accumulate(
        &mut total,
        &anchored_deviation(&carbon_weights, solar, |row| {
            [
                solar[row],
                carbon[row],
                (carbon[row] - solar[row]) * 2.0 + solar[row],
            ]
        }),
    );
    accumulate(
        &mut total,
        &anchored_deviation(&two_point, solar, |row| [solar[row], magnesium[row]]),
    );
    accumulate(
        &mut total,
        &anchored_deviation(&two_point, solar, |row| [solar[row], silicon[row]]),
    );
    Ok(total)
}

/// `Σ wₖ·aₖ / Solar − 1` per row; zero weights are skipped so an anchor that
/// coincides with Solar yields exactly zero.
fn anchored_deviation<const N: usize>(
    weights: &[f64; N],
    solar: &[f64],
    anchors_at: impl Fn(usize) -> [f64; N],
) -> Vec<f64> {
    (0..solar.len())
        .map(|row| {
            let anchors = anchors_at(row);
            let value = weights
                .iter()
                .zip(anchors)
                .filter(|(weight, _)| **weight != 0.0)
                .fold(0.0, |sum, (weight, anchor)| sum + weight * anchor);
            value / solar[row] - 1.0
        })
        .collect()
}

/// Piecewise-linear weights, clamped to the anchor range.
fn linear_weights<const N: usize>(anchors: &[f64; N], value: f64) -> [f64; N] {
    let mut weights = [0.0; N];
    let value = value.clamp(anchors[0], anchors[N - 1]);
    if let Some(index) = anchors.iter().position(|anchor| *anchor == value) {
        weights[index] = 1.0;
        return weights;
    }

    let upper = anchors.partition_point(|anchor| *anchor < value);
    let lower = upper - 1;
    let fraction = (value - anchors[lower]) / (anchors[upper] - anchors[lower]);
    weights[lower] = 1.0 - fraction;
    weights[upper] = fraction;
    weights
}

/// Not-a-knot cubic spline weights: the spline of each unit basis vector at
/// `value`, clamped to the anchor range.
fn spline_weights<const N: usize>(anchors: &[f64; N], value: f64) -> FitResult<[f64; N]> {
    let mut weights = [0.0; N];
    for (index, weight) in weights.iter_mut().enumerate() {
        let mut basis = [0.0; N];
        basis[index] = 1.0;
        let spline = CubicSpline::not_a_knot(anchors, &basis)
            .map_err(|error| FitError::internal("SYS.ABUNDANCE_SPLINE", error.to_string()))?;
        *weight = spline.evaluate_clamped(value);
    }
    Ok(weights)
}
