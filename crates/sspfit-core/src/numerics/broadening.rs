//! Gaussian velocity broadening on a log-uniform wavelength grid.

use super::linear_grid;
use crate::common::constants::C_KMS;
use crate::domain::{FitError, WavelengthRange};

const KERNEL_HALF_WIDTH_SIGMAS: f64 = 4.0;
/// Rounding allowance when counting log steps, so log-uniform input keeps
/// its sample count.
const LOG_STEP_SLACK: f64 = 1.0e-9;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BroadeningInput<'a> {
    pub wavelength: &'a [f64],
    pub flux: &'a [f64],
    pub velocity_dispersion: f64,
    pub valid_range: WavelengthRange,
}

impl<'a> BroadeningInput<'a> {
    pub fn new(
        wavelength: &'a [f64],
        flux: &'a [f64],
        velocity_dispersion: f64,
        valid_range: WavelengthRange,
    ) -> Self {
        Self {
            wavelength,
            flux,
            velocity_dispersion,
            valid_range,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BroadenedSpectrum {
    pub wavelength: Vec<f64>,
    pub flux: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BroadeningError {
    #[error("broadening requires at least 2 samples inside the valid range, got {actual}")]
    InsufficientPoints { actual: usize },
    #[error("broadening input length mismatch: wavelength={wavelength}, flux={flux}")]
    LengthMismatch { wavelength: usize, flux: usize },
    #[error("wavelength must be finite and > 0 at index {index}, got {value}")]
    InvalidWavelength { index: usize, value: f64 },
    #[error(
        "wavelength must be strictly increasing, index {index} has {current} after {previous}"
    )]
    NonIncreasingWavelength {
        index: usize,
        previous: f64,
        current: f64,
    },
    #[error("velocity dispersion must be finite and >= 0 km/s, got {value}")]
    InvalidDispersion { value: f64 },
}

impl From<BroadeningError> for FitError {
    fn from(error: BroadeningError) -> Self {
        match error {
            BroadeningError::InvalidDispersion { .. } => {
                FitError::input_validation("INPUT.VELOCITY_DISPERSION", error.to_string())
            }
            _ => FitError::numeric_degeneracy("NUMERIC.BROADENING", error.to_string()),
        }
    }
}

/// Restrict to `valid_range`, resample onto a log-uniform grid no coarser
/// than the finest input step and convolve with a Gaussian of width
/// `σ_pix = σ_v / c / Δlnλ`. The kernel is truncated at 4σ and renormalised
/// where it runs off either end.
pub fn broaden_gaussian(input: BroadeningInput<'_>) -> Result<BroadenedSpectrum, BroadeningError> {
    if !input.velocity_dispersion.is_finite() || input.velocity_dispersion < 0.0 {
        return Err(BroadeningError::InvalidDispersion {
            value: input.velocity_dispersion,
        });
    }
    validate_spectrum(input.wavelength, input.flux)?;

    let (wavelength, flux): (Vec<f64>, Vec<f64>) = input
        .wavelength
        .iter()
        .zip(input.flux)
        .filter(|(lambda, _)| input.valid_range.contains(**lambda))
        .map(|(lambda, value)| (*lambda, *value))
        .unzip();
    if wavelength.len() < 2 {
        return Err(BroadeningError::InsufficientPoints {
            actual: wavelength.len(),
        });
    }

    let resampled = resample_log_uniform(&wavelength, &flux)?;
    if input.velocity_dispersion == 0.0 {
        return Ok(resampled);
    }

    let count = resampled.wavelength.len();
    let log_step = (resampled.wavelength[count - 1].ln() - resampled.wavelength[0].ln())
        / (count - 1) as f64;
    let sigma_pixels = input.velocity_dispersion / C_KMS / log_step;
    let flux = convolve_gaussian(&resampled.flux, sigma_pixels);

    Ok(BroadenedSpectrum {
        wavelength: resampled.wavelength,
        flux,
    })
}

/// Linear resampling onto log-uniform wavelengths spanning the input. The log
/// step is the smallest input step in `ln λ`, rounded down so the grid spans
/// the input exactly; the end points are kept exactly.
pub fn resample_log_uniform(
    wavelength: &[f64],
    flux: &[f64],
) -> Result<BroadenedSpectrum, BroadeningError> {
    validate_spectrum(wavelength, flux)?;
    let samples = wavelength.len();
    let first = wavelength[0];
    let last = wavelength[samples - 1];

    let finest_step = wavelength
        .windows(2)
        .map(|pair| (pair[1] / pair[0]).ln())
        .fold(f64::INFINITY, f64::min);
    let steps = (last / first).ln() / finest_step;
    let count = (steps - LOG_STEP_SLACK).ceil().max(1.0) as usize + 1;

    let log_grid = linear_grid(first.ln(), last.ln(), count)
        .ok_or(BroadeningError::InsufficientPoints { actual: count })?;
    let mut target: Vec<f64> = log_grid.into_iter().map(f64::exp).collect();
    target[0] = first;
    target[count - 1] = last;

    let mut resampled = Vec::with_capacity(count);
    let mut segment = 0;
    for lambda in &target {
        while segment + 2 < samples && wavelength[segment + 1] < *lambda {
            segment += 1;
        }
        let x0 = wavelength[segment];
        let x1 = wavelength[segment + 1];
        let t = ((lambda - x0) / (x1 - x0)).clamp(0.0, 1.0);
        resampled.push(super::lerp(flux[segment], flux[segment + 1], t));
    }

    Ok(BroadenedSpectrum {
        wavelength: target,
        flux: resampled,
    })
}

fn convolve_gaussian(flux: &[f64], sigma_pixels: f64) -> Vec<f64> {
    let half_width = (KERNEL_HALF_WIDTH_SIGMAS * sigma_pixels).ceil() as isize;
    let kernel: Vec<f64> = (-half_width..=half_width)
        .map(|offset| {
            let scaled = offset as f64 / sigma_pixels;
            (-0.5 * scaled * scaled).exp()
        })
        .collect();

    let count = flux.len() as isize;
    (0..count)
        .map(|center| {
            let mut weighted = 0.0;
            let mut norm = 0.0;
            for (kernel_index, weight) in kernel.iter().enumerate() {
                let source = center + kernel_index as isize - half_width;
                if source < 0 || source >= count {
                    continue;
                }
                weighted += weight * flux[source as usize];
                norm += weight;
            }
            weighted / norm
        })
        .collect()
}

fn validate_spectrum(wavelength: &[f64], flux: &[f64]) -> Result<(), BroadeningError> {
    if wavelength.len() != flux.len() {
        return Err(BroadeningError::LengthMismatch {
            wavelength: wavelength.len(),
            flux: flux.len(),
        });
    }
    if wavelength.len() < 2 {
        return Err(BroadeningError::InsufficientPoints {
            actual: wavelength.len(),
        });
    }
    for (index, value) in wavelength.iter().copied().enumerate() {
        if !value.is_finite() || value <= 0.0 {
            return Err(BroadeningError::InvalidWavelength { index, value });
        }
        if index > 0 && value <= wavelength[index - 1] {
            return Err(BroadeningError::NonIncreasingWavelength {
                index,
                previous: wavelength[index - 1],
                current: value,
            });
        }
    }
    Ok(())
}
