use super::linalg::{DenseMatrix, LuError, lu_solve};
use super::mean;
use crate::common::features::Bandpass;
use crate::domain::FitError;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ContinuumError {
    #[error("continuum input length mismatch: wavelength={wavelength}, flux={flux}")]
    LengthMismatch { wavelength: usize, flux: usize },
    #[error("{side} continuum window ({low}, {high}) contains no samples")]
    EmptyWindow {
        side: &'static str,
        low: f64,
        high: f64,
    },
    #[error("blue and red continuum windows share the centre {center}")]
    ZeroWidth { center: f64 },
    #[error("polynomial continuum of order {order} needs more than {order} samples, got {actual}")]
    InsufficientPoints { order: usize, actual: usize },
    #[error("polynomial continuum normal equations failed: {0}")]
    Solve(#[from] LuError),
}

impl From<ContinuumError> for FitError {
    fn from(error: ContinuumError) -> Self {
        match error {
            ContinuumError::LengthMismatch { .. } => {
                FitError::internal("SYS.CONTINUUM_INPUT", error.to_string())
            }
            ContinuumError::EmptyWindow { .. } | ContinuumError::ZeroWidth { .. } => {
                FitError::numeric_degeneracy("NUMERIC.CONTINUUM_WINDOW", error.to_string())
            }
            ContinuumError::InsufficientPoints { .. } | ContinuumError::Solve(_) => {
                FitError::numeric_degeneracy("NUMERIC.CONTINUUM_FIT", error.to_string())
            }
        }
    }
}

pub trait ContinuumModel {
    fn evaluate(&self, wavelength: f64) -> f64;

    fn normalize(&self, wavelength: &[f64], flux: &[f64]) -> Vec<f64> {
        wavelength
            .iter()
            .zip(flux)
            .map(|(lambda, value)| value / self.evaluate(*lambda))
            .collect()
    }
}

/// Straight line through the blue and red window means, each placed at the
/// centre of its window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearContinuum {
    pub blue_center: f64,
    pub blue_level: f64,
    pub red_center: f64,
    pub red_level: f64,
}

impl LinearContinuum {
    pub fn slope(&self) -> f64 {
        (self.red_level - self.blue_level) / (self.red_center - self.blue_center)
    }
}

impl ContinuumModel for LinearContinuum {
    fn evaluate(&self, wavelength: f64) -> f64 {
        self.blue_level + self.slope() * (wavelength - self.blue_center)
    }
}

pub fn continuum_fit(
    wavelength: &[f64],
    flux: &[f64],
    blue: Bandpass,
    red: Bandpass,
) -> Result<LinearContinuum, ContinuumError> {
    if wavelength.len() != flux.len() {
        return Err(ContinuumError::LengthMismatch {
            wavelength: wavelength.len(),
            flux: flux.len(),
        });
    }

    let blue_level = window_mean(wavelength, flux, blue, "blue")?;
    let red_level = window_mean(wavelength, flux, red, "red")?;
    let blue_center = blue.center();
    let red_center = red.center();
    if blue_center == red_center {
        return Err(ContinuumError::ZeroWidth {
            center: blue_center,
        });
    }

    Ok(LinearContinuum {
        blue_center,
        blue_level,
        red_center,
        red_level,
    })
}

fn window_mean(
    wavelength: &[f64],
    flux: &[f64],
    window: Bandpass,
    side: &'static str,
) -> Result<f64, ContinuumError> {
    let values: Vec<f64> = wavelength
        .iter()
        .zip(flux)
        .filter(|(lambda, _)| window.contains(**lambda))
        .map(|(_, value)| *value)
        .collect();
    mean(&values).ok_or(ContinuumError::EmptyWindow {
        side,
        low: window.low,
        high: window.high,
    })
}

/// Least-squares polynomial in the scaled coordinate `(λ − center) / scale`;
/// coefficients are stored lowest order first.
#[derive(Debug, Clone, PartialEq)]
pub struct PolynomialContinuum {
    coefficients: Vec<f64>,
    center: f64,
    scale: f64,
}

impl PolynomialContinuum {
    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    pub fn order(&self) -> usize {
        self.coefficients.len() - 1
    }
}

impl ContinuumModel for PolynomialContinuum {
    fn evaluate(&self, wavelength: f64) -> f64 {
        let x = (wavelength - self.center) / self.scale;
        self.coefficients
            .iter()
            .rev()
            .fold(0.0, |accumulated, coefficient| accumulated * x + coefficient)
    }
}

/// Fit `model / data` with a polynomial of the given order, for broad-band
/// features where a two-point continuum is too crude.
pub fn polynomial_ratio_fit(
    wavelength: &[f64],
    model: &[f64],
    data: &[f64],
    order: usize,
) -> Result<PolynomialContinuum, ContinuumError> {
    if wavelength.len() != model.len() || wavelength.len() != data.len() {
        return Err(ContinuumError::LengthMismatch {
            wavelength: wavelength.len(),
            flux: model.len().min(data.len()),
        });
    }

    let samples: Vec<(f64, f64)> = wavelength
        .iter()
        .zip(model.iter().zip(data))
        .map(|(lambda, (model, data))| (*lambda, model / data))
        .filter(|(lambda, ratio)| lambda.is_finite() && ratio.is_finite())
        .collect();
    if samples.len() <= order {
        return Err(ContinuumError::InsufficientPoints {
            order,
            actual: samples.len(),
        });
    }

    let low = samples.first().map_or(0.0, |(lambda, _)| *lambda);
    let high = samples.last().map_or(0.0, |(lambda, _)| *lambda);
    let center = 0.5 * (low + high);
    let scale = if high > low { 0.5 * (high - low) } else { 1.0 };

    let terms = order + 1;
    let mut normal = DenseMatrix::zeros(terms, terms);
    let mut rhs = vec![0.0; terms];
    for (lambda, ratio) in &samples {
        let x = (lambda - center) / scale;
        let mut powers = vec![1.0; terms];
        for power in 1..terms {
            powers[power] = powers[power - 1] * x;
        }
        for row in 0..terms {
            rhs[row] += powers[row] * ratio;
            for col in 0..terms {
                normal[(row, col)] += powers[row] * powers[col];
            }
        }
    }

    let coefficients = lu_solve(&normal, &rhs)?;
    Ok(PolynomialContinuum {
        coefficients,
        center,
        scale,
    })
}

#[cfg(test)]
mod tests {
    use super::{ContinuumError, ContinuumModel, continuum_fit, polynomial_ratio_fit};
    use crate::common::features::Bandpass;
    use crate::domain::{FitError, FitErrorCategory};

    fn wavelength_grid() -> Vec<f64> {
        (0..121).map(|index| 11340.0 + index as f64).collect()
    }

    #[test]
    fn flat_spectrum_normalises_to_exactly_one() {
        let wavelength = wavelength_grid();
        let flux = vec![0.734_519_3; wavelength.len()];
        let continuum = continuum_fit(
            &wavelength,
            &flux,
            Bandpass::new(11340.0, 11370.0),
            Bandpass::new(11417.0, 11447.0),
        )
        .expect("continuum");
        let normalized = continuum.normalize(&wavelength, &flux);
        assert!(normalized.iter().all(|value| *value == 1.0));
    }

    #[test]
    fn linear_spectrum_is_recovered_by_window_means() {
        let wavelength = wavelength_grid();
        let flux: Vec<f64> = wavelength
            .iter()
            .map(|lambda| 1.0 + 1.0e-3 * (lambda - 11340.0))
            .collect();
        let continuum = continuum_fit(
            &wavelength,
            &flux,
            Bandpass::new(11340.0, 11370.0),
            Bandpass::new(11417.0, 11447.0),
        )
        .expect("continuum");
        assert!((continuum.slope() - 1.0e-3).abs() < 1.0e-12);
        assert!((continuum.evaluate(11400.0) - 1.06).abs() < 1.0e-12);
    }

    #[test]
    fn empty_window_is_a_numeric_degeneracy() {
        let wavelength = wavelength_grid();
        let flux = vec![1.0; wavelength.len()];
        let error = continuum_fit(
            &wavelength,
            &flux,
            Bandpass::new(9855.0, 9880.0),
            Bandpass::new(11417.0, 11447.0),
        )
        .expect_err("blue window is empty");
        assert!(matches!(error, ContinuumError::EmptyWindow { side: "blue", .. }));
        let error = FitError::from(error);
        assert_eq!(error.category(), FitErrorCategory::NumericDegeneracy);
        assert_eq!(error.placeholder(), "NUMERIC.CONTINUUM_WINDOW");
    }

    #[test]
    fn coincident_window_centres_are_rejected() {
        let wavelength = wavelength_grid();
        let flux = vec![1.0; wavelength.len()];
        let window = Bandpass::new(11340.0, 11370.0);
        let error = continuum_fit(&wavelength, &flux, window, window).expect_err("zero width");
        assert_eq!(error, ContinuumError::ZeroWidth { center: 11355.0 });
    }

    #[test]
    fn polynomial_fit_recovers_quadratic_ratio() {
        let wavelength = wavelength_grid();
        let data = vec![2.0; wavelength.len()];
        let model: Vec<f64> = wavelength
            .iter()
            .map(|lambda| {
                let x = (lambda - 11400.0) / 60.0;
                2.0 * (1.0 + 0.1 * x - 0.05 * x * x)
            })
            .collect();
        let continuum =
            polynomial_ratio_fit(&wavelength, &model, &data, 2).expect("polynomial continuum");
        assert_eq!(continuum.order(), 2);
        for lambda in [11340.0, 11400.0, 11460.0] {
            let x = (lambda - 11400.0) / 60.0;
            let expected = 1.0 + 0.1 * x - 0.05 * x * x;
            assert!((continuum.evaluate(lambda) - expected).abs() < 1.0e-9);
        }
    }

    #[test]
    fn polynomial_fit_needs_more_samples_than_order() {
        let error = polynomial_ratio_fit(&[1.0, 2.0], &[1.0, 1.0], &[1.0, 1.0], 3)
            .expect_err("too few samples");
        assert_eq!(
            error,
            ContinuumError::InsufficientPoints {
                order: 3,
                actual: 2
            }
        );
    }
}
