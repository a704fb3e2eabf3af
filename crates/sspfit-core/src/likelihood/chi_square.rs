use crate::numerics::continuum::{ContinuumModel, continuum_fit, polynomial_ratio_fit};
use crate::numerics::{BroadenedSpectrum, CubicSpline};
use crate::observed::FeatureWindow;
use crate::domain::FitResult;
use std::f64::consts::PI;

/// `Σ (obs − model)² / var`, with `var = err²`. When `ln_noise` is set the
/// variance is inflated to `err² + model²·exp(2·ln_noise)` and `ln(2π·var)`
/// is added per sample.
pub fn chi_square(observed: &[f64], error: &[f64], model: &[f64], ln_noise: Option<f64>) -> f64 {
    let inflation = ln_noise.map(|ln_noise| (2.0 * ln_noise).exp());
    observed
        .iter()
        .zip(error)
        .zip(model)
        .map(|((observed, error), model)| {
            let residual = observed - model;
            match inflation {
                Some(inflation) => {
                    let variance = error * error + model * model * inflation;
                    residual * residual / variance + (2.0 * PI * variance).ln()
                }
                None => residual * residual / (error * error),
            }
        })
        .sum()
}

/// Broadened model interpolated at the window's observed wavelengths and
/// divided by the model continuum. Order-1 features use the two-point
/// continuum of the broadened model; higher orders fit a polynomial to
/// `model / data` over the window.
pub fn normalized_model(
    window: &FeatureWindow,
    broadened: &BroadenedSpectrum,
    spline: &CubicSpline,
) -> FitResult<Vec<f64>> {
    let feature = &window.feature;
    let model = spline.evaluate_many(&window.wavelength);

    if feature.continuum_order() > 1 {
        let continuum = polynomial_ratio_fit(
            &window.wavelength,
            &model,
            &window.flux,
            feature.continuum_order(),
        )?;
        return Ok(continuum.normalize(&window.wavelength, &model));
    }

    let continuum = continuum_fit(
        &broadened.wavelength,
        &broadened.flux,
        feature.blue(),
        feature.red(),
    )?;
    Ok(continuum.normalize(&window.wavelength, &model))
}

#[cfg(test)]
mod tests {
    use super::{chi_square, normalized_model};
    use crate::common::features::{Bandpass, FeatureDefinition};
    use crate::numerics::{BroadenedSpectrum, CubicSpline};
    use crate::observed::FeatureWindow;
    use std::f64::consts::PI;

    #[test]
    fn plain_chi_square_weights_by_error() {
        let value = chi_square(&[1.0, 2.0], &[0.5, 1.0], &[0.0, 0.0], None);
        assert_eq!(value, 4.0 + 4.0);
    }

    #[test]
    fn noise_inflation_adds_variance_and_log_terms() {
        let value = chi_square(&[1.0], &[1.0], &[1.0], Some(0.0));
        assert!((value - (2.0 * PI * 2.0).ln()).abs() < 1.0e-12);
    }

    #[test]
    fn flat_model_normalises_to_one() {
        let feature = FeatureDefinition::new(
            "flat",
            Bandpass::new(9000.0, 9010.0),
            Bandpass::new(9010.0, 9020.0),
            Bandpass::new(9020.0, 9030.0),
            1,
        )
        .expect("feature");
        let wavelength: Vec<f64> = (0..41).map(|index| 8995.0 + index as f64).collect();
        let broadened = BroadenedSpectrum {
            flux: vec![2.5; wavelength.len()],
            wavelength,
        };
        let spline = CubicSpline::not_a_knot(&broadened.wavelength, &broadened.flux).expect("spline");
        let window = FeatureWindow {
            feature,
            wavelength: vec![9000.0, 9015.0, 9030.0],
            flux: vec![1.0; 3],
            error: vec![0.1; 3],
        };

        let model = normalized_model(&window, &broadened, &spline).expect("model");
        assert_eq!(model, vec![1.0, 1.0, 1.0]);
    }

    #[test]
    fn higher_orders_scale_the_model_onto_the_data() {
        let feature = FeatureDefinition::new(
            "broad",
            Bandpass::new(9000.0, 9010.0),
            Bandpass::new(9010.0, 9090.0),
            Bandpass::new(9090.0, 9100.0),
            2,
        )
        .expect("feature");
        let wavelength: Vec<f64> = (0..121).map(|index| 8990.0 + index as f64).collect();
        let broadened = BroadenedSpectrum {
            flux: wavelength
                .iter()
                .map(|lambda| 2.0 + 1.0e-3 * (lambda - 9000.0))
                .collect(),
            wavelength,
        };
        let spline = CubicSpline::not_a_knot(&broadened.wavelength, &broadened.flux).expect("spline");
        let observed_wavelength: Vec<f64> = (0..101).map(|index| 9000.0 + index as f64).collect();
        let scale = |lambda: f64| {
            let x = (lambda - 9050.0) / 50.0;
            1.5 + 0.2 * x - 0.1 * x * x
        };
        let flux: Vec<f64> = observed_wavelength
            .iter()
            .map(|lambda| (2.0 + 1.0e-3 * (lambda - 9000.0)) / scale(*lambda))
            .collect();
        let window = FeatureWindow {
            feature,
            wavelength: observed_wavelength,
            error: vec![0.01; flux.len()],
            flux: flux.clone(),
        };

        let model = normalized_model(&window, &broadened, &spline).expect("model");
        for (model, data) in model.iter().zip(&flux) {
            assert!((model - data).abs() < 1.0e-9, "{model} vs {data}");
        }
    }
}
