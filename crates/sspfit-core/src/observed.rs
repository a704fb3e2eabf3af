//! Observed spectra: text input, de-redshifting and per-feature windows.

use crate::common::features::FeatureDefinition;
use crate::domain::{FitError, FitResult};
use crate::numerics::continuum::{ContinuumModel, continuum_fit};
use crate::numerics::is_strictly_increasing;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum ObservedLoadError {
    #[error("failed to read observed spectrum '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("'{}' line {line}: {reason}", path.display())]
    Parse {
        path: PathBuf,
        line: usize,
        reason: String,
    },
}

impl From<ObservedLoadError> for FitError {
    fn from(error: ObservedLoadError) -> Self {
        match error {
            ObservedLoadError::Read { .. } => {
                FitError::io_system("IO.OBSERVED_READ", error.to_string())
            }
            ObservedLoadError::Parse { .. } => {
                FitError::input_validation("INPUT.OBSERVED_PARSE", error.to_string())
            }
        }
    }
}

/// Wavelength (Å), flux and 1σ error arrays of one observed spectrum.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservedSpectrum {
    wavelength: Vec<f64>,
    flux: Vec<f64>,
    error: Vec<f64>,
}

impl ObservedSpectrum {
    pub fn new(wavelength: Vec<f64>, flux: Vec<f64>, error: Vec<f64>) -> FitResult<Self> {
        if wavelength.len() != flux.len() || wavelength.len() != error.len() {
            return Err(FitError::input_validation(
                "INPUT.OBSERVED_SPECTRUM",
                format!(
                    "observed arrays differ in length: wavelength={}, flux={}, error={}",
                    wavelength.len(),
                    flux.len(),
                    error.len()
                ),
            ));
        }
        if wavelength.len() < 2 {
            return Err(FitError::input_validation(
                "INPUT.OBSERVED_SPECTRUM",
                format!(
                    "observed spectrum needs at least 2 samples, got {}",
                    wavelength.len()
                ),
            ));
        }
        if wavelength.iter().any(|lambda| !lambda.is_finite() || *lambda <= 0.0)
            || !is_strictly_increasing(&wavelength)
        {
            return Err(FitError::input_validation(
                "INPUT.OBSERVED_SPECTRUM",
                "observed wavelengths must be positive, finite and strictly increasing",
            ));
        }

        Ok(Self {
            wavelength,
            flux,
            error,
        })
    }

    pub fn wavelength(&self) -> &[f64] {
        &self.wavelength
    }

    pub fn flux(&self) -> &[f64] {
        &self.flux
    }

    pub fn error(&self) -> &[f64] {
        &self.error
    }

    pub fn len(&self) -> usize {
        self.wavelength.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wavelength.is_empty()
    }

    /// Rest-frame copy: every wavelength divided by `1 + redshift`.
    pub fn deredshift(&self, redshift: f64) -> FitResult<Self> {
        if !redshift.is_finite() || redshift <= -1.0 {
            return Err(FitError::input_validation(
                "INPUT.REDSHIFT",
                format!("redshift must be finite and > -1, got {}", redshift),
            ));
        }
        let scale = 1.0 + redshift;
        Ok(Self {
            wavelength: self.wavelength.iter().map(|lambda| lambda / scale).collect(),
            flux: self.flux.clone(),
            error: self.error.clone(),
        })
    }
}

/// Whitespace three-column table (λ, flux, error); `#` starts a comment line.
pub fn read_observed_spectrum(path: impl AsRef<Path>) -> FitResult<ObservedSpectrum> {
    let path = path.as_ref();
    let source = fs::read_to_string(path).map_err(|source| ObservedLoadError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let mut wavelength = Vec::new();
    let mut flux = Vec::new();
    let mut error = Vec::new();
    for (index, line) in source.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let parse_error = |reason: String| ObservedLoadError::Parse {
            path: path.to_path_buf(),
            line: index + 1,
            reason,
        };
        let values = trimmed
            .split_whitespace()
            .map(|token| token.parse::<f64>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|source| parse_error(source.to_string()))?;
        let [lambda, value, sigma] = values[..] else {
            return Err(parse_error(format!("expected 3 columns, got {}", values.len())).into());
        };
        wavelength.push(lambda);
        flux.push(value);
        error.push(sigma);
    }

    debug!(path = %path.display(), samples = wavelength.len(), "read observed spectrum");
    ObservedSpectrum::new(wavelength, flux, error)
}

/// Observed samples over one feature's `[blue_low, red_high]` window.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureWindow {
    pub feature: FeatureDefinition,
    pub wavelength: Vec<f64>,
    pub flux: Vec<f64>,
    pub error: Vec<f64>,
}

impl FeatureWindow {
    pub fn name(&self) -> &str {
        self.feature.name()
    }

    pub fn len(&self) -> usize {
        self.wavelength.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wavelength.is_empty()
    }
}

/// Feature windows sliced once at start-up; immutable for the run.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ObservedFeatureSet {
    windows: Vec<FeatureWindow>,
}

impl ObservedFeatureSet {
    pub fn new(windows: Vec<FeatureWindow>) -> Self {
        Self { windows }
    }

    /// Slice `spectrum` per feature; with `normalize`, flux and error of
    /// order-1 features are divided by the observed two-point continuum.
    /// Higher-order features stay in observed units.
    pub fn from_spectrum(
        spectrum: &ObservedSpectrum,
        features: &[FeatureDefinition],
        normalize: bool,
    ) -> FitResult<Self> {
        let windows = features
            .iter()
            .map(|feature| slice_feature(spectrum, feature, normalize))
            .collect::<FitResult<Vec<_>>>()?;
        Ok(Self { windows })
    }

    pub fn windows(&self) -> &[FeatureWindow] {
        &self.windows
    }

    pub fn get(&self, name: &str) -> Option<&FeatureWindow> {
        self.windows.iter().find(|window| window.name() == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.windows.iter().map(FeatureWindow::name).collect()
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

fn slice_feature(
    spectrum: &ObservedSpectrum,
    feature: &FeatureDefinition,
    normalize: bool,
) -> FitResult<FeatureWindow> {
    let window = feature.window();
    let mut wavelength = Vec::new();
    let mut flux = Vec::new();
    let mut error = Vec::new();
    for ((lambda, value), sigma) in spectrum
        .wavelength()
        .iter()
        .zip(spectrum.flux())
        .zip(spectrum.error())
    {
        if window.contains(*lambda) {
            wavelength.push(*lambda);
            flux.push(*value);
            error.push(*sigma);
        }
    }
    if wavelength.is_empty() {
        return Err(FitError::input_validation(
            "INPUT.OBSERVED_COVERAGE",
            format!(
                "observed spectrum has no samples in the {} window [{}, {}]",
                feature.name(),
                window.low,
                window.high
            ),
        ));
    }

    if normalize && feature.continuum_order() == 1 {
        let continuum = continuum_fit(&wavelength, &flux, feature.blue(), feature.red())?;
        let levels: Vec<f64> = wavelength
            .iter()
            .map(|lambda| continuum.evaluate(*lambda))
            .collect();
        flux = flux.iter().zip(&levels).map(|(value, level)| value / level).collect();
        error = error.iter().zip(&levels).map(|(sigma, level)| sigma / level).collect();
    }

    Ok(FeatureWindow {
        feature: feature.clone(),
        wavelength,
        flux,
        error,
    })
}

#[cfg(test)]
mod tests {
    use super::{ObservedFeatureSet, ObservedSpectrum, read_observed_spectrum};
    use crate::common::features::{
        Bandpass, FeatureDefinition, near_infrared_features, select_features,
    };
    use crate::domain::FitErrorCategory;
    use std::fs;
    use tempfile::TempDir;

    fn flat_spectrum(level: f64) -> ObservedSpectrum {
        let wavelength: Vec<f64> = (0..4000).map(|index| 8500.0 + index as f64).collect();
        let flux = vec![level; wavelength.len()];
        let error = vec![0.01 * level; wavelength.len()];
        ObservedSpectrum::new(wavelength, flux, error).expect("spectrum")
    }

    #[test]
    fn text_tables_skip_comments_and_blank_lines() {
        let temp = TempDir::new().expect("tempdir");
        let path = temp.path().join("galaxy.txt");
        fs::write(&path, "# lambda flux err\n9000 1.0 0.1\n\n9001 1.1 0.1\n9002 0.9 0.2\n")
            .expect("write");

        let spectrum = read_observed_spectrum(&path).expect("spectrum");
        assert_eq!(spectrum.wavelength(), &[9000.0, 9001.0, 9002.0]);
        assert_eq!(spectrum.flux(), &[1.0, 1.1, 0.9]);
        assert_eq!(spectrum.error(), &[0.1, 0.1, 0.2]);
    }

    #[test]
    fn malformed_rows_and_missing_files_map_to_categories() {
        let temp = TempDir::new().expect("tempdir");
        let path = temp.path().join("bad.txt");
        fs::write(&path, "9000 1.0\n").expect("write");
        let error = read_observed_spectrum(&path).expect_err("two columns");
        assert_eq!(error.placeholder(), "INPUT.OBSERVED_PARSE");

        let error = read_observed_spectrum(temp.path().join("missing.txt")).expect_err("missing");
        assert_eq!(error.category(), FitErrorCategory::IoSystemError);
    }

    #[test]
    fn deredshift_divides_wavelength_only() {
        let spectrum =
            ObservedSpectrum::new(vec![10100.0, 10200.0], vec![1.0, 2.0], vec![0.1, 0.2])
                .expect("spectrum");
        let rest = spectrum.deredshift(0.01).expect("rest frame");
        assert!((rest.wavelength()[0] - 10000.0).abs() < 1.0e-9);
        assert_eq!(rest.flux(), spectrum.flux());
        assert!(spectrum.deredshift(-1.0).is_err());
    }

    #[test]
    fn flat_spectrum_normalises_to_exactly_one() {
        let features = select_features(
            &near_infrared_features(),
            &["FeH".to_string(), "NaI".to_string()],
        )
        .expect("features");
        let set = ObservedFeatureSet::from_spectrum(&flat_spectrum(3.7), &features, true)
            .expect("windows");

        assert_eq!(set.names(), vec!["FeH", "NaI"]);
        for window in set.windows() {
            assert!(window.flux.iter().all(|value| *value == 1.0));
            let first = window.wavelength[0];
            let last = window.wavelength[window.len() - 1];
            assert!(first >= window.feature.blue().low);
            assert!(last <= window.feature.red().high);
        }
    }

    #[test]
    fn polynomial_continuum_features_keep_observed_units() {
        let broad = FeatureDefinition::new(
            "broad",
            Bandpass::new(9000.0, 9010.0),
            Bandpass::new(9010.0, 9090.0),
            Bandpass::new(9090.0, 9100.0),
            3,
        )
        .expect("feature");
        let set = ObservedFeatureSet::from_spectrum(&flat_spectrum(3.7), &[broad], true)
            .expect("windows");

        let window = &set.windows()[0];
        assert_eq!(window.len(), 101);
        assert!(window.flux.iter().all(|value| *value == 3.7));
    }

    #[test]
    fn uncovered_features_are_rejected() {
        let features = select_features(&near_infrared_features(), &["KI_1.25".to_string()])
            .expect("features");
        let spectrum =
            ObservedSpectrum::new(vec![9000.0, 9001.0], vec![1.0, 1.0], vec![0.1, 0.1])
                .expect("spectrum");
        let error = ObservedFeatureSet::from_spectrum(&spectrum, &features, false)
            .expect_err("no coverage");
        assert_eq!(error.placeholder(), "INPUT.OBSERVED_COVERAGE");
    }

    #[test]
    fn arrays_must_agree_in_length() {
        let error = ObservedSpectrum::new(vec![1.0, 2.0], vec![1.0], vec![1.0, 1.0])
            .expect_err("mismatch");
        assert_eq!(error.placeholder(), "INPUT.OBSERVED_SPECTRUM");
    }
}
