//! Flat box priors over the sampled parameters.

use crate::domain::{ParameterKind, ParameterVector};

/// Inclusive prior box for one parameter kind. `f` is sampled as ln f.
pub const fn prior_bounds(kind: ParameterKind) -> (f64, f64) {
    match kind {
        ParameterKind::Age => (1.0, 13.5),
        ParameterKind::Metallicity => (-0.25, 0.2),
        ParameterKind::X1 | ParameterKind::X2 => (0.5, 3.5),
        ParameterKind::Na => (-0.5, 0.9),
        ParameterKind::K | ParameterKind::Fe | ParameterKind::Ca => (-0.5, 0.5),
        ParameterKind::Alpha => (0.0, 0.3),
        ParameterKind::VelDisp => (120.0, 390.0),
        ParameterKind::NoiseScale => (-10.0, 1.0),
    }
}

pub fn within_prior(kind: ParameterKind, value: f64) -> bool {
    let (low, high) = prior_bounds(kind);
    value.is_finite() && value >= low && value <= high
}

/// `0.0` when every sampled value sits inside its box, `−∞` otherwise.
pub fn log_prior(parameters: &ParameterVector) -> f64 {
    if parameters.iter().all(|(kind, value)| within_prior(kind, value)) {
        0.0
    } else {
        f64::NEG_INFINITY
    }
}
