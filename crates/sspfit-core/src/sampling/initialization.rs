use crate::common::constants::IMF_SLOPES;
use crate::domain::{FitError, FitResult, ParameterKind, ParameterSpace};
use rand::Rng;

/// Draw one starting value for `kind`. IMF slopes start on a tabulated value;
/// everything else is uniform over a start box inside (or, for Na, slightly
/// wider than) the prior.
pub fn initial_value<R: Rng>(kind: ParameterKind, rng: &mut R) -> f64 {
    match kind {
        ParameterKind::Age => rng.random_range(1.0..13.5),
        ParameterKind::Metallicity => rng.random_range(-0.25..0.2),
        ParameterKind::X1 | ParameterKind::X2 => {
            IMF_SLOPES[rng.random_range(0..IMF_SLOPES.len())]
        }
        ParameterKind::Na => rng.random_range(-0.3..1.0),
        ParameterKind::K | ParameterKind::Fe | ParameterKind::Ca => rng.random_range(-0.3..0.3),
        ParameterKind::Alpha => rng.random_range(0.0..0.3),
        ParameterKind::VelDisp => rng.random_range(120.0..360.0),
        ParameterKind::NoiseScale => rng.random_range(-3.0..0.0),
    }
}

/// One position per walker, drawn walker by walker in sampled-parameter order.
pub fn initialize_walkers<R: Rng>(
    space: &ParameterSpace,
    walkers: usize,
    rng: &mut R,
) -> Vec<Vec<f64>> {
    (0..walkers)
        .map(|_| {
            space
                .sampled()
                .iter()
                .map(|kind| initial_value(*kind, rng))
                .collect()
        })
        .collect()
}

/// Validate positions replayed from a chain log before resuming from them.
pub fn restart_positions(
    positions: Vec<Vec<f64>>,
    walkers: usize,
    dimension: usize,
) -> FitResult<Vec<Vec<f64>>> {
    if positions.len() != walkers || positions.iter().any(|row| row.len() != dimension) {
        return Err(FitError::input_validation(
            "INPUT.RESTART_SHAPE",
            format!(
                "restart chain holds {} walkers of width {:?}, expected {} walkers of width {}",
                positions.len(),
                positions.first().map(Vec::len),
                walkers,
                dimension
            ),
        ));
    }
    Ok(positions)
}
