pub mod broadening;
pub mod continuum;
pub mod linalg;
pub mod spline;

pub use broadening::{
    BroadenedSpectrum, BroadeningError, BroadeningInput, broaden_gaussian,
    resample_log_uniform,
};
pub use continuum::{
    ContinuumError, LinearContinuum, PolynomialContinuum, continuum_fit, polynomial_ratio_fit,
};
pub use linalg::{DenseMatrix, LuError, lu_solve};
pub use spline::{CubicSpline, SplineError};

/// Compensated (Kahan) summation.
pub fn stable_sum(values: &[f64]) -> f64 {
    let (sum, _) = values.iter().fold((0.0, 0.0), |(sum, carry): (f64, f64), &value| {
        let adjusted = value - carry;
        let total = sum + adjusted;
        (total, (total - sum) - adjusted)
    });
    sum
}

/// Mean shifted by the first value; a constant slice returns that constant
/// exactly.
pub fn mean(values: &[f64]) -> Option<f64> {
    let pivot = *values.first()?;
    let deviations: Vec<f64> = values.iter().map(|value| value - pivot).collect();
    Some(pivot + stable_sum(&deviations) / values.len() as f64)
}

/// Linear blend of `y0` and `y1`. Exact at both ends and when `y0 == y1`.
pub fn lerp(y0: f64, y1: f64, t: f64) -> f64 {
    if t == 1.0 {
        return y1;
    }
    y0 + (y1 - y0) * t
}

pub fn deterministic_argsort(values: &[f64]) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..values.len()).collect();
    indices.sort_unstable_by(|lhs, rhs| {
        values[*lhs]
            .total_cmp(&values[*rhs])
            .then_with(|| lhs.cmp(rhs))
    });
    indices
}

/// `count` evenly spaced points from `start` to `end`, both ends exact.
pub fn linear_grid(start: f64, end: f64, count: usize) -> Option<Vec<f64>> {
    if count < 2 {
        return None;
    }
    let step = (end - start) / (count - 1) as f64;
    let mut grid: Vec<f64> = (0..count).map(|index| start + step * index as f64).collect();
    grid[count - 1] = end;
    Some(grid)
}

pub fn is_strictly_increasing(values: &[f64]) -> bool {
    values.windows(2).all(|window| window[0] < window[1])
}

/// Linear-interpolated percentile of `values` (`q` in `0..=100`), matching the
/// usual "linear" definition over the sorted sample.
pub fn percentile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() || !(0.0..=100.0).contains(&q) {
        return None;
    }

    let order = deterministic_argsort(values);
    let sorted: Vec<f64> = order.into_iter().map(|index| values[index]).collect();
    let rank = q / 100.0 * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    Some(lerp(sorted[lower], sorted[upper], rank - lower as f64))
}
