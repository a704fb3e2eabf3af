#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SplineError {
    #[error("cubic spline requires at least 2 knots, got {actual}")]
    InsufficientPoints { actual: usize },
    #[error("spline input length mismatch: x={x}, y={y}")]
    LengthMismatch { x: usize, y: usize },
    #[error("spline knot must be finite at index {index}, got {value}")]
    NonFiniteKnot { index: usize, value: f64 },
    #[error("spline knots must be strictly increasing, index {index} has {current} after {previous}")]
    NonIncreasingKnots {
        index: usize,
        previous: f64,
        current: f64,
    },
}

/// Interpolating cubic spline with not-a-knot end conditions: the third
/// derivative is continuous across the second and second-to-last knots, so
/// any cubic is reproduced exactly. Two knots give the straight line and
/// three the interpolating parabola.
#[derive(Debug, Clone, PartialEq)]
pub struct CubicSpline {
    x: Vec<f64>,
    y: Vec<f64>,
    second_derivatives: Vec<f64>,
}

impl CubicSpline {
    pub fn not_a_knot(x: &[f64], y: &[f64]) -> Result<Self, SplineError> {
        validate_knots(x, y)?;

        let count = x.len();
        let h: Vec<f64> = x.windows(2).map(|pair| pair[1] - pair[0]).collect();
        let slope: Vec<f64> = (0..count - 1).map(|i| (y[i + 1] - y[i]) / h[i]).collect();
        let mut second_derivatives = vec![0.0; count];

        match count {
            2 => {}
            3 => second_derivatives.fill(2.0 * (slope[1] - slope[0]) / (x[2] - x[0])),
            _ => {
                let interior = count - 2;
                let mut lower = vec![0.0; interior];
                let mut diagonal = vec![0.0; interior];
                let mut upper = vec![0.0; interior];
                let mut rhs = vec![0.0; interior];
                for row in 0..interior {
                    let i = row + 1;
                    lower[row] = h[i - 1];
                    diagonal[row] = 2.0 * (h[i - 1] + h[i]);
                    upper[row] = h[i];
                    rhs[row] = 6.0 * (slope[i] - slope[i - 1]);
                }

                // M0 = ((h0 + h1)·M1 − h0·M2) / h1, folded into the first row.
                let (h0, h1) = (h[0], h[1]);
                diagonal[0] = (h0 + h1) * (h0 + 2.0 * h1) / h1;
                upper[0] = (h1 * h1 - h0 * h0) / h1;
                // Mirror image at the right end.
                let (ha, hb) = (h[count - 3], h[count - 2]);
                lower[interior - 1] = (ha * ha - hb * hb) / ha;
                diagonal[interior - 1] = (ha + hb) * (2.0 * ha + hb) / ha;

                let solution = solve_tridiagonal(&lower, &diagonal, &upper, &rhs);
                second_derivatives[1..count - 1].copy_from_slice(&solution);
                second_derivatives[0] =
                    ((h0 + h1) * second_derivatives[1] - h0 * second_derivatives[2]) / h1;
                second_derivatives[count - 1] = ((ha + hb) * second_derivatives[count - 2]
                    - hb * second_derivatives[count - 3])
                    / ha;
            }
        }

        Ok(Self {
            x: x.to_vec(),
            y: y.to_vec(),
            second_derivatives,
        })
    }

    pub fn knots(&self) -> &[f64] {
        &self.x
    }

    pub fn domain(&self) -> (f64, f64) {
        (self.x[0], self.x[self.x.len() - 1])
    }

    /// NaN outside the knot range. A query equal to a knot returns that knot's
    /// value exactly.
    pub fn evaluate(&self, t: f64) -> f64 {
        let (low, high) = self.domain();
        if !(t >= low && t <= high) {
            return f64::NAN;
        }
        self.evaluate_segment(self.segment_for(t), t)
    }

    /// Queries outside the knot range are clamped to its ends.
    pub fn evaluate_clamped(&self, t: f64) -> f64 {
        let (low, high) = self.domain();
        let t = t.clamp(low, high);
        self.evaluate_segment(self.segment_for(t), t)
    }

    pub fn evaluate_many(&self, queries: &[f64]) -> Vec<f64> {
        queries.iter().map(|t| self.evaluate(*t)).collect()
    }

    fn segment_for(&self, t: f64) -> usize {
        let last_segment = self.x.len() - 2;
        self.x
            .partition_point(|knot| *knot <= t)
            .saturating_sub(1)
            .min(last_segment)
    }

    fn evaluate_segment(&self, segment: usize, t: f64) -> f64 {
        let x0 = self.x[segment];
        let x1 = self.x[segment + 1];
        let h = x1 - x0;
        let a = (x1 - t) / h;
        let b = (t - x0) / h;
        let curvature = ((a * a * a - a) * self.second_derivatives[segment]
            + (b * b * b - b) * self.second_derivatives[segment + 1])
            * (h * h)
            / 6.0;
        a * self.y[segment] + b * self.y[segment + 1] + curvature
    }
}

fn validate_knots(x: &[f64], y: &[f64]) -> Result<(), SplineError> {
    if x.len() != y.len() {
        return Err(SplineError::LengthMismatch {
            x: x.len(),
            y: y.len(),
        });
    }
    if x.len() < 2 {
        return Err(SplineError::InsufficientPoints { actual: x.len() });
    }
    for (index, value) in x.iter().copied().enumerate() {
        if !value.is_finite() {
            return Err(SplineError::NonFiniteKnot { index, value });
        }
        if index > 0 && value <= x[index - 1] {
            return Err(SplineError::NonIncreasingKnots {
                index,
                previous: x[index - 1],
                current: value,
            });
        }
    }
    Ok(())
}

/// Thomas algorithm without pivoting; `lower[0]` and `upper[last]` are
/// ignored.
fn solve_tridiagonal(lower: &[f64], diagonal: &[f64], upper: &[f64], rhs: &[f64]) -> Vec<f64> {
    let size = diagonal.len();
    let mut modified_upper = vec![0.0; size];
    let mut modified_rhs = vec![0.0; size];

    modified_upper[0] = upper[0] / diagonal[0];
    modified_rhs[0] = rhs[0] / diagonal[0];
    for row in 1..size {
        let denominator = diagonal[row] - lower[row] * modified_upper[row - 1];
        modified_upper[row] = upper[row] / denominator;
        modified_rhs[row] = (rhs[row] - lower[row] * modified_rhs[row - 1]) / denominator;
    }

    let mut solution = vec![0.0; size];
    solution[size - 1] = modified_rhs[size - 1];
    for row in (0..size - 1).rev() {
        solution[row] = modified_rhs[row] - modified_upper[row] * solution[row + 1];
    }
    solution
}
