use faer::Mat;

/// Dense `(row, col)` table; grid spectra store one wavelength per row.
pub type DenseMatrix = Mat<f64>;

const PIVOT_FLOOR: f64 = 1.0e-15;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LuError {
    #[error("linear system needs a non-empty square matrix, got {rows}x{cols}")]
    Shape { rows: usize, cols: usize },
    #[error("right-hand side has {actual} entries for a {expected}x{expected} system")]
    RhsLength { expected: usize, actual: usize },
    #[error("matrix is singular at pivot {pivot}")]
    Singular { pivot: usize },
}

/// Solve `A·x = b` by Gaussian elimination with partial pivoting. `matrix` is
/// copied; the caller's table is left untouched.
pub fn lu_solve(matrix: &DenseMatrix, rhs: &[f64]) -> Result<Vec<f64>, LuError> {
    let (rows, cols) = (matrix.nrows(), matrix.ncols());
    if rows == 0 || rows != cols {
        return Err(LuError::Shape { rows, cols });
    }
    if rhs.len() != rows {
        return Err(LuError::RhsLength {
            expected: rows,
            actual: rhs.len(),
        });
    }

    let n = rows;
    let mut a = matrix.clone();
    let mut b = rhs.to_vec();

    for k in 0..n {
        let pivot_row = (k..n)
            .max_by(|&lhs, &rhs| a[(lhs, k)].abs().total_cmp(&a[(rhs, k)].abs()))
            .unwrap_or(k);
        if a[(pivot_row, k)].abs() <= PIVOT_FLOOR {
            return Err(LuError::Singular { pivot: k });
        }
        if pivot_row != k {
            for col in 0..n {
                let held = a[(k, col)];
                a[(k, col)] = a[(pivot_row, col)];
                a[(pivot_row, col)] = held;
            }
            b.swap(k, pivot_row);
        }

        for row in (k + 1)..n {
            let factor = a[(row, k)] / a[(k, k)];
            if factor == 0.0 {
                continue;
            }
            for col in k..n {
                a[(row, col)] -= factor * a[(k, col)];
            }
            b[row] -= factor * b[k];
        }
    }

    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = ((row + 1)..n).map(|col| a[(row, col)] * x[col]).sum();
        x[row] = (b[row] - tail) / a[(row, row)];
    }
    Ok(x)
}
