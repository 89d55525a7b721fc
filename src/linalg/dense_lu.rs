//! Dense LU with partial pivoting through faer.
//!
//! The factorization itself never fails: an exactly zero pivot is recorded
//! so the sign/log-magnitude pair can report `(0, -inf)` for singular input
//! the same way LAPACK-backed `slogdet` does. Solves and inverses refuse to
//! run on a recorded zero pivot.

use crate::errors::{SpatialError, SpatialResult};
use crate::linalg::faer_ndarray::{FaerArrayView, mat_to_array};
use crate::linalg::utils::sum_log_abs;
use faer::linalg::solvers::{DenseSolveCore, PartialPivLu, Solve};
use faer::Mat;
use faer::perm::PermRef;
use ndarray::{Array1, Array2, ArrayView2};

#[derive(Clone, Debug)]
pub struct DenseLu {
    factor: PartialPivLu<f64>,
    first_zero_pivot: Option<usize>,
}

pub fn factorize_dense_lu(matrix: ArrayView2<'_, f64>) -> SpatialResult<DenseLu> {
    let (n, cols) = matrix.dim();
    if n != cols {
        return Err(SpatialError::Shape { rows: n, cols });
    }
    let view = FaerArrayView::new(&matrix);
    let factor = view.as_ref().partial_piv_lu();
    let first_zero_pivot = (0..n).find(|&k| factor.U()[(k, k)] == 0.0);
    Ok(DenseLu {
        factor,
        first_zero_pivot,
    })
}

/// `+1.0` for an even permutation, `-1.0` for an odd one.
fn permutation_sign(perm: PermRef<'_, usize>) -> f64 {
    let (forward, _) = perm.arrays();
    let mut visited = vec![false; forward.len()];
    let mut transpositions = 0usize;
    for start in 0..forward.len() {
        if visited[start] {
            continue;
        }
        let mut cycle_len = 0usize;
        let mut at = start;
        while !visited[at] {
            visited[at] = true;
            at = forward[at];
            cycle_len += 1;
        }
        transpositions += cycle_len - 1;
    }
    if transpositions % 2 == 0 { 1.0 } else { -1.0 }
}

impl DenseLu {
    pub fn dim(&self) -> usize {
        self.factor.U().nrows()
    }

    /// `(sign, ln|det|)`. Singular input gives `(0, -inf)`; a NaN pivot
    /// poisons the sign so callers can detect the precision loss.
    pub fn slogdet(&self) -> (f64, f64) {
        if self.first_zero_pivot.is_some() {
            return (0.0, f64::NEG_INFINITY);
        }
        let u = self.factor.U();
        let diag: Vec<f64> = (0..self.dim()).map(|k| u[(k, k)]).collect();
        let sign = diag
            .iter()
            .fold(permutation_sign(self.factor.P()), |acc, d| acc * d.signum());
        (sign, sum_log_abs(diag.iter()))
    }

    pub fn first_zero_pivot(&self) -> Option<usize> {
        self.first_zero_pivot
    }

    fn check_nonsingular(&self) -> SpatialResult<()> {
        match self.first_zero_pivot {
            Some(step) => Err(SpatialError::SingularMatrix { step }),
            None => Ok(()),
        }
    }

    /// Overwrites every column of `rhs` with the solution of `A x = rhs`.
    pub(crate) fn solve_in_place(&self, rhs: &mut Mat<f64>) -> SpatialResult<()> {
        self.check_nonsingular()?;
        if rhs.nrows() != self.dim() {
            return Err(SpatialError::DimensionMismatch(format!(
                "right-hand side has {} rows but the factor is {n}x{n}",
                rhs.nrows(),
                n = self.dim()
            )));
        }
        self.factor.solve_in_place(rhs);
        Ok(())
    }

    pub fn solve_vec(&self, rhs: &Array1<f64>) -> SpatialResult<Array1<f64>> {
        let mut x = Mat::<f64>::from_fn(rhs.len(), 1, |i, _| rhs[i]);
        self.solve_in_place(&mut x)?;
        Ok(Array1::from_shape_fn(rhs.len(), |i| x[(i, 0)]))
    }

    pub fn inverse(&self) -> SpatialResult<Array2<f64>> {
        self.check_nonsingular()?;
        Ok(mat_to_array(self.factor.inverse().as_ref()))
    }
}
