//! Sparse LU with partial pivoting through faer's simplicial factorization.
//!
//! The columns are first reordered by faer's fill-reducing symbolic
//! analysis. faer aborts the numeric phase when a column cancels to an
//! exactly zero pivot inside its nonzero pattern; that case is caught and
//! the matrix is refactored densely, which then decides singularity.

use crate::errors::{SpatialError, SpatialResult};
use crate::linalg::dense_lu::{DenseLu, factorize_dense_lu};
use crate::linalg::utils::sum_log_abs;
use faer::dyn_stack::{MemBuffer, MemStack};
use faer::sparse::linalg::LuError;
use faer::sparse::linalg::lu::factorize_symbolic_lu;
use faer::sparse::linalg::lu::simplicial::{
    SimplicialLu, factorize_simplicial_numeric_lu, factorize_simplicial_numeric_lu_scratch,
};
use faer::sparse::{SparseColMat, SparseColMatRef, Triplet};
use faer::{Conj, Mat, Par};
use faer::perm::PermRef;
use ndarray::{Array1, Array2};
use std::panic::{AssertUnwindSafe, catch_unwind};

#[derive(Clone, Debug)]
struct SimplicialFactor {
    lu: SimplicialLu<usize, f64>,
    row_perm_fwd: Vec<usize>,
    row_perm_inv: Vec<usize>,
    col_perm_fwd: Vec<usize>,
    col_perm_inv: Vec<usize>,
}

#[derive(Clone, Debug)]
enum Factorization {
    Simplicial(SimplicialFactor),
    /// Exact cancellation forced the dense path.
    Dense(DenseLu),
}

#[derive(Clone, Debug)]
pub struct SparseLuFactor {
    n: usize,
    inner: Factorization,
}

pub fn dense_to_sparse(matrix: &Array2<f64>, tol: f64) -> SpatialResult<SparseColMat<usize, f64>> {
    let nrows = matrix.nrows();
    let ncols = matrix.ncols();
    let mut triplets = Vec::new();
    for row in 0..nrows {
        for col in 0..ncols {
            let value = matrix[[row, col]];
            // NaN entries are kept so that corrupted input stays visible.
            if !(value.abs() <= tol) {
                triplets.push(Triplet::new(row, col, value));
            }
        }
    }
    SparseColMat::try_new_from_triplets(nrows, ncols, &triplets).map_err(|_| {
        SpatialError::InvalidInput("failed to convert dense matrix to sparse CSC".to_string())
    })
}

pub fn sparse_to_dense(matrix: &SparseColMat<usize, f64>) -> Array2<f64> {
    let mut out = Array2::<f64>::zeros((matrix.nrows(), matrix.ncols()));
    let (symbolic, values) = matrix.parts();
    let col_ptr = symbolic.col_ptr();
    let row_idx = symbolic.row_idx();
    for col in 0..matrix.ncols() {
        for idx in col_ptr[col]..col_ptr[col + 1] {
            out[[row_idx[idx], col]] += values[idx];
        }
    }
    out
}

pub fn sparse_matvec(matrix: &SparseColMat<usize, f64>, vector: &Array1<f64>) -> Array1<f64> {
    let mut out = Array1::<f64>::zeros(matrix.nrows());
    let (symbolic, values) = matrix.parts();
    let col_ptr = symbolic.col_ptr();
    let row_idx = symbolic.row_idx();
    for col in 0..matrix.ncols() {
        let x = vector[col];
        if x == 0.0 {
            continue;
        }
        for idx in col_ptr[col]..col_ptr[col + 1] {
            out[row_idx[idx]] += values[idx] * x;
        }
    }
    out
}

fn simplicial_factor(
    matrix: SparseColMatRef<'_, usize, f64>,
    col_perm_fwd: Vec<usize>,
    col_perm_inv: Vec<usize>,
) -> Result<SimplicialFactor, LuError> {
    let n = matrix.nrows();
    let mut row_perm_fwd = vec![0usize; n];
    let mut row_perm_inv = vec![0usize; n];
    let mut lu = SimplicialLu::new();
    let mut buffer = MemBuffer::new(factorize_simplicial_numeric_lu_scratch::<usize, f64>(n, n));
    factorize_simplicial_numeric_lu(
        &mut row_perm_fwd,
        &mut row_perm_inv,
        &mut lu,
        matrix,
        PermRef::new_checked(&col_perm_fwd, &col_perm_inv, n),
        MemStack::new(&mut buffer),
    )?;
    Ok(SimplicialFactor {
        lu,
        row_perm_fwd,
        row_perm_inv,
        col_perm_fwd,
        col_perm_inv,
    })
}

pub fn factorize_sparse_lu(matrix: &SparseColMat<usize, f64>) -> SpatialResult<SparseLuFactor> {
    let n = matrix.nrows();
    if matrix.ncols() != n {
        return Err(SpatialError::Shape {
            rows: n,
            cols: matrix.ncols(),
        });
    }
    let symbolic = factorize_symbolic_lu(matrix.symbolic(), Default::default()).map_err(|err| {
        SpatialError::InvalidInput(format!("sparse LU symbolic analysis failed: {err:?}"))
    })?;
    let (fwd, inv) = symbolic.col_perm().arrays();
    let (col_perm_fwd, col_perm_inv) = (fwd.to_vec(), inv.to_vec());

    let attempt = catch_unwind(AssertUnwindSafe(|| {
        simplicial_factor(matrix.as_ref(), col_perm_fwd, col_perm_inv)
    }));
    let inner = match attempt {
        Ok(Ok(factor)) => Factorization::Simplicial(factor),
        Ok(Err(LuError::SymbolicSingular { index })) => {
            return Err(SpatialError::SingularMatrix { step: index });
        }
        Ok(Err(err)) => {
            return Err(SpatialError::InvalidInput(format!(
                "sparse LU factorization failed: {err}"
            )));
        }
        Err(_) => {
            log::warn!("sparse LU met an exactly zero pivot; refactoring the {n}x{n} matrix densely");
            let dense = factorize_dense_lu(sparse_to_dense(matrix).view())?;
            if let Some(step) = dense.first_zero_pivot() {
                return Err(SpatialError::SingularMatrix { step });
            }
            Factorization::Dense(dense)
        }
    };
    Ok(SparseLuFactor { n, inner })
}

impl SimplicialFactor {
    fn row_perm(&self) -> PermRef<'_, usize> {
        PermRef::new_checked(&self.row_perm_fwd, &self.row_perm_inv, self.row_perm_fwd.len())
    }

    fn col_perm(&self) -> PermRef<'_, usize> {
        PermRef::new_checked(&self.col_perm_fwd, &self.col_perm_inv, self.col_perm_fwd.len())
    }

    fn u_diagonal(&self) -> Vec<f64> {
        let u = self.lu.u_factor_unsorted();
        (0..u.ncols())
            .map(|j| {
                u.row_idx_of_col(j)
                    .zip(u.val_of_col(j))
                    .find(|(row, _)| *row == j)
                    .map_or(0.0, |(_, &value)| value)
            })
            .collect()
    }
}

impl SparseLuFactor {
    pub fn dim(&self) -> usize {
        self.n
    }

    /// `sum(ln|u_kk|)`. Pivot signs and the row permutation are not folded in.
    pub fn log_abs_det(&self) -> f64 {
        match &self.inner {
            Factorization::Simplicial(factor) => sum_log_abs(factor.u_diagonal().iter()),
            Factorization::Dense(dense) => dense.slogdet().1,
        }
    }

    /// Overwrites every column of `rhs` with the solution of `A x = rhs`.
    pub(crate) fn solve_in_place(&self, rhs: &mut Mat<f64>) -> SpatialResult<()> {
        if rhs.nrows() != self.n {
            return Err(SpatialError::DimensionMismatch(format!(
                "right-hand side has {} rows but the factor is {n}x{n}",
                rhs.nrows(),
                n = self.n
            )));
        }
        match &self.inner {
            Factorization::Simplicial(factor) => {
                let mut work = Mat::<f64>::zeros(rhs.nrows(), rhs.ncols());
                factor.lu.solve_in_place_with_conj(
                    factor.row_perm(),
                    factor.col_perm(),
                    Conj::No,
                    rhs.as_mut(),
                    Par::Seq,
                    work.as_mut(),
                );
                Ok(())
            }
            Factorization::Dense(dense) => dense.solve_in_place(rhs),
        }
    }

    pub fn solve_vec(&self, rhs: &Array1<f64>) -> SpatialResult<Array1<f64>> {
        let mut x = Mat::<f64>::from_fn(rhs.len(), 1, |i, _| rhs[i]);
        self.solve_in_place(&mut x)?;
        Ok(Array1::from_shape_fn(rhs.len(), |i| x[(i, 0)]))
    }

    /// Inverse assembled from a solve against the identity; exact zeros are
    /// not stored.
    pub fn inverse(&self) -> SpatialResult<SparseColMat<usize, f64>> {
        let n = self.n;
        let mut solved = Mat::<f64>::identity(n, n);
        self.solve_in_place(&mut solved)?;
        let mut triplets = Vec::new();
        for col in 0..n {
            for row in 0..n {
                let value = solved[(row, col)];
                if value != 0.0 {
                    triplets.push(Triplet::new(row, col, value));
                }
            }
        }
        SparseColMat::try_new_from_triplets(n, n, &triplets).map_err(|_| {
            SpatialError::InvalidInput("failed to assemble sparse inverse".to_string())
        })
    }
}
