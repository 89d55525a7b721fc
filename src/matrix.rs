use crate::errors::{SpatialError, SpatialResult};
use crate::linalg::faer_ndarray::fast_ab;
use crate::linalg::sparse_lu::{dense_to_sparse, sparse_matvec, sparse_to_dense};
use crate::types::SparsityMode;
use faer::sparse::{SparseColMat, Triplet};
use ndarray::{Array1, Array2};
use std::ops::Deref;
use std::sync::{Arc, OnceLock};

#[derive(Clone)]
pub struct SparseWeights {
    matrix: SparseColMat<usize, f64>,
    dense_cache: Arc<OnceLock<Arc<Array2<f64>>>>,
}

impl SparseWeights {
    pub fn new(matrix: SparseColMat<usize, f64>) -> Self {
        Self {
            matrix,
            dense_cache: Arc::new(OnceLock::new()),
        }
    }

    pub fn to_dense_arc(&self) -> Arc<Array2<f64>> {
        self.dense_cache
            .get_or_init(|| Arc::new(sparse_to_dense(&self.matrix)))
            .clone()
    }

    pub fn stored_entries(&self) -> usize {
        self.matrix.parts().1.len()
    }

    /// Visit every stored entry as `(row, col, value)`.
    fn for_each_entry(&self, mut f: impl FnMut(usize, usize, f64)) {
        let (symbolic, values) = self.matrix.parts();
        let col_ptr = symbolic.col_ptr();
        let row_idx = symbolic.row_idx();
        for col in 0..self.matrix.ncols() {
            for idx in col_ptr[col]..col_ptr[col + 1] {
                f(row_idx[idx], col, values[idx]);
            }
        }
    }
}

impl Deref for SparseWeights {
    type Target = SparseColMat<usize, f64>;
    fn deref(&self) -> &Self::Target {
        &self.matrix
    }
}

impl AsRef<SparseColMat<usize, f64>> for SparseWeights {
    fn as_ref(&self) -> &SparseColMat<usize, f64> {
        &self.matrix
    }
}

fn ensure_square_dims(rows: usize, cols: usize) -> SpatialResult<usize> {
    if rows != cols {
        return Err(SpatialError::Shape { rows, cols });
    }
    Ok(rows)
}

/// CSC matrix from triplets; faer sums duplicate coordinates.
fn assemble_csc(
    nrows: usize,
    ncols: usize,
    triplets: &[Triplet<usize, usize, f64>],
) -> SpatialResult<SparseColMat<usize, f64>> {
    if let Some(t) = triplets.iter().find(|t| t.row >= nrows || t.col >= ncols) {
        return Err(SpatialError::InvalidInput(format!(
            "entry ({}, {}) is outside a {nrows}x{ncols} matrix",
            t.row, t.col
        )));
    }
    SparseColMat::try_new_from_triplets(nrows, ncols, triplets).map_err(|_| {
        SpatialError::InvalidInput("failed to assemble sparse matrix from triplets".to_string())
    })
}

/// A spatial weights matrix (or any matrix derived from one) in either
/// storage mode. The variant is the sparsity tag: operations that derive a
/// new matrix from `self` return the same variant.
#[derive(Clone)]
pub enum WeightsMatrix {
    Dense(Array2<f64>),
    Sparse(SparseWeights),
}

impl WeightsMatrix {
    /// Square dense weights matrix.
    pub fn dense(matrix: Array2<f64>) -> SpatialResult<Self> {
        ensure_square_dims(matrix.nrows(), matrix.ncols())?;
        Ok(Self::Dense(matrix))
    }

    /// Square sparse weights matrix.
    pub fn sparse(matrix: SparseColMat<usize, f64>) -> SpatialResult<Self> {
        ensure_square_dims(matrix.nrows(), matrix.ncols())?;
        Ok(Self::Sparse(SparseWeights::new(matrix)))
    }

    /// Sparse `n x n` matrix from `(row, col, value)` entries. Duplicate
    /// coordinates are summed.
    pub fn from_triplets(n: usize, entries: &[(usize, usize, f64)]) -> SpatialResult<Self> {
        let triplets: Vec<_> = entries
            .iter()
            .map(|&(row, col, value)| Triplet::new(row, col, value))
            .collect();
        Ok(Self::Sparse(SparseWeights::new(assemble_csc(n, n, &triplets)?)))
    }

    /// Identity of dimension `n` in the requested mode.
    pub fn identity(n: usize, mode: SparsityMode) -> SpatialResult<Self> {
        match mode {
            SparsityMode::Dense => Ok(Self::Dense(Array2::eye(n))),
            SparsityMode::Sparse => {
                let triplets: Vec<_> = (0..n).map(|i| Triplet::new(i, i, 1.0)).collect();
                Ok(Self::Sparse(SparseWeights::new(assemble_csc(
                    n, n, &triplets,
                )?)))
            }
        }
    }

    pub fn mode(&self) -> SparsityMode {
        match self {
            Self::Dense(_) => SparsityMode::Dense,
            Self::Sparse(_) => SparsityMode::Sparse,
        }
    }

    pub fn is_sparse(&self) -> bool {
        matches!(self, Self::Sparse(_))
    }

    pub fn nrows(&self) -> usize {
        match self {
            Self::Dense(matrix) => matrix.nrows(),
            Self::Sparse(matrix) => matrix.nrows(),
        }
    }

    pub fn ncols(&self) -> usize {
        match self {
            Self::Dense(matrix) => matrix.ncols(),
            Self::Sparse(matrix) => matrix.ncols(),
        }
    }

    /// Dimension of a square matrix, or `ShapeError`.
    pub fn square_dim(&self) -> SpatialResult<usize> {
        ensure_square_dims(self.nrows(), self.ncols())
    }

    pub fn to_dense(&self) -> Array2<f64> {
        match self {
            Self::Dense(matrix) => matrix.clone(),
            Self::Sparse(matrix) => matrix.to_dense_arc().as_ref().clone(),
        }
    }

    pub fn to_dense_arc(&self) -> Arc<Array2<f64>> {
        match self {
            Self::Dense(matrix) => Arc::new(matrix.clone()),
            Self::Sparse(matrix) => matrix.to_dense_arc(),
        }
    }

    /// Same entries in sparse storage; explicit zeros of a dense matrix are
    /// dropped.
    pub fn to_sparse(&self) -> SpatialResult<Self> {
        match self {
            Self::Dense(matrix) => Ok(Self::Sparse(SparseWeights::new(dense_to_sparse(
                matrix, 0.0,
            )?))),
            Self::Sparse(_) => Ok(self.clone()),
        }
    }

    pub fn matrix_vector_multiply(&self, vector: &Array1<f64>) -> Array1<f64> {
        match self {
            Self::Dense(matrix) => matrix.dot(vector),
            Self::Sparse(matrix) => sparse_matvec(matrix, vector),
        }
    }

    pub fn row_sums(&self) -> Array1<f64> {
        match self {
            Self::Dense(matrix) => matrix.sum_axis(ndarray::Axis(1)),
            Self::Sparse(matrix) => {
                let mut sums = Array1::<f64>::zeros(matrix.nrows());
                matrix.for_each_entry(|row, _, value| sums[row] += value);
                sums
            }
        }
    }

    /// Largest absolute row sum, an upper bound on every eigenvalue modulus.
    /// NaN if any row sum is NaN.
    pub fn max_abs_row_sum(&self) -> f64 {
        let mut sums = Array1::<f64>::zeros(self.nrows());
        match self {
            Self::Dense(matrix) => {
                for ((row, _), value) in matrix.indexed_iter() {
                    sums[row] += value.abs();
                }
            }
            Self::Sparse(matrix) => {
                matrix.for_each_entry(|row, _, value| sums[row] += value.abs());
            }
        }
        sums.iter()
            .copied()
            .fold(0.0, |acc, s| if acc.is_nan() || s.is_nan() { f64::NAN } else { acc.max(s) })
    }

    /// Every row sums to 1 within `tol`.
    pub fn is_row_stochastic(&self, tol: f64) -> bool {
        self.nrows() > 0 && self.row_sums().iter().all(|s| (s - 1.0).abs() <= tol)
    }

    /// Divide each row by its sum. Rows summing to zero (islands) stay zero.
    pub fn row_standardize(&self) -> SpatialResult<Self> {
        self.square_dim()?;
        let sums = self.row_sums();
        let scale = |row: usize, value: f64| {
            let s = sums[row];
            if s == 0.0 { value } else { value / s }
        };
        match self {
            Self::Dense(matrix) => {
                let mut out = matrix.clone();
                for ((row, _), value) in out.indexed_iter_mut() {
                    *value = scale(row, *value);
                }
                Ok(Self::Dense(out))
            }
            Self::Sparse(matrix) => {
                let mut triplets = Vec::with_capacity(matrix.stored_entries());
                matrix.for_each_entry(|row, col, value| {
                    triplets.push(Triplet::new(row, col, scale(row, value)));
                });
                Ok(Self::Sparse(SparseWeights::new(assemble_csc(
                    matrix.nrows(),
                    matrix.ncols(),
                    &triplets,
                )?)))
            }
        }
    }

    /// `alpha * self + beta * other`. Both operands must have the same
    /// shape and storage mode; the result keeps that mode.
    pub fn linear_combination(&self, alpha: f64, other: &Self, beta: f64) -> SpatialResult<Self> {
        if self.nrows() != other.nrows() || self.ncols() != other.ncols() {
            return Err(SpatialError::DimensionMismatch(format!(
                "cannot combine a {}x{} matrix with a {}x{} matrix",
                self.nrows(),
                self.ncols(),
                other.nrows(),
                other.ncols()
            )));
        }
        match (self, other) {
            (Self::Dense(a), Self::Dense(b)) => Ok(Self::Dense(a * alpha + b * beta)),
            (Self::Sparse(a), Self::Sparse(b)) => {
                let mut triplets = Vec::with_capacity(a.stored_entries() + b.stored_entries());
                a.for_each_entry(|row, col, value| {
                    triplets.push(Triplet::new(row, col, alpha * value));
                });
                b.for_each_entry(|row, col, value| {
                    triplets.push(Triplet::new(row, col, beta * value));
                });
                Ok(Self::Sparse(SparseWeights::new(assemble_csc(
                    a.nrows(),
                    a.ncols(),
                    &triplets,
                )?)))
            }
            _ => Err(SpatialError::InvalidInput(format!(
                "cannot combine {:?} and {:?} matrices",
                self.mode(),
                other.mode()
            ))),
        }
    }

    pub fn transpose(&self) -> SpatialResult<Self> {
        match self {
            Self::Dense(matrix) => Ok(Self::Dense(matrix.t().to_owned())),
            Self::Sparse(matrix) => {
                let mut triplets = Vec::with_capacity(matrix.stored_entries());
                matrix.for_each_entry(|row, col, value| {
                    triplets.push(Triplet::new(col, row, value));
                });
                Ok(Self::Sparse(SparseWeights::new(assemble_csc(
                    matrix.ncols(),
                    matrix.nrows(),
                    &triplets,
                )?)))
            }
        }
    }

    /// `self * other^T` as a dense matrix.
    pub fn dense_outer_product(&self, other: &Self) -> SpatialResult<Array2<f64>> {
        if self.ncols() != other.ncols() {
            return Err(SpatialError::DimensionMismatch(format!(
                "cannot form A B^T with A {}x{} and B {}x{}",
                self.nrows(),
                self.ncols(),
                other.nrows(),
                other.ncols()
            )));
        }
        let a = self.to_dense_arc();
        let b = other.to_dense_arc();
        Ok(fast_ab(&*a, &b.t()))
    }

    /// `self^T * other` as a dense matrix.
    pub fn dense_inner_product(&self, other: &Self) -> SpatialResult<Array2<f64>> {
        if self.nrows() != other.nrows() {
            return Err(SpatialError::DimensionMismatch(format!(
                "cannot form A^T B with A {}x{} and B {}x{}",
                self.nrows(),
                self.ncols(),
                other.nrows(),
                other.ncols()
            )));
        }
        let a = self.to_dense_arc();
        let b = other.to_dense_arc();
        Ok(fast_ab(&a.t(), &*b))
    }
}

impl std::fmt::Debug for WeightsMatrix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dense(matrix) => f.debug_tuple("Dense").field(matrix).finish(),
            Self::Sparse(matrix) => f
                .debug_struct("Sparse")
                .field("nrows", &matrix.nrows())
                .field("ncols", &matrix.ncols())
                .field("nnz", &matrix.stored_entries())
                .finish(),
        }
    }
}

impl From<Array2<f64>> for WeightsMatrix {
    fn from(value: Array2<f64>) -> Self {
        Self::Dense(value)
    }
}

impl From<&Array2<f64>> for WeightsMatrix {
    fn from(value: &Array2<f64>) -> Self {
        Self::Dense(value.clone())
    }
}

impl From<SparseColMat<usize, f64>> for WeightsMatrix {
    fn from(value: SparseColMat<usize, f64>) -> Self {
        Self::Sparse(SparseWeights::new(value))
    }
}
