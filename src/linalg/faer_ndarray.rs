use faer::linalg::solvers;
use faer::{MatRef, Par, Side, get_global_parallelism};
use ndarray::{Array2, ArrayBase, Data, Ix2};
use std::marker::PhantomData;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FaerLinalgError {
    #[error("Input contains non-finite entries")]
    NonFinite,
    #[error("Eigendecomposition failed: {0:?}")]
    Eigen(solvers::EvdError),
    #[error("Cholesky factorization failed: {0:?}")]
    Cholesky(solvers::LltError),
}

/// Products below this many multiply-adds stay on ndarray's `dot`.
const GEMM_MIN_WORK: usize = 64 * 64;
/// Every dimension must reach this before faer is allowed to spawn threads.
const GEMM_PARALLEL_DIM: usize = 128;

fn gemm_parallelism(m: usize, k: usize, n: usize) -> Par {
    if m.min(k).min(n) >= GEMM_PARALLEL_DIM {
        get_global_parallelism()
    } else {
        Par::Seq
    }
}

/// `A * B` for an `(m, k)` and a `(k, n)` operand, through faer's GEMM once
/// the product is large enough to amortize the conversion.
pub fn fast_ab<S1: Data<Elem = f64>, S2: Data<Elem = f64>>(
    a: &ArrayBase<S1, Ix2>,
    b: &ArrayBase<S2, Ix2>,
) -> Array2<f64> {
    use faer::linalg::matmul::matmul;
    use faer::{Accum, Mat};

    let (m, k) = a.dim();
    let n = b.ncols();
    debug_assert_eq!(k, b.nrows(), "inner dimensions of A * B differ");

    if m.saturating_mul(k).saturating_mul(n) < GEMM_MIN_WORK {
        return a.dot(b);
    }

    let lhs = FaerArrayView::new(a);
    let rhs = FaerArrayView::new(b);
    let mut product = Mat::<f64>::zeros(m, n);
    matmul(
        product.as_mut(),
        Accum::Replace,
        lhs.as_ref(),
        rhs.as_ref(),
        1.0,
        gemm_parallelism(m, k, n),
    );
    mat_to_array(product.as_ref())
}

pub(crate) fn mat_to_array(mat: MatRef<'_, f64>) -> Array2<f64> {
    Array2::from_shape_fn((mat.nrows(), mat.ncols()), |(i, j)| mat[(i, j)])
}

enum ViewStorage<'a> {
    Borrowed {
        ptr: *const f64,
        rows: usize,
        cols: usize,
        row_stride: isize,
        col_stride: isize,
        _marker: PhantomData<&'a f64>,
    },
    Owned(Array2<f64>),
}

/// Zero-copy faer view of an ndarray matrix. Arrays with non-positive
/// strides (reversed or broadcast axes) are copied into standard layout
/// first.
pub struct FaerArrayView<'a> {
    storage: ViewStorage<'a>,
}

impl<'a> FaerArrayView<'a> {
    pub fn new<S: Data<Elem = f64>>(array: &'a ArrayBase<S, Ix2>) -> Self {
        let strides = array.strides();
        let storage = if strides.iter().all(|&s| s > 0) {
            ViewStorage::Borrowed {
                ptr: array.as_ptr(),
                rows: array.nrows(),
                cols: array.ncols(),
                row_stride: strides[0],
                col_stride: strides[1],
                _marker: PhantomData,
            }
        } else {
            ViewStorage::Owned(array.as_standard_layout().into_owned())
        };
        Self { storage }
    }

    pub fn as_ref(&self) -> MatRef<'_, f64> {
        match &self.storage {
            ViewStorage::Borrowed {
                ptr,
                rows,
                cols,
                row_stride,
                col_stride,
                ..
            } => {
                // SAFETY: the parts were read from a live ndarray borrowed for
                // 'a with strictly positive strides.
                unsafe { MatRef::from_raw_parts(*ptr, *rows, *cols, *row_stride, *col_stride) }
            }
            ViewStorage::Owned(owned) => {
                let strides = owned.strides();
                // SAFETY: `owned` lives as long as `self` and is in standard
                // layout.
                unsafe {
                    MatRef::from_raw_parts(
                        owned.as_ptr(),
                        owned.nrows(),
                        owned.ncols(),
                        strides[0],
                        strides[1],
                    )
                }
            }
        }
    }
}

/// Eigenvalues of a general (not necessarily symmetric) real matrix, as
/// `(re, im)` pairs in the order faer returns them.
pub trait FaerEigenvalues {
    fn eigenvalues_complex(&self) -> Result<Vec<(f64, f64)>, FaerLinalgError>;
}

impl<S: Data<Elem = f64>> FaerEigenvalues for ArrayBase<S, Ix2> {
    fn eigenvalues_complex(&self) -> Result<Vec<(f64, f64)>, FaerLinalgError> {
        if !self.iter().all(|v| v.is_finite()) {
            return Err(FaerLinalgError::NonFinite);
        }
        let faer_view = FaerArrayView::new(self);
        let values = faer_view
            .as_ref()
            .eigenvalues()
            .map_err(FaerLinalgError::Eigen)?;
        Ok(values.iter().map(|z| (z.re, z.im)).collect())
    }
}

pub struct FaerCholeskyFactor {
    factor: solvers::Llt<f64>,
}

impl FaerCholeskyFactor {
    /// Lower factor `L` with `A = L L^T`; the strict upper triangle is zero.
    pub fn lower_triangular(&self) -> Array2<f64> {
        let mut lower = mat_to_array(self.factor.L());
        let n = lower.nrows();
        for i in 0..n {
            for j in i + 1..n {
                lower[[i, j]] = 0.0;
            }
        }
        lower
    }
}

pub trait FaerCholesky {
    fn cholesky(&self, side: Side) -> Result<FaerCholeskyFactor, FaerLinalgError>;
}

impl<S: Data<Elem = f64>> FaerCholesky for ArrayBase<S, Ix2> {
    fn cholesky(&self, side: Side) -> Result<FaerCholeskyFactor, FaerLinalgError> {
        if !self.iter().all(|v| v.is_finite()) {
            return Err(FaerLinalgError::NonFinite);
        }
        let faer_view = FaerArrayView::new(self);
        let factor = faer_view
            .as_ref()
            .llt(side)
            .map_err(FaerLinalgError::Cholesky)?;
        Ok(FaerCholeskyFactor { factor })
    }
}
