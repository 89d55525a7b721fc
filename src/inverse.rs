use crate::errors::SpatialResult;
use crate::linalg::dense_lu::factorize_dense_lu;
use crate::linalg::sparse_lu::factorize_sparse_lu;
use crate::matrix::WeightsMatrix;

/// Inverse of a square matrix in its own storage mode.
///
/// Sparse input is inverted through a sparse LU and stays sparse, though the
/// inverse of a connected weights filter is usually dense in practice.
/// Singular input fails with `SingularMatrix`.
pub fn spinv(matrix: &WeightsMatrix) -> SpatialResult<WeightsMatrix> {
    matrix.square_dim()?;
    match matrix {
        WeightsMatrix::Sparse(sparse) => {
            let inverse = factorize_sparse_lu(sparse)?.inverse()?;
            Ok(WeightsMatrix::from(inverse))
        }
        WeightsMatrix::Dense(dense) => {
            let inverse = factorize_dense_lu(dense.view())?.inverse()?;
            Ok(WeightsMatrix::from(inverse))
        }
    }
}
