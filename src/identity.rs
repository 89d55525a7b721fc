use crate::errors::{SpatialError, SpatialResult};
use crate::matrix::WeightsMatrix;
use crate::types::SparsityMode;

/// Identity matrix of dimension `size` in the requested storage mode.
pub fn speye(size: usize, mode: SparsityMode) -> SpatialResult<WeightsMatrix> {
    if size == 0 {
        return Err(SpatialError::InvalidInput(
            "identity dimension must be positive".to_string(),
        ));
    }
    WeightsMatrix::identity(size, mode)
}

/// Identity with the dimension and storage mode of `matrix`.
pub fn speye_like(matrix: &WeightsMatrix) -> SpatialResult<WeightsMatrix> {
    let n = matrix.square_dim()?;
    speye(n, matrix.mode())
}
