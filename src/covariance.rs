//! Error covariance matrices of spatial error processes.
//!
//! The builders start from the filter `I ± λW` in the storage mode of `W`
//! and return a dense `n x n` matrix, since these are dense even for very
//! sparse `W`.

use crate::errors::{SpatialError, SpatialResult};
use crate::identity::speye_like;
use crate::inverse::spinv;
use crate::linalg::utils::symmetrize_in_place;
use crate::matrix::WeightsMatrix;
use crate::types::{CovarianceKind, SarCovarianceForm};
use ndarray::Array2;

fn check_parameter(param: f64) -> SpatialResult<()> {
    if param.is_finite() {
        Ok(())
    } else {
        Err(SpatialError::InvalidInput(format!(
            "spatial parameter must be finite, got {param}"
        )))
    }
}

/// `I + sign * param * W` in the mode of `W`.
fn filter(param: f64, sign: f64, matrix: &WeightsMatrix) -> SpatialResult<WeightsMatrix> {
    check_parameter(param)?;
    speye_like(matrix)?.linear_combination(1.0, matrix, sign * param)
}

/// Spatial moving average covariance `(I + λW)(I + λW)^T`.
pub fn sma_covariance(param: f64, matrix: &WeightsMatrix) -> SpatialResult<Array2<f64>> {
    let half = filter(param, 1.0, matrix)?;
    let mut cov = half.dense_outer_product(&half)?;
    symmetrize_in_place(&mut cov);
    Ok(cov)
}

/// Spatial autoregressive error covariance; see [`SarCovarianceForm`].
///
/// Fails with `SingularMatrix` when `I - λW` is singular, e.g. `λ = 1` for a
/// row-stochastic `W`.
pub fn se_covariance(
    param: f64,
    matrix: &WeightsMatrix,
    form: SarCovarianceForm,
) -> SpatialResult<Array2<f64>> {
    let half = filter(param, -1.0, matrix)?;
    let half_inverse = spinv(&half)?;
    match form {
        SarCovarianceForm::Literal => Ok(half_inverse.to_dense()),
        SarCovarianceForm::Documented => {
            // ((I - λW)^T (I - λW))^{-1} = (I - λW)^{-1} (I - λW)^{-T}
            let mut cov = half_inverse.dense_outer_product(&half_inverse)?;
            symmetrize_in_place(&mut cov);
            Ok(cov)
        }
    }
}

/// SAR error precision `(I - λW)^T (I - λW)`, the inverse of the
/// documented [`se_covariance`]. Needs no factorization, so it is defined
/// for every finite `λ`.
pub fn se_precision(param: f64, matrix: &WeightsMatrix) -> SpatialResult<Array2<f64>> {
    let half = filter(param, -1.0, matrix)?;
    let mut precision = half.dense_inner_product(&half)?;
    symmetrize_in_place(&mut precision);
    Ok(precision)
}

/// Covariance of independent unit-variance errors: the dense `n x n`
/// identity. It is also its own precision.
pub fn identity_covariance(matrix: &WeightsMatrix) -> SpatialResult<Array2<f64>> {
    Ok(Array2::eye(matrix.square_dim()?))
}

/// Dispatch on the error process; SAR uses the default form and the
/// independent process ignores `param`.
pub fn covariance(
    kind: CovarianceKind,
    param: f64,
    matrix: &WeightsMatrix,
) -> SpatialResult<Array2<f64>> {
    match kind {
        CovarianceKind::Sma => sma_covariance(param, matrix),
        CovarianceKind::Sar => se_covariance(param, matrix, SarCovarianceForm::default()),
        CovarianceKind::Independent => identity_covariance(matrix),
    }
}
