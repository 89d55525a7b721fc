//! Signed log-determinants of spatial filter matrices.
//!
//! Dense input goes through a sign/log-magnitude LU. A rejected dense result
//! (infinite magnitude, zero sign, or a sign outside {-1, 1}) is retried once
//! on the sparse representation; the sparse answer is final.
//!
//! The two paths differ on sign: the dense path returns `sign * ln|det|`, the
//! sparse path returns `sum(ln|u_ii|)` with no sign correction. For matrices
//! with positive determinant (e.g. `I - ρW` inside the stability region) the
//! two agree.

use crate::diagnostics::{Diagnostic, DiagnosticSink, LogSink, LogdetFailure};
use crate::errors::{SpatialError, SpatialResult};
use crate::linalg::dense_lu::factorize_dense_lu;
use crate::linalg::sparse_lu::{dense_to_sparse, factorize_sparse_lu};
use crate::matrix::WeightsMatrix;
use crate::types::RetryStage;
use faer::sparse::SparseColMat;
use ndarray::Array2;

/// `sign * ln|det(matrix)|`, reporting fallbacks through `log`.
pub fn splogdet(matrix: &WeightsMatrix) -> SpatialResult<f64> {
    splogdet_with(matrix, &LogSink)
}

pub fn splogdet_with(matrix: &WeightsMatrix, sink: &dyn DiagnosticSink) -> SpatialResult<f64> {
    matrix.square_dim()?;
    match matrix {
        WeightsMatrix::Sparse(sparse) => sparse_logdet(sparse),
        WeightsMatrix::Dense(dense) => dense_logdet(dense, RetryStage::Initial, sink),
    }
}

fn sparse_logdet(matrix: &SparseColMat<usize, f64>) -> SpatialResult<f64> {
    let factor = factorize_sparse_lu(matrix)?;
    let ldet = factor.log_abs_det();
    if ldet.is_nan() {
        return Err(SpatialError::Precision {
            sign: f64::NAN,
            log_magnitude: ldet,
        });
    }
    Ok(ldet)
}

fn classify_dense(sign: f64, log_magnitude: f64) -> Option<LogdetFailure> {
    if log_magnitude.is_infinite() {
        Some(LogdetFailure::InfiniteMagnitude)
    } else if sign == 0.0 {
        Some(LogdetFailure::ZeroSign)
    } else if sign != 1.0 && sign != -1.0 {
        Some(LogdetFailure::CorruptedSign)
    } else {
        None
    }
}

fn dense_logdet(
    matrix: &Array2<f64>,
    stage: RetryStage,
    sink: &dyn DiagnosticSink,
) -> SpatialResult<f64> {
    let (sign, log_magnitude) = factorize_dense_lu(matrix.view())?.slogdet();
    let Some(reason) = classify_dense(sign, log_magnitude) else {
        return Ok(sign * log_magnitude);
    };
    sink.emit(Diagnostic::DenseLogdetFailed { reason });
    match stage {
        RetryStage::Initial => {
            sink.emit(Diagnostic::SparseLogdetRetry);
            sparse_logdet(&dense_to_sparse(matrix, 0.0)?)
        }
        RetryStage::Retried => Err(SpatialError::Precision {
            sign,
            log_magnitude,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::RecordingSink;
    use ndarray::array;

    #[test]
    fn dense_and_sparse_agree_on_positive_determinant() {
        let a = array![[2.0, 0.5, 0.0], [0.3, 1.5, 0.2], [0.0, 0.4, 1.0]];
        let dense = WeightsMatrix::dense(a).expect("square");
        let sparse = dense.to_sparse().expect("sparse");
        let d = splogdet(&dense).expect("dense logdet");
        let s = splogdet(&sparse).expect("sparse logdet");
        assert!((d - s).abs() < 1e-12, "dense={d} sparse={s}");
    }

    #[test]
    fn sign_is_folded_into_dense_but_not_sparse_result() {
        // det = -6
        let a = array![[0.0, 2.0], [3.0, 0.0]];
        let dense = WeightsMatrix::dense(a).expect("square");
        let sparse = dense.to_sparse().expect("sparse");
        let d = splogdet(&dense).expect("dense logdet");
        let s = splogdet(&sparse).expect("sparse logdet");
        assert!((d + 6.0f64.ln()).abs() < 1e-12);
        assert!((s - 6.0f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn singular_dense_retries_once_then_surfaces_sparse_error() {
        let sink = RecordingSink::new();
        let dense = WeightsMatrix::dense(array![[1.0, 2.0], [2.0, 4.0]]).expect("square");
        let err = splogdet_with(&dense, &sink).expect_err("singular matrix");
        assert!(matches!(err, SpatialError::SingularMatrix { .. }));
        let retries = sink
            .events()
            .iter()
            .filter(|d| **d == Diagnostic::SparseLogdetRetry)
            .count();
        assert_eq!(retries, 1);
        assert!(sink.contains(&Diagnostic::DenseLogdetFailed {
            reason: LogdetFailure::InfiniteMagnitude
        }));
    }

    #[test]
    fn corrupted_sign_is_reported_before_retry() {
        let sink = RecordingSink::new();
        let dense = WeightsMatrix::dense(array![[f64::NAN, 1.0], [1.0, 2.0]]).expect("square");
        let result = splogdet_with(&dense, &sink);
        assert!(result.is_err());
        assert_eq!(
            sink.events().first(),
            Some(&Diagnostic::DenseLogdetFailed {
                reason: LogdetFailure::CorruptedSign
            })
        );
        assert!(sink.contains(&Diagnostic::SparseLogdetRetry));
    }

    #[test]
    fn well_conditioned_dense_input_emits_nothing() {
        let sink = RecordingSink::new();
        let dense = WeightsMatrix::dense(array![[3.0, 1.0], [1.0, 2.0]]).expect("square");
        let ldet = splogdet_with(&dense, &sink).expect("logdet");
        assert!((ldet - 5.0f64.ln()).abs() < 1e-12);
        assert!(sink.is_empty());
    }

    #[test]
    fn retried_stage_does_not_escalate_again() {
        let sink = RecordingSink::new();
        let singular = array![[0.0, 0.0], [0.0, 1.0]];
        let err = dense_logdet(&singular, RetryStage::Retried, &sink).expect_err("no retry");
        assert!(matches!(err, SpatialError::Precision { .. }));
        assert!(!sink.contains(&Diagnostic::SparseLogdetRetry));
    }

    #[test]
    fn non_square_input_is_a_shape_error() {
        let rect = WeightsMatrix::from(ndarray::Array2::<f64>::zeros((2, 3)));
        assert!(matches!(
            splogdet(&rect),
            Err(SpatialError::Shape { rows: 2, cols: 3 })
        ));
    }
}
