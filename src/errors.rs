use crate::linalg::faer_ndarray::FaerLinalgError;
use thiserror::Error;

pub type SpatialResult<T> = Result<T, SpatialError>;

#[derive(Error)]
pub enum SpatialError {
    #[error("Matrix is not square: {rows} rows by {cols} columns")]
    Shape { rows: usize, cols: usize },

    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error(
        "Iterative eigensolver did not converge within {max_iterations} iterations (last residual {last_residual:.3e})"
    )]
    Convergence {
        max_iterations: usize,
        last_residual: f64,
    },

    #[error("Drastic loss of precision in log-determinant: sign={sign}, log|det|={log_magnitude}")]
    Precision { sign: f64, log_magnitude: f64 },

    #[error("Matrix is exactly singular (zero pivot at step {step})")]
    SingularMatrix { step: usize },

    #[error("Matrix is not positive definite: {0}")]
    NotPositiveDefinite(FaerLinalgError),

    #[error("Extremal eigenvalue {re:.6e}{im:+.6e}i is complex and coercion is disabled")]
    ComplexEigenvalue { re: f64, im: f64 },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Linear algebra backend failed: {0}")]
    Linalg(#[from] FaerLinalgError),
}

// Ensure Debug prints with actual line breaks by delegating to Display
impl core::fmt::Debug for SpatialError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{self}")
    }
}
