//! Structured reporting of fallback paths.
//!
//! Every routine that recovers from a numerical failure reports what it did
//! through a [`DiagnosticSink`]. The default [`LogSink`] forwards to the `log`
//! facade at warn level; [`RecordingSink`] keeps the events so callers can
//! check which path ran.

use std::fmt;
use std::sync::Mutex;

/// Why a dense sign/log-determinant result was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogdetFailure {
    InfiniteMagnitude,
    ZeroSign,
    CorruptedSign,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
    DenseLogdetFailed { reason: LogdetFailure },
    SparseLogdetRetry,
    MaxEigenNotConverged { row_stochastic: bool },
    RowStochasticMaxEigenvalue,
    DenseEigenFailed { message: String },
    SparseEigenRetry,
    EigenRetryDisabled,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::DenseLogdetFailed { reason } => match reason {
                LogdetFailure::InfiniteMagnitude | LogdetFailure::ZeroSign => {
                    write!(f, "Dense log determinant failed ({reason:?})")
                }
                LogdetFailure::CorruptedSign => {
                    write!(f, "Drastic loss of precision in dense log determinant")
                }
            },
            Diagnostic::SparseLogdetRetry => write!(
                f,
                "Consider passing a sparse weights matrix. Trying sparse determinant..."
            ),
            Diagnostic::MaxEigenNotConverged { row_stochastic } => {
                if *row_stochastic {
                    write!(
                        f,
                        "Maximal eigenvalue computation failed to converge; matrix is row-standardized"
                    )
                } else {
                    write!(
                        f,
                        "Maximal eigenvalue computation failed to converge and matrix is not row-standardized"
                    )
                }
            }
            Diagnostic::RowStochasticMaxEigenvalue => {
                write!(f, "Using the row-stochastic maximal eigenvalue 1.0")
            }
            Diagnostic::DenseEigenFailed { message } => {
                write!(f, "Dense eigenvalue computation failed: {message}")
            }
            Diagnostic::SparseEigenRetry => write!(f, "Retrying with sparse matrix..."),
            Diagnostic::EigenRetryDisabled => write!(f, "Bailing..."),
        }
    }
}

pub trait DiagnosticSink {
    fn emit(&self, diagnostic: Diagnostic);
}

/// Forwards every diagnostic to `log::warn!`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl DiagnosticSink for LogSink {
    fn emit(&self, diagnostic: Diagnostic) {
        log::warn!("{}", diagnostic);
    }
}

/// Collects diagnostics in emission order and also logs them.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<Diagnostic>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Diagnostic> {
        match self.events.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn contains(&self, diagnostic: &Diagnostic) -> bool {
        self.events().iter().any(|d| d == diagnostic)
    }

    pub fn is_empty(&self) -> bool {
        self.events().is_empty()
    }
}

impl DiagnosticSink for RecordingSink {
    fn emit(&self, diagnostic: Diagnostic) {
        log::warn!("{}", diagnostic);
        match self.events.lock() {
            Ok(mut guard) => guard.push(diagnostic),
            Err(poisoned) => poisoned.into_inner().push(diagnostic),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_sink_preserves_emission_order() {
        let sink = RecordingSink::new();
        sink.emit(Diagnostic::DenseLogdetFailed {
            reason: LogdetFailure::ZeroSign,
        });
        sink.emit(Diagnostic::SparseLogdetRetry);
        assert_eq!(
            sink.events(),
            vec![
                Diagnostic::DenseLogdetFailed {
                    reason: LogdetFailure::ZeroSign
                },
                Diagnostic::SparseLogdetRetry
            ]
        );
        assert!(sink.contains(&Diagnostic::SparseLogdetRetry));
        assert!(!sink.contains(&Diagnostic::SparseEigenRetry));
    }
}
