//! Extremal eigenvalues of a weights matrix.
//!
//! Dense matrices get a full eigendecomposition. Sparse matrices use an
//! iterative solver for the largest and smallest real eigenvalue only. When
//! the largest-eigenvalue iteration fails on a row-stochastic matrix the
//! theoretical maximum 1.0 is used instead.

use crate::diagnostics::{Diagnostic, DiagnosticSink, LogSink};
use crate::errors::{SpatialError, SpatialResult};
use crate::identity::speye_like;
use crate::linalg::dense_lu::{DenseLu, factorize_dense_lu};
use crate::linalg::faer_ndarray::FaerEigenvalues;
use crate::linalg::sparse_lu::{SparseLuFactor, dense_to_sparse, factorize_sparse_lu};
use crate::matrix::WeightsMatrix;
use crate::types::EigenConfig;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

const IMAG_TOL: f64 = 1e-10;

/// Distance of the first shift beyond the largest absolute row sum,
/// relative to that sum.
const INITIAL_SHIFT_MARGIN: f64 = 1e-2;

/// Solves at one shift before the shift is moved and refactored.
const SOLVES_PER_SHIFT: usize = 20;

/// A shift update keeps at least this fraction of the current distance
/// between the shift and the estimate.
const MIN_SHIFT_RETENTION: f64 = 0.25;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EigenRange {
    pub min: f64,
    pub max: f64,
}

impl EigenRange {
    /// `(1/min, 1/max)`: the interval of autocorrelation parameters `ρ` for
    /// which `I - ρW` stays nonsingular.
    pub fn autocorrelation_bounds(&self) -> (f64, f64) {
        (1.0 / self.min, 1.0 / self.max)
    }
}

/// Iterative solver for one extremal eigenvalue at a time.
pub trait ExtremalEigensolver {
    /// Eigenvalue with the largest real part.
    fn largest_real(&self, matrix: &WeightsMatrix, config: &EigenConfig) -> SpatialResult<f64>;
    /// Eigenvalue with the smallest real part.
    fn smallest_real(&self, matrix: &WeightsMatrix, config: &EigenConfig) -> SpatialResult<f64>;
}

/// Inverse iteration with `(sI - W)^{-1}`, the shift `s` kept beyond the
/// wanted end of the spectrum.
///
/// Every eigenvalue of `W` lies in the disc whose radius is the largest
/// absolute row sum, so the first shift just outside that disc on the
/// requested side has the extremal eigenvalue as its nearest one when the
/// spectrum is real. Every [`SOLVES_PER_SHIFT`] solves the shift moves toward
/// the current estimate, never closer than twice the residual, and `sI - W`
/// is refactored; the ratio `|s - λ₁| / |s - λ₂|` that governs convergence
/// shrinks with it. `max_iterations` in [`EigenConfig`] caps the number of
/// solves. A complex pair at the extremes does not converge and is reported
/// as a convergence failure.
#[derive(Debug, Default, Clone, Copy)]
pub struct ShiftInvertIteration;

fn start_vector(n: usize) -> Array1<f64> {
    // Deterministic and not aligned with the constant vector, which is an
    // eigenvector of every row-stochastic matrix.
    let mut x =
        Array1::from_shape_fn(n, |i| ((i as f64 + 1.0) * 0.618_033_988_749_895).fract() + 0.5);
    let norm = x.dot(&x).sqrt();
    x /= norm;
    x
}

/// LU of `sI - W` in the storage mode of `W`.
enum ShiftedFactor {
    Dense(DenseLu),
    Sparse(SparseLuFactor),
}

impl ShiftedFactor {
    /// `None` when `shift` is itself an eigenvalue of `matrix`.
    fn new(
        matrix: &WeightsMatrix,
        identity: &WeightsMatrix,
        shift: f64,
    ) -> SpatialResult<Option<Self>> {
        let shifted = identity.linear_combination(shift, matrix, -1.0)?;
        let factor = match &shifted {
            WeightsMatrix::Dense(dense) => {
                let lu = factorize_dense_lu(dense.view())?;
                if lu.first_zero_pivot().is_some() {
                    return Ok(None);
                }
                Self::Dense(lu)
            }
            WeightsMatrix::Sparse(sparse) => match factorize_sparse_lu(sparse) {
                Ok(lu) => Self::Sparse(lu),
                Err(SpatialError::SingularMatrix { .. }) => return Ok(None),
                Err(err) => return Err(err),
            },
        };
        Ok(Some(factor))
    }

    fn solve(&self, rhs: &Array1<f64>) -> SpatialResult<Array1<f64>> {
        match self {
            Self::Dense(lu) => lu.solve_vec(rhs),
            Self::Sparse(lu) => lu.solve_vec(rhs),
        }
    }
}

impl ShiftInvertIteration {
    /// Largest real eigenvalue for `side = 1.0`, smallest for `side = -1.0`.
    fn extremal(
        &self,
        matrix: &WeightsMatrix,
        side: f64,
        config: &EigenConfig,
    ) -> SpatialResult<f64> {
        let n = matrix.square_dim()?;
        let radius = matrix.max_abs_row_sum();
        if radius.is_nan() {
            return Err(SpatialError::Convergence {
                max_iterations: config.max_iterations,
                last_residual: f64::NAN,
            });
        }
        if radius == 0.0 {
            return Ok(0.0);
        }
        let identity = speye_like(matrix)?;
        let mut shift = side * radius * (1.0 + INITIAL_SHIFT_MARGIN);
        let mut x = start_vector(n);
        let mut last_residual = f64::INFINITY;
        let mut solves = 0usize;

        'refactor: while solves < config.max_iterations {
            let Some(factor) = ShiftedFactor::new(matrix, &identity, shift)? else {
                log::debug!("shift {shift:.12e} is an eigenvalue after {solves} solves");
                return Ok(shift);
            };
            let mut estimate = shift;
            for _ in 0..SOLVES_PER_SHIFT.min(config.max_iterations - solves) {
                solves += 1;
                let y = factor.solve(&x)?;
                // x has unit norm, so x'y is the Rayleigh quotient of
                // (sI - W)^{-1}, close to 1 / (s - λ).
                let theta = x.dot(&y);
                let y_norm = y.dot(&y).sqrt();
                let lambda = shift - 1.0 / theta;
                // W y - λ y = (s - λ) y - x
                let residual = {
                    let r = &y / theta - &x;
                    r.dot(&r).sqrt() / y_norm
                };
                if residual.is_nan() {
                    last_residual = residual;
                    break 'refactor;
                }
                if residual <= config.tolerance * lambda.abs().max(1.0) {
                    log::debug!(
                        "shift-invert iteration converged after {solves} solves (residual {residual:.3e})"
                    );
                    return Ok(lambda);
                }
                last_residual = residual;
                estimate = lambda;
                x = y / y_norm;
            }
            let distance = side * (shift - estimate);
            if distance > 0.0 {
                let kept = (2.0 * last_residual)
                    .max(MIN_SHIFT_RETENTION * distance)
                    .min(distance);
                shift = estimate + side * kept;
            }
        }
        Err(SpatialError::Convergence {
            max_iterations: config.max_iterations,
            last_residual,
        })
    }
}

impl ExtremalEigensolver for ShiftInvertIteration {
    fn largest_real(&self, matrix: &WeightsMatrix, config: &EigenConfig) -> SpatialResult<f64> {
        self.extremal(matrix, 1.0, config)
    }

    fn smallest_real(&self, matrix: &WeightsMatrix, config: &EigenConfig) -> SpatialResult<f64> {
        self.extremal(matrix, -1.0, config)
    }
}

/// Extremal eigenvalues with the default solver, logging any fallback.
pub fn speigen_range(matrix: &WeightsMatrix, retry: bool, coerce: bool) -> SpatialResult<EigenRange> {
    speigen_range_with(
        matrix,
        &EigenConfig::with_flags(retry, coerce),
        &ShiftInvertIteration,
        &LogSink,
    )
}

pub fn speigen_range_with(
    matrix: &WeightsMatrix,
    config: &EigenConfig,
    solver: &dyn ExtremalEigensolver,
    sink: &dyn DiagnosticSink,
) -> SpatialResult<EigenRange> {
    matrix.square_dim()?;
    match matrix {
        WeightsMatrix::Sparse(_) => sparse_range(matrix, config, solver, sink),
        WeightsMatrix::Dense(dense) => dense_range(dense, config, solver, sink),
    }
}

fn sparse_range(
    matrix: &WeightsMatrix,
    config: &EigenConfig,
    solver: &dyn ExtremalEigensolver,
    sink: &dyn DiagnosticSink,
) -> SpatialResult<EigenRange> {
    let max = match solver.largest_real(matrix, config) {
        Ok(value) => value,
        Err(err @ SpatialError::Convergence { .. }) => {
            let row_stochastic = matrix.is_row_stochastic(config.row_sum_tolerance);
            sink.emit(Diagnostic::MaxEigenNotConverged { row_stochastic });
            if !row_stochastic {
                return Err(err);
            }
            sink.emit(Diagnostic::RowStochasticMaxEigenvalue);
            1.0
        }
        Err(err) => return Err(err),
    };
    let min = solver.smallest_real(matrix, config)?;
    Ok(EigenRange { min, max })
}

fn dense_range(
    dense: &Array2<f64>,
    config: &EigenConfig,
    solver: &dyn ExtremalEigensolver,
    sink: &dyn DiagnosticSink,
) -> SpatialResult<EigenRange> {
    match dense.eigenvalues_complex() {
        Ok(values) => extremal_pair(&values, config.coerce),
        Err(err) => {
            sink.emit(Diagnostic::DenseEigenFailed {
                message: err.to_string(),
            });
            if config.retry {
                sink.emit(Diagnostic::SparseEigenRetry);
                let sparse = WeightsMatrix::from(dense_to_sparse(dense, 0.0)?);
                sparse_range(&sparse, config, solver, sink)
            } else {
                sink.emit(Diagnostic::EigenRetryDisabled);
                Err(err.into())
            }
        }
    }
}

/// Minimum and maximum ordered by real part, then imaginary part.
fn extremal_pair(values: &[(f64, f64)], coerce: bool) -> SpatialResult<EigenRange> {
    let order = |a: &&(f64, f64), b: &&(f64, f64)| a.0.total_cmp(&b.0).then(a.1.total_cmp(&b.1));
    let (Some(&min), Some(&max)) = (values.iter().min_by(order), values.iter().max_by(order))
    else {
        return Err(SpatialError::InvalidInput(
            "cannot take the eigenvalue range of an empty matrix".to_string(),
        ));
    };
    if !coerce {
        for (re, im) in [min, max] {
            if im.abs() > IMAG_TOL * re.abs().max(1.0) {
                return Err(SpatialError::ComplexEigenvalue { re, im });
            }
        }
    }
    Ok(EigenRange {
        min: min.0,
        max: max.0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::RecordingSink;
    use ndarray::array;
    use std::cell::Cell;

    fn queen_lattice(side: usize) -> Array2<f64> {
        let n = side * side;
        Array2::from_shape_fn((n, n), |(a, b)| {
            let (ra, ca) = (a / side, a % side);
            let (rb, cb) = (b / side, b % side);
            if a != b && ra.abs_diff(rb) <= 1 && ca.abs_diff(cb) <= 1 {
                1.0
            } else {
                0.0
            }
        })
    }

    fn row_standardized_queen(side: usize) -> WeightsMatrix {
        WeightsMatrix::dense(queen_lattice(side))
            .and_then(|w| w.row_standardize())
            .expect("lattice weights")
    }

    struct FailingMax;

    impl ExtremalEigensolver for FailingMax {
        fn largest_real(&self, _: &WeightsMatrix, config: &EigenConfig) -> SpatialResult<f64> {
            Err(SpatialError::Convergence {
                max_iterations: config.max_iterations,
                last_residual: f64::NAN,
            })
        }

        fn smallest_real(&self, matrix: &WeightsMatrix, config: &EigenConfig) -> SpatialResult<f64> {
            ShiftInvertIteration.smallest_real(matrix, config)
        }
    }

    #[test]
    fn dense_range_of_symmetric_matrix() {
        let w = WeightsMatrix::dense(array![[2.0, 1.0], [1.0, 2.0]]).expect("square");
        let range = speigen_range(&w, true, true).expect("eigen range");
        assert!((range.min - 1.0).abs() < 1e-12);
        assert!((range.max - 3.0).abs() < 1e-12);
    }

    #[test]
    fn sparse_shift_invert_matches_dense_spectrum() {
        let dense = row_standardized_queen(4);
        let sparse = dense.to_sparse().expect("sparse");
        let exact = speigen_range(&dense, true, true).expect("dense range");
        let iterative = speigen_range(&sparse, true, true).expect("sparse range");
        assert!((exact.max - 1.0).abs() < 1e-10);
        assert!(
            (iterative.max - exact.max).abs() < 1e-6,
            "max: iterative={} exact={}",
            iterative.max,
            exact.max
        );
        assert!(
            (iterative.min - exact.min).abs() < 1e-6,
            "min: iterative={} exact={}",
            iterative.min,
            exact.min
        );
    }

    #[test]
    fn row_stochastic_max_falls_back_to_one() {
        let sparse = row_standardized_queen(3).to_sparse().expect("sparse");
        let sink = RecordingSink::new();
        let range = speigen_range_with(&sparse, &EigenConfig::default(), &FailingMax, &sink)
            .expect("row-stochastic fallback");
        assert_eq!(range.max, 1.0);
        assert!(range.min < 0.0);
        assert!(sink.contains(&Diagnostic::MaxEigenNotConverged {
            row_stochastic: true
        }));
        assert!(sink.contains(&Diagnostic::RowStochasticMaxEigenvalue));
    }

    #[test]
    fn non_stochastic_max_failure_propagates() {
        let sparse = WeightsMatrix::dense(queen_lattice(3))
            .and_then(|w| w.to_sparse())
            .expect("sparse");
        let sink = RecordingSink::new();
        let err = speigen_range_with(&sparse, &EigenConfig::default(), &FailingMax, &sink)
            .expect_err("binary weights are not row-stochastic");
        assert!(matches!(err, SpatialError::Convergence { .. }));
        assert_eq!(
            sink.events(),
            vec![Diagnostic::MaxEigenNotConverged {
                row_stochastic: false
            }]
        );
    }

    #[test]
    fn iteration_budget_exhaustion_is_a_convergence_error() {
        let sparse = WeightsMatrix::dense(queen_lattice(3))
            .and_then(|w| w.to_sparse())
            .expect("sparse");
        let config = EigenConfig {
            max_iterations: 0,
            ..EigenConfig::default()
        };
        assert!(matches!(
            ShiftInvertIteration.largest_real(&sparse, &config),
            Err(SpatialError::Convergence {
                max_iterations: 0,
                ..
            })
        ));
    }

    #[test]
    fn dense_failure_without_retry_bails() {
        let w = WeightsMatrix::dense(array![[f64::NAN, 0.5], [0.5, 0.0]]).expect("square");
        let sink = RecordingSink::new();
        let config = EigenConfig::with_flags(false, true);
        let err = speigen_range_with(&w, &config, &ShiftInvertIteration, &sink)
            .expect_err("NaN input");
        assert!(matches!(err, SpatialError::Linalg(_)));
        assert!(sink.contains(&Diagnostic::EigenRetryDisabled));
        assert!(!sink.contains(&Diagnostic::SparseEigenRetry));
    }

    #[test]
    fn dense_failure_with_retry_returns_sparse_outcome() {
        let w = WeightsMatrix::dense(array![[f64::NAN, 0.5], [0.5, 0.0]]).expect("square");
        let sink = RecordingSink::new();
        let config = EigenConfig {
            max_iterations: 50,
            ..EigenConfig::default()
        };
        let err = speigen_range_with(&w, &config, &ShiftInvertIteration, &sink)
            .expect_err("NaN input cannot converge");
        assert!(matches!(err, SpatialError::Convergence { .. }));
        let events = sink.events();
        assert!(matches!(events[0], Diagnostic::DenseEigenFailed { .. }));
        assert_eq!(events[1], Diagnostic::SparseEigenRetry);
    }

    struct FixedSpectrum {
        saw_sparse: Cell<bool>,
    }

    impl ExtremalEigensolver for FixedSpectrum {
        fn largest_real(&self, matrix: &WeightsMatrix, _: &EigenConfig) -> SpatialResult<f64> {
            self.saw_sparse.set(matrix.is_sparse());
            Ok(0.75)
        }

        fn smallest_real(&self, _: &WeightsMatrix, _: &EigenConfig) -> SpatialResult<f64> {
            Ok(-0.25)
        }
    }

    #[test]
    fn dense_failure_with_retry_returns_sparse_range() {
        let w = WeightsMatrix::dense(array![[f64::NAN, 0.5], [0.5, 0.0]]).expect("square");
        let sink = RecordingSink::new();
        let solver = FixedSpectrum {
            saw_sparse: Cell::new(false),
        };
        let range = speigen_range_with(&w, &EigenConfig::default(), &solver, &sink)
            .expect("sparse retry succeeds");
        assert_eq!(
            range,
            EigenRange {
                min: -0.25,
                max: 0.75
            }
        );
        assert!(solver.saw_sparse.get());
        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], Diagnostic::DenseEigenFailed { .. }));
        assert_eq!(events[1], Diagnostic::SparseEigenRetry);
    }

    #[test]
    fn shift_invert_handles_dense_storage_and_zero_matrices() {
        let w = WeightsMatrix::dense(array![[0.0, 2.0, 0.0], [1.0, 0.0, 1.0], [0.0, 2.0, 0.0]])
            .expect("square");
        // Eigenvalues 0 and ±2.
        let config = EigenConfig::default();
        let max = ShiftInvertIteration.largest_real(&w, &config).expect("largest");
        let min = ShiftInvertIteration.smallest_real(&w, &config).expect("smallest");
        assert!((max - 2.0).abs() < 1e-8, "max = {max}");
        assert!((min + 2.0).abs() < 1e-8, "min = {min}");
        let zero = WeightsMatrix::from(Array2::<f64>::zeros((4, 4)));
        assert_eq!(ShiftInvertIteration.largest_real(&zero, &config).expect("zero"), 0.0);
    }

    #[test]
    fn complex_extremes_require_coercion() {
        let rotation = WeightsMatrix::dense(array![[0.0, -1.0], [1.0, 0.0]]).expect("square");
        assert!(matches!(
            speigen_range(&rotation, true, false),
            Err(SpatialError::ComplexEigenvalue { .. })
        ));
        let coerced = speigen_range(&rotation, true, true).expect("coerced");
        assert!(coerced.min.abs() < 1e-12 && coerced.max.abs() < 1e-12);
    }

    #[test]
    fn autocorrelation_bounds_invert_the_range() {
        let range = EigenRange {
            min: -0.5,
            max: 1.0,
        };
        assert_eq!(range.autocorrelation_bounds(), (-2.0, 1.0));
    }

    #[test]
    fn non_square_input_is_rejected() {
        let rect = WeightsMatrix::from(Array2::<f64>::zeros((3, 2)));
        assert!(matches!(
            speigen_range(&rect, true, true),
            Err(SpatialError::Shape { rows: 3, cols: 2 })
        ));
    }
}
