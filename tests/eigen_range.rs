use approx::assert_abs_diff_eq;
use spatial_linalg::{
    EigenConfig, RecordingSink, ShiftInvertIteration, SpatialError, WeightsMatrix,
    speigen_range, speigen_range_with,
};

/// Row-standardized queen contiguity on a `side x side` lattice.
fn queen_lattice(side: usize) -> WeightsMatrix {
    let n = side * side;
    let mut entries = Vec::new();
    for a in 0..n {
        for b in 0..n {
            let (ra, ca) = (a / side, a % side);
            let (rb, cb) = (b / side, b % side);
            if a != b && ra.abs_diff(rb) <= 1 && ca.abs_diff(cb) <= 1 {
                entries.push((a, b, 1.0));
            }
        }
    }
    WeightsMatrix::from_triplets(n, &entries)
        .and_then(|w| w.row_standardize())
        .expect("queen weights")
}

/// Row-standardized rook contiguity. The lattice is bipartite, so the
/// spectrum is symmetric and spans exactly `[-1, 1]`.
fn rook_lattice(side: usize) -> WeightsMatrix {
    let mut entries = Vec::new();
    for r in 0..side {
        for c in 0..side {
            let i = r * side + c;
            if c + 1 < side {
                entries.push((i, i + 1, 1.0));
                entries.push((i + 1, i, 1.0));
            }
            if r + 1 < side {
                entries.push((i, i + side, 1.0));
                entries.push((i + side, i, 1.0));
            }
        }
    }
    WeightsMatrix::from_triplets(side * side, &entries)
        .and_then(|w| w.row_standardize())
        .expect("rook weights")
}

#[test]
fn sparse_range_of_large_lattice_converges() {
    // 45 x 45 = 2025 units: the subdominant eigenvalues sit within a few
    // thousandths of ±1.
    let w = rook_lattice(45);
    assert!(w.is_sparse());
    let sink = RecordingSink::new();
    let range = speigen_range_with(&w, &EigenConfig::default(), &ShiftInvertIteration, &sink)
        .expect("range");
    assert_abs_diff_eq!(range.max, 1.0, epsilon = 1e-8);
    assert_abs_diff_eq!(range.min, -1.0, epsilon = 1e-8);
    assert!(sink.is_empty());
}

#[test]
fn sparse_and_dense_ranges_agree_on_lattice() {
    let sparse = queen_lattice(6);
    let dense = WeightsMatrix::from(sparse.to_dense());
    let exact = speigen_range(&dense, true, true).expect("dense range");
    let iterative = speigen_range(&sparse, true, true).expect("sparse range");
    assert_abs_diff_eq!(exact.max, 1.0, epsilon = 1e-10);
    assert_abs_diff_eq!(iterative.max, exact.max, epsilon = 1e-6);
    assert_abs_diff_eq!(iterative.min, exact.min, epsilon = 1e-6);
    assert!(exact.min < 0.0 && exact.min >= -1.0 - 1e-12);
}

#[test]
fn autocorrelation_bounds_invert_the_range() {
    let range = speigen_range(&queen_lattice(4), true, true).expect("range");
    let (lower, upper) = range.autocorrelation_bounds();
    assert!(lower < -1.0);
    assert_abs_diff_eq!(upper, 1.0 / range.max, epsilon = 1e-15);
}

#[test]
fn clean_runs_emit_no_diagnostics() {
    let sink = RecordingSink::new();
    speigen_range_with(
        &queen_lattice(4),
        &EigenConfig::default(),
        &ShiftInvertIteration,
        &sink,
    )
    .expect("range");
    assert!(sink.is_empty());
}

#[test]
fn non_square_weights_are_rejected() {
    let rect = WeightsMatrix::from(ndarray::Array2::<f64>::zeros((3, 4)));
    assert!(matches!(
        speigen_range(&rect, true, true),
        Err(SpatialError::Shape { rows: 3, cols: 4 })
    ));
}
