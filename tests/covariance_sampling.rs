use approx::assert_abs_diff_eq;
use ndarray::{Array1, Array2};
use rand::SeedableRng;
use rand::rngs::StdRng;
use spatial_linalg::{
    CovarianceKind, MvnSampler, SarCovarianceForm, SpatialError, WeightsMatrix, chol_mvn,
    covariance, se_covariance,
};

fn row_standardized_ring(n: usize) -> WeightsMatrix {
    let mut entries = Vec::new();
    for i in 0..n {
        entries.push((i, (i + 1) % n, 1.0));
        entries.push(((i + 1) % n, i, 1.0));
    }
    WeightsMatrix::from_triplets(n, &entries)
        .and_then(|w| w.row_standardize())
        .expect("ring weights")
}

#[test]
fn sar_draws_reproduce_their_covariance() {
    let w = row_standardized_ring(5);
    let sigma = covariance(CovarianceKind::Sar, 0.5, &w).expect("sar covariance");
    let mu = Array1::<f64>::zeros(5);
    let sampler = MvnSampler::new(mu.view(), &sigma).expect("positive definite");
    let mut rng = StdRng::seed_from_u64(20240611);
    let draws = 20_000;
    let mut second_moment = Array2::<f64>::zeros((5, 5));
    for _ in 0..draws {
        let x = sampler.draw(&mut rng);
        for i in 0..5 {
            for j in 0..5 {
                second_moment[[i, j]] += x[i] * x[j];
            }
        }
    }
    second_moment /= draws as f64;
    for i in 0..5 {
        for j in 0..5 {
            assert_abs_diff_eq!(second_moment[[i, j]], sigma[[i, j]], epsilon = 0.08);
        }
    }
}

#[test]
fn sma_and_sar_covariances_feed_the_sampler() {
    let w = row_standardized_ring(6);
    let mu = Array1::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    let mut rng = StdRng::seed_from_u64(3);
    for kind in [CovarianceKind::Sma, CovarianceKind::Sar] {
        let sigma = covariance(kind, -0.4, &w).expect("covariance");
        let draw = chol_mvn(mu.view(), &sigma, &mut rng).expect("draw");
        assert_eq!(draw.len(), 6);
        assert!(draw.iter().all(|v| v.is_finite()));
    }
}

#[test]
fn literal_sar_form_is_not_symmetric_for_asymmetric_weights() {
    let w = WeightsMatrix::from_triplets(3, &[(0, 1, 1.0), (1, 0, 0.5), (1, 2, 0.5), (2, 1, 1.0)])
        .expect("path weights");
    let literal = se_covariance(0.6, &w, SarCovarianceForm::Literal).expect("literal");
    let documented = se_covariance(0.6, &w, SarCovarianceForm::Documented).expect("documented");
    assert!((literal[[0, 1]] - literal[[1, 0]]).abs() > 1e-3);
    assert_eq!(documented, documented.t().to_owned());
}

#[test]
fn singular_sar_filter_is_reported() {
    // Two isolated pairs: I - W is exactly singular.
    let w = WeightsMatrix::from_triplets(4, &[(0, 1, 1.0), (1, 0, 1.0), (2, 3, 1.0), (3, 2, 1.0)])
        .expect("pair weights");
    assert!(matches!(
        covariance(CovarianceKind::Sar, 1.0, &w),
        Err(SpatialError::SingularMatrix { .. })
    ));
}
