//! Multivariate normal draws through a Cholesky factor.

use crate::errors::{SpatialError, SpatialResult};
use crate::linalg::faer_ndarray::{FaerCholesky, FaerLinalgError};
use faer::Side;
use ndarray::{Array1, Array2, ArrayView1};
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};

/// Mean vector and lower Cholesky factor of the covariance, ready to draw.
#[derive(Debug, Clone)]
pub struct MvnSampler {
    mean: Array1<f64>,
    lower: Array2<f64>,
}

impl MvnSampler {
    /// Factor `sigma` once; fails with `NotPositiveDefinite` if it has no
    /// Cholesky factor.
    pub fn new(mean: ArrayView1<'_, f64>, sigma: &Array2<f64>) -> SpatialResult<Self> {
        let (rows, cols) = sigma.dim();
        if rows != cols {
            return Err(SpatialError::Shape { rows, cols });
        }
        if mean.len() != rows {
            return Err(SpatialError::DimensionMismatch(format!(
                "mean has length {} but covariance is {rows}x{cols}",
                mean.len()
            )));
        }
        let lower = match sigma.cholesky(Side::Lower) {
            Ok(factor) => factor.lower_triangular(),
            Err(err @ FaerLinalgError::Cholesky(_)) => {
                return Err(SpatialError::NotPositiveDefinite(err));
            }
            Err(err) => return Err(err.into()),
        };
        Ok(Self {
            mean: mean.to_owned(),
            lower,
        })
    }

    pub fn dim(&self) -> usize {
        self.mean.len()
    }

    pub fn mean(&self) -> &Array1<f64> {
        &self.mean
    }

    pub fn lower_factor(&self) -> &Array2<f64> {
        &self.lower
    }

    /// `mean + L e` with `e ~ N(0, I)`.
    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> Array1<f64> {
        let noise: Array1<f64> =
            Array1::from_shape_fn(self.dim(), |_| StandardNormal.sample(&mut *rng));
        &self.mean + &self.lower.dot(&noise)
    }
}

/// One draw from `N(mu, sigma)`.
pub fn chol_mvn<R: Rng + ?Sized>(
    mu: ArrayView1<'_, f64>,
    sigma: &Array2<f64>,
    rng: &mut R,
) -> SpatialResult<Array1<f64>> {
    Ok(MvnSampler::new(mu, sigma)?.draw(rng))
}
