use serde::{Deserialize, Serialize};

/// Storage mode of a matrix flowing through the spatial routines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SparsityMode {
    Sparse,
    Dense,
}

/// Spatial error process whose covariance is requested from `W` and a scalar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CovarianceKind {
    /// Spatial moving average: `(I + λW)(I + λW)^T`.
    Sma,
    /// Spatial autoregressive error, see [`SarCovarianceForm`].
    Sar,
    /// Independent unit-variance errors: the identity.
    Independent,
}

/// Which matrix the SAR error covariance builder returns.
///
/// `Documented` is `((I - λW)^T (I - λW))^{-1}`, the covariance of
/// `u = (I - λW)^{-1} ε` with unit-variance `ε`. `Literal` is
/// `(I - λW)^{-1}`, which is what older releases of the estimator actually
/// returned; it is not symmetric in general and is kept only for reproducing
/// those results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SarCovarianceForm {
    #[default]
    Documented,
    Literal,
}

/// Position in a bounded fallback chain. A `Retried` call never escalates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryStage {
    Initial,
    Retried,
}

pub fn default_retry() -> bool {
    true
}

pub fn default_coerce() -> bool {
    true
}

pub fn default_eigen_tolerance() -> f64 {
    1e-10
}

pub fn default_eigen_max_iterations() -> usize {
    1_000
}

pub fn default_row_sum_tolerance() -> f64 {
    1e-8
}

/// Controls for [`crate::eigen::speigen_range_with`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EigenConfig {
    /// Retry a failed dense decomposition on the sparse path.
    #[serde(default = "default_retry")]
    pub retry: bool,
    /// Drop imaginary parts of the extremal eigenvalues.
    #[serde(default = "default_coerce")]
    pub coerce: bool,
    /// Relative residual at which the iterative solver stops.
    #[serde(default = "default_eigen_tolerance")]
    pub tolerance: f64,
    /// Linear solves the iterative solver may spend per eigenvalue.
    #[serde(default = "default_eigen_max_iterations")]
    pub max_iterations: usize,
    /// Absolute tolerance for treating a row sum as 1.
    #[serde(default = "default_row_sum_tolerance")]
    pub row_sum_tolerance: f64,
}

impl Default for EigenConfig {
    fn default() -> Self {
        Self {
            retry: default_retry(),
            coerce: default_coerce(),
            tolerance: default_eigen_tolerance(),
            max_iterations: default_eigen_max_iterations(),
            row_sum_tolerance: default_row_sum_tolerance(),
        }
    }
}

impl EigenConfig {
    pub fn with_flags(retry: bool, coerce: bool) -> Self {
        Self {
            retry,
            coerce,
            ..Self::default()
        }
    }
}

/// Parameter sweep for [`crate::grid::grid_det`].
///
/// Unset bounds come from the eigenvalue range of `W`, an unset step is a
/// thousandth of the range, and an unset grid is the half-open sequence
/// `parmin, parmin + parstep, ...` strictly below `parmax`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GridConfig {
    #[serde(default)]
    pub parmin: Option<f64>,
    #[serde(default)]
    pub parmax: Option<f64>,
    #[serde(default)]
    pub parstep: Option<f64>,
    #[serde(default)]
    pub grid: Option<Vec<f64>>,
}

impl GridConfig {
    /// Fixed bounds and step, e.g. `fixed(-0.99, 0.99, 0.001)`.
    pub fn fixed(parmin: f64, parmax: f64, parstep: f64) -> Self {
        Self {
            parmin: Some(parmin),
            parmax: Some(parmax),
            parstep: Some(parstep),
            grid: None,
        }
    }

    pub fn with_grid(grid: Vec<f64>) -> Self {
        Self {
            grid: Some(grid),
            ..Self::default()
        }
    }
}
