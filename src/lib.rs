#![deny(unused_imports)]

//! Linear algebra primitives over spatial weights matrices: identities,
//! log-determinants, eigenvalue ranges, log-determinant grids, inverses,
//! SMA/SAR error covariances and multivariate normal draws.
//!
//! Every routine accepts a [`WeightsMatrix`] in either dense or sparse storage
//! and keeps that storage mode for any matrix it derives from its input.

pub mod covariance;
pub mod diagnostics;
pub mod eigen;
pub mod errors;
pub mod grid;
pub mod identity;
pub mod inverse;
pub mod linalg;
pub mod logdet;
pub mod matrix;
pub mod sampling;
pub mod types;

pub use covariance::{
    covariance, identity_covariance, se_covariance, se_precision, sma_covariance,
};
pub use diagnostics::{Diagnostic, DiagnosticSink, LogSink, LogdetFailure, RecordingSink};
pub use eigen::{
    EigenRange, ExtremalEigensolver, ShiftInvertIteration, speigen_range, speigen_range_with,
};
pub use errors::{SpatialError, SpatialResult};
pub use grid::{ParameterGrid, grid_det, grid_det_with};
pub use identity::{speye, speye_like};
pub use inverse::spinv;
pub use logdet::{splogdet, splogdet_with};
pub use matrix::{SparseWeights, WeightsMatrix};
pub use sampling::{MvnSampler, chol_mvn};
pub use types::{
    CovarianceKind, EigenConfig, GridConfig, RetryStage, SarCovarianceForm, SparsityMode,
};
