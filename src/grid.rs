//! Log-determinants of `I - ρW` over a grid of autocorrelation parameters.
//!
//! Likelihood evaluation for spatial lag and error models needs
//! `ln|I - ρW|` at many `ρ`; tabulating it once and interpolating is the
//! usual shortcut.

use crate::diagnostics::{DiagnosticSink, LogSink};
use crate::eigen::{ShiftInvertIteration, speigen_range_with};
use crate::errors::{SpatialError, SpatialResult};
use crate::identity::speye_like;
use crate::logdet::splogdet_with;
use crate::matrix::WeightsMatrix;
use crate::types::{EigenConfig, GridConfig};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Number of steps the default grid spans between the eigenvalue bounds.
const DEFAULT_STEPS: f64 = 1000.0;

/// Largest grid `arange` will build; each point costs a factorization.
pub const MAX_GRID_POINTS: usize = 1_000_000;

/// Relative slack, in units of the step, for dropping a point that lands on
/// `parmax` through rounding.
const ENDPOINT_SLACK: f64 = 1e-9;

/// Paired parameter values and `ln|I - ρW|`, ascending in `ρ`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterGrid {
    parameters: Vec<f64>,
    log_determinants: Vec<f64>,
}

impl ParameterGrid {
    pub fn parameters(&self) -> &[f64] {
        &self.parameters
    }

    pub fn log_determinants(&self) -> &[f64] {
        &self.log_determinants
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.parameters
            .iter()
            .copied()
            .zip(self.log_determinants.iter().copied())
    }

    /// Two-row table: parameters in row 0, log-determinants in row 1.
    pub fn to_table(&self) -> Array2<f64> {
        let k = self.len();
        Array2::from_shape_fn((2, k), |(row, col)| match row {
            0 => self.parameters[col],
            _ => self.log_determinants[col],
        })
    }

    /// Grid point closest to `rho`; ties go to the smaller parameter.
    pub fn nearest(&self, rho: f64) -> Option<(f64, f64)> {
        if rho.is_nan() {
            return None;
        }
        self.iter()
            .min_by(|a, b| (a.0 - rho).abs().total_cmp(&(b.0 - rho).abs()))
    }

    /// Linear interpolation of `ln|I - ρW|`. `None` outside the grid.
    pub fn interpolate(&self, rho: f64) -> Option<f64> {
        let first = *self.parameters.first()?;
        let last = *self.parameters.last()?;
        if !(first..=last).contains(&rho) {
            return None;
        }
        let upper = self.parameters.partition_point(|&p| p < rho);
        if upper == 0 {
            return Some(self.log_determinants[0]);
        }
        let (x0, x1) = (self.parameters[upper - 1], self.parameters[upper]);
        let (y0, y1) = (self.log_determinants[upper - 1], self.log_determinants[upper]);
        if x1 == x0 {
            return Some(y1);
        }
        let t = (rho - x0) / (x1 - x0);
        Some(y0 + t * (y1 - y0))
    }
}

/// `ln|I - ρW|` over the grid described by `config`, logging any fallback.
pub fn grid_det(matrix: &WeightsMatrix, config: &GridConfig) -> SpatialResult<ParameterGrid> {
    grid_det_with(matrix, config, &EigenConfig::default(), &LogSink)
}

pub fn grid_det_with(
    matrix: &WeightsMatrix,
    config: &GridConfig,
    eigen: &EigenConfig,
    sink: &dyn DiagnosticSink,
) -> SpatialResult<ParameterGrid> {
    matrix.square_dim()?;
    let parameters = resolve_parameters(matrix, config, eigen, sink)?;
    let identity = speye_like(matrix)?;
    let mut log_determinants = Vec::with_capacity(parameters.len());
    for &rho in &parameters {
        let filter = identity.linear_combination(1.0, matrix, -rho)?;
        log_determinants.push(splogdet_with(&filter, sink)?);
    }
    log::debug!(
        "tabulated {} log-determinants over [{:?}, {:?}]",
        parameters.len(),
        parameters.first(),
        parameters.last()
    );
    Ok(ParameterGrid {
        parameters,
        log_determinants,
    })
}

fn resolve_parameters(
    matrix: &WeightsMatrix,
    config: &GridConfig,
    eigen: &EigenConfig,
    sink: &dyn DiagnosticSink,
) -> SpatialResult<Vec<f64>> {
    if let Some(grid) = &config.grid {
        validate_explicit_grid(grid)?;
        return Ok(grid.clone());
    }
    let (parmin, parmax) = match (config.parmin, config.parmax) {
        (Some(lo), Some(hi)) => (lo, hi),
        (None, None) => {
            let range = speigen_range_with(matrix, eigen, &ShiftInvertIteration, sink)?;
            (range.min, range.max)
        }
        _ => {
            return Err(SpatialError::InvalidInput(
                "parmin and parmax must be given together".to_string(),
            ));
        }
    };
    let parstep = config
        .parstep
        .unwrap_or((parmax - parmin) / DEFAULT_STEPS);
    arange(parmin, parmax, parstep)
}

fn validate_explicit_grid(grid: &[f64]) -> SpatialResult<()> {
    if grid.is_empty() {
        return Err(SpatialError::InvalidInput("parameter grid is empty".to_string()));
    }
    if grid.iter().any(|v| !v.is_finite()) {
        return Err(SpatialError::InvalidInput(
            "parameter grid contains non-finite values".to_string(),
        ));
    }
    if grid.windows(2).any(|pair| pair[1] < pair[0]) {
        return Err(SpatialError::InvalidInput(
            "parameter grid must be ascending".to_string(),
        ));
    }
    Ok(())
}

/// `parmin, parmin + parstep, ...` strictly below `parmax`.
fn arange(parmin: f64, parmax: f64, parstep: f64) -> SpatialResult<Vec<f64>> {
    if !(parmin.is_finite() && parmax.is_finite() && parstep.is_finite()) {
        return Err(SpatialError::InvalidInput(format!(
            "grid bounds must be finite (parmin={parmin}, parmax={parmax}, parstep={parstep})"
        )));
    }
    if parmax <= parmin {
        return Err(SpatialError::InvalidInput(format!(
            "parmax ({parmax}) must exceed parmin ({parmin})"
        )));
    }
    if parstep <= 0.0 {
        return Err(SpatialError::InvalidInput(format!(
            "parstep must be positive, got {parstep}"
        )));
    }
    let span = ((parmax - parmin) / parstep).ceil();
    if !(span <= MAX_GRID_POINTS as f64) {
        return Err(SpatialError::InvalidInput(format!(
            "grid from {parmin} to {parmax} in steps of {parstep} exceeds {MAX_GRID_POINTS} points"
        )));
    }
    let mut count = span as usize;
    while count > 0 && parmin + (count - 1) as f64 * parstep >= parmax - ENDPOINT_SLACK * parstep {
        count -= 1;
    }
    Ok((0..count).map(|i| parmin + i as f64 * parstep).collect())
}
