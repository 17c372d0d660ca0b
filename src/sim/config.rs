// Solver configuration

use serde::{Deserialize, Serialize};

use crate::sim::error::{TransportError, TransportResult};

/// Residual norm below which the mass solve is converged
pub const DEFAULT_TOLERANCE: f64 = 1e-5;

/// Maximum number of sweeps before a mass solve is reported as failed
pub const DEFAULT_MAX_ITERATIONS: usize = 10_000;

/// Method used to invert the mass matrix
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MassSolverKind {
    /// Diagonal relaxation with the lumped mass
    #[default]
    Jacobi,
    /// Conjugate gradient over the assembled sparse matrix
    ConjugateGradient,
}

/// What to do when a time step traces an element further than its own
/// half-width (`|xi| > 1` or `|eta| > 1`).
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StabilityPolicy {
    /// Fail the step before touching any field
    #[default]
    Reject,
    /// Clamp the traced position onto the element boundary
    Clamp,
    /// Keep the unclamped weights
    Allow,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
#[serde(default)]
pub struct SolverConfig {
    pub max_iterations: usize,
    pub tolerance: f64,
    pub method: MassSolverKind,
    pub stability: StabilityPolicy,
}

impl Default for SolverConfig {
    fn default() -> Self {
        SolverConfig {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            tolerance: DEFAULT_TOLERANCE,
            method: MassSolverKind::default(),
            stability: StabilityPolicy::default(),
        }
    }
}

impl SolverConfig {
    pub fn validate(&self) -> TransportResult<()> {
        if self.max_iterations == 0 {
            return Err(TransportError::InvalidConfig(
                "max_iterations must be at least 1".into(),
            ));
        }
        if !(self.tolerance.is_finite() && self.tolerance > 0.) {
            return Err(TransportError::InvalidConfig(format!(
                "tolerance must be finite and positive, got {}",
                self.tolerance
            )));
        }
        Ok(())
    }
}
