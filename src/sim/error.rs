// Error taxonomy for the transport core

use std::fmt;

use thiserror::Error;

/// Which of the two mesh representations an index or handle refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridKind {
    Node,
    Element,
}

impl fmt::Display for GridKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GridKind::Node => write!(f, "node"),
            GridKind::Element => write!(f, "element"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("Invalid mesh geometry: {0}")]
    InvalidGeometry(String),

    #[error("Invalid time step dt={dt}: must be finite and positive")]
    InvalidTimeStep { dt: f64 },

    #[error("Mass solve did not converge after {iterations} iterations (residual norm {residual_norm:e})")]
    ConvergenceFailure { iterations: usize, residual_norm: f64 },

    #[error("Index (row={row}, col={col}) is outside the {rows}x{cols} {kind} grid")]
    IndexOutOfRange {
        kind: GridKind,
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    #[error("Expected {expected} {kind} values, got {actual}")]
    LengthMismatch {
        kind: GridKind,
        expected: usize,
        actual: usize,
    },

    #[error("Element (row={row}, col={col}) is traced outside its cell (xi={xi}, eta={eta})")]
    StabilityBound {
        row: usize,
        col: usize,
        xi: f64,
        eta: f64,
    },

    #[error("Unknown {kind} field id {id}")]
    UnknownField { kind: GridKind, id: usize },

    #[error("Invalid solver configuration: {0}")]
    InvalidConfig(String),
}

pub type TransportResult<T> = Result<T, TransportError>;
