// Remap transport core

pub mod boundary;
pub mod config;
pub mod error;
pub mod fields;
pub mod geometry;
pub mod mass;
pub mod operator;
pub mod shared;
pub mod simulation;
pub mod stepper;
pub mod task;
pub mod transfer;

pub use config::{MassSolverKind, SolverConfig, StabilityPolicy};
pub use error::{GridKind, TransportError, TransportResult};
pub use fields::{
    ElementField, ElementFieldId, HEAD, NodalField, NodalFieldId, VELOCITY_X, VELOCITY_Y,
};
pub use geometry::MeshGeometry;
pub use shared::SharedSimulation;
pub use simulation::{Simulation, Snapshot};
pub use stepper::{StepPhase, StepReport};
