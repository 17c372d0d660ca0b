// Consumers of simulation state running beside the solver thread

pub mod serial_field;
pub mod snapshots;
