// The simulation context: geometry, fields, operator and solver

use na::DMatrix;

use crate::sim::{
    boundary,
    config::SolverConfig,
    error::TransportResult,
    fields::{
        ElementField, ElementFieldId, FieldStore, HEAD, NodalField, NodalFieldId, VELOCITY_X,
        VELOCITY_Y,
    },
    geometry::MeshGeometry,
    mass::MassSolver,
    operator::{IntegralOperatorBuilder, RemapOperator},
};

/// A dense copy of the state, shaped for display: elemental fields have
/// `ey` rows and `ex` columns, nodal fields `ny` rows and `nx` columns,
/// with row 0 at the bottom of the domain.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub time: f64,
    pub step: u64,
    pub velocity: [DMatrix<f64>; 2],
    pub nodal: Vec<(String, DMatrix<f64>)>,
    pub elemental: Vec<(String, DMatrix<f64>)>,
}

/// A remap-transport simulation on a fixed structured mesh.
///
/// Owns every buffer it touches; drive it with `advance` and read it back
/// with the accessors or `snapshot`.
#[derive(Debug, Clone)]
pub struct Simulation {
    pub(crate) geometry: MeshGeometry,
    pub(crate) store: FieldStore,
    pub(crate) operator: RemapOperator,
    pub(crate) builder: IntegralOperatorBuilder,
    pub(crate) solver: MassSolver,
    pub(crate) time: f64,
    pub(crate) steps: u64,
}

impl Simulation {
    /// Create a simulation at rest with default solver settings
    ///
    /// Parameters
    /// - `ex` - The number of elements in the x-axis
    /// - `ey` - The number of elements in the y-axis
    /// - `dx` - The side length of every element
    pub fn new(ex: usize, ey: usize, dx: f64) -> TransportResult<Self> {
        Self::with_config(ex, ey, dx, SolverConfig::default())
    }

    pub fn with_config(ex: usize, ey: usize, dx: f64, config: SolverConfig) -> TransportResult<Self> {
        config.validate()?;
        let geometry = MeshGeometry::new(ex, ey, dx)?;

        Ok(Simulation {
            geometry,
            store: FieldStore::new(geometry),
            operator: RemapOperator::zeros(&geometry),
            builder: IntegralOperatorBuilder::new(geometry, config.stability),
            solver: MassSolver::new(&geometry, config),
            time: 0.,
            steps: 0,
        })
    }

    pub fn geometry(&self) -> &MeshGeometry {
        &self.geometry
    }

    pub fn fields(&self) -> &FieldStore {
        &self.store
    }

    pub fn config(&self) -> &SolverConfig {
        self.solver.config()
    }

    /// Elapsed simulation time
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Number of completed steps
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// The operator built by the most recent step
    pub fn operator(&self) -> &RemapOperator {
        &self.operator
    }

    pub fn add_nodal_field(&mut self, name: &str) -> NodalFieldId {
        self.store.add_nodal_field(name)
    }

    pub fn add_element_field(&mut self, name: &str) -> ElementFieldId {
        self.store.add_element_field(name)
    }

    pub fn set_nodal_velocity(&mut self, row: usize, col: usize, vx: f64, vy: f64) -> TransportResult<()> {
        // validate once so a bad index leaves both components untouched
        self.geometry.checked_node_index(row, col)?;
        self.store.set_nodal_value(VELOCITY_X, row, col, vx)?;
        self.store.set_nodal_value(VELOCITY_Y, row, col, vy)
    }

    pub fn nodal_velocity(&self, row: usize, col: usize) -> TransportResult<(f64, f64)> {
        Ok((
            self.store.nodal_value(VELOCITY_X, row, col)?,
            self.store.nodal_value(VELOCITY_Y, row, col)?,
        ))
    }

    /// Set the head of one element (e.g. a pointer click)
    pub fn set_element_value(&mut self, row: usize, col: usize, value: f64) -> TransportResult<()> {
        self.store.set_element_value(HEAD, row, col, value)
    }

    pub fn element_value(&self, row: usize, col: usize) -> TransportResult<f64> {
        self.store.element_value(HEAD, row, col)
    }

    pub fn set_nodal_value(
        &mut self,
        id: NodalFieldId,
        row: usize,
        col: usize,
        value: f64,
    ) -> TransportResult<()> {
        self.store.set_nodal_value(id, row, col, value)
    }

    pub fn nodal_value(&self, id: NodalFieldId, row: usize, col: usize) -> TransportResult<f64> {
        self.store.nodal_value(id, row, col)
    }

    pub fn set_element_value_of(
        &mut self,
        id: ElementFieldId,
        row: usize,
        col: usize,
        value: f64,
    ) -> TransportResult<()> {
        self.store.set_element_value(id, row, col, value)
    }

    pub fn element_value_of(&self, id: ElementFieldId, row: usize, col: usize) -> TransportResult<f64> {
        self.store.element_value(id, row, col)
    }

    pub fn fill_nodal(&mut self, id: NodalFieldId, values: &[f64]) -> TransportResult<()> {
        self.store.fill_nodal(id, values)
    }

    pub fn fill_element(&mut self, id: ElementFieldId, values: &[f64]) -> TransportResult<()> {
        self.store.fill_element(id, values)
    }

    /// Apply the no-penetration condition to the current velocity, e.g.
    /// after injecting a velocity field from outside.
    pub fn enforce_boundary(&mut self) {
        let geometry = self.geometry;
        let (vx, vy) = self.store.velocity_mut();
        boundary::enforce_no_penetration(&geometry, vx, vy);
    }

    /// Largest time step the current velocity admits without tracing any
    /// element outside its cell. Infinite at rest.
    pub fn max_stable_dt(&self) -> f64 {
        let (vx, vy) = self.store.velocity();
        self.builder.max_stable_dt(vx, vy)
    }

    /// Integral of an elemental field over the domain
    pub fn total_mass(&self, id: ElementFieldId) -> TransportResult<f64> {
        Ok(self.store.element(id)?.sum() * self.geometry.element_area())
    }

    pub fn snapshot(&self) -> Snapshot {
        let (vx, vy) = self.store.velocity();

        Snapshot {
            time: self.time,
            step: self.steps,
            velocity: [self.nodal_matrix(vx), self.nodal_matrix(vy)],
            nodal: self
                .store
                .nodal
                .iter()
                .skip(2)
                .map(|f| (f.name.clone(), self.nodal_matrix(&f.values)))
                .collect(),
            elemental: self
                .store
                .elemental
                .iter()
                .map(|f| (f.name.clone(), self.element_matrix(&f.values)))
                .collect(),
        }
    }

    fn nodal_matrix(&self, field: &NodalField) -> DMatrix<f64> {
        DMatrix::from_row_slice(self.geometry.ny(), self.geometry.nx(), field.as_slice())
    }

    fn element_matrix(&self, field: &ElementField) -> DMatrix<f64> {
        DMatrix::from_row_slice(self.geometry.ey(), self.geometry.ex(), field.as_slice())
    }
}
