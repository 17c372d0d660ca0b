// Owned storage for the transported fields and solver scratch space

use na::DVector;

use crate::sim::{
    error::{GridKind, TransportError, TransportResult},
    geometry::MeshGeometry,
};

/// One value per mesh node, indexed by `MeshGeometry::node_index`
pub type NodalField = DVector<f64>;

/// One value per mesh element, indexed by `MeshGeometry::element_index`
pub type ElementField = DVector<f64>;

/// Handle to a nodal field registered in a `FieldStore`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodalFieldId(usize);

/// Handle to an elemental field registered in a `FieldStore`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementFieldId(usize);

pub const VELOCITY_X: NodalFieldId = NodalFieldId(0);
pub const VELOCITY_Y: NodalFieldId = NodalFieldId(1);

/// The pressure head; the primary elemental scalar
pub const HEAD: ElementFieldId = ElementFieldId(0);

#[derive(Debug, Clone)]
pub(crate) struct Tracked<T> {
    pub(crate) name: String,
    pub(crate) values: T,
}

/// Transient buffers reset by every transfer and solve
#[derive(Debug, Clone)]
pub(crate) struct Scratch {
    /// Nodal field interpolated onto elements
    pub(crate) interpolated: ElementField,
    /// Scatter output; the solver consumes it as its residual
    pub(crate) residual: NodalField,
    /// Jacobi increment
    pub(crate) increment: NodalField,
    /// Nodal stand-in for an elemental field during its solve
    pub(crate) proxy: NodalField,
}

#[derive(Debug, Clone)]
pub(crate) struct Workspace {
    pub(crate) scratch: Scratch,
    /// New values of every field, committed together at the end of a step
    pub(crate) staged_nodal: Vec<NodalField>,
    pub(crate) staged_elemental: Vec<ElementField>,
}

impl Workspace {
    fn new(geometry: &MeshGeometry) -> Self {
        Workspace {
            scratch: Scratch {
                interpolated: DVector::zeros(geometry.element_count()),
                residual: DVector::zeros(geometry.node_count()),
                increment: DVector::zeros(geometry.node_count()),
                proxy: DVector::zeros(geometry.node_count()),
            },
            staged_nodal: Vec::new(),
            staged_elemental: Vec::new(),
        }
    }
}

/// Storage for all fields of a simulation. Velocity components are always
/// the first two nodal fields and the head is always the first elemental
/// field.
#[derive(Debug, Clone)]
pub struct FieldStore {
    geometry: MeshGeometry,
    pub(crate) nodal: Vec<Tracked<NodalField>>,
    pub(crate) elemental: Vec<Tracked<ElementField>>,
    pub(crate) workspace: Workspace,
}

impl FieldStore {
    /// Allocate zeroed velocity and head fields for `geometry`
    pub fn new(geometry: MeshGeometry) -> Self {
        let mut store = FieldStore {
            geometry,
            nodal: Vec::new(),
            elemental: Vec::new(),
            workspace: Workspace::new(&geometry),
        };

        store.add_nodal_field("velocity_x");
        store.add_nodal_field("velocity_y");
        store.add_element_field("head");

        store
    }

    pub fn geometry(&self) -> &MeshGeometry {
        &self.geometry
    }

    /// Register an additional transported nodal quantity, initialized to zero
    pub fn add_nodal_field(&mut self, name: &str) -> NodalFieldId {
        let n = self.geometry.node_count();
        self.nodal.push(Tracked {
            name: name.to_owned(),
            values: DVector::zeros(n),
        });
        self.workspace.staged_nodal.push(DVector::zeros(n));

        NodalFieldId(self.nodal.len() - 1)
    }

    /// Register an additional transported elemental quantity, initialized to zero
    pub fn add_element_field(&mut self, name: &str) -> ElementFieldId {
        let n = self.geometry.element_count();
        self.elemental.push(Tracked {
            name: name.to_owned(),
            values: DVector::zeros(n),
        });
        self.workspace.staged_elemental.push(DVector::zeros(n));

        ElementFieldId(self.elemental.len() - 1)
    }

    pub fn nodal_ids(&self) -> impl Iterator<Item = NodalFieldId> + use<> {
        (0..self.nodal.len()).map(NodalFieldId)
    }

    pub fn element_ids(&self) -> impl Iterator<Item = ElementFieldId> + use<> {
        (0..self.elemental.len()).map(ElementFieldId)
    }

    pub fn nodal_field_by_name(&self, name: &str) -> Option<NodalFieldId> {
        self.nodal.iter().position(|f| f.name == name).map(NodalFieldId)
    }

    pub fn element_field_by_name(&self, name: &str) -> Option<ElementFieldId> {
        self.elemental
            .iter()
            .position(|f| f.name == name)
            .map(ElementFieldId)
    }

    pub fn nodal_name(&self, id: NodalFieldId) -> TransportResult<&str> {
        Ok(&self.nodal_entry(id)?.name)
    }

    pub fn element_name(&self, id: ElementFieldId) -> TransportResult<&str> {
        Ok(&self.element_entry(id)?.name)
    }

    pub fn nodal(&self, id: NodalFieldId) -> TransportResult<&NodalField> {
        Ok(&self.nodal_entry(id)?.values)
    }

    pub fn element(&self, id: ElementFieldId) -> TransportResult<&ElementField> {
        Ok(&self.element_entry(id)?.values)
    }

    pub fn velocity(&self) -> (&NodalField, &NodalField) {
        (&self.nodal[VELOCITY_X.0].values, &self.nodal[VELOCITY_Y.0].values)
    }

    pub fn velocity_mut(&mut self) -> (&mut NodalField, &mut NodalField) {
        let (x, rest) = self.nodal.split_at_mut(VELOCITY_Y.0);
        (&mut x[VELOCITY_X.0].values, &mut rest[0].values)
    }

    pub fn nodal_value(&self, id: NodalFieldId, row: usize, col: usize) -> TransportResult<f64> {
        let k = self.geometry.checked_node_index(row, col)?;
        Ok(self.nodal(id)?[k])
    }

    pub fn element_value(
        &self,
        id: ElementFieldId,
        row: usize,
        col: usize,
    ) -> TransportResult<f64> {
        let k = self.geometry.checked_element_index(row, col)?;
        Ok(self.element(id)?[k])
    }

    pub fn set_nodal_value(
        &mut self,
        id: NodalFieldId,
        row: usize,
        col: usize,
        value: f64,
    ) -> TransportResult<()> {
        let k = self.geometry.checked_node_index(row, col)?;
        self.nodal_entry_mut(id)?.values[k] = value;
        Ok(())
    }

    pub fn set_element_value(
        &mut self,
        id: ElementFieldId,
        row: usize,
        col: usize,
        value: f64,
    ) -> TransportResult<()> {
        let k = self.geometry.checked_element_index(row, col)?;
        self.element_entry_mut(id)?.values[k] = value;
        Ok(())
    }

    /// Overwrite a whole nodal field from a flat row-major slice
    pub fn fill_nodal(&mut self, id: NodalFieldId, values: &[f64]) -> TransportResult<()> {
        let expected = self.geometry.node_count();
        if values.len() != expected {
            return Err(TransportError::LengthMismatch {
                kind: GridKind::Node,
                expected,
                actual: values.len(),
            });
        }
        self.nodal_entry_mut(id)?.values.copy_from_slice(values);
        Ok(())
    }

    /// Overwrite a whole elemental field from a flat row-major slice
    pub fn fill_element(&mut self, id: ElementFieldId, values: &[f64]) -> TransportResult<()> {
        let expected = self.geometry.element_count();
        if values.len() != expected {
            return Err(TransportError::LengthMismatch {
                kind: GridKind::Element,
                expected,
                actual: values.len(),
            });
        }
        self.element_entry_mut(id)?.values.copy_from_slice(values);
        Ok(())
    }

    /// Swap every staged field into place
    pub(crate) fn commit_staged(&mut self) {
        for (field, staged) in self
            .nodal
            .iter_mut()
            .zip(self.workspace.staged_nodal.iter_mut())
        {
            std::mem::swap(&mut field.values, staged);
        }
        for (field, staged) in self
            .elemental
            .iter_mut()
            .zip(self.workspace.staged_elemental.iter_mut())
        {
            std::mem::swap(&mut field.values, staged);
        }
    }

    fn nodal_entry(&self, id: NodalFieldId) -> TransportResult<&Tracked<NodalField>> {
        self.nodal.get(id.0).ok_or(TransportError::UnknownField {
            kind: GridKind::Node,
            id: id.0,
        })
    }

    fn nodal_entry_mut(&mut self, id: NodalFieldId) -> TransportResult<&mut Tracked<NodalField>> {
        self.nodal.get_mut(id.0).ok_or(TransportError::UnknownField {
            kind: GridKind::Node,
            id: id.0,
        })
    }

    fn element_entry(&self, id: ElementFieldId) -> TransportResult<&Tracked<ElementField>> {
        self.elemental.get(id.0).ok_or(TransportError::UnknownField {
            kind: GridKind::Element,
            id: id.0,
        })
    }

    fn element_entry_mut(
        &mut self,
        id: ElementFieldId,
    ) -> TransportResult<&mut Tracked<ElementField>> {
        self.elemental
            .get_mut(id.0)
            .ok_or(TransportError::UnknownField {
                kind: GridKind::Element,
                id: id.0,
            })
    }
}
