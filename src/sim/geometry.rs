// Structured quadrilateral mesh geometry

use serde::{Deserialize, Serialize};

use crate::sim::error::{GridKind, TransportError, TransportResult};

/// Classification of a node by how many elements share it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeClass {
    /// Shared by one element
    Corner,
    /// Shared by two elements
    Edge,
    /// Shared by four elements
    Interior,
}

/// A uniform mesh of `ex × ey` square elements with side `dx`.
///
/// Nodes are stored row-major with `nx = ex + 1` columns; elements are
/// stored row-major with `ex` columns. Row 0 is the bottom of the domain.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MeshGeometry {
    ex: usize,
    ey: usize,
    dx: f64,
}

impl MeshGeometry {
    /// Create a validated mesh geometry
    ///
    /// Parameters
    /// - `ex` - The number of elements in the x-axis
    /// - `ey` - The number of elements in the y-axis
    /// - `dx` - The side length of every element
    pub fn new(ex: usize, ey: usize, dx: f64) -> TransportResult<Self> {
        if ex == 0 || ey == 0 {
            return Err(TransportError::InvalidGeometry(format!(
                "element counts must be positive, got {ex}x{ey}"
            )));
        }
        if !(dx.is_finite() && dx > 0.) {
            return Err(TransportError::InvalidGeometry(format!(
                "grid spacing must be finite and positive, got {dx}"
            )));
        }

        Ok(MeshGeometry { ex, ey, dx })
    }

    pub fn ex(&self) -> usize {
        self.ex
    }

    pub fn ey(&self) -> usize {
        self.ey
    }

    pub fn nx(&self) -> usize {
        self.ex + 1
    }

    pub fn ny(&self) -> usize {
        self.ey + 1
    }

    pub fn dx(&self) -> f64 {
        self.dx
    }

    pub fn node_count(&self) -> usize {
        self.nx() * self.ny()
    }

    pub fn element_count(&self) -> usize {
        self.ex * self.ey
    }

    /// Area of a single element
    pub fn element_area(&self) -> f64 {
        self.dx * self.dx
    }

    /// Flat index of node (row, col). Indices must already be in range.
    #[inline]
    pub fn node_index(&self, row: usize, col: usize) -> usize {
        debug_assert!(row < self.ny() && col < self.nx());
        self.nx() * row + col
    }

    /// Flat index of element (row, col). Indices must already be in range.
    #[inline]
    pub fn element_index(&self, row: usize, col: usize) -> usize {
        debug_assert!(row < self.ey && col < self.ex);
        self.ex * row + col
    }

    pub fn checked_node_index(&self, row: usize, col: usize) -> TransportResult<usize> {
        if row >= self.ny() || col >= self.nx() {
            return Err(TransportError::IndexOutOfRange {
                kind: GridKind::Node,
                row,
                col,
                rows: self.ny(),
                cols: self.nx(),
            });
        }
        Ok(self.node_index(row, col))
    }

    pub fn checked_element_index(&self, row: usize, col: usize) -> TransportResult<usize> {
        if row >= self.ey || col >= self.ex {
            return Err(TransportError::IndexOutOfRange {
                kind: GridKind::Element,
                row,
                col,
                rows: self.ey,
                cols: self.ex,
            });
        }
        Ok(self.element_index(row, col))
    }

    /// Node indices of the corners of element (row, col), counter-clockwise
    /// from the bottom-left corner.
    #[inline]
    pub fn element_corners(&self, row: usize, col: usize) -> [usize; 4] {
        [
            self.node_index(row, col),
            self.node_index(row, col + 1),
            self.node_index(row + 1, col + 1),
            self.node_index(row + 1, col),
        ]
    }

    /// Iterate over all elements as (row, col) in storage order
    pub fn elements(&self) -> impl Iterator<Item = (usize, usize)> + use<> {
        let (ex, ey) = (self.ex, self.ey);
        (0..ey).flat_map(move |row| (0..ex).map(move |col| (row, col)))
    }

    /// Iterate over all nodes as (row, col) in storage order
    pub fn nodes(&self) -> impl Iterator<Item = (usize, usize)> + use<> {
        let (nx, ny) = (self.nx(), self.ny());
        (0..ny).flat_map(move |row| (0..nx).map(move |col| (row, col)))
    }

    pub fn node_class(&self, row: usize, col: usize) -> NodeClass {
        let on_x_edge = col == 0 || col == self.nx() - 1;
        let on_y_edge = row == 0 || row == self.ny() - 1;

        match (on_x_edge, on_y_edge) {
            (true, true) => NodeClass::Corner,
            (true, false) | (false, true) => NodeClass::Edge,
            (false, false) => NodeClass::Interior,
        }
    }

    /// Lumped (row-summed) mass of a node: the integral of its bilinear
    /// shape function over the mesh.
    pub fn lumped_mass(&self, row: usize, col: usize) -> f64 {
        let area = self.element_area();
        match self.node_class(row, col) {
            NodeClass::Corner => 0.25 * area,
            NodeClass::Edge => 0.5 * area,
            NodeClass::Interior => area,
        }
    }
}
