// Zero-normal-velocity boundary condition

use crate::sim::{fields::NodalField, geometry::MeshGeometry};

/// Set the velocity component normal to each mesh edge to zero on that
/// edge: `vx` on the left and right columns, `vy` on the bottom and top rows.
pub fn enforce_no_penetration(geometry: &MeshGeometry, vx: &mut NodalField, vy: &mut NodalField) {
    let (nx, ny) = (geometry.nx(), geometry.ny());

    for row in 0..ny {
        vx[geometry.node_index(row, 0)] = 0.;
        vx[geometry.node_index(row, nx - 1)] = 0.;
    }
    for col in 0..nx {
        vy[geometry.node_index(0, col)] = 0.;
        vy[geometry.node_index(ny - 1, col)] = 0.;
    }
}
