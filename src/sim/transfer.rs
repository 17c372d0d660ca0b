// Transfers between the nodal and elemental representations

use crate::sim::{
    fields::{ElementField, NodalField},
    geometry::MeshGeometry,
    operator::RemapOperator,
};

/// Restrict a nodal field onto elements: every element takes the mean of
/// its four corners.
///
/// Parameters
/// - `geometry` - The mesh both fields live on
/// - `nodal` - The nodal field to restrict
/// - `elemental` - Output; overwritten
pub fn nodal_to_elemental(geometry: &MeshGeometry, nodal: &NodalField, elemental: &mut ElementField) {
    for (row, col) in geometry.elements() {
        let corners = geometry.element_corners(row, col);
        elemental[geometry.element_index(row, col)] =
            0.25 * corners.iter().map(|&c| nodal[c]).sum::<f64>();
    }
}

/// Scatter an elemental field onto nodes through the remap operator: each
/// element hands `weight[k] * value` to its corner `k`. The total is
/// conserved; nothing is lost, only redistributed.
///
/// Parameters
/// - `geometry` - The mesh both fields live on
/// - `operator` - This step's remap weights
/// - `elemental` - The elemental field to scatter
/// - `residual` - Output; zeroed and then accumulated into
pub fn elemental_to_nodal(
    geometry: &MeshGeometry,
    operator: &RemapOperator,
    elemental: &ElementField,
    residual: &mut NodalField,
) {
    residual.fill(0.);

    for (row, col) in geometry.elements() {
        let e = geometry.element_index(row, col);
        let value = elemental[e];
        let weights = operator.element_weights(e);

        for (corner, weight) in geometry.element_corners(row, col).iter().zip(weights) {
            residual[*corner] += weight * value;
        }
    }
}

/// Average an elemental field onto nodes: each node takes the mean of the
/// elements sharing it. Exact for uniform fields, which makes it a good
/// starting point for the mass solve of an elemental field.
pub fn nodal_average(geometry: &MeshGeometry, elemental: &ElementField, nodal: &mut NodalField) {
    let (nx, ny) = (geometry.nx(), geometry.ny());

    for (row, col) in geometry.nodes() {
        let mut sum = 0.;
        let mut count = 0;

        for er in row.saturating_sub(1)..row.min(ny - 2) + 1 {
            for ec in col.saturating_sub(1)..col.min(nx - 2) + 1 {
                sum += elemental[geometry.element_index(er, ec)];
                count += 1;
            }
        }

        nodal[geometry.node_index(row, col)] = sum / count as f64;
    }
}
