// Per-step remap operator construction

use crate::sim::{
    config::StabilityPolicy,
    error::{TransportError, TransportResult},
    fields::NodalField,
    geometry::MeshGeometry,
};

/// Four corner weights per element, in the element's counter-clockwise
/// corner order. Rebuilt every step and never carried across steps.
#[derive(Debug, Clone)]
pub struct RemapOperator {
    weights: Vec<[f64; 4]>,
}

impl RemapOperator {
    pub fn zeros(geometry: &MeshGeometry) -> Self {
        RemapOperator {
            weights: vec![[0.; 4]; geometry.element_count()],
        }
    }

    /// The operator of a fluid at rest: every corner receives a quarter of
    /// the element area.
    pub fn at_rest(geometry: &MeshGeometry) -> Self {
        RemapOperator {
            weights: vec![[0.25 * geometry.element_area(); 4]; geometry.element_count()],
        }
    }

    pub fn element_weights(&self, element: usize) -> &[f64; 4] {
        &self.weights[element]
    }

    pub fn iter(&self) -> impl Iterator<Item = &[f64; 4]> {
        self.weights.iter()
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }
}

/// Rebuilds the remap operator from the nodal velocity field.
///
/// Each element's centroid is traced by `dt` to a reference position
/// `(xi, eta)` in `[-1, 1]²`; the element's content is then split between
/// its corners with the bilinear shape functions evaluated there, scaled by
/// the traced element's area.
#[derive(Debug, Clone, Copy)]
pub struct IntegralOperatorBuilder {
    geometry: MeshGeometry,
    policy: StabilityPolicy,
}

impl IntegralOperatorBuilder {
    pub fn new(geometry: MeshGeometry, policy: StabilityPolicy) -> Self {
        IntegralOperatorBuilder { geometry, policy }
    }

    pub fn policy(&self) -> StabilityPolicy {
        self.policy
    }

    /// Recompute `operator` in place for a step of size `dt`.
    ///
    /// Parameters
    /// - `operator` - The operator to overwrite
    /// - `vx` - Nodal x-velocity
    /// - `vy` - Nodal y-velocity
    /// - `dt` - The time step
    ///
    /// Returns
    /// - The largest `max(|xi|, |eta|)` over all elements (before clamping),
    ///   or `StabilityBound` under the `Reject` policy when it exceeds 1.
    pub fn rebuild(
        &self,
        operator: &mut RemapOperator,
        vx: &NodalField,
        vy: &NodalField,
        dt: f64,
    ) -> TransportResult<f64> {
        let dx = self.geometry.dx();
        let scale = 0.5 * dt / dx;
        let quarter_area = 0.25 * self.geometry.element_area();

        let mut courant: f64 = 0.;

        for (row, col) in self.geometry.elements() {
            let e = self.geometry.element_index(row, col);
            let [c0, c1, c2, c3] = self.geometry.element_corners(row, col);

            // rate of change of the element area along the trace
            let area_change = -vx[c0] - vy[c0] + vx[c1] - vy[c1] + vx[c2] + vy[c2] - vx[c3]
                + vy[c3];
            let w = quarter_area * (1. + scale * area_change);

            let mut xi = scale * (vx[c0] + vx[c1] + vx[c2] + vx[c3]);
            let mut eta = scale * (vy[c0] + vy[c1] + vy[c2] + vy[c3]);

            let reach = xi.abs().max(eta.abs());
            courant = courant.max(reach);

            if reach > 1. {
                match self.policy {
                    StabilityPolicy::Reject => {
                        return Err(TransportError::StabilityBound { row, col, xi, eta });
                    }
                    StabilityPolicy::Clamp => {
                        xi = xi.clamp(-1., 1.);
                        eta = eta.clamp(-1., 1.);
                    }
                    StabilityPolicy::Allow => (),
                }
            }

            operator.weights[e] = [
                w * (1. - xi) * (1. - eta),
                w * (1. + xi) * (1. - eta),
                w * (1. + xi) * (1. + eta),
                w * (1. - xi) * (1. + eta),
            ];
        }

        Ok(courant)
    }

    /// The largest time step for which every element stays within the
    /// stability bound. Infinite when the fluid is at rest.
    pub fn max_stable_dt(&self, vx: &NodalField, vy: &NodalField) -> f64 {
        let mut max_sum: f64 = 0.;

        for (row, col) in self.geometry.elements() {
            let corners = self.geometry.element_corners(row, col);
            let sum_x: f64 = corners.iter().map(|&c| vx[c]).sum();
            let sum_y: f64 = corners.iter().map(|&c| vy[c]).sum();
            max_sum = max_sum.max(sum_x.abs()).max(sum_y.abs());
        }

        if max_sum == 0. {
            f64::INFINITY
        } else {
            2. * self.geometry.dx() / max_sum
        }
    }
}
