// Finite-element mass matrix and its iterative inversion

use argmin::core::{Executor, Operator, State};
use argmin::solver::conjugategradient::ConjugateGradient;
use na::DVector;
use nalgebra_sparse::{CooMatrix, CsrMatrix};
use tracing::{debug, warn};

use crate::sim::{
    config::{MassSolverKind, SolverConfig},
    error::{TransportError, TransportResult},
    fields::NodalField,
    geometry::MeshGeometry,
};

/// Element mass matrix of a unit bilinear square, in units of `dx²/36`,
/// for the counter-clockwise corner order.
const ELEMENT_MASS: [[f64; 4]; 4] = [
    [4., 2., 1., 2.],
    [2., 4., 2., 1.],
    [1., 2., 4., 2.],
    [2., 1., 2., 4.],
];

/// The consistent bilinear mass matrix of a structured mesh.
///
/// Interior rows are the 9-point stencil `{1,4,1,4,16,4,1,4,1} * dx²/36`;
/// rows of boundary nodes only hold the contributions of elements that exist.
#[derive(Debug, Clone)]
pub struct MassMatrix {
    matrix: CsrMatrix<f64>,
    lumped: DVector<f64>,
}

impl MassMatrix {
    /// Assemble the mass matrix element by element
    pub fn assemble(geometry: &MeshGeometry) -> Self {
        let n = geometry.node_count();
        let w = geometry.element_area() / 36.;

        // start with a coordinate sparse rep for easy loading; duplicates sum on conversion
        let mut coo: CooMatrix<f64> = CooMatrix::new(n, n);
        for (row, col) in geometry.elements() {
            let corners = geometry.element_corners(row, col);
            for (a, &ka) in corners.iter().enumerate() {
                for (b, &kb) in corners.iter().enumerate() {
                    coo.push(ka, kb, w * ELEMENT_MASS[a][b]);
                }
            }
        }

        let lumped = DVector::from_iterator(
            n,
            geometry.nodes().map(|(r, c)| geometry.lumped_mass(r, c)),
        );

        MassMatrix {
            matrix: CsrMatrix::from(&coo),
            lumped,
        }
    }

    pub fn csr(&self) -> &CsrMatrix<f64> {
        &self.matrix
    }

    /// Row sums of the matrix, one per node
    pub fn lumped(&self) -> &DVector<f64> {
        &self.lumped
    }

    /// Compute M·x
    pub fn apply(&self, x: &NodalField) -> NodalField {
        &self.matrix * x
    }
}

/// Outcome of a converged mass solve
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolveReport {
    pub iterations: usize,
    pub residual_norm: f64,
}

/// Runs multiplication for the conjugate-gradient solver
struct MassOperator<'a> {
    a: &'a CsrMatrix<f64>,
}

impl Operator for MassOperator<'_> {
    type Param = Vec<f64>;
    type Output = Vec<f64>;

    fn apply(&self, x: &Self::Param) -> Result<Self::Output, argmin::core::Error> {
        Ok((self.a * DVector::from_column_slice(x)).data.as_vec().clone())
    }
}

/// Solves `M·x = F` for nodal unknowns `x`.
#[derive(Debug, Clone)]
pub struct MassSolver {
    mass: MassMatrix,
    config: SolverConfig,
    element_count: usize,
}

impl MassSolver {
    pub fn new(geometry: &MeshGeometry, config: SolverConfig) -> Self {
        MassSolver {
            mass: MassMatrix::assemble(geometry),
            config,
            element_count: geometry.element_count(),
        }
    }

    pub fn mass(&self) -> &MassMatrix {
        &self.mass
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Normalized residual norm `sqrt(Σr² / (Ex·Ey))`
    pub fn residual_norm(&self, residual: &NodalField) -> f64 {
        (residual.norm_squared() / self.element_count as f64).sqrt()
    }

    /// Solve the mass system in place.
    ///
    /// Parameters
    /// - `residual` - Holds F on entry and the final residual `F - M·x` on exit
    /// - `increment` - Scratch space, overwritten
    /// - `x` - Holds the initial guess on entry and the solution on exit
    ///
    /// Returns
    /// - A `SolveReport` on convergence, `ConvergenceFailure` when the
    ///   iteration cap is hit or the residual stops being finite. `x` is
    ///   not meaningful after a failure.
    pub fn remap(
        &self,
        residual: &mut NodalField,
        increment: &mut NodalField,
        x: &mut NodalField,
    ) -> TransportResult<SolveReport> {
        let report = match self.config.method {
            MassSolverKind::Jacobi => self.jacobi(residual, increment, x),
            MassSolverKind::ConjugateGradient => self.conjugate_gradient(residual, x),
        };

        match &report {
            Ok(report) => debug!(
                iterations = report.iterations,
                residual = report.residual_norm,
                "mass solve converged"
            ),
            Err(err) => warn!("{err}"),
        }

        report
    }

    fn jacobi(
        &self,
        residual: &mut NodalField,
        increment: &mut NodalField,
        x: &mut NodalField,
    ) -> TransportResult<SolveReport> {
        *residual -= self.mass.apply(x);
        let mut norm = self.residual_norm(residual);
        let mut iterations = 0;

        while norm.is_nan() || norm > self.config.tolerance {
            if iterations >= self.config.max_iterations || !norm.is_finite() {
                return Err(TransportError::ConvergenceFailure {
                    iterations,
                    residual_norm: norm,
                });
            }

            increment.copy_from(&*residual);
            increment.component_div_assign(self.mass.lumped());
            *x += &*increment;
            *residual -= self.mass.apply(increment);

            norm = self.residual_norm(residual);
            iterations += 1;
        }

        Ok(SolveReport {
            iterations,
            residual_norm: norm,
        })
    }

    fn conjugate_gradient(
        &self,
        residual: &mut NodalField,
        x: &mut NodalField,
    ) -> TransportResult<SolveReport> {
        let rhs = residual.clone();

        // nothing to do if the initial guess already solves the system
        *residual -= self.mass.apply(x);
        let initial_norm = self.residual_norm(residual);
        if initial_norm <= self.config.tolerance {
            return Ok(SolveReport {
                iterations: 0,
                residual_norm: initial_norm,
            });
        }

        let b: Vec<f64> = rhs.iter().copied().collect();
        let solver: ConjugateGradient<Vec<f64>, f64> = ConjugateGradient::new(b);
        let operator = MassOperator {
            a: self.mass.csr(),
        };
        let initial_guess: Vec<f64> = x.iter().copied().collect();

        // argmin's cost is the squared residual norm `r·r`
        let target_cost = self.config.tolerance.powi(2) * self.element_count as f64;

        let res = Executor::new(operator, solver)
            .configure(|state| {
                state
                    .param(initial_guess)
                    .max_iters(self.config.max_iterations as u64)
                    .target_cost(target_cost)
            })
            .run()
            .map_err(|err| {
                warn!("Conjugate Gradient error: {err}");
                TransportError::ConvergenceFailure {
                    iterations: 0,
                    residual_norm: initial_norm,
                }
            })?;

        let iterations = res.state().get_iter() as usize;
        let best = res
            .state()
            .best_param
            .as_ref()
            .ok_or(TransportError::ConvergenceFailure {
                iterations,
                residual_norm: initial_norm,
            })?;

        x.copy_from_slice(best);
        residual.copy_from(&rhs);
        *residual -= self.mass.apply(x);

        let norm = self.residual_norm(residual);
        if norm.is_nan() || norm > self.config.tolerance {
            return Err(TransportError::ConvergenceFailure {
                iterations,
                residual_norm: norm,
            });
        }

        Ok(SolveReport {
            iterations,
            residual_norm: norm,
        })
    }
}

#[cfg(test)]
mod tests {
    use rand::Rng;

    use super::*;

    fn impulse_solver(config: SolverConfig) -> (MeshGeometry, MassSolver, NodalField) {
        let geometry = MeshGeometry::new(4, 4, 1.).unwrap();
        let solver = MassSolver::new(&geometry, config);
        let mut f = DVector::zeros(geometry.node_count());
        f[geometry.node_index(2, 2)] = 1.;
        (geometry, solver, f)
    }

    #[test]
    fn test_interior_stencil() {
        let geometry = MeshGeometry::new(4, 4, 3.).unwrap();
        let mass = MassMatrix::assemble(&geometry);

        let center = geometry.node_index(2, 2);
        let row = mass.csr().row(center);
        assert_eq!(row.nnz(), 9);

        let w = 9. / 36.;
        for (&k, &v) in row.col_indices().iter().zip(row.values()) {
            let (r, c) = (k / geometry.nx(), k % geometry.nx());
            let expected = match (r.abs_diff(2), c.abs_diff(2)) {
                (0, 0) => 16. * w,
                (1, 1) => w,
                _ => 4. * w,
            };
            assert!((v - expected).abs() < 1e-12, "entry ({r}, {c})");
        }
    }

    #[test]
    fn test_row_sums_match_lumped_mass() {
        let geometry = MeshGeometry::new(5, 3, 0.5).unwrap();
        let mass = MassMatrix::assemble(&geometry);

        for (i, row) in mass.csr().row_iter().enumerate() {
            let sum: f64 = row.values().iter().sum();
            assert!((sum - mass.lumped()[i]).abs() < 1e-12);
        }

        // corner rows only see the single element they belong to
        assert_eq!(mass.csr().row(0).nnz(), 4);
        assert!((mass.lumped()[0] - 0.25 * 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_impulse_converges_monotonically() {
        let (geometry, solver, f) = impulse_solver(SolverConfig::default());
        let n = geometry.node_count();

        // replay the relaxation step by step to watch the norm
        let mut residual = f.clone();
        let mut x: NodalField = DVector::zeros(n);
        let mut norms = vec![solver.residual_norm(&residual)];
        while *norms.last().unwrap() > 1e-5 {
            let increment = residual.component_div(solver.mass().lumped());
            x += &increment;
            residual -= solver.mass().apply(&increment);
            norms.push(solver.residual_norm(&residual));
            assert!(norms.len() < 500, "no convergence within 500 sweeps");
        }
        for pair in norms.windows(2) {
            assert!(pair[1] <= pair[0]);
        }

        let mut residual = f.clone();
        let mut increment = DVector::zeros(n);
        let mut solved = DVector::zeros(n);
        let report = solver.remap(&mut residual, &mut increment, &mut solved).unwrap();

        assert_eq!(report.iterations, norms.len() - 1);
        assert!(report.residual_norm <= 1e-5);
        assert!((solver.mass().apply(&solved) - &f).norm() < 1e-4);
    }

    #[test]
    fn test_iteration_cap() {
        let (geometry, solver, f) = impulse_solver(SolverConfig {
            max_iterations: 3,
            ..Default::default()
        });

        let mut residual = f;
        let mut increment = DVector::zeros(geometry.node_count());
        let mut x = DVector::zeros(geometry.node_count());

        let err = solver.remap(&mut residual, &mut increment, &mut x).unwrap_err();
        assert!(matches!(
            err,
            TransportError::ConvergenceFailure { iterations: 3, .. }
        ));
    }

    #[test]
    fn test_exact_guess_needs_no_sweeps() {
        let geometry = MeshGeometry::new(3, 3, 2.).unwrap();
        let solver = MassSolver::new(&geometry, SolverConfig::default());

        let guess: NodalField = DVector::from_element(geometry.node_count(), 0.7);
        let mut residual = solver.mass().apply(&guess);
        let mut increment = DVector::zeros(geometry.node_count());
        let mut x = guess.clone();

        let report = solver.remap(&mut residual, &mut increment, &mut x).unwrap();
        assert_eq!(report.iterations, 0);
        assert_eq!(x, guess);
    }

    #[test]
    fn test_conjugate_gradient_agrees_with_jacobi() {
        let geometry = MeshGeometry::new(6, 5, 1.).unwrap();
        let jacobi = MassSolver::new(&geometry, SolverConfig::default());
        let cg = MassSolver::new(
            &geometry,
            SolverConfig {
                method: MassSolverKind::ConjugateGradient,
                ..Default::default()
            },
        );

        let mut rng = rand::rng();
        let f: NodalField = DVector::from_fn(geometry.node_count(), |_, _| rng.random_range(0.0..1.0));
        let n = geometry.node_count();

        let (mut r1, mut inc, mut x1) = (f.clone(), DVector::zeros(n), DVector::zeros(n));
        jacobi.remap(&mut r1, &mut inc, &mut x1).unwrap();

        let (mut r2, mut x2) = (f.clone(), DVector::zeros(n));
        let report = cg.remap(&mut r2, &mut inc, &mut x2).unwrap();

        assert!(report.residual_norm <= 1e-5);
        assert!((x1 - x2).amax() < 1e-2);
    }

    #[test]
    fn test_conjugate_gradient_solves_impulse() {
        let (geometry, solver, f) = impulse_solver(SolverConfig {
            method: MassSolverKind::ConjugateGradient,
            ..Default::default()
        });
        let n = geometry.node_count();

        let (mut residual, mut increment, mut x) = (f.clone(), DVector::zeros(n), DVector::zeros(n));
        let report = solver.remap(&mut residual, &mut increment, &mut x).unwrap();

        assert!(report.iterations > 0);
        assert!(report.residual_norm <= 1e-5);
        assert!(solver.residual_norm(&(&f - solver.mass().apply(&x))) <= 1e-5);
    }
}
