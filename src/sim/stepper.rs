// One remap step as an explicit state machine

use tracing::{debug, trace};

use crate::sim::{
    boundary,
    error::{TransportError, TransportResult},
    fields::{ElementField, FieldStore, NodalField, Scratch},
    geometry::MeshGeometry,
    mass::{MassSolver, SolveReport},
    operator::RemapOperator,
    simulation::Simulation,
    transfer,
};

/// Phases of a single step. A step runs the full cycle back to `Idle`, or
/// fails before its fields are committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepPhase {
    Idle,
    OperatorRebuilt,
    FieldsUpdated,
    BoundaryEnforced,
}

impl StepPhase {
    pub fn next(self) -> Self {
        match self {
            StepPhase::Idle => StepPhase::OperatorRebuilt,
            StepPhase::OperatorRebuilt => StepPhase::FieldsUpdated,
            StepPhase::FieldsUpdated => StepPhase::BoundaryEnforced,
            StepPhase::BoundaryEnforced => StepPhase::Idle,
        }
    }
}

/// Summary of a completed step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepReport {
    pub dt: f64,
    /// Simulation time after the step
    pub time: f64,
    /// Largest traced displacement in reference coordinates
    pub courant: f64,
    /// Mass-solver sweeps summed over all fields
    pub iterations: usize,
}

/// The read-only pieces every field transfer needs
struct Pipeline<'a> {
    geometry: &'a MeshGeometry,
    operator: &'a RemapOperator,
    solver: &'a MassSolver,
}

impl Pipeline<'_> {
    /// Nodal → elements → remapped nodes. The old field is the initial guess.
    fn remap_nodal(
        &self,
        field: &NodalField,
        out: &mut NodalField,
        scratch: &mut Scratch,
    ) -> TransportResult<SolveReport> {
        transfer::nodal_to_elemental(self.geometry, field, &mut scratch.interpolated);
        transfer::elemental_to_nodal(
            self.geometry,
            self.operator,
            &scratch.interpolated,
            &mut scratch.residual,
        );

        out.copy_from(field);
        self.solver
            .remap(&mut scratch.residual, &mut scratch.increment, out)
    }

    /// Elements → remapped nodal proxy → elements. The proxy starts from the
    /// nodal average of the old field.
    fn remap_elemental(
        &self,
        field: &ElementField,
        out: &mut ElementField,
        scratch: &mut Scratch,
    ) -> TransportResult<SolveReport> {
        transfer::elemental_to_nodal(self.geometry, self.operator, field, &mut scratch.residual);
        transfer::nodal_average(self.geometry, field, &mut scratch.proxy);

        let report = self.solver.remap(
            &mut scratch.residual,
            &mut scratch.increment,
            &mut scratch.proxy,
        )?;

        transfer::nodal_to_elemental(self.geometry, &scratch.proxy, out);
        Ok(report)
    }
}

impl Simulation {
    /// Advance every tracked field by one remap step of size `dt`.
    ///
    /// Either the whole step commits (fields, boundary condition, time) or
    /// the instance is left exactly as it was and the error is returned.
    pub fn advance(&mut self, dt: f64) -> TransportResult<StepReport> {
        if !(dt.is_finite() && dt > 0.) {
            return Err(TransportError::InvalidTimeStep { dt });
        }

        let mut phase = StepPhase::Idle;
        let mut courant = 0.;
        let mut iterations = 0;

        loop {
            let next = match phase {
                StepPhase::Idle => {
                    let (vx, vy) = self.store.velocity();
                    courant = self.builder.rebuild(&mut self.operator, vx, vy, dt)?;
                    phase.next()
                }
                StepPhase::OperatorRebuilt => {
                    iterations = self.update_fields()?;
                    phase.next()
                }
                StepPhase::FieldsUpdated => {
                    self.enforce_staged_boundary();
                    phase.next()
                }
                StepPhase::BoundaryEnforced => {
                    self.store.commit_staged();
                    self.time += dt;
                    self.steps += 1;
                    phase.next()
                }
            };

            trace!(from = ?phase, to = ?next, "step transition");
            phase = next;

            if phase == StepPhase::Idle {
                break;
            }
        }

        debug!(
            step = self.steps,
            time = self.time,
            dt,
            courant,
            iterations,
            "step complete"
        );

        Ok(StepReport {
            dt,
            time: self.time,
            courant,
            iterations,
        })
    }

    /// Compute the new value of every field into the staging buffers
    fn update_fields(&mut self) -> TransportResult<usize> {
        let pipeline = Pipeline {
            geometry: &self.geometry,
            operator: &self.operator,
            solver: &self.solver,
        };
        let FieldStore {
            nodal,
            elemental,
            workspace,
            ..
        } = &mut self.store;

        let mut iterations = 0;

        for (field, staged) in nodal.iter().zip(workspace.staged_nodal.iter_mut()) {
            let report = pipeline.remap_nodal(&field.values, staged, &mut workspace.scratch)?;
            trace!(field = %field.name, iterations = report.iterations, "nodal field remapped");
            iterations += report.iterations;
        }

        for (field, staged) in elemental.iter().zip(workspace.staged_elemental.iter_mut()) {
            let report = pipeline.remap_elemental(&field.values, staged, &mut workspace.scratch)?;
            trace!(field = %field.name, iterations = report.iterations, "elemental field remapped");
            iterations += report.iterations;
        }

        Ok(iterations)
    }

    fn enforce_staged_boundary(&mut self) {
        let (x, rest) = self.store.workspace.staged_nodal.split_at_mut(1);
        boundary::enforce_no_penetration(&self.geometry, &mut x[0], &mut rest[0]);
    }
}

#[cfg(test)]
mod tests {
    use rand::Rng;

    use super::*;
    use crate::sim::{
        config::{MassSolverKind, SolverConfig, StabilityPolicy},
        fields::{HEAD, VELOCITY_X, VELOCITY_Y},
    };

    fn head_centroid_x(sim: &Simulation) -> f64 {
        let head = sim.fields().element(HEAD).unwrap();
        let geometry = sim.geometry();
        let weighted: f64 = geometry
            .elements()
            .map(|(r, c)| (c as f64 + 0.5) * head[geometry.element_index(r, c)])
            .sum();
        weighted / head.sum()
    }

    #[test]
    fn test_phase_cycle() {
        let mut phase = StepPhase::Idle;
        let mut seen = vec![phase];
        for _ in 0..4 {
            phase = phase.next();
            seen.push(phase);
        }
        assert_eq!(
            seen,
            vec![
                StepPhase::Idle,
                StepPhase::OperatorRebuilt,
                StepPhase::FieldsUpdated,
                StepPhase::BoundaryEnforced,
                StepPhase::Idle,
            ]
        );
    }

    #[test]
    fn test_rest_preserves_uniform_fields() {
        let mut sim = Simulation::new(5, 4, 0.5).unwrap();
        let tracer = sim.add_nodal_field("tracer");
        sim.fill_element(HEAD, &[0.8; 20]).unwrap();
        sim.fill_nodal(tracer, &[2.5; 30]).unwrap();

        for dt in [1e-3, 0.1, 10.] {
            let report = sim.advance(dt).unwrap();
            assert_eq!(report.courant, 0.);
        }

        assert!(sim.fields().element(HEAD).unwrap().iter().all(|v| (v - 0.8).abs() < 1e-9));
        assert!(sim.fields().nodal(tracer).unwrap().iter().all(|v| (v - 2.5).abs() < 1e-9));
        assert!((sim.time() - 10.101).abs() < 1e-12);
        assert_eq!(sim.steps(), 3);
    }

    #[test]
    fn test_click_on_uniform_field_at_rest() {
        let mut sim = Simulation::new(4, 4, 1.).unwrap();
        sim.fill_element(HEAD, &[1.; 16]).unwrap();
        sim.set_element_value(1, 2, 1.).unwrap();

        sim.advance(0.01).unwrap();

        assert!((sim.element_value(1, 2).unwrap() - 1.).abs() < 1e-9);
    }

    #[test]
    fn test_impulse_at_rest_keeps_mass_and_peak() {
        let mut sim = Simulation::new(4, 4, 1.).unwrap();
        sim.set_element_value(1, 2, 1.).unwrap();

        sim.advance(0.01).unwrap();

        let head = sim.fields().element(HEAD).unwrap();
        let peak = head.imax();
        assert_eq!(peak, sim.geometry().element_index(1, 2));
        assert!((sim.total_mass(HEAD).unwrap() - 1.).abs() < 1e-3);
    }

    #[test]
    fn test_boundary_is_zero_after_advance() {
        let mut sim = Simulation::new(6, 5, 1.).unwrap();
        let mut rng = rand::rng();
        for (row, col) in sim.geometry().nodes() {
            let (vx, vy) = (rng.random_range(-0.5..0.5), rng.random_range(-0.5..0.5));
            sim.set_nodal_velocity(row, col, vx, vy).unwrap();
        }

        sim.advance(0.1).unwrap();

        let geometry = *sim.geometry();
        for row in 0..geometry.ny() {
            assert_eq!(sim.nodal_value(VELOCITY_X, row, 0), Ok(0.));
            assert_eq!(sim.nodal_value(VELOCITY_X, row, geometry.nx() - 1), Ok(0.));
        }
        for col in 0..geometry.nx() {
            assert_eq!(sim.nodal_value(VELOCITY_Y, 0, col), Ok(0.));
            assert_eq!(sim.nodal_value(VELOCITY_Y, geometry.ny() - 1, col), Ok(0.));
        }
    }

    #[test]
    fn test_invalid_time_step_mutates_nothing() {
        let mut sim = Simulation::new(4, 4, 1.).unwrap();
        sim.set_element_value(1, 1, 1.).unwrap();
        sim.set_nodal_velocity(2, 2, 0.3, 0.1).unwrap();
        let before = sim.snapshot();

        for dt in [-1., 0., f64::NAN, f64::INFINITY] {
            assert!(matches!(
                sim.advance(dt),
                Err(TransportError::InvalidTimeStep { .. })
            ));
        }

        let after = sim.snapshot();
        assert_eq!(after.elemental[0].1, before.elemental[0].1);
        assert_eq!(after.velocity, before.velocity);
        assert_eq!(sim.time(), 0.);
        assert_eq!(sim.steps(), 0);
    }

    #[test]
    fn test_convergence_failure_is_transactional() {
        let config = SolverConfig {
            max_iterations: 1,
            ..Default::default()
        };
        let mut sim = Simulation::with_config(4, 4, 1., config).unwrap();
        sim.set_element_value(1, 1, 1.).unwrap();
        let before = sim.snapshot();

        assert!(matches!(
            sim.advance(0.1),
            Err(TransportError::ConvergenceFailure { iterations: 1, .. })
        ));
        assert_eq!(sim.snapshot().elemental[0].1, before.elemental[0].1);
        assert_eq!(sim.time(), 0.);

        // still usable: a uniform field at rest needs no sweeps
        sim.fill_element(HEAD, &[0.5; 16]).unwrap();
        let report = sim.advance(0.1).unwrap();
        assert_eq!(report.iterations, 0);
        assert_eq!(sim.steps(), 1);
    }

    #[test]
    fn test_stability_bound() {
        let build = |stability| {
            let config = SolverConfig {
                stability,
                ..Default::default()
            };
            let mut sim = Simulation::with_config(4, 4, 1., config).unwrap();
            sim.set_nodal_velocity(2, 2, 4., 0.).unwrap();
            sim.set_element_value(1, 1, 1.).unwrap();
            sim
        };

        // the four elements around node (2, 2) see xi = 0.5 * 1.0 * 4 = 2
        let mut rejecting = build(StabilityPolicy::Reject);
        assert!(rejecting.max_stable_dt() < 1.);
        assert!(matches!(
            rejecting.advance(1.),
            Err(TransportError::StabilityBound { .. })
        ));
        assert_eq!(rejecting.nodal_velocity(2, 2), Ok((4., 0.)));
        assert_eq!(rejecting.time(), 0.);

        let dt = rejecting.max_stable_dt();
        assert!(rejecting.advance(dt).is_ok());

        let mut clamping = build(StabilityPolicy::Clamp);
        let report = clamping.advance(1.).unwrap();
        assert!((report.courant - 2.).abs() < 1e-12);
    }

    #[test]
    fn test_uniform_flow_moves_blob_downstream() {
        let mut sim = Simulation::new(10, 8, 1.).unwrap();
        for (row, col) in sim.geometry().nodes() {
            sim.set_nodal_velocity(row, col, 1., 0.).unwrap();
        }
        sim.enforce_boundary();
        for row in 3..5 {
            for col in 2..4 {
                sim.set_element_value(row, col, 1.).unwrap();
            }
        }

        let start = head_centroid_x(&sim);
        let mass = sim.total_mass(HEAD).unwrap();
        for _ in 0..5 {
            sim.advance(0.2).unwrap();
        }

        assert!(head_centroid_x(&sim) > start + 0.5);
        // only the wall layers, where the flow is compressed, change the total
        assert!((sim.total_mass(HEAD).unwrap() - mass).abs() < 0.05 * mass);
    }

    #[test]
    fn test_conjugate_gradient_step_matches_jacobi() {
        let run = |method| {
            let config = SolverConfig {
                method,
                ..Default::default()
            };
            let mut sim = Simulation::with_config(6, 6, 1., config).unwrap();
            sim.set_nodal_velocity(3, 3, 0.5, 0.25).unwrap();
            sim.set_element_value(2, 3, 1.).unwrap();
            sim.advance(0.1).unwrap();
            sim.fields().element(HEAD).unwrap().clone()
        };

        let jacobi = run(MassSolverKind::Jacobi);
        let cg = run(MassSolverKind::ConjugateGradient);
        assert!((jacobi - cg).amax() < 1e-2);
    }

    #[test]
    fn test_conjugate_gradient_advances_impulse() {
        let config = SolverConfig {
            method: MassSolverKind::ConjugateGradient,
            ..Default::default()
        };
        let mut sim = Simulation::with_config(4, 4, 1., config).unwrap();
        sim.set_element_value(1, 2, 1.).unwrap();

        let report = sim.advance(0.01).unwrap();

        assert!(report.iterations > 0);
        assert_eq!(sim.steps(), 1);
        assert!((sim.total_mass(HEAD).unwrap() - 1.).abs() < 1e-3);
    }
}
