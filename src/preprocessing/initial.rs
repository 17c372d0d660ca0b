/// Applies initial conditions to a fresh simulation
use rand::{Rng, SeedableRng, rngs::StdRng};
use tracing::debug;

use crate::{
    preprocessing::{InitialConditions, VelocityPreset},
    sim::{Simulation, TransportResult},
};

/// Load the velocity preset and the splashes into `sim`, then apply the
/// wall condition to the injected velocity.
///
/// Parameters
/// - `sim` - A freshly initialized simulation
/// - `initial` - The conditions to apply
pub fn apply_initial_conditions(sim: &mut Simulation, initial: &InitialConditions) -> TransportResult<()> {
    let geometry = *sim.geometry();
    let dx = geometry.dx();

    let (cx, cy) = (0.5 * geometry.ex() as f64 * dx, 0.5 * geometry.ey() as f64 * dx);
    let radius = cx.min(cy);

    for (row, col) in geometry.nodes() {
        let (x, y) = (col as f64 * dx, row as f64 * dx);

        let (vx, vy) = match initial.velocity {
            VelocityPreset::Still => (0., 0.),
            VelocityPreset::Uniform { vx, vy } => (vx, vy),
            VelocityPreset::Vortex { speed } => {
                let omega = speed / radius;
                (-omega * (y - cy), omega * (x - cx))
            }
        };

        sim.set_nodal_velocity(row, col, vx, vy)?;
    }
    sim.enforce_boundary();

    for splash in &initial.splashes {
        sim.set_element_value(splash.row, splash.col, splash.value)?;
    }

    let mut rng = match initial.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    for _ in 0..initial.random_splashes {
        let row = rng.random_range(0..geometry.ey());
        let col = rng.random_range(0..geometry.ex());
        debug!(row, col, "random splash");
        sim.set_element_value(row, col, 1.)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{preprocessing::Splash, sim::HEAD};

    #[test]
    fn test_vortex_is_tangential_and_walled() {
        let mut sim = Simulation::new(8, 8, 0.25).unwrap();
        let initial = InitialConditions {
            velocity: VelocityPreset::Vortex { speed: 2. },
            ..Default::default()
        };

        apply_initial_conditions(&mut sim, &initial).unwrap();

        // center node is still; the field turns counter-clockwise
        assert_eq!(sim.nodal_velocity(4, 4), Ok((0., 0.)));
        let (vx, vy) = sim.nodal_velocity(4, 6).unwrap();
        assert!(vx.abs() < 1e-12 && vy > 0.);
        let (vx, vy) = sim.nodal_velocity(6, 4).unwrap();
        assert!(vx < 0. && vy.abs() < 1e-12);

        // walls carry no normal velocity
        assert_eq!(sim.nodal_velocity(4, 0).unwrap().0, 0.);
        assert_eq!(sim.nodal_velocity(8, 4).unwrap().1, 0.);
    }

    #[test]
    fn test_seeded_splashes_are_reproducible() {
        let initial = InitialConditions {
            splashes: vec![Splash {
                row: 0,
                col: 1,
                value: 0.5,
            }],
            random_splashes: 5,
            seed: Some(7),
            ..Default::default()
        };

        let mut a = Simulation::new(6, 6, 1.).unwrap();
        let mut b = Simulation::new(6, 6, 1.).unwrap();
        apply_initial_conditions(&mut a, &initial).unwrap();
        apply_initial_conditions(&mut b, &initial).unwrap();

        assert_eq!(a.fields().element(HEAD).unwrap(), b.fields().element(HEAD).unwrap());
        assert!(a.total_mass(HEAD).unwrap() > 0.);
    }

    #[test]
    fn test_splash_outside_mesh_is_rejected() {
        let mut sim = Simulation::new(3, 3, 1.).unwrap();
        let initial = InitialConditions {
            splashes: vec![Splash {
                row: 3,
                col: 0,
                value: 1.,
            }],
            ..Default::default()
        };

        assert!(apply_initial_conditions(&mut sim, &initial).is_err());
    }
}
