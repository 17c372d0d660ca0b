use serde::Serialize;
use std::{
    error::Error,
    fs::{self, File},
    io::BufWriter,
    path::Path,
    sync::mpsc,
};
use tracing::debug;

use crate::{observers::serial_field::SerialField, sim::Snapshot};

#[derive(Serialize)]
pub struct SerialSnapshot {
    pub time: f64,
    pub step: u64,
    pub velocity_x: SerialField,
    pub velocity_y: SerialField,
    pub nodal: Vec<(String, SerialField)>,
    pub elemental: Vec<(String, SerialField)>,
}

impl From<&Snapshot> for SerialSnapshot {
    fn from(snapshot: &Snapshot) -> Self {
        let serialize_all = |fields: &[(String, na::DMatrix<f64>)]| {
            fields
                .iter()
                .map(|(name, m)| (name.clone(), SerialField::from_matrix(m)))
                .collect()
        };

        SerialSnapshot {
            time: snapshot.time,
            step: snapshot.step,
            velocity_x: SerialField::from_matrix(&snapshot.velocity[0]),
            velocity_y: SerialField::from_matrix(&snapshot.velocity[1]),
            nodal: serialize_all(&snapshot.nodal),
            elemental: serialize_all(&snapshot.elemental),
        }
    }
}

pub fn snapshot_save(snapshot: &Snapshot, snapshots_dir: &Path) -> Result<(), Box<dyn Error>> {
    let filename = snapshots_dir.join(format!("{}.json", snapshot.step));
    let writer = BufWriter::new(File::create(&filename)?);

    serde_json::to_writer(writer, &SerialSnapshot::from(snapshot))?;
    debug!("saved snapshot {:?}", filename);

    Ok(())
}

/// Write every inbound snapshot until the solver hangs up
pub fn snapshot_io_loop(
    inbound_snapshots: mpsc::Receiver<Snapshot>,
    snapshots_dir: &Path,
) -> Result<(), Box<dyn Error>> {
    if snapshots_dir.exists() {
        fs::remove_dir_all(snapshots_dir)?;
    }
    fs::create_dir_all(snapshots_dir)?;

    for inbound in inbound_snapshots {
        snapshot_save(&inbound, snapshots_dir)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::{env, thread};

    use super::*;
    use crate::sim::Simulation;

    #[test]
    fn test_io_loop_writes_until_hangup() {
        let dir = env::temp_dir().join(format!("remap-2d-snapshots-{}", std::process::id()));

        let mut sim = Simulation::new(3, 2, 1.).unwrap();
        sim.set_element_value(1, 2, 4.).unwrap();

        let (sender, receiver) = mpsc::channel();
        let dir_clone = dir.clone();
        let handle = thread::spawn(move || snapshot_io_loop(receiver, &dir_clone).is_ok());

        sender.send(sim.snapshot()).unwrap();
        sim.advance(0.1).unwrap();
        sender.send(sim.snapshot()).unwrap();
        drop(sender);

        assert!(handle.join().unwrap());

        let raw = fs::read_to_string(dir.join("1.json")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["step"], 1);
        assert_eq!(value["elemental"][0][0], "head");
        assert_eq!(value["elemental"][0][1]["nrows"], 2);
        assert!(dir.join("0.json").exists());

        fs::remove_dir_all(&dir).unwrap();
    }
}
