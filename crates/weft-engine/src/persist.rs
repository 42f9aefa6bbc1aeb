//! Saving and restoring topologies as JSON, solved timing included.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use thiserror::Error;
use tracing::debug;
use weft_net::Network;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub fn save_network(network: &Network, path: &Path) -> Result<(), PersistError> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(BufWriter::new(file), network)?;
    debug!(path = %path.display(), "network saved");
    Ok(())
}

pub fn load_network(path: &Path) -> Result<Network, PersistError> {
    let file = File::open(path)?;
    let network = serde_json::from_reader(BufReader::new(file))?;
    debug!(path = %path.display(), "network loaded");
    Ok(network)
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_net::{Cycle, Device, Flow, Network, NodeRef, TsnSwitch};
    use weft_smt::value::Decoded;

    #[test]
    fn solved_network_survives_a_save_load_cycle() {
        let mut net = Network::new();
        net.add_device(Device::new("src", 0.0, 100.0, 50.0));
        net.add_device(Device::new("dst", 0.0, 100.0, 50.0));
        let mut sw = TsnSwitch::new("sw0", 1500.0, 125.0, 1.0, 12.0);
        let port = sw.add_port("dst", Cycle::new(1, 1));
        sw.ports[port].register_fragment("flow0_f0");
        sw.ports[port].cycle.start = Some(0.0);
        sw.ports[port].cycle.duration = Some(50.0);
        sw.ports[port]
            .cycle
            .record_slot_use(0, vec![Decoded::Value(0.0)], vec![Decoded::Value(25.0)]);
        net.add_switch(sw);

        let mut flow = Flow::publish_subscribe("flow0", "src", 1);
        let tree = flow.tree_mut().expect("tree");
        let sw_idx = tree.add_child(tree.root, NodeRef::Switch("sw0".into()));
        tree.add_child(sw_idx, NodeRef::Device("dst".into()));
        flow.set_up_periods(50.0);
        if let Some(tree) = flow.tree_mut() {
            tree.nodes[1].fragments[0].set_priority(0);
            tree.nodes[1].fragments[0].add_departure(Decoded::Value(0.0));
            tree.nodes[1].fragments[0].add_arrival(Decoded::Invalid);
        }
        net.add_flow(flow);

        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("network.json");
        save_network(&net, &path).expect("save");
        let restored = load_network(&path).expect("load");

        assert_eq!(restored, net, "solved timing and ledgers must survive");
    }

    #[test]
    fn loading_a_missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = load_network(&dir.path().join("absent.json")).expect_err("missing file");
        assert!(matches!(err, PersistError::Io(_)));
    }

    #[test]
    fn loading_garbage_is_a_serde_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("garbage.json");
        std::fs::write(&path, "not json").expect("write");
        let err = load_network(&path).expect_err("garbage");
        assert!(matches!(err, PersistError::Serde(_)));
    }
}
