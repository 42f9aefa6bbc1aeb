//! The human-readable schedule log, and the point where solved cycle
//! timing lands back on the topology.

use std::io::{self, Write};

use tracing::warn;
use weft_net::{FlowKind, Network, NodeRef, PathTree};
use weft_smt::solver::Model;
use weft_smt::value::decode;

use crate::extract;
use crate::symbols;

/// Write the full schedule log and populate the topology from the model:
/// cycle start/duration per port, then per-flow extraction.
pub fn write_report(network: &mut Network, model: &Model, out: &mut dyn Write) -> io::Result<()> {
    writeln!(out, "SCHEDULER LOG:")?;
    writeln!(out)?;

    let Network {
        devices,
        switches,
        flows,
    } = network;

    writeln!(out, "SWITCH LIST:")?;
    for switch in switches.iter_mut() {
        writeln!(out, "  Switch name: {}", switch.name)?;
        writeln!(out, "    Max packet size: {}", switch.max_packet_size)?;
        writeln!(out, "    Port speed: {}", switch.port_speed)?;
        writeln!(out, "    Time to travel: {}", switch.time_to_travel)?;
        writeln!(out, "    Transmission time: {}", switch.transmission_time)?;
        let switch_name = switch.name.clone();
        for (port_idx, port) in switch.ports.iter_mut().enumerate() {
            let start = decode(
                model
                    .get(&symbols::cycle_start_var(&switch_name, port_idx))
                    .unwrap_or(""),
            );
            let duration = decode(
                model
                    .get(&symbols::cycle_duration_var(&switch_name, port_idx))
                    .unwrap_or(""),
            );
            port.cycle.start = start.value();
            port.cycle.duration = duration.value();
            writeln!(out, "    Port {} cycle start: {start}", port.name)?;
            writeln!(out, "    Port {} cycle duration: {duration}", port.name)?;
        }
        writeln!(out)?;
    }

    writeln!(out)?;
    writeln!(out, "FLOW LIST:")?;
    for flow in flows.iter_mut() {
        writeln!(out, "  Flow name: {}", flow.name)?;
        if let Some(device) = devices.iter().find(|d| d.name == flow.start_device) {
            writeln!(out, "    Start dev. first t1: {}", device.first_t1_time)?;
            writeln!(out, "    Start dev. HC: {}", device.hard_constraint_time)?;
            writeln!(
                out,
                "    Start dev. packet periodicity: {}",
                device.packet_periodicity
            )?;
        }

        match &flow.kind {
            FlowKind::Unicast { .. } => {
                warn!(flow = %flow.name, "unicast flow was not converted; omitting its schedule");
                writeln!(out, "    Flow type: Unicast")?;
                continue;
            }
            FlowKind::PublishSubscribe { tree } => {
                writeln!(out, "    Flow type: Multicast")?;
                let leaves = tree.leaves();
                let leaf_names: Vec<&str> =
                    leaves.iter().map(|&i| tree.nodes[i].node.name()).collect();
                writeln!(out, "    List of leaves: {}", leaf_names.join(", "))?;
                for &leaf in &leaves {
                    writeln!(
                        out,
                        "    Path to {}: {}",
                        tree.nodes[leaf].node.name(),
                        annotated_path(tree, leaf)
                    )?;
                }
            }
        }

        extract::extract_flow(flow, switches, model, out)?;
    }
    Ok(())
}

/// The root-to-leaf node sequence, with each switch annotated by the
/// fragment it forwards along this path.
fn annotated_path(tree: &PathTree, leaf: usize) -> String {
    let path = tree.path_from_root(leaf);
    let mut parts = Vec::with_capacity(path.len());
    for (pos, &idx) in path.iter().enumerate() {
        let node = &tree.nodes[idx];
        match &node.node {
            NodeRef::Device(name) => parts.push(name.clone()),
            NodeRef::Switch(name) => {
                let fragment = path.get(pos + 1).and_then(|&next| {
                    let child_pos = node.children.iter().position(|&c| c == next)?;
                    node.fragments.get(child_pos)
                });
                match fragment {
                    Some(frag) => parts.push(format!("{name}({})", frag.name)),
                    None => parts.push(name.clone()),
                }
            }
        }
    }
    parts.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use weft_net::{Cycle, Device, Flow, TsnSwitch};

    fn solved_network_and_model() -> (Network, Model) {
        let mut net = Network::new();
        net.add_device(Device::new("src", 0.0, 100.0, 50.0));
        net.add_device(Device::new("dst", 0.0, 100.0, 50.0));
        let mut sw = TsnSwitch::new("sw0", 1500.0, 125.0, 1.0, 12.0);
        sw.add_port("dst", Cycle::new(1, 1));
        sw.ports[0].register_fragment("flow0_f0");
        net.add_switch(sw);

        let mut flow = Flow::publish_subscribe("flow0", "src", 1);
        let tree = flow.tree_mut().expect("tree");
        let sw_idx = tree.add_child(tree.root, NodeRef::Switch("sw0".into()));
        tree.add_child(sw_idx, NodeRef::Device("dst".into()));
        flow.set_up_periods(50.0);
        net.add_flow(flow);

        let mut values = HashMap::new();
        for (k, v) in [
            ("cyc_sw0_0_start", "0"),
            ("cyc_sw0_0_dur", "50"),
            ("frag_flow0_f0_prio", "0"),
            ("frag_flow0_f0_dep_0", "0"),
            ("frag_flow0_f0_arr_0", "1"),
            ("frag_flow0_f0_sched_0", "13"),
            ("slot_sw0_0_p0_0_start", "0"),
            ("slot_sw0_0_p0_0_dur", "25"),
        ] {
            values.insert(k.to_string(), v.to_string());
        }
        (net, Model { values })
    }

    #[test]
    fn report_has_switch_and_flow_sections() {
        let (mut net, model) = solved_network_and_model();
        let mut log = Vec::new();
        write_report(&mut net, &model, &mut log).expect("writes");
        let text = String::from_utf8(log).expect("utf8");

        assert!(text.starts_with("SCHEDULER LOG:"));
        assert!(text.contains("SWITCH LIST:"));
        assert!(text.contains("  Switch name: sw0"));
        assert!(text.contains("FLOW LIST:"));
        assert!(text.contains("  Flow name: flow0"));
        assert!(text.contains("    List of leaves: dst"));
        assert!(text.contains("    Path to dst: src, sw0(flow0_f0), dst"));
        assert!(text.contains("    Fragment name: flow0_f0"));
    }

    #[test]
    fn report_populates_cycle_timing() {
        let (mut net, model) = solved_network_and_model();
        let mut log = Vec::new();
        write_report(&mut net, &model, &mut log).expect("writes");

        let cycle = &net.switches[0].ports[0].cycle;
        assert_eq!(cycle.start, Some(0.0));
        assert_eq!(cycle.duration, Some(50.0));
    }

    #[test]
    fn unicast_flows_appear_without_a_schedule() {
        let (mut net, model) = solved_network_and_model();
        net.add_flow(Flow::unicast(
            "legacy",
            vec![
                NodeRef::Device("src".into()),
                NodeRef::Switch("sw0".into()),
                NodeRef::Device("dst".into()),
            ],
            1,
        ));
        let mut log = Vec::new();
        write_report(&mut net, &model, &mut log).expect("writes");
        let text = String::from_utf8(log).expect("utf8");

        assert!(text.contains("  Flow name: legacy"));
        assert!(text.contains("    Flow type: Unicast"));
        assert_eq!(net.flows[1].total_packets, 0);
    }
}
