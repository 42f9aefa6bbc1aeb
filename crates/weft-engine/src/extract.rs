//! Walks a solved model back through each flow's path tree: prints the
//! per-fragment schedule, fills the fragment timing sequences, and records
//! slot usage on every port carrying the fragment.

use std::io::{self, Write};

use tracing::warn;
use weft_net::{Flow, FlowFragment, NodeRef, TsnSwitch};
use weft_smt::solver::Model;
use weft_smt::value::{decode, Decoded};

use crate::symbols;

/// Extract one flow's schedule. Mutates the flow's fragments and the slot
/// ledgers of the switches it crosses; a flow still in the unicast
/// representation is reported and left untouched.
pub fn extract_flow(
    flow: &mut Flow,
    switches: &mut [TsnSwitch],
    model: &Model,
    out: &mut dyn Write,
) -> io::Result<()> {
    let flow_name = flow.name.clone();
    let Some(tree) = flow.tree_mut() else {
        warn!(flow = %flow_name, "unicast flow reached extraction unconverted; skipping");
        return Ok(());
    };

    let mut transmissions = 0u32;
    let mut stack = vec![tree.root];
    while let Some(idx) = stack.pop() {
        let children = tree.nodes[idx].children.clone();
        for &child in children.iter().rev() {
            stack.push(child);
        }

        match tree.nodes[idx].node.clone() {
            NodeRef::Device(_) => {
                if tree.nodes[idx].parent.is_some() {
                    writeln!(out, "    [END OF BRANCH]")?;
                }
            }
            NodeRef::Switch(switch_name) => {
                let Some(sw_pos) = switches.iter().position(|s| s.name == switch_name) else {
                    warn!(flow = %flow_name, switch = %switch_name, "fragment references unknown switch");
                    continue;
                };
                for frag in &mut tree.nodes[idx].fragments {
                    transmissions +=
                        extract_fragment(frag, &mut switches[sw_pos], model, out)?;
                }
            }
        }
    }
    flow.add_to_total_packets(transmissions);
    Ok(())
}

fn extract_fragment(
    frag: &mut FlowFragment,
    switch: &mut TsnSwitch,
    model: &Model,
    out: &mut dyn Write,
) -> io::Result<u32> {
    let switch_name = switch.name.clone();

    writeln!(out, "    Fragment name: {}", frag.name)?;
    writeln!(out, "        Fragment node: {}", frag.node_name)?;
    writeln!(out, "        Fragment next hop: {}", frag.next_hop)?;

    let priority_text = model
        .get(&symbols::fragment_priority_var(&frag.name))
        .unwrap_or("");
    writeln!(out, "        Fragment priority: {priority_text}")?;
    let priority = match decode(priority_text) {
        Decoded::Value(v) if v >= 0.0 => {
            let p = v as u32;
            frag.set_priority(p);
            Some(p)
        }
        _ => {
            warn!(fragment = %frag.name, "could not decode fragment priority");
            None
        }
    };

    // Slot layout of the egress port, under the solved priority.
    let port_idx = switch
        .ports
        .iter()
        .position(|p| p.connects_to == frag.next_hop);
    if let (Some(port_idx), Some(priority)) = (port_idx, priority) {
        for slot in 0..switch.ports[port_idx].cycle.num_slots {
            let start = decode(
                model
                    .get(&symbols::slot_start_var(&switch_name, port_idx, priority, slot))
                    .unwrap_or(""),
            );
            let duration = decode(
                model
                    .get(&symbols::slot_duration_var(&switch_name, port_idx, priority, slot))
                    .unwrap_or(""),
            );
            writeln!(out, "        Fragment slot start {slot}: {start}")?;
            writeln!(out, "        Fragment slot duration {slot}: {duration}")?;
        }
    }

    writeln!(out, "        Fragment times-")?;
    for i in 0..frag.packets_sent {
        let departure = decode(
            model
                .get(&symbols::fragment_departure_var(&frag.name, i))
                .unwrap_or(""),
        );
        let arrival = decode(
            model
                .get(&symbols::fragment_arrival_var(&frag.name, i))
                .unwrap_or(""),
        );
        let scheduled = decode(
            model
                .get(&symbols::fragment_scheduled_var(&frag.name, i))
                .unwrap_or(""),
        );
        writeln!(out, "          ({i}) Fragment departure time: {departure}")?;
        writeln!(out, "          ({i}) Fragment arrival time: {arrival}")?;
        writeln!(out, "          ({i}) Fragment scheduled time: {scheduled}")?;
        writeln!(out, "          ----------------------------")?;
        frag.add_departure(departure);
        frag.add_arrival(arrival);
        frag.add_scheduled(scheduled);
    }

    // Record the solved slot layout on every port that carries this
    // fragment.
    if let Some(priority) = priority {
        for (port_idx, port) in switch.ports.iter_mut().enumerate() {
            if !port.carries_fragment(&frag.name) {
                continue;
            }
            let mut starts = Vec::new();
            let mut durations = Vec::new();
            for slot in 0..port.cycle.num_slots {
                starts.push(decode(
                    model
                        .get(&symbols::slot_start_var(&switch_name, port_idx, priority, slot))
                        .unwrap_or(""),
                ));
                durations.push(decode(
                    model
                        .get(&symbols::slot_duration_var(&switch_name, port_idx, priority, slot))
                        .unwrap_or(""),
                ));
            }
            port.cycle.record_slot_use(priority, starts, durations);
        }
    }

    Ok(frag.packets_sent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use weft_net::Cycle;

    fn model_with(entries: &[(&str, &str)]) -> Model {
        let mut values = HashMap::new();
        for (k, v) in entries {
            values.insert(k.to_string(), v.to_string());
        }
        Model { values }
    }

    fn one_hop_flow() -> (Flow, Vec<TsnSwitch>) {
        let mut flow = Flow::publish_subscribe("flow0", "src", 2);
        let tree = flow.tree_mut().expect("tree");
        let sw = tree.add_child(tree.root, NodeRef::Switch("sw0".into()));
        tree.add_child(sw, NodeRef::Device("dst".into()));
        flow.set_up_periods(50.0);

        let mut switch = TsnSwitch::new("sw0", 1500.0, 125.0, 1.0, 12.0);
        switch.add_port("dst", Cycle::new(1, 1));
        switch.ports[0].register_fragment("flow0_f0");
        (flow, vec![switch])
    }

    #[test]
    fn extraction_fills_timing_and_ledger() {
        let (mut flow, mut switches) = one_hop_flow();
        let model = model_with(&[
            ("frag_flow0_f0_prio", "0"),
            ("frag_flow0_f0_dep_0", "0"),
            ("frag_flow0_f0_arr_0", "1"),
            ("frag_flow0_f0_sched_0", "13"),
            ("frag_flow0_f0_dep_1", "50"),
            ("frag_flow0_f0_arr_1", "51"),
            ("frag_flow0_f0_sched_1", "63"),
            ("slot_sw0_0_p0_0_start", "0"),
            ("slot_sw0_0_p0_0_dur", "25"),
        ]);

        let mut log = Vec::new();
        extract_flow(&mut flow, &mut switches, &model, &mut log).expect("extracts");

        let tree = flow.tree().expect("tree");
        let frag = &tree.nodes[1].fragments[0];
        assert_eq!(frag.priority, Some(0));
        assert_eq!(frag.departures, vec![Decoded::Value(0.0), Decoded::Value(50.0)]);
        assert_eq!(frag.arrivals, vec![Decoded::Value(1.0), Decoded::Value(51.0)]);
        assert_eq!(frag.scheduled, vec![Decoded::Value(13.0), Decoded::Value(63.0)]);
        assert_eq!(flow.total_packets, 2);

        let ledger = &switches[0].ports[0].cycle.slot_ledger;
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[0].priority, 0);
        assert_eq!(ledger[0].starts, vec![Decoded::Value(0.0)]);
        assert_eq!(ledger[0].durations, vec![Decoded::Value(25.0)]);

        let text = String::from_utf8(log).expect("utf8");
        assert!(text.contains("Fragment name: flow0_f0"));
        assert!(text.contains("(1) Fragment scheduled time: 63"));
        assert!(text.contains("[END OF BRANCH]"));
        assert_eq!(
            text.matches("----------------------------").count(),
            2,
            "one dashed rule after every packet triple"
        );
    }

    #[test]
    fn rational_model_values_decode_before_storage() {
        let (mut flow, mut switches) = one_hop_flow();
        let model = model_with(&[
            ("frag_flow0_f0_prio", "0"),
            ("frag_flow0_f0_dep_0", "0"),
            ("frag_flow0_f0_arr_0", "1/2"),
            ("frag_flow0_f0_sched_0", "27/2"),
            ("frag_flow0_f0_dep_1", "50"),
            ("frag_flow0_f0_arr_1", "101/2"),
            ("frag_flow0_f0_sched_1", "127/2"),
            ("slot_sw0_0_p0_0_start", "0"),
            ("slot_sw0_0_p0_0_dur", "25"),
        ]);

        let mut log = Vec::new();
        extract_flow(&mut flow, &mut switches, &model, &mut log).expect("extracts");

        let tree = flow.tree().expect("tree");
        let frag = &tree.nodes[1].fragments[0];
        assert_eq!(frag.arrivals[0], Decoded::Value(0.5));
        assert_eq!(frag.scheduled[0], Decoded::Value(13.5));
    }

    #[test]
    fn missing_values_are_stored_invalid_and_logged_as_sentinel() {
        let (mut flow, mut switches) = one_hop_flow();
        let model = model_with(&[("frag_flow0_f0_prio", "0")]);

        let mut log = Vec::new();
        extract_flow(&mut flow, &mut switches, &model, &mut log).expect("extracts");

        let tree = flow.tree().expect("tree");
        let frag = &tree.nodes[1].fragments[0];
        assert_eq!(frag.departures, vec![Decoded::Invalid, Decoded::Invalid]);

        let text = String::from_utf8(log).expect("utf8");
        assert!(text.contains("(0) Fragment departure time: -1"));
    }

    #[test]
    fn unconverted_unicast_flow_is_left_untouched() {
        let mut flow = Flow::unicast(
            "legacy",
            vec![
                NodeRef::Device("src".into()),
                NodeRef::Switch("sw0".into()),
                NodeRef::Device("dst".into()),
            ],
            1,
        );
        let mut switch = TsnSwitch::new("sw0", 1500.0, 125.0, 1.0, 12.0);
        switch.add_port("dst", Cycle::new(1, 1));
        let mut switches = vec![switch];

        let mut log = Vec::new();
        extract_flow(&mut flow, &mut switches, &Model::default(), &mut log).expect("no-op");

        assert_eq!(flow.total_packets, 0);
        assert!(log.is_empty());
        assert!(switches[0].ports[0].cycle.slot_ledger.is_empty());
    }
}
