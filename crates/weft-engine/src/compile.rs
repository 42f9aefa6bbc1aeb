//! Constraint compiler: lowers a topology into mixed integer/real
//! arithmetic over named solver variables.
//!
//! Encoding runs in a fixed order. Flows are prepared first (unicast
//! conversion, fragment creation, period propagation), then cycle sizing,
//! per-flow timing, per-switch slot layout and frame isolation, jitter, and
//! finally the end-to-end deadline bounds. Fragment-to-port registration
//! happens between the flow and switch passes so isolation sees every
//! fragment sharing a port.

use std::collections::HashMap;

use tracing::{debug, warn};
use weft_net::{FlowFragment, FlowKind, Network, NodeRef, TsnSwitch};
use weft_smt::solver::SmtSolver;
use weft_smt::sorts::SmtSort;
use weft_smt::terms::SmtTerm;

use crate::pipeline::{SynthesisError, SynthesisOptions, UnicastPolicy};
use crate::symbols::{self, SymbolTable};

/// A fragment's routing through one switch port, collected during the flow
/// pass and applied before the switch pass.
struct Registration {
    switch: String,
    next_hop: String,
    fragment: String,
    packets_sent: u32,
}

pub fn compile<S: SmtSolver>(
    network: &mut Network,
    solver: &mut S,
    symbols: &mut SymbolTable,
    options: &SynthesisOptions,
) -> Result<(), SynthesisError> {
    prepare_flows(network, options)?;
    encode_cycles(network, solver, symbols)?;
    let registrations = encode_flows(network, solver, symbols)?;
    apply_registrations(network, &registrations)?;
    encode_switches(network, solver, symbols, &registrations)?;
    encode_jitter(network, solver, symbols, options.jitter_upper_bound)?;
    encode_hard_constraints(network, solver, symbols)?;
    Ok(())
}

fn solver_err(err: impl std::fmt::Display) -> SynthesisError {
    SynthesisError::Solver(err.to_string())
}

fn topology_err(message: impl Into<String>) -> SynthesisError {
    SynthesisError::Topology(message.into())
}

/// Apply the unicast policy, then create fragments and propagate each
/// flow's packet period from its start device.
fn prepare_flows(network: &mut Network, options: &SynthesisOptions) -> Result<(), SynthesisError> {
    for i in 0..network.flows.len() {
        if matches!(network.flows[i].kind, FlowKind::Unicast { .. }) {
            let flow_name = network.flows[i].name.clone();
            match options.unicast_policy {
                UnicastPolicy::Convert => {
                    debug!(flow = %flow_name, "converting unicast flow to a path tree");
                    network.flows[i].convert_unicast();
                }
                UnicastPolicy::Skip => {
                    warn!(flow = %flow_name, "skipping unicast flow");
                    continue;
                }
                UnicastPolicy::Fail => {
                    return Err(SynthesisError::UnconvertedUnicast { flow: flow_name })
                }
            }
        }
        let start_device = network.flows[i].start_device.clone();
        let period = network
            .device(&start_device)
            .ok_or_else(|| {
                topology_err(format!(
                    "flow {} starts at unknown device {start_device}",
                    network.flows[i].name
                ))
            })?
            .packet_periodicity;
        network.flows[i].set_up_periods(period);
    }
    Ok(())
}

/// Per-port cycle variables. The cycle must fit inside the tightest packet
/// period of any flow crossing the switch, otherwise a packet could miss a
/// whole cycle.
fn encode_cycles<S: SmtSolver>(
    network: &Network,
    solver: &mut S,
    symbols: &mut SymbolTable,
) -> Result<(), SynthesisError> {
    let min_period = min_period_per_switch(network);
    for switch in &network.switches {
        for port_idx in 0..switch.ports.len() {
            let start = symbols
                .declare(
                    solver,
                    &symbols::cycle_start_var(&switch.name, port_idx),
                    SmtSort::Real,
                )
                .map_err(solver_err)?;
            let duration = symbols
                .declare(
                    solver,
                    &symbols::cycle_duration_var(&switch.name, port_idx),
                    SmtSort::Real,
                )
                .map_err(solver_err)?;

            solver
                .assert(&start.clone().ge(SmtTerm::real(0.0)))
                .map_err(solver_err)?;
            solver
                .assert(&start.le(duration.clone()))
                .map_err(solver_err)?;
            solver
                .assert(&duration.clone().gt(SmtTerm::real(0.0)))
                .map_err(solver_err)?;
            if let Some(&period) = min_period.get(&switch.name) {
                solver
                    .assert(&duration.le(SmtTerm::real(period)))
                    .map_err(solver_err)?;
            }
        }
    }
    Ok(())
}

fn min_period_per_switch(network: &Network) -> HashMap<String, f64> {
    let mut min_period: HashMap<String, f64> = HashMap::new();
    for flow in &network.flows {
        let Some(tree) = flow.tree() else { continue };
        for node in &tree.nodes {
            let NodeRef::Switch(switch_name) = &node.node else {
                continue;
            };
            for frag in &node.fragments {
                min_period
                    .entry(switch_name.clone())
                    .and_modify(|m| *m = m.min(frag.packet_period))
                    .or_insert(frag.packet_period);
            }
        }
    }
    min_period
}

/// Per-fragment timing: departure, arrival, scheduled, priority, and slot
/// containment. Walks each flow's tree with an explicit stack and chains
/// hops through shared departure/scheduled equalities.
fn encode_flows<S: SmtSolver>(
    network: &Network,
    solver: &mut S,
    symbols: &mut SymbolTable,
) -> Result<Vec<Registration>, SynthesisError> {
    let mut registrations = Vec::new();

    for flow in &network.flows {
        let Some(tree) = flow.tree() else {
            // Skip-policy leftovers stay out of the constraint system.
            continue;
        };
        let first_t1 = network
            .device(&flow.start_device)
            .ok_or_else(|| {
                topology_err(format!(
                    "flow {} starts at unknown device {}",
                    flow.name, flow.start_device
                ))
            })?
            .first_t1_time;

        let mut stack = vec![tree.root];
        while let Some(idx) = stack.pop() {
            let node = &tree.nodes[idx];
            for &child in node.children.iter().rev() {
                stack.push(child);
            }
            let NodeRef::Switch(switch_name) = &node.node else {
                continue;
            };
            let switch = network
                .switch(switch_name)
                .ok_or_else(|| topology_err(format!("unknown switch {switch_name}")))?;

            // The upstream fragment feeding this node, if the parent hop is
            // also a switch.
            let parent_fragment = node.parent.and_then(|p| {
                let parent = &tree.nodes[p];
                if !matches!(parent.node, NodeRef::Switch(_)) {
                    return None;
                }
                let pos = parent.children.iter().position(|&c| c == idx)?;
                parent.fragments.get(pos)
            });

            for frag in &node.fragments {
                encode_fragment(switch, frag, parent_fragment, first_t1, solver, symbols)?;
                registrations.push(Registration {
                    switch: switch.name.clone(),
                    next_hop: frag.next_hop.clone(),
                    fragment: frag.name.clone(),
                    packets_sent: frag.packets_sent,
                });
            }
        }
    }
    Ok(registrations)
}

fn encode_fragment<S: SmtSolver>(
    switch: &TsnSwitch,
    frag: &FlowFragment,
    parent_fragment: Option<&FlowFragment>,
    first_t1: f64,
    solver: &mut S,
    symbols: &mut SymbolTable,
) -> Result<(), SynthesisError> {
    let port_idx = switch
        .ports
        .iter()
        .position(|p| p.connects_to == frag.next_hop)
        .ok_or_else(|| {
            topology_err(format!(
                "switch {} has no port towards {}",
                switch.name, frag.next_hop
            ))
        })?;
    let cycle = &switch.ports[port_idx].cycle;

    let priority = symbols
        .declare(
            solver,
            &symbols::fragment_priority_var(&frag.name),
            SmtSort::Int,
        )
        .map_err(solver_err)?;
    solver
        .assert(&priority.clone().ge(SmtTerm::int(0)))
        .map_err(solver_err)?;
    solver
        .assert(
            &priority
                .clone()
                .lt(SmtTerm::int(i64::from(cycle.num_priorities))),
        )
        .map_err(solver_err)?;

    let cycle_start = symbols
        .declare(
            solver,
            &symbols::cycle_start_var(&switch.name, port_idx),
            SmtSort::Real,
        )
        .map_err(solver_err)?;
    let cycle_duration = symbols
        .declare(
            solver,
            &symbols::cycle_duration_var(&switch.name, port_idx),
            SmtSort::Real,
        )
        .map_err(solver_err)?;

    for i in 0..frag.packets_sent {
        let departure = symbols
            .declare(
                solver,
                &symbols::fragment_departure_var(&frag.name, i),
                SmtSort::Real,
            )
            .map_err(solver_err)?;
        let arrival = symbols
            .declare(
                solver,
                &symbols::fragment_arrival_var(&frag.name, i),
                SmtSort::Real,
            )
            .map_err(solver_err)?;
        let scheduled = symbols
            .declare(
                solver,
                &symbols::fragment_scheduled_var(&frag.name, i),
                SmtSort::Real,
            )
            .map_err(solver_err)?;
        let cycle_index = symbols
            .declare(
                solver,
                &symbols::fragment_cycle_index_var(&frag.name, i),
                SmtSort::Int,
            )
            .map_err(solver_err)?;

        // First hop departs on the source's period grid; downstream hops
        // depart when the upstream hop transmitted.
        let departs_at = match parent_fragment {
            Some(parent) => SmtTerm::var(symbols::fragment_scheduled_var(&parent.name, i)),
            None => SmtTerm::real(first_t1 + f64::from(i) * frag.packet_period),
        };
        solver
            .assert(&departure.clone().eq(departs_at))
            .map_err(solver_err)?;
        solver
            .assert(
                &arrival.clone().eq(departure
                    .clone()
                    .add(SmtTerm::real(switch.time_to_travel))),
            )
            .map_err(solver_err)?;
        solver
            .assert(
                &scheduled
                    .clone()
                    .ge(arrival.add(SmtTerm::real(switch.transmission_time))),
            )
            .map_err(solver_err)?;
        solver
            .assert(&cycle_index.clone().ge(SmtTerm::int(0)))
            .map_err(solver_err)?;

        // Transmission must fall inside one of the priority's slots within
        // some repetition of the port cycle.
        let offset = scheduled.sub(
            cycle_start
                .clone()
                .add(cycle_index.to_real().mul(cycle_duration.clone())),
        );
        let mut in_some_slot = Vec::new();
        for slot in 0..cycle.num_slots {
            let slot_start = slot_lookup(symbols::slot_start_var, switch, port_idx, cycle, slot, &priority);
            let slot_end = slot_start.clone().add(slot_lookup(
                symbols::slot_duration_var,
                switch,
                port_idx,
                cycle,
                slot,
                &priority,
            ));
            in_some_slot.push(SmtTerm::and(vec![
                offset.clone().ge(slot_start),
                offset
                    .clone()
                    .add(SmtTerm::real(switch.transmission_time))
                    .le(slot_end),
            ]));
        }
        solver
            .assert(&SmtTerm::or(in_some_slot))
            .map_err(solver_err)?;
    }
    Ok(())
}

/// Select a slot variable by the fragment's symbolic priority: an
/// if-then-else chain over the port's concrete priority range.
fn slot_lookup(
    name: fn(&str, usize, u32, u32) -> String,
    switch: &TsnSwitch,
    port_idx: usize,
    cycle: &weft_net::Cycle,
    slot: u32,
    priority: &SmtTerm,
) -> SmtTerm {
    let last = cycle.num_priorities.saturating_sub(1);
    let mut term = SmtTerm::var(name(&switch.name, port_idx, last, slot));
    for p in (0..last).rev() {
        term = SmtTerm::ite(
            priority.clone().eq(SmtTerm::int(i64::from(p))),
            SmtTerm::var(name(&switch.name, port_idx, p, slot)),
            term,
        );
    }
    term
}

fn apply_registrations(
    network: &mut Network,
    registrations: &[Registration],
) -> Result<(), SynthesisError> {
    for reg in registrations {
        let port = network
            .switch_mut(&reg.switch)
            .and_then(|s| s.port_towards_mut(&reg.next_hop))
            .ok_or_else(|| {
                topology_err(format!(
                    "switch {} has no port towards {}",
                    reg.switch, reg.next_hop
                ))
            })?;
        port.register_fragment(&reg.fragment);
    }
    Ok(())
}

/// Per-port slot layout plus pairwise frame isolation between fragments
/// sharing a port.
fn encode_switches<S: SmtSolver>(
    network: &Network,
    solver: &mut S,
    symbols: &mut SymbolTable,
    registrations: &[Registration],
) -> Result<(), SynthesisError> {
    for switch in &network.switches {
        for (port_idx, port) in switch.ports.iter().enumerate() {
            let cycle = &port.cycle;
            let cycle_duration = SmtTerm::var(symbols::cycle_duration_var(&switch.name, port_idx));

            // Slots laid out back to back in (priority, index) order: each
            // slot is non-negative, fits in the cycle, and starts no earlier
            // than its predecessor ends.
            let mut previous_end: Option<SmtTerm> = None;
            for priority in 0..cycle.num_priorities {
                for slot in 0..cycle.num_slots {
                    let start = symbols
                        .declare(
                            solver,
                            &symbols::slot_start_var(&switch.name, port_idx, priority, slot),
                            SmtSort::Real,
                        )
                        .map_err(solver_err)?;
                    let duration = symbols
                        .declare(
                            solver,
                            &symbols::slot_duration_var(&switch.name, port_idx, priority, slot),
                            SmtSort::Real,
                        )
                        .map_err(solver_err)?;

                    solver
                        .assert(&start.clone().ge(SmtTerm::real(0.0)))
                        .map_err(solver_err)?;
                    solver
                        .assert(&duration.clone().ge(SmtTerm::real(0.0)))
                        .map_err(solver_err)?;
                    solver
                        .assert(
                            &start
                                .clone()
                                .add(duration.clone())
                                .le(cycle_duration.clone()),
                        )
                        .map_err(solver_err)?;
                    if let Some(end) = previous_end.take() {
                        solver
                            .assert(&end.le(start.clone()))
                            .map_err(solver_err)?;
                    }
                    previous_end = Some(start.add(duration));
                }
            }

            // Frame isolation: any two transmissions through this port are
            // separated by at least one transmission time.
            let on_port: Vec<&Registration> = registrations
                .iter()
                .filter(|r| r.switch == switch.name && r.next_hop == port.connects_to)
                .collect();
            for (a_pos, a) in on_port.iter().enumerate() {
                for b in on_port.iter().skip(a_pos + 1) {
                    for i in 0..a.packets_sent {
                        for j in 0..b.packets_sent {
                            let a_sched =
                                SmtTerm::var(symbols::fragment_scheduled_var(&a.fragment, i));
                            let b_sched =
                                SmtTerm::var(symbols::fragment_scheduled_var(&b.fragment, j));
                            let gap = SmtTerm::real(switch.transmission_time);
                            solver
                                .assert(&SmtTerm::or(vec![
                                    a_sched.clone().sub(b_sched.clone()).ge(gap.clone()),
                                    b_sched.sub(a_sched).ge(gap),
                                ]))
                                .map_err(solver_err)?;
                        }
                    }
                }
            }
        }
    }
    Ok(())
}

/// Per leaf: every packet's end-to-end latency stays within the jitter
/// bound of the flow's average latency.
fn encode_jitter<S: SmtSolver>(
    network: &Network,
    solver: &mut S,
    symbols: &mut SymbolTable,
    jitter_upper_bound: f64,
) -> Result<(), SynthesisError> {
    for flow in &network.flows {
        for (leaf_pos, latencies) in leaf_latencies(flow) {
            let n = latencies.len();
            if n == 0 {
                continue;
            }
            let average = symbols
                .declare(
                    solver,
                    &symbols::flow_avg_latency_var(&flow.name, leaf_pos),
                    SmtSort::Real,
                )
                .map_err(solver_err)?;

            let mut sum: Option<SmtTerm> = None;
            for latency in &latencies {
                sum = Some(match sum {
                    Some(acc) => acc.add(latency.clone()),
                    None => latency.clone(),
                });
            }
            if let Some(sum) = sum {
                solver
                    .assert(&SmtTerm::real(n as f64).mul(average.clone()).eq(sum))
                    .map_err(solver_err)?;
            }
            for latency in latencies {
                let deviation = latency.sub(average.clone());
                solver
                    .assert(&deviation.clone().le(SmtTerm::real(jitter_upper_bound)))
                    .map_err(solver_err)?;
                solver
                    .assert(&deviation.ge(SmtTerm::real(-jitter_upper_bound)))
                    .map_err(solver_err)?;
            }
        }
    }
    Ok(())
}

/// Per leaf and packet: end-to-end latency within the start device's
/// deadline.
fn encode_hard_constraints<S: SmtSolver>(
    network: &Network,
    solver: &mut S,
    _symbols: &mut SymbolTable,
) -> Result<(), SynthesisError> {
    for flow in &network.flows {
        if flow.tree().is_none() {
            continue;
        }
        let deadline = network
            .device(&flow.start_device)
            .ok_or_else(|| {
                topology_err(format!(
                    "flow {} starts at unknown device {}",
                    flow.name, flow.start_device
                ))
            })?
            .hard_constraint_time;
        for (_, latencies) in leaf_latencies(flow) {
            for latency in latencies {
                solver
                    .assert(&latency.le(SmtTerm::real(deadline)))
                    .map_err(solver_err)?;
            }
        }
    }
    Ok(())
}

/// Per-packet end-to-end latency terms for each leaf: last hop's scheduled
/// time minus first hop's departure.
fn leaf_latencies(flow: &weft_net::Flow) -> Vec<(usize, Vec<SmtTerm>)> {
    let Some(tree) = flow.tree() else {
        return Vec::new();
    };
    let mut result = Vec::new();
    for (leaf_pos, &leaf) in tree.leaves().iter().enumerate() {
        let frags = flow.fragments_root_to_leaf(leaf);
        let (Some(first), Some(last)) = (frags.first(), frags.last()) else {
            continue;
        };
        let latencies = (0..flow.packets_sent)
            .map(|i| {
                SmtTerm::var(symbols::fragment_scheduled_var(&last.name, i))
                    .sub(SmtTerm::var(symbols::fragment_departure_var(&first.name, i)))
            })
            .collect();
        result.push((leaf_pos, latencies));
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;
    use weft_net::{Cycle, Device, Flow};
    use weft_smt::solver::{Model, SatResult};

    #[derive(Default)]
    struct CollectingSolver {
        declared: Vec<String>,
        asserted: Vec<SmtTerm>,
    }

    impl SmtSolver for CollectingSolver {
        type Error = Infallible;

        fn declare_var(&mut self, name: &str, _sort: &SmtSort) -> Result<(), Self::Error> {
            self.declared.push(name.to_string());
            Ok(())
        }

        fn assert(&mut self, term: &SmtTerm) -> Result<(), Self::Error> {
            self.asserted.push(term.clone());
            Ok(())
        }

        fn check_sat(&mut self) -> Result<SatResult, Self::Error> {
            Ok(SatResult::Unknown("collecting only".into()))
        }

        fn check_sat_with_model(
            &mut self,
            _var_names: &[(&str, &SmtSort)],
        ) -> Result<(SatResult, Option<Model>), Self::Error> {
            Ok((SatResult::Unknown("collecting only".into()), None))
        }

        fn reset(&mut self) -> Result<(), Self::Error> {
            self.declared.clear();
            self.asserted.clear();
            Ok(())
        }
    }

    fn single_hop_network(packets: u32) -> Network {
        let mut net = Network::new();
        net.add_device(Device::new("src", 0.0, 100.0, 50.0));
        net.add_device(Device::new("dst", 0.0, 100.0, 50.0));
        let mut sw = TsnSwitch::new("sw0", 1500.0, 125.0, 1.0, 12.0);
        sw.add_port("dst", Cycle::new(2, 2));
        net.add_switch(sw);
        let mut flow = Flow::publish_subscribe("flow0", "src", packets);
        let tree = flow.tree_mut().expect("tree");
        let sw_idx = tree.add_child(tree.root, NodeRef::Switch("sw0".into()));
        tree.add_child(sw_idx, NodeRef::Device("dst".into()));
        net.add_flow(flow);
        net
    }

    #[test]
    fn compile_declares_fragment_and_slot_variables() {
        let mut net = single_hop_network(2);
        let mut solver = CollectingSolver::default();
        let mut symbols = SymbolTable::new();
        compile(&mut net, &mut solver, &mut symbols, &SynthesisOptions::default())
            .expect("compiles");

        for name in [
            "cyc_sw0_0_start",
            "cyc_sw0_0_dur",
            "frag_flow0_f0_prio",
            "frag_flow0_f0_dep_0",
            "frag_flow0_f0_sched_1",
            "frag_flow0_f0_cycidx_1",
            "slot_sw0_0_p0_0_start",
            "slot_sw0_0_p1_1_dur",
            "flow_flow0_leaf0_avglat",
        ] {
            assert!(symbols.contains(name), "missing variable {name}");
        }
        assert!(!solver.asserted.is_empty());
    }

    #[test]
    fn compile_registers_fragments_on_their_ports() {
        let mut net = single_hop_network(1);
        let mut solver = CollectingSolver::default();
        let mut symbols = SymbolTable::new();
        compile(&mut net, &mut solver, &mut symbols, &SynthesisOptions::default())
            .expect("compiles");

        let port = net.switches[0].port_towards("dst").expect("port");
        assert!(port.carries_fragment("flow0_f0"));
    }

    #[test]
    fn skip_policy_leaves_unicast_flows_out_of_the_system() {
        let mut net = single_hop_network(1);
        net.add_flow(Flow::unicast(
            "legacy",
            vec![
                NodeRef::Device("src".into()),
                NodeRef::Switch("sw0".into()),
                NodeRef::Device("dst".into()),
            ],
            1,
        ));
        let mut solver = CollectingSolver::default();
        let mut symbols = SymbolTable::new();
        let options = SynthesisOptions {
            unicast_policy: UnicastPolicy::Skip,
            ..SynthesisOptions::default()
        };
        compile(&mut net, &mut solver, &mut symbols, &options).expect("compiles");

        assert!(matches!(net.flows[1].kind, FlowKind::Unicast { .. }));
        assert!(!symbols.contains("frag_legacy_f0_prio"));
    }

    #[test]
    fn convert_policy_encodes_former_unicast_flows() {
        let mut net = single_hop_network(1);
        net.add_flow(Flow::unicast(
            "legacy",
            vec![
                NodeRef::Device("src".into()),
                NodeRef::Switch("sw0".into()),
                NodeRef::Device("dst".into()),
            ],
            1,
        ));
        let mut solver = CollectingSolver::default();
        let mut symbols = SymbolTable::new();
        compile(&mut net, &mut solver, &mut symbols, &SynthesisOptions::default())
            .expect("compiles");

        assert!(matches!(
            net.flows[1].kind,
            FlowKind::PublishSubscribe { .. }
        ));
        assert!(symbols.contains("frag_legacy_f0_prio"));
    }

    #[test]
    fn shared_port_fragments_get_isolation_constraints() {
        let mut net = single_hop_network(1);
        let mut other = Flow::publish_subscribe("flow1", "src", 1);
        let tree = other.tree_mut().expect("tree");
        let sw_idx = tree.add_child(tree.root, NodeRef::Switch("sw0".into()));
        tree.add_child(sw_idx, NodeRef::Device("dst".into()));
        net.add_flow(other);

        let mut solver = CollectingSolver::default();
        let mut symbols = SymbolTable::new();
        compile(&mut net, &mut solver, &mut symbols, &SynthesisOptions::default())
            .expect("compiles");

        let isolation = solver.asserted.iter().any(|t| {
            let text = format!("{t:?}");
            text.contains("frag_flow0_f0_sched_0") && text.contains("frag_flow1_f0_sched_0")
        });
        assert!(isolation, "expected a constraint relating both fragments");
    }

    #[test]
    fn slot_lookup_chains_over_every_priority() {
        let mut sw = TsnSwitch::new("sw0", 1500.0, 125.0, 1.0, 12.0);
        sw.add_port("dst", Cycle::new(3, 1));
        let cycle = &sw.ports[0].cycle;
        let term = slot_lookup(
            symbols::slot_start_var,
            &sw,
            0,
            cycle,
            0,
            &SmtTerm::var("prio"),
        );
        let text = format!("{term:?}");
        for p in 0..3 {
            assert!(text.contains(&format!("slot_sw0_0_p{p}_0_start")));
        }
    }
}
