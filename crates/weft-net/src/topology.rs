use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use crate::cycle::Cycle;
use crate::flow::Flow;

/// A source or sink endpoint. When acting as a flow's start device it
/// carries the flow-level timing parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub name: String,
    /// Start of the first transmission cycle.
    pub first_t1_time: f64,
    /// Maximum allowed end-to-end latency for flows starting here.
    pub hard_constraint_time: f64,
    /// Interval between consecutive packets.
    pub packet_periodicity: f64,
}

impl Device {
    pub fn new(
        name: &str,
        first_t1_time: f64,
        hard_constraint_time: f64,
        packet_periodicity: f64,
    ) -> Self {
        Self {
            name: name.to_string(),
            first_t1_time,
            hard_constraint_time,
            packet_periodicity,
        }
    }
}

/// An egress port of a switch, serving exactly one neighbor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Port {
    pub name: String,
    /// Name of the neighbor node this port transmits toward.
    pub connects_to: String,
    pub cycle: Cycle,
    /// Names of the fragments routed through this port. Insertion order is
    /// the registration order, which extraction relies on.
    pub fragment_registry: IndexSet<String>,
}

impl Port {
    pub fn register_fragment(&mut self, fragment_name: &str) {
        self.fragment_registry.insert(fragment_name.to_string());
    }

    pub fn carries_fragment(&self, fragment_name: &str) -> bool {
        self.fragment_registry.contains(fragment_name)
    }
}

/// A TSN switch: a set of egress ports plus the link parameters shared by
/// all of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TsnSwitch {
    pub name: String,
    /// Largest frame this switch forwards, bytes.
    pub max_packet_size: f64,
    /// Egress line rate, bytes per time unit.
    pub port_speed: f64,
    /// Propagation delay to the next hop.
    pub time_to_travel: f64,
    /// Time to put one maximum-size frame on the wire.
    pub transmission_time: f64,
    pub ports: Vec<Port>,
}

impl TsnSwitch {
    pub fn new(
        name: &str,
        max_packet_size: f64,
        port_speed: f64,
        time_to_travel: f64,
        transmission_time: f64,
    ) -> Self {
        Self {
            name: name.to_string(),
            max_packet_size,
            port_speed,
            time_to_travel,
            transmission_time,
            ports: Vec::new(),
        }
    }

    /// Add an egress port toward `connects_to` and return its index.
    pub fn add_port(&mut self, connects_to: &str, cycle: Cycle) -> usize {
        let index = self.ports.len();
        self.ports.push(Port {
            name: format!("{}-p{}", self.name, index),
            connects_to: connects_to.to_string(),
            cycle,
            fragment_registry: IndexSet::new(),
        });
        index
    }

    /// The port serving a given next hop.
    pub fn port_towards(&self, next_hop: &str) -> Option<&Port> {
        self.ports.iter().find(|p| p.connects_to == next_hop)
    }

    pub fn port_towards_mut(&mut self, next_hop: &str) -> Option<&mut Port> {
        self.ports.iter_mut().find(|p| p.connects_to == next_hop)
    }
}

/// The full topology: every device, switch, and flow of one synthesis run.
///
/// Constructed complete by the caller; the engine only adds constraints
/// (compile) and solved timing (extraction).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Network {
    pub devices: Vec<Device>,
    pub switches: Vec<TsnSwitch>,
    pub flows: Vec<Flow>,
}

impl Network {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_device(&mut self, device: Device) {
        self.devices.push(device);
    }

    pub fn add_switch(&mut self, switch: TsnSwitch) {
        self.switches.push(switch);
    }

    pub fn add_flow(&mut self, flow: Flow) {
        self.flows.push(flow);
    }

    pub fn device(&self, name: &str) -> Option<&Device> {
        self.devices.iter().find(|d| d.name == name)
    }

    pub fn switch(&self, name: &str) -> Option<&TsnSwitch> {
        self.switches.iter().find(|s| s.name == name)
    }

    pub fn switch_mut(&mut self, name: &str) -> Option<&mut TsnSwitch> {
        self.switches.iter_mut().find(|s| s.name == name)
    }
}
