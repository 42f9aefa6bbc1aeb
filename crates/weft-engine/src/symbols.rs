//! Naming scheme for solver variables.
//!
//! Every symbolic quantity is addressed by a stable string derived from the
//! topology object it belongs to, so the compiler and the extractor agree on
//! names without sharing handles into any solver context.

use indexmap::IndexMap;
use weft_smt::solver::SmtSolver;
use weft_smt::sorts::SmtSort;
use weft_smt::terms::SmtTerm;

/// Registry of every variable declared for one synthesis run.
///
/// Declarations are idempotent per name and kept in insertion order, which
/// makes model harvesting deterministic.
#[derive(Debug, Default)]
pub struct SymbolTable {
    vars: IndexMap<String, SmtSort>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare `name` on the solver (first time only) and return a term
    /// referring to it.
    pub fn declare<S: SmtSolver>(
        &mut self,
        solver: &mut S,
        name: &str,
        sort: SmtSort,
    ) -> Result<SmtTerm, S::Error> {
        if !self.vars.contains_key(name) {
            solver.declare_var(name, &sort)?;
            self.vars.insert(name.to_string(), sort);
        }
        Ok(SmtTerm::var(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// All declared variables, in declaration order, as model query slots.
    pub fn entries(&self) -> Vec<(&str, &SmtSort)> {
        self.vars.iter().map(|(n, s)| (n.as_str(), s)).collect()
    }
}

pub fn cycle_start_var(switch: &str, port: usize) -> String {
    format!("cyc_{switch}_{port}_start")
}

pub fn cycle_duration_var(switch: &str, port: usize) -> String {
    format!("cyc_{switch}_{port}_dur")
}

pub fn slot_start_var(switch: &str, port: usize, priority: u32, slot: u32) -> String {
    format!("slot_{switch}_{port}_p{priority}_{slot}_start")
}

pub fn slot_duration_var(switch: &str, port: usize, priority: u32, slot: u32) -> String {
    format!("slot_{switch}_{port}_p{priority}_{slot}_dur")
}

pub fn fragment_priority_var(fragment: &str) -> String {
    format!("frag_{fragment}_prio")
}

pub fn fragment_departure_var(fragment: &str, packet: u32) -> String {
    format!("frag_{fragment}_dep_{packet}")
}

pub fn fragment_arrival_var(fragment: &str, packet: u32) -> String {
    format!("frag_{fragment}_arr_{packet}")
}

pub fn fragment_scheduled_var(fragment: &str, packet: u32) -> String {
    format!("frag_{fragment}_sched_{packet}")
}

pub fn fragment_cycle_index_var(fragment: &str, packet: u32) -> String {
    format!("frag_{fragment}_cycidx_{packet}")
}

pub fn flow_avg_latency_var(flow: &str, leaf: usize) -> String {
    format!("flow_{flow}_leaf{leaf}_avglat")
}
