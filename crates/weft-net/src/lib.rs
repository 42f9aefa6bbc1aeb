#![doc = include_str!("../README.md")]

//! Domain model for deterministic TSN schedule synthesis.
//!
//! Topology objects are constructed complete and then *annotated*: the
//! constraint compiler reads them, and after a successful satisfiability
//! check the extractor populates solved timing (cycle start/duration, slot
//! ledgers, per-packet fragment times) exactly once. Unsolved fields are
//! `Option`/[`weft_smt::value::Decoded`] so "not yet populated" is never a
//! sentinel float.

pub mod cycle;
pub mod flow;
pub mod topology;

pub use cycle::{Cycle, SlotUse};
pub use flow::{Flow, FlowFragment, FlowKind, NodeRef, PathNode, PathTree};
pub use topology::{Device, Network, Port, TsnSwitch};
