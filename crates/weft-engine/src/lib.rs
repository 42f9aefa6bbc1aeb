#![doc = include_str!("../README.md")]

pub mod compile;
pub mod export;
pub mod extract;
pub mod persist;
pub mod pipeline;
pub mod report;
pub mod session;
pub mod symbols;

pub use export::{JsonFileExporter, NetworkExporter};
pub use persist::{load_network, save_network, PersistError};
pub use pipeline::{
    synthesize, synthesize_with_exporter, synthesize_with_solver, SynthesisError,
    SynthesisOptions, SynthesisOutcome, UnicastPolicy,
};
