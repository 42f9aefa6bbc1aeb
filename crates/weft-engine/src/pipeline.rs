//! The synthesis driver: compile the topology into constraints, run one
//! satisfiability check, and on SAT walk the model back into the topology
//! while writing the schedule log.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use thiserror::Error;
use tracing::{debug, info, warn};
use weft_net::Network;
use weft_smt::backends::smtlib_printer::ScriptRecorder;
use weft_smt::backends::z3_backend::Z3Solver;
use weft_smt::solver::{SatResult, SmtSolver};

use crate::compile;
use crate::export::NetworkExporter;
use crate::report;
use crate::session::SolverSession;
use crate::symbols::{self, SymbolTable};

/// How to treat flows still in the legacy unicast representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnicastPolicy {
    /// Rewrite the hop chain into a single-leaf path tree.
    #[default]
    Convert,
    /// Leave the flow out of the schedule and report it.
    Skip,
    /// Refuse to synthesize.
    Fail,
}

#[derive(Debug, Clone)]
pub struct SynthesisOptions {
    /// Bound on each packet's deviation from the flow's average latency,
    /// per leaf.
    pub jitter_upper_bound: f64,
    pub unicast_policy: UnicastPolicy,
    /// Where the schedule log goes. `None` discards it.
    pub log_path: Option<PathBuf>,
    /// Dump the compiled constraint system as an SMT-LIB script.
    pub smtlib_dump_path: Option<PathBuf>,
}

impl Default for SynthesisOptions {
    fn default() -> Self {
        Self {
            jitter_upper_bound: 25.0,
            unicast_policy: UnicastPolicy::Convert,
            log_path: Some(PathBuf::from("log.txt")),
            smtlib_dump_path: None,
        }
    }
}

/// Terminal state of one synthesis run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynthesisOutcome {
    /// A schedule was found and written back into the topology.
    Scheduled,
    /// The constraint system is unsatisfiable.
    Infeasible,
    /// The solver produced no usable model (gave up or could not evaluate).
    Unevaluable,
}

#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("solver backend error: {0}")]
    Solver(String),
    #[error("topology error: {0}")]
    Topology(String),
    #[error("flow {flow} is unicast and the unicast policy forbids conversion")]
    UnconvertedUnicast { flow: String },
}

/// Synthesize a schedule using the Z3 backend.
pub fn synthesize(
    network: &mut Network,
    options: &SynthesisOptions,
) -> Result<SynthesisOutcome, SynthesisError> {
    synthesize_with_solver(network, Z3Solver::new(), options, None)
}

/// Synthesize with Z3 and hand the solved topology to `exporter` on success.
pub fn synthesize_with_exporter(
    network: &mut Network,
    options: &SynthesisOptions,
    exporter: &dyn NetworkExporter,
) -> Result<SynthesisOutcome, SynthesisError> {
    synthesize_with_solver(network, Z3Solver::new(), options, Some(exporter))
}

/// Synthesize against any [`SmtSolver`] backend.
///
/// The solver is owned for the duration of the run and released on every
/// exit path. On [`SynthesisOutcome::Scheduled`] the topology carries the
/// solved cycle timing, fragment priorities, per-packet times, and slot
/// ledgers; on any other outcome it is left untouched by extraction.
pub fn synthesize_with_solver<S: SmtSolver>(
    network: &mut Network,
    solver: S,
    options: &SynthesisOptions,
    exporter: Option<&dyn NetworkExporter>,
) -> Result<SynthesisOutcome, SynthesisError> {
    if network.switches.is_empty() {
        return Err(SynthesisError::Topology(
            "network has no switches to schedule".into(),
        ));
    }

    let recorder = if options.smtlib_dump_path.is_some() {
        ScriptRecorder::new(solver)
    } else {
        ScriptRecorder::disabled(solver)
    };
    let mut session = SolverSession::open(recorder);
    let mut symbols = SymbolTable::new();

    if let Err(err) = compile::compile(network, session.solver_mut(), &mut symbols, options) {
        session.close();
        return Err(err);
    }
    info!(variables = symbols.len(), "constraint compilation complete");

    if let Some(path) = &options.smtlib_dump_path {
        match std::fs::write(path, session.solver_mut().script()) {
            Ok(()) => debug!(path = %path.display(), "constraint system dumped"),
            Err(err) => {
                warn!(error = %err, path = %path.display(), "could not write constraint dump")
            }
        }
    }

    let entries = symbols.entries();
    let (sat, model) = match session.solver_mut().check_sat_with_model(&entries) {
        Ok(pair) => pair,
        Err(err) => {
            session.close();
            return Err(SynthesisError::Solver(err.to_string()));
        }
    };
    session.close();

    let model = match sat {
        SatResult::Unsat => {
            info!("constraint system is unsatisfiable");
            return Ok(SynthesisOutcome::Infeasible);
        }
        SatResult::Unknown(reason) => {
            warn!(%reason, "solver could not decide the constraint system");
            return Ok(SynthesisOutcome::Unevaluable);
        }
        SatResult::Sat => match model {
            Some(model) => model,
            None => {
                return Err(SynthesisError::Solver(
                    "solver reported sat but produced no model".into(),
                ))
            }
        },
    };

    // Probe one known variable before touching the topology. A model that
    // cannot even evaluate the first cycle's duration is unusable.
    match probe_var(network) {
        Some(probe) if model.get(&probe).is_some() => {}
        _ => {
            warn!("failed to evaluate the solved model; topology left untouched");
            return Ok(SynthesisOutcome::Unevaluable);
        }
    }

    let mut out = open_log(options);
    if let Err(err) = report::write_report(network, &model, &mut out) {
        warn!(error = %err, "failed while writing the schedule log");
    }
    if let Err(err) = out.flush() {
        warn!(error = %err, "failed to flush the schedule log");
    }

    if let Some(exporter) = exporter {
        if let Err(err) = exporter.export(network) {
            warn!(error = %err, "network exporter failed");
        }
    }

    info!("schedule synthesized");
    Ok(SynthesisOutcome::Scheduled)
}

/// Cycle duration of the first switch's first port, checked as a canary
/// before trusting a model.
fn probe_var(network: &Network) -> Option<String> {
    let switch = network.switches.first()?;
    if switch.ports.is_empty() {
        return None;
    }
    Some(symbols::cycle_duration_var(&switch.name, 0))
}

/// Open the schedule log, falling back to a discarding writer so extraction
/// still populates the topology when the path is unwritable.
fn open_log(options: &SynthesisOptions) -> Box<dyn Write> {
    match &options.log_path {
        Some(path) => match File::create(path) {
            Ok(file) => Box::new(BufWriter::new(file)),
            Err(err) => {
                warn!(
                    error = %err,
                    path = %path.display(),
                    "could not open schedule log; discarding log output"
                );
                Box::new(io::sink())
            }
        },
        None => Box::new(io::sink()),
    }
}
