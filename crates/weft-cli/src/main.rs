use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use tracing::error;
use tracing_subscriber::EnvFilter;
use weft_engine::{
    load_network, synthesize, synthesize_with_exporter, JsonFileExporter, SynthesisOptions,
    SynthesisOutcome, UnicastPolicy,
};
use weft_net::Network;

#[derive(Parser)]
#[command(name = "weft", version, about = "TSN transmission schedule synthesizer")]
struct Cli {
    /// Network topology to schedule, as JSON.
    network: PathBuf,

    /// Where the schedule log goes.
    #[arg(long, default_value = "log.txt")]
    log: PathBuf,

    /// Bound on each packet's deviation from its flow's average latency.
    #[arg(long, default_value_t = 25.0)]
    jitter_bound: f64,

    /// How to treat flows still in the legacy unicast representation.
    #[arg(long, value_enum, default_value_t = UnicastPolicyArg::Convert)]
    unicast_policy: UnicastPolicyArg,

    /// Save the solved topology as JSON after a successful run.
    #[arg(long)]
    save: Option<PathBuf>,

    /// Dump the compiled constraint system as an SMT-LIB script.
    #[arg(long)]
    dump_smtlib: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum UnicastPolicyArg {
    Convert,
    Skip,
    Fail,
}

impl From<UnicastPolicyArg> for UnicastPolicy {
    fn from(arg: UnicastPolicyArg) -> Self {
        match arg {
            UnicastPolicyArg::Convert => UnicastPolicy::Convert,
            UnicastPolicyArg::Skip => UnicastPolicy::Skip,
            UnicastPolicyArg::Fail => UnicastPolicy::Fail,
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut network: Network = match load_network(&cli.network) {
        Ok(network) => network,
        Err(err) => {
            error!(error = %err, path = %cli.network.display(), "failed to load network");
            return ExitCode::FAILURE;
        }
    };

    let options = SynthesisOptions {
        jitter_upper_bound: cli.jitter_bound,
        unicast_policy: cli.unicast_policy.into(),
        log_path: Some(cli.log.clone()),
        smtlib_dump_path: cli.dump_smtlib.clone(),
    };

    let result = match &cli.save {
        Some(path) => synthesize_with_exporter(
            &mut network,
            &options,
            &JsonFileExporter { path: path.clone() },
        ),
        None => synthesize(&mut network, &options),
    };

    match result {
        Ok(SynthesisOutcome::Scheduled) => {
            println!("schedule written to {}", cli.log.display());
            ExitCode::SUCCESS
        }
        Ok(SynthesisOutcome::Infeasible) => {
            println!("no feasible schedule exists for this topology");
            ExitCode::FAILURE
        }
        Ok(SynthesisOutcome::Unevaluable) => {
            println!("the solver produced no usable schedule");
            ExitCode::FAILURE
        }
        Err(err) => {
            error!(error = %err, "synthesis failed");
            ExitCode::FAILURE
        }
    }
}
