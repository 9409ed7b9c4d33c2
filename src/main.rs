//! Jobloop CLI
//!
//! Lists and runs the bundled scheduler probes.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use jobloop::modules::FsSource;
use jobloop::probes::{self, Probe, ProbeOutcome};
use jobloop::{ClockMode, RuntimeConfig, VERSION};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::rc::Rc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(name = "jobloop")]
#[command(author, version, about = "Job scheduler and module loader probes", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// List bundled probes
    List,

    /// Run a bundled probe and compare against its expectations
    Probe {
        /// Probe name (see `list`)
        name: String,

        /// Read module sources from this directory instead of the bundled copies
        #[arg(long, value_name = "DIR")]
        code_dir: Option<PathBuf>,

        /// Use the wall clock instead of the virtual clock
        #[arg(long)]
        realtime: bool,

        /// JSON runtime configuration
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,
    },

    /// Write a probe's JavaScript sources to a directory
    Export {
        /// Probe name (see `list`)
        name: String,

        /// Destination directory
        dir: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let result = match cli.command {
        Commands::List => {
            list_probes();
            Ok(0)
        }
        Commands::Probe {
            name,
            code_dir,
            realtime,
            config,
        } => run_probe(&name, code_dir, realtime, config.as_deref()),
        Commands::Export { name, dir } => export_probe(&name, &dir).map(|_| 0),
    };

    match result {
        Ok(code) => ExitCode::from(exit_status(code)),
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Truncate a script's exit code to a process status the way POSIX `exit` does
fn exit_status(code: i32) -> u8 {
    (code & 0xff) as u8
}

fn setup_logging(verbosity: u8) {
    let default = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("jobloop={}", default).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn find_probe(name: &str) -> anyhow::Result<&'static Probe> {
    match probes::find(name) {
        Some(probe) => Ok(probe),
        None => bail!("unknown probe '{}' (try `jobloop list`)", name),
    }
}

fn list_probes() {
    println!("jobloop {}", VERSION);
    for probe in probes::all() {
        println!("  {:<18} {}", probe.name, probe.description);
    }
}

fn run_probe(
    name: &str,
    code_dir: Option<PathBuf>,
    realtime: bool,
    config_file: Option<&Path>,
) -> anyhow::Result<i32> {
    let probe = find_probe(name)?;

    let mut config = match config_file {
        Some(path) => RuntimeConfig::from_json_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => RuntimeConfig::new(),
    };
    if realtime {
        config = config.with_clock(ClockMode::Realtime);
    }

    let outcome = match code_dir {
        Some(dir) => {
            let config = config.with_code_dir(dir);
            probe.run_with_sources(config, Rc::new(FsSource))
        }
        None => probe.run(config),
    }
    .with_context(|| format!("running probe {}", probe.name))?;

    Ok(print_outcome(probe, &outcome))
}

fn print_outcome(probe: &Probe, outcome: &ProbeOutcome) -> i32 {
    for line in &outcome.reports {
        println!("{}", line);
    }

    let result = &outcome.result;
    let mismatches = outcome.mismatches(probe);
    if mismatches.is_empty() {
        eprintln!(
            "{}: ok ({:?}, {} microtasks, {} macrotasks, t={}ms)",
            probe.name,
            result.exit,
            result.microtasks_processed,
            result.macrotasks_processed,
            result.final_time
        );
        result.exit_code()
    } else {
        for problem in &mismatches {
            eprintln!("{}: {}", probe.name, problem);
        }
        match result.exit_code() {
            code if exit_status(code) == 0 => 1,
            code => code,
        }
    }
}

fn export_probe(name: &str, dir: &Path) -> anyhow::Result<()> {
    let probe = find_probe(name)?;
    probe
        .write_sources(dir)
        .with_context(|| format!("writing sources to {}", dir.display()))?;
    println!("wrote {} files to {}", probe.files.len(), dir.display());
    Ok(())
}
