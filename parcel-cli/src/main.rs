//! Parcel CLI (`parcel`)
//!
//! Inspect, repack and verify transaction package files.

mod summary;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use parcel_kernel::{PackConfig, Package, DEFAULT_COST_LIMIT};
use std::io::Write;
use std::path::{Path, PathBuf};
use summary::PackageSummary;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "parcel", version, about = "Parcel transaction package tool")]
struct Args {
    /// Verbose logging (-v for debug, -vv for trace)
    #[arg(long, short, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Ceiling for the materialization cost of one unpack
    #[arg(long, global = true, env = "PARCEL_COST_LIMIT", default_value_t = DEFAULT_COST_LIMIT)]
    cost_limit: u64,

    /// Refuse bare sealed contracts (legacy input)
    #[arg(long, global = true)]
    strict: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the contract tree of a package
    Inspect {
        file: PathBuf,
        /// Print a JSON summary instead of the tree
        #[arg(long)]
        json: bool,
    },
    /// Unpack and write the canonical packed form
    Repack { input: PathBuf, output: PathBuf },
    /// Fail unless every sub-contract resolves in dependency order
    Verify { file: PathBuf },
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);
    run(args, &mut std::io::stdout().lock())
}

fn run(args: Args, out: &mut impl Write) -> anyhow::Result<()> {
    let config = PackConfig::default().with_cost_limit(args.cost_limit);
    let allow_legacy = !args.strict;

    match args.command {
        Command::Inspect { file, json } => {
            let package = load(&file, allow_legacy, &config)?;
            if json {
                serde_json::to_writer_pretty(&mut *out, &PackageSummary::new(&package))?;
                writeln!(out)?;
            } else {
                write!(out, "{}", package.trace())?;
            }
        }
        Command::Repack { input, output } => {
            let package = load(&input, allow_legacy, &config)?;
            // A legacy blob caches its original bytes; rebuild to get a real package.
            let package = if package.is_reconstructed() {
                let contract = package.contract().context("legacy input without contract")?;
                let rebuilt = Package::from_contract(contract)?;
                rebuilt.add_keys(package.keys());
                rebuilt
            } else {
                package
            };
            let packed = package.pack()?;
            std::fs::write(&output, &packed).with_context(|| format!("writing {}", output.display()))?;
            tracing::info!(bytes = packed.len(), references = package.reference_ids().len(), "Wrote {}", output.display());
        }
        Command::Verify { file } => {
            let package = load(&file, allow_legacy, &config)?;
            let summary = PackageSummary::new(&package);
            let problems = summary.problems();
            if !problems.is_empty() {
                for problem in &problems {
                    tracing::warn!("{}", problem);
                }
                bail!("{}: {} problem(s)", file.display(), problems.len());
            }
            writeln!(out, "{}: ok ({} references)", file.display(), summary.references.len())?;
        }
    }
    Ok(())
}

fn load(path: &Path, allow_legacy: bool, config: &PackConfig) -> anyhow::Result<Package> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let package = Package::unpack_with_config(&bytes, allow_legacy, config)
        .with_context(|| format!("unpacking {}", path.display()))?;
    if package.is_reconstructed() {
        tracing::info!("{} is a bare contract, read as legacy input", path.display());
    }
    tracing::debug!("{}", package.trace());
    Ok(package)
}

fn init_tracing(verbosity: u8) {
    let mut filter = EnvFilter::from_default_env();

    // Only apply defaults if RUST_LOG is not set
    if std::env::var("RUST_LOG").is_err() {
        let level = match verbosity {
            0 => "info",
            1 => "debug",
            _ => "trace",
        };
        if let Ok(directive) = level.parse() {
            filter = filter.add_directive(directive);
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
