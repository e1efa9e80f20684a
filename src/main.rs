mod cli;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use cli::build::{cmd_build, BuildArgs};
use cli::check::{cmd_check, CheckArgs};
use cli::features::{cmd_features, FeaturesArgs};
use cli::list::{cmd_list, ListArgs};
use cli::run::{cmd_run, RunArgs};

/// Environment variable holding a tracing filter (e.g. `simdkern=debug`).
const LOG_ENV: &str = "SIMDKERN_LOG";

#[derive(Parser)]
#[command(
    name = "simdkern",
    version,
    about = "SIMD kernel compiler: typed Python-like kernels to x86-64 machine code"
)]
struct Cli {
    /// More logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show the detected CPU features and the dispatch level
    Features(FeaturesArgs),
    /// Parse, type check and compile a kernel file at every level
    Check(CheckArgs),
    /// Compile a kernel file and print listings, sizes and fingerprints
    Build(BuildArgs),
    /// Evaluate a built-in kernel
    Run(RunArgs),
    /// List the registered built-in kernels
    List(ListArgs),
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(format!("simdkern={}", level)));
    // Only fails if a subscriber is already installed.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Features(args) => cmd_features(args),
        Command::Check(args) => cmd_check(args),
        Command::Build(args) => cmd_build(args),
        Command::Run(args) => cmd_run(args),
        Command::List(args) => cmd_list(args),
    }
}
