//! resumetest CLI - Main Entry Point
//!
//! Runs the bundled applications against a file-backed platform. A
//! suspended application ends the process; launching it again resumes it.

use clap::{Parser, Subcommand};
use resumetest_cli::commands::{config, exit, run, state};
use resumetest_cli::output::{print_error, OutputFormat};
use resumetest_core::RunnerConfig;
use std::path::PathBuf;

/// resumetest - sequential tests that survive a platform reset
#[derive(Parser)]
#[command(name = "resumetest")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Simulated platform state file
    #[arg(long, env = "RESUMETEST_STATE", default_value = "resumetest-state.json", global = true)]
    state_file: PathBuf,

    /// Configuration file
    #[arg(long, env = "RESUMETEST_CONFIG", default_value = "resumetest.toml", global = true)]
    config: PathBuf,

    /// Output format (defaults to the configured report format)
    #[arg(long, global = true)]
    format: Option<OutputFormat>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an application for one lifetime
    Run(run::RunArgs),

    /// Inspect or reset the simulated platform
    #[command(subcommand)]
    State(state::StateCommands),

    /// Manage the configuration file
    #[command(subcommand)]
    Config(config::ConfigCommands),

    /// Show version information
    Version,
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging; stdout is reserved for reports
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let code = match dispatch(cli) {
        Ok(code) => code,
        Err(e) => {
            print_error(&format!("{:#}", e));
            exit::FAILURE
        }
    };
    std::process::exit(code);
}

fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    let runner_config = RunnerConfig::load(&cli.config)?;
    let format = cli.format.unwrap_or_else(|| runner_config.report.format.into());

    match cli.command {
        Commands::Run(args) => run::execute(args, &cli.state_file, runner_config, cli.format),
        Commands::State(cmd) => state::execute(cmd, &cli.state_file, &runner_config, format),
        Commands::Config(cmd) => config::execute(cmd, &cli.config, runner_config, format),
        Commands::Version => {
            println!("resumetest v{}", env!("CARGO_PKG_VERSION"));
            println!("Engine: resumetest-core v{}", resumetest_core::VERSION);
            Ok(exit::SUCCESS)
        }
    }
}
