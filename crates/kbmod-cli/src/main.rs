mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "kbmod", about = "Shift-and-stack trajectory search")]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a trajectory search over an exposure manifest
    Run(commands::run::RunArgs),
    /// Build and print a PSF kernel
    Psf(commands::psf::PsfArgs),
    /// Load and validate a search configuration
    Config(commands::config::ConfigArgs),
    /// Print the materialized trajectory grid
    Grid(commands::grid::GridArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match &cli.command {
        Commands::Run(args) => commands::run::run(args),
        Commands::Psf(args) => commands::psf::run(args),
        Commands::Config(args) => commands::config::run(args),
        Commands::Grid(args) => commands::grid::run(args),
    }
}
