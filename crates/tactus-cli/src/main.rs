//! Tactus CLI - run coordinator and sensor-node processes of the
//! performer-synchronization engine.

mod commands;
mod sim;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tactus")]
#[command(author, version, about = "Performer-synchronization engine CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the coordinating process: clock origin, state server, metronome
    Coordinate(commands::coordinate::CoordinateArgs),

    /// Run a sensor node with a simulated performer
    Perform(commands::perform::PerformArgs),

    /// Inspect or create configuration files
    Config(commands::config::ConfigArgs),
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Coordinate(args) => commands::coordinate::run(args),
        Commands::Perform(args) => commands::perform::run(args),
        Commands::Config(args) => commands::config::run(args),
    }
}
