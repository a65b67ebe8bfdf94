//! Configuration inspection and scaffolding.

use std::path::PathBuf;

use clap::{Args, Subcommand};
use tactus_config::TactusConfig;

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    action: ConfigAction,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write a default configuration file
    Init {
        /// Where to write it
        #[arg(default_value = "tactus.toml")]
        path: PathBuf,
    },

    /// Print a configuration with its validation verdict
    Show {
        /// File to inspect
        #[arg(default_value = "tactus.toml")]
        path: PathBuf,
    },
}

pub fn run(args: ConfigArgs) -> anyhow::Result<()> {
    match args.action {
        ConfigAction::Init { path } => {
            if path.exists() {
                anyhow::bail!("refusing to overwrite existing '{}'", path.display());
            }
            TactusConfig::default().save(&path)?;
            println!("Wrote default configuration to {}", path.display());
            Ok(())
        }
        ConfigAction::Show { path } => {
            let config = TactusConfig::load(&path)?;
            print!("{}", toml::to_string_pretty(&config)?);
            match config.validate() {
                Ok(()) => println!("\n# configuration is valid"),
                Err(e) => println!("\n# INVALID: {e}"),
            }
            Ok(())
        }
    }
}
