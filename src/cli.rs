use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::commands;

#[derive(Parser)]
#[command(name = "enxhist")]
#[command(about = "Euronext history downloader", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Download end-of-day histories and merge them into the repository
    Pull {
        /// Path to the JSON configuration file
        #[arg(default_value = "enxhist.json")]
        config: PathBuf,
    },
    /// Download intraday trades and archive them
    Intraday {
        /// Path to the JSON configuration file
        #[arg(default_value = "enxintr.json")]
        config: PathBuf,
    },
    /// Inspect an instrument catalog and rewrite it as XML and JSON
    Catalog {
        /// Path to the instruments XML file
        input: PathBuf,
        /// Output base name (writes <base>.xml and <base>.json)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

pub fn run() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Pull { config } => {
            commands::pull::run(&config);
        }
        Commands::Intraday { config } => {
            commands::intraday::run(&config);
        }
        Commands::Catalog { input, output } => {
            commands::catalog::run(&input, output.as_deref());
        }
    }
}
