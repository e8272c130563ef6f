mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "rxlink",
    version,
    about = "Reconciles drug identity across Orange Book, NDC, and pricing data"
)]
struct Cli {
    /// JSON configuration file overriding the built-in vocabulary/thresholds
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Log level when RUST_LOG is unset: error, warn, info, debug, trace
    #[arg(long, default_value = "warn", global = true)]
    log: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build formulation equivalence classes from Orange Book editions
    Classes {
        /// Directory holding EOBZIP_* edition subdirectories
        ob_dir: PathBuf,

        /// Write the class summary JSON here instead of stdout
        #[arg(short = 'O', long = "out", value_name = "FILE")]
        out: Option<PathBuf>,
    },
    /// Match NDC/pricing records against the Orange Book product catalog
    Reconcile {
        /// Directory holding EOBZIP_* edition subdirectories
        ob_dir: PathBuf,

        /// Directory holding ndc-* edition subdirectories
        ndc_dir: PathBuf,

        /// Write the match report JSON here instead of stdout
        #[arg(short = 'O', long = "out", value_name = "FILE")]
        out: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log)),
        )
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Classes { ob_dir, out } => commands::classes::run(&ob_dir, cli.config, out),
        Commands::Reconcile {
            ob_dir,
            ndc_dir,
            out,
        } => commands::reconcile::run(&ob_dir, &ndc_dir, cli.config, out),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
