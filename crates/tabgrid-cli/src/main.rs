mod commands;
mod output;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "tabgrid",
    version,
    about = "Find tables in digitally generated PDF pages"
)]
struct Cli {
    /// Debug logging, and diagnostic counters in the output
    #[arg(long, global = true)]
    debug: bool,

    /// Log progress to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract tables from a PDF or a page-primitives JSON file
    Extract {
        /// Path to PDF or JSON file
        input_file: PathBuf,

        /// JSON config file (missing fields take defaults)
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Output format: table (default), json or csv
        #[arg(short, long, default_value = "table")]
        output: String,

        /// Write one CSV file per table into this directory
        #[arg(long, value_name = "DIR")]
        out_dir: Option<PathBuf>,
    },
    /// Extract tables from every PDF and JSON file in a directory
    Batch {
        /// Directory to scan
        dir: PathBuf,

        /// Descend into subdirectories
        #[arg(short, long)]
        recursive: bool,

        /// Where CSV files go (default: <dir>/tables)
        #[arg(long, value_name = "DIR")]
        out_dir: Option<PathBuf>,

        /// JSON config file (missing fields take defaults)
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
    },
    /// Inspect and validate extraction configs
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective config as JSON
    Show {
        /// Config file to merge over the defaults
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
    },
    /// Validate a config file
    Validate {
        /// Path to JSON config file
        file: PathBuf,
    },
}

fn init_tracing(debug: bool, verbose: bool) {
    let default_level = if debug {
        "debug"
    } else if verbose {
        "info"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.debug, cli.verbose);

    let result = match cli.command {
        Commands::Extract {
            input_file,
            config,
            output,
            out_dir,
        } => commands::extract::run(input_file, config, &output, out_dir, cli.debug),
        Commands::Batch {
            dir,
            recursive,
            out_dir,
            config,
        } => commands::batch::run(dir, recursive, out_dir, config, cli.debug),
        Commands::Config { action } => match action {
            ConfigAction::Show { config } => commands::config::show(config),
            ConfigAction::Validate { file } => commands::config::validate(&file),
        },
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
